//! qline SDK
//!
//! A Graph client built on the qline request pipeline: requests are
//! [`Queryable`] objects whose behavior is assembled from observers, and any
//! number of them can be sent together through a `$batch` call.
//!
//! # Batching
//!
//! ```ignore
//! use qline_sdk::{ClientConfig, GraphClient};
//!
//! let client = GraphClient::new(ClientConfig::default().bearer_token(token))?;
//! let (register, batch) = client.create_batch();
//!
//! let me = client.api("me");
//! me.using(register.clone())?;
//! let drive = client.api("me/drive");
//! drive.using(register)?;
//!
//! let (me, drive) = (me.execute(), drive.execute());
//! batch.execute().await?;
//! let (me, drive) = (me.await?, drive.await?);
//! ```

pub mod client;
pub mod config;
pub mod logging;

pub use client::GraphClient;
pub use config::ClientConfig;
pub use logging::init_tracing;

pub use qline_core::{ErrorCode, ResultExt, SdkError, SdkResult};
pub use qline_graph::{Batch, BatchOptions, BatchRegistrar, GraphQueryExt, GRAPH_BASE};
pub use qline_runtime::{
    Behavior, Payload, Queryable, RequestInit, Response, RetryConfig, TokenProvider,
};
