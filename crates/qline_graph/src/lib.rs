//! Graph support for qline.
//!
//! This crate provides:
//! - `batch`: Aggregating queryables into JSON `$batch` calls
//! - `wire`: The `$batch` request/response format and response rebuilding
//! - `query`: OData query option helpers

pub mod batch;
pub mod query;
pub mod wire;

pub use batch::{create_batch, Batch, BatchOptions, BatchRegistrar, BATCH_MARKER};
pub use query::GraphQueryExt;
pub use wire::{
    build_response, format_requests, match_fragments, relative_url, BatchRequestBody,
    BatchResponseBody, RequestFragment, ResponseFragment, ServiceError,
};

/// Root of the Graph v1.0 API.
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
