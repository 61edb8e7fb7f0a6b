//! Graph client.
//!
//! ```ignore
//! use qline_sdk::{ClientConfig, GraphClient, GraphQueryExt};
//!
//! let client = GraphClient::new(ClientConfig::default().bearer_token(token))?;
//!
//! let me: User = client.api("me").execute_as().await?;
//!
//! let users = client.api("users");
//! users.select(&["id", "displayName"]).top(10);
//! let page = users.execute().await?;
//! ```

use qline_core::SdkResult;
use qline_graph::{create_batch, Batch, BatchOptions, BatchRegistrar};
use qline_runtime::{
    BearerToken, Behavior, Diagnostics, InjectHeaders, JsonParse, Queryable, Retry, StaticToken,
    Transport,
};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;

/// Entry point for building Graph requests.
///
/// Holds a configured root queryable; every request made through the client
/// is a child of it and starts with a copy of its behaviors.
#[derive(Debug, Clone)]
pub struct GraphClient {
    root: Queryable,
    config: ClientConfig,
}

impl GraphClient {
    /// Creates a client sending over HTTP.
    pub fn new(config: ClientConfig) -> SdkResult<Self> {
        let transport = Transport::new(config.timeout)?;
        Self::with_transport(config, transport)
    }

    /// Creates a client whose `send` observer is registered by `transport`.
    ///
    /// The behavior stack is: default headers, `transport`, retry, bearer
    /// auth, diagnostics, JSON parsing.
    pub fn with_transport(config: ClientConfig, transport: impl Behavior) -> SdkResult<Self> {
        let root = Queryable::new(config.base_url.clone());

        if !config.headers.is_empty() {
            root.using(InjectHeaders::new(config.headers.clone()))?;
        }
        root.using(transport)?;
        if config.retry.max_retries > 0 {
            root.using(Retry::new(config.retry.clone()))?;
        }
        if let Some(token) = &config.bearer_token {
            root.using(BearerToken::new(StaticToken(token.clone())))?;
        }
        if config.diagnostics {
            root.using(Diagnostics::new().stamp_request_id(true))?;
        }
        root.using(JsonParse)?;

        tracing::debug!(base_url = %config.base_url, "graph client ready");
        Ok(Self { root, config })
    }

    /// The configured root.
    pub fn root(&self) -> &Queryable {
        &self.root
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A new request for `path` relative to the base URL.
    pub fn api(&self, path: impl AsRef<str>) -> Queryable {
        Queryable::child(&self.root, path)
    }

    /// GETs `path` and deserializes the JSON result.
    pub async fn get<T: DeserializeOwned>(&self, path: impl AsRef<str>) -> SdkResult<T> {
        self.api(path).execute_as().await
    }

    /// Creates a batch sized by `max_batch_requests`.
    pub fn create_batch(&self) -> (BatchRegistrar, Batch) {
        create_batch(
            &self.root,
            BatchOptions::new().max_requests(self.config.max_batch_requests),
        )
    }
}
