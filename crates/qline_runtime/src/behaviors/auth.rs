//! Bearer authentication.

use std::sync::Arc;

use async_trait::async_trait;
use qline_core::{reducer, SdkResult};

use super::Behavior;
use crate::moments::{PreparedRequest, AUTH};
use crate::queryable::Queryable;

/// Source of access tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for `url`.
    async fn token(&self, url: &str) -> SdkResult<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _url: &str) -> SdkResult<String> {
        Ok(self.0.clone())
    }
}

/// Sets `Authorization: Bearer <token>` during `auth`.
#[derive(Clone)]
pub struct BearerToken {
    provider: Arc<dyn TokenProvider>,
}

impl BearerToken {
    pub fn new(provider: impl TokenProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    pub fn from_arc(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl Behavior for BearerToken {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let provider = self.provider.clone();
        queryable.on(
            &AUTH,
            reducer(move |mut request: PreparedRequest| {
                let provider = provider.clone();
                async move {
                    let token = provider.token(&request.url).await?;
                    request
                        .init
                        .headers
                        .insert("Authorization", format!("Bearer {token}"));
                    Ok(request)
                }
            }),
        )?;
        Ok(())
    }
}
