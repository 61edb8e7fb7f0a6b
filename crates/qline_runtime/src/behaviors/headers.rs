//! Fixed header injection.

use std::sync::Arc;

use qline_core::{reducer, SdkResult};

use super::Behavior;
use crate::moments::{PreparedRequest, PRE};
use crate::queryable::Queryable;
use crate::request::Headers;

/// Merges fixed headers into every request during `pre`.
///
/// Injected values overwrite headers of the same name already on the init.
/// With [`InjectHeaders::prepend`] the observer runs ahead of existing `pre`
/// observers, so later ones can still override it.
#[derive(Debug, Clone, Default)]
pub struct InjectHeaders {
    headers: Arc<Headers>,
    prepend: bool,
}

impl InjectHeaders {
    pub fn new<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: Arc::new(headers.into_iter().collect()),
            prepend: false,
        }
    }

    pub fn prepend(mut self, prepend: bool) -> Self {
        self.prepend = prepend;
        self
    }
}

impl Behavior for InjectHeaders {
    fn apply_to(&self, queryable: &Queryable) -> SdkResult<()> {
        let headers = self.headers.clone();
        let observer = reducer(move |mut request: PreparedRequest| {
            let headers = headers.clone();
            async move {
                for (name, value) in headers.iter() {
                    request.init.headers.insert(name, value);
                }
                Ok(request)
            }
        });
        if self.prepend {
            queryable.prepend(&PRE, observer)?;
        } else {
            queryable.on(&PRE, observer)?;
        }
        Ok(())
    }
}
