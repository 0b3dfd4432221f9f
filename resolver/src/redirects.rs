use crate::cache::ResolutionCache;
use crate::types::{ProjectId, ResolveError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RedirectError {
    #[error("no file configured for key {0:?}")]
    UnknownKey(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Maps the public file keys to their projects and resolves them through the cache.
#[derive(Clone)]
pub struct Redirects {
    files: Arc<HashMap<String, ProjectId>>,
    cache: ResolutionCache,
}

impl Redirects {
    pub fn new(files: HashMap<String, ProjectId>, cache: ResolutionCache) -> Self {
        Redirects {
            files: Arc::new(files),
            cache,
        }
    }

    pub fn project(&self, key: &str) -> Option<&ProjectId> {
        self.files.get(key)
    }

    /// Returns the download URL that `key` should currently redirect to.
    pub async fn resolve(&self, key: &str) -> Result<Arc<str>, RedirectError> {
        let project = self
            .project(key)
            .ok_or_else(|| RedirectError::UnknownKey(key.to_string()))?;

        Ok(self.cache.resolve(project).await?)
    }
}
