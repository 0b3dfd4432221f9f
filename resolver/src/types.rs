use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("invalid project {0:?}, expected the form owner/name")]
pub struct InvalidProjectId(pub String);

/// Identifies an upstream project in `owner/name` form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn parse(value: &str) -> Result<Self, InvalidProjectId> {
        // Both segments end up in the request path, so only allow characters
        // that need no escaping.
        let valid_segment = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };

        match value.split_once('/') {
            Some((owner, name)) if valid_segment(owner) && valid_segment(name) => {
                Ok(ProjectId(value.to_string()))
            }
            _ => Err(InvalidProjectId(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = InvalidProjectId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProjectId::parse(&value)
    }
}

impl FromStr for ProjectId {
    type Err = InvalidProjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectId::parse(s)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The subset of the upstream's "latest release" document that we read.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ReleaseMetadata {
    pub tag_name: String,
    pub assets: Vec<Asset>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Asset {
    pub browser_download_url: String,
}

/// Why a project could not be resolved to a download URL.
///
/// Outcomes are shared between every caller waiting on the same lookup,
/// so this carries rendered messages rather than source errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("latest release '{tag}' has no assets")]
    NoAssets { tag: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("resolution ended without producing an outcome")]
    Aborted,
}

impl ResolveError {
    /// Short label used to tag metrics and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::NoAssets { .. } => "no_assets",
            ResolveError::UpstreamUnavailable(_) => "upstream_unavailable",
            ResolveError::MalformedResponse(_) => "malformed_response",
            ResolveError::Aborted => "aborted",
        }
    }
}

/// Outcome of resolving one project: the asset download URL or the failure.
pub type Resolution = Result<Arc<str>, ResolveError>;
