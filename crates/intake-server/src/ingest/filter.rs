//! File acceptance predicates
//!
//! A [`FileFilter`] is consulted once per file part, before any of its bytes
//! are read. Rejected parts are drained and dropped; a filter error fails
//! the whole request with [`IngestError::FileFilter`](crate::error::IngestError).

use async_trait::async_trait;
use intake_common::PartMetadata;
use mime::Mime;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

use super::RequestContext;
use crate::error::BoxError;

/// Outcome of a successful filter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject,
}

impl From<bool> for FilterDecision {
    fn from(accept: bool) -> Self {
        if accept {
            FilterDecision::Accept
        } else {
            FilterDecision::Reject
        }
    }
}

#[async_trait]
pub trait FileFilter: Send + Sync {
    async fn check(
        &self,
        ctx: &RequestContext,
        metadata: &PartMetadata,
    ) -> Result<FilterDecision, BoxError>;
}

/// Filter backed by a plain closure
pub struct FnFilter<F> {
    f: F,
}

/// Wrap a closure as a [`FileFilter`].
pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(&RequestContext, &PartMetadata) -> Result<FilterDecision, BoxError> + Send + Sync,
{
    FnFilter { f }
}

#[async_trait]
impl<F> FileFilter for FnFilter<F>
where
    F: Fn(&RequestContext, &PartMetadata) -> Result<FilterDecision, BoxError> + Send + Sync,
{
    async fn check(
        &self,
        ctx: &RequestContext,
        metadata: &PartMetadata,
    ) -> Result<FilterDecision, BoxError> {
        (self.f)(ctx, metadata)
    }
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter").finish_non_exhaustive()
    }
}

/// Accepts parts whose declared media type is on an allow-list.
///
/// Entries are either exact essences (`image/png`) or whole top-level types
/// (`image/*`). Parameters such as `charset` are ignored, and a part whose
/// media type does not parse is rejected.
#[derive(Debug, Clone)]
pub struct MimeFilter {
    allowed: Vec<String>,
}

impl MimeFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn allows(&self, content_type: &str) -> bool {
        let Ok(mime) = Mime::from_str(content_type) else {
            return false;
        };
        let essence = mime.essence_str().to_ascii_lowercase();
        let top = mime.type_().as_str().to_ascii_lowercase();

        self.allowed.iter().any(|entry| match entry.strip_suffix("/*") {
            Some(wildcard) => wildcard == top,
            None => *entry == essence,
        })
    }
}

#[async_trait]
impl FileFilter for MimeFilter {
    async fn check(
        &self,
        _ctx: &RequestContext,
        metadata: &PartMetadata,
    ) -> Result<FilterDecision, BoxError> {
        Ok(self.allows(&metadata.content_type).into())
    }
}

/// Accepts parts whose client filename ends in one of the listed extensions.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    allowed: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|s| s.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn allows(&self, metadata: &PartMetadata) -> bool {
        metadata
            .extension()
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed.contains(&ext))
    }
}

#[async_trait]
impl FileFilter for ExtensionFilter {
    async fn check(
        &self,
        _ctx: &RequestContext,
        metadata: &PartMetadata,
    ) -> Result<FilterDecision, BoxError> {
        Ok(self.allows(metadata).into())
    }
}

/// Filters selectable by name from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPreset {
    /// Any `image/*` media type
    Images,
    /// Common document extensions
    Documents,
    /// Accept everything
    None,
}

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "csv", "doc", "docx", "odt", "rtf"];

impl FilterPreset {
    pub fn build(self) -> Option<Arc<dyn FileFilter>> {
        match self {
            FilterPreset::Images => Some(Arc::new(MimeFilter::new(["image/*"]))),
            FilterPreset::Documents => Some(Arc::new(ExtensionFilter::new(DOCUMENT_EXTENSIONS))),
            FilterPreset::None => None,
        }
    }
}

impl FromStr for FilterPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "images" => Ok(FilterPreset::Images),
            "documents" => Ok(FilterPreset::Documents),
            "none" => Ok(FilterPreset::None),
            _ => Err(format!("Unknown file filter: {}", s)),
        }
    }
}
