//! Request limits

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, LimitExceeded, LimitKind};

/// Named bounds applied to one request. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum bytes in a single file part
    #[serde(alias = "fileSize")]
    pub file_size: Option<u64>,
    /// Maximum bytes in a single text field value
    #[serde(alias = "fieldSize")]
    pub field_size: Option<u64>,
    /// Maximum number of file parts
    pub files: Option<u64>,
    /// Maximum number of text fields
    pub fields: Option<u64>,
    /// Maximum number of parts of either kind
    pub parts: Option<u64>,
}

impl Limits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn file_size(mut self, bytes: u64) -> Self {
        self.file_size = Some(bytes);
        self
    }

    pub fn field_size(mut self, bytes: u64) -> Self {
        self.field_size = Some(bytes);
        self
    }

    pub fn files(mut self, count: u64) -> Self {
        self.files = Some(count);
        self
    }

    pub fn fields(mut self, count: u64) -> Self {
        self.fields = Some(count);
        self
    }

    pub fn parts(mut self, count: u64) -> Self {
        self.parts = Some(count);
        self
    }

    /// Byte limits must be positive; count limits may be zero to forbid a kind of part.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.file_size == Some(0) {
            return Err(IngestError::configuration(
                "limits.file_size",
                "must be greater than 0",
            ));
        }
        if self.field_size == Some(0) {
            return Err(IngestError::configuration(
                "limits.field_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Running part counts for one request, checked against [`Limits`]
#[derive(Debug, Default)]
pub(crate) struct Tally {
    files: u64,
    fields: u64,
}

impl Tally {
    pub(crate) fn count_field(&mut self, limits: &Limits, name: &str) -> Result<(), LimitExceeded> {
        self.fields += 1;
        check(LimitKind::Fields, self.fields, limits.fields, name)?;
        check(LimitKind::Parts, self.files + self.fields, limits.parts, name)
    }

    pub(crate) fn count_file(&mut self, limits: &Limits, name: &str) -> Result<(), LimitExceeded> {
        self.files += 1;
        check(LimitKind::Files, self.files, limits.files, name)?;
        check(LimitKind::Parts, self.files + self.fields, limits.parts, name)
    }
}

fn check(kind: LimitKind, seen: u64, max: Option<u64>, name: &str) -> Result<(), LimitExceeded> {
    match max {
        Some(max) if seen > max => Err(LimitExceeded {
            kind,
            max,
            field: Some(name.to_string()),
        }),
        _ => Ok(()),
    }
}
