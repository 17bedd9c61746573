//! Aggregated result of one ingestion

use intake_common::StoredFile;
use serde::Serialize;
use std::collections::BTreeMap;

/// Text fields and stored files of a completed multipart request.
///
/// Only produced after the whole body was consumed without error. Files
/// under the same field name keep their arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Upload {
    fields: BTreeMap<String, String>,
    files: BTreeMap<String, Vec<StoredFile>>,
}

impl Upload {
    /// Last value wins when a field name repeats.
    pub(crate) fn set_field(&mut self, name: String, value: String) {
        self.fields.insert(name, value);
    }

    pub(crate) fn push_file(&mut self, file: StoredFile) {
        self.files
            .entry(file.metadata.field_name.clone())
            .or_default()
            .push(file);
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<StoredFile>> {
        &self.files
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn files_for(&self, name: &str) -> &[StoredFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// First file stored under `name`
    pub fn single(&self, name: &str) -> Option<&StoredFile> {
        self.files_for(name).first()
    }

    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    pub fn into_parts(self) -> (BTreeMap<String, String>, BTreeMap<String, Vec<StoredFile>>) {
        (self.fields, self.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_common::{Location, PartMetadata};

    fn relayed(field: &str, name: &str) -> StoredFile {
        StoredFile::new(
            PartMetadata::new(field, name),
            Location::Relay {
                host: "localhost".to_string(),
                port: 9999,
                bytes_transferred: 1,
            },
        )
    }

    #[test]
    fn test_fields_last_write_wins() {
        let mut upload = Upload::default();
        upload.set_field("tag".to_string(), "a".to_string());
        upload.set_field("tag".to_string(), "b".to_string());
        assert_eq!(upload.field("tag"), Some("b"));
        assert_eq!(upload.fields().len(), 1);
    }

    #[test]
    fn test_files_keep_arrival_order() {
        let mut upload = Upload::default();
        upload.push_file(relayed("docs", "1.txt"));
        upload.push_file(relayed("other", "x.txt"));
        upload.push_file(relayed("docs", "2.txt"));

        let names: Vec<_> = upload
            .files_for("docs")
            .iter()
            .map(|f| f.metadata.file_name.as_str())
            .collect();
        assert_eq!(names, ["1.txt", "2.txt"]);
        assert_eq!(upload.file_count(), 3);
        assert_eq!(upload.single("other").unwrap().metadata.file_name, "x.txt");
        assert!(upload.files_for("missing").is_empty());
    }
}
