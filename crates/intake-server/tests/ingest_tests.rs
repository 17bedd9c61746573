//! Ingestion orchestrator integration tests

mod common;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use common::*;
use futures::{stream, StreamExt};
use http::{header::CONTENT_TYPE, Request};
use intake_common::{Location, StoredFile};
use intake_server::{
    error::{LimitExceeded, LimitKind},
    ingest::{
        filter_fn, FilePart, FilterDecision, Ingestor, Limits, MimeFilter, Processed,
        RequestContext, SourceError,
    },
    storage::{DiskStorage, MemoryStorage, StorageEngine},
    IngestError, IngestResult,
};
use std::io;

/// Engine that skips stream errors and reports success for whatever it read
#[derive(Debug, Clone)]
struct LenientStorage;

#[async_trait]
impl StorageEngine for LenientStorage {
    async fn store(&self, _ctx: &RequestContext, part: FilePart) -> IngestResult<StoredFile> {
        let (metadata, mut stream) = part.into_parts();
        let mut size = 0u64;
        while let Some(item) = stream.next().await {
            if let Ok(chunk) = item {
                size += chunk.len() as u64;
            }
        }
        Ok(StoredFile::new(
            metadata,
            Location::Memory {
                buffer: Bytes::new(),
                size,
            },
        ))
    }

    async fn discard(&self, _ctx: &RequestContext, _file: &StoredFile) -> IngestResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_username_and_avatar_through_memory() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = MultipartBody::new()
        .field("username", "alice")
        .file("avatar", "a.png", "image/png", &[1, 2, 3])
        .request("/profile");

    let upload = ingested(ingestor.process(request).await.unwrap());

    assert_eq!(upload.field("username"), Some("alice"));
    let avatar = upload.single("avatar").unwrap();
    assert_eq!(&avatar.buffer().unwrap()[..], &[1u8, 2, 3]);
    assert_eq!(avatar.size(), 3);
    assert_eq!(avatar.metadata.file_name, "a.png");
    assert_eq!(avatar.metadata.content_type, "image/png");
    assert_eq!(upload.file_count(), 1);
}

#[tokio::test]
async fn test_non_multipart_passes_through_untouched() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = Request::post("/profile")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"username":"alice"}"#))
        .unwrap();

    match ingestor.process(request).await.unwrap() {
        Processed::PassThrough(request) => {
            let body = body_bytes(request.into_body()).await;
            assert_eq!(&body[..], br#"{"username":"alice"}"#);
        },
        other => panic!("expected pass-through, got {:?}", other),
    }
}

#[tokio::test]
async fn test_request_without_content_type_passes_through() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = Request::post("/").body(Body::empty()).unwrap();
    assert!(matches!(
        ingestor.process(request).await.unwrap(),
        Processed::PassThrough(_)
    ));
}

#[tokio::test]
async fn test_repeated_field_last_write_wins() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = MultipartBody::new()
        .field("tag", "first")
        .field("tag", "second")
        .request("/");

    let upload = ingested(ingestor.process(request).await.unwrap());
    assert_eq!(upload.field("tag"), Some("second"));
}

#[tokio::test]
async fn test_files_keep_arrival_order_per_field() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = MultipartBody::new()
        .file("docs", "1.txt", "text/plain", b"one")
        .file("cover", "c.png", "image/png", b"img")
        .file("docs", "2.txt", "text/plain", b"two")
        .file("docs", "3.txt", "text/plain", b"three")
        .request("/");

    let upload = ingested(ingestor.process(request).await.unwrap());
    let names: Vec<_> = upload
        .files_for("docs")
        .iter()
        .map(|f| f.metadata.file_name.as_str())
        .collect();
    assert_eq!(names, ["1.txt", "2.txt", "3.txt"]);
    assert_eq!(upload.files_for("cover").len(), 1);
}

#[tokio::test]
async fn test_rejected_part_is_skipped_without_failing() {
    let storage = RecordingStorage::new(MemoryStorage::new());
    let ingestor = Ingestor::builder()
        .file_filter(MimeFilter::new(["image/*"]))
        .storage(storage.clone())
        .build()
        .unwrap();

    let request = MultipartBody::new()
        .file("attachment", "notes.txt", "text/plain", b"not an image")
        .field("username", "alice")
        .file("avatar", "a.png", "image/png", &[1, 2, 3])
        .request("/");

    let upload = ingested(ingestor.process(request).await.unwrap());

    assert!(upload.files_for("attachment").is_empty());
    assert_eq!(upload.single("avatar").unwrap().size(), 3);
    assert_eq!(upload.field("username"), Some("alice"));
    assert_eq!(storage.stores(), 1);
}

#[tokio::test]
async fn test_filter_error_fails_request() {
    let storage = RecordingStorage::new(MemoryStorage::new());
    let ingestor = Ingestor::builder()
        .file_filter(filter_fn(|_ctx, meta| {
            if meta.file_name.ends_with(".exe") {
                Err("executables are not allowed".into())
            } else {
                Ok(FilterDecision::Accept)
            }
        }))
        .storage(storage.clone())
        .build()
        .unwrap();

    let request = MultipartBody::new()
        .file("upload", "setup.exe", "application/octet-stream", b"MZ")
        .request("/");

    match ingestor.process(request).await {
        Err(IngestError::FileFilter {
            filename, field, ..
        }) => {
            assert_eq!(filename, "setup.exe");
            assert_eq!(field, "upload");
        },
        other => panic!("expected file filter error, got {:?}", other),
    }
    assert_eq!(storage.stores(), 0);
}

#[tokio::test]
async fn test_file_size_limit_fails_and_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let ingestor = Ingestor::builder()
        .limits(Limits::none().file_size(4))
        .storage(DiskStorage::new(dir.path()))
        .build()
        .unwrap();

    let request = MultipartBody::new()
        .field("username", "alice")
        .file("avatar", "big.bin", "application/octet-stream", &[7u8; 64])
        .request("/");

    match ingestor.process(request).await {
        Err(IngestError::FileSizeLimit {
            filename,
            field,
            limit,
        }) => {
            assert_eq!(filename, "big.bin");
            assert_eq!(field, "avatar");
            assert_eq!(limit, Some(4));
        },
        other => panic!("expected file size limit, got {:?}", other),
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "truncated file left behind: {:?}", leftovers);
}

#[tokio::test]
async fn test_file_at_exact_limit_is_stored() {
    let ingestor = Ingestor::builder()
        .limits(Limits::none().file_size(3))
        .build()
        .unwrap();
    let request = MultipartBody::new()
        .file("avatar", "a.png", "image/png", &[1, 2, 3])
        .request("/");

    let upload = ingested(ingestor.process(request).await.unwrap());
    assert_eq!(upload.single("avatar").unwrap().size(), 3);
}

#[tokio::test]
async fn test_count_limits_fail_as_parse_errors() {
    let ingestor = Ingestor::builder()
        .limits(Limits::none().files(1))
        .build()
        .unwrap();
    let request = MultipartBody::new()
        .file("docs", "1.txt", "text/plain", b"one")
        .file("docs", "2.txt", "text/plain", b"two")
        .request("/");

    let err = ingestor.process(request).await.unwrap_err();
    assert_eq!(err.code(), "FORM_PARSING_ERROR");
    assert!(err.to_string().contains("file count limit of 1"));
}

#[tokio::test]
async fn test_field_size_limit() {
    let ingestor = Ingestor::builder()
        .limits(Limits::none().field_size(5))
        .build()
        .unwrap();
    let request = MultipartBody::new()
        .field("bio", "much longer than five bytes")
        .request("/");

    let err = ingestor.process(request).await.unwrap_err();
    assert_eq!(err.code(), "FORM_PARSING_ERROR");
}

#[tokio::test]
async fn test_truncated_body_is_form_parsing_error() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = Request::post("/")
        .header(CONTENT_TYPE, MultipartBody::content_type())
        .body(Body::from(format!(
            "--{}\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\nalice",
            BOUNDARY
        )))
        .unwrap();

    let err = ingestor.process(request).await.unwrap_err();
    assert!(matches!(err, IngestError::FormParsing(_)), "{:?}", err);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_multipart_without_boundary_is_form_parsing_error() {
    let ingestor = Ingestor::builder().build().unwrap();
    let request = Request::post("/")
        .header(CONTENT_TYPE, "multipart/form-data")
        .body(Body::empty())
        .unwrap();

    let err = ingestor.process(request).await.unwrap_err();
    assert_eq!(err.code(), "FORM_PARSING_ERROR");
}

#[tokio::test]
async fn test_body_failure_mid_file_is_request_stream_error() {
    let head = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"a.bin\"\r\n\r\npartial",
        BOUNDARY
    );
    let body = Body::from_stream(stream::iter(vec![
        Ok(Bytes::from(head)),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ]));
    let request = Request::post("/")
        .header(CONTENT_TYPE, MultipartBody::content_type())
        .body(body)
        .unwrap();

    let ingestor = Ingestor::builder().build().unwrap();
    let err = ingestor.process(request).await.unwrap_err();
    assert!(matches!(err, IngestError::RequestStream(_)), "{:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_source_failure_between_parts() {
    let ingestor = Ingestor::builder().build().unwrap();
    let mut source = ScriptedSource::new(vec![
        field("username", "alice"),
        Err(SourceError::Transport("socket closed".into())),
        field("never", "read"),
    ]);

    let err = ingestor
        .ingest(&RequestContext::default(), &mut source)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REQUEST_STREAM_ERROR");
    assert_eq!(source.pulled, 2);
}

#[tokio::test]
async fn test_parser_size_signal_is_file_size_limit() {
    let storage = RecordingStorage::new(MemoryStorage::new());
    let ingestor = Ingestor::builder().storage(storage.clone()).build().unwrap();
    let mut source = ScriptedSource::new(vec![file(failing_part(
        "avatar",
        "big.bin",
        b"abc",
        SourceError::Limit(LimitExceeded {
            kind: LimitKind::FileSize,
            max: 3,
            field: Some("avatar".to_string()),
        }),
    ))]);

    match ingestor.ingest(&RequestContext::default(), &mut source).await {
        Err(IngestError::FileSizeLimit {
            filename, limit, ..
        }) => {
            assert_eq!(filename, "big.bin");
            assert_eq!(limit, Some(3));
        },
        other => panic!("expected file size limit, got {:?}", other),
    }
    assert_eq!(storage.stores(), 1);
}

#[tokio::test]
async fn test_parser_failure_inside_file_overrides_engine_error() {
    let ingestor = Ingestor::builder().build().unwrap();
    let mut source = ScriptedSource::new(vec![file(failing_part(
        "avatar",
        "a.bin",
        b"abc",
        SourceError::Malformed("bad part header".into()),
    ))]);

    let err = ingestor
        .ingest(&RequestContext::default(), &mut source)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORM_PARSING_ERROR");
}

#[tokio::test]
async fn test_plain_stream_error_surfaces_engine_error() {
    let ingestor = Ingestor::builder().build().unwrap();
    let part = intake_server::ingest::FilePart::new(
        intake_common::PartMetadata::new("avatar", "a.bin"),
        stream::iter(vec![Err(io::Error::new(io::ErrorKind::Other, "disk cache gone"))]),
    );
    let mut source = ScriptedSource::new(vec![file(part)]);

    let err = ingestor
        .ingest(&RequestContext::default(), &mut source)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MEMORY_STORAGE_ERROR");
}

#[tokio::test]
async fn test_every_accepted_part_is_stored_once() {
    let storage = RecordingStorage::new(MemoryStorage::new());
    let ingestor = Ingestor::builder().storage(storage.clone()).build().unwrap();
    let mut source = ScriptedSource::new(vec![
        file(file_part("a", "1.bin", b"1")),
        field("note", "hi"),
        file(file_part("b", "2.bin", b"22")),
        file(file_part("a", "3.bin", b"333")),
    ]);

    let upload = ingestor
        .ingest(&RequestContext::default(), &mut source)
        .await
        .unwrap();
    assert_eq!(storage.stores(), 3);
    assert_eq!(storage.discards(), 0);
    assert_eq!(upload.file_count(), 3);
    assert_eq!(upload.field("note"), Some("hi"));
}

#[tokio::test]
async fn test_stored_file_is_discarded_after_size_breach() {
    let storage = RecordingStorage::new(LenientStorage);
    let ingestor = Ingestor::builder()
        .limits(Limits::none().file_size(4))
        .storage(storage.clone())
        .build()
        .unwrap();
    let mut source =
        ScriptedSource::new(vec![file(file_part("avatar", "big.bin", b"0123456789"))]);

    match ingestor.ingest(&RequestContext::default(), &mut source).await {
        Err(IngestError::FileSizeLimit {
            filename, limit, ..
        }) => {
            assert_eq!(filename, "big.bin");
            assert_eq!(limit, Some(4));
        },
        other => panic!("expected file size limit, got {:?}", other),
    }
    assert_eq!(storage.stores(), 1);
    assert_eq!(storage.discards(), 1);
}
