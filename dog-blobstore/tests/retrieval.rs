mod support;

use std::sync::Arc;

use dog_blobstore::{
    BlobAdapter, BlobConfig, ByteRange, ErrorKind, MemoryStore, StorageBackend, UploadRules,
    DEFAULT_CONTENT_TYPE,
};

use support::{payload, read_all, stream_of, Call, RecordingBackend};

fn adapter() -> (BlobAdapter, RecordingBackend) {
    let backend = RecordingBackend::new(MemoryStore::new().with_min_part_size(16));
    let config = BlobConfig::new().with_upload_rules(
        UploadRules::new()
            .with_part_size(64)
            .with_min_multipart_size(16),
    );
    let blobs = BlobAdapter::with_backend(Arc::new(backend.clone()), config).unwrap();
    (blobs, backend)
}

async fn seed(blobs: &BlobAdapter, key: &str, data: &[u8], content_type: Option<&str>) {
    blobs
        .put("media", key, Some(stream_of(data, 13)), content_type)
        .await
        .unwrap();
}

#[tokio::test]
async fn range_is_inclusive_on_both_ends() {
    let (blobs, backend) = adapter();
    let data = payload(200);
    seed(&blobs, "clip.mp4", &data, Some("video/mp4")).await;

    let opened = blobs.get("media", "clip.mp4", Some("10:20")).await.unwrap();

    assert_eq!(opened.content_length, Some(11));
    assert_eq!(opened.range, Some(ByteRange::new(10, 20)));
    assert_eq!(read_all(opened).await, &data[10..=20]);
    assert!(backend.calls().contains(&Call::Get {
        range: Some(ByteRange::new(10, 20))
    }));
}

#[tokio::test]
async fn full_read_without_range() {
    let (blobs, _) = adapter();
    let data = payload(150);
    seed(&blobs, "a", &data, Some("audio/mpeg")).await;

    for range in [None, Some("")] {
        let opened = blobs.get("media", "a", range).await.unwrap();
        assert_eq!(opened.content_type.as_deref(), Some("audio/mpeg"));
        assert!(opened.range.is_none());
        assert_eq!(read_all(opened).await, data);
    }
}

#[tokio::test]
async fn range_end_past_object_is_clamped() {
    let (blobs, _) = adapter();
    seed(&blobs, "a", b"0123456789", None).await;

    let opened = blobs.get("media", "a", Some("7:100")).await.unwrap();
    assert_eq!(read_all(opened).await, b"789");
}

#[tokio::test]
async fn malformed_range_fails_before_backend_call() {
    let (blobs, backend) = adapter();
    seed(&blobs, "a", b"0123456789", None).await;
    let before = backend.calls().len();

    for text in ["abc:10", "10", "1:2:3", "-1:4", "5:"] {
        let err = blobs.get("media", "a", Some(text)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange, "{text}");
    }
    assert_eq!(backend.calls().len(), before);
}

#[tokio::test]
async fn range_outside_object_is_not_satisfiable() {
    let (blobs, _) = adapter();
    seed(&blobs, "a", b"0123456789", None).await;

    let err = blobs.get("media", "a", Some("10:12")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeNotSatisfiable);

    let err = blobs.get("media", "a", Some("5:2")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RangeNotSatisfiable);
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let (blobs, _) = adapter();

    let err = blobs.get("media", "nope", None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (blobs, backend) = adapter();
    seed(&blobs, "a", b"payload", None).await;

    blobs.delete("media", "a").await.unwrap();
    blobs.delete("media", "a").await.unwrap();
    assert_eq!(backend.count(|c| matches!(c, Call::Delete)), 2);

    let err = blobs.get("media", "a", None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_tolerates_backend_not_found() {
    let (blobs, backend) = adapter();
    backend.fail(|f| f.delete_not_found = true);

    blobs.delete("media", "never-stored").await.unwrap();
}

#[tokio::test]
async fn list_reports_metadata_without_reading_bodies() {
    let (blobs, backend) = adapter();
    seed(&blobs, "b.mp3", &payload(100), Some("audio/mpeg")).await;
    seed(&blobs, "a.txt", b"hello", None).await;

    let listed = blobs.list("media").await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].key, "a.txt");
    assert_eq!(listed[0].content_length, 5);
    assert_eq!(listed[0].content_type, DEFAULT_CONTENT_TYPE);
    assert_eq!(listed[0].location_hint, "memory://media/a.txt");
    assert_eq!(listed[1].key, "b.mp3");
    assert_eq!(listed[1].content_length, 100);
    assert_eq!(listed[1].content_type, "audio/mpeg");
    assert!(listed.iter().all(|m| m.last_modified.is_some()));

    assert_eq!(backend.count(|c| matches!(c, Call::Get { .. })), 0);
}

#[tokio::test]
async fn list_of_unknown_bucket_is_empty() {
    let (blobs, _) = adapter();
    assert!(blobs.list("elsewhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_bucket_name_is_invalid_input() {
    let (blobs, backend) = adapter();

    assert_eq!(
        blobs.list("").await.unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(
        blobs.delete("", "k").await.unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn multipart_object_reads_back_across_part_boundaries() {
    let (blobs, backend) = adapter();
    let data = payload(300);
    seed(&blobs, "big", &data, None).await;
    assert!(backend.completes() >= 1);

    let opened = blobs.get("media", "big", Some("60:130")).await.unwrap();
    assert_eq!(read_all(opened).await, &data[60..=130]);

    let direct = backend
        .inner
        .get_object("media", "big", Some(ByteRange::new(0, 0)))
        .await
        .unwrap();
    assert_eq!(read_all(direct).await, &data[..1]);
}
