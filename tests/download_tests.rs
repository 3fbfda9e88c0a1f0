//! Tests for the download module functionality.
//!
//! - Request construction from URLs and content providers
//! - The item state machine and retry budget
//! - Hash verification and type detection

use async_trait::async_trait;
use haul::download::{
    detect_hash_type, verify_hash, ContentInfo, ContentProvider, DownloadItem, DownloadRequest,
    HashType, ResolvedContent, SourceRef, Status,
};
use haul::Error;
use serde_json::Value;
use std::collections::HashMap;

mod common;
use common::helpers::*;

/// Well-formed SHA-256 digest matching none of the test files.
const OTHER_SHA256: &str = "1ee98ec2c3fb1ef7d9e6a2e3d2fc8bb6f9f3e8a37c4ad6bcd8cc2a2a05c8b0a1";

struct CatalogProvider {
    entries: HashMap<String, ResolvedContent>,
}

#[async_trait]
impl ContentProvider for CatalogProvider {
    async fn resolve(&self, content_id: &str) -> Result<ResolvedContent, Error> {
        self.entries
            .get(content_id)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown content {}", content_id)))
    }
}

fn create_catalog() -> CatalogProvider {
    let mut entries = HashMap::new();
    entries.insert(
        "tt0111161".to_string(),
        ResolvedContent {
            source_url: "https://cdn.example.com/media/shawshank.mkv".to_string(),
            file_name: "shawshank.mkv".to_string(),
            mime_type: Some("video/x-matroska".to_string()),
            size: 8 * MIB,
            checksum: None,
        },
    );
    CatalogProvider { entries }
}

fn create_test_item() -> DownloadItem {
    let request = create_test_request(std::path::Path::new("/tmp/haul"), "file.zip", MIB);
    DownloadItem::new(request.source, request.content, request.transfer, 3)
}

// === Requests ===

#[test]
fn test_from_url_decodes_filename() {
    let request = DownloadRequest::from_url(
        "https://example.com/media/Big%20Buck%20Bunny.mkv?token=abc",
        "/downloads",
        SourceRef::new("svc-1", "radarr"),
        ContentInfo::new("Big Buck Bunny", "movie"),
    )
    .unwrap();

    assert_eq!(request.transfer.file_name, "Big Buck Bunny.mkv");
    assert!(request.transfer.destination_path.ends_with("Big Buck Bunny.mkv"));
    assert!(request.max_retries.is_none());
}

#[test]
fn test_from_url_uses_size_hint() {
    let dir = create_temp_dir();
    let request = create_test_request(dir.path(), "file.zip", 42);
    assert_eq!(request.transfer.expected_size, 42);
    assert_eq!(request.transfer.destination_path, dir.path().join("file.zip"));
}

#[test]
fn test_from_url_rejects_missing_filename() {
    let result = DownloadRequest::from_url(
        "https://example.com/library/",
        "/downloads",
        SourceRef::new("svc-1", "radarr"),
        ContentInfo::new("Library", "movie"),
    );
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn test_request_overrides() {
    let dir = create_temp_dir();
    let request = create_test_request(dir.path(), "file.zip", MIB)
        .max_retries(7)
        .checksum(OTHER_SHA256);
    assert_eq!(request.max_retries, Some(7));
    assert_eq!(request.transfer.checksum.as_deref(), Some(OTHER_SHA256));
}

#[tokio::test]
async fn test_request_from_provider() {
    let provider = create_catalog();
    let dir = create_temp_dir();

    let resolved = provider.resolve("tt0111161").await.unwrap();
    let request = DownloadRequest::from_resolved(
        SourceRef::new("radarr-main", "radarr"),
        ContentInfo::new("The Shawshank Redemption", "movie"),
        resolved,
        dir.path(),
    );

    assert_eq!(request.content.size_hint, Some(8 * MIB));
    assert_eq!(request.transfer.expected_size, 8 * MIB);
    assert_eq!(request.transfer.mime_type.as_deref(), Some("video/x-matroska"));
    assert_eq!(request.transfer.destination_path, dir.path().join("shawshank.mkv"));

    let missing = provider.resolve("tt0000000").await;
    assert!(matches!(missing, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_provider_request_is_downloaded() {
    let provider = create_catalog();
    let dir = create_temp_dir();
    let executor = MockExecutor::new(Mode::Complete);
    let manager = create_test_manager(&executor, dir.path(), 1).await;

    let request = DownloadRequest::from_resolved(
        SourceRef::new("radarr-main", "radarr"),
        ContentInfo::new("The Shawshank Redemption", "movie"),
        provider.resolve("tt0111161").await.unwrap(),
        dir.path(),
    );
    let id = manager.add_download(request).await.unwrap();

    let item = wait_for_status(&manager, id, Status::Completed).await;
    assert_eq!(item.source.service_type, "radarr");
    assert_file_exists(&dir.path().join("shawshank.mkv"));
}

// === State machine ===

#[test]
fn test_new_item_is_pending() {
    let item = create_test_item();
    assert_eq!(item.status(), Status::Pending);
    assert_eq!(item.state.total_bytes, MIB);
    assert_eq!(item.state.retry_count, 0);
    assert!(item.state.completed_at.is_none());
}

#[test]
fn test_illegal_transitions_are_refused() {
    let mut item = create_test_item();
    assert!(!item.transition(Status::Completed));
    assert!(!item.transition(Status::Paused));
    assert_eq!(item.status(), Status::Pending);

    assert!(item.transition(Status::Cancelled));
    assert!(!item.transition(Status::Pending));
    assert!(!item.transition(Status::Cancelled));
}

#[test]
fn test_retry_budget_is_consumed() {
    let mut item = create_test_item();
    for attempt in 1..=3 {
        assert!(item.transition(Status::Downloading));
        item.record_progress(MIB / 2, MIB, 10.0, 5.0);
        assert!(item.fail("Network connection error: reset"));
        assert!(item.prepare_retry());
        assert_eq!(item.state.retry_count, attempt);
        assert_eq!(item.state.bytes_downloaded, 0);
    }

    assert!(item.transition(Status::Downloading));
    assert!(item.fail("Network connection error: reset"));
    assert!(!item.can_retry());
    assert!(!item.prepare_retry());
    assert_eq!(item.status(), Status::Failed);
}

#[test]
fn test_completion_fills_counters() {
    let mut item = create_test_item();
    item.transition(Status::Downloading);
    item.record_progress(MIB / 4, MIB, 100.0, 3.0);
    assert!(item.complete());

    assert_eq!(item.state.progress, 1.0);
    assert_eq!(item.state.bytes_downloaded, MIB);
    assert_eq!(item.state.speed, 0.0);
    assert!(item.state.completed_at.is_some());
}

#[test]
fn test_item_json_shape() {
    let item = create_test_item();
    let json: Value = serde_json::to_value(&item).unwrap();

    assert_eq!(json["state"]["status"], "pending");
    assert_eq!(json["source"]["serviceType"], "radarr");
    assert_eq!(json["transfer"]["fileName"], "file.zip");
    assert_eq!(json["state"]["maxRetries"], 3);
}

// === Hashes ===

#[test]
fn test_detect_hash_type() {
    assert_eq!(detect_hash_type(OTHER_SHA256), Some(HashType::Sha256));
    let prefixed = format!("sha256:{}", OTHER_SHA256.to_uppercase());
    assert_eq!(detect_hash_type(&prefixed), Some(HashType::Sha256));
    assert_eq!(detect_hash_type("d41d8cd98f00b204e9800998ecf8427e"), None);
}

#[test]
fn test_verify_hash() {
    let dir = create_temp_dir();
    let path = create_temp_file(dir.path(), "empty.bin", b"");
    let empty = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    assert!(verify_hash(&path, Some(empty)).unwrap());
    assert!(verify_hash(&path, None).unwrap());
    assert!(!verify_hash(&path, Some(OTHER_SHA256)).unwrap());
    assert!(!verify_hash(&dir.path().join("absent.bin"), Some(empty)).unwrap());
}
