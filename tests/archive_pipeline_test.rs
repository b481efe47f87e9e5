//! Integration tests for the download, upload and cleanup sequence.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use feed_media_archiver::archiver::{ArchiveJob, ArchiveOutcome, ArchivePipeline, GalleryDl};
use feed_media_archiver::chibisafe::{ChibisafeClient, SettingsCache, Uploader};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A stand-in for gallery-dl that writes two images into `--dest`.
fn fake_downloader(bin: &Path) -> GalleryDl {
    let script = bin.join("gallery-dl");
    std::fs::write(
        &script,
        "#!/bin/sh\nprintf one > \"$2/001.jpg\"\nprintf two > \"$2/002.png\"\nprintf '{}' > \"$2/meta.json\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    GalleryDl::new(script.to_string_lossy())
}

fn job() -> ArchiveJob {
    ArchiveJob {
        hash: "abc123".to_string(),
        url: "https://www.patreon.com/posts/1".to_string(),
        author: "Jane".to_string(),
        category: "Patreon".to_string(),
        title: "My Post".to_string(),
        published_at: DateTime::parse_from_rfc3339("2024-03-15T10:00:00Z").unwrap(),
    }
}

async fn chibisafe(upload_status: u16) -> (MockServer, Uploader) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"useNetworkStorage": false})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/albums"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"albums": [{"uuid": "album-1", "name": "Patreon"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"tags": [{"uuid": "tag-1", "name": "Jane"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(upload_status).set_body_json(json!({"uuid": "f"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/file/f/tag/tag-1$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ChibisafeClient::new(&server.uri(), "k", Duration::from_secs(5)).unwrap();
    let settings = Arc::new(SettingsCache::new(client.clone(), None));
    (server, Uploader::new(client, settings))
}

fn expected_dir(base: &Path) -> PathBuf {
    base.join("Jane - Patreon")
        .join("2024")
        .join("03 - March")
        .join("abc123")
}

#[tokio::test]
async fn test_upload_then_cleanup_prunes_to_base() {
    let bin = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    let (_server, uploader) = chibisafe(200).await;

    let pipeline = ArchivePipeline::new(base.path(), fake_downloader(bin.path()), Some(uploader), true);
    let outcome = pipeline.run(&job()).await.unwrap();

    let ArchiveOutcome::Uploaded {
        dir,
        report,
        cleanup,
    } = outcome
    else {
        panic!("expected an upload outcome");
    };
    assert_eq!(dir, expected_dir(base.path()));
    assert_eq!(report.uploaded.len(), 2);
    assert_eq!(report.skipped, 1);

    let cleanup = cleanup.expect("cleanup should run after a complete upload");
    assert_eq!(cleanup.files_removed, 3);
    assert!(cleanup.dir_removed);

    assert!(!dir.exists());
    assert!(!base.path().join("Jane - Patreon").exists());
    assert!(base.path().exists());
}

#[tokio::test]
async fn test_failed_upload_keeps_local_files() {
    let bin = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    let (_server, uploader) = chibisafe(500).await;

    let pipeline = ArchivePipeline::new(base.path(), fake_downloader(bin.path()), Some(uploader), true);
    let outcome = pipeline.run(&job()).await.unwrap();

    let ArchiveOutcome::Uploaded {
        dir,
        report,
        cleanup,
    } = outcome
    else {
        panic!("expected an upload outcome");
    };
    assert_eq!(report.failed, 2);
    assert!(cleanup.is_none());
    assert!(dir.join("001.jpg").exists());
}

#[tokio::test]
async fn test_cleanup_disabled_keeps_files() {
    let bin = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    let (_server, uploader) = chibisafe(200).await;

    let pipeline = ArchivePipeline::new(base.path(), fake_downloader(bin.path()), Some(uploader), false);
    let ArchiveOutcome::Uploaded { dir, cleanup, .. } = pipeline.run(&job()).await.unwrap() else {
        panic!("expected an upload outcome");
    };
    assert!(cleanup.is_none());
    assert!(dir.join("002.png").exists());
}

#[tokio::test]
async fn test_download_failure_is_error() {
    let bin = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    let script = bin.path().join("gallery-dl");
    std::fs::write(&script, "#!/bin/sh\necho 'no extractor' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let pipeline = ArchivePipeline::new(
        base.path(),
        GalleryDl::new(script.to_string_lossy()),
        None,
        false,
    );
    let err = pipeline.run(&job()).await.unwrap_err();
    assert!(format!("{err:#}").contains("no extractor"));
}
