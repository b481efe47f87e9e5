//! Directory uploads to Chibisafe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{multipart, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ensure_created_or_ok, AlbumTagResolver, ChibisafeClient, SettingsCache, ALBUM_HEADER};
use crate::archiver::sanitize_for_path;

/// Extensions that are uploaded. Everything else in an entry directory
/// (gallery-dl metadata, text files) is skipped.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "svg", "mp4",
];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for an upload name, by extension.
#[must_use]
pub fn content_type_for(name: &str) -> String {
    let ext = extension_lowercase(Path::new(name)).unwrap_or_default();

    let known = match ext.as_str() {
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "avi" => Some("video/x-msvideo"),
        "mov" => Some("video/quicktime"),
        "wmv" => Some("video/x-ms-wmv"),
        "mkv" => Some("video/x-matroska"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tiff" => Some("image/tiff"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    };

    known.map(str::to_string).unwrap_or_else(|| {
        mime_guess::from_ext(&ext)
            .first()
            .map_or_else(|| FALLBACK_CONTENT_TYPE.to_string(), |m| m.to_string())
    })
}

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn is_supported(path: &Path) -> bool {
    extension_lowercase(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Names the files are uploaded under, derived from the entry title.
///
/// One file keeps the bare title; several are numbered from 1 in order.
/// The original extension (with its case) is kept.
#[must_use]
pub fn upload_names(title: &str, files: &[PathBuf]) -> Vec<String> {
    let title = sanitize_for_path(title);
    let single = files.len() == 1;

    files
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            if single {
                format!("{title}{ext}")
            } else {
                format!("{title}-{}{ext}", i + 1)
            }
        })
        .collect()
}

/// Pull the file UUID out of an upload-process response.
///
/// Servers answer with `{"file": {"uuid"}}`, `{"uuid"}` or `{"files": [{"uuid"}]}`.
#[must_use]
pub fn extract_file_uuid(body: &Value) -> Option<String> {
    ["/file/uuid", "/uuid", "/files/0/uuid"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .find(|uuid| !uuid.is_empty())
        .map(str::to_string)
}

/// A file ready to be sent.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

/// A file that made it to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub name: String,
    pub uuid: String,
}

/// Outcome of a directory upload.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedFile>,
    pub failed: usize,
    pub skipped: usize,
}

impl UploadReport {
    /// Every eligible file was uploaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    url: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectUploadResponse {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    public_url: Option<String>,
}

/// How file bytes reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One multipart POST to the API.
    Direct,
    /// Ask for a pre-signed storage URL, PUT the bytes there, then have the
    /// API process the stored object.
    SignedUrl,
}

impl UploadStrategy {
    #[must_use]
    pub fn from_network_storage(use_network_storage: bool) -> Self {
        if use_network_storage {
            Self::SignedUrl
        } else {
            Self::Direct
        }
    }

    /// Upload one file and return its server UUID.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails or no UUID comes back.
    pub async fn upload(
        self,
        client: &ChibisafeClient,
        file: &PendingUpload,
        album: Option<&str>,
    ) -> Result<String> {
        match self {
            Self::Direct => upload_direct(client, file, album).await,
            Self::SignedUrl => upload_signed(client, file, album).await,
        }
    }
}

async fn upload_direct(
    client: &ChibisafeClient,
    file: &PendingUpload,
    album: Option<&str>,
) -> Result<String> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;

    debug!(
        name = %file.name,
        size = file.size,
        content_type = %file.content_type,
        "Starting direct upload"
    );

    let mut part = multipart::Part::bytes(bytes)
        .file_name(file.name.clone())
        .mime_str(&file.content_type)
        .context("Invalid content type")?;
    if extension_lowercase(Path::new(&file.name)).as_deref() == Some("mp4") {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-transfer-encoding",
            HeaderValue::from_static("binary"),
        );
        part = part.headers(headers);
    }
    let form = multipart::Form::new().part("files", part);

    let mut request = client.request(Method::POST, "/api/upload").multipart(form);
    if let Some(album) = album {
        request = request.header(ALBUM_HEADER, album);
    }

    let response = request.send().await.context("Failed to send upload")?;
    let response = ensure_created_or_ok(response, "Direct upload").await?;
    let uploaded: DirectUploadResponse = response
        .json()
        .await
        .context("Failed to decode upload response")?;

    if uploaded.uuid.is_empty() {
        anyhow::bail!("Upload response for {} has no file uuid", file.name);
    }

    info!(
        name = %file.name,
        server_name = %uploaded.name,
        uuid = %uploaded.uuid,
        public_url = uploaded.public_url.as_deref().unwrap_or(""),
        "Uploaded file directly"
    );
    Ok(uploaded.uuid)
}

async fn upload_signed(
    client: &ChibisafeClient,
    file: &PendingUpload,
    album: Option<&str>,
) -> Result<String> {
    debug!(
        name = %file.name,
        size = file.size,
        content_type = %file.content_type,
        "Starting signed-URL upload"
    );

    let response = client
        .request(Method::POST, "/api/upload")
        .json(&json!({
            "name": file.name,
            "size": file.size,
            "contentType": file.content_type,
        }))
        .send()
        .await
        .context("Failed to request signed URL")?;
    let response = ensure_created_or_ok(response, "Signed URL request").await?;
    let signed: SignedUrlResponse = response
        .json()
        .await
        .context("Failed to decode signed URL response")?;
    debug!(name = %file.name, identifier = %signed.identifier, "Got signed URL");

    let bytes = tokio::fs::read(&file.path)
        .await
        .with_context(|| format!("Failed to read {}", file.path.display()))?;
    let response = client
        .http()
        .put(&signed.url)
        .header(CONTENT_TYPE, &file.content_type)
        .body(bytes)
        .send()
        .await
        .context("Failed to PUT to signed URL")?;
    ensure_created_or_ok(response, "Storage upload").await?;

    let mut request = client.request(Method::POST, "/api/upload/process").json(&json!({
        "identifier": signed.identifier,
        "name": file.name,
        "type": file.content_type,
    }));
    if let Some(album) = album {
        request = request.header(ALBUM_HEADER, album);
    }
    let response = request.send().await.context("Failed to process upload")?;
    let response = ensure_created_or_ok(response, "Process upload").await?;
    let body: Value = response
        .json()
        .await
        .context("Failed to decode process response")?;

    let uuid = extract_file_uuid(&body)
        .with_context(|| format!("File uuid not found in process response: {body}"))?;

    info!(name = %file.name, uuid = %uuid, "Uploaded file via signed URL");
    Ok(uuid)
}

/// Uploads entry directories, filing them by album and tag.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: ChibisafeClient,
    settings: Arc<SettingsCache>,
    resolver: AlbumTagResolver,
}

impl Uploader {
    #[must_use]
    pub fn new(client: ChibisafeClient, settings: Arc<SettingsCache>) -> Self {
        let resolver = AlbumTagResolver::new(client.clone());
        Self {
            client,
            settings,
            resolver,
        }
    }

    /// Pick the strategy for one directory upload.
    ///
    /// Falls back to [`UploadStrategy::Direct`] when the setting cannot be read.
    pub async fn select_strategy(&self) -> UploadStrategy {
        match self.settings.use_network_storage().await {
            Ok(value) => UploadStrategy::from_network_storage(value),
            Err(e) => {
                warn!("Could not get Chibisafe settings, falling back to direct upload: {e:#}");
                UploadStrategy::Direct
            }
        }
    }

    /// Upload every supported file in `dir`.
    ///
    /// Files go into the album named after `category` and are tagged with
    /// `author`. A file that fails is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the album cannot be resolved or `dir` cannot be listed.
    pub async fn upload_directory(
        &self,
        dir: &Path,
        category: &str,
        author: &str,
        title: &str,
    ) -> Result<UploadReport> {
        let album = if category.is_empty() {
            None
        } else {
            Some(
                self.resolver
                    .resolve_album(category)
                    .await
                    .context("Failed to get or create album")?,
            )
        };

        let tag = if author.is_empty() {
            None
        } else {
            match self.resolver.resolve_tag(author).await {
                Ok(uuid) => Some(uuid),
                Err(e) => {
                    warn!(author = %author, "Failed to get or create tag: {e:#}");
                    None
                }
            }
        };

        let (files, skipped) = eligible_files(dir).await?;
        let mut report = UploadReport {
            skipped,
            ..UploadReport::default()
        };
        if files.is_empty() {
            debug!(dir = %dir.display(), "No uploadable files");
            return Ok(report);
        }

        let strategy = self.select_strategy().await;
        let names = upload_names(title, &files);

        for (path, name) in files.into_iter().zip(names) {
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat file");
                    report.failed += 1;
                    continue;
                }
            };
            let pending = PendingUpload {
                content_type: content_type_for(&name),
                path,
                name,
                size,
            };

            info!(file = %pending.path.display(), name = %pending.name, ?strategy, "Uploading file");
            let uuid = match strategy
                .upload(&self.client, &pending, album.as_deref())
                .await
            {
                Ok(uuid) => uuid,
                Err(e) => {
                    warn!(name = %pending.name, "Upload failed: {e:#}");
                    report.failed += 1;
                    continue;
                }
            };

            if let Some(tag) = tag.as_deref() {
                if let Err(e) = self.tag_file(&uuid, tag).await {
                    warn!(name = %pending.name, uuid = %uuid, "Failed to tag file: {e:#}");
                }
            }

            report.uploaded.push(UploadedFile {
                path: pending.path,
                name: pending.name,
                uuid,
            });
        }

        Ok(report)
    }

    /// Attach a tag to an uploaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn tag_file(&self, file_uuid: &str, tag_uuid: &str) -> Result<()> {
        let response = self
            .client
            .request(
                Method::POST,
                &format!("/api/file/{file_uuid}/tag/{tag_uuid}"),
            )
            .send()
            .await
            .context("Failed to send add-tag request")?;
        ensure_created_or_ok(response, "Add tag to file").await?;

        debug!(file = %file_uuid, tag = %tag_uuid, "Tagged file");
        Ok(())
    }
}

/// Supported regular files directly in `dir`, sorted by name, and the number skipped.
async fn eligible_files(dir: &Path) -> Result<(Vec<PathBuf>, usize)> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut files = Vec::new();
    let mut skipped = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match classify_entry(&path, entry.file_type().await) {
            Listing::Eligible => files.push(path),
            Listing::Skipped => skipped += 1,
            Listing::Directory => {}
        }
    }

    files.sort();
    Ok((files, skipped))
}

#[derive(Debug, PartialEq, Eq)]
enum Listing {
    Eligible,
    Skipped,
    Directory,
}

fn classify_entry(path: &Path, file_type: std::io::Result<std::fs::FileType>) -> Listing {
    match file_type {
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Failed to stat entry, skipping");
            Listing::Skipped
        }
        Ok(ft) if ft.is_dir() => Listing::Directory,
        Ok(_) if is_supported(path) => Listing::Eligible,
        Ok(_) => {
            debug!(file = %path.display(), "Skipping unsupported file");
            Listing::Skipped
        }
    }
}
