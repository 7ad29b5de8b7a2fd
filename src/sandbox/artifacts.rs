//! Retrieval and transport of images generated inside the container.
//!
//! After the entry process finishes, the artifact directory is downloaded
//! from the container as a tar stream and scanned for files carrying the
//! configured image extension. Extraction never fails an execution: any
//! error here degrades to an empty artifact list plus a warning, because
//! the captured log is still worth returning.

use std::path::{Path, PathBuf};

use base64::Engine;
use bollard::container::DownloadFromContainerOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::archive::scan_images;

/// A binary output produced by the executed code, tagged for transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// MIME type derived from the harvested file extension.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Self-contained data URI (MIME type + Base64 payload), suitable for
    /// inline embedding in LLM messages or HTML.
    pub fn data_uri(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }

    /// Persists the artifact under a UUID-named file in `cache_dir`,
    /// creating the directory if needed. Returns the written path.
    pub fn store(&self, cache_dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(cache_dir)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), extension_for_mime(&self.mime_type));
        let path = cache_dir.join(file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Maps a harvested file extension to its MIME type.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Inverse of [`mime_for_extension`], used for cache file naming.
fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Downloads `dir` from the container and returns every regular file in it
/// whose name carries `extension`, in archive entry order.
///
/// Infallible by contract: transport or archive errors are logged and an
/// empty list is returned.
pub async fn extract(
    docker: &Docker,
    container_id: &str,
    dir: &str,
    extension: &str,
) -> Vec<Artifact> {
    let options = DownloadFromContainerOptions {
        path: dir.to_string(),
    };
    let mut stream = docker.download_from_container(container_id, Some(options));

    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => data.extend_from_slice(&bytes),
            Err(e) => {
                warn!("Failed to retrieve artifacts from {container_id}: {e}");
                return Vec::new();
            }
        }
    }

    match scan_images(&data, extension) {
        Ok(entries) => {
            let mime = mime_for_extension(extension);
            debug!(
                "Extracted {} artifact(s) from {container_id}:{dir}",
                entries.len()
            );
            entries
                .into_iter()
                .map(|(_, bytes)| Artifact {
                    mime_type: mime.to_string(),
                    bytes,
                })
                .collect()
        }
        Err(e) => {
            warn!("Malformed artifact archive from {container_id}: {e}");
            Vec::new()
        }
    }
}
