//! Local artifact persistence
//!
//! Downloaded media and history snapshots are written to one directory per
//! tenant under `<data_dir>/files/user_<id>`. Pairing codes are rendered by a
//! pluggable [`CodeRenderer`] before they are stored.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_store::TenantId;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Per-process history snapshot counter
static HISTORY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Turns a raw pairing code into the stored pairing artifact
pub trait CodeRenderer: Send + Sync {
    fn render(&self, code: &str) -> String;
}

/// Stores the code text unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodeRenderer;

impl CodeRenderer for RawCodeRenderer {
    fn render(&self, code: &str) -> String {
        code.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// `data_dir` is the configured sessions data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("files"),
        }
    }

    pub fn tenant_dir(&self, tenant: TenantId) -> PathBuf {
        self.root.join(format!("user_{}", tenant))
    }

    async fn ensure_tenant_dir(&self, tenant: TenantId) -> std::io::Result<PathBuf> {
        let dir = self.tenant_dir(tenant);
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o751);
        builder.create(&dir).await?;
        Ok(dir)
    }

    async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Save message media as `<message id><ext>`
    pub async fn write_media(
        &self,
        tenant: TenantId,
        message_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let dir = self.ensure_tenant_dir(tenant).await?;
        let path = dir.join(format!("{}{}", sanitize(message_id), extension));
        Self::write_private(&path, bytes).await?;
        debug!(tenant = %tenant, path = %path.display(), "Media saved");
        Ok(path)
    }

    /// Save a history sync payload as `history-<n>.json`
    pub async fn write_history(
        &self,
        tenant: TenantId,
        data: &serde_json::Value,
    ) -> std::io::Result<PathBuf> {
        let dir = self.ensure_tenant_dir(tenant).await?;
        let seq = HISTORY_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let path = dir.join(format!("history-{}.json", seq));
        let content = serde_json::to_vec_pretty(data)?;
        Self::write_private(&path, &content).await?;
        Ok(path)
    }
}

/// Keep ids from escaping the tenant directory
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// File extension (with leading dot) for a declared content type, falling
/// back to the extension of the filename hint
pub fn extension_for(mime_type: Option<&str>, file_name: Option<&str>) -> String {
    let essence = mime_type
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());

    let from_mime = match essence.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => Some(".jpg"),
        Some("image/png") => Some(".png"),
        Some("image/gif") => Some(".gif"),
        Some("image/webp") => Some(".webp"),
        Some("audio/ogg") => Some(".ogg"),
        Some("audio/mpeg") | Some("audio/mp3") => Some(".mp3"),
        Some("audio/mp4") | Some("audio/aac") => Some(".m4a"),
        Some("audio/wav") | Some("audio/x-wav") => Some(".wav"),
        Some("video/mp4") => Some(".mp4"),
        Some("application/pdf") => Some(".pdf"),
        Some("application/zip") => Some(".zip"),
        Some("application/json") => Some(".json"),
        Some("text/plain") => Some(".txt"),
        Some("text/csv") => Some(".csv"),
        Some("application/msword") => Some(".doc"),
        Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document") => {
            Some(".docx")
        }
        Some("application/vnd.ms-excel") => Some(".xls"),
        Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet") => Some(".xlsx"),
        _ => None,
    };

    if let Some(ext) = from_mime {
        return ext.to_string();
    }

    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_from_mime_and_hint() {
        assert_eq!(extension_for(Some("image/jpeg"), None), ".jpg");
        assert_eq!(extension_for(Some("audio/ogg; codecs=opus"), None), ".ogg");
        assert_eq!(
            extension_for(Some("application/x-unknown"), Some("report.final.odt")),
            ".odt"
        );
        assert_eq!(extension_for(None, Some("README")), "");
        assert_eq!(extension_for(None, None), "");
    }

    #[test]
    fn test_raw_renderer() {
        assert_eq!(RawCodeRenderer.render("2@abc,def"), "2@abc,def");
    }

    #[test]
    fn test_sanitize_message_id() {
        assert_eq!(sanitize("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize("3EB0ABCD"), "3EB0ABCD");
    }

    #[tokio::test]
    async fn test_write_media_and_history() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        let tenant = TenantId(12);

        let media = store
            .write_media(tenant, "MSG1", ".jpg", b"jpeg-bytes")
            .await
            .unwrap();
        assert_eq!(media, temp_dir.path().join("files/user_12/MSG1.jpg"));
        assert_eq!(std::fs::read(&media).unwrap(), b"jpeg-bytes");

        let first = store
            .write_history(tenant, &serde_json::json!({"conversations": []}))
            .await
            .unwrap();
        let second = store
            .write_history(tenant, &serde_json::json!({}))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("history-"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&media).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
