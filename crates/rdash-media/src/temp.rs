//! Scoped temporary video files.
//!
//! Every upload or download is written to a uniquely named file inside the
//! upload directory. The file is removed when its [`TempVideo`] guard drops,
//! on success and error paths alike. Files orphaned by a crash are picked up
//! later by [`sweep_stale_files`].

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MediaResult;

/// Video extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "webm"];

/// Name used when sanitizing leaves nothing behind.
const FALLBACK_FILENAME: &str = "video";

/// A video file owned by one request. Deleted on drop.
#[derive(Debug)]
pub struct TempVideo {
    path: PathBuf,
}

impl TempVideo {
    /// Reserve `<dir>/<uuid>_<sanitized filename>` for an uploaded file.
    pub async fn for_upload(dir: impl AsRef<Path>, filename: &str) -> MediaResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename));
        Ok(Self {
            path: dir.join(name),
        })
    }

    /// Reserve `<dir>/<uuid>.mp4` for a downloaded file.
    pub async fn for_download(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        Ok(Self {
            path: dir.join(format!("{}.mp4", Uuid::new_v4())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without the directory.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl Drop for TempVideo {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temporary video"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                "Failed to remove temporary video: {}", e
            ),
        }
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension of a filename, if any.
fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Whether the filename ends in one of [`ALLOWED_EXTENSIONS`].
pub fn has_allowed_extension(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Video MIME type for a path, defaulting to `video/mp4`.
pub fn mime_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    match ext.as_deref() {
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}

/// Result of a stale-file sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
///
/// A missing directory is an empty sweep. Individual deletion failures are
/// logged and counted, never returned.
pub async fn sweep_stale_files(dir: impl AsRef<Path>, max_age: Duration) -> MediaResult<SweepReport> {
    let dir = dir.as_ref();
    let mut report = SweepReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path.display(), "Failed to stat file during sweep: {}", e);
                report.failed += 1;
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale file");
                report.removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to remove stale file: {}", e);
                report.failed += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        removed = report.removed,
        failed = report.failed,
        "Stale file sweep complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("robot run.mp4"), "robot_run.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\clips\\arm.MOV"), "arm.MOV");
        assert_eq!(sanitize_filename(".hidden.webm"), "hidden.webm");
        assert_eq!(sanitize_filename("ロボット.mp4"), "mp4");
        assert_eq!(sanitize_filename("///"), "video");
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("clip.mp4"));
        assert!(has_allowed_extension("clip.MOV"));
        assert!(has_allowed_extension("a.b.webm"));
        assert!(!has_allowed_extension("clip.mkv"));
        assert!(!has_allowed_extension("mp4"));
        assert!(!has_allowed_extension("clip."));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for("a.mp4"), "video/mp4");
        assert_eq!(mime_type_for("a.AVI"), "video/x-msvideo");
        assert_eq!(mime_type_for("a.mov"), "video/quicktime");
        assert_eq!(mime_type_for("a.webm"), "video/webm");
        assert_eq!(mime_type_for("a"), "video/mp4");
    }

    #[tokio::test]
    async fn test_temp_video_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let video = TempVideo::for_upload(dir.path(), "run.mp4").await.unwrap();
            fs::write(video.path(), b"data").await.unwrap();
            assert!(video.path().exists());
            assert!(video.file_name().ends_with("_run.mp4"));
            video.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_video_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = TempVideo::for_upload(dir.path(), "same.mp4").await.unwrap();
        let b = TempVideo::for_upload(dir.path(), "same.mp4").await.unwrap();
        assert_ne!(a.path(), b.path());

        let c = TempVideo::for_download(dir.path()).await.unwrap();
        assert!(c.file_name().ends_with(".mp4"));
        assert_eq!(mime_type_for(c.path()), "video/mp4");
    }

    #[tokio::test]
    async fn test_drop_without_file_is_silent() {
        let dir = TempDir::new().unwrap();
        let video = TempVideo::for_download(dir.path().join("nested")).await.unwrap();
        assert!(dir.path().join("nested").is_dir());
        drop(video);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.mp4"), b"old").await.unwrap();
        fs::create_dir(dir.path().join("subdir")).await.unwrap();

        // Nothing is older than an hour yet
        let report = sweep_stale_files(dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(dir.path().join("old.mp4").exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = sweep_stale_files(dir.path(), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);
        assert!(!dir.path().join("old.mp4").exists());
        assert!(dir.path().join("subdir").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let report = sweep_stale_files("/nonexistent/rdash-uploads", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
