use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Upload extensions accepted by the tool pages (checked case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "flv"];

/**
    Manages the two scratch directories: uploaded sources and processed
    outputs. Files carry no metadata and live until removed by the `clean`
    command.
*/
pub struct MediaStore {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
}

impl MediaStore {
    /// Open (creating if needed) the store under the given data directory.
    pub fn open(data_dir: &Path) -> io::Result<Self> {
        let upload_dir = data_dir.join("uploads");
        let processed_dir = data_dir.join("processed");
        fs::create_dir_all(&upload_dir)?;
        fs::create_dir_all(&processed_dir)?;

        Ok(Self {
            upload_dir,
            processed_dir,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    // ── Naming ───────────────────────────────────────────────────────────

    /// Check a client-supplied filename against the upload allow-list.
    pub fn allowed_file(name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /**
        Build a collision-free on-disk name: an 8-hex random prefix followed
        by the sanitized original name. Sanitization strips path components,
        so traversal attempts degrade to plain name fragments.
    */
    pub fn unique_name(original: &str) -> String {
        let mut uid = Uuid::new_v4().simple().to_string();
        uid.truncate(8);

        let mut safe = sanitize_filename::sanitize(original);
        if safe.is_empty() {
            safe = "upload".to_string();
        }

        format!("{}_{}", uid, safe)
    }

    // ── Files ────────────────────────────────────────────────────────────

    /// Persist an uploaded file body under a randomized name, returning the
    /// full path of the stored source.
    pub async fn save_upload(&self, original: &str, data: &[u8]) -> io::Result<PathBuf> {
        let name = Self::unique_name(original);
        let path = self.upload_dir.join(&name);
        tokio::fs::write(&path, data).await?;

        println!("[store] saved upload {} ({} bytes)", name, data.len());
        Ok(path)
    }

    /// Path in the processed directory where an output should be written.
    pub fn processed_path(&self, name: &str) -> PathBuf {
        self.processed_dir.join(name)
    }

    /// Resolve a download request to a path in the processed directory.
    /// Returns `None` for anything that is not a bare file name.
    pub fn resolve_download(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        Some(self.processed_dir.join(name))
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    /// Remove every stored file. Returns (uploads removed, outputs removed).
    pub fn clear_all(&self) -> io::Result<(usize, usize)> {
        let uploads = sweep_dir(&self.upload_dir)?;
        let processed = sweep_dir(&self.processed_dir)?;
        Ok((uploads, processed))
    }
}

/// Delete all regular files directly inside a directory, returning the count.
fn sweep_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_name_shape() {
        let name = MediaStore::unique_name("holiday.mp4");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 8);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "holiday.mp4");
    }

    #[test]
    fn test_unique_name_strips_path_components() {
        let name = MediaStore::unique_name("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
    }

    #[test]
    fn test_unique_name_empty_original() {
        let name = MediaStore::unique_name("");
        assert!(name.ends_with("_upload"));
    }

    #[test]
    fn test_unique_names_differ() {
        assert_ne!(
            MediaStore::unique_name("a.mp4"),
            MediaStore::unique_name("a.mp4")
        );
    }

    #[test]
    fn test_allowed_file() {
        assert!(MediaStore::allowed_file("clip.mp4"));
        assert!(MediaStore::allowed_file("CLIP.MKV"));
        assert!(MediaStore::allowed_file("a.b.webm"));
        assert!(!MediaStore::allowed_file("notes.txt"));
        assert!(!MediaStore::allowed_file("noextension"));
        assert!(!MediaStore::allowed_file(""));
    }

    #[test]
    fn test_resolve_download_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).unwrap();

        assert!(store.resolve_download("out.mp4").is_some());
        assert!(store.resolve_download("").is_none());
        assert!(store.resolve_download("../secret").is_none());
        assert!(store.resolve_download("a/b.mp4").is_none());
        assert!(store.resolve_download("a\\b.mp4").is_none());
    }

    #[tokio::test]
    async fn test_save_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::open(dir.path()).unwrap();

        let path = store.save_upload("clip.mp4", b"data").await.unwrap();
        assert!(path.exists());
        assert!(path.starts_with(store.upload_dir()));

        std::fs::write(store.processed_path("out.mp4"), b"out").unwrap();

        let (uploads, processed) = store.clear_all().unwrap();
        assert_eq!((uploads, processed), (1, 1));
        assert!(!path.exists());
    }
}
