use chrono::{DateTime, Local, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Scale photos saved next to measurements, one file per upload.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Lowercased extension of an uploaded file, if it is an accepted image type.
    pub fn accepted_extension(original_name: &str) -> Option<String> {
        let ext = Path::new(original_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
    }

    /// Write the upload as `{username}_{YYYYmmdd_HHMMSS}.{ext}` and return the
    /// file name to keep as the photo reference.
    pub async fn save(
        &self,
        username: &str,
        extension: &str,
        taken_at: DateTime<Utc>,
        bytes: &[u8],
    ) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!(
            "{}_{}",
            sanitize(username),
            taken_at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
        );
        let mut attempt = 1;
        let (name, mut file) = loop {
            let name = if attempt == 1 {
                format!("{stem}.{extension}")
            } else {
                format!("{stem}_{attempt}.{extension}")
            };
            // create_new claims the name atomically; a concurrent upload
            // in the same second moves on to the next suffix.
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&name))
                .await
            {
                Ok(file) => break (name, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        };

        file.write_all(bytes).await?;
        file.flush().await?;
        tracing::debug!("Saved photo {}", name);
        Ok(name)
    }

    /// Map a stored reference to a file inside the photo directory.
    ///
    /// Older logs store paths such as `uploads/x.jpg`; only the final
    /// component is used, so a reference can never escape the directory.
    pub fn resolve(&self, photo_ref: &str) -> Option<PathBuf> {
        let name = Path::new(photo_ref.trim()).file_name()?.to_str()?;
        if name.starts_with('.') {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// File name used in `/photos/{name}` links.
    pub fn public_name(photo_ref: &str) -> Option<String> {
        Path::new(photo_ref.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }

    pub async fn read(&self, name: &str) -> std::io::Result<Vec<u8>> {
        let path = self
            .resolve(name)
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "invalid photo name"))?;
        tokio::fs::read(path).await
    }

    /// Delete a photo, logging instead of failing.
    pub async fn remove_best_effort(&self, photo_ref: &str) {
        let Some(path) = self.resolve(photo_ref) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed photo {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove photo {}: {}", path.display(), e),
        }
    }
}

fn sanitize(username: &str) -> String {
    let cleaned: String = username
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn accepts_only_image_extensions() {
        assert_eq!(PhotoStore::accepted_extension("scale.JPG").as_deref(), Some("jpg"));
        assert_eq!(PhotoStore::accepted_extension("a.b.png").as_deref(), Some("png"));
        assert!(PhotoStore::accepted_extension("notes.txt").is_none());
        assert!(PhotoStore::accepted_extension("noext").is_none());
    }

    #[test]
    fn resolve_stays_inside_directory() {
        let store = PhotoStore::new("/srv/photos");
        assert_eq!(
            store.resolve("uploads/Ana_1.jpg"),
            Some(PathBuf::from("/srv/photos/Ana_1.jpg"))
        );
        assert_eq!(
            store.resolve("../../etc/passwd"),
            Some(PathBuf::from("/srv/photos/passwd"))
        );
        assert!(store.resolve("..").is_none());
        assert!(store.resolve(".hidden").is_none());
    }

    #[tokio::test]
    async fn save_names_files_after_user_and_time() {
        let temp = TempDir::new().unwrap();
        let store = PhotoStore::new(temp.path().join("uploads"));
        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        let first = store.save("Ana Paula", "png", at, b"one").await.unwrap();
        let second = store.save("Ana Paula", "png", at, b"two").await.unwrap();

        assert!(first.starts_with("Ana_Paula_"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);
        assert_eq!(store.read(&first).await.unwrap(), b"one");
        assert_eq!(store.read(&second).await.unwrap(), b"two");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_in_the_same_second_get_distinct_names() {
        let temp = TempDir::new().unwrap();
        let store = PhotoStore::new(temp.path().join("uploads"));
        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        for round in 0..20u8 {
            let (a, b) = tokio::join!(
                tokio::spawn({
                    let store = store.clone();
                    async move { store.save("Ana", "jpg", at, &[round, 1]).await }
                }),
                tokio::spawn({
                    let store = store.clone();
                    async move { store.save("Ana", "jpg", at, &[round, 2]).await }
                }),
            );
            let a = a.unwrap().unwrap();
            let b = b.unwrap().unwrap();

            assert_ne!(a, b);
            assert_eq!(store.read(&a).await.unwrap(), vec![round, 1]);
            assert_eq!(store.read(&b).await.unwrap(), vec![round, 2]);
        }
    }

    #[tokio::test]
    async fn remove_ignores_missing_files() {
        let temp = TempDir::new().unwrap();
        let store = PhotoStore::new(temp.path());
        store.remove_best_effort("never-existed.jpg").await;

        std::fs::write(temp.path().join("x.jpg"), b"img").unwrap();
        store.remove_best_effort("uploads/x.jpg").await;
        assert!(!temp.path().join("x.jpg").exists());
    }
}
