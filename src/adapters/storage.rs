use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        Path::new(&self.base_path).join(path)
    }

    fn ensure_parent(full_path: &Path) -> Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.full_path(path))?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        Self::ensure_parent(&full_path)?;
        fs::write(full_path, data)?;
        Ok(())
    }

    async fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        Self::ensure_parent(&full_path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(full_path)?;
        file.write_all(data)?;
        // 每列即時落盤，中斷時保留已完成的列
        file.flush()?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        if !full_path.exists() {
            return Ok(false);
        }
        fs::remove_file(full_path)?;
        Ok(true)
    }

    fn exists(&self, path: &str) -> bool {
        self.full_path(path).exists()
    }

    fn display_path(&self, path: &str) -> String {
        self.full_path(path).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_append_read_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap());

        storage.write_file("nested/out.csv", b"a,b\n").await.unwrap();
        storage.append_file("nested/out.csv", b"1,2\n").await.unwrap();

        let data = storage.read_file("nested/out.csv").await.unwrap();
        assert_eq!(data, b"a,b\n1,2\n");
        assert!(storage.exists("nested/out.csv"));

        assert!(storage.remove_file("nested/out.csv").await.unwrap());
        assert!(!storage.remove_file("nested/out.csv").await.unwrap());
        assert!(storage.read_file("nested/out.csv").await.is_err());
    }
}
