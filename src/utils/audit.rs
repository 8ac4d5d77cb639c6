use crate::utils::error::Result;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const RULE: &str = "============================================================";

/// Plain-text log of every raw CA response for add/remove runs.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// 建立並清空日誌檔
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, b"")?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self, msg: &str) {
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", msg));
        if let Err(e) = written {
            tracing::warn!("Could not write audit log {}: {}", self.path.display(), e);
        }
    }

    pub fn json(&self, section: &str, domain: &str, data: &serde_json::Value) {
        self.line(&format!(
            "[{}] [{}] RAW JSON for domain: {}",
            timestamp(),
            section,
            domain
        ));
        match serde_json::to_string_pretty(data) {
            Ok(pretty) => self.line(&pretty),
            Err(e) => self.line(&format!("Could not JSON-encode object: {}; Original: {:?}", e, data)),
        }
        self.line(RULE);
    }

    pub fn error(&self, section: &str, domain: &str, error: &dyn std::fmt::Display) {
        self.line(RULE);
        self.line(&format!(
            "[{}] [{}] ERROR for domain: {}",
            timestamp(),
            section,
            domain
        ));
        self.line(&error.to_string());
        self.line(RULE);
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
