use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_cli_logger(verbose: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ops_etl=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ops_etl=info"))
    };

    // 檔案日誌：純文字，不帶 ANSI 顏色
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// `<log_dir>/<job>_<unix-seconds>.log`
pub fn log_file_path(log_dir: &str, job: &str) -> PathBuf {
    let ts = chrono::Utc::now().timestamp();
    Path::new(log_dir).join(format!("{}_{}.log", job, ts))
}

/// 刪除超過保留天數的舊日誌，回傳刪除數量
pub fn prune_old_logs(log_dir: &Path, prefix: &str, retention_days: u32) -> std::io::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(u64::from(retention_days) * 86_400))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);
        if !matches_prefix || !path.is_file() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Removed old log file: {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::warn!("Error removing {}: {}", path.display(), e),
            }
        }
    }

    Ok(removed)
}

/// Raw API bodies only show up with --verbose.
pub fn log_json_response(context: &str, body: &serde_json::Value) {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        tracing::debug!("--- {} JSON Response ---\n{}", context, pretty);
    }
}
