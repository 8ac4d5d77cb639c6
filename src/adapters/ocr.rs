use crate::utils::error::{EtlError, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Ghostscript 轉圖 + Tesseract 辨識
#[derive(Debug, Clone)]
pub struct OcrTools {
    ghostscript: String,
    tesseract: String,
}

impl OcrTools {
    pub fn new(ghostscript: &str, tesseract: &str) -> Self {
        Self {
            ghostscript: ghostscript.to_string(),
            tesseract: tesseract.to_string(),
        }
    }

    async fn run(tool: &str, args: &[String]) -> Result<Output> {
        tracing::debug!("🛠️ {} {}", tool, args.join(" "));
        let output = Command::new(tool)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EtlError::ToolError {
                tool: tool.to_string(),
                message: format!("could not start: {}", e),
            })?;

        if !output.status.success() {
            return Err(EtlError::ToolError {
                tool: tool.to_string(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }

    /// Renders every page of `pdf` to `out_dir/page-NNNN.png`, returned in page order.
    pub async fn rasterize(&self, pdf: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>> {
        let args = vec![
            "-dNOPAUSE".to_string(),
            "-dBATCH".to_string(),
            "-dSAFER".to_string(),
            "-sDEVICE=png16m".to_string(),
            format!("-r{}", dpi),
            format!("-sOutputFile={}", out_dir.join("page-%04d.png").display()),
            pdf.display().to_string(),
        ];
        Self::run(&self.ghostscript, &args).await?;

        let pages = collect_pages(out_dir)?;
        if pages.is_empty() {
            return Err(EtlError::ToolError {
                tool: self.ghostscript.clone(),
                message: format!("no pages rendered from {}", pdf.display()),
            });
        }
        Ok(pages)
    }

    pub async fn recognize(&self, image: &Path, lang: &str) -> Result<String> {
        let args = vec![
            image.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            lang.to_string(),
        ];
        let output = Self::run(&self.tesseract, &args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `page-*.png` in name order (zero-padded, so name order is page order).
pub fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("page-") && n.ends_with(".png"))
                .unwrap_or(false)
        })
        .collect();
    pages.sort();
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_pages_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["page-0002.png", "page-0001.png", "page-0010.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let pages = collect_pages(dir.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["page-0001.png", "page-0002.png", "page-0010.png"]);
    }

    #[tokio::test]
    async fn test_missing_tool_is_tool_error() {
        let tools = OcrTools::new("/nonexistent/gs", "/nonexistent/tesseract");
        let dir = TempDir::new().unwrap();

        match tools.rasterize(Path::new("a.pdf"), dir.path(), 300).await {
            Err(EtlError::ToolError { tool, message }) => {
                assert_eq!(tool, "/nonexistent/gs");
                assert!(message.starts_with("could not start"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
