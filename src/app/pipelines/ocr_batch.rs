use crate::adapters::ocr::OcrTools;
use crate::core::report::write_csv;
use crate::domain::model::{Cell, Table};
use crate::domain::ports::{Pipeline, RecordCount, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "ocr_summary.csv";
pub const SUMMARY_HEADERS: [&str; 4] = ["file", "pages", "status", "error"];
const PAGE_SEPARATOR: &str = "\u{000C}";

#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub file: String,
    pub pages: usize,
    pub error: Option<String>,
}

impl OcrOutcome {
    pub fn status(&self) -> &'static str {
        if self.error.is_some() {
            "error"
        } else {
            "ok"
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrSummary {
    pub outcomes: Vec<OcrOutcome>,
}

impl RecordCount for OcrSummary {
    fn record_count(&self) -> usize {
        self.outcomes.len()
    }
}

impl OcrSummary {
    pub fn table(&self) -> Table {
        let mut table = Table::new("OCR Summary", &SUMMARY_HEADERS);
        for o in &self.outcomes {
            table.push(vec![
                o.file.clone().into(),
                o.pages.into(),
                Cell::text(o.status()),
                o.error.clone().into(),
            ]);
        }
        table
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

/// `*.pdf`（不分大小寫）依檔名排序
pub fn find_pdfs(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Err(EtlError::ConfigValidationError {
            field: "--input".to_string(),
            message: format!("input directory {} does not exist", input.display()),
        });
    }
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

fn display_name(pdf: &Path) -> String {
    pdf.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string())
}

/// `<stem>.txt`
pub fn text_file_name(pdf: &Path) -> String {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| display_name(pdf));
    format!("{}.txt", stem)
}

/// 輸出檔名相同（不分大小寫）時只處理排序後的第一個，其餘直接記為錯誤
pub fn plan_outputs(pdfs: Vec<PathBuf>) -> Vec<std::result::Result<PathBuf, OcrOutcome>> {
    let mut claimed: HashMap<String, String> = HashMap::new();
    pdfs.into_iter()
        .map(|pdf| {
            let file = display_name(&pdf);
            let text_file = text_file_name(&pdf);
            match claimed.get(&text_file.to_lowercase()) {
                Some(first) => {
                    tracing::warn!("⚠️ {} skipped: {} already used by {}", file, text_file, first);
                    Err(OcrOutcome {
                        file,
                        pages: 0,
                        error: Some(format!("output {} already used by {}", text_file, first)),
                    })
                }
                None => {
                    claimed.insert(text_file.to_lowercase(), file);
                    Ok(pdf)
                }
            }
        })
        .collect()
}

/// PDF 轉文字：Ghostscript 轉圖、Tesseract 逐頁辨識
pub struct OcrBatchPipeline<S: Storage> {
    output: S,
    input_dir: PathBuf,
    tools: OcrTools,
    lang: String,
    dpi: u32,
    jobs: usize,
}

impl<S: Storage> OcrBatchPipeline<S> {
    pub fn new(output: S, input_dir: PathBuf, tools: OcrTools, lang: &str, dpi: u32, jobs: usize) -> Self {
        Self {
            output,
            input_dir,
            tools,
            lang: lang.to_string(),
            dpi,
            jobs: jobs.max(1),
        }
    }

    async fn ocr_pdf(&self, pdf: &Path) -> Result<(String, usize)> {
        // 暫存目錄在離開時自動刪除
        let scratch = tempfile::TempDir::new()?;
        let pages = self.tools.rasterize(pdf, scratch.path(), self.dpi).await?;

        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            texts.push(self.tools.recognize(page, &self.lang).await?);
        }
        Ok((texts.join(PAGE_SEPARATOR), pages.len()))
    }

    async fn process(&self, pdf: PathBuf) -> OcrOutcome {
        let file = display_name(&pdf);

        tracing::info!("📄 OCR {}", file);
        let result = match self.ocr_pdf(&pdf).await {
            Ok((text, pages)) => self
                .output
                .write_file(&text_file_name(&pdf), text.as_bytes())
                .await
                .map(|_| pages),
            Err(e) => Err(e),
        };

        match result {
            Ok(pages) => {
                tracing::info!("✅ {} ({} pages)", file, pages);
                OcrOutcome {
                    file,
                    pages,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("❌ {}: {}", file, e);
                OcrOutcome {
                    file,
                    pages: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for OcrBatchPipeline<S> {
    type Item = PathBuf;
    type Output = OcrSummary;

    fn name(&self) -> &str {
        "ocr"
    }

    async fn extract(&self) -> Result<Vec<PathBuf>> {
        let pdfs = find_pdfs(&self.input_dir)?;
        if pdfs.is_empty() {
            tracing::warn!("⚠️ No PDF files in {}", self.input_dir.display());
        }
        Ok(pdfs)
    }

    async fn transform(&self, data: Vec<PathBuf>) -> Result<OcrSummary> {
        let outcomes = stream::iter(plan_outputs(data))
            .map(|planned| async move {
                match planned {
                    Ok(pdf) => self.process(pdf).await,
                    Err(skipped) => skipped,
                }
            })
            .buffered(self.jobs)
            .collect::<Vec<_>>()
            .await;
        Ok(OcrSummary { outcomes })
    }

    async fn load(&self, summary: OcrSummary) -> Result<String> {
        self.output
            .write_file(SUMMARY_FILE, &write_csv(&summary.table())?)
            .await?;
        let location = self.output.display_path(SUMMARY_FILE);
        println!(
            "Processed {} PDF(s), {} failed. Summary: {}",
            summary.outcomes.len(),
            summary.failed(),
            location
        );
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use tempfile::TempDir;

    #[test]
    fn test_missing_input_dir_is_setup_error() {
        match find_pdfs(Path::new("/nonexistent/ocr-input")) {
            Err(EtlError::ConfigValidationError { field, .. }) => assert_eq!(field, "--input"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_find_pdfs_case_insensitive_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.PDF", "a.pdf", "notes.txt", "c.Pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("dir.pdf")).unwrap();

        let names: Vec<String> = find_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF", "c.Pdf"]);
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_batch_writes_text_and_summary() {
        let bin = TempDir::new().unwrap();
        let gs = script(
            bin.path(),
            "gs",
            r#"for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) pattern="${arg#-sOutputFile=}" ;;
    *) pdf="$arg" ;;
  esac
done
case "$pdf" in *broken*) echo "damaged file" >&2; exit 1 ;; esac
out=$(dirname "$pattern")
printf x > "$out/page-0001.png"
printf x > "$out/page-0002.png"
"#,
        );
        let tesseract = script(bin.path(), "tesseract", "printf 'text of %s' \"$(basename \"$1\")\"\n");

        let input = TempDir::new().unwrap();
        std::fs::write(input.path().join("report.PDF"), b"%PDF").unwrap();
        std::fs::write(input.path().join("broken.pdf"), b"%PDF").unwrap();
        let output = TempDir::new().unwrap();

        let pipeline = OcrBatchPipeline::new(
            LocalStorage::new(output.path().to_str().unwrap()),
            input.path().to_path_buf(),
            OcrTools::new(&gs, &tesseract),
            "eng",
            150,
            2,
        );
        let location = EtlEngine::new(pipeline).run().await.unwrap();

        let text = std::fs::read_to_string(output.path().join("report.txt")).unwrap();
        assert_eq!(text, "text of page-0001.png\u{000C}text of page-0002.png");
        assert!(!output.path().join("broken.txt").exists());

        let summary = std::fs::read_to_string(location).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "file,pages,status,error");
        assert!(lines[1].starts_with("broken.pdf,0,error,"));
        assert!(lines[1].contains("damaged file"));
        assert_eq!(lines[2], "report.PDF,2,ok,");
    }

    #[test]
    fn test_plan_outputs_flags_same_stem() {
        let planned = plan_outputs(vec![
            PathBuf::from("/in/Report.pdf"),
            PathBuf::from("/in/notes.pdf"),
            PathBuf::from("/in/report.PDF"),
        ]);
        assert!(planned[0].is_ok());
        assert!(planned[1].is_ok());
        match &planned[2] {
            Err(outcome) => {
                assert_eq!(outcome.file, "report.PDF");
                assert_eq!(
                    outcome.error.as_deref(),
                    Some("output report.txt already used by Report.pdf")
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_batch_same_stem_keeps_first_transcript() {
        let bin = TempDir::new().unwrap();
        let gs = script(
            bin.path(),
            "gs",
            r#"for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) pattern="${arg#-sOutputFile=}" ;;
  esac
done
printf x > "$(dirname "$pattern")/page-0001.png"
"#,
        );
        let tesseract = script(bin.path(), "tesseract", "printf 'page text'\n");

        let input = TempDir::new().unwrap();
        std::fs::write(input.path().join("report.pdf"), b"%PDF").unwrap();
        std::fs::write(input.path().join("report.PDF"), b"%PDF").unwrap();
        let output = TempDir::new().unwrap();

        let pipeline = OcrBatchPipeline::new(
            LocalStorage::new(output.path().to_str().unwrap()),
            input.path().to_path_buf(),
            OcrTools::new(&gs, &tesseract),
            "eng",
            150,
            2,
        );
        let location = EtlEngine::new(pipeline).run().await.unwrap();

        let texts: Vec<String> = std::fs::read_dir(output.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".txt"))
            .collect();
        assert_eq!(texts, vec!["report.txt"]);

        let summary = std::fs::read_to_string(location).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "report.PDF,1,ok,");
        assert_eq!(lines[2], "report.pdf,0,error,output report.txt already used by report.PDF");
    }
}
