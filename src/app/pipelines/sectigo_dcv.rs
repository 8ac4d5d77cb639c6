use super::file_timestamp;
use crate::adapters::sectigo::{DcvStatus, SectigoClient};
use crate::core::report::write_csv;
use crate::domain::model::{CaDomain, Cell, Table};
use crate::domain::ports::{Pipeline, RecordCount, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const HEADERS: [&str; 8] = [
    "domain_name",
    "domain_id",
    "dcv_status",
    "dcv_validation_type",
    "dcv_validation_status",
    "dcv_last_checked",
    "dcv_expires",
    "dcv_error",
];
const FETCH_FAILED: &str = "Failed to fetch DCV details";

pub fn report_file(timestamp: &str) -> String {
    format!("sectigo_domain_dcv_{}.csv", timestamp)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcvStatusRow {
    pub domain: CaDomain,
    pub status: Option<DcvStatus>,
    pub error: Option<String>,
}

impl DcvStatusRow {
    fn cells(&self) -> Vec<Cell> {
        let status = self.status.clone().unwrap_or_default();
        let dcv_status = if self.status.is_some() {
            status.status
        } else {
            "ERROR".to_string()
        };
        vec![
            self.domain.name.clone().into(),
            self.domain.id.clone().into(),
            dcv_status.into(),
            status.validation_type.into(),
            status.validation_status.into(),
            status.last_checked.into(),
            status.expires.into(),
            self.error.clone().into(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DcvStatusReport {
    pub rows: Vec<DcvStatusRow>,
}

impl RecordCount for DcvStatusReport {
    fn record_count(&self) -> usize {
        self.rows.len()
    }
}

impl DcvStatusReport {
    pub fn table(&self) -> Table {
        let mut table = Table::new("Sectigo DCV", &HEADERS);
        for row in &self.rows {
            table.push(row.cells());
        }
        table
    }

    pub fn failed(&self) -> usize {
        self.rows.iter().filter(|r| r.error.is_some()).count()
    }
}

/// `stg-dcv`：查詢 Sectigo 網域的 DCV 狀態
pub struct SectigoDcvPipeline<S: Storage> {
    storage: S,
    client: SectigoClient,
    /// 未指定時列出帳戶內所有網域
    domains: Option<Vec<String>>,
    delay: Duration,
    output_file: String,
}

impl<S: Storage> SectigoDcvPipeline<S> {
    pub fn new(storage: S, client: SectigoClient, domains: Option<Vec<String>>, delay: Duration) -> Self {
        Self {
            storage,
            client,
            domains,
            delay,
            output_file: report_file(&file_timestamp()),
        }
    }

    pub fn with_output_file(mut self, file: impl Into<String>) -> Self {
        self.output_file = file.into();
        self
    }

    async fn check(&self, domain: CaDomain) -> DcvStatusRow {
        match self.client.dcv_status(&domain.name).await {
            Ok(Some(status)) => {
                tracing::info!("✅ {}: {}", domain.name, status.status);
                DcvStatusRow {
                    domain,
                    status: Some(status),
                    error: None,
                }
            }
            Ok(None) => DcvStatusRow {
                domain,
                status: None,
                error: Some(FETCH_FAILED.to_string()),
            },
            Err(e) => {
                tracing::error!("❌ Error fetching DCV details for {}: {}", domain.name, e);
                DcvStatusRow {
                    domain,
                    status: None,
                    error: Some(format!("{}: {}", FETCH_FAILED, e)),
                }
            }
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for SectigoDcvPipeline<S> {
    type Item = CaDomain;
    type Output = DcvStatusReport;

    fn name(&self) -> &str {
        "stg-dcv"
    }

    async fn extract(&self) -> Result<Vec<CaDomain>> {
        match &self.domains {
            Some(names) => Ok(names
                .iter()
                .map(|name| CaDomain {
                    id: String::new(),
                    name: name.trim().to_string(),
                })
                .filter(|d| !d.name.is_empty())
                .collect()),
            None => self.client.list_domains().await,
        }
    }

    async fn transform(&self, data: Vec<CaDomain>) -> Result<DcvStatusReport> {
        let total = data.len();
        let mut rows = Vec::with_capacity(total);
        for (i, domain) in data.into_iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            tracing::info!("Processing domain {}/{}: {}", i + 1, total, domain.name);
            rows.push(self.check(domain).await);
        }
        Ok(DcvStatusReport { rows })
    }

    async fn load(&self, report: DcvStatusReport) -> Result<String> {
        if report.rows.is_empty() {
            println!("❌ No domains found to process");
            return Ok("no domains".to_string());
        }

        self.storage
            .write_file(&self.output_file, &write_csv(&report.table())?)
            .await?;
        let location = self.storage.display_path(&self.output_file);

        let failed = report.failed();
        println!("\n📊 Summary:");
        println!("   Total domains processed: {}", report.rows.len());
        println!("   Successful DCV lookups: {}", report.rows.len() - failed);
        println!("   Failed DCV lookups: {}", failed);
        println!("   Results saved to: {}", location);
        Ok(location)
    }
}
