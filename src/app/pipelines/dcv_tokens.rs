use super::COMBINED_DOMAINS_CSV;
use crate::adapters::digicert::{dcv_token, verification_value, DigiCertClient};
use crate::adapters::sectigo::SectigoClient;
use crate::core::report::write_csv;
use crate::domain::model::{CaKind, Cell, NsProvider, Table};
use crate::domain::ports::{CnamePublisher, Pipeline, RecordCount, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Columns filled in by this job; appended when the CSV lacks them.
pub const TOKEN_COLUMNS: [&str; 2] = ["Value", "token"];
const DNS_CNAME_TOKEN: &str = "dns-cname-token";

/// One row of `combined_domains.csv`, columns kept in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombinedRecord {
    columns: Vec<(String, String)>,
}

impl CombinedRecord {
    pub fn get(&self, column: &str) -> &str {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }

    pub fn set(&mut self, column: &str, value: &str) {
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.columns.push((column.to_string(), value.to_string())),
        }
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn cells(&self) -> Vec<Cell> {
        self.columns.iter().map(|(_, value)| Cell::text(value.clone())).collect()
    }

    fn ca(&self) -> Option<CaKind> {
        [CaKind::DigiCert, CaKind::Sectigo]
            .into_iter()
            .find(|ca| ca.matches(self.get("provider")))
    }
}

/// 讀取合併清單，保留未知欄位並補上 Value / token
pub fn parse_combined(data: &[u8]) -> Result<Vec<CombinedRecord>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = CombinedRecord {
            columns: headers
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get(i).unwrap_or_default().to_string()))
                .collect(),
        };
        for column in TOKEN_COLUMNS {
            if !record.columns.iter().any(|(name, _)| name == column) {
                record.set(column, "");
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// CNAME that proves control of a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DcvCname {
    pub host: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenOutcome {
    pub domain: String,
    pub ca: CaKind,
    pub cname: Option<DcvCname>,
    /// Zone the CNAME was published to.
    pub published: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenReport {
    pub records: Vec<CombinedRecord>,
    pub outcomes: Vec<TokenOutcome>,
}

impl RecordCount for TokenReport {
    fn record_count(&self) -> usize {
        self.outcomes.len()
    }
}

/// `dcv-tokens`：切換為 CNAME 驗證、取得 token，可選擇發佈到 Azure DNS
pub struct DcvTokensPipeline<S: Storage> {
    storage: S,
    digicert: Option<DigiCertClient>,
    sectigo: Option<SectigoClient>,
    publisher: Option<Arc<dyn CnamePublisher>>,
    domains: Option<Vec<String>>,
}

impl<S: Storage> DcvTokensPipeline<S> {
    pub fn new(storage: S, digicert: Option<DigiCertClient>, sectigo: Option<SectigoClient>) -> Self {
        Self {
            storage,
            digicert,
            sectigo,
            publisher: None,
            domains: None,
        }
    }

    /// Only these domain names are processed; other rows are written back unchanged.
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = Some(domains.into_iter().map(|d| d.trim().to_lowercase()).collect());
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn CnamePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn selected(&self, name: &str) -> bool {
        match &self.domains {
            Some(domains) => domains.iter().any(|d| d.eq_ignore_ascii_case(name)),
            None => true,
        }
    }

    async fn digicert_cname(&self, client: &DigiCertClient, record: &mut CombinedRecord) -> Result<DcvCname> {
        let id = record.get("id").to_string();
        let domain = record.get("name").to_string();

        if record.get("dcv_method") != "CNAME" {
            tracing::info!("Changing DCV method for {} (ID: {})", domain, id);
            client
                .change_dcv_method(&id, DNS_CNAME_TOKEN)
                .await
                .map_err(|e| EtlError::processing(format!("DCV method change failed: {}", e)))?;
            record.set("dcv_method", "CNAME");
        }

        let body = client.generate_dcv_token(&id).await?;
        let token = dcv_token(&body)
            .ok_or_else(|| EtlError::processing(format!("no DCV token for {} in {}", domain, body)))?;
        let value = verification_value(&body).unwrap_or_default();
        record.set("Value", &value);
        record.set("token", &token);
        Ok(DcvCname {
            host: format!("{}.{}", token, domain),
            target: value,
        })
    }

    async fn sectigo_cname(&self, client: &SectigoClient, record: &mut CombinedRecord) -> Result<DcvCname> {
        let challenge = client.start_cname_validation(record.get("name")).await?;
        record.set("Value", &challenge.host);
        record.set("token", &challenge.point);
        record.set("dcv_method", "CNAME");
        Ok(DcvCname {
            host: challenge.host,
            target: challenge.point,
        })
    }

    async fn process(&self, record: &mut CombinedRecord) -> Option<TokenOutcome> {
        let domain = record.get("name").to_string();
        if domain.is_empty() || !self.selected(&domain) {
            return None;
        }
        let ca = record.ca()?;
        tracing::info!("Processing {} domain: {}", ca, domain);

        let mut outcome = TokenOutcome {
            domain: domain.clone(),
            ca,
            cname: None,
            published: None,
            error: None,
        };

        let cname = match ca {
            CaKind::DigiCert => match &self.digicert {
                Some(client) => self.digicert_cname(client, record).await,
                None => Err(EtlError::missing_credential("DigiCert", "api")),
            },
            CaKind::Sectigo => match &self.sectigo {
                Some(client) => self.sectigo_cname(client, record).await,
                None => Err(EtlError::missing_credential("Sectigo", "login")),
            },
        };
        let cname = match cname {
            Ok(cname) => cname,
            Err(e) => {
                tracing::error!("❌ Failed to retrieve token for {}: {}", domain, e);
                outcome.error = Some(e.to_string());
                return Some(outcome);
            }
        };
        tracing::info!("✅ Token retrieved for {}", domain);

        if let Some(publisher) = &self.publisher {
            if record.get("ns_provider") == NsProvider::Azure.as_str() {
                match publisher.publish_cname(&cname.host, &cname.target).await {
                    Ok(zone) => outcome.published = Some(zone),
                    Err(e) => {
                        tracing::error!("❌ CNAME publish failed for {}: {}", domain, e);
                        outcome.error = Some(format!("publish failed: {}", e));
                    }
                }
            } else {
                tracing::info!(
                    "DNS for {} is hosted by {}; CNAME not published",
                    domain,
                    record.get("ns_provider")
                );
            }
        }
        outcome.cname = Some(cname);
        Some(outcome)
    }
}

#[async_trait]
impl<S: Storage> Pipeline for DcvTokensPipeline<S> {
    type Item = CombinedRecord;
    type Output = TokenReport;

    fn name(&self) -> &str {
        "dcv-tokens"
    }

    async fn extract(&self) -> Result<Vec<CombinedRecord>> {
        if !self.storage.exists(COMBINED_DOMAINS_CSV) {
            return Err(EtlError::ValidationError {
                message: format!(
                    "{} does not exist; run combine first",
                    self.storage.display_path(COMBINED_DOMAINS_CSV)
                ),
            });
        }
        let data = self.storage.read_file(COMBINED_DOMAINS_CSV).await?;
        parse_combined(&data)
    }

    /// 依序處理，避免同時大量呼叫 CA API
    async fn transform(&self, mut data: Vec<CombinedRecord>) -> Result<TokenReport> {
        let mut outcomes = Vec::new();
        for record in data.iter_mut() {
            if let Some(outcome) = self.process(record).await {
                outcomes.push(outcome);
            }
        }
        Ok(TokenReport {
            records: data,
            outcomes,
        })
    }

    async fn load(&self, report: TokenReport) -> Result<String> {
        let Some(first) = report.records.first() else {
            println!("No rows in {}.", COMBINED_DOMAINS_CSV);
            return Ok(self.storage.display_path(COMBINED_DOMAINS_CSV));
        };

        let mut table = Table::new("Combined Domains", &first.headers());
        for record in &report.records {
            table.push(record.cells());
        }
        self.storage
            .write_file(COMBINED_DOMAINS_CSV, &write_csv(&table)?)
            .await?;

        let retrieved = report.outcomes.iter().filter(|o| o.cname.is_some()).count();
        let published = report.outcomes.iter().filter(|o| o.published.is_some()).count();
        let failed = report.outcomes.iter().filter(|o| o.error.is_some()).count();
        let location = self.storage.display_path(COMBINED_DOMAINS_CSV);
        println!("\n📊 DCV tokens:");
        println!("   Domains processed: {}", report.outcomes.len());
        println!("   Tokens retrieved: {}", retrieved);
        if self.publisher.is_some() {
            println!("   CNAMEs published: {}", published);
        }
        println!("   Failures: {}", failed);
        println!("   Updated: {}", location);
        Ok(location)
    }
}
