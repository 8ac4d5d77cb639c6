use crate::adapters::digicert::{dcv_token, organization_id, DigiCertClient};
use crate::core::report::write_xlsx;
use crate::domain::model::{CaDomain, Cell, DnsAnswer, Table};
use crate::domain::ports::{NameserverLookup, Pipeline, RecordCount, Storage};
use crate::utils::error::Result;
use crate::utils::validation::is_valid_domain_name;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_REPORT_FILE: &str = "validation_report.xlsx";
pub const RECORD_TYPES: [&str; 6] = ["A", "AAAA", "MX", "TXT", "CNAME", "NS"];
pub const REPORT_HEADERS: [&str; 14] = [
    "Organization ID",
    "Domain",
    "Format Valid",
    "DigiCert Status",
    "DigiCert Org Match",
    "Validation Method",
    "Validation Record",
    "A Records",
    "AAAA Records",
    "MX Records",
    "TXT Records",
    "CNAME Records",
    "NS Records",
    "Issues",
];
const DCV_METHOD: &str = "dns-txt-token";

#[derive(Debug, Clone, PartialEq)]
pub struct DigicertStatus {
    pub exists: bool,
    pub status: String,
    pub validation_method: String,
    pub org_id: Option<String>,
    pub org_match: bool,
    pub validation_record: Option<String>,
    pub instructions: Option<String>,
}

impl DigicertStatus {
    fn not_checked() -> Self {
        Self {
            exists: false,
            status: "N/A".to_string(),
            validation_method: "N/A".to_string(),
            org_id: None,
            org_match: false,
            validation_record: None,
            instructions: None,
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        tracing::warn!("⚠️ DigiCert check failed: {}", message);
        Self {
            status: "error".to_string(),
            validation_method: "none".to_string(),
            ..Self::not_checked()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainCheck {
    pub domain: String,
    pub format_valid: bool,
    pub digicert: DigicertStatus,
    pub records: HashMap<&'static str, Vec<String>>,
    pub issues: Vec<String>,
}

impl DomainCheck {
    pub fn record_count(&self, record_type: &str) -> usize {
        self.records.get(record_type).map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub table: Table,
    /// `(domain, instructions)` for domains that still need their TXT record.
    pub pending: Vec<(String, String)>,
}

impl RecordCount for ValidationReport {
    fn record_count(&self) -> usize {
        self.table.len()
    }
}

/// 網域格式、DigiCert 狀態與 DNS 紀錄檢查
pub struct DomainValidatorPipeline<S: Storage> {
    storage: S,
    output_file: String,
    client: DigiCertClient,
    dns: Arc<dyn NameserverLookup>,
    org_id: String,
    domains: Vec<String>,
}

impl<S: Storage> DomainValidatorPipeline<S> {
    pub fn new(
        storage: S,
        output_file: impl Into<String>,
        client: DigiCertClient,
        dns: Arc<dyn NameserverLookup>,
        org_id: &str,
        domains: Vec<String>,
    ) -> Self {
        Self {
            storage,
            output_file: output_file.into(),
            client,
            dns,
            org_id: org_id.to_string(),
            domains,
        }
    }

    async fn digicert_status(&self, domain: &str, inventory: &Result<Vec<CaDomain>>) -> DigicertStatus {
        let domains = match inventory {
            Ok(domains) => domains,
            Err(e) => return DigicertStatus::error(e),
        };

        match domains.iter().find(|d| d.name.eq_ignore_ascii_case(domain)) {
            Some(found) => match self.client.domain_details(&found.id).await {
                Ok(details) => self.existing_status(&details),
                Err(e) => DigicertStatus::error(e),
            },
            None => self.add_for_validation(domain).await,
        }
    }

    fn existing_status(&self, details: &Value) -> DigicertStatus {
        let org_id = organization_id(details);
        let text = |key: &str| {
            details
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        DigicertStatus {
            exists: true,
            status: text("status"),
            validation_method: text("dcv_method"),
            org_match: org_id.as_deref() == Some(self.org_id.as_str()),
            org_id,
            validation_record: None,
            instructions: None,
        }
    }

    /// 不在 DigiCert 的網域：以 TXT 驗證加入組織
    async fn add_for_validation(&self, domain: &str) -> DigicertStatus {
        match self
            .client
            .add_domain(domain, &self.org_id, &[DCV_METHOD], DCV_METHOD)
            .await
        {
            Ok(body) => {
                let record = dcv_token(&body);
                let instructions = format!(
                    "Add the following TXT record to your domain's DNS:\nHost: _dnsauth.{}\nValue: {}",
                    domain,
                    record.as_deref().unwrap_or("(token not returned)")
                );
                DigicertStatus {
                    exists: true,
                    status: "pending".to_string(),
                    validation_method: DCV_METHOD.to_string(),
                    org_id: Some(self.org_id.clone()),
                    org_match: true,
                    validation_record: record,
                    instructions: Some(instructions),
                }
            }
            Err(e) => DigicertStatus::error(format!("Failed to add domain: {}", e)),
        }
    }

    pub async fn check_domain(&self, domain: &str, inventory: &Result<Vec<CaDomain>>) -> DomainCheck {
        let mut check = DomainCheck {
            domain: domain.to_string(),
            format_valid: is_valid_domain_name(domain),
            digicert: DigicertStatus::not_checked(),
            records: HashMap::new(),
            issues: Vec::new(),
        };

        if !check.format_valid {
            check.issues.push("Invalid domain format".to_string());
            return check;
        }

        check.digicert = self.digicert_status(domain, inventory).await;
        if !check.digicert.exists {
            check.issues.push("Domain not found in DigiCert".to_string());
        } else if !check.digicert.org_match {
            check.issues.push(format!(
                "Domain belongs to different organization (ID: {})",
                check.digicert.org_id.as_deref().unwrap_or("unknown")
            ));
        }

        for record_type in RECORD_TYPES {
            match self.dns.lookup(domain, record_type).await {
                Ok(DnsAnswer::Records(values)) => {
                    check.records.insert(record_type, values);
                }
                Ok(DnsAnswer::NoAnswer) => {
                    check.records.insert(record_type, Vec::new());
                }
                Ok(DnsAnswer::NxDomain) => {
                    check.issues.push("Domain does not exist (NXDOMAIN)".to_string());
                    break;
                }
                Err(e) => check
                    .issues
                    .push(format!("Error checking {} records: {}", record_type, e)),
            }
        }

        if check.issues.is_empty() {
            if check.record_count("A") == 0 && check.record_count("AAAA") == 0 {
                check.issues.push("No A or AAAA records found".to_string());
            }
            if check.record_count("MX") == 0 {
                check.issues.push("No MX records found".to_string());
            }
            if check.record_count("NS") == 0 {
                check.issues.push("No NS records found".to_string());
            }
        }
        check
    }

    fn row(&self, check: &DomainCheck) -> Vec<Cell> {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        let mut cells = vec![
            self.org_id.clone().into(),
            check.domain.clone().into(),
            yes_no(check.format_valid).into(),
            check.digicert.status.clone().into(),
            yes_no(check.digicert.org_match).into(),
            check.digicert.validation_method.clone().into(),
            check
                .digicert
                .validation_record
                .clone()
                .unwrap_or_else(|| "N/A".to_string())
                .into(),
        ];
        cells.extend(RECORD_TYPES.iter().map(|t| check.record_count(t).into()));
        cells.push(if check.issues.is_empty() {
            "None".into()
        } else {
            check.issues.join("; ").into()
        });
        cells
    }
}

#[async_trait]
impl<S: Storage> Pipeline for DomainValidatorPipeline<S> {
    type Item = String;
    type Output = ValidationReport;

    fn name(&self) -> &str {
        "validate"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        Ok(self
            .domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect())
    }

    async fn transform(&self, data: Vec<String>) -> Result<ValidationReport> {
        // 組織網域清單只抓一次
        let inventory = if data.iter().any(|d| is_valid_domain_name(d)) {
            self.client.list_domains().await
        } else {
            Ok(Vec::new())
        };

        let mut table = Table::new("Validation Report", &REPORT_HEADERS);
        let mut pending = Vec::new();
        let total = data.len();
        for (i, domain) in data.iter().enumerate() {
            tracing::info!("🔍 [{}/{}] Validating {}", i + 1, total, domain);
            let check = self.check_domain(domain, &inventory).await;
            if let Some(instructions) = &check.digicert.instructions {
                pending.push((check.domain.clone(), instructions.clone()));
            }
            table.push(self.row(&check));
        }
        Ok(ValidationReport { table, pending })
    }

    async fn load(&self, report: ValidationReport) -> Result<String> {
        if report.table.is_empty() {
            println!("No validation results to report");
            return Ok("No validation results to report".to_string());
        }

        self.storage
            .write_file(&self.output_file, &write_xlsx(&report.table)?)
            .await?;
        let location = self.storage.display_path(&self.output_file);
        println!("\nReport saved to: {}", location);

        for (domain, instructions) in &report.pending {
            println!("\nValidation required for {}:", domain);
            println!("{}", instructions);
        }
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::app::pipelines::combine::tests::StaticLookup;
    use crate::core::etl::EtlEngine;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn full_records(domain: &str) -> Vec<(&str, &'static str, DnsAnswer)> {
        vec![
            (domain, "A", DnsAnswer::Records(vec!["192.0.2.1".into()])),
            (domain, "AAAA", DnsAnswer::NoAnswer),
            (domain, "MX", DnsAnswer::Records(vec!["10 mail.example".into()])),
            (domain, "TXT", DnsAnswer::Records(vec!["v=spf1 -all".into(), "x".into()])),
            (domain, "CNAME", DnsAnswer::NoAnswer),
            (domain, "NS", DnsAnswer::Records(vec!["ns1.example".into()])),
        ]
    }

    fn pipeline(server: &MockServer, dir: &TempDir, dns: StaticLookup, domains: &[&str]) -> DomainValidatorPipeline<LocalStorage> {
        DomainValidatorPipeline::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            DEFAULT_REPORT_FILE,
            DigiCertClient::new(&server.base_url(), "key").unwrap(),
            Arc::new(dns),
            "123",
            domains.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn mock_inventory(server: &MockServer) {
        server.mock(|when, then| {
            when.method(GET).path("/domain");
            then.status(200).json_body(json!({
                "domains": [{"id": 1, "name": "ok.example"}, {"id": 2, "name": "foreign.example"}],
                "page": {"total": 2}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/1");
            then.status(200).json_body(json!({
                "status": "active", "dcv_method": "dns-txt-token", "organization": {"id": 123}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/2");
            then.status(200).json_body(json!({"status": "active", "organization": {"id": 999}}));
        });
    }

    #[tokio::test]
    async fn test_healthy_domain_has_no_issues() {
        let server = MockServer::start();
        mock_inventory(&server);
        let dir = TempDir::new().unwrap();
        let p = pipeline(&server, &dir, StaticLookup::new(&full_records("ok.example")), &[]);

        let inventory = p.client.list_domains().await;
        let check = p.check_domain("ok.example", &inventory).await;
        assert!(check.issues.is_empty());
        assert_eq!(check.digicert.status, "active");
        assert!(check.digicert.org_match);
        assert_eq!(check.record_count("TXT"), 2);

        let row = p.row(&check);
        assert_eq!(row.len(), REPORT_HEADERS.len());
        assert_eq!(row[6], Cell::text("N/A"));
        assert_eq!(row[7], Cell::Number(1.0));
        assert_eq!(row[13], Cell::text("None"));
    }

    #[tokio::test]
    async fn test_other_org_and_nxdomain_issues() {
        let server = MockServer::start();
        mock_inventory(&server);
        let dir = TempDir::new().unwrap();
        let dns = StaticLookup::new(&[
            ("foreign.example", "A", DnsAnswer::NxDomain),
        ]);
        let p = pipeline(&server, &dir, dns, &[]);

        let inventory = p.client.list_domains().await;
        let check = p.check_domain("foreign.example", &inventory).await;
        assert_eq!(
            check.issues,
            vec![
                "Domain belongs to different organization (ID: 999)".to_string(),
                "Domain does not exist (NXDOMAIN)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_format_skips_api_and_dns() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET).path("/domain");
            then.status(200).json_body(json!([]));
        });
        let dir = TempDir::new().unwrap();
        let p = pipeline(&server, &dir, StaticLookup::new(&[]), &["not_a domain"]);

        let report = p.transform(p.extract().await.unwrap()).await.unwrap();
        list.assert_hits(0);
        let row = &report.table.rows[0].cells;
        assert_eq!(row[2], Cell::text("No"));
        assert_eq!(row[3], Cell::text("N/A"));
        assert_eq!(row[13], Cell::text("Invalid domain format"));
    }

    #[tokio::test]
    async fn test_unknown_domain_is_added_and_reported_pending() {
        let server = MockServer::start();
        mock_inventory(&server);
        let add = server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"new.example","dcv_method":"dns-txt-token"}"#);
            then.status(201).json_body(json!({"id": 3, "dcv_token": {"token": "abc123"}}));
        });
        let dir = TempDir::new().unwrap();
        let mut records = full_records("new.example");
        records.retain(|(_, t, _)| *t != "MX");
        records.push(("new.example", "MX", DnsAnswer::NoAnswer));
        let p = pipeline(&server, &dir, StaticLookup::new(&records), &["new.example"]);

        let location = EtlEngine::new(p).run().await.unwrap();
        add.assert();
        assert!(location.ends_with(DEFAULT_REPORT_FILE));
        let bytes = std::fs::read(dir.path().join(DEFAULT_REPORT_FILE)).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_pending_row_carries_token_and_missing_mx() {
        let server = MockServer::start();
        mock_inventory(&server);
        server.mock(|when, then| {
            when.method(POST).path("/domain");
            then.status(201).json_body(json!({"id": 3, "dcv_token": {"token": "abc123"}}));
        });
        let dir = TempDir::new().unwrap();
        let mut records = full_records("new.example");
        records.retain(|(_, t, _)| *t != "MX");
        records.push(("new.example", "MX", DnsAnswer::NoAnswer));
        let p = pipeline(&server, &dir, StaticLookup::new(&records), &["new.example"]);

        let report = p.transform(p.extract().await.unwrap()).await.unwrap();
        let row = &report.table.rows[0].cells;
        assert_eq!(row[3], Cell::text("pending"));
        assert_eq!(row[6], Cell::text("abc123"));
        assert_eq!(row[13], Cell::text("No MX records found"));
        assert!(report.pending[0].1.contains("Host: _dnsauth.new.example"));
    }
}
