use super::{file_timestamp, COMBINED_DOMAINS_CSV};
use crate::adapters::digicert::DigiCertClient;
use crate::adapters::http::value_to_string;
use crate::adapters::sectigo::SectigoClient;
use crate::core::report::write_csv;
use crate::domain::model::{CaDomain, CaKind, Table};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::audit::AuditLog;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::normalize_domain;
use async_trait::async_trait;
use serde_json::Value;

pub const AUDIT_LOG_FILE: &str = "add-remove.log";
const SECTIGO_DESCRIPTION: &str = "Domain created via ops-etl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Add,
    Remove,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::Add => "add",
            AdminAction::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminOutcome {
    pub ca: CaKind,
    pub action: AdminAction,
    pub domain: String,
    pub id: String,
    pub status: String,
    pub detail: String,
}

/// 在 DigiCert 與 Sectigo 新增或移除單一網域
pub struct DomainAdminPipeline<S: Storage> {
    storage: S,
    action: AdminAction,
    domain: String,
    digicert: Option<(DigiCertClient, Option<String>)>,
    sectigo: Option<(SectigoClient, Option<String>)>,
    audit: AuditLog,
    output_file: String,
}

impl<S: Storage> DomainAdminPipeline<S> {
    pub fn new(
        storage: S,
        action: AdminAction,
        domain: &str,
        digicert: Option<(DigiCertClient, Option<String>)>,
        sectigo: Option<(SectigoClient, Option<String>)>,
        audit: AuditLog,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            action,
            domain: normalize_domain("domain", domain)?,
            digicert,
            sectigo,
            audit,
            output_file: format!("add_remove_{}.csv", file_timestamp()),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn outcome(&self, ca: CaKind, id: &str, status: &str, detail: impl Into<String>) -> AdminOutcome {
        AdminOutcome {
            ca,
            action: self.action,
            domain: self.domain.clone(),
            id: id.to_string(),
            status: status.to_string(),
            detail: detail.into(),
        }
    }

    fn skipped(&self, ca: CaKind) -> AdminOutcome {
        let message = format!("Missing {} credentials/org ID in the vault", ca);
        println!("[{}] {}", ca, message);
        self.outcome(ca, "", "skipped", message)
    }

    fn failed(&self, ca: CaKind, section: &str, id: &str, error: EtlError) -> AdminOutcome {
        println!("[{}] ❌ ERROR during {} of '{}': {}", ca, self.action.as_str(), self.domain, error);
        self.audit.error(section, &self.domain, &error);
        self.outcome(ca, id, "error", error.to_string())
    }

    fn print_details(&self, ca: CaKind, details: &Value) {
        match serde_json::to_string_pretty(details) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("[{}] Could not retrieve details.", ca),
        }
    }

    async fn add_digicert(&self) -> AdminOutcome {
        let (client, org_id) = match &self.digicert {
            Some((client, Some(org_id))) => (client, org_id),
            _ => return self.skipped(CaKind::DigiCert),
        };

        let body = match client
            .add_domain(&self.domain, org_id, &["ov", "ev"], "dns-cname-token")
            .await
        {
            Ok(body) => body,
            Err(e) => return self.failed(CaKind::DigiCert, "DigiCert-ADD", "", e),
        };
        self.audit.json("DigiCert-ADD", &self.domain, &body);
        println!("[DigiCert] ✅ Added: {}", self.domain);

        let id = match body.get("id").and_then(value_to_string) {
            Some(id) => id,
            None => return self.outcome(CaKind::DigiCert, "", "added", "no id in response"),
        };

        println!("[DigiCert] Verifying details for ID {}...", id);
        match client.domain_details(&id).await {
            Ok(details) => {
                self.audit.json("DigiCert-DETAILS", &self.domain, &details);
                self.print_details(CaKind::DigiCert, &details);
                let status = details
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.outcome(CaKind::DigiCert, &id, "added", status)
            }
            Err(e) => {
                self.audit.error("DigiCert-DETAILS", &self.domain, &e);
                println!("[DigiCert] Could not retrieve details.");
                self.outcome(CaKind::DigiCert, &id, "added", format!("details unavailable: {}", e))
            }
        }
    }

    async fn add_sectigo(&self) -> AdminOutcome {
        let (client, org_id) = match &self.sectigo {
            Some((client, Some(org_id))) => (client, org_id),
            _ => return self.skipped(CaKind::Sectigo),
        };

        let added = match client
            .add_domain(&self.domain, org_id, SECTIGO_DESCRIPTION)
            .await
        {
            Ok(added) => added,
            Err(e) => return self.failed(CaKind::Sectigo, "Sectigo-ADD", "", e),
        };
        self.audit.json("Sectigo-ADD", &self.domain, &added.body);
        println!("[Sectigo] ✅ Added: {}", self.domain);

        let id = match added.id {
            Some(id) => id,
            None => return self.outcome(CaKind::Sectigo, "", "added", "no id in response"),
        };

        println!("[Sectigo] Verifying details for ID {}...", id);
        match client.domain_details(&id).await {
            Ok(Some(details)) => {
                self.audit.json("Sectigo-DETAILS", &self.domain, &details);
                self.print_details(CaKind::Sectigo, &details);
                let state = details
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.outcome(CaKind::Sectigo, &id, "added", state)
            }
            Ok(None) => {
                println!("[Sectigo] Could not retrieve details.");
                self.outcome(CaKind::Sectigo, &id, "added", "details not found")
            }
            Err(e) => {
                self.audit.error("Sectigo-DETAILS", &self.domain, &e);
                println!("[Sectigo] Could not retrieve details.");
                self.outcome(CaKind::Sectigo, &id, "added", format!("details unavailable: {}", e))
            }
        }
    }

    /// Id of `domain` for `ca` in `combined_domains.csv` (col 0 = CA, col 1 = id, col 2 = domain).
    async fn find_in_combined(&self, ca: CaKind) -> Result<Option<String>> {
        if !self.storage.exists(COMBINED_DOMAINS_CSV) {
            println!("CSV file not found: {}", self.storage.display_path(COMBINED_DOMAINS_CSV));
            return Ok(None);
        }
        let data = self.storage.read_file(COMBINED_DOMAINS_CSV).await?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_slice());

        for record in reader.records() {
            let record = record?;
            if record.len() < 3 {
                continue;
            }
            if ca.matches(&record[0]) && record[2].trim().eq_ignore_ascii_case(&self.domain) {
                return Ok(Some(record[1].trim().to_string()));
            }
        }
        Ok(None)
    }

    fn verification(&self, ca: CaKind, id: &str, listed: Result<Option<CaDomain>>) -> AdminOutcome {
        match listed {
            Ok(None) => {
                println!(
                    "[{}] Verification: Domain '{}' is successfully removed (not found in list).",
                    ca, self.domain
                );
                self.outcome(ca, id, "removed", "successfully removed")
            }
            Ok(Some(_)) => {
                println!(
                    "[{}] ⚠️ Verification: Domain '{}' was still found in the list!",
                    ca, self.domain
                );
                self.outcome(ca, id, "still found", "still found")
            }
            Err(e) => {
                println!("[{}] Verification error: {}", ca, e);
                self.outcome(ca, id, "removed", format!("verification failed: {}", e))
            }
        }
    }

    async fn remove_from(&self, ca: CaKind) -> Result<AdminOutcome> {
        let Some(id) = self.find_in_combined(ca).await? else {
            println!(
                "[{}] Could not find domain '{}' in CSV for {} (will not attempt removal).",
                ca, self.domain, ca
            );
            return Ok(self.outcome(ca, "", "not found", "not in combined_domains.csv"));
        };

        let section = format!("{}-REMOVE", ca);
        let outcome = match (ca, &self.digicert, &self.sectigo) {
            (CaKind::DigiCert, Some((client, _)), _) => match client.delete_domain(&id).await {
                Ok(()) => {
                    println!("[DigiCert] 🗑️ Removed: {}", self.domain);
                    self.verification(ca, &id, client.find_domain(&self.domain).await)
                }
                Err(e) => self.failed(ca, &section, &id, e),
            },
            (CaKind::Sectigo, _, Some((client, _))) => match client.delete_domain(&id).await {
                Ok(()) => {
                    println!("[Sectigo] 🗑️ Removed: {} (ID {})", self.domain, id);
                    self.verification(ca, &id, client.find_domain(&self.domain).await)
                }
                Err(e) => self.failed(ca, &section, &id, e),
            },
            _ => self.skipped(ca),
        };
        Ok(outcome)
    }
}

#[async_trait]
impl<S: Storage> Pipeline for DomainAdminPipeline<S> {
    type Item = AdminOutcome;
    type Output = Table;

    fn name(&self) -> &str {
        match self.action {
            AdminAction::Add => "domain add",
            AdminAction::Remove => "domain remove",
        }
    }

    async fn extract(&self) -> Result<Vec<AdminOutcome>> {
        println!(
            "\n{}ing domain '{}' with DigiCert and Sectigo...\n",
            match self.action {
                AdminAction::Add => "Add",
                AdminAction::Remove => "Remov",
            },
            self.domain
        );

        let outcomes = match self.action {
            AdminAction::Add => vec![self.add_digicert().await, self.add_sectigo().await],
            // Sectigo 先刪
            AdminAction::Remove => vec![
                self.remove_from(CaKind::Sectigo).await?,
                self.remove_from(CaKind::DigiCert).await?,
            ],
        };
        Ok(outcomes)
    }

    async fn transform(&self, data: Vec<AdminOutcome>) -> Result<Table> {
        let mut table = Table::new("Add Remove", &["ca", "action", "domain", "id", "status", "detail"]);
        for o in data {
            table.push(vec![
                o.ca.display_name().into(),
                o.action.as_str().into(),
                o.domain.into(),
                o.id.into(),
                o.status.into(),
                o.detail.into(),
            ]);
        }
        Ok(table)
    }

    async fn load(&self, table: Table) -> Result<String> {
        self.storage
            .write_file(&self.output_file, &write_csv(&table)?)
            .await?;
        println!("\nDone.");
        println!("\nAll activity logged in {}", self.audit.path().display());
        Ok(self.storage.display_path(&self.output_file))
    }
}
