use super::DOMAIN_ID_LOOKUP_CSV;
use crate::adapters::digicert::DigiCertClient;
use crate::adapters::sectigo::SectigoClient;
use crate::core::report::write_csv;
use crate::domain::model::{CaDomain, CaKind, DomainIdEntry, Table};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 列出兩家 CA 的所有網域 → `domain_id_lookup.csv`
pub struct DomainLookupPipeline<S: Storage> {
    storage: S,
    digicert: Option<DigiCertClient>,
    sectigo: Option<SectigoClient>,
}

impl<S: Storage> DomainLookupPipeline<S> {
    pub fn new(storage: S, digicert: Option<DigiCertClient>, sectigo: Option<SectigoClient>) -> Self {
        Self {
            storage,
            digicert,
            sectigo,
        }
    }
}

fn entries(ca: CaKind, domains: Vec<CaDomain>) -> Vec<DomainIdEntry> {
    domains
        .into_iter()
        .map(|d| DomainIdEntry {
            id: d.id,
            domain: d.name,
            ca: ca.display_name().to_string(),
        })
        .collect()
}

#[async_trait]
impl<S: Storage> Pipeline for DomainLookupPipeline<S> {
    type Item = DomainIdEntry;
    type Output = Table;

    fn name(&self) -> &str {
        "domain-ids"
    }

    async fn extract(&self) -> Result<Vec<DomainIdEntry>> {
        let mut all = Vec::new();

        if let Some(client) = &self.digicert {
            tracing::info!("Fetching DigiCert domains...");
            match client.list_domains().await {
                Ok(domains) => all.extend(entries(CaKind::DigiCert, domains)),
                Err(e) => tracing::error!("❌ DigiCert domain list failed: {}", e),
            }
        }

        if let Some(client) = &self.sectigo {
            tracing::info!("Fetching Sectigo domains...");
            match client.list_domains().await {
                Ok(domains) => all.extend(entries(CaKind::Sectigo, domains)),
                Err(e) => tracing::error!("❌ Sectigo domain list failed: {}", e),
            }
        }

        Ok(all)
    }

    async fn transform(&self, data: Vec<DomainIdEntry>) -> Result<Table> {
        let mut table = Table::new("Domain IDs", &["id", "domain", "CA"]);
        for entry in data {
            table.push(vec![entry.id.into(), entry.domain.into(), entry.ca.into()]);
        }
        Ok(table)
    }

    async fn load(&self, table: Table) -> Result<String> {
        tracing::info!("Saving {} records to {}", table.len(), DOMAIN_ID_LOOKUP_CSV);
        self.storage
            .write_file(DOMAIN_ID_LOOKUP_CSV, &write_csv(&table)?)
            .await?;
        Ok(self.storage.display_path(DOMAIN_ID_LOOKUP_CSV))
    }
}
