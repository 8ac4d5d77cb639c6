use super::{ca_details_file, parse_csv, DOMAIN_ID_LOOKUP_CSV};
use crate::adapters::digicert::DigiCertClient;
use crate::adapters::sectigo::SectigoClient;
use crate::core::report::write_csv;
use crate::domain::model::{
    digicert_dcv_label, sectigo_dcv_label, CaDomainDetail, CaKind, DomainIdEntry, Table,
};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

pub const DETAIL_HEADERS: [&str; 5] = ["id", "name", "active", "dcv_method", "Expiration"];

pub enum DetailSource {
    DigiCert(DigiCertClient),
    Sectigo(SectigoClient),
}

impl DetailSource {
    pub fn kind(&self) -> CaKind {
        match self {
            DetailSource::DigiCert(_) => CaKind::DigiCert,
            DetailSource::Sectigo(_) => CaKind::Sectigo,
        }
    }

    /// `Ok(None)` when the CA no longer knows the id.
    async fn fetch(&self, entry: &DomainIdEntry) -> Result<Option<CaDomainDetail>> {
        match self {
            DetailSource::DigiCert(client) => {
                let details = client.domain_details(&entry.id).await?;
                Ok(Some(digicert_detail(entry, &details)))
            }
            DetailSource::Sectigo(client) => Ok(client
                .domain_details(&entry.id)
                .await?
                .map(|details| sectigo_detail(entry, &details))),
        }
    }
}

fn str_of<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn digicert_detail(entry: &DomainIdEntry, details: &Value) -> CaDomainDetail {
    let expiration = str_of(details, "dcv_expiration_datetime")
        .map(|raw| raw.split('T').next().unwrap_or(raw).to_string())
        .unwrap_or_default();
    let active = details
        .get("is_active")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let name = str_of(details, "name")
        .or_else(|| str_of(details, "common_name"))
        .unwrap_or(&entry.domain);

    CaDomainDetail {
        id: entry.id.clone(),
        name: name.to_string(),
        active: if active { "ACTIVE".to_string() } else { String::new() },
        dcv_method: digicert_dcv_label(str_of(details, "dcv_method")),
        expiration,
    }
}

pub fn sectigo_detail(entry: &DomainIdEntry, details: &Value) -> CaDomainDetail {
    CaDomainDetail {
        id: entry.id.clone(),
        name: str_of(details, "name").unwrap_or(&entry.domain).to_string(),
        active: str_of(details, "state").unwrap_or_default().to_string(),
        dcv_method: sectigo_dcv_label(str_of(details, "validationMethod")),
        expiration: str_of(details, "dcvExpiration").unwrap_or_default().to_string(),
    }
}

pub fn detail_table(details: &[CaDomainDetail]) -> Table {
    let mut table = Table::new("Domains", &DETAIL_HEADERS);
    for d in details {
        table.push(vec![
            d.id.clone().into(),
            d.name.clone().into(),
            d.active.clone().into(),
            d.dcv_method.clone().into(),
            d.expiration.clone().into(),
        ]);
    }
    table
}

/// 讀取 `domain_id_lookup.csv`，逐一查詢該 CA 的網域詳細資料
pub struct CaDetailsPipeline<S: Storage> {
    storage: S,
    source: DetailSource,
    concurrency: usize,
}

impl<S: Storage> CaDetailsPipeline<S> {
    pub fn new(storage: S, source: DetailSource, concurrency: usize) -> Self {
        Self {
            storage,
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub fn output_file(&self) -> String {
        ca_details_file(self.source.kind())
    }
}

#[async_trait]
impl<S: Storage> Pipeline for CaDetailsPipeline<S> {
    type Item = DomainIdEntry;
    type Output = Table;

    fn name(&self) -> &str {
        match self.source.kind() {
            CaKind::DigiCert => "ca-details digicert",
            CaKind::Sectigo => "ca-details sectigo",
        }
    }

    async fn extract(&self) -> Result<Vec<DomainIdEntry>> {
        if !self.storage.exists(DOMAIN_ID_LOOKUP_CSV) {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "Input file {} not found; run `ops-etl domain-ids` first",
                    self.storage.display_path(DOMAIN_ID_LOOKUP_CSV)
                ),
            });
        }

        let data = self.storage.read_file(DOMAIN_ID_LOOKUP_CSV).await?;
        let kind = self.source.kind();
        let entries: Vec<DomainIdEntry> = parse_csv::<DomainIdEntry>(&data)?
            .into_iter()
            .filter(|e| kind.matches(&e.ca) && !e.id.is_empty())
            .collect();

        tracing::info!("Found {} {} domains in lookup CSV", entries.len(), kind);
        Ok(entries)
    }

    async fn transform(&self, data: Vec<DomainIdEntry>) -> Result<Table> {
        let source = &self.source;

        // buffered 保持輸入順序
        let details: Vec<CaDomainDetail> = stream::iter(data)
            .map(|entry| async move {
                tracing::debug!("Fetching details for ID {} ({})", entry.id, entry.domain);
                match source.fetch(&entry).await {
                    Ok(Some(detail)) => Some(detail),
                    Ok(None) => {
                        tracing::warn!("⚠️ Domain ID {} not found, skipping", entry.id);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("⚠️ Skipping {} ({}): {}", entry.id, entry.domain, e);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .filter_map(|detail| async move { detail })
            .collect()
            .await;

        Ok(detail_table(&details))
    }

    async fn load(&self, table: Table) -> Result<String> {
        let file = self.output_file();
        tracing::info!("Writing {} results to {}", table.len(), file);
        self.storage.write_file(&file, &write_csv(&table)?).await?;
        Ok(self.storage.display_path(&file))
    }
}
