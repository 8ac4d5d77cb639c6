use super::{ca_details_file, parse_csv, COMBINED_DOMAINS_CSV};
use crate::core::report::write_csv;
use crate::domain::model::{CaDomainDetail, CaKind, NsProvider, Table};
use crate::domain::ports::{NameserverLookup, Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

pub const NO_DATA_MESSAGE: &str = "No data found to combine";

/// 合併兩家 CA 的明細並標註 NS 供應商 → `combined_domains.csv`
pub struct CombinePipeline<S: Storage> {
    storage: S,
    dns: Arc<dyn NameserverLookup>,
    concurrency: usize,
}

impl<S: Storage> CombinePipeline<S> {
    pub fn new(storage: S, dns: Arc<dyn NameserverLookup>, concurrency: usize) -> Self {
        Self {
            storage,
            dns,
            concurrency: concurrency.max(1),
        }
    }
}

/// Lookup failures count as `Other`.
pub async fn ns_provider(dns: &dyn NameserverLookup, domain: &str) -> NsProvider {
    let domain = domain.trim();
    if domain.is_empty() {
        return NsProvider::Other;
    }
    match dns.nameservers(domain).await {
        Ok(ns) => NsProvider::classify(&ns),
        Err(e) => {
            tracing::warn!("⚠️ NS lookup failed for {}: {}", domain, e);
            NsProvider::Other
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for CombinePipeline<S> {
    type Item = (CaKind, CaDomainDetail);
    type Output = Table;

    fn name(&self) -> &str {
        "combine"
    }

    async fn extract(&self) -> Result<Vec<(CaKind, CaDomainDetail)>> {
        let mut rows = Vec::new();
        for ca in [CaKind::DigiCert, CaKind::Sectigo] {
            let file = ca_details_file(ca);
            if !self.storage.exists(&file) {
                tracing::warn!("⚠️ {} not found. Skipping.", self.storage.display_path(&file));
                continue;
            }
            tracing::info!("Processing {}...", file);
            let data = self.storage.read_file(&file).await?;
            rows.extend(
                parse_csv::<CaDomainDetail>(&data)?
                    .into_iter()
                    .map(|detail| (ca, detail)),
            );
        }
        Ok(rows)
    }

    async fn transform(&self, data: Vec<(CaKind, CaDomainDetail)>) -> Result<Table> {
        let dns = self.dns.as_ref();
        let names: Vec<String> = data.iter().map(|(_, detail)| detail.name.clone()).collect();
        let providers: Vec<NsProvider> = stream::iter(names)
            .map(|name| async move { ns_provider(dns, &name).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut table = Table::new(
            "Combined Domains",
            &["provider", "id", "name", "active", "dcv_method", "Expiration", "ns_provider"],
        );
        for ((ca, detail), ns) in data.into_iter().zip(providers) {
            table.push(vec![
                ca.provider_label().into(),
                detail.id.into(),
                detail.name.into(),
                detail.active.into(),
                detail.dcv_method.into(),
                detail.expiration.into(),
                ns.as_str().into(),
            ]);
        }
        Ok(table)
    }

    async fn load(&self, table: Table) -> Result<String> {
        if table.is_empty() {
            println!("{}.", NO_DATA_MESSAGE);
            return Ok(NO_DATA_MESSAGE.to_string());
        }
        tracing::info!("Writing {} rows to {}", table.len(), COMBINED_DOMAINS_CSV);
        self.storage
            .write_file(COMBINED_DOMAINS_CSV, &write_csv(&table)?)
            .await?;
        Ok(self.storage.display_path(COMBINED_DOMAINS_CSV))
    }
}
