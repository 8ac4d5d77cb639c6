use crate::adapters::azure::{AzureClient, DnsZone, RecordSet, VnetLink, ZoneKind};
use crate::core::report::write_xlsx;
use crate::domain::model::{Cell, Highlight, Table};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;

pub const DEFAULT_REPORT_FILE: &str = "azure_dns_report.xlsx";
pub const NO_DATA_MESSAGE: &str = "No DNS data found to report";
pub const REPORT_HEADERS: [&str; 8] = [
    "subscription_id",
    "resource_group",
    "zone_name",
    "zone_type",
    "record_type",
    "record_name",
    "record_values",
    "linked_vnets",
];

/// One zone with the record sets kept for the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneInventory {
    pub subscription_id: String,
    pub zone: DnsZone,
    pub records: Vec<RecordSet>,
    pub vnets: Vec<VnetLink>,
}

impl ZoneInventory {
    fn linked_vnets(&self) -> String {
        self.vnets
            .iter()
            .map(VnetLink::label)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// 公有區域略過 SOA / NS
fn keep_record(kind: ZoneKind, record: &RecordSet) -> bool {
    kind == ZoneKind::Private || !matches!(record.record_type.as_str(), "SOA" | "NS")
}

/// 所有訂閱的公有與私有 DNS 區域清單
pub struct AzureDnsReportPipeline<S: Storage> {
    storage: S,
    output_file: String,
    client: AzureClient,
    fallback_subscription: Option<String>,
}

impl<S: Storage> AzureDnsReportPipeline<S> {
    pub fn new(
        storage: S,
        output_file: impl Into<String>,
        client: AzureClient,
        fallback_subscription: Option<String>,
    ) -> Self {
        Self {
            storage,
            output_file: output_file.into(),
            client,
            fallback_subscription,
        }
    }

    async fn subscription_ids(&self) -> Result<Vec<String>> {
        match self.client.subscriptions().await {
            Ok(subs) if !subs.is_empty() => {
                for sub in &subs {
                    tracing::debug!("Subscription {} ({})", sub.id, sub.display_name);
                }
                Ok(subs.into_iter().map(|s| s.id).collect())
            }
            result => {
                if let Err(e) = &result {
                    tracing::warn!("⚠️ Could not list subscriptions: {}", e);
                }
                match &self.fallback_subscription {
                    Some(id) => {
                        tracing::info!("Using subscription {} from the vault", id);
                        Ok(vec![id.clone()])
                    }
                    None => result.map(|_| Vec::new()),
                }
            }
        }
    }

    async fn zones(&self, subscription_id: &str) -> Vec<DnsZone> {
        let mut zones = Vec::new();
        match self.client.public_zones(subscription_id).await {
            Ok(z) => zones.extend(z),
            Err(e) => tracing::error!("❌ Error getting public DNS zones for {}: {}", subscription_id, e),
        }
        match self.client.private_zones(subscription_id).await {
            Ok(z) => zones.extend(z),
            Err(e) => tracing::error!("❌ Error getting private DNS zones for {}: {}", subscription_id, e),
        }
        zones
    }

    async fn inventory(&self, subscription_id: &str, zone: DnsZone) -> Result<ZoneInventory> {
        let records: Vec<RecordSet> = self
            .client
            .record_sets(&zone)
            .await?
            .into_iter()
            .filter(|r| keep_record(zone.kind, r))
            .collect();

        let vnets = if zone.kind == ZoneKind::Private {
            match self.client.virtual_network_links(&zone).await {
                Ok(links) => links,
                Err(e) => {
                    tracing::warn!("⚠️ Could not list VNET links for {}: {}", zone.name, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(ZoneInventory {
            subscription_id: subscription_id.to_string(),
            zone,
            records,
            vnets,
        })
    }
}

/// 空區域一列紅底；私有區域沒有 VNET 連結則黃底
pub fn report_table(zones: &[ZoneInventory]) -> Table {
    let mut table = Table::new("DNS Report", &REPORT_HEADERS);

    for inv in zones {
        let linked = inv.linked_vnets();
        let base = |record_type: &str, record_name: &str, values: &str| -> Vec<Cell> {
            vec![
                inv.subscription_id.clone().into(),
                inv.zone.resource_group.clone().into(),
                inv.zone.name.clone().into(),
                inv.zone.kind.as_str().into(),
                record_type.into(),
                record_name.into(),
                values.into(),
                linked.clone().into(),
            ]
        };

        if inv.records.is_empty() {
            table.push_row(base("", "", ""), Some(Highlight::Red));
            continue;
        }

        let highlight = (inv.zone.kind == ZoneKind::Private && inv.vnets.is_empty())
            .then_some(Highlight::Yellow);
        for record in &inv.records {
            table.push_row(
                base(&record.record_type, &record.name, &record.values),
                highlight,
            );
        }
    }
    table
}

#[async_trait]
impl<S: Storage> Pipeline for AzureDnsReportPipeline<S> {
    type Item = ZoneInventory;
    type Output = Table;

    fn name(&self) -> &str {
        "azure-dns"
    }

    async fn extract(&self) -> Result<Vec<ZoneInventory>> {
        println!("Starting Azure DNS report generation...");
        let subscriptions = self.subscription_ids().await?;
        println!("Found {} subscriptions", subscriptions.len());

        let mut inventories = Vec::new();
        for sub_id in &subscriptions {
            println!("\nProcessing subscription: {}", sub_id);
            let zones = self.zones(sub_id).await;
            println!("Found {} DNS zones", zones.len());

            for zone in zones {
                let zone_name = zone.name.clone();
                match self.inventory(sub_id, zone).await {
                    Ok(inv) => {
                        println!("Processed {} records for zone {}", inv.records.len(), zone_name);
                        inventories.push(inv);
                    }
                    Err(e) => {
                        tracing::error!("❌ Error getting record sets for zone {}: {}", zone_name, e)
                    }
                }
            }
        }
        Ok(inventories)
    }

    async fn transform(&self, data: Vec<ZoneInventory>) -> Result<Table> {
        Ok(report_table(&data))
    }

    async fn load(&self, table: Table) -> Result<String> {
        if table.is_empty() {
            println!("{}", NO_DATA_MESSAGE);
            return Ok(NO_DATA_MESSAGE.to_string());
        }

        self.storage
            .write_file(&self.output_file, &write_xlsx(&table)?)
            .await?;
        let location = self.storage.display_path(&self.output_file);

        println!("\nReport saved to: {}", location);
        println!("Total records processed: {}", table.len());
        println!("\nColor Legend:");
        println!("- Light Red: Zones with no records (other than NS/SOA)");
        println!("- Light Yellow: Private zones with no linked VNETs");
        Ok(location)
    }
}
