use crate::adapters::http::{build_client, read_json, value_to_string};
use crate::config::vault::AzureCredentials;
use crate::domain::ports::CnamePublisher;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const SERVICE: &str = "Azure";
const SUBSCRIPTIONS_API: &str = "2020-01-01";
const PUBLIC_DNS_API: &str = "2018-05-01";
const PRIVATE_DNS_API: &str = "2020-06-01";
pub const DCV_CNAME_TTL: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Public,
    Private,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Public => "Public",
            ZoneKind::Private => "Private",
        }
    }

    fn api_version(&self) -> &'static str {
        match self {
            ZoneKind::Public => PUBLIC_DNS_API,
            ZoneKind::Private => PRIVATE_DNS_API,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsZone {
    pub id: String,
    pub name: String,
    pub kind: ZoneKind,
    pub resource_group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub values: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VnetLink {
    pub name: String,
    pub vnet_id: String,
}

impl VnetLink {
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.vnet_id)
    }
}

/// `/subscriptions/{sub}/resourceGroups/{rg}/...` → `{rg}`
pub fn resource_group_of(resource_id: &str) -> String {
    resource_id.split('/').nth(4).unwrap_or_default().to_string()
}

/// Azure Resource Manager REST 客戶端（client credentials）
pub struct AzureClient {
    client: Client,
    management_url: String,
    token: String,
}

impl AzureClient {
    pub async fn connect(
        credentials: &AzureCredentials,
        login_url: &str,
        management_url: &str,
    ) -> Result<Self> {
        let client = build_client()?;
        let management_url = management_url.trim_end_matches('/').to_string();
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            login_url.trim_end_matches('/'),
            credentials.tenant_id
        );
        let scope = format!("{}/.default", management_url);

        tracing::debug!("🔑 Requesting Azure token from {}", token_url);
        let response = client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;
        let body = read_json(SERVICE, "Azure token", response).await?;

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| EtlError::processing("Azure token response has no access_token"))?
            .to_string();

        Ok(Self {
            client,
            management_url,
            token,
        })
    }

    /// GET 並跟隨 `nextLink`，回傳所有 `value` 項目
    async fn get_paged(&self, first_url: String) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next.take() {
            tracing::debug!("🌐 Azure GET {}", url);
            let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
            let mut body = read_json(SERVICE, "Azure list", response).await?;

            if let Some(Value::Array(values)) = body.get_mut("value").map(Value::take) {
                items.extend(values);
            }
            next = body
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }

        Ok(items)
    }

    pub async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.management_url, SUBSCRIPTIONS_API
        );
        let items = self.get_paged(url).await?;
        Ok(items
            .iter()
            .filter_map(|s| {
                let id = s.get("subscriptionId").and_then(value_to_string)?;
                let display_name = s
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or(&id)
                    .to_string();
                Some(Subscription { id, display_name })
            })
            .collect())
    }

    async fn zones(&self, subscription_id: &str, kind: ZoneKind) -> Result<Vec<DnsZone>> {
        let provider = match kind {
            ZoneKind::Public => "dnszones",
            ZoneKind::Private => "privateDnsZones",
        };
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Network/{}?api-version={}",
            self.management_url,
            subscription_id,
            provider,
            kind.api_version()
        );
        let items = self.get_paged(url).await?;
        Ok(items
            .iter()
            .filter_map(|z| {
                let id = z.get("id").and_then(Value::as_str)?.to_string();
                let name = z.get("name").and_then(Value::as_str)?.to_string();
                Some(DnsZone {
                    resource_group: resource_group_of(&id),
                    id,
                    name,
                    kind,
                })
            })
            .collect())
    }

    pub async fn public_zones(&self, subscription_id: &str) -> Result<Vec<DnsZone>> {
        self.zones(subscription_id, ZoneKind::Public).await
    }

    pub async fn private_zones(&self, subscription_id: &str) -> Result<Vec<DnsZone>> {
        self.zones(subscription_id, ZoneKind::Private).await
    }

    pub async fn record_sets(&self, zone: &DnsZone) -> Result<Vec<RecordSet>> {
        let url = match zone.kind {
            ZoneKind::Public => format!(
                "{}{}/recordsets?api-version={}",
                self.management_url, zone.id, PUBLIC_DNS_API
            ),
            ZoneKind::Private => format!(
                "{}{}/ALL?api-version={}",
                self.management_url, zone.id, PRIVATE_DNS_API
            ),
        };
        let items = self.get_paged(url).await?;
        Ok(items
            .iter()
            .filter_map(|r| {
                let name = r.get("name").and_then(Value::as_str)?.to_string();
                let record_type = r
                    .get("type")
                    .and_then(Value::as_str)?
                    .rsplit('/')
                    .next()?
                    .to_uppercase();
                let values = r
                    .get("properties")
                    .map(|p| record_values(&record_type, p))
                    .unwrap_or_default();
                Some(RecordSet {
                    name,
                    record_type,
                    values,
                })
            })
            .collect())
    }

    pub async fn virtual_network_links(&self, zone: &DnsZone) -> Result<Vec<VnetLink>> {
        let url = format!(
            "{}{}/virtualNetworkLinks?api-version={}",
            self.management_url, zone.id, PRIVATE_DNS_API
        );
        let items = self.get_paged(url).await?;
        Ok(items
            .iter()
            .filter_map(|l| {
                let name = l.get("name").and_then(Value::as_str)?.to_string();
                let vnet_id = l
                    .pointer("/properties/virtualNetwork/id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(VnetLink { name, vnet_id })
            })
            .collect())
    }
}

impl AzureClient {
    /// PUT 建立或覆寫公有區域的 CNAME 記錄
    pub async fn upsert_cname(&self, zone: &DnsZone, relative_name: &str, target: &str, ttl: u32) -> Result<()> {
        if zone.kind != ZoneKind::Public {
            return Err(EtlError::ValidationError {
                message: format!("{} is a private zone; CNAMEs are only published to public zones", zone.name),
            });
        }
        let url = format!(
            "{}{}/CNAME/{}?api-version={}",
            self.management_url, zone.id, relative_name, PUBLIC_DNS_API
        );
        let payload = json!({
            "properties": {
                "TTL": ttl,
                "CNAMERecord": { "cname": target }
            }
        });
        tracing::debug!("🌐 Azure PUT {} {}", url, payload);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        read_json(SERVICE, "Azure CNAME upsert", response).await?;
        Ok(())
    }
}

/// 最長後綴相符的區域，以及相對於該區域的記錄名稱（頂點為 `@`）
pub fn zone_for<'a>(zones: &'a [DnsZone], fqdn: &str) -> Option<(&'a DnsZone, String)> {
    let fqdn = fqdn.trim().trim_end_matches('.').to_lowercase();
    zones
        .iter()
        .filter_map(|zone| {
            let zone_name = zone.name.trim_end_matches('.').to_lowercase();
            if fqdn == zone_name {
                return Some((zone, "@".to_string()));
            }
            fqdn.strip_suffix(&format!(".{}", zone_name))
                .map(|relative| (zone, relative.to_string()))
        })
        .max_by_key(|(zone, _)| zone.name.len())
}

/// 發佈 DCV CNAME 到訂閱中的 Azure 公有 DNS 區域
pub struct AzureCnamePublisher {
    client: AzureClient,
    zones: Vec<DnsZone>,
    ttl: u32,
}

impl AzureCnamePublisher {
    /// Lists public zones in `subscription_id`, or in every visible subscription.
    pub async fn discover(client: AzureClient, subscription_id: Option<String>) -> Result<Self> {
        let subscriptions = match subscription_id {
            Some(id) => vec![id],
            None => client
                .subscriptions()
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect(),
        };

        let mut zones = Vec::new();
        for subscription in &subscriptions {
            zones.extend(client.public_zones(subscription).await?);
        }
        tracing::info!(
            "🌍 {} Azure public zones across {} subscription(s)",
            zones.len(),
            subscriptions.len()
        );
        Ok(Self {
            client,
            zones,
            ttl: DCV_CNAME_TTL,
        })
    }

    pub fn zones(&self) -> &[DnsZone] {
        &self.zones
    }
}

#[async_trait]
impl CnamePublisher for AzureCnamePublisher {
    async fn publish_cname(&self, host: &str, target: &str) -> Result<String> {
        let (zone, relative) = zone_for(&self.zones, host).ok_or_else(|| EtlError::ValidationError {
            message: format!("no Azure public zone hosts {}", host),
        })?;
        tracing::info!("Azure: applying CNAME {} -> {} in zone {}", relative, target, zone.name);
        self.client.upsert_cname(zone, &relative, target, self.ttl).await?;
        Ok(zone.name.clone())
    }
}

/// 公有區域用 `ARecords`，私有區域用 `aRecords`
fn records_array<'a>(properties: &'a Value, public_key: &str, private_key: &str) -> Vec<&'a Value> {
    properties
        .get(public_key)
        .or_else(|| properties.get(private_key))
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Record set properties rendered as one report cell.
pub fn record_values(record_type: &str, properties: &Value) -> String {
    match record_type {
        "A" => records_array(properties, "ARecords", "aRecords")
            .iter()
            .map(|r| str_field(r, "ipv4Address"))
            .collect::<Vec<_>>()
            .join("; "),
        "AAAA" => records_array(properties, "AAAARecords", "aaaaRecords")
            .iter()
            .map(|r| str_field(r, "ipv6Address"))
            .collect::<Vec<_>>()
            .join("; "),
        "CNAME" => properties
            .get("CNAMERecord")
            .or_else(|| properties.get("cnameRecord"))
            .map(|r| str_field(r, "cname"))
            .unwrap_or_default(),
        "TXT" => records_array(properties, "TXTRecords", "txtRecords")
            .iter()
            .map(|r| {
                r.get("value")
                    .and_then(Value::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("; "),
        "MX" => records_array(properties, "MXRecords", "mxRecords")
            .iter()
            .map(|r| format!("{} {}", str_field(r, "preference"), str_field(r, "exchange")))
            .collect::<Vec<_>>()
            .join("; "),
        "PTR" => records_array(properties, "PTRRecords", "ptrRecords")
            .first()
            .map(|r| str_field(r, "ptrdname"))
            .unwrap_or_default(),
        "SRV" => records_array(properties, "SRVRecords", "srvRecords")
            .iter()
            .map(|r| {
                format!(
                    "{} {} {} {}",
                    str_field(r, "priority"),
                    str_field(r, "weight"),
                    str_field(r, "port"),
                    str_field(r, "target")
                )
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => properties.to_string(),
    }
}
