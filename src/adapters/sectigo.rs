use crate::adapters::http::{build_client, ensure_success, read_json, value_to_string};
use crate::config::vault::SectigoCredentials;
use crate::domain::model::CaDomain;
use crate::utils::error::{EtlError, Result};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};

const SERVICE: &str = "Sectigo";
const PAGE_SIZE: usize = 200;

/// Result of a create call: the new id when the API reported one, plus the raw body.
#[derive(Debug, Clone)]
pub struct AddedDomain {
    pub id: Option<String>,
    pub body: Value,
}

/// DCV status for one domain; any field the API omits stays empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DcvStatus {
    pub status: String,
    pub validation_type: String,
    pub validation_status: String,
    pub last_checked: String,
    pub expires: String,
}

impl DcvStatus {
    fn from_value(value: &Value) -> Self {
        let field = |key: &str| value.get(key).and_then(value_to_string).unwrap_or_default();
        Self {
            status: field("status"),
            validation_type: field("validationType"),
            validation_status: field("validationStatus"),
            last_checked: field("lastChecked"),
            expires: field("expires"),
        }
    }
}

/// `host` / `point` pair returned when a DNS validation starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DcvChallenge {
    pub host: String,
    pub point: String,
    pub message: String,
}

impl DcvChallenge {
    fn from_value(value: &Value) -> Self {
        let field = |key: &str| value.get(key).and_then(value_to_string).unwrap_or_default();
        Self {
            host: field("host"),
            point: field("point"),
            message: field("message"),
        }
    }
}

/// `.../api/domain/v1` → `.../api/dcv`
pub fn dcv_url_for(domain_url: &str) -> String {
    let base = domain_url.trim_end_matches('/');
    match base.strip_suffix("/domain/v1") {
        Some(api) => format!("{}/dcv", api),
        None => format!("{}/dcv", base),
    }
}

/// Sectigo Cert Manager domain v1 + DCV API
pub struct SectigoClient {
    client: Client,
    base_url: String,
    dcv_url: String,
    login: String,
    password: String,
    customer_uri: String,
}

impl SectigoClient {
    pub fn new(base_url: &str, credentials: &SectigoCredentials) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            dcv_url: dcv_url_for(base_url),
            login: credentials.login.clone(),
            password: credentials.password.clone(),
            customer_uri: credentials.customer_uri.clone(),
        })
    }

    pub fn with_dcv_url(mut self, dcv_url: &str) -> Self {
        self.dcv_url = dcv_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_url(method, format!("{}{}", self.base_url, path))
    }

    fn request_url(&self, method: Method, url: String) -> RequestBuilder {
        tracing::debug!("🌐 Sectigo {} {}", method, url);
        self.client
            .request(method, url)
            .header("login", &self.login)
            .header("password", &self.password)
            .header("customerUri", &self.customer_uri)
            .header("Content-Type", "application/json;charset=utf-8")
    }

    /// position 分頁，直到空頁或不足一頁
    pub async fn list_domains(&self) -> Result<Vec<CaDomain>> {
        let mut domains = Vec::new();
        let mut position = 0usize;

        loop {
            let path = format!("?size={}&position={}", PAGE_SIZE, position);
            let response = self.request(Method::GET, &path).send().await?;
            let body = read_json(SERVICE, "Sectigo domain list", response).await?;

            let items = match body {
                Value::Array(items) => items,
                other => {
                    tracing::warn!(
                        "⚠️ Unexpected Sectigo list response at position {}: {}",
                        position,
                        other
                    );
                    break;
                }
            };

            let page_len = items.len();
            domains.extend(items.iter().filter_map(|item| {
                Some(CaDomain {
                    id: item.get("id").and_then(value_to_string)?,
                    name: item.get("name").and_then(Value::as_str)?.to_string(),
                })
            }));

            if page_len < PAGE_SIZE {
                break;
            }
            position += PAGE_SIZE;
        }

        tracing::info!("📋 Sectigo returned {} domains", domains.len());
        Ok(domains)
    }

    /// `None` on 404.
    pub async fn domain_details(&self, id: &str) -> Result<Option<Value>> {
        let response = self.request(Method::GET, &format!("/{}", id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Sectigo domain {} not found", id);
            return Ok(None);
        }
        read_json(SERVICE, "Sectigo domain details", response)
            .await
            .map(Some)
    }

    pub async fn find_domain(&self, name: &str) -> Result<Option<CaDomain>> {
        let domains = self.list_domains().await?;
        Ok(domains
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name)))
    }

    pub async fn add_domain(&self, name: &str, org_id: &str, description: &str) -> Result<AddedDomain> {
        let org_id_value = org_id
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(org_id));
        let payload = json!({
            "name": name,
            "description": description,
            "active": true,
            "enabled": true,
            "includeSubdomains": true,
            "delegations": [{
                "orgId": org_id_value,
                "certTypes": ["SSL"],
                "domainCertificateRequestPrivileges": ["SUBDOMAIN", "DOMAIN"]
            }]
        });
        tracing::debug!("Sectigo add payload: {}", payload);

        let response = self.request(Method::POST, "").json(&payload).send().await?;
        let response = ensure_success(SERVICE, response).await?;

        // 新 id 可能在 body，也可能只在 Location header
        let location_id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(id_from_location);

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        let id = body.get("id").and_then(value_to_string).or(location_id);
        Ok(AddedDomain { id, body })
    }

    /// Sectigo answers 204; any 2xx counts as deleted.
    pub async fn delete_domain(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/{}", id))
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}

impl SectigoClient {
    async fn dcv_post(&self, path: &str, domain: &str, action: &str) -> Result<Value> {
        let url = format!("{}{}", self.dcv_url, path);
        let response = self
            .request_url(Method::POST, url)
            .header("Accept", "application/json")
            .json(&json!({ "domain": domain }))
            .send()
            .await?;
        read_json(SERVICE, action, response).await
    }

    /// `None` when the answer is empty or not an object.
    pub async fn dcv_status(&self, domain: &str) -> Result<Option<DcvStatus>> {
        let body = self
            .dcv_post("/v2/validation/status", domain, "Sectigo DCV status")
            .await?;
        tracing::debug!("Sectigo DCV status for {}: {}", domain, body);

        // 可能是陣列（取第一筆）或單一物件
        let status = match &body {
            Value::Array(items) => items.first().filter(|v| v.is_object()),
            Value::Object(map) if !map.is_empty() => Some(&body),
            _ => None,
        };
        if status.is_none() {
            tracing::warn!("⚠️ Unexpected DCV details format for {}: {}", domain, body);
        }
        Ok(status.map(DcvStatus::from_value))
    }

    /// Switches the domain to CNAME validation and returns the record to publish.
    pub async fn start_cname_validation(&self, domain: &str) -> Result<DcvChallenge> {
        let body = self
            .dcv_post("/v1/validation/start/domain/cname", domain, "Sectigo CNAME validation")
            .await?;
        tracing::debug!("Sectigo CNAME challenge for {}: {}", domain, body);
        let challenge = DcvChallenge::from_value(&body);
        if challenge.host.is_empty() {
            return Err(EtlError::processing(format!(
                "Sectigo returned no CNAME host for {}: {}",
                domain, body
            )));
        }
        Ok(challenge)
    }

    pub async fn submit_txt_validation(&self, domain: &str) -> Result<DcvChallenge> {
        let body = self
            .dcv_post("/v1/validation/submit/domain/txt", domain, "Sectigo TXT validation")
            .await?;
        Ok(DcvChallenge::from_value(&body))
    }
}

fn id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
