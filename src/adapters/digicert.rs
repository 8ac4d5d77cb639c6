use crate::adapters::http::{build_client, ensure_success, read_json, value_to_string};
use crate::domain::model::CaDomain;
use crate::utils::error::Result;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};

const SERVICE: &str = "DigiCert";
const PAGE_LIMIT: usize = 1000;

/// DigiCert CertCentral v2 domain API
pub struct DigiCertClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DigiCertClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("🌐 DigiCert {} {}", method, url);
        self.client
            .request(method, url)
            .header("X-DC-DEVKEY", &self.api_key)
            .header("Content-Type", "application/json")
    }

    /// 逐頁列出所有網域（limit=1000）
    pub async fn list_domains(&self) -> Result<Vec<CaDomain>> {
        let mut domains = Vec::new();
        let mut offset = 0usize;

        loop {
            let path = format!("/domain?limit={}&offset={}", PAGE_LIMIT, offset);
            let response = self.request(Method::GET, &path).send().await?;
            let body = read_json(SERVICE, "DigiCert domain list", response).await?;

            // 回應可能是 {"domains": [...], "page": {...}} 或直接是陣列
            let (items, total) = match body {
                Value::Array(items) => (items, None),
                Value::Object(mut obj) => {
                    let total = obj
                        .get("page")
                        .and_then(|p| p.get("total"))
                        .and_then(Value::as_u64);
                    let items = match obj.remove("domains") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    };
                    (items, total)
                }
                _ => (Vec::new(), None),
            };

            let page_len = items.len();
            domains.extend(items.iter().filter_map(|item| {
                Some(CaDomain {
                    id: item.get("id").and_then(value_to_string)?,
                    name: item.get("name").and_then(Value::as_str)?.to_string(),
                })
            }));
            offset += page_len;

            match total {
                Some(total) if page_len > 0 && (offset as u64) < total => continue,
                _ => break,
            }
        }

        tracing::info!("📋 DigiCert returned {} domains", domains.len());
        Ok(domains)
    }

    pub async fn domain_details(&self, id: &str) -> Result<Value> {
        let path = format!("/domain/{}?include_dcv=true&include_validation=true", id);
        let response = self.request(Method::GET, &path).send().await?;
        read_json(SERVICE, "DigiCert domain details", response).await
    }

    /// Case-insensitive name match against the full domain list.
    pub async fn find_domain(&self, name: &str) -> Result<Option<CaDomain>> {
        let domains = self.list_domains().await?;
        Ok(domains
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name)))
    }

    pub async fn add_domain(
        &self,
        name: &str,
        org_id: &str,
        validations: &[&str],
        dcv_method: &str,
    ) -> Result<Value> {
        let payload = json!({
            "name": name,
            "organization": { "id": org_id.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::from(org_id)) },
            "validations": validations.iter().map(|v| json!({ "type": v })).collect::<Vec<_>>(),
            "dcv_method": dcv_method,
        });
        tracing::debug!("DigiCert add payload: {}", payload);

        let response = self
            .request(Method::POST, "/domain")
            .json(&payload)
            .send()
            .await?;
        read_json(SERVICE, "DigiCert add domain", response).await
    }

    pub async fn generate_dcv_token(&self, id: &str) -> Result<Value> {
        let path = format!("/domain/{}/dcv/token", id);
        let response = self.request(Method::POST, &path).send().await?;
        read_json(SERVICE, "DigiCert DCV token", response).await
    }

    /// PUT `/domain/{id}/dcv/method`; DigiCert answers 204.
    pub async fn change_dcv_method(&self, id: &str, dcv_method: &str) -> Result<()> {
        let path = format!("/domain/{}/dcv/method", id);
        let response = self
            .request(Method::PUT, &path)
            .json(&json!({ "dcv_method": dcv_method }))
            .send()
            .await?;
        ensure_success(SERVICE, response).await?;
        tracing::info!("🔁 DigiCert domain {} switched to {}", id, dcv_method);
        Ok(())
    }

    pub async fn delete_domain(&self, id: &str) -> Result<()> {
        let path = format!("/domain/{}", id);
        let response = self.request(Method::DELETE, &path).send().await?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }
}

/// `dcv_token.token` from an add / token response.
pub fn dcv_token(body: &Value) -> Option<String> {
    body.get("dcv_token")
        .and_then(|t| t.get("token"))
        .or_else(|| body.get("token"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// CNAME target of a `dns-cname-token` token response.
pub fn verification_value(body: &Value) -> Option<String> {
    body.get("verification_value")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn organization_id(details: &Value) -> Option<String> {
    details
        .get("organization")
        .and_then(|o| o.get("id"))
        .and_then(value_to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EtlError;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_list_domains_paginates_by_total() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/domain")
                .query_param("limit", "1000")
                .query_param("offset", "0")
                .header("X-DC-DEVKEY", "key");
            then.status(200).json_body(json!({
                "domains": [
                    {"id": 1, "name": "example.com"},
                    {"id": 2},
                    {"id": 3, "name": "example.org"}
                ],
                "page": {"total": 4, "limit": 1000, "offset": 0}
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/domain").query_param("offset", "3");
            then.status(200).json_body(json!({
                "domains": [{"id": 4, "name": "example.net"}],
                "page": {"total": 4}
            }));
        });

        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        let domains = client.list_domains().await.unwrap();

        first.assert();
        second.assert();
        let names: Vec<_> = domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["example.com", "example.org", "example.net"]);
        assert_eq!(domains[0].id, "1");
    }

    #[tokio::test]
    async fn test_list_domains_accepts_bare_array() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/domain");
            then.status(200)
                .json_body(json!([{"id": "9", "name": "bare.example"}]));
        });

        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        let domains = client.list_domains().await.unwrap();
        assert_eq!(domains, vec![CaDomain { id: "9".into(), name: "bare.example".into() }]);
    }

    #[tokio::test]
    async fn test_add_domain_sends_expected_payload() {
        let server = MockServer::start();
        let add = server.mock(|when, then| {
            when.method(POST).path("/domain").json_body(json!({
                "name": "new.example",
                "organization": {"id": 123},
                "validations": [{"type": "dns-txt-token"}],
                "dcv_method": "dns-txt-token"
            }));
            then.status(201)
                .json_body(json!({"id": 55, "dcv_token": {"token": "abc123"}}));
        });

        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        let body = client
            .add_domain("new.example", "123", &["dns-txt-token"], "dns-txt-token")
            .await
            .unwrap();

        add.assert();
        assert_eq!(dcv_token(&body).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_delete_domain_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/domain/77");
            then.status(404).body(r#"{"errors":[{"code":"not_found"}]}"#);
        });

        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        match client.delete_domain("77").await {
            Err(EtlError::ApiStatusError { status, .. }) => assert_eq!(status, 404),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_organization_id() {
        assert_eq!(
            organization_id(&json!({"organization": {"id": 42}})).as_deref(),
            Some("42")
        );
        assert_eq!(organization_id(&json!({})), None);
    }

    #[tokio::test]
    async fn test_change_method_then_token() {
        let server = MockServer::start();
        let change = server.mock(|when, then| {
            when.method(PUT)
                .path("/domain/31/dcv/method")
                .header("X-DC-DEVKEY", "key")
                .json_body(json!({"dcv_method": "dns-cname-token"}));
            then.status(204);
        });
        server.mock(|when, then| {
            when.method(POST).path("/domain/31/dcv/token");
            then.status(201).json_body(json!({
                "token": "x1y2z3",
                "verification_value": "dcv.digicert.com",
                "status": "pending"
            }));
        });

        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        client.change_dcv_method("31", "dns-cname-token").await.unwrap();
        change.assert();

        let body = client.generate_dcv_token("31").await.unwrap();
        assert_eq!(dcv_token(&body).as_deref(), Some("x1y2z3"));
        assert_eq!(verification_value(&body).as_deref(), Some("dcv.digicert.com"));
    }
}
