use super::file_timestamp;
use crate::adapters::sectigo::SectigoClient;
use crate::core::report::csv_record;
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;

pub const CSV_HEADERS: [&str; 5] = ["domain", "id", "host", "point", "message"];
const DESCRIPTION: &str = "Domain created via REST API";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkAddResult {
    pub domain: String,
    pub id: Option<String>,
    pub host: String,
    pub point: String,
    pub message: String,
}

impl BulkAddResult {
    pub fn is_error(&self) -> bool {
        self.message.starts_with("ERROR")
    }

    fn csv_fields(&self) -> [&str; 5] {
        [
            self.domain.as_str(),
            self.id.as_deref().unwrap_or_default(),
            self.host.as_str(),
            self.point.as_str(),
            self.message.as_str(),
        ]
    }
}

/// 標頭為 `domain` 的第一列略過
pub fn strip_header(domains: Vec<String>) -> Vec<String> {
    domains
        .into_iter()
        .enumerate()
        .filter(|(i, d)| !(*i == 0 && d.trim().eq_ignore_ascii_case("domain")))
        .map(|(_, d)| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Sectigo 批次新增：建立網域後送出 DNS TXT 驗證
pub struct SectigoAddAllPipeline<S: Storage> {
    storage: S,
    client: SectigoClient,
    org_id: String,
    domains: Vec<String>,
    csv_file: String,
}

impl<S: Storage> SectigoAddAllPipeline<S> {
    pub fn new(storage: S, client: SectigoClient, org_id: &str, domains: Vec<String>) -> Self {
        Self {
            storage,
            client,
            org_id: org_id.to_string(),
            domains,
            csv_file: format!("sectigo_add_all_{}.csv", file_timestamp()),
        }
    }

    pub fn csv_file(&self) -> &str {
        &self.csv_file
    }

    async fn process_domain(&self, domain: &str) -> BulkAddResult {
        let mut result = BulkAddResult {
            domain: domain.to_string(),
            ..Default::default()
        };

        let submitted = async {
            let added = self.client.add_domain(domain, &self.org_id, DESCRIPTION).await?;
            tracing::info!("Domain created for {}: {}", domain, added.body);
            result.id = added.id;
            self.client.submit_txt_validation(domain).await
        }
        .await;

        match submitted {
            Ok(challenge) => {
                tracing::info!("DNS TXT validation submitted for {}", domain);
                result.host = challenge.host;
                result.point = challenge.point;
                result.message = challenge.message;
            }
            Err(e) => {
                result.message = format!("ERROR processing {}: {}", domain, e);
                tracing::error!("❌ {}", result.message);
            }
        }
        result
    }
}

#[async_trait]
impl<S: Storage> Pipeline for SectigoAddAllPipeline<S> {
    type Item = String;
    type Output = Vec<BulkAddResult>;

    fn name(&self) -> &str {
        "stg-add-all"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        Ok(strip_header(self.domains.clone()))
    }

    /// 每個網域處理完立即寫入，中斷時保留進度
    async fn transform(&self, data: Vec<String>) -> Result<Vec<BulkAddResult>> {
        self.storage
            .write_file(&self.csv_file, &csv_record(CSV_HEADERS)?)
            .await?;

        let total = data.len();
        let mut results = Vec::with_capacity(total);
        for (i, domain) in data.iter().enumerate() {
            tracing::info!("Processing domain {} of {}: {}", i + 1, total, domain);
            let result = self.process_domain(domain).await;
            self.storage
                .append_file(&self.csv_file, &csv_record(result.csv_fields())?)
                .await?;
            println!("Progress saved: {} of {} domains processed", i + 1, total);
            results.push(result);
        }
        Ok(results)
    }

    async fn load(&self, results: Vec<BulkAddResult>) -> Result<String> {
        let failed = results.iter().filter(|r| r.is_error()).count();
        let location = self.storage.display_path(&self.csv_file);
        println!(
            "\n✅ {} domain(s) processed, {} failed. Results: {}",
            results.len(),
            failed,
            location
        );
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::config::vault::SectigoCredentials;
    use crate::core::etl::EtlEngine;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_strip_header_only_first_line() {
        let domains = vec!["domain".into(), "a.example".into(), " ".into(), "domain".into()];
        assert_eq!(strip_header(domains), vec!["a.example", "domain"]);
    }

    #[tokio::test]
    async fn test_add_then_submit_txt_per_domain() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/domain/v1")
                .json_body_partial(r#"{"name":"a.example","description":"Domain created via REST API"}"#);
            then.status(201).json_body(json!({"id": 51}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/domain/v1")
                .json_body_partial(r#"{"name":"dup.example"}"#);
            then.status(400).body("domain exists");
        });
        let submit = server.mock(|when, then| {
            when.method(POST)
                .path("/api/dcv/v1/validation/submit/domain/txt")
                .json_body(json!({"domain": "a.example"}));
            then.status(200).json_body(json!({
                "host": "a.example",
                "point": "txt-value-123",
                "message": "submitted"
            }));
        });

        let dir = TempDir::new().unwrap();
        let client = SectigoClient::new(
            &server.url("/api/domain/v1"),
            &SectigoCredentials {
                login: "ops".into(),
                password: "secret".into(),
                customer_uri: "acme".into(),
                org_id: Some("42".into()),
            },
        )
        .unwrap();
        let pipeline = SectigoAddAllPipeline::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            client,
            "42",
            vec!["domain".into(), "a.example".into(), "dup.example".into()],
        );
        let csv_path = dir.path().join(pipeline.csv_file());

        EtlEngine::new(pipeline).run().await.unwrap();
        submit.assert();

        let csv = std::fs::read_to_string(csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "domain,id,host,point,message");
        assert_eq!(lines[1], "a.example,51,a.example,txt-value-123,submitted");
        assert!(lines[2].starts_with("dup.example,,,,ERROR processing dup.example"));
        assert_eq!(lines.len(), 3);
    }
}
