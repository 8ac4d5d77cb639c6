use super::file_timestamp;
use crate::adapters::digicert::{dcv_token, DigiCertClient};
use crate::adapters::http::value_to_string;
use crate::core::report::csv_record;
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

pub const CSV_HEADERS: [&str; 6] = ["domain", "id", "token", "txt_host", "status", "error"];
const DCV_METHOD: &str = "dns-txt-token";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DcvResult {
    pub domain: String,
    pub id: Option<String>,
    pub token: Option<String>,
    pub txt_host: String,
    pub status: String,
    pub error: Option<String>,
}

impl DcvResult {
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    fn csv_fields(&self) -> [&str; 6] {
        [
            self.domain.as_str(),
            self.id.as_deref().unwrap_or_default(),
            self.token.as_deref().unwrap_or_default(),
            self.txt_host.as_str(),
            self.status.as_str(),
            self.error.as_deref().unwrap_or_default(),
        ]
    }
}

/// DigiCert DNS TXT 驗證流程：新增 → 取得 token → 查狀態
pub struct DcAddPipeline<S: Storage> {
    storage: S,
    client: DigiCertClient,
    org_id: String,
    domains: Vec<String>,
    csv_file: String,
    json_output: Option<PathBuf>,
    json_default: String,
}

impl<S: Storage> DcAddPipeline<S> {
    pub fn new(
        storage: S,
        client: DigiCertClient,
        org_id: &str,
        domains: Vec<String>,
        json_output: Option<PathBuf>,
    ) -> Self {
        let ts = file_timestamp();
        Self {
            storage,
            client,
            org_id: org_id.to_string(),
            domains,
            csv_file: format!("digicert_domain_add_{}.csv", ts),
            json_output,
            json_default: format!("digicert_domain_add_{}.json", ts),
        }
    }

    pub fn csv_file(&self) -> &str {
        &self.csv_file
    }

    async fn process_domain(&self, domain: &str) -> DcvResult {
        let mut result = DcvResult {
            domain: domain.to_string(),
            id: None,
            token: None,
            txt_host: format!("_dnsauth.{}", domain),
            status: "error".to_string(),
            error: None,
        };

        let body = match self
            .client
            .add_domain(domain, &self.org_id, &[DCV_METHOD], DCV_METHOD)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        let Some(id) = body.get("id").and_then(value_to_string) else {
            result.error = Some(format!("No domain id in response: {}", body));
            return result;
        };
        result.id = Some(id.clone());
        result.token = dcv_token(&body);

        if result.token.is_none() {
            tracing::info!("🔑 No token returned for {}, requesting one", domain);
            match self.client.generate_dcv_token(&id).await {
                Ok(token_body) => result.token = dcv_token(&token_body),
                Err(e) => {
                    result.error = Some(format!("Token request failed: {}", e));
                    return result;
                }
            }
        }

        // 查不到狀態不算失敗
        result.status = match self.client.domain_details(&id).await {
            Ok(details) => details
                .get("status")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("success")
                .to_string(),
            Err(e) => {
                tracing::warn!("⚠️ Could not fetch status for {} ({}): {}", domain, id, e);
                "success".to_string()
            }
        };
        result
    }
}

pub fn print_summary(results: &[DcvResult], output: &str) {
    let failed: Vec<&DcvResult> = results.iter().filter(|r| r.is_error()).collect();

    println!("\nProcessing complete:");
    println!("Total domains processed: {}", results.len());
    println!("Successfully added: {}", results.len() - failed.len());
    println!("Failed: {}", failed.len());
    println!("\nResults saved to: {}", output);

    if !failed.is_empty() {
        println!("\nFailed domains:");
        for r in failed {
            println!("- {}: {}", r.domain, r.error.as_deref().unwrap_or("unknown error"));
        }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for DcAddPipeline<S> {
    type Item = String;
    type Output = Vec<DcvResult>;

    fn name(&self) -> &str {
        "dc-add"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        Ok(self
            .domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect())
    }

    /// 每處理完一個網域就寫一列，中斷時已完成的列都在檔案裡
    async fn transform(&self, data: Vec<String>) -> Result<Vec<DcvResult>> {
        self.storage
            .write_file(&self.csv_file, &csv_record(CSV_HEADERS)?)
            .await?;

        let total = data.len();
        let mut results = Vec::with_capacity(total);
        for (i, domain) in data.iter().enumerate() {
            tracing::info!("[{}/{}] Adding {}", i + 1, total, domain);
            let result = self.process_domain(domain).await;
            if let Some(error) = &result.error {
                tracing::error!("❌ {}: {}", domain, error);
            }
            self.storage
                .append_file(&self.csv_file, &csv_record(result.csv_fields())?)
                .await?;
            results.push(result);
        }
        Ok(results)
    }

    async fn load(&self, results: Vec<DcvResult>) -> Result<String> {
        let json = serde_json::to_vec_pretty(&results)?;
        let location = match &self.json_output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, json).await?;
                path.display().to_string()
            }
            None => {
                self.storage.write_file(&self.json_default, &json).await?;
                self.storage.display_path(&self.json_default)
            }
        };

        print_summary(&results, &location);
        tracing::info!("📄 Per-domain rows in {}", self.storage.display_path(&self.csv_file));
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use crate::utils::error::EtlError;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_token_fallback_and_per_row_csv() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"a.example","dcv_method":"dns-txt-token"}"#);
            then.status(201)
                .json_body(json!({"id": 1, "dcv_token": {"token": "tok-a"}}));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"b.example"}"#);
            then.status(201).json_body(json!({"id": 2}));
        });
        let token = server.mock(|when, then| {
            when.method(POST).path("/domain/2/dcv/token");
            then.status(201).json_body(json!({"token": "tok-b"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/1");
            then.status(200).json_body(json!({"status": "pending"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/2");
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"bad.example"}"#);
            then.status(400).body("duplicate");
        });

        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap());
        let client = DigiCertClient::new(&server.base_url(), "key").unwrap();
        let json_path = dir.path().join("out").join("results.json");
        let pipeline = DcAddPipeline::new(
            storage,
            client,
            "123",
            vec!["a.example".into(), " ".into(), "b.example\n".into(), "bad.example".into()],
            Some(json_path.clone()),
        );
        let csv_path = dir.path().join(pipeline.csv_file());

        let engine = EtlEngine::new(pipeline);
        let location = engine.run().await.unwrap();
        token.assert();
        assert_eq!(location, json_path.display().to_string());

        let csv = std::fs::read_to_string(csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "domain,id,token,txt_host,status,error");
        assert_eq!(lines[1], "a.example,1,tok-a,_dnsauth.a.example,pending,");
        assert_eq!(lines[2], "b.example,2,tok-b,_dnsauth.b.example,success,");
        assert!(lines[3].starts_with("bad.example,,,_dnsauth.bad.example,error,"));
        assert_eq!(lines.len(), 4);

        let results: Vec<serde_json::Value> =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[2]["status"], "error");
        assert!(results[0]["error"].is_null());
    }

    #[tokio::test]
    async fn test_rows_survive_failed_json_write() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"a.example"}"#);
            then.status(201)
                .json_body(json!({"id": 1, "dcv_token": {"token": "tok-a"}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/1");
            then.status(200).json_body(json!({"status": "pending"}));
        });

        let dir = TempDir::new().unwrap();
        // 父路徑是一般檔案，建立目錄必定失敗
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let pipeline = DcAddPipeline::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            DigiCertClient::new(&server.base_url(), "key").unwrap(),
            "123",
            vec!["a.example".into()],
            Some(blocker.join("results.json")),
        );
        let csv_path = dir.path().join(pipeline.csv_file());

        let result = EtlEngine::new(pipeline).run().await;
        assert!(matches!(result, Err(EtlError::IoError(_))), "{:?}", result);

        let csv = std::fs::read_to_string(csv_path).unwrap();
        assert_eq!(
            csv.lines().collect::<Vec<_>>(),
            vec![
                "domain,id,token,txt_host,status,error",
                "a.example,1,tok-a,_dnsauth.a.example,pending,"
            ]
        );
    }

    #[tokio::test]
    async fn test_token_request_failure_is_error_row() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"a.example"}"#);
            then.status(201).json_body(json!({"id": 1}));
        });
        let token = server.mock(|when, then| {
            when.method(POST).path("/domain/1/dcv/token");
            then.status(500).body("token service down");
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/domain")
                .json_body_partial(r#"{"name":"b.example"}"#);
            then.status(201)
                .json_body(json!({"id": 2, "dcv_token": {"token": "tok-b"}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/domain/2");
            then.status(200).json_body(json!({"status": "pending"}));
        });

        let dir = TempDir::new().unwrap();
        let pipeline = DcAddPipeline::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            DigiCertClient::new(&server.base_url(), "key").unwrap(),
            "123",
            vec!["a.example".into(), "b.example".into()],
            None,
        );
        let csv_path = dir.path().join(pipeline.csv_file());

        EtlEngine::new(pipeline).run().await.unwrap();
        token.assert();

        let csv = std::fs::read_to_string(csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("a.example,1,,_dnsauth.a.example,error,"));
        assert!(lines[1].contains("Token request failed"));
        assert_eq!(lines[2], "b.example,2,tok-b,_dnsauth.b.example,pending,");
    }
}
