use crate::adapters::mail::Mailer;
use crate::config::toml_config::FutureSymbol;
use crate::domain::ports::{Pipeline, QuoteSource};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub fn subject_for(date: chrono::NaiveDate) -> String {
    format!("Premarket Futures Update - {}", date.format("%Y-%m-%d"))
}

/// 盤前期貨報價，一封信
pub struct FuturesEmailPipeline {
    futures: Vec<FutureSymbol>,
    quotes: Arc<dyn QuoteSource>,
    mailer: Mailer,
}

impl FuturesEmailPipeline {
    pub fn new(futures: Vec<FutureSymbol>, quotes: Arc<dyn QuoteSource>, mailer: Mailer) -> Self {
        Self {
            futures,
            quotes,
            mailer,
        }
    }
}

#[async_trait]
impl Pipeline for FuturesEmailPipeline {
    type Item = FutureSymbol;
    type Output = Vec<String>;

    fn name(&self) -> &str {
        "futures-email"
    }

    async fn extract(&self) -> Result<Vec<FutureSymbol>> {
        Ok(self.futures.clone())
    }

    async fn transform(&self, data: Vec<FutureSymbol>) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(data.len());
        for future in data {
            let line = match self.quotes.current_price(&future.symbol).await {
                Ok(Some(price)) => format!("{}: {}", future.name, price),
                Ok(None) => format!("{}: Error fetching data", future.name),
                Err(e) => {
                    tracing::warn!("⚠️ {} ({}): {}", future.name, future.symbol, e);
                    format!("{}: Error fetching data", future.name)
                }
            };
            lines.push(line);
        }
        Ok(lines)
    }

    async fn load(&self, lines: Vec<String>) -> Result<String> {
        let subject = subject_for(chrono::Local::now().date_naive());
        self.mailer.send_text(&subject, &lines.join("\n")).await?;
        Ok(if self.mailer.is_dry_run() {
            "dry-run".to_string()
        } else {
            "email".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::market::TwelveDataClient;
    use crate::core::etl::EtlEngine;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_subject() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(subject_for(date), "Premarket Futures Update - 2025-03-07");
    }

    #[tokio::test]
    async fn test_lines_with_missing_price() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/quote").query_param("symbol", "ES=F");
            then.status(200).json_body(json!({"symbol": "ES=F", "price": "5123.25"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/quote").query_param("symbol", "NQ=F");
            then.status(200)
                .json_body(json!({"code": 404, "message": "symbol not found", "status": "error"}));
        });

        let futures = vec![
            FutureSymbol {
                name: "S&P 500 Futures".to_string(),
                symbol: "ES=F".to_string(),
            },
            FutureSymbol {
                name: "Nasdaq Futures".to_string(),
                symbol: "NQ=F".to_string(),
            },
        ];
        let quotes = Arc::new(TwelveDataClient::new(&server.base_url(), "key").unwrap());
        let pipeline = FuturesEmailPipeline::new(
            futures.clone(),
            quotes,
            Mailer::dry("me@example.com", "me@example.com").unwrap(),
        );

        let lines = pipeline.transform(futures).await.unwrap();
        assert_eq!(
            lines,
            vec!["S&P 500 Futures: 5123.25", "Nasdaq Futures: Error fetching data"]
        );

        let result = EtlEngine::new(pipeline).run().await.unwrap();
        assert_eq!(result, "dry-run");
    }
}
