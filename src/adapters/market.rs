use crate::adapters::http::{build_client, read_json, value_to_f64};
use crate::domain::ports::QuoteSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValuationMetrics {
    pub pe: Option<f64>,
    pub ps: Option<f64>,
}

/// Finnhub `/quote` fields used by the premarket summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub current: f64,
    pub previous_close: f64,
    pub high: f64,
    pub low: f64,
}

impl QuoteSnapshot {
    /// 前收盤為 0 時變動視為 0
    pub fn change(&self) -> f64 {
        if self.previous_close > 0.0 {
            self.current - self.previous_close
        } else {
            0.0
        }
    }

    pub fn change_percent(&self) -> f64 {
        if self.previous_close > 0.0 {
            self.change() / self.previous_close * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewsItem {
    pub headline: String,
    pub url: String,
    /// Unix seconds
    pub datetime: i64,
}

/// Finnhub quote / metric API
pub struct FinnhubClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("📈 Finnhub GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;
        read_json("Finnhub", path, response).await
    }

    /// `None` for an unknown ticker (Finnhub reports `c = 0`).
    pub async fn quote(&self, ticker: &str) -> Result<Option<QuoteSnapshot>> {
        let body = self.get("/quote", &[("symbol", ticker)]).await?;
        let field = |key: &str| body.get(key).and_then(value_to_f64).unwrap_or_default();
        let current = field("c");
        if current == 0.0 {
            return Ok(None);
        }
        Ok(Some(QuoteSnapshot {
            current,
            previous_close: field("pc"),
            high: field("h"),
            low: field("l"),
        }))
    }

    /// Company news between two `YYYY-MM-DD` dates, newest first as Finnhub returns them.
    pub async fn company_news(&self, ticker: &str, from: &str, to: &str) -> Result<Vec<NewsItem>> {
        let body = self
            .get("/company-news", &[("symbol", ticker), ("from", from), ("to", to)])
            .await?;
        match body {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<NewsItem>(item).ok())
                .filter(|item| !item.headline.is_empty())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// P/E (basic, excl. extraordinary items, TTM) and P/S (TTM).
    pub async fn metrics(&self, ticker: &str) -> Result<ValuationMetrics> {
        let body = self
            .get("/stock/metric", &[("symbol", ticker), ("metric", "all")])
            .await?;
        let metric = body.get("metric");
        Ok(ValuationMetrics {
            pe: metric
                .and_then(|m| m.get("peBasicExclExtraTTM"))
                .and_then(value_to_f64),
            ps: metric
                .and_then(|m| m.get("priceToSalesTTM"))
                .and_then(value_to_f64),
        })
    }
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
        Ok(self.quote(ticker).await?.map(|q| q.current))
    }
}

/// Twelve Data quote API
pub struct TwelveDataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TwelveDataClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for TwelveDataClient {
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
        let url = format!("{}/quote", self.base_url);
        tracing::debug!("📈 Twelve Data quote {}", ticker);
        let response = self
            .client
            .get(url)
            .query(&[("symbol", ticker), ("apikey", self.api_key.as_str())])
            .send()
            .await?;
        let body = read_json("Twelve Data", "quote", response).await?;

        if body.get("status").and_then(Value::as_str) == Some("error") {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            tracing::warn!("⚠️ Twelve Data error for {}: {}", ticker, message);
            return Ok(None);
        }
        Ok(body.get("price").and_then(value_to_f64))
    }
}
