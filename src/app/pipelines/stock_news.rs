use super::portfolio::HoldingsStore;
use super::valuation::unique_tickers;
use crate::adapters::mail::{MailAttachment, Mailer, XLSX_CONTENT_TYPE};
use crate::adapters::market::{FinnhubClient, NewsItem, QuoteSnapshot};
use crate::core::report::write_xlsx;
use crate::domain::model::Table;
use crate::domain::ports::{Pipeline, RecordCount, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate};

pub const HEADERS: [&str; 7] = [
    "Symbol",
    "Current Price",
    "Previous Close",
    "Change ($)",
    "Change (%)",
    "High",
    "Low",
];
const HEADLINES_PER_TICKER: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct TickerSummary {
    pub symbol: String,
    pub quote: QuoteSnapshot,
    pub news: Vec<NewsItem>,
}

#[derive(Debug, Clone)]
pub struct DailySummary {
    pub tickers: Vec<TickerSummary>,
}

impl RecordCount for DailySummary {
    fn record_count(&self) -> usize {
        self.tickers.len()
    }
}

pub fn subject_for(date: NaiveDate) -> String {
    format!("📈 Daily Stock Summary ({})", date.format("%Y-%m-%d"))
}

pub fn premarket_table(tickers: &[TickerSummary]) -> Table {
    let mut table = Table::new("Premarket Summary", &HEADERS);
    for column in ["Current Price", "Previous Close", "Change ($)", "High", "Low"] {
        table.set_number_format(column, "$#,##0.00");
    }
    table.set_number_format("Change (%)", "0.00");
    for t in tickers {
        table.push(vec![
            t.symbol.clone().into(),
            t.quote.current.into(),
            t.quote.previous_close.into(),
            t.quote.change().into(),
            t.quote.change_percent().into(),
            t.quote.high.into(),
            t.quote.low.into(),
        ]);
    }
    table
}

fn news_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// 信件內文：每檔最多三則新聞
pub fn email_body(tickers: &[TickerSummary]) -> String {
    let mut body = String::from(
        "Daily Stock Summary\n\nPlease find attached the premarket data spreadsheet.\n\n📰 Recent News:\n\n",
    );
    for t in tickers.iter().filter(|t| !t.news.is_empty()) {
        body.push_str(&format!("=== {} ===\n", t.symbol));
        for item in t.news.iter().take(HEADLINES_PER_TICKER) {
            body.push_str(&format!(
                "{} ({})\n{}\n\n",
                item.headline,
                news_date(item.datetime),
                item.url
            ));
        }
    }
    body
}

/// `stocks news`：盤前報價試算表 + 新聞摘要信
pub struct StockNewsPipeline<S: Storage, R: Storage> {
    holdings: HoldingsStore<S>,
    report_storage: R,
    summary_file: String,
    client: FinnhubClient,
    mailer: Mailer,
    news_days: u32,
}

impl<S: Storage, R: Storage> StockNewsPipeline<S, R> {
    pub fn new(
        holdings: HoldingsStore<S>,
        report_storage: R,
        summary_file: &str,
        client: FinnhubClient,
        mailer: Mailer,
        news_days: u32,
    ) -> Self {
        Self {
            holdings,
            report_storage,
            summary_file: summary_file.to_string(),
            client,
            mailer,
            news_days,
        }
    }

    async fn summarize(&self, symbol: String, from: &str, to: &str) -> Option<TickerSummary> {
        let quote = match self.client.quote(&symbol).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                tracing::warn!("⚠️ No quote for {}", symbol);
                return None;
            }
            Err(e) => {
                tracing::warn!("⚠️ Error fetching premarket data for {}: {}", symbol, e);
                return None;
            }
        };
        let news = self
            .client
            .company_news(&symbol, from, to)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("⚠️ Error fetching news for {}: {}", symbol, e);
                Vec::new()
            });
        Some(TickerSummary { symbol, quote, news })
    }
}

#[async_trait]
impl<S: Storage, R: Storage> Pipeline for StockNewsPipeline<S, R> {
    type Item = String;
    type Output = DailySummary;

    fn name(&self) -> &str {
        "stocks news"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        let holdings = self.holdings.load().await?;
        let tickers: Vec<String> = holdings.iter().map(|h| h.ticker.trim().to_uppercase()).collect();
        Ok(unique_tickers(tickers.iter().map(String::as_str)))
    }

    async fn transform(&self, data: Vec<String>) -> Result<DailySummary> {
        let today = Local::now().date_naive();
        let from = (today - Duration::days(i64::from(self.news_days))).format("%Y-%m-%d").to_string();
        let to = today.format("%Y-%m-%d").to_string();

        let mut tickers = Vec::with_capacity(data.len());
        for symbol in data {
            if let Some(summary) = self.summarize(symbol, &from, &to).await {
                tickers.push(summary);
            }
        }
        Ok(DailySummary { tickers })
    }

    async fn load(&self, summary: DailySummary) -> Result<String> {
        let workbook = write_xlsx(&premarket_table(&summary.tickers))?;
        self.report_storage
            .write_file(&self.summary_file, &workbook)
            .await?;
        let location = self.report_storage.display_path(&self.summary_file);
        tracing::info!("📊 Premarket summary saved to {}", location);

        let attachment = MailAttachment {
            filename: self.summary_file.clone(),
            content_type: XLSX_CONTENT_TYPE.to_string(),
            data: workbook,
        };
        self.mailer
            .send_with_attachment(
                &subject_for(Local::now().date_naive()),
                &email_body(&summary.tickers),
                &attachment,
            )
            .await?;
        tracing::info!("✉️ Daily stock summary sent");
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use crate::domain::model::{Cell, Holding};
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn news(headline: &str) -> NewsItem {
        NewsItem {
            headline: headline.to_string(),
            url: format!("https://news.example/{}", headline),
            // 2024-05-01 12:00 UTC
            datetime: 1714564800,
        }
    }

    #[test]
    fn test_body_limits_headlines_and_skips_quiet_tickers() {
        let tickers = vec![
            TickerSummary {
                symbol: "AAPL".into(),
                quote: QuoteSnapshot::default(),
                news: vec![news("a"), news("b"), news("c"), news("d")],
            },
            TickerSummary {
                symbol: "MSFT".into(),
                quote: QuoteSnapshot::default(),
                news: Vec::new(),
            },
        ];
        let body = email_body(&tickers);
        assert!(body.starts_with("Daily Stock Summary\n\nPlease find attached"));
        assert!(body.contains("=== AAPL ===\na (2024-05-01)\nhttps://news.example/a\n\n"));
        assert!(body.contains("c (2024-05-01)"));
        assert!(!body.contains("d (2024-05-01)"));
        assert!(!body.contains("MSFT"));
    }

    #[test]
    fn test_subject() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(subject_for(date), "📈 Daily Stock Summary (2025-03-07)");
    }

    #[tokio::test]
    async fn test_unknown_ticker_left_out_of_sheet() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/quote").query_param("symbol", "AAPL");
            then.status(200)
                .json_body(json!({"c": 210.0, "pc": 200.0, "h": 212.0, "l": 199.0}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/quote").query_param("symbol", "ZZZZ");
            then.status(200).json_body(json!({"c": 0, "pc": 0}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/company-news").query_param("symbol", "AAPL");
            then.status(500);
        });

        let dir = TempDir::new().unwrap();
        let holdings = HoldingsStore::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            "stocks.csv",
            "stocks.json",
        );
        let holding = |t: &str| Holding {
            ticker: t.to_string(),
            purchase_date: "2024-01-02".to_string(),
            shares: 1.0,
            purchase_price: 1.0,
        };
        holdings
            .save(&[holding("aapl"), holding("ZZZZ"), holding("AAPL")])
            .await
            .unwrap();

        let pipeline = StockNewsPipeline::new(
            holdings,
            LocalStorage::new(dir.path().join("reports").to_str().unwrap()),
            "stock_summary.xlsx",
            FinnhubClient::new(&server.base_url(), "key").unwrap(),
            Mailer::dry("me@example.com", "me@example.com").unwrap(),
            1,
        );

        let tickers = pipeline.extract().await.unwrap();
        assert_eq!(tickers, vec!["AAPL", "ZZZZ"]);

        let summary = pipeline.transform(tickers).await.unwrap();
        assert_eq!(summary.tickers.len(), 1);
        assert!(summary.tickers[0].news.is_empty());

        let table = premarket_table(&summary.tickers);
        assert_eq!(table.rows[0].cells[3], Cell::Number(10.0));
        assert_eq!(table.rows[0].cells[4], Cell::Number(5.0));

        let location = EtlEngine::new(pipeline).run().await.unwrap();
        assert!(location.ends_with("stock_summary.xlsx"));
        let bytes = std::fs::read(location).unwrap();
        // xlsx 為 zip 格式
        assert_eq!(&bytes[..2], b"PK");
    }
}
