use super::portfolio::HoldingsStore;
use crate::adapters::market::{FinnhubClient, ValuationMetrics};
use crate::core::report::write_csv;
use crate::domain::model::{Cell, Table};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const HEADERS: [&str; 4] = ["ticker", "P/E", "P/S", "date"];

pub fn ratios_file(date: &str) -> String {
    format!("valuation_ratios_{}.csv", date)
}

/// Tickers in first-seen order, duplicates removed.
pub fn unique_tickers<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tickers
        .into_iter()
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

pub fn ratios_table(rows: &[(String, ValuationMetrics)], date: &str) -> Table {
    let mut table = Table::new("Valuation Ratios", &HEADERS);
    for (ticker, metrics) in rows {
        table.push(vec![
            ticker.clone().into(),
            metrics.pe.into(),
            metrics.ps.into(),
            Cell::text(date),
        ]);
    }
    table
}

/// `stocks ratios`：每檔股票的 P/E、P/S 快照
pub struct ValuationPipeline<S: Storage, R: Storage> {
    holdings: HoldingsStore<S>,
    report_storage: R,
    client: FinnhubClient,
    delay: Duration,
    date: String,
}

impl<S: Storage, R: Storage> ValuationPipeline<S, R> {
    pub fn new(holdings: HoldingsStore<S>, report_storage: R, client: FinnhubClient, delay: Duration) -> Self {
        Self {
            holdings,
            report_storage,
            client,
            delay,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

#[async_trait]
impl<S: Storage, R: Storage> Pipeline for ValuationPipeline<S, R> {
    type Item = String;
    type Output = Table;

    fn name(&self) -> &str {
        "stocks ratios"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        let holdings = self.holdings.load().await?;
        Ok(unique_tickers(holdings.iter().map(|h| h.ticker.as_str())))
    }

    async fn transform(&self, tickers: Vec<String>) -> Result<Table> {
        let mut rows = Vec::with_capacity(tickers.len());
        for (i, ticker) in tickers.into_iter().enumerate() {
            // Finnhub 免費方案有頻率限制
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let metrics = match self.client.metrics(&ticker).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("⚠️ No ratios for {}: {}", ticker, e);
                    ValuationMetrics::default()
                }
            };
            rows.push((ticker, metrics));
        }
        Ok(ratios_table(&rows, &self.date))
    }

    async fn load(&self, table: Table) -> Result<String> {
        let file = ratios_file(&self.date);
        self.report_storage.write_file(&file, &write_csv(&table)?).await?;

        println!("{}", HEADERS.join("\t"));
        for row in &table.rows {
            let cells: Vec<String> = row.cells.iter().map(Cell::display).collect();
            println!("{}", cells.join("\t"));
        }
        Ok(self.report_storage.display_path(&file))
    }
}
