use crate::adapters::mail::Mailer;
use crate::core::report::{format_currency, format_percent, write_xlsx};
use crate::domain::model::{Cell, Holding, Table};
use crate::domain::ports::{Pipeline, QuoteSource, RecordCount, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const REPORT_HEADERS: [&str; 9] = [
    "Ticker",
    "Shares",
    "Purchase Date",
    "Purchase Price",
    "Current Price",
    "Purchase Value",
    "Current Value",
    "Gain/Loss ($)",
    "Gain/Loss (%)",
];
pub const MONEY_FORMAT: &str = "$#,##0.00";
pub const PERCENT_FORMAT: &str = "0.00%";
const CSV_HEADERS: [&str; 4] = ["ticker", "purchase_date", "shares", "purchase_price"];

/// Raw CSV row; numbers are parsed by hand so a bad row can be skipped.
#[derive(Debug, Deserialize)]
struct HoldingRow {
    ticker: String,
    purchase_date: String,
    shares: String,
    purchase_price: String,
}

impl HoldingRow {
    fn parse(self) -> std::result::Result<Holding, String> {
        let ticker = self.ticker.trim().to_uppercase();
        let purchase_date = self.purchase_date.trim().to_string();
        if ticker.is_empty() || purchase_date.is_empty() {
            return Err("missing ticker or date".to_string());
        }
        let number = |field: &str, raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|e| format!("{} '{}': {}", field, raw, e))
        };
        Ok(Holding {
            ticker,
            purchase_date,
            shares: number("shares", &self.shares)?,
            purchase_price: number("purchase_price", &self.purchase_price)?,
        })
    }
}

/// 持股檔：先讀 CSV，失敗或沒有資料時改讀 JSON；存檔兩者都寫
pub struct HoldingsStore<S: Storage> {
    storage: S,
    csv_file: String,
    json_file: String,
}

impl<S: Storage> HoldingsStore<S> {
    pub fn new(storage: S, csv_file: &str, json_file: &str) -> Self {
        Self {
            storage,
            csv_file: csv_file.to_string(),
            json_file: json_file.to_string(),
        }
    }

    fn parse_csv_holdings(data: &[u8]) -> Vec<Holding> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data);

        let mut holdings = Vec::new();
        for (line, row) in reader.deserialize::<HoldingRow>().enumerate() {
            match row.map_err(|e| e.to_string()).and_then(HoldingRow::parse) {
                Ok(holding) => holdings.push(holding),
                Err(e) => tracing::warn!("⚠️ Skipping invalid row {}: {}", line + 2, e),
            }
        }
        holdings
    }

    pub async fn load(&self) -> Result<Vec<Holding>> {
        if self.storage.exists(&self.csv_file) {
            let data = self.storage.read_file(&self.csv_file).await?;
            let holdings = Self::parse_csv_holdings(&data);
            if !holdings.is_empty() {
                tracing::info!(
                    "Successfully loaded {} stocks from {}",
                    holdings.len(),
                    self.csv_file
                );
                return Ok(holdings);
            }
            tracing::warn!("⚠️ No valid stock data found in {}", self.csv_file);
        }

        if !self.storage.exists(&self.json_file) {
            tracing::info!("No existing stock data found");
            return Ok(Vec::new());
        }
        let data = self.storage.read_file(&self.json_file).await?;
        let holdings: Vec<Holding> = serde_json::from_slice(&data)?;
        tracing::info!("Loaded {} stocks from {}", holdings.len(), self.json_file);
        Ok(holdings)
    }

    pub async fn save(&self, holdings: &[Holding]) -> Result<()> {
        self.storage
            .write_file(&self.json_file, &serde_json::to_vec_pretty(holdings)?)
            .await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADERS)?;
        for h in holdings {
            writer.write_record([
                h.ticker.clone(),
                h.purchase_date.clone(),
                h.shares.to_string(),
                h.purchase_price.to_string(),
            ])?;
        }
        let csv = writer
            .into_inner()
            .map_err(|e| EtlError::processing(e.to_string()))?;
        self.storage.write_file(&self.csv_file, &csv).await
    }

    pub async fn add(&self, holding: Holding) -> Result<usize> {
        let mut holdings = self.load().await?;
        tracing::info!(
            "➕ {} x {} @ {} on {}",
            holding.ticker,
            holding.shares,
            holding.purchase_price,
            holding.purchase_date
        );
        holdings.push(holding);
        self.save(&holdings).await?;
        Ok(holdings.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub holding: Holding,
    pub current_price: f64,
    pub purchase_value: f64,
    pub current_value: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
}

impl Performance {
    pub fn new(holding: Holding, current_price: f64) -> Self {
        let purchase_value = holding.purchase_value();
        let current_value = holding.shares * current_price;
        let gain_loss = current_value - purchase_value;
        Self {
            holding,
            current_price,
            purchase_value,
            current_value,
            gain_loss,
            gain_loss_pct: percent_of(gain_loss, purchase_value),
        }
    }
}

fn percent_of(gain: f64, base: f64) -> f64 {
    if base > 0.0 {
        gain / base * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub invested: f64,
    pub current: f64,
    pub gain_loss: f64,
    pub pct: f64,
}

impl Totals {
    pub fn of(rows: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let (invested, current) = rows
            .into_iter()
            .fold((0.0, 0.0), |(i, c), (pi, pc)| (i + pi, c + pc));
        let gain_loss = current - invested;
        Self {
            invested,
            current,
            gain_loss,
            pct: percent_of(gain_loss, invested),
        }
    }
}

/// 查不到價格時以 0.0 計
async fn price_or_zero(quotes: &dyn QuoteSource, ticker: &str) -> f64 {
    match quotes.current_price(ticker).await {
        Ok(Some(price)) => price,
        Ok(None) => {
            tracing::warn!("⚠️ No price data available for {}", ticker);
            0.0
        }
        Err(e) => {
            tracing::warn!("⚠️ Error fetching price for {}: {}", ticker, e);
            0.0
        }
    }
}

pub fn performance_table(rows: &[Performance]) -> Table {
    let mut table = Table::new("Stock Performance", &REPORT_HEADERS);
    for header in &REPORT_HEADERS[3..8] {
        table.set_number_format(header, MONEY_FORMAT);
    }
    table.set_number_format("Gain/Loss (%)", PERCENT_FORMAT);

    let mut sorted: Vec<&Performance> = rows.iter().collect();
    sorted.sort_by(|a, b| a.holding.ticker.cmp(&b.holding.ticker));

    for p in sorted {
        table.push(vec![
            p.holding.ticker.clone().into(),
            p.holding.shares.into(),
            p.holding.purchase_date.clone().into(),
            p.holding.purchase_price.into(),
            p.current_price.into(),
            p.purchase_value.into(),
            p.current_value.into(),
            p.gain_loss.into(),
            // Excel 百分比格式會乘 100
            (p.gain_loss_pct / 100.0).into(),
        ]);
    }

    let totals = Totals::of(rows.iter().map(|p| (p.purchase_value, p.current_value)));
    table.push(vec![
        "TOTAL".into(),
        Cell::Empty,
        Cell::Empty,
        Cell::Empty,
        Cell::Empty,
        totals.invested.into(),
        totals.current.into(),
        totals.gain_loss.into(),
        (totals.pct / 100.0).into(),
    ]);
    table
}

pub fn email_summary(rows: &[Performance]) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .map(|p| {
            format!(
                "{}: {} shares, now {} ({}), gain/loss {} ({})",
                p.holding.ticker,
                p.holding.shares,
                format_currency(p.current_price),
                format_currency(p.current_value),
                format_currency(p.gain_loss),
                format_percent(p.gain_loss_pct)
            )
        })
        .collect();
    let totals = Totals::of(rows.iter().map(|p| (p.purchase_value, p.current_value)));
    lines.push(String::new());
    lines.push(format!(
        "TOTAL: invested {}, current {}, gain/loss {} ({})",
        format_currency(totals.invested),
        format_currency(totals.current),
        format_currency(totals.gain_loss),
        format_percent(totals.pct)
    ));
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct PortfolioReport {
    pub performance: Vec<Performance>,
    pub table: Table,
}

impl RecordCount for PortfolioReport {
    fn record_count(&self) -> usize {
        self.performance.len()
    }
}

/// `stocks report`：持股績效工作表，可選擇寄出摘要
pub struct PortfolioReportPipeline<S: Storage, R: Storage> {
    holdings: HoldingsStore<S>,
    report_storage: R,
    report_file: String,
    quotes: Arc<dyn QuoteSource>,
    mailer: Option<Mailer>,
}

impl<S: Storage, R: Storage> PortfolioReportPipeline<S, R> {
    pub fn new(
        holdings: HoldingsStore<S>,
        report_storage: R,
        report_file: &str,
        quotes: Arc<dyn QuoteSource>,
        mailer: Option<Mailer>,
    ) -> Self {
        Self {
            holdings,
            report_storage,
            report_file: report_file.to_string(),
            quotes,
            mailer,
        }
    }
}

#[async_trait]
impl<S: Storage, R: Storage> Pipeline for PortfolioReportPipeline<S, R> {
    type Item = Holding;
    type Output = PortfolioReport;

    fn name(&self) -> &str {
        "stocks report"
    }

    async fn extract(&self) -> Result<Vec<Holding>> {
        self.holdings.load().await
    }

    async fn transform(&self, data: Vec<Holding>) -> Result<PortfolioReport> {
        let mut performance = Vec::with_capacity(data.len());
        for holding in data {
            let price = price_or_zero(self.quotes.as_ref(), &holding.ticker).await;
            performance.push(Performance::new(holding, price));
        }
        let table = performance_table(&performance);
        Ok(PortfolioReport { performance, table })
    }

    async fn load(&self, report: PortfolioReport) -> Result<String> {
        self.report_storage
            .write_file(&self.report_file, &write_xlsx(&report.table)?)
            .await?;
        let location = self.report_storage.display_path(&self.report_file);
        println!("Report saved to {}", location);

        if let Some(mailer) = &self.mailer {
            let subject = format!(
                "Stock Performance Report - {}",
                chrono::Local::now().format("%Y-%m-%d")
            );
            mailer
                .send_text(&subject, &email_summary(&report.performance))
                .await?;
            tracing::info!("✉️ Portfolio summary sent");
        }
        Ok(location)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PnlLine {
    pub holding: Holding,
    pub current_price: Option<f64>,
}

impl PnlLine {
    pub fn render(&self) -> String {
        let h = &self.holding;
        match self.current_price {
            Some(price) => {
                let pnl = (price - h.purchase_price) * h.shares;
                format!(
                    "{:6} | Shares: {:3} | Buy: ${:7.2} | Current: ${:7.2} | P&L: ${:8.2}",
                    h.ticker, h.shares, h.purchase_price, price, pnl
                )
            }
            None => format!(
                "{:6} | Shares: {:3} | Buy: ${:7.2} | Current: ERROR | P&L: ERROR",
                h.ticker, h.shares, h.purchase_price
            ),
        }
    }
}

/// 只計入有報價的持股
pub fn pnl_summary(lines: &[PnlLine]) -> Vec<String> {
    let totals = Totals::of(lines.iter().filter_map(|l| {
        l.current_price
            .map(|price| (l.holding.purchase_value(), l.holding.shares * price))
    }));

    let mut out = vec![
        format!("Total Invested: {}", format_currency(totals.invested)),
        format!("Total Current Value: {}", format_currency(totals.current)),
        format!("Total P&L: {}", format_currency(totals.gain_loss)),
    ];
    if totals.invested > 0.0 {
        out.push(format!("Total Return: {:+.2}%", totals.pct));
    }
    out
}

/// `stocks pnl`：主控台損益
pub struct PnlPipeline<S: Storage> {
    holdings: HoldingsStore<S>,
    quotes: Arc<dyn QuoteSource>,
}

impl<S: Storage> PnlPipeline<S> {
    pub fn new(holdings: HoldingsStore<S>, quotes: Arc<dyn QuoteSource>) -> Self {
        Self { holdings, quotes }
    }
}

#[async_trait]
impl<S: Storage> Pipeline for PnlPipeline<S> {
    type Item = Holding;
    type Output = Vec<PnlLine>;

    fn name(&self) -> &str {
        "stocks pnl"
    }

    async fn extract(&self) -> Result<Vec<Holding>> {
        self.holdings.load().await
    }

    async fn transform(&self, data: Vec<Holding>) -> Result<Vec<PnlLine>> {
        let mut lines = Vec::with_capacity(data.len());
        for holding in data {
            let current_price = match self.quotes.current_price(&holding.ticker).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!("⚠️ Error fetching data for {}: {}", holding.ticker, e);
                    None
                }
            };
            lines.push(PnlLine {
                holding,
                current_price,
            });
        }
        Ok(lines)
    }

    async fn load(&self, lines: Vec<PnlLine>) -> Result<String> {
        if lines.is_empty() {
            println!("No stocks found. Add one with `ops-etl stocks add`.");
            return Ok("stdout".to_string());
        }

        println!("Found {} stock entries to analyze", lines.len());
        println!("{}", "-".repeat(60));
        for line in &lines {
            println!("{}", line.render());
        }
        println!("{}", "-".repeat(60));
        for line in pnl_summary(&lines) {
            println!("{}", line);
        }
        Ok("stdout".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedQuotes(HashMap<String, f64>);

    impl FixedQuotes {
        fn new(prices: &[(&str, f64)]) -> Self {
            Self(prices.iter().map(|(t, p)| (t.to_string(), *p)).collect())
        }
    }

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
            Ok(self.0.get(ticker).copied())
        }
    }

    fn holding(ticker: &str, shares: f64, price: f64) -> Holding {
        Holding {
            ticker: ticker.to_string(),
            purchase_date: "2024-01-02".to_string(),
            shares,
            purchase_price: price,
        }
    }

    fn store(dir: &TempDir) -> HoldingsStore<LocalStorage> {
        HoldingsStore::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            "stocks.csv",
            "stocks.json",
        )
    }

    #[tokio::test]
    async fn test_csv_load_skips_bad_rows_and_uppercases() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("stocks.csv"),
            "\u{feff}ticker,purchase_date,shares,purchase_price\n\
             aapl , 2024-01-02, 10, 150.5\n\
             msft,2024-02-01,abc,300\n\
             ,2024-02-01,1,1\n",
        )
        .unwrap();

        let holdings = store(&dir).load().await.unwrap();
        assert_eq!(holdings, vec![Holding {
            ticker: "AAPL".into(),
            purchase_date: "2024-01-02".into(),
            shares: 10.0,
            purchase_price: 150.5,
        }]);
    }

    #[tokio::test]
    async fn test_falls_back_to_json_and_add_saves_both() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("stocks.json"),
            r#"[{"ticker":"NVDA","purchase_date":"2023-05-01","shares":2.0,"purchase_price":300.0}]"#,
        )
        .unwrap();

        let s = store(&dir);
        assert_eq!(s.load().await.unwrap().len(), 1);
        assert_eq!(s.add(holding("AMD", 5.0, 100.0)).await.unwrap(), 2);

        let csv = std::fs::read_to_string(dir.path().join("stocks.csv")).unwrap();
        assert_eq!(
            csv,
            "ticker,purchase_date,shares,purchase_price\nNVDA,2023-05-01,2,300\nAMD,2024-01-02,5,100\n"
        );
        assert_eq!(s.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_files_mean_empty_portfolio() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().await.unwrap().is_empty());
    }

    #[test]
    fn test_performance_table_sorted_with_total() {
        let rows = vec![
            Performance::new(holding("MSFT", 2.0, 100.0), 150.0),
            Performance::new(holding("AAPL", 10.0, 10.0), 0.0),
        ];
        let table = performance_table(&rows);

        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0].cells[0], Cell::text("AAPL"));
        assert_eq!(table.rows[0].cells[8], Cell::Number(-1.0));
        assert_eq!(table.rows[1].cells[7], Cell::Number(100.0));

        let total = &table.rows[2].cells;
        assert_eq!(total[0], Cell::text("TOTAL"));
        assert_eq!(total[1], Cell::Empty);
        assert_eq!(total[5], Cell::Number(300.0));
        assert_eq!(total[6], Cell::Number(300.0));
        assert_eq!(total[7], Cell::Number(0.0));
        assert_eq!(table.number_formats[3].as_deref(), Some(MONEY_FORMAT));
        assert_eq!(table.number_formats[8].as_deref(), Some(PERCENT_FORMAT));
    }

    #[test]
    fn test_zero_purchase_value_has_zero_percent() {
        let p = Performance::new(holding("GIFT", 1.0, 0.0), 50.0);
        assert_eq!(p.gain_loss, 50.0);
        assert_eq!(p.gain_loss_pct, 0.0);
    }

    #[test]
    fn test_pnl_lines_and_totals() {
        let priced = PnlLine {
            holding: holding("AAPL", 10.0, 100.0),
            current_price: Some(110.0),
        };
        let missing = PnlLine {
            holding: holding("ZZZ", 1.0, 5.0),
            current_price: None,
        };

        assert_eq!(
            priced.render(),
            "AAPL   | Shares:  10 | Buy: $ 100.00 | Current: $ 110.00 | P&L: $  100.00"
        );
        assert!(missing.render().ends_with("Current: ERROR | P&L: ERROR"));

        let summary = pnl_summary(&[priced, missing]);
        assert_eq!(
            summary,
            vec![
                "Total Invested: $1,000.00",
                "Total Current Value: $1,100.00",
                "Total P&L: $100.00",
                "Total Return: +10.00%",
            ]
        );
    }

    #[tokio::test]
    async fn test_report_pipeline_writes_workbook() {
        let dir = TempDir::new().unwrap();
        store(&dir).save(&[holding("AAPL", 1.0, 100.0)]).await.unwrap();

        let pipeline = PortfolioReportPipeline::new(
            store(&dir),
            LocalStorage::new(dir.path().join("reports").to_str().unwrap()),
            "stock_report.xlsx",
            Arc::new(FixedQuotes::new(&[("AAPL", 120.0)])),
            Some(Mailer::dry("me@example.com", "me@example.com").unwrap()),
        );
        let location = EtlEngine::new(pipeline).run().await.unwrap();
        assert!(location.ends_with("stock_report.xlsx"));
        assert!(dir.path().join("reports").join("stock_report.xlsx").exists());
    }
}
