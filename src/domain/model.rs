use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// 用於 CSV 與欄寬計算的文字
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    /// Light red, `#FFB6C1`.
    Red,
    /// Light yellow, `#FFFACD`.
    Yellow,
}

impl Highlight {
    pub fn rgb(&self) -> u32 {
        match self {
            Highlight::Red => 0xFFB6C1,
            Highlight::Yellow => 0xFFFACD,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub highlight: Option<Highlight>,
}

/// 扁平報表：一個工作表、一列標題、若干資料列
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    /// Excel number format per column (e.g. `$#,##0.00`), applied to numeric cells.
    pub number_formats: Vec<Option<String>>,
}

impl Table {
    pub fn new(sheet_name: &str, headers: &[&str]) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            number_formats: vec![None; headers.len()],
        }
    }

    /// Unknown headers are ignored.
    pub fn set_number_format(&mut self, header: &str, format: &str) {
        if let Some(idx) = self.column_index(header) {
            self.number_formats[idx] = Some(format.to_string());
        }
    }

    /// Rows shorter than the header are padded with empty cells; longer rows are truncated.
    pub fn push_row(&mut self, mut cells: Vec<Cell>, highlight: Option<Highlight>) {
        if cells.len() != self.headers.len() {
            tracing::debug!(
                "Row has {} cells, table '{}' has {} columns",
                cells.len(),
                self.sheet_name,
                self.headers.len()
            );
            cells.resize(self.headers.len(), Cell::Empty);
        }
        self.rows.push(Row { cells, highlight });
    }

    pub fn push(&mut self, cells: Vec<Cell>) {
        self.push_row(cells, None);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaKind {
    DigiCert,
    Sectigo,
}

impl CaKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            CaKind::DigiCert => "DigiCert",
            CaKind::Sectigo => "Sectigo",
        }
    }

    /// Provider label used in `combined_domains.csv`.
    pub fn provider_label(&self) -> &'static str {
        match self {
            CaKind::DigiCert => "Digicert",
            CaKind::Sectigo => "Sectigo",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            CaKind::DigiCert => "digicert",
            CaKind::Sectigo => "sectigo",
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        label.trim().eq_ignore_ascii_case(self.slug())
    }
}

impl fmt::Display for CaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digicert" => Ok(CaKind::DigiCert),
            "sectigo" => Ok(CaKind::Sectigo),
            other => Err(format!("unknown CA '{}', expected digicert or sectigo", other)),
        }
    }
}

/// DigiCert `dcv_method` → report label.
pub fn digicert_dcv_label(method: Option<&str>) -> String {
    let method = match method {
        Some(m) if !m.is_empty() => m.to_lowercase(),
        _ => return "OTHER".to_string(),
    };
    if method.contains("dns-cname-token") {
        "CNAME"
    } else if method.contains("dns-txt-token") {
        "TXT"
    } else if method.contains("email") {
        "EMAIL"
    } else {
        "OTHER"
    }
    .to_string()
}

/// Sectigo `validationMethod` → report label; unknown values pass through unchanged.
pub fn sectigo_dcv_label(method: Option<&str>) -> String {
    match method {
        None | Some("") => "OTHER".to_string(),
        Some(m) => match m.to_uppercase().as_str() {
            "CNAME_CSR_HASH" => "CNAME".to_string(),
            "EMAIL" => "EMAIL".to_string(),
            "DNSTXT_RANDOM_VALUE" => "TXT".to_string(),
            _ => m.to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NsProvider {
    Akamai,
    Azure,
    Aws,
    Csc,
    Other,
    Unknown,
}

impl NsProvider {
    pub fn classify<S: AsRef<str>>(nameservers: &[S]) -> Self {
        if nameservers.is_empty() {
            return NsProvider::Unknown;
        }
        let joined = nameservers
            .iter()
            .map(|ns| ns.as_ref().to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.contains("akam") {
            NsProvider::Akamai
        } else if joined.contains("azure") {
            NsProvider::Azure
        } else if joined.contains("aws") {
            NsProvider::Aws
        } else if joined.contains("csc") {
            NsProvider::Csc
        } else {
            NsProvider::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NsProvider::Akamai => "Akamai",
            NsProvider::Azure => "Azure",
            NsProvider::Aws => "AWS",
            NsProvider::Csc => "CSC",
            NsProvider::Other => "Other",
            NsProvider::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for NsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 從 CA 清單 API 取得的網域（只保留同時有 id 與名稱者）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaDomain {
    pub id: String,
    pub name: String,
}

/// Row of `domain_id_lookup.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainIdEntry {
    pub id: String,
    pub domain: String,
    #[serde(rename = "CA")]
    pub ca: String,
}

/// Row of `digicert_domains.csv` / `sectigo_domains.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaDomainDetail {
    pub id: String,
    pub name: String,
    pub active: String,
    pub dcv_method: String,
    #[serde(rename = "Expiration")]
    pub expiration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub purchase_date: String,
    pub shares: f64,
    pub purchase_price: f64,
}

impl Holding {
    pub fn purchase_value(&self) -> f64 {
        self.shares * self.purchase_price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DnsAnswer {
    Records(Vec<String>),
    NoAnswer,
    NxDomain,
}

impl DnsAnswer {
    pub fn records(&self) -> &[String] {
        match self {
            DnsAnswer::Records(r) => r,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_row_pads_to_header_width() {
        let mut table = Table::new("Sheet", &["a", "b", "c"]);
        table.push(vec!["x".into()]);
        assert_eq!(table.rows[0].cells.len(), 3);
        assert_eq!(table.rows[0].cells[2], Cell::Empty);
    }

    #[test]
    fn test_cell_display_drops_integral_fraction() {
        assert_eq!(Cell::Number(3.0).display(), "3");
        assert_eq!(Cell::Number(2.5).display(), "2.5");
        assert_eq!(Cell::Empty.display(), "");
    }

    #[test]
    fn test_dcv_labels() {
        assert_eq!(digicert_dcv_label(Some("dns-cname-token")), "CNAME");
        assert_eq!(digicert_dcv_label(Some("DNS-TXT-TOKEN")), "TXT");
        assert_eq!(digicert_dcv_label(Some("email")), "EMAIL");
        assert_eq!(digicert_dcv_label(Some("http-token")), "OTHER");
        assert_eq!(digicert_dcv_label(None), "OTHER");

        assert_eq!(sectigo_dcv_label(Some("CNAME_CSR_HASH")), "CNAME");
        assert_eq!(sectigo_dcv_label(Some("dnstxt_random_value")), "TXT");
        assert_eq!(sectigo_dcv_label(Some("HTTP_CSR_HASH")), "HTTP_CSR_HASH");
        assert_eq!(sectigo_dcv_label(None), "OTHER");
    }

    #[test]
    fn test_ns_provider_classification() {
        assert_eq!(NsProvider::classify(&["a1-64.akam.net"]), NsProvider::Akamai);
        assert_eq!(NsProvider::classify(&["ns1-01.azure-dns.com"]), NsProvider::Azure);
        assert_eq!(NsProvider::classify(&["ns-1.awsdns-01.org"]), NsProvider::Aws);
        assert_eq!(NsProvider::classify(&["ns1.cscdns.net"]), NsProvider::Csc);
        assert_eq!(NsProvider::classify(&["ns1.example.net"]), NsProvider::Other);
        assert_eq!(NsProvider::classify::<&str>(&[]), NsProvider::Unknown);
    }

    #[test]
    fn test_ca_kind_parse() {
        assert_eq!("Digicert".parse::<CaKind>().unwrap(), CaKind::DigiCert);
        assert_eq!(" SECTIGO ".parse::<CaKind>().unwrap(), CaKind::Sectigo);
        assert!("letsencrypt".parse::<CaKind>().is_err());
        assert!(CaKind::DigiCert.matches("digicert "));
    }
}
