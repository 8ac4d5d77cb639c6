use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "ops-etl.toml";

/// `ops-etl.toml`，每個區段都可省略
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub endpoints: EndpointsConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
    pub stocks: StocksConfig,
    pub email: EmailConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub report_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_dir: "log".to_string(),
            report_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub digicert: String,
    pub sectigo: String,
    pub sectigo_dcv: String,
    pub azure_login: String,
    pub azure_management: String,
    pub dns_over_https: String,
    pub finnhub: String,
    pub twelvedata: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            digicert: "https://www.digicert.com/services/v2".to_string(),
            sectigo: "https://cert-manager.com/api/domain/v1".to_string(),
            sectigo_dcv: "https://cert-manager.com/api/dcv".to_string(),
            azure_login: "https://login.microsoftonline.com".to_string(),
            azure_management: "https://management.azure.com".to_string(),
            dns_over_https: "https://dns.google".to_string(),
            finnhub: "https://finnhub.io/api/v1".to_string(),
            twelvedata: "https://api.twelvedata.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub concurrency: usize,
    pub request_delay_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file_logging: bool,
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_logging: false,
            retention_days: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureSymbol {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StocksConfig {
    pub portfolio_csv: String,
    pub portfolio_json: String,
    pub report_file: String,
    pub summary_file: String,
    /// 新聞回溯天數
    pub news_days: u32,
    pub futures: Vec<FutureSymbol>,
}

impl Default for StocksConfig {
    fn default() -> Self {
        let future = |name: &str, symbol: &str| FutureSymbol {
            name: name.to_string(),
            symbol: symbol.to_string(),
        };
        Self {
            portfolio_csv: "stocks.csv".to_string(),
            portfolio_json: "stocks.json".to_string(),
            report_file: "stock_report.xlsx".to_string(),
            summary_file: "stock_summary.xlsx".to_string(),
            news_days: 1,
            futures: vec![
                future("S&P 500 Futures", "ES=F"),
                future("Nasdaq Futures", "NQ=F"),
                future("Dow Futures", "YM=F"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// SMTPS (port 465)
    #[default]
    Implicit,
    /// STARTTLS (port 587)
    Starttls,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub tls: SmtpTls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub ghostscript: String,
    pub tesseract: String,
    pub lang: String,
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            ghostscript: "gs".to_string(),
            tesseract: "tesseract".to_string(),
            lang: "eng".to_string(),
            dpi: 300,
        }
    }
}

impl Settings {
    /// 明確指定的檔案必須存在；未指定時讀取工作目錄的 `ops-etl.toml`（若有）
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(EtlError::ConfigError {
                        message: format!("Settings file not found: {}", p.display()),
                    });
                }
                Self::from_file(p)
            }
            None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
                Self::from_file(DEFAULT_SETTINGS_FILE)
            }
            None => {
                tracing::debug!("No {} found, using defaults", DEFAULT_SETTINGS_FILE);
                Ok(Self::default())
            }
        }
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        tracing::debug!("Loading settings from {}", path.as_ref().display());
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_KEY})，找不到的變數保留原樣
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| {
            Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        let endpoints = [
            ("endpoints.digicert", &self.endpoints.digicert),
            ("endpoints.sectigo", &self.endpoints.sectigo),
            ("endpoints.sectigo_dcv", &self.endpoints.sectigo_dcv),
            ("endpoints.azure_login", &self.endpoints.azure_login),
            ("endpoints.azure_management", &self.endpoints.azure_management),
            ("endpoints.dns_over_https", &self.endpoints.dns_over_https),
            ("endpoints.finnhub", &self.endpoints.finnhub),
            ("endpoints.twelvedata", &self.endpoints.twelvedata),
        ];
        for (field, url) in endpoints {
            validate_url(field, url)?;
        }

        validate_path("paths.data_dir", &self.paths.data_dir)?;
        validate_path("paths.log_dir", &self.paths.log_dir)?;
        validate_path("paths.report_dir", &self.paths.report_dir)?;
        validate_path("stocks.portfolio_csv", &self.stocks.portfolio_csv)?;
        validate_path("stocks.portfolio_json", &self.stocks.portfolio_json)?;
        validate_path("stocks.report_file", &self.stocks.report_file)?;
        validate_path("stocks.summary_file", &self.stocks.summary_file)?;

        validate_positive_number("jobs.concurrency", self.jobs.concurrency, 1)?;
        validate_range("logging.retention_days", self.logging.retention_days, 1, 365)?;
        validate_range("ocr.dpi", self.ocr.dpi, 72, 1200)?;
        validate_range("stocks.news_days", self.stocks.news_days, 1, 30)?;

        for future in &self.stocks.futures {
            if future.symbol.trim().is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "stocks.futures".to_string(),
                    value: future.name.clone(),
                    reason: "Future symbol cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn data_path(&self, file: &str) -> String {
        Path::new(&self.paths.data_dir)
            .join(file)
            .display()
            .to_string()
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
