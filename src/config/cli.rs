use crate::domain::model::CaKind;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, validate_range, Validate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "ops-etl")]
#[command(about = "Certificate, DNS, OCR and portfolio automation jobs")]
#[command(version)]
pub struct Cli {
    /// Settings file (default: ./ops-etl.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API vault file (default: $OPS_ETL_VAULT or ~/.ApiVault)
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log per-phase timing and memory usage")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Also write the log to <log_dir>/<job>_<ts>.log")]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List DigiCert and Sectigo domains into domain_id_lookup.csv
    DomainIds,

    /// Fetch per-domain details for one CA
    CaDetails {
        #[arg(long)]
        ca: CaKind,
    },

    /// Merge both CA detail files and classify nameserver providers
    Combine,

    /// Refresh both CA detail files, then combine them
    CaData,

    /// Report domains present in one CA but missing from another
    Gaps {
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Add a domain to DigiCert and Sectigo
    Add { domain: String },

    /// Remove a domain from every CA listed in combined_domains.csv
    Remove { domain: String },

    /// Add domains to DigiCert with DNS TXT validation and collect the tokens
    DcAdd {
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        domain: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check domain format, DigiCert status and DNS records
    Validate {
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        domain: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        org_id: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Report Sectigo DCV status for named domains, or for the whole account
    StgDcv {
        #[arg(long, conflicts_with = "file")]
        domain: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Add domains to Sectigo and submit DNS TXT validation for each
    StgAddAll {
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        domain: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Switch combined_domains.csv entries to CNAME validation and record the tokens
    DcvTokens {
        #[arg(long, conflicts_with = "file")]
        domain: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Publish the CNAME records of Azure-hosted domains
        #[arg(long)]
        publish: bool,
    },

    /// Check a hosts file against DNS, optionally trying each search suffix
    HostsCheck {
        #[arg(long)]
        hosts: PathBuf,
        #[arg(long)]
        suffixes: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Inventory every Azure public and private DNS zone
    AzureDns {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Portfolio tracking
    Stocks {
        #[command(subcommand)]
        command: StocksCommand,
    },

    /// Email the current index futures prices
    FuturesEmail {
        #[arg(long)]
        dry_run: bool,
    },

    /// OCR every PDF in a directory into text files
    Ocr {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        dpi: Option<u32>,
        #[arg(long)]
        jobs: Option<usize>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum StocksCommand {
    /// Record a purchase
    Add {
        ticker: String,
        /// Purchase date, YYYY-MM-DD
        date: String,
        shares: f64,
        price: f64,
    },
    /// Build the performance workbook
    Report {
        #[arg(long)]
        email: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print profit and loss per holding
    Pnl,
    /// Write P/E and P/S ratios for every holding
    Ratios,
    /// Email the premarket spreadsheet with recent headlines
    News {
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    /// 日誌檔名前綴
    pub fn job_name(&self) -> &'static str {
        match self {
            Command::DomainIds => "domain_ids",
            Command::CaDetails { .. } => "ca_details",
            Command::Combine => "combine",
            Command::CaData => "ca_data",
            Command::Gaps { .. } => "ca_gaps",
            Command::Add { .. } | Command::Remove { .. } => "add_remove",
            Command::DcAdd { .. } => "dc_add",
            Command::Validate { .. } => "domain_validator",
            Command::StgDcv { .. } => "sectigo_dcv",
            Command::StgAddAll { .. } => "stg_add_all",
            Command::DcvTokens { .. } => "dcv_tokens",
            Command::HostsCheck { .. } => "hosts_check",
            Command::AzureDns { .. } => "azure_dns",
            Command::Stocks { .. } => "stocks",
            Command::FuturesEmail { .. } => "futures_email",
            Command::Ocr { .. } => "ocr",
        }
    }
}

impl Validate for Cli {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Add { domain } | Command::Remove { domain } => {
                validate_non_empty_string("domain", domain)
            }
            Command::DcAdd { domain: Some(d), .. }
            | Command::Validate { domain: Some(d), .. }
            | Command::StgDcv { domain: Some(d), .. }
            | Command::StgAddAll { domain: Some(d), .. }
            | Command::DcvTokens { domain: Some(d), .. } => {
                validate_non_empty_string("--domain", d)
            }
            Command::Ocr { dpi, jobs, lang, .. } => {
                if let Some(dpi) = dpi {
                    validate_range("--dpi", *dpi, 72, 1200)?;
                }
                if let Some(jobs) = jobs {
                    validate_positive_number("--jobs", *jobs, 1)?;
                }
                if let Some(lang) = lang {
                    validate_non_empty_string("--lang", lang)?;
                }
                Ok(())
            }
            Command::Stocks {
                command: StocksCommand::Add { ticker, date, shares, price },
            } => {
                validate_non_empty_string("ticker", ticker)?;
                chrono::NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
                    EtlError::InvalidConfigValueError {
                        field: "date".to_string(),
                        value: date.clone(),
                        reason: format!("expected YYYY-MM-DD ({})", e),
                    }
                })?;
                if *shares <= 0.0 || *price < 0.0 {
                    return Err(EtlError::ValidationError {
                        message: "shares must be positive and price non-negative".to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
