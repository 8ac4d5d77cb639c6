// One module per job; each job is a Pipeline run by EtlEngine.

pub mod azure_dns_report;
pub mod ca_data;
pub mod ca_details;
pub mod combine;
pub mod dc_add;
pub mod dcv_tokens;
pub mod domain_admin;
pub mod domain_lookup;
pub mod domain_validator;
pub mod futures_email;
pub mod gaps;
pub mod hosts_check;
pub mod ocr_batch;
pub mod portfolio;
pub mod sectigo_add_all;
pub mod sectigo_dcv;
pub mod stock_news;
pub mod valuation;

use crate::adapters::digicert::DigiCertClient;
use crate::adapters::sectigo::SectigoClient;
use crate::adapters::storage::LocalStorage;
use crate::config::{ApiVault, Settings};
use crate::domain::model::CaKind;
use crate::utils::error::{EtlError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

pub const DOMAIN_ID_LOOKUP_CSV: &str = "domain_id_lookup.csv";
pub const COMBINED_DOMAINS_CSV: &str = "combined_domains.csv";
pub const CA_GAPS_CSV: &str = "ca_gaps.csv";

/// `digicert_domains.csv` / `sectigo_domains.csv`
pub fn ca_details_file(ca: CaKind) -> String {
    format!("{}_domains.csv", ca.slug())
}

/// 檔名用時間戳 `YYYYMMDD_HHMMSS`
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Deserializes CSV rows; a leading UTF-8 BOM is ignored.
pub fn parse_csv<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(EtlError::from)
}

/// Storage rooted at the directory of `explicit` (or `default_dir`) plus the file name to write.
pub fn output_target(explicit: Option<&Path>, default_dir: &str, default_file: &str) -> (LocalStorage, String) {
    match explicit {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_string());
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| default_file.to_string());
            (LocalStorage::new(dir), file)
        }
        None => (LocalStorage::new(default_dir), default_file.to_string()),
    }
}

/// `--domain` 或 `--file`（一行一個，略過空白行）
pub fn read_domain_list(domain: Option<&str>, file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(domain) = domain {
        return Ok(vec![domain.trim().to_string()]);
    }
    let file = file.ok_or_else(|| EtlError::MissingConfigError {
        field: "--domain or --file".to_string(),
    })?;
    let content = std::fs::read_to_string(file)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `None` (with a warning) when the vault has no usable DigiCert credentials.
pub fn digicert_client(settings: &Settings, vault: &ApiVault) -> Result<Option<(DigiCertClient, Option<String>)>> {
    match vault.digicert() {
        Ok(creds) => Ok(Some((
            DigiCertClient::new(&settings.endpoints.digicert, &creds.api_key)?,
            creds.org_id,
        ))),
        Err(e) => {
            tracing::warn!("⚠️ Skipping DigiCert: {}", e);
            Ok(None)
        }
    }
}

pub fn sectigo_client(settings: &Settings, vault: &ApiVault) -> Result<Option<(SectigoClient, Option<String>)>> {
    match vault.sectigo() {
        Ok(creds) => Ok(Some((
            SectigoClient::new(&settings.endpoints.sectigo, &creds)?.with_dcv_url(&settings.endpoints.sectigo_dcv),
            creds.org_id.clone(),
        ))),
        Err(e) => {
            tracing::warn!("⚠️ Skipping Sectigo: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::DomainIdEntry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_csv_with_bom() {
        let data = b"\xEF\xBB\xBFid,domain,CA\n1, example.com ,DigiCert\n";
        let rows: Vec<DomainIdEntry> = parse_csv(data).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].domain, "example.com");
        assert_eq!(rows[0].ca, "DigiCert");
    }

    #[test]
    fn test_read_domain_list_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a.example\n\n  b.example  \n").unwrap();

        let domains = read_domain_list(None, Some(file.path())).unwrap();
        assert_eq!(domains, vec!["a.example", "b.example"]);

        let single = read_domain_list(Some(" c.example "), None).unwrap();
        assert_eq!(single, vec!["c.example"]);
    }

    #[test]
    fn test_output_target_splits_explicit_path() {
        use crate::domain::ports::Storage;

        let (storage, file) = output_target(Some(Path::new("reports/q3.xlsx")), ".", "default.xlsx");
        assert_eq!(file, "q3.xlsx");
        assert!(storage.display_path(&file).ends_with("q3.xlsx"));
        assert!(storage.display_path(&file).contains("reports"));

        let (storage, file) = output_target(Some(Path::new("bare.xlsx")), "out", "default.xlsx");
        assert_eq!(storage.display_path(&file), Path::new(".").join("bare.xlsx").display().to_string());

        let (storage, file) = output_target(None, "out", "default.xlsx");
        assert_eq!(storage.display_path(&file), Path::new("out").join("default.xlsx").display().to_string());
    }

    #[test]
    fn test_ca_details_file() {
        assert_eq!(ca_details_file(CaKind::DigiCert), "digicert_domains.csv");
        assert_eq!(ca_details_file(CaKind::Sectigo), "sectigo_domains.csv");
    }
}
