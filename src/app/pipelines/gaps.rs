use super::{parse_csv, CA_GAPS_CSV};
use crate::core::report::write_csv;
use crate::domain::model::{DomainIdEntry, Table};
use crate::domain::ports::{Pipeline, RecordCount, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GapReport {
    pub lines: Vec<String>,
    pub table: Table,
}

impl RecordCount for GapReport {
    fn record_count(&self) -> usize {
        self.table.len()
    }
}

/// 比較各 CA 之間缺少的網域
pub struct GapsPipeline<S: Storage> {
    storage: S,
    input: PathBuf,
}

impl<S: Storage> GapsPipeline<S> {
    pub fn new(storage: S, input: PathBuf) -> Self {
        Self { storage, input }
    }
}

pub fn analyze_gaps(entries: &[DomainIdEntry]) -> GapReport {
    let mut domains_by_ca: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for entry in entries {
        let domain = entry.domain.trim();
        let ca = entry.ca.trim();
        if !domain.is_empty() && !ca.is_empty() {
            domains_by_ca
                .entry(ca.to_string())
                .or_default()
                .insert(domain.to_string());
        }
    }

    let mut table = Table::new("CA Gaps", &["ca", "missing_from", "domain"]);
    let cas: Vec<&String> = domains_by_ca.keys().collect();
    let mut lines = vec![
        format!("Found CAs: {}", cas.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")),
        "-".repeat(40),
    ];

    if cas.len() < 2 {
        lines.push("Not enough CAs found to compare.".to_string());
        return GapReport { lines, table };
    }

    for ca_a in &cas {
        for ca_b in &cas {
            if ca_a == ca_b {
                continue;
            }
            let missing: Vec<&String> = domains_by_ca[*ca_a]
                .difference(&domains_by_ca[*ca_b])
                .collect();

            lines.push(String::new());
            if missing.is_empty() {
                lines.push(format!(
                    "All domains in '{}' are also present in '{}'.",
                    ca_a, ca_b
                ));
                continue;
            }

            lines.push(format!(
                "Domains in '{}' but NOT in '{}' ({}):",
                ca_a,
                ca_b,
                missing.len()
            ));
            for domain in missing {
                lines.push(format!("  - {}", domain));
                table.push(vec![
                    ca_a.as_str().into(),
                    ca_b.as_str().into(),
                    domain.as_str().into(),
                ]);
            }
        }
    }

    GapReport { lines, table }
}

#[async_trait]
impl<S: Storage> Pipeline for GapsPipeline<S> {
    type Item = DomainIdEntry;
    type Output = GapReport;

    fn name(&self) -> &str {
        "gaps"
    }

    async fn extract(&self) -> Result<Vec<DomainIdEntry>> {
        let data = tokio::fs::read(&self.input).await?;
        parse_csv(&data)
    }

    async fn transform(&self, data: Vec<DomainIdEntry>) -> Result<GapReport> {
        Ok(analyze_gaps(&data))
    }

    async fn load(&self, report: GapReport) -> Result<String> {
        for line in &report.lines {
            println!("{}", line);
        }
        self.storage
            .write_file(CA_GAPS_CSV, &write_csv(&report.table)?)
            .await?;
        Ok(self.storage.display_path(CA_GAPS_CSV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use tempfile::TempDir;

    fn entry(domain: &str, ca: &str) -> DomainIdEntry {
        DomainIdEntry {
            id: "1".to_string(),
            domain: domain.to_string(),
            ca: ca.to_string(),
        }
    }

    #[test]
    fn test_gaps_in_both_directions() {
        let report = analyze_gaps(&[
            entry("a.com", "Sectigo"),
            entry("b.com", "DigiCert"),
            entry("c.com", "DigiCert"),
            entry("a.com", "DigiCert"),
            entry(" ", "DigiCert"),
        ]);

        assert_eq!(report.lines[0], "Found CAs: DigiCert, Sectigo");
        assert!(report.lines.contains(&"Domains in 'DigiCert' but NOT in 'Sectigo' (2):".to_string()));
        assert!(report
            .lines
            .contains(&"All domains in 'Sectigo' are also present in 'DigiCert'.".to_string()));

        let rows: Vec<Vec<String>> = report
            .table
            .rows
            .iter()
            .map(|r| r.cells.iter().map(|c| c.display()).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["DigiCert", "Sectigo", "b.com"],
                vec!["DigiCert", "Sectigo", "c.com"],
            ]
        );
    }

    #[test]
    fn test_single_ca_is_not_enough() {
        let report = analyze_gaps(&[entry("a.com", "DigiCert")]);
        assert_eq!(report.lines.last().unwrap(), "Not enough CAs found to compare.");
        assert!(report.table.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_writes_gap_csv() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("lookup.csv");
        std::fs::write(&input, "id,domain,CA\n1,a.com,DigiCert\n2,b.com,Sectigo\n").unwrap();

        let storage = LocalStorage::new(dir.path().to_str().unwrap());
        EtlEngine::new(GapsPipeline::new(storage, input)).run().await.unwrap();

        let csv = std::fs::read_to_string(dir.path().join(CA_GAPS_CSV)).unwrap();
        assert_eq!(csv, "ca,missing_from,domain\nDigiCert,Sectigo,a.com\nSectigo,DigiCert,b.com\n");
    }
}
