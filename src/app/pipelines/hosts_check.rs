use super::file_timestamp;
use crate::core::report::write_csv;
use crate::domain::model::{DnsAnswer, Highlight, Table};
use crate::domain::ports::{NameserverLookup, Pipeline, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub const HEADERS: [&str; 8] = [
    "Hostname",
    "Expected IP",
    "Status",
    "Resolved IPs",
    "Short Name",
    "Suffix",
    "Short Name Resolved IPs",
    "Short Name Match",
];

pub fn report_file(timestamp: &str) -> String {
    format!("dns_validation_{}.csv", timestamp)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub ip: IpAddr,
    pub hostname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Match,
    Mismatch,
    Unresolved,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Match => "MATCH",
            HostStatus::Mismatch => "MISMATCH",
            HostStatus::Unresolved => "UNRESOLVED",
        }
    }

    fn of(expected: IpAddr, resolved: &[IpAddr]) -> Self {
        if resolved.contains(&expected) {
            HostStatus::Match
        } else if resolved.is_empty() {
            HostStatus::Unresolved
        } else {
            HostStatus::Mismatch
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShortNameCheck {
    pub suffix: String,
    pub full_name: String,
    pub resolved: Vec<IpAddr>,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostCheck {
    pub entry: HostEntry,
    pub resolved: Vec<IpAddr>,
    pub status: HostStatus,
    pub short_names: Vec<ShortNameCheck>,
}

/// hosts 檔：`IP 名稱...`，`#` 之後為註解，IP 不合法的行略過
pub fn parse_hosts(content: &str) -> Vec<HostEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut parts = line.split_whitespace();
        let Some(ip) = parts.next().and_then(|ip| ip.parse::<IpAddr>().ok()) else {
            continue;
        };
        entries.extend(parts.map(|hostname| HostEntry {
            ip,
            hostname: hostname.to_string(),
        }));
    }
    entries
}

/// One suffix per line; blank lines and `#` comments are skipped.
pub fn parse_suffixes(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_matches('.').to_string())
        .collect()
}

fn join_ips(ips: &[IpAddr]) -> String {
    ips.iter().map(IpAddr::to_string).collect::<Vec<_>>().join("; ")
}

pub fn checks_table(checks: &[HostCheck]) -> Table {
    let mut table = Table::new("DNS Validation", &HEADERS);
    for check in checks {
        let highlight = match check.status {
            HostStatus::Match => None,
            HostStatus::Mismatch => Some(Highlight::Red),
            HostStatus::Unresolved => Some(Highlight::Yellow),
        };
        table.push_row(
            vec![
                check.entry.hostname.clone().into(),
                check.entry.ip.to_string().into(),
                check.status.as_str().into(),
                join_ips(&check.resolved).into(),
                "".into(),
                "".into(),
                "".into(),
                "".into(),
            ],
            highlight,
        );
        for short in &check.short_names {
            table.push(vec![
                "".into(),
                "".into(),
                "".into(),
                "".into(),
                short.full_name.clone().into(),
                short.suffix.clone().into(),
                join_ips(&short.resolved).into(),
                if short.matches { "Yes" } else { "No" }.into(),
            ]);
        }
    }
    table
}

/// A + AAAA；查詢失敗視為未解析
pub async fn resolve_host(dns: &dyn NameserverLookup, hostname: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for record_type in ["A", "AAAA"] {
        match dns.lookup(hostname, record_type).await {
            Ok(DnsAnswer::Records(records)) => {
                ips.extend(records.iter().filter_map(|r| r.parse::<IpAddr>().ok()));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ {} lookup failed for {}: {}", record_type, hostname, e),
        }
    }
    ips
}

/// hosts 檔正向解析檢查，並以搜尋後綴測試短名稱
pub struct HostsCheckPipeline<S: Storage> {
    storage: S,
    report_file: String,
    hosts_file: PathBuf,
    suffixes: Vec<String>,
    dns: Arc<dyn NameserverLookup>,
    concurrency: usize,
}

impl<S: Storage> HostsCheckPipeline<S> {
    pub fn new(
        storage: S,
        report_file: Option<String>,
        hosts_file: PathBuf,
        suffixes: Vec<String>,
        dns: Arc<dyn NameserverLookup>,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            report_file: report_file.unwrap_or_else(report_file_default),
            hosts_file,
            suffixes,
            dns,
            concurrency: concurrency.max(1),
        }
    }

    async fn check(&self, entry: HostEntry) -> HostCheck {
        let dns = self.dns.as_ref();
        let resolved = resolve_host(dns, &entry.hostname).await;
        let status = HostStatus::of(entry.ip, &resolved);

        let short = entry.hostname.split('.').next().unwrap_or_default().to_string();
        let mut short_names = Vec::with_capacity(self.suffixes.len());
        for suffix in &self.suffixes {
            let full_name = format!("{}.{}", short, suffix);
            let resolved = resolve_host(dns, &full_name).await;
            short_names.push(ShortNameCheck {
                suffix: suffix.clone(),
                matches: resolved.contains(&entry.ip),
                full_name,
                resolved,
            });
        }

        tracing::debug!("{} {} → {}", entry.hostname, entry.ip, status.as_str());
        HostCheck {
            entry,
            resolved,
            status,
            short_names,
        }
    }
}

fn report_file_default() -> String {
    report_file(&file_timestamp())
}

#[async_trait]
impl<S: Storage> Pipeline for HostsCheckPipeline<S> {
    type Item = HostEntry;
    type Output = Table;

    fn name(&self) -> &str {
        "hosts-check"
    }

    async fn extract(&self) -> Result<Vec<HostEntry>> {
        let content = tokio::fs::read_to_string(&self.hosts_file).await?;
        let entries = parse_hosts(&content);
        tracing::info!(
            "📋 {} host entries in {}, {} search suffixes",
            entries.len(),
            self.hosts_file.display(),
            self.suffixes.len()
        );
        Ok(entries)
    }

    async fn transform(&self, data: Vec<HostEntry>) -> Result<Table> {
        let checks: Vec<HostCheck> = stream::iter(data)
            .map(|entry| async move { self.check(entry).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mismatched = checks.iter().filter(|c| c.status != HostStatus::Match).count();
        if mismatched > 0 {
            tracing::warn!("⚠️ {} of {} entries do not match DNS", mismatched, checks.len());
        }
        Ok(checks_table(&checks))
    }

    async fn load(&self, table: Table) -> Result<String> {
        self.storage
            .write_file(&self.report_file, &write_csv(&table)?)
            .await?;
        let location = self.storage.display_path(&self.report_file);
        println!("Results saved to: {}", location);
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::core::etl::EtlEngine;
    use crate::utils::error::EtlError;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// 固定答案的解析器
    struct StaticDns {
        answers: HashMap<(String, String), Vec<String>>,
    }

    impl StaticDns {
        fn new(records: &[(&str, &str, &str)]) -> Self {
            let mut answers: HashMap<(String, String), Vec<String>> = HashMap::new();
            for (name, record_type, value) in records {
                answers
                    .entry((name.to_string(), record_type.to_string()))
                    .or_default()
                    .push(value.to_string());
            }
            Self { answers }
        }
    }

    #[async_trait]
    impl NameserverLookup for StaticDns {
        async fn lookup(&self, domain: &str, record_type: &str) -> Result<DnsAnswer> {
            if domain.starts_with("broken") {
                return Err(EtlError::processing("SERVFAIL"));
            }
            Ok(match self.answers.get(&(domain.to_string(), record_type.to_string())) {
                Some(records) => DnsAnswer::Records(records.clone()),
                None => DnsAnswer::NxDomain,
            })
        }
    }

    #[test]
    fn test_parse_hosts_skips_comments_and_bad_ips() {
        let content = "\
# comment line
127.0.0.1   localhost
10.0.0.5    app.corp.example app   # trailing comment words
not-an-ip   ignored.example
::1         ip6-localhost
10.0.0.9
";
        let entries = parse_hosts(content);
        let names: Vec<&str> = entries.iter().map(|e| e.hostname.as_str()).collect();
        assert_eq!(names, vec!["localhost", "app.corp.example", "app", "ip6-localhost"]);
        assert_eq!(entries[1].ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert!(entries[3].ip.is_ipv6());
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(
            parse_suffixes("corp.example\n\n# old\n.lab.example.\n"),
            vec!["corp.example", "lab.example"]
        );
    }

    #[tokio::test]
    async fn test_status_and_short_name_rows() {
        let dns = StaticDns::new(&[
            ("app.corp.example", "A", "10.0.0.5"),
            ("app.lab.example", "A", "10.9.9.9"),
            ("db.corp.example", "A", "10.0.0.7"),
            ("v6.corp.example", "AAAA", "2001:db8::0001"),
        ]);

        let dir = TempDir::new().unwrap();
        let hosts = dir.path().join("hosts");
        std::fs::write(
            &hosts,
            "10.0.0.5 app.corp.example\n10.0.0.8 db.corp.example\n10.0.0.1 gone.corp.example\n\
             2001:db8::1 v6.corp.example\n10.0.0.2 broken.corp.example\n",
        )
        .unwrap();

        let pipeline = HostsCheckPipeline::new(
            LocalStorage::new(dir.path().to_str().unwrap()),
            Some("hosts.csv".to_string()),
            hosts,
            vec!["corp.example".into(), "lab.example".into()],
            Arc::new(dns),
            3,
        );
        let location = EtlEngine::new(pipeline).run().await.unwrap();
        let csv = std::fs::read_to_string(location).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], HEADERS.join(","));
        assert_eq!(lines[1], "app.corp.example,10.0.0.5,MATCH,10.0.0.5,,,,");
        assert_eq!(lines[2], ",,,,app.corp.example,corp.example,10.0.0.5,Yes");
        assert_eq!(lines[3], ",,,,app.lab.example,lab.example,10.9.9.9,No");
        assert_eq!(lines[4], "db.corp.example,10.0.0.8,MISMATCH,10.0.0.7,,,,");
        assert_eq!(lines[7], "gone.corp.example,10.0.0.1,UNRESOLVED,,,,,");
        // 2001:db8::0001 與 2001:db8::1 是同一個位址
        assert_eq!(lines[10], "v6.corp.example,2001:db8::1,MATCH,2001:db8::1,,,,");
        assert_eq!(lines[13], "broken.corp.example,10.0.0.2,UNRESOLVED,,,,,");
        assert_eq!(lines.len(), 16);
    }
}
