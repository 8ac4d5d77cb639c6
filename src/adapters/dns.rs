use crate::adapters::http::{build_client, read_json};
use crate::domain::model::DnsAnswer;
use crate::domain::ports::NameserverLookup;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

const DIG_TIMEOUT: Duration = Duration::from_secs(5);

/// DNS RR type number used in DoH JSON answers.
fn type_code(record_type: &str) -> Option<u64> {
    match record_type.to_ascii_uppercase().as_str() {
        "A" => Some(1),
        "NS" => Some(2),
        "CNAME" => Some(5),
        "SOA" => Some(6),
        "PTR" => Some(12),
        "MX" => Some(15),
        "TXT" => Some(16),
        "AAAA" => Some(28),
        "SRV" => Some(33),
        _ => None,
    }
}

fn clean_record(record_type: &str, data: &str) -> String {
    let data = data.trim();
    if record_type.eq_ignore_ascii_case("TXT") {
        return data.trim_matches('"').to_string();
    }
    data.trim_end_matches('.').to_string()
}

/// DNS-over-HTTPS JSON API (`/resolve?name=&type=`)
pub struct DohLookup {
    client: Client,
    base_url: String,
}

impl DohLookup {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NameserverLookup for DohLookup {
    async fn lookup(&self, domain: &str, record_type: &str) -> Result<DnsAnswer> {
        let url = format!("{}/resolve", self.base_url);
        tracing::debug!("🔎 DoH {} {}", record_type, domain);

        let response = self
            .client
            .get(url)
            .query(&[("name", domain), ("type", record_type)])
            .header("accept", "application/dns-json")
            .send()
            .await?;
        let body = read_json("DNS", "DoH answer", response).await?;

        match body.get("Status").and_then(Value::as_u64) {
            Some(0) | None => {}
            Some(3) => return Ok(DnsAnswer::NxDomain),
            Some(code) => {
                return Err(EtlError::processing(format!(
                    "DNS query {} {} failed with rcode {}",
                    record_type, domain, code
                )))
            }
        }

        let wanted = type_code(record_type);
        let records: Vec<String> = body
            .get("Answer")
            .and_then(Value::as_array)
            .map(|answers| {
                answers
                    .iter()
                    .filter(|a| match wanted {
                        Some(code) => a.get("type").and_then(Value::as_u64) == Some(code),
                        None => true,
                    })
                    .filter_map(|a| a.get("data").and_then(Value::as_str))
                    .map(|data| clean_record(record_type, data))
                    .collect()
            })
            .unwrap_or_default();

        if records.is_empty() {
            Ok(DnsAnswer::NoAnswer)
        } else {
            Ok(DnsAnswer::Records(records))
        }
    }
}

/// 呼叫 `dig @resolver TYPE domain +short`
pub struct DigLookup {
    dig: String,
    resolver: String,
}

impl DigLookup {
    pub fn new(resolver: &str) -> Self {
        Self {
            dig: "dig".to_string(),
            resolver: resolver.to_string(),
        }
    }

    pub fn with_binary(mut self, dig: &str) -> Self {
        self.dig = dig.to_string();
        self
    }
}

/// `+short` output lines; a CNAME chain in front of A/AAAA answers is dropped.
fn parse_dig_short(record_type: &str, stdout: &str) -> Result<Vec<String>> {
    let mut records = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with(";;") {
            return Err(EtlError::ToolError {
                tool: "dig".to_string(),
                message: line.trim_start_matches(';').trim().to_string(),
            });
        }
        let keep = match record_type.to_ascii_uppercase().as_str() {
            "A" => line.parse::<Ipv4Addr>().is_ok(),
            "AAAA" => line.parse::<Ipv6Addr>().is_ok(),
            _ => true,
        };
        if keep {
            records.push(clean_record(record_type, line));
        }
    }
    Ok(records)
}

#[async_trait]
impl NameserverLookup for DigLookup {
    async fn lookup(&self, domain: &str, record_type: &str) -> Result<DnsAnswer> {
        let resolver = format!("@{}", self.resolver);
        tracing::debug!("🔎 {} {} {} {} +short", self.dig, resolver, record_type, domain);

        let output = tokio::time::timeout(
            DIG_TIMEOUT,
            tokio::process::Command::new(&self.dig)
                .args([resolver.as_str(), record_type, domain, "+short"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| EtlError::ToolError {
            tool: "dig".to_string(),
            message: format!("timed out after {}s for {}", DIG_TIMEOUT.as_secs(), domain),
        })?
        .map_err(|e| EtlError::ToolError {
            tool: "dig".to_string(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(EtlError::ToolError {
                tool: "dig".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let records = parse_dig_short(record_type, &String::from_utf8_lossy(&output.stdout))?;
        if records.is_empty() {
            Ok(DnsAnswer::NoAnswer)
        } else {
            Ok(DnsAnswer::Records(records))
        }
    }
}

/// Vault 有 `DNSResolver.dns_resolver` 時用 dig，否則用 DoH
pub fn resolver_for(dns_resolver: Option<&str>, doh_base_url: &str) -> Result<Arc<dyn NameserverLookup>> {
    match dns_resolver {
        Some(resolver) => {
            tracing::info!("Using dig with resolver {}", resolver);
            Ok(Arc::new(DigLookup::new(resolver)))
        }
        None => Ok(Arc::new(DohLookup::new(doh_base_url)?)),
    }
}
