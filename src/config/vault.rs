use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

pub const VAULT_ENV: &str = "OPS_ETL_VAULT";
const VAULT_FILE_NAME: &str = ".ApiVault";

/// `~/.ApiVault`：多個服務的 API 憑證（JSON）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiVault {
    #[serde(default, rename = "digicert", alias = "Digicert")]
    pub digicert: Option<DigicertSection>,
    #[serde(default, rename = "Sectigo", alias = "sectigo")]
    pub sectigo: Option<SectigoSection>,
    #[serde(default, rename = "DNSResolver")]
    pub dns_resolver: Option<DnsResolverSection>,
    #[serde(default, rename = "AzureSPN")]
    pub azure: Option<AzureSection>,
    #[serde(default)]
    pub finnhub: Option<ApiKeySection>,
    #[serde(default)]
    pub twelvedata: Option<ApiKeySection>,
    #[serde(default)]
    pub smtp: Option<SmtpSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigicertSection {
    #[serde(default)]
    pub api: Option<String>,
    #[serde(
        default,
        rename = "customerID",
        alias = "customer_id",
        alias = "cid",
        deserialize_with = "string_or_number"
    )]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectigoSection {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "customeruri")]
    pub customer_uri: Option<String>,
    #[serde(default, rename = "orgID", deserialize_with = "string_or_number")]
    pub org_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DnsResolverSection {
    #[serde(default)]
    pub dns_resolver: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSection {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeySection {
    #[serde(default, alias = "api_key", alias = "key")]
    pub api: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmtpSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// DigiCert CertCentral 憑證
#[derive(Debug, Clone)]
pub struct DigicertCredentials {
    pub api_key: String,
    pub org_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SectigoCredentials {
    pub login: String,
    pub password: String,
    pub customer_uri: String,
    pub org_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ApiVault {
    /// Default vault location: `$OPS_ETL_VAULT`, else `~/.ApiVault`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(VAULT_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(VAULT_FILE_NAME))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or_else(|| EtlError::ConfigError {
                message: "Cannot determine home directory for ~/.ApiVault".to_string(),
            })?,
        };

        if !path.exists() {
            return Err(EtlError::ConfigError {
                message: format!("API vault file not found at {}", path.display()),
            });
        }

        tracing::debug!("Loading API vault from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| EtlError::ConfigValidationError {
            field: "api_vault".to_string(),
            message: format!("API vault is not valid JSON: {}", e),
        })
    }

    pub fn digicert(&self) -> Result<DigicertCredentials> {
        let section = self
            .digicert
            .as_ref()
            .ok_or_else(|| EtlError::missing_credential("digicert", "section"))?;
        let api_key =
            non_empty(&section.api).ok_or_else(|| EtlError::missing_credential("digicert", "api"))?;
        Ok(DigicertCredentials {
            api_key,
            org_id: section.customer_id.clone(),
        })
    }

    pub fn sectigo(&self) -> Result<SectigoCredentials> {
        let section = self
            .sectigo
            .as_ref()
            .ok_or_else(|| EtlError::missing_credential("Sectigo", "section"))?;
        Ok(SectigoCredentials {
            login: non_empty(&section.login)
                .ok_or_else(|| EtlError::missing_credential("Sectigo", "login"))?,
            password: non_empty(&section.password)
                .ok_or_else(|| EtlError::missing_credential("Sectigo", "password"))?,
            customer_uri: non_empty(&section.customer_uri)
                .ok_or_else(|| EtlError::missing_credential("Sectigo", "customeruri"))?,
            org_id: section.org_id.clone(),
        })
    }

    pub fn dns_resolver(&self) -> Option<String> {
        self.dns_resolver
            .as_ref()
            .and_then(|s| non_empty(&s.dns_resolver))
    }

    /// Vault `AzureSPN` first, then the standard `AZURE_*` environment variables.
    pub fn azure(&self) -> Result<AzureCredentials> {
        let section = self.azure.clone().unwrap_or_default();
        let pick = |value: &Option<String>, env: &str, field: &str| {
            non_empty(value)
                .or_else(|| std::env::var(env).ok().filter(|v| !v.is_empty()))
                .ok_or_else(|| EtlError::missing_credential("AzureSPN", field))
        };

        Ok(AzureCredentials {
            tenant_id: pick(&section.tenant_id, "AZURE_TENANT_ID", "tenantId")?,
            client_id: pick(&section.client_id, "AZURE_CLIENT_ID", "clientId")?,
            client_secret: pick(&section.client_secret, "AZURE_CLIENT_SECRET", "clientSecret")?,
            subscription_id: non_empty(&section.subscription_id)
                .or_else(|| std::env::var("AZURE_SUBSCRIPTION_ID").ok()),
        })
    }

    pub fn finnhub_key(&self) -> Result<String> {
        self.finnhub
            .as_ref()
            .and_then(|s| non_empty(&s.api))
            .or_else(|| std::env::var("FINNHUB_API_KEY").ok())
            .ok_or_else(|| EtlError::missing_credential("finnhub", "api"))
    }

    pub fn twelvedata_key(&self) -> Result<String> {
        self.twelvedata
            .as_ref()
            .and_then(|s| non_empty(&s.api))
            .or_else(|| std::env::var("TWELVE_DATA_API_KEY").ok())
            .ok_or_else(|| EtlError::missing_credential("twelvedata", "api"))
    }

    pub fn smtp(&self) -> Result<SmtpCredentials> {
        let section = self
            .smtp
            .as_ref()
            .ok_or_else(|| EtlError::missing_credential("smtp", "section"))?;
        let host =
            non_empty(&section.host).ok_or_else(|| EtlError::missing_credential("smtp", "host"))?;
        let user = non_empty(&section.user);
        let from = non_empty(&section.from)
            .or_else(|| user.clone())
            .ok_or_else(|| EtlError::missing_credential("smtp", "from"))?;
        let to = non_empty(&section.to).unwrap_or_else(|| from.clone());

        Ok(SmtpCredentials {
            host,
            port: section.port,
            user,
            password: non_empty(&section.password),
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "digicert": {"api": "0123456789abcdef0123456789abcdef", "customerID": 123456},
        "Sectigo": {"login": "ops", "password": "pw", "customeruri": "acme", "orgID": "789"},
        "DNSResolver": {"dns_resolver": "10.0.0.53"},
        "smtp": {"host": "smtp.example.com", "user": "me@example.com", "password": "app"}
    }"#;

    #[test]
    fn test_parse_sections() {
        let vault = ApiVault::from_json_str(SAMPLE).unwrap();

        let dc = vault.digicert().unwrap();
        assert_eq!(dc.api_key.len(), 32);
        assert_eq!(dc.org_id.as_deref(), Some("123456"));

        let sec = vault.sectigo().unwrap();
        assert_eq!(sec.customer_uri, "acme");
        assert_eq!(sec.org_id.as_deref(), Some("789"));

        assert_eq!(vault.dns_resolver().as_deref(), Some("10.0.0.53"));

        let smtp = vault.smtp().unwrap();
        assert_eq!(smtp.from, "me@example.com");
        assert_eq!(smtp.to, "me@example.com");
    }

    #[test]
    fn test_customer_id_aliases() {
        let vault = ApiVault::from_json_str(r#"{"digicert": {"api": "k", "cid": "42"}}"#).unwrap();
        assert_eq!(vault.digicert().unwrap().org_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_sections_are_reported_per_service() {
        let vault = ApiVault::from_json_str(r#"{"Sectigo": {"login": "x"}}"#).unwrap();
        match vault.digicert() {
            Err(EtlError::MissingCredentialError { service, .. }) => assert_eq!(service, "digicert"),
            other => panic!("unexpected: {:?}", other),
        }
        match vault.sectigo() {
            Err(EtlError::MissingCredentialError { field, .. }) => assert_eq!(field, "password"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        assert!(ApiVault::load(Some(file.path())).is_ok());

        let missing = Path::new("/definitely/not/here/.ApiVault");
        assert!(matches!(
            ApiVault::load(Some(missing)),
            Err(EtlError::ConfigError { .. })
        ));
    }
}
