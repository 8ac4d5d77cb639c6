use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("{service} API returned HTTP {status}: {body}")]
    ApiStatusError {
        service: String,
        status: u16,
        body: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Missing credential '{field}' for {service} in API vault")]
    MissingCredentialError { service: String, field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("{tool} failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("Email error: {message}")]
    EmailError { message: String },

    #[error("{job} failed: {message}")]
    JobError { job: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Io,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Low 不中止程序
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::ApiStatusError { .. } => ErrorCategory::Network,
            EtlError::CsvError(_)
            | EtlError::XlsxError(_)
            | EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. }
            | EtlError::JobError { .. } => ErrorCategory::Data,
            EtlError::IoError(_) => ErrorCategory::Io,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::MissingCredentialError { .. } => ErrorCategory::Configuration,
            EtlError::ToolError { .. } | EtlError::EmailError { .. } => ErrorCategory::External,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 網路問題通常重跑即可
            EtlError::ApiError(_) | EtlError::ApiStatusError { .. } => ErrorSeverity::Medium,
            EtlError::EmailError { .. } | EtlError::JobError { .. } => ErrorSeverity::Medium,
            EtlError::ValidationError { .. } | EtlError::ProcessingError { .. } => {
                ErrorSeverity::High
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => ErrorSeverity::High,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::MissingCredentialError { .. } => ErrorSeverity::High,
            EtlError::ToolError { .. } => ErrorSeverity::High,
            EtlError::IoError(_) | EtlError::XlsxError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::ApiError(_) => {
                "Check network connectivity and the endpoint URLs in ops-etl.toml, then retry"
                    .to_string()
            }
            EtlError::ApiStatusError { service, status, .. } => match status {
                401 | 403 => format!("Verify the {} credentials stored in the API vault", service),
                404 => format!("The {} resource does not exist; refresh the local CSV data", service),
                429 => "Rate limited; wait a minute and retry".to_string(),
                _ => format!("Retry later; if it persists check the {} service status", service),
            },
            EtlError::CsvError(_) => {
                "Check that the input CSV has the expected header row and encoding".to_string()
            }
            EtlError::XlsxError(_) => "Make sure the report file is not open in Excel".to_string(),
            EtlError::IoError(_) => {
                "Check that the path exists and that you have read/write permission".to_string()
            }
            EtlError::SerializationError(_) => {
                "The file or API response is not valid JSON; inspect it with --verbose".to_string()
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. } => {
                "Fix the value in ops-etl.toml or on the command line".to_string()
            }
            EtlError::MissingConfigError { field } => {
                format!("Provide '{}' in ops-etl.toml or on the command line", field)
            }
            EtlError::MissingCredentialError { service, field } => format!(
                "Add '{}' to the '{}' section of ~/.ApiVault (or pass --vault)",
                field, service
            ),
            EtlError::ProcessingError { .. } => {
                "Run again with --verbose to see the raw API responses".to_string()
            }
            EtlError::ValidationError { .. } => "Correct the input and run again".to_string(),
            EtlError::ToolError { tool, .. } => {
                format!("Make sure '{}' is installed and on PATH", tool)
            }
            EtlError::JobError { job, .. } => {
                format!("Re-run the '{}' step on its own with --verbose", job)
            }
            EtlError::EmailError { .. } => {
                "Check the smtp section of the API vault (host, user, app password)".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Remote API call failed: {}", self),
            ErrorCategory::Data => format!("Could not process data: {}", self),
            ErrorCategory::Io => format!("File system error: {}", self),
            ErrorCategory::External => format!("External tool or service failed: {}", self),
        }
    }

    /// 與 main 對應的退出碼
    pub fn exit_code(&self) -> i32 {
        self.severity().exit_code()
    }

    pub fn processing(message: impl Into<String>) -> Self {
        EtlError::ProcessingError {
            message: message.into(),
        }
    }

    pub fn missing_credential(service: &str, field: &str) -> Self {
        EtlError::MissingCredentialError {
            service: service.to_string(),
            field: field.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
