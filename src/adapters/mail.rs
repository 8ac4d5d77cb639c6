use crate::config::toml_config::SmtpTls;
use crate::config::vault::{ApiVault, SmtpCredentials};
use crate::utils::error::{EtlError, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const DRY_RUN_ADDRESS: &str = "ops-etl@localhost";
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// File attached to a notification.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub enum EmailDelivery {
    Smtp {
        credentials: SmtpCredentials,
        tls: SmtpTls,
    },
    /// 只記錄、不寄出
    Dry,
}

/// Plain-text notification mailer.
pub struct Mailer {
    delivery: EmailDelivery,
    from: Mailbox,
    to: Mailbox,
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox> {
    address.parse().map_err(|e| EtlError::EmailError {
        message: format!("invalid {} address '{}': {}", field, address, e),
    })
}

impl Mailer {
    pub fn smtp(credentials: SmtpCredentials, tls: SmtpTls) -> Result<Self> {
        let from = parse_mailbox("from", &credentials.from)?;
        let to = parse_mailbox("to", &credentials.to)?;
        Ok(Self {
            delivery: EmailDelivery::Smtp { credentials, tls },
            from,
            to,
        })
    }

    pub fn dry(from: &str, to: &str) -> Result<Self> {
        Ok(Self {
            delivery: EmailDelivery::Dry,
            from: parse_mailbox("from", from)?,
            to: parse_mailbox("to", to)?,
        })
    }

    /// Dry-run still uses the vault addresses when they exist.
    pub fn from_vault(vault: &ApiVault, tls: SmtpTls, dry_run: bool) -> Result<Self> {
        if dry_run {
            return match vault.smtp() {
                Ok(creds) => Self::dry(&creds.from, &creds.to),
                Err(_) => Self::dry(DRY_RUN_ADDRESS, DRY_RUN_ADDRESS),
            };
        }
        Self::smtp(vault.smtp()?, tls)
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.delivery, EmailDelivery::Dry)
    }

    pub fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EtlError::EmailError {
                message: e.to_string(),
            })
    }

    /// Plain-text body with the attachment as a second MIME part.
    pub fn build_message_with_attachment(
        &self,
        subject: &str,
        body: &str,
        attachment: &MailAttachment,
    ) -> Result<Message> {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| EtlError::EmailError {
            message: format!("invalid content type '{}': {}", attachment.content_type, e),
        })?;
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body.to_string()))
                    .singlepart(Attachment::new(attachment.filename.clone()).body(attachment.data.clone(), content_type)),
            )
            .map_err(|e| EtlError::EmailError {
                message: e.to_string(),
            })
    }

    pub async fn send_text(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;
        if self.is_dry_run() {
            tracing::info!("✉️ [dry-run] To: {} Subject: {}", self.to, subject);
            println!("To: {}\nSubject: {}\n\n{}", self.to, subject, body);
            return Ok(());
        }
        self.deliver(message, subject).await
    }

    pub async fn send_with_attachment(&self, subject: &str, body: &str, attachment: &MailAttachment) -> Result<()> {
        let message = self.build_message_with_attachment(subject, body, attachment)?;
        if self.is_dry_run() {
            tracing::info!(
                "✉️ [dry-run] To: {} Subject: {} Attachment: {} ({} bytes)",
                self.to,
                subject,
                attachment.filename,
                attachment.data.len()
            );
            println!(
                "To: {}\nSubject: {}\nAttachment: {}\n\n{}",
                self.to, subject, attachment.filename, body
            );
            return Ok(());
        }
        self.deliver(message, subject).await
    }

    async fn deliver(&self, message: Message, subject: &str) -> Result<()> {
        let (credentials, tls) = match &self.delivery {
            EmailDelivery::Dry => return Ok(()),
            EmailDelivery::Smtp { credentials, tls } => (credentials, *tls),
        };

        let smtp_error = |e: lettre::transport::smtp::Error| EtlError::EmailError {
            message: e.to_string(),
        };
        let mut builder = match tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&credentials.host),
            SmtpTls::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&credentials.host)
            }
        }
        .map_err(smtp_error)?;

        if let Some(port) = credentials.port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(pass)) = (&credentials.user, &credentials.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        builder.build().send(message).await.map_err(smtp_error)?;
        tracing::info!("✉️ Email sent to {}: {}", self.to, subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_does_not_need_smtp_section() {
        let vault = ApiVault::from_json_str("{}").unwrap();
        let mailer = Mailer::from_vault(&vault, SmtpTls::Implicit, true).unwrap();
        assert!(mailer.is_dry_run());
        mailer.send_text("Subject", "body").await.unwrap();
    }

    #[test]
    fn test_real_delivery_requires_smtp_section() {
        let vault = ApiVault::from_json_str("{}").unwrap();
        assert!(matches!(
            Mailer::from_vault(&vault, SmtpTls::Implicit, false),
            Err(EtlError::MissingCredentialError { .. })
        ));
    }

    #[test]
    fn test_message_headers() {
        let mailer = Mailer::dry("ops@example.com", "team@example.com").unwrap();
        let message = mailer
            .build_message("Premarket Futures Update - 2024-05-01", "line")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Premarket Futures Update - 2024-05-01"));
        assert!(raw.contains("To: team@example.com"));
    }

    #[test]
    fn test_attachment_is_second_part() {
        let mailer = Mailer::dry("ops@example.com", "team@example.com").unwrap();
        let attachment = MailAttachment {
            filename: "stock_summary.xlsx".to_string(),
            content_type: XLSX_CONTENT_TYPE.to_string(),
            data: b"PK\x03\x04".to_vec(),
        };
        let message = mailer
            .build_message_with_attachment("Daily Stock Summary", "news", &attachment)
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("filename=\"stock_summary.xlsx\""));
        assert!(raw.contains(XLSX_CONTENT_TYPE));
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(
            Mailer::dry("not an address", "team@example.com"),
            Err(EtlError::EmailError { .. })
        ));
    }
}
