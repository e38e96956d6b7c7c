//! Outbound notifications.
//!
//! The core treats notification delivery as a collaborator behind the
//! [`Notifier`] trait; [`EmailNotifier`] is the shipped implementation with
//! SMTP and file transports. Delivery failure is non-fatal to the operation
//! that triggered it; callers log and continue.

use async_trait::async_trait;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::config::{EmailConfig, EmailTransportConfig};
use crate::errors::Error;

/// Template kinds the core sends.
#[derive(Debug, Clone)]
pub enum Notification {
    PasswordReset {
        display_name: Option<String>,
        reset_link: String,
        /// Configured token lifetime, quoted in the mail body.
        valid_for: chrono::Duration,
    },
    VerificationDecided {
        display_name: Option<String>,
        approved: bool,
        notes: Option<String>,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to_email: &str, notification: Notification) -> Result<(), Error>;
}

pub struct EmailNotifier {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn subject(&self, notification: &Notification) -> String {
        match notification {
            Notification::PasswordReset { .. } => format!("Reset Your {} Password", self.from_name),
            Notification::VerificationDecided { approved: true, .. } => "Your donor verification has been approved".to_string(),
            Notification::VerificationDecided { approved: false, .. } => "An update on your donor verification".to_string(),
        }
    }

    fn body(&self, notification: &Notification) -> String {
        match notification {
            Notification::PasswordReset {
                display_name,
                reset_link,
                valid_for,
            } => {
                let greeting = greeting(display_name.as_deref());
                let validity = format_validity(*valid_for);
                format!(
                    r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #dc3545; text-align: center;">{from_name}</h2>
    <div style="background-color: #f8f9fa; padding: 20px; border-radius: 5px;">
      <h3>{greeting}</h3>
      <p>We received a request to reset your password for your {from_name} account.</p>
      <p style="text-align: center; margin: 30px 0;">
        <a href="{reset_link}" style="background-color: #dc3545; color: white; padding: 12px 25px; text-decoration: none; border-radius: 4px; font-weight: bold;">Reset Password</a>
      </p>
      <p>If you didn't request this password reset, you can ignore this email and your password will remain unchanged.</p>
      <p>This password reset link will expire in {validity}.</p>
      <p>Thank you,<br>The {from_name} Team</p>
    </div>
    <div style="margin-top: 20px; font-size: 12px; color: #6c757d; text-align: center;">
      <p>If you're having trouble clicking the button, copy and paste the URL below into your web browser:</p>
      <p style="word-break: break-all;">{reset_link}</p>
    </div>
  </div>
</body>
</html>"#,
                    from_name = self.from_name,
                )
            }
            Notification::VerificationDecided {
                display_name,
                approved,
                notes,
            } => {
                let greeting = greeting(display_name.as_deref());
                let outcome = if *approved {
                    "Your donor verification has been <strong>approved</strong>. You can now schedule a donation."
                } else {
                    "Your donor verification was <strong>not approved</strong> this time. You are welcome to submit a new application."
                };
                let notes_block = notes
                    .as_deref()
                    .map(|n| format!("<p>Reviewer notes: {n}</p>"))
                    .unwrap_or_default();
                format!(
                    r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #dc3545; text-align: center;">{from_name}</h2>
    <div style="background-color: #f8f9fa; padding: 20px; border-radius: 5px;">
      <h3>{greeting}</h3>
      <p>{outcome}</p>
      {notes_block}
      <p>Thank you,<br>The {from_name} Team</p>
    </div>
  </div>
</body>
</html>"#,
                    from_name = self.from_name,
                )
            }
        }
    }
}

fn greeting(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) => format!("Hello {name},"),
        None => "Hello,".to_string(),
    }
}

/// Render a duration at the coarsest exact unit ("24 hours", "2 days",
/// "90 minutes") so the mail matches the configured expiry.
fn format_validity(valid_for: chrono::Duration) -> String {
    let minutes = valid_for.num_minutes().max(1);
    // A single day reads as "24 hours", the original wording
    let (count, unit) = if minutes % (24 * 60) == 0 && minutes > 24 * 60 {
        (minutes / (24 * 60), "day")
    } else if minutes % 60 == 0 {
        (minutes / 60, "hour")
    } else {
        (minutes, "minute")
    };
    if count == 1 { format!("{count} {unit}") } else { format!("{count} {unit}s") }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, to_email: &str, notification: Notification) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from address: {e}"),
            })?;

        let to = to_email.parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse recipient address: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject(&notification))
            .header(ContentType::TEXT_HTML)
            .body(self.body(&notification))
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("write email to file: {e}"),
                })?;
            }
        }

        Ok(())
    }
}
