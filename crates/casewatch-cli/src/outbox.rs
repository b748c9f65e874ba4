use crate::settings::MailSettings;
use casewatch_pipeline::{DeliveryError, Notifier, OutgoingMessage};
use casewatch_storage::write_atomic;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct SpooledRelay<'a> {
    host: &'a str,
    port: u16,
    use_tls: bool,
    authenticated: bool,
}

#[derive(Debug, Serialize)]
struct SpooledMessage<'a> {
    queued_at: DateTime<Utc>,
    from: &'a str,
    to: &'a [String],
    relay: SpooledRelay<'a>,
    subject: &'a str,
    body_text: &'a str,
    body_markup: &'a str,
    attachment: Option<&'a Path>,
}

/// Spools outgoing messages as JSON files for an external mail relay.
/// Credentials never reach the spool.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    mail: MailSettings,
    outbox_dir: PathBuf,
    sequence: u32,
}

impl OutboxNotifier {
    pub fn new(mail: MailSettings, outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            mail,
            outbox_dir: outbox_dir.into(),
            sequence: 0,
        }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        let (Some(from), Some(host), false) = (
            &self.mail.from,
            &self.mail.smtp_host,
            self.mail.to.is_empty(),
        ) else {
            return Err(DeliveryError::Configuration(format!(
                "missing mail settings: {}",
                self.mail.missing_mandatory().join(", ")
            )));
        };
        if !self.mail.has_credentials() {
            warn!(
                event = "mail_credentials_missing",
                detail = "relay will attempt delivery without authentication"
            );
        }

        let attachment = match message.attachment.as_deref() {
            Some(path) if path.is_file() => Some(path),
            Some(path) => {
                warn!(
                    event = "mail_attachment_missing",
                    path = %path.display()
                );
                None
            }
            None => None,
        };

        let queued_at = Utc::now();
        let spooled = SpooledMessage {
            queued_at,
            from,
            to: &self.mail.to,
            relay: SpooledRelay {
                host,
                port: self.mail.smtp_port,
                use_tls: self.mail.use_tls,
                authenticated: self.mail.has_credentials(),
            },
            subject: &message.subject,
            body_text: &message.body_text,
            body_markup: &message.body_markup,
            attachment,
        };
        let payload = serde_json::to_vec_pretty(&spooled)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        self.sequence += 1;
        let path = self.outbox_dir.join(format!(
            "{}-{:03}.json",
            queued_at.format("%Y%m%dT%H%M%S%.3fZ"),
            self.sequence
        ));
        write_atomic(&path, &payload).map_err(|err| DeliveryError::Transport(err.to_string()))?;

        info!(
            event = "mail_spooled",
            path = %path.display(),
            recipients = self.mail.to.len()
        );
        Ok(())
    }
}
