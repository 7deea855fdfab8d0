//! Notification email rendering and delivery.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use quill_common::{AppError, AppResult, config::EmailConfig};
use quill_db::entities::notification::NotificationType;
use tracing::info;

/// Languages notification emails are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// Parse a user's locale tag. Unknown tags fall back to English.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let lang = tag.split(['-', '_']).next().unwrap_or_default();
        if lang.eq_ignore_ascii_case("es") {
            Self::Es
        } else {
            Self::En
        }
    }
}

/// Email message to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient email address
    pub to: String,
    /// Recipient display name
    pub to_name: Option<String>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text_body: String,
    /// HTML body
    pub html_body: String,
}

/// A notification that should also go out by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub locale: Locale,
    pub notification_type: NotificationType,
    pub sender_name: String,
    pub message: String,
    pub related_post_id: Option<String>,
}

/// Delivers rendered messages.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> AppResult<()>;
}

/// Sends mail through an SMTP relay.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build a STARTTLS transport from configuration.
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::Config(format!("Invalid SMTP host: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("Invalid from address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: EmailMessage) -> AppResult<()> {
        let to = match &message.to_name {
            Some(name) => format!("{name} <{}>", message.to),
            None => message.to.clone(),
        }
        .parse::<Mailbox>()
        .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .multipart(MultiPart::alternative_plain_html(
                message.text_body,
                message.html_body,
            ))
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::ExternalService(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> AppResult<()> {
        info!(to = %message.to, subject = %message.subject, "Email delivery disabled, not sending");
        Ok(())
    }
}

/// Email service.
#[derive(Clone)]
pub struct EmailService {
    sender: Arc<dyn EmailSender>,
    site_name: String,
    site_url: String,
}

impl EmailService {
    /// Create a new email service.
    pub fn new(
        sender: Arc<dyn EmailSender>,
        site_name: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            site_name: site_name.into(),
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Render and send a notification email.
    pub async fn send_notification(&self, email: &NotificationEmail) -> AppResult<()> {
        self.sender.send(self.render(email)).await
    }

    /// Render a notification email in the recipient's language.
    #[must_use]
    pub fn render(&self, email: &NotificationEmail) -> EmailMessage {
        let sender = &email.sender_name;
        let subject = match (email.locale, email.notification_type) {
            (Locale::En, NotificationType::Mention) => format!("{sender} mentioned you"),
            (Locale::En, NotificationType::Comment) => {
                format!("{sender} commented on your post")
            }
            (Locale::En, NotificationType::Reply) => format!("{sender} replied to your comment"),
            (Locale::En, NotificationType::Bookmark) => format!("{sender} bookmarked your post"),
            (Locale::En, NotificationType::Like) => format!("{sender} liked your post"),
            (Locale::En, NotificationType::Follow) => format!("{sender} started following you"),
            (Locale::Es, NotificationType::Mention) => format!("{sender} te mencionó"),
            (Locale::Es, NotificationType::Comment) => {
                format!("{sender} comentó tu publicación")
            }
            (Locale::Es, NotificationType::Reply) => format!("{sender} respondió a tu comentario"),
            (Locale::Es, NotificationType::Bookmark) => {
                format!("{sender} guardó tu publicación")
            }
            (Locale::Es, NotificationType::Like) => format!("A {sender} le gustó tu publicación"),
            (Locale::Es, NotificationType::Follow) => format!("{sender} comenzó a seguirte"),
        };

        let (link_label, footer) = match email.locale {
            Locale::En => (
                "View on",
                "You can change which emails you receive in your notification settings.",
            ),
            Locale::Es => (
                "Ver en",
                "Puedes elegir qué correos recibes en tu configuración de notificaciones.",
            ),
        };

        let link = match &email.related_post_id {
            Some(post_id) => format!("{}/posts/{post_id}", self.site_url),
            None => self.site_url.clone(),
        };

        let text_body = format!(
            "{}\n\n{link_label} {}: {link}\n\n{footer}",
            email.message, self.site_name
        );

        let html_body = format!(
            "<!DOCTYPE html>\n<html>\n<body>\n<p>{}</p>\n<p><a href=\"{}\">{link_label} {}</a></p>\n<hr>\n<p><small>{footer}</small></p>\n</body>\n</html>",
            escape_html(&email.message),
            escape_html(&link),
            escape_html(&self.site_name),
        );

        EmailMessage {
            to: email.to.clone(),
            to_name: email.to_name.clone(),
            subject,
            text_body,
            html_body,
        }
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> EmailService {
        EmailService::new(Arc::new(LogEmailSender), "Quill", "https://blog.example/")
    }

    fn email(locale: Locale, notification_type: NotificationType) -> NotificationEmail {
        NotificationEmail {
            to: "bob@example.com".to_string(),
            to_name: Some("Bob".to_string()),
            locale,
            notification_type,
            sender_name: "Alice".to_string(),
            message: "Alice replied: <b>hi</b>".to_string(),
            related_post_id: Some("post1".to_string()),
        }
    }

    #[test]
    fn test_locale_from_tag() {
        assert_eq!(Locale::from_tag("es"), Locale::Es);
        assert_eq!(Locale::from_tag("es-MX"), Locale::Es);
        assert_eq!(Locale::from_tag("en"), Locale::En);
        assert_eq!(Locale::from_tag("fr"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn test_render_english() {
        let message = service().render(&email(Locale::En, NotificationType::Reply));

        assert_eq!(message.subject, "Alice replied to your comment");
        assert!(message.text_body.contains("https://blog.example/posts/post1"));
        assert!(message.text_body.contains("notification settings"));
    }

    #[test]
    fn test_render_spanish() {
        let message = service().render(&email(Locale::Es, NotificationType::Like));

        assert_eq!(message.subject, "A Alice le gustó tu publicación");
        assert!(message.text_body.starts_with("Alice replied"));
        assert!(message.text_body.contains("Ver en Quill"));
    }

    #[test]
    fn test_html_body_escapes_message() {
        let message = service().render(&email(Locale::En, NotificationType::Mention));

        assert!(message.html_body.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(!message.html_body.contains("<b>hi</b>"));
    }

    #[tokio::test]
    async fn test_log_sender_succeeds() {
        let result = service()
            .send_notification(&email(Locale::En, NotificationType::Follow))
            .await;

        assert!(result.is_ok());
    }
}
