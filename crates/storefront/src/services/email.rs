//! Email service for one-time codes and account notifications.
//!
//! Uses SMTP via lettre for delivery with Askama plain-text templates.
//! Handlers depend on the [`Mailer`] trait so tests can swap the transport.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use modernshop_core::{Email, OrderId};

use super::auth::otp::OTP_TTL;
use crate::config::EmailConfig;

#[derive(Template)]
#[template(path = "email/otp_code.txt")]
struct OtpCodeText<'a> {
    username: &'a str,
    intro: &'a str,
    code: &'a str,
    ttl_minutes: i64,
}

#[derive(Template)]
#[template(path = "email/credentials.txt")]
struct CredentialsText<'a> {
    username: &'a str,
    password: &'a str,
    login_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    username: &'a str,
    product_name: &'a str,
    order_id: OrderId,
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeText<'a> {
    username: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The transport refused to take the message.
    #[error("mail transport unavailable: {0}")]
    Unavailable(String),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Email,
    pub subject: String,
    pub body: String,
}

/// Delivers rendered messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Why a one-time code is being sent; selects the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Signup,
    Login,
    GoogleSignIn,
    Passwordless,
}

impl OtpPurpose {
    const fn subject(self) -> &'static str {
        match self {
            Self::Signup => "Verify your ModernShop account",
            Self::Login => "Your ModernShop login code",
            Self::GoogleSignIn => "Verify your Google Login",
            Self::Passwordless => "Your ModernShop sign-in code",
        }
    }

    const fn intro(self) -> &'static str {
        match self {
            Self::Signup => "Thanks for signing up. Use this code to verify your email address:",
            Self::Login => {
                "It has been a while since your last login. Use this code to finish signing in:"
            }
            Self::GoogleSignIn => "Please use the following code to verify your identity:",
            Self::Passwordless => "Use this code to sign in without a password:",
        }
    }
}

/// Render a one-time code email.
///
/// # Errors
///
/// Returns `MailError::Template` if rendering fails.
pub fn otp_email(
    to: &Email,
    username: &str,
    code: &str,
    purpose: OtpPurpose,
) -> Result<OutgoingEmail, MailError> {
    let body = OtpCodeText {
        username,
        intro: purpose.intro(),
        code,
        ttl_minutes: OTP_TTL.num_minutes(),
    }
    .render()?;
    Ok(OutgoingEmail {
        to: to.clone(),
        subject: purpose.subject().to_owned(),
        body,
    })
}

/// Render the credentials email for a provisioned account.
///
/// # Errors
///
/// Returns `MailError::Template` if rendering fails.
pub fn credentials_email(
    to: &Email,
    username: &str,
    password: &str,
    login_url: &str,
) -> Result<OutgoingEmail, MailError> {
    let body = CredentialsText {
        username,
        password,
        login_url,
    }
    .render()?;
    Ok(OutgoingEmail {
        to: to.clone(),
        subject: "Your ModernShop account".to_owned(),
        body,
    })
}

/// Render an order confirmation.
///
/// # Errors
///
/// Returns `MailError::Template` if rendering fails.
pub fn order_confirmation_email(
    to: &Email,
    username: &str,
    product_name: &str,
    order_id: OrderId,
) -> Result<OutgoingEmail, MailError> {
    let body = OrderConfirmationText {
        username,
        product_name,
        order_id,
    }
    .render()?;
    Ok(OutgoingEmail {
        to: to.clone(),
        subject: format!("Order #{order_id} confirmed"),
        body,
    })
}

/// Render the welcome email sent after a Google sign-up completes.
///
/// # Errors
///
/// Returns `MailError::Template` if rendering fails.
pub fn welcome_email(to: &Email, username: &str) -> Result<OutgoingEmail, MailError> {
    let body = WelcomeText { username }.render()?;
    Ok(OutgoingEmail {
        to: to.clone(),
        subject: "Welcome to ModernShop!".to_owned(),
        body,
    })
}

/// SMTP mailer.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .as_str()
                .parse()
                .map_err(|_| MailError::InvalidAddress(email.to.to_string()))?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;

        self.transport.send(message).await?;

        tracing::info!(subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use testing::{FailingMailer, RecordingMailer};

#[cfg(any(test, feature = "test-support"))]
mod testing {
    use std::sync::{Mutex, PoisonError};

    use async_trait::async_trait;

    use super::{MailError, Mailer, OutgoingEmail};

    /// Keeps every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl RecordingMailer {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Everything sent so far, oldest first.
        #[must_use]
        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// The six-digit code in the newest message to `to`.
        #[must_use]
        pub fn latest_code_for(&self, to: &str) -> Option<String> {
            self.sent()
                .iter()
                .rev()
                .find(|m| m.to.as_str() == to)
                .and_then(|m| {
                    m.body
                        .split_whitespace()
                        .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
                        .map(str::to_owned)
                })
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(email.clone());
            Ok(())
        }
    }

    /// Rejects every message.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
            Err(MailError::Unavailable("relay refused connection".to_owned()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn to() -> Email {
        Email::parse("alice@shop.io").unwrap()
    }

    #[test]
    fn test_otp_email_contains_code_and_expiry() {
        let email = otp_email(&to(), "alice", "004213", OtpPurpose::Login).unwrap();
        assert_eq!(email.subject, "Your ModernShop login code");
        assert!(email.body.contains("Hello alice"));
        assert!(email.body.contains("004213"));
        assert!(email.body.contains("10 minutes"));
    }

    #[test]
    fn test_credentials_email() {
        let email =
            credentials_email(&to(), "alice2", "Xy7!pQ2@mN4#", "https://shop.io/login.html")
                .unwrap();
        assert!(email.body.contains("Username: alice2"));
        assert!(email.body.contains("Temporary password: Xy7!pQ2@mN4#"));
        assert!(email.body.contains("https://shop.io/login.html"));
    }

    #[test]
    fn test_order_confirmation_subject() {
        let email = order_confirmation_email(&to(), "alice", "Laptop", OrderId::new(7)).unwrap();
        assert_eq!(email.subject, "Order #7 confirmed");
        assert!(email.body.contains("order #7 for Laptop"));
    }

    #[tokio::test]
    async fn test_recording_mailer_extracts_code() {
        let mailer = RecordingMailer::new();
        let email = otp_email(&to(), "alice", "918273", OtpPurpose::Signup).unwrap();
        mailer.send(&email).await.unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(
            mailer.latest_code_for("alice@shop.io").as_deref(),
            Some("918273")
        );
        assert_eq!(mailer.latest_code_for("bob@shop.io"), None);
    }

    #[tokio::test]
    async fn test_failing_mailer() {
        let email = welcome_email(&to(), "alice").unwrap();
        assert!(matches!(
            FailingMailer.send(&email).await,
            Err(MailError::Unavailable(_))
        ));
    }
}
