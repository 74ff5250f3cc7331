//! Authentication service.
//!
//! Decides, for each sign-in attempt, whether a session may be established
//! right away or a one-time code must be passed first. Session handling
//! itself stays in the route layer; this service only returns outcomes.
//!
//! # Flows
//!
//! - Password: `login` → session, or → OTP → `verify_otp` → session
//! - Passwordless: `request_login_otp` → `verify_login_otp` → session
//! - Google: `oauth_callback` → session, or → OTP → `verify_oauth_otp`
//!   → session (linked account) or → `complete_oauth_profile` → session

mod error;
pub mod otp;
pub mod password;
pub mod policy;

pub use error::AuthError;
pub use otp::{OtpDelivery, OtpError};
pub use password::{hash_password, validate_password, verify_password};
pub use policy::{Action, Decision, DenyReason, authorize, can_purchase};

use chrono::Utc;

use modernshop_core::{Email, UserId, Username};

use crate::config::AuthSettings;
use crate::db::{RepositoryError, UserStore};
use crate::models::{GoogleAuthChallenge, GoogleProfile, NewUser, User};
use crate::services::email::{self, Mailer, OtpPurpose};

/// Result of a signup.
#[derive(Debug)]
pub enum SignupOutcome {
    /// The account waits for the emailed code.
    OtpRequired { user: User, delivery: OtpDelivery },
    /// No mailer is configured, so the account starts verified.
    Verified(User),
}

/// Result of a password login.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(User),
    OtpRequired {
        user_id: UserId,
        delivery: OtpDelivery,
    },
}

/// Result of a Google callback.
#[derive(Debug)]
pub enum OAuthOutcome {
    Authenticated(User),
    /// Store this in the session and send the browser to the code form.
    OtpRequired(Box<GoogleAuthChallenge>),
}

/// Result of checking the code of a Google sign-in.
#[derive(Debug)]
pub enum OAuthVerifyOutcome {
    Authenticated(User),
    /// New Google user: a username must be chosen next.
    ProfileRequired,
}

/// Authentication service.
///
/// Borrowed from `AppState` per request.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
    mailer: Option<&'a dyn Mailer>,
    settings: &'a AuthSettings,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        mailer: Option<&'a dyn Mailer>,
        settings: &'a AuthSettings,
    ) -> Self {
        Self {
            users,
            mailer,
            settings,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new account.
    ///
    /// Never establishes a session.
    ///
    /// # Errors
    ///
    /// Validation errors for malformed input, `Conflict` when the username
    /// or email is taken.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupOutcome, AuthError> {
        let username = Username::parse(username)?;
        let email = Email::parse(email)?;
        validate_password(password)?;

        if self.users.get_by_username(username.as_str()).await?.is_some() {
            return Err(AuthError::Conflict("Username already exists".to_owned()));
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered".to_owned()));
        }

        let password_hash = hash_password(password)?;
        let mut new_user = NewUser::with_password(username, Some(email), password_hash);
        let now = Utc::now();

        if self.mailer.is_none() {
            new_user.is_verified = true;
            new_user.last_login_at = Some(now);
            let user = self.users.create(new_user).await.map_err(conflict)?;
            tracing::info!(user_id = %user.id, "Account created without email verification");
            return Ok(SignupOutcome::Verified(user));
        }

        let challenge = otp::issue(now);
        new_user.otp_code = Some(challenge.code.clone());
        new_user.otp_expires_at = Some(challenge.expires_at);
        let user = self.users.create(new_user).await.map_err(conflict)?;

        let delivery = self
            .deliver_otp(user.email.as_ref(), user.username.as_str(), &challenge.code, OtpPurpose::Signup)
            .await;
        tracing::info!(user_id = %user.id, email_sent = delivery.email_sent(), "Account created");

        Ok(SignupOutcome::OtpRequired { user, delivery })
    }

    /// Check a username and password.
    ///
    /// A login older than the configured window (or a first login) is
    /// answered with a fresh code instead of a session.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `PasswordNotSet` for Google-only accounts, or
    /// `InvalidCredentials`.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let username = required(username, "username")?;
        required(password, "password")?;

        let user = self
            .users
            .get_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::PasswordNotSet)?;
        verify_password(password, hash)?;

        let now = Utc::now();
        if user.login_is_stale(now, self.settings.stale_login_window) {
            let challenge = otp::issue(now);
            self.users
                .set_otp(user.id, &challenge.code, challenge.expires_at)
                .await?;
            let delivery = self
                .deliver_otp(user.email.as_ref(), user.username.as_str(), &challenge.code, OtpPurpose::Login)
                .await;
            tracing::info!(user_id = %user.id, "Login requires verification code");
            return Ok(LoginOutcome::OtpRequired {
                user_id: user.id,
                delivery,
            });
        }

        let user = self.users.record_login(user.id, now, false).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome::Authenticated(user))
    }

    /// Consume the pending code of a user.
    ///
    /// On success the code is cleared, `last_login_at` becomes now and the
    /// account counts as verified.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, or `Otp` with `NotPending` / `Expired` / `Mismatch`.
    pub async fn verify_otp(&self, user_id: UserId, code: &str) -> Result<User, AuthError> {
        let code = required(code, "otp")?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let now = Utc::now();
        otp::verify(user.otp_code.as_deref(), user.otp_expires_at, code, now)?;

        // A concurrent request may have consumed the code in between.
        let user = self
            .users
            .consume_otp(user.id, code, now)
            .await?
            .ok_or(AuthError::Otp(OtpError::NotPending))?;
        tracing::info!(user_id = %user.id, "Verification code accepted");
        Ok(user)
    }

    // =========================================================================
    // Passwordless
    // =========================================================================

    /// Email a sign-in code to the account matching `identifier` (email or
    /// username).
    ///
    /// The code is never echoed back to the caller.
    ///
    /// # Errors
    ///
    /// `UserNotFound` if nothing matches.
    pub async fn request_login_otp(&self, identifier: &str) -> Result<bool, AuthError> {
        let user = self.find_by_identifier(identifier).await?;
        let challenge = otp::issue(Utc::now());
        self.users
            .set_otp(user.id, &challenge.code, challenge.expires_at)
            .await?;
        let delivery = self
            .deliver_otp(
                user.email.as_ref(),
                user.username.as_str(),
                &challenge.code,
                OtpPurpose::Passwordless,
            )
            .await;
        Ok(delivery.email_sent())
    }

    /// Verify a passwordless sign-in code.
    ///
    /// # Errors
    ///
    /// As [`Self::verify_otp`].
    pub async fn verify_login_otp(&self, identifier: &str, code: &str) -> Result<User, AuthError> {
        let user = self.find_by_identifier(identifier).await?;
        self.verify_otp(user.id, code).await
    }

    // =========================================================================
    // Google
    // =========================================================================

    /// Handle the profile returned by Google.
    ///
    /// # Errors
    ///
    /// `OAuthEmailMissing` when neither Google nor the linked account has an
    /// address.
    pub async fn oauth_callback(&self, profile: GoogleProfile) -> Result<OAuthOutcome, AuthError> {
        let existing = self.users.get_by_google_id(&profile.id).await?;
        let email = profile
            .email
            .clone()
            .or_else(|| existing.as_ref().and_then(|u| u.email.clone()))
            .ok_or(AuthError::OAuthEmailMissing)?;
        let now = Utc::now();

        if let Some(user) = &existing
            && let Some(window) = self.settings.oauth_skip_otp_window
            && !user.login_is_stale(now, window)
        {
            let user = self.users.record_login(user.id, now, false).await?;
            tracing::info!(user_id = %user.id, "Google login within window, skipping code");
            return Ok(OAuthOutcome::Authenticated(user));
        }

        let challenge = otp::issue(now);
        let greeting = existing.as_ref().map_or_else(
            || {
                profile
                    .display_name
                    .clone()
                    .unwrap_or_else(|| email.local_part().to_owned())
            },
            |u| u.username.to_string(),
        );
        let delivery = self
            .deliver_otp(Some(&email), &greeting, &challenge.code, OtpPurpose::GoogleSignIn)
            .await;

        Ok(OAuthOutcome::OtpRequired(Box::new(GoogleAuthChallenge {
            profile,
            otp: challenge.code,
            otp_expires_at: challenge.expires_at,
            existing_user_id: existing.map(|u| u.id),
            otp_verified: false,
            email_sent: delivery.email_sent(),
        })))
    }

    /// Check the code of a pending Google sign-in.
    ///
    /// A linked account is logged in; a new one is marked ready for
    /// [`Self::complete_oauth_profile`].
    ///
    /// # Errors
    ///
    /// `Otp` errors, or `UserNotFound` if the linked account vanished.
    pub async fn verify_oauth_otp(
        &self,
        challenge: &mut GoogleAuthChallenge,
        code: &str,
    ) -> Result<OAuthVerifyOutcome, AuthError> {
        let code = required(code, "otp")?;
        if challenge.otp_verified {
            return Err(AuthError::Otp(OtpError::NotPending));
        }
        let now = Utc::now();
        otp::verify(Some(&challenge.otp), Some(challenge.otp_expires_at), code, now)?;

        if let Some(user_id) = challenge.existing_user_id {
            let user = self
                .users
                .record_login(user_id, now, true)
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound => AuthError::UserNotFound,
                    other => AuthError::Repository(other),
                })?;
            tracing::info!(user_id = %user.id, "Google login verified");
            return Ok(OAuthVerifyOutcome::Authenticated(user));
        }

        challenge.otp_verified = true;
        Ok(OAuthVerifyOutcome::ProfileRequired)
    }

    /// Create the account for a verified new Google user.
    ///
    /// # Errors
    ///
    /// `OtpNotVerified`, `MissingField`, `InvalidUsername`, or `Conflict`.
    pub async fn complete_oauth_profile(
        &self,
        challenge: &GoogleAuthChallenge,
        username: Option<&str>,
        phone: Option<&str>,
    ) -> Result<User, AuthError> {
        if !challenge.otp_verified {
            return Err(AuthError::OtpNotVerified);
        }
        let username = Username::parse(required(username.unwrap_or_default(), "username")?)?;
        let email = challenge
            .profile
            .email
            .clone()
            .ok_or(AuthError::OAuthEmailMissing)?;

        if self.users.get_by_username(username.as_str()).await?.is_some() {
            return Err(AuthError::Conflict("Username already taken".to_owned()));
        }
        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict("Email already registered".to_owned()));
        }

        let mut new_user =
            NewUser::with_google(username, Some(email.clone()), challenge.profile.id.clone());
        new_user.display_name.clone_from(&challenge.profile.display_name);
        new_user.phone = phone
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
        new_user.is_verified = true;
        new_user.last_login_at = Some(Utc::now());
        let user = self.users.create(new_user).await.map_err(conflict)?;
        tracing::info!(user_id = %user.id, "Google account created");

        if let Some(mailer) = self.mailer {
            let sent = match email::welcome_email(&email, user.username.as_str()) {
                Ok(message) => mailer.send(&message).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to send welcome email");
            }
        }

        Ok(user)
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Replace the password of a signed-in user.
    ///
    /// The current password is required when the account has one.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` when the current password is wrong.
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: Option<&str>,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(hash) = user.password_hash.as_deref() {
            let current = required(current.unwrap_or_default(), "currentPassword")?;
            verify_password(current, hash)?;
        }

        let hash = hash_password(new_password)?;
        self.users.set_password(user.id, &hash).await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Delete the account together with its orders.
    ///
    /// # Errors
    ///
    /// `UserNotFound` if nothing was deleted.
    pub async fn delete_account(&self, user_id: UserId) -> Result<(), AuthError> {
        let deleted = self.users.delete_with_orders(&[user_id]).await?;
        if deleted == 0 {
            return Err(AuthError::UserNotFound);
        }
        tracing::info!(user_id = %user_id, "Account deleted");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find_by_identifier(&self, identifier: &str) -> Result<User, AuthError> {
        let identifier = required(identifier, "email")?;
        let user = match Email::parse(identifier) {
            Ok(email) => self.users.get_by_email(&email).await?,
            Err(_) => self.users.get_by_username(identifier).await?,
        };
        user.ok_or(AuthError::UserNotFound)
    }

    /// Send a code, falling back to handing it to the caller.
    async fn deliver_otp(
        &self,
        to: Option<&Email>,
        username: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> OtpDelivery {
        let (Some(mailer), Some(to)) = (self.mailer, to) else {
            tracing::debug!(otp = %code, "No mail route, returning code to caller");
            return OtpDelivery::Fallback(code.to_owned());
        };

        let sent = match email::otp_email(to, username, code, purpose) {
            Ok(message) => mailer.send(&message).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => OtpDelivery::Sent,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send verification code, using fallback");
                tracing::debug!(otp = %code, "Fallback verification code");
                OtpDelivery::Fallback(code.to_owned())
            }
        }
    }
}

fn required<'s>(value: &'s str, field: &'static str) -> Result<&'s str, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(value)
}

fn conflict(e: RepositoryError) -> AuthError {
    match e {
        RepositoryError::Conflict(msg) => AuthError::Conflict(msg),
        other => AuthError::Repository(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::services::email::{FailingMailer, RecordingMailer};

    fn settings() -> AuthSettings {
        AuthSettings::default()
    }

    async fn signed_up(store: &InMemoryStore, mailer: &RecordingMailer) -> User {
        let settings = settings();
        let auth = AuthService::new(store, Some(mailer), &settings);
        match auth.signup("alice", "a@x.com", "p1").await.unwrap() {
            SignupOutcome::OtpRequired { user, .. } => user,
            SignupOutcome::Verified(_) => panic!("mailer configured"),
        }
    }

    #[tokio::test]
    async fn test_signup_with_mailer_sends_code() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let user = signed_up(&store, &mailer).await;

        assert!(!user.is_verified);
        assert!(user.last_login_at.is_none());
        assert_eq!(mailer.latest_code_for("a@x.com"), user.otp_code);
    }

    #[tokio::test]
    async fn test_signup_without_mailer_is_verified() {
        let store = InMemoryStore::new();
        let settings = settings();
        let auth = AuthService::new(&store, None, &settings);
        let SignupOutcome::Verified(user) = auth.signup("bob", "b@x.com", "pw").await.unwrap()
        else {
            panic!("expected verified signup");
        };
        assert!(user.is_verified);
        assert!(user.last_login_at.is_some());
        assert!(user.otp_code.is_none());
    }

    #[tokio::test]
    async fn test_signup_duplicate_creates_nothing() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        let err = auth.signup("alice", "other@x.com", "p").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
        let err = auth.signup("alice2", "A@X.com", "p").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
        assert_eq!(UserStore::list(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_signup_send_failure_falls_back() {
        let store = InMemoryStore::new();
        let settings = settings();
        let auth = AuthService::new(&store, Some(&FailingMailer), &settings);
        let SignupOutcome::OtpRequired { user, delivery } =
            auth.signup("carol", "c@x.com", "pw").await.unwrap()
        else {
            panic!("expected challenge");
        };
        assert_eq!(delivery.fallback_code(), user.otp_code.as_deref());
    }

    #[tokio::test]
    async fn test_login_first_time_requires_otp_then_verifies() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let user = signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        let LoginOutcome::OtpRequired { user_id, delivery } =
            auth.login("alice", "p1").await.unwrap()
        else {
            panic!("first login must require a code");
        };
        assert_eq!(user_id, user.id);
        assert!(delivery.email_sent());

        let code = mailer.latest_code_for("a@x.com").unwrap();
        let verified = auth.verify_otp(user_id, &code).await.unwrap();
        assert!(verified.is_verified);
        assert!(verified.otp_code.is_none());
        assert!(verified.last_login_at.is_some());

        // Replay fails.
        assert!(matches!(
            auth.verify_otp(user_id, &code).await,
            Err(AuthError::Otp(OtpError::NotPending))
        ));

        // Recent login goes straight through.
        assert!(matches!(
            auth.login("alice", "p1").await.unwrap(),
            LoginOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_login_after_window_requires_otp() {
        let store = InMemoryStore::new();
        let settings = settings();
        let auth = AuthService::new(&store, None, &settings);
        let SignupOutcome::Verified(user) = auth.signup("dave", "d@x.com", "pw").await.unwrap()
        else {
            panic!("expected verified signup");
        };

        store.backdate_login(user.id, TimeDelta::days(11));
        let LoginOutcome::OtpRequired { delivery, .. } = auth.login("dave", "pw").await.unwrap()
        else {
            panic!("stale login must require a code");
        };
        // No mailer: the code comes back to the caller.
        assert_eq!(delivery.fallback_code().map(str::len), Some(6));
    }

    #[tokio::test]
    async fn test_login_errors() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        assert!(matches!(
            auth.login("alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "p1").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            auth.login("", "p1").await,
            Err(AuthError::MissingField("username"))
        ));
    }

    #[tokio::test]
    async fn test_verify_expired_and_wrong_code() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let user = signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        assert!(matches!(
            auth.verify_otp(user.id, "999999x").await,
            Err(AuthError::Otp(OtpError::Mismatch))
        ));

        store.expire_otp(user.id);
        let code = user.otp_code.clone().unwrap();
        assert!(matches!(
            auth.verify_otp(user.id, &code).await,
            Err(AuthError::Otp(OtpError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_passwordless_by_email_or_username() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let user = signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        assert!(auth.request_login_otp("A@x.com").await.unwrap());
        let code = mailer.latest_code_for("a@x.com").unwrap();
        let signed_in = auth.verify_login_otp("alice", &code).await.unwrap();
        assert_eq!(signed_in.id, user.id);

        assert!(matches!(
            auth.request_login_otp("ghost").await,
            Err(AuthError::UserNotFound)
        ));
    }

    fn google_profile(email: Option<&str>) -> GoogleProfile {
        GoogleProfile {
            id: "g-123".to_owned(),
            email: email.map(|e| Email::parse(e).unwrap()),
            display_name: Some("Gina Google".to_owned()),
        }
    }

    #[tokio::test]
    async fn test_oauth_new_user_flow() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        let OAuthOutcome::OtpRequired(mut challenge) = auth
            .oauth_callback(google_profile(Some("gina@gmail.com")))
            .await
            .unwrap()
        else {
            panic!("new Google user must get a code");
        };
        assert!(challenge.email_sent);
        assert!(challenge.existing_user_id.is_none());

        assert!(matches!(
            auth.complete_oauth_profile(&challenge, Some("gina"), None).await,
            Err(AuthError::OtpNotVerified)
        ));

        let code = mailer.latest_code_for("gina@gmail.com").unwrap();
        assert!(matches!(
            auth.verify_oauth_otp(&mut challenge, &code).await.unwrap(),
            OAuthVerifyOutcome::ProfileRequired
        ));
        assert!(challenge.otp_verified);

        assert!(matches!(
            auth.complete_oauth_profile(&challenge, Some("  "), None).await,
            Err(AuthError::MissingField("username"))
        ));

        let user = auth
            .complete_oauth_profile(&challenge, Some("gina"), Some("555-0100"))
            .await
            .unwrap();
        assert_eq!(user.google_id.as_deref(), Some("g-123"));
        assert_eq!(user.display_name.as_deref(), Some("Gina Google"));
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert!(user.is_verified);
        assert!(user.password_hash.is_none());
        assert!(mailer.sent().iter().any(|m| m.subject.starts_with("Welcome")));
    }

    #[tokio::test]
    async fn test_oauth_existing_user_skips_code_within_window() {
        let store = Arc::new(InMemoryStore::new());
        let settings = settings();
        let auth = AuthService::new(store.as_ref(), None, &settings);

        let mut new_user = NewUser::with_google(
            Username::parse("gina").unwrap(),
            Some(Email::parse("gina@gmail.com").unwrap()),
            "g-123".to_owned(),
        );
        new_user.last_login_at = Some(Utc::now() - TimeDelta::days(2));
        let user = store.create(new_user).await.unwrap();

        assert!(matches!(
            auth.oauth_callback(google_profile(Some("gina@gmail.com")))
                .await
                .unwrap(),
            OAuthOutcome::Authenticated(_)
        ));

        store.backdate_login(user.id, TimeDelta::days(30));
        let OAuthOutcome::OtpRequired(mut challenge) = auth
            .oauth_callback(google_profile(Some("gina@gmail.com")))
            .await
            .unwrap()
        else {
            panic!("stale Google login must get a code");
        };
        assert_eq!(challenge.existing_user_id, Some(user.id));
        assert!(!challenge.email_sent);

        let code = challenge.otp.clone();
        assert!(matches!(
            auth.verify_oauth_otp(&mut challenge, &code).await.unwrap(),
            OAuthVerifyOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_oauth_skip_window_disabled_always_asks() {
        let store = InMemoryStore::new();
        let settings = AuthSettings {
            oauth_skip_otp_window: None,
            ..AuthSettings::default()
        };
        let auth = AuthService::new(&store, None, &settings);

        let mut new_user = NewUser::with_google(
            Username::parse("gina").unwrap(),
            Some(Email::parse("gina@gmail.com").unwrap()),
            "g-123".to_owned(),
        );
        new_user.last_login_at = Some(Utc::now());
        UserStore::create(&store, new_user).await.unwrap();

        assert!(matches!(
            auth.oauth_callback(google_profile(Some("gina@gmail.com")))
                .await
                .unwrap(),
            OAuthOutcome::OtpRequired(_)
        ));
    }

    #[tokio::test]
    async fn test_oauth_without_email_is_rejected() {
        let store = InMemoryStore::new();
        let settings = settings();
        let auth = AuthService::new(&store, None, &settings);
        assert!(matches!(
            auth.oauth_callback(google_profile(None)).await,
            Err(AuthError::OAuthEmailMissing)
        ));
    }

    #[tokio::test]
    async fn test_oauth_linked_account_supplies_missing_email() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        let user = UserStore::create(
            &store,
            NewUser::with_google(
                Username::parse("gina").unwrap(),
                Some(Email::parse("gina@gmail.com").unwrap()),
                "g-123".to_owned(),
            ),
        )
        .await
        .unwrap();

        let OAuthOutcome::OtpRequired(challenge) =
            auth.oauth_callback(google_profile(None)).await.unwrap()
        else {
            panic!("linked account without a recent login must get a code");
        };
        assert_eq!(challenge.existing_user_id, Some(user.id));
        assert!(challenge.email_sent);
        assert_eq!(
            mailer.latest_code_for("gina@gmail.com").as_deref(),
            Some(challenge.otp.as_str())
        );
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let store = InMemoryStore::new();
        let mailer = RecordingMailer::new();
        let user = signed_up(&store, &mailer).await;
        let settings = settings();
        let auth = AuthService::new(&store, Some(&mailer), &settings);

        assert!(matches!(
            auth.change_password(user.id, Some("nope"), "fresh").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.change_password(user.id, None, "fresh").await,
            Err(AuthError::MissingField("currentPassword"))
        ));
        auth.change_password(user.id, Some("p1"), "fresh").await.unwrap();

        let stored = store.get_by_id(user.id).await.unwrap().unwrap();
        assert!(verify_password("fresh", stored.password_hash.as_deref().unwrap()).is_ok());
    }
}
