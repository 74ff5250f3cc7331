//! User accounts.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use modernshop_core::{Email, UserId, Username};

/// A shop account as stored.
///
/// Holds credentials and the pending OTP challenge, so it is never
/// serialized directly; see [`PublicUser`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: Option<Email>,
    /// Argon2 PHC string. `None` for Google-only accounts.
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    /// Mailbox ownership proven (OTP) or granted by an administrator.
    pub is_verified: bool,
    /// Approved by an administrator.
    pub is_admin_verified: bool,
    pub is_admin: bool,
    /// Set on provisioned accounts until the first password change.
    pub must_change_password: bool,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether a login at `now` must pass a fresh OTP challenge.
    ///
    /// True when the user never completed a login or the last one is older
    /// than `window`.
    #[must_use]
    pub fn login_is_stale(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.last_login_at
            .is_none_or(|last| last < now - window)
    }

    /// The flags the authorization policy looks at.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_admin: self.is_admin,
            is_admin_verified: self.is_admin_verified,
            is_verified: self.is_verified,
        }
    }
}

/// Snapshot of the privilege flags of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub is_admin: bool,
    pub is_admin_verified: bool,
    pub is_verified: bool,
}

/// Insert payload for a new account.
///
/// Built through [`NewUser::with_password`] or [`NewUser::with_google`] so
/// every account carries at least one credential.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Option<Email>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_admin_verified: bool,
    pub is_admin: bool,
    pub must_change_password: bool,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl NewUser {
    /// A password account.
    #[must_use]
    pub const fn with_password(
        username: Username,
        email: Option<Email>,
        password_hash: String,
    ) -> Self {
        Self::blank(username, email, Some(password_hash), None)
    }

    /// A Google-linked account without a password.
    #[must_use]
    pub const fn with_google(username: Username, email: Option<Email>, google_id: String) -> Self {
        Self::blank(username, email, None, Some(google_id))
    }

    const fn blank(
        username: Username,
        email: Option<Email>,
        password_hash: Option<String>,
        google_id: Option<String>,
    ) -> Self {
        Self {
            username,
            email,
            password_hash,
            google_id,
            display_name: None,
            phone: None,
            is_verified: false,
            is_admin_verified: false,
            is_admin: false,
            must_change_password: false,
            otp_code: None,
            otp_expires_at: None,
            last_login_at: None,
        }
    }
}

/// Administrative edit of an account. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<Email>,
    pub is_verified: Option<bool>,
    pub is_admin: Option<bool>,
}

/// Client-facing view of a [`User`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub username: Username,
    pub email: Option<Email>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub is_verified: bool,
    pub is_admin_verified: bool,
    pub is_admin: bool,
    pub must_change_password: bool,
    pub has_google: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            phone: user.phone.clone(),
            is_verified: user.is_verified,
            is_admin_verified: user.is_admin_verified,
            is_admin: user.is_admin,
            must_change_password: user.must_change_password,
            has_google: user.google_id.is_some(),
            last_login: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_user(last_login_at: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            username: Username::parse("alice").unwrap(),
            email: Some(Email::parse("a@x.com").unwrap()),
            password_hash: Some("$argon2id$placeholder".to_owned()),
            google_id: None,
            display_name: None,
            phone: None,
            is_verified: false,
            is_admin_verified: false,
            is_admin: false,
            must_change_password: false,
            otp_code: Some("123456".to_owned()),
            otp_expires_at: Some(now),
            last_login_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_login_never_completed_is_stale() {
        let user = sample_user(None);
        assert!(user.login_is_stale(Utc::now(), TimeDelta::days(10)));
    }

    #[test]
    fn test_login_staleness_window() {
        let now = Utc::now();
        let window = TimeDelta::days(10);

        let recent = sample_user(Some(now - TimeDelta::days(9)));
        assert!(!recent.login_is_stale(now, window));

        let old = sample_user(Some(now - TimeDelta::days(11)));
        assert!(old.login_is_stale(now, window));

        let boundary = sample_user(Some(now - window));
        assert!(!boundary.login_is_stale(now, window));
    }

    #[test]
    fn test_public_view_hides_secrets() {
        let user = sample_user(None);
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("123456"));
        assert!(json.contains("\"username\":\"alice\""));
        assert!(json.contains("\"isAdminVerified\":false"));
    }
}
