//! Session-related types.
//!
//! Types stored in the session for authentication state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use modernshop_core::{Email, UserId, Username};

/// Session-stored user identity.
///
/// Only identifies the user; privilege flags are re-read from the store on
/// every request that needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: Username,
}

/// The parts of a Google profile the shop keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleProfile {
    /// Google's stable subject identifier.
    pub id: String,
    pub email: Option<Email>,
    pub display_name: Option<String>,
}

/// In-flight Google sign-in, kept in the session until it completes.
///
/// The OTP lives here rather than on a user row because a first-time
/// Google user has no row yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAuthChallenge {
    pub profile: GoogleProfile,
    pub otp: String,
    pub otp_expires_at: DateTime<Utc>,
    /// Set when the Google account is already linked to a user.
    pub existing_user_id: Option<UserId>,
    /// New users only: the OTP passed and the profile may be completed.
    pub otp_verified: bool,
    pub email_sent: bool,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the OAuth `state` parameter (CSRF protection).
    pub const GOOGLE_OAUTH_STATE: &str = "google_oauth_state";

    /// Key for the pending Google sign-in challenge.
    pub const GOOGLE_AUTH: &str = "google_auth";
}
