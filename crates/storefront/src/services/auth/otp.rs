//! One-time passcodes.
//!
//! A challenge is six decimal digits with a fixed ten minute lifetime. It is
//! usable exactly once: callers clear it as part of a successful check.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use thiserror::Error;

/// How long an issued code stays valid.
pub const OTP_TTL: TimeDelta = TimeDelta::minutes(10);

/// Why a supplied code was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("No OTP pending")]
    NotPending,
    #[error("OTP expired")]
    Expired,
    #[error("Invalid OTP")]
    Mismatch,
}

/// A freshly issued code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// How a code reached (or failed to reach) the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpDelivery {
    Sent,
    /// No mailer, no address, or the send failed. The caller shows the code.
    Fallback(String),
}

impl OtpDelivery {
    #[must_use]
    pub const fn email_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// The code to return to the client, if delivery fell back.
    #[must_use]
    pub fn fallback_code(&self) -> Option<&str> {
        match self {
            Self::Sent => None,
            Self::Fallback(code) => Some(code.as_str()),
        }
    }
}

/// Six uniformly random decimal digits, zero-padded.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

/// Issue a new challenge valid from `now`.
#[must_use]
pub fn issue(now: DateTime<Utc>) -> OtpChallenge {
    OtpChallenge {
        code: generate_code(),
        expires_at: now + OTP_TTL,
    }
}

/// Check a supplied code against the stored challenge.
///
/// # Errors
///
/// `NotPending` when nothing is stored, `Expired` once `now` reaches the
/// expiry, `Mismatch` when the digits differ.
pub fn verify(
    stored: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    supplied: &str,
    now: DateTime<Utc>,
) -> Result<(), OtpError> {
    let (Some(stored), Some(expires_at)) = (stored, expires_at) else {
        return Err(OtpError::NotPending);
    };
    if now >= expires_at {
        return Err(OtpError::Expired);
    }
    if !constant_time_eq(stored.trim().as_bytes(), supplied.trim().as_bytes()) {
        return Err(OtpError::Mismatch);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
