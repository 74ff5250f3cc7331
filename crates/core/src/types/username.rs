//! Account username type.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::Email;

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    /// Shorter than [`Username::MIN_LENGTH`].
    #[error("username must be at least {min} characters")]
    TooShort {
        /// Minimum allowed length.
        min: usize,
    },
    /// Longer than [`Username::MAX_LENGTH`].
    #[error("username must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// A character outside `[A-Za-z0-9_.-]`.
    #[error("username may only contain letters, digits, '_', '.' and '-'")]
    InvalidCharacter,
}

/// A unique account handle.
///
/// Usernames are case-sensitive and limited to ASCII letters, digits,
/// `_`, `.` and `-`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Minimum username length.
    pub const MIN_LENGTH: usize = 3;
    /// Maximum username length.
    pub const MAX_LENGTH: usize = 32;

    /// Parse a `Username`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns a [`UsernameError`] if the length or alphabet is wrong.
    pub fn parse(s: &str) -> Result<Self, UsernameError> {
        let s = s.trim();
        if s.len() < Self::MIN_LENGTH {
            return Err(UsernameError::TooShort {
                min: Self::MIN_LENGTH,
            });
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(UsernameError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Derive a username candidate from an email's local part.
    ///
    /// Keeps only ASCII alphanumerics, lower-cased. Short results are
    /// prefixed with `user` so the candidate is always valid. `attempt`
    /// appends a numeric suffix for collision retries (`0` means none).
    ///
    /// ```
    /// use modernshop_core::{Email, Username};
    ///
    /// let email = Email::parse("Jane.Doe+shop@example.com").unwrap();
    /// assert_eq!(Username::from_email(&email, 0).as_str(), "janedoeshop");
    /// assert_eq!(Username::from_email(&email, 2).as_str(), "janedoeshop2");
    /// ```
    #[must_use]
    pub fn from_email(email: &Email, attempt: u32) -> Self {
        let mut base: String = email
            .local_part()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if base.len() < Self::MIN_LENGTH {
            base.insert_str(0, "user");
        }

        let suffix = if attempt == 0 {
            String::new()
        } else {
            attempt.to_string()
        };
        base.truncate(Self::MAX_LENGTH - suffix.len());
        base.push_str(&suffix);
        Self(base)
    }

    /// The username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Username {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Username {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Username {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // Rows predating the current alphabet are still readable.
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Username {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Username::parse(" alice ").unwrap().as_str(), "alice");
        assert!(Username::parse("Bob_the-builder.2").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(
            Username::parse("al"),
            Err(UsernameError::TooShort { min: 3 })
        );
        assert_eq!(
            Username::parse(&"x".repeat(33)),
            Err(UsernameError::TooLong { max: 32 })
        );
        assert_eq!(
            Username::parse("bad name"),
            Err(UsernameError::InvalidCharacter)
        );
        assert_eq!(
            Username::parse("émile"),
            Err(UsernameError::InvalidCharacter)
        );
    }

    #[test]
    fn test_from_email_pads_short_local_parts() {
        let email = Email::parse("j@x.com").unwrap();
        assert_eq!(Username::from_email(&email, 0).as_str(), "userj");
    }

    #[test]
    fn test_from_email_keeps_suffix_within_limit() {
        let email = Email::parse(&format!("{}@x.com", "a".repeat(40))).unwrap();
        let name = Username::from_email(&email, 12);
        assert_eq!(name.as_str().len(), Username::MAX_LENGTH);
        assert!(name.as_str().ends_with("12"));
        assert!(Username::parse(name.as_str()).is_ok());
    }
}
