//! Administrative account management and bulk provisioning.

use rand::seq::IndexedRandom;
use serde::Serialize;
use thiserror::Error;

use modernshop_core::{Email, UserId, Username};

use crate::db::{RepositoryError, UserStore};
use crate::models::{NewUser, User, UserUpdate};
use crate::services::auth::hash_password;
use crate::services::email::{self, Mailer};

/// Length of generated temporary passwords.
pub const GENERATED_PASSWORD_LENGTH: usize = 12;

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Give up deriving a username after this many suffixes.
const MAX_USERNAME_ATTEMPTS: u32 = 1000;

/// Errors from admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("User not found")]
    UserNotFound,

    /// Attempt to demote or unverify the protected admin account.
    #[error("Cannot remove admin status or verification from the main admin account")]
    ProtectedAccount,

    #[error("No user IDs provided")]
    NothingSelected,

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for AdminError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::UserNotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// A provisioned account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioned {
    pub email: String,
    pub username: Username,
    pub email_sent: bool,
}

/// A row that could not be provisioned.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionFailure {
    pub email: String,
    pub reason: String,
}

/// Per-row results of a bulk provisioning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    pub success: Vec<Provisioned>,
    pub failed: Vec<ProvisionFailure>,
}

/// A random temporary password.
#[must_use]
pub fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LENGTH)
        .filter_map(|_| PASSWORD_CHARSET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}

/// Admin service.
pub struct AdminService<'a> {
    users: &'a dyn UserStore,
    mailer: Option<&'a dyn Mailer>,
    protected_username: &'a str,
}

impl<'a> AdminService<'a> {
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        mailer: Option<&'a dyn Mailer>,
        protected_username: &'a str,
    ) -> Self {
        Self {
            users,
            mailer,
            protected_username,
        }
    }

    fn is_protected(&self, user: &User) -> bool {
        user.username.as_str() == self.protected_username
    }

    /// Edit email, verification or admin flag.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, `ProtectedAccount`, or `Conflict` on a taken email.
    pub async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<User, AdminError> {
        let user = self
            .users
            .get_by_id(id)
            .await?
            .ok_or(AdminError::UserNotFound)?;
        if self.is_protected(&user)
            && (update.is_verified == Some(false) || update.is_admin == Some(false))
        {
            return Err(AdminError::ProtectedAccount);
        }

        let user = self.users.update(id, update).await?;
        tracing::info!(user_id = %user.id, "User updated by admin");
        Ok(user)
    }

    /// Approve or revoke a user. The value also applies to `is_verified`.
    ///
    /// # Errors
    ///
    /// `UserNotFound`, or `ProtectedAccount` when revoking the main admin.
    pub async fn set_verification(&self, id: UserId, verify: bool) -> Result<User, AdminError> {
        let user = self
            .users
            .get_by_id(id)
            .await?
            .ok_or(AdminError::UserNotFound)?;
        if !verify && self.is_protected(&user) {
            return Err(AdminError::ProtectedAccount);
        }

        let user = self.users.set_admin_verification(id, verify).await?;
        tracing::info!(user_id = %user.id, verify, "Admin verification changed");
        Ok(user)
    }

    /// Delete accounts with their orders. The protected admin is skipped.
    ///
    /// # Errors
    ///
    /// `NothingSelected` for an empty list.
    pub async fn bulk_delete(&self, ids: &[UserId]) -> Result<u64, AdminError> {
        if ids.is_empty() {
            return Err(AdminError::NothingSelected);
        }
        let protected = self
            .users
            .get_by_username(self.protected_username)
            .await?
            .map(|u| u.id);
        let targets: Vec<UserId> = ids
            .iter()
            .copied()
            .filter(|id| Some(*id) != protected)
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let deleted = self.users.delete_with_orders(&targets).await?;
        tracing::info!(requested = ids.len(), deleted, "Bulk delete");
        Ok(deleted)
    }

    /// Create verified accounts for a list of addresses and mail each one
    /// its credentials.
    ///
    /// Bad rows are reported, not fatal.
    pub async fn provision(&self, emails: &[String], login_url: &str) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        for raw in emails {
            match self.provision_one(raw.trim(), login_url).await {
                Ok(done) => report.success.push(done),
                Err(reason) => report.failed.push(ProvisionFailure {
                    email: if raw.trim().is_empty() {
                        "N/A".to_owned()
                    } else {
                        raw.trim().to_owned()
                    },
                    reason,
                }),
            }
        }
        tracing::info!(
            created = report.success.len(),
            failed = report.failed.len(),
            "Bulk provisioning finished"
        );
        report
    }

    async fn provision_one(&self, raw: &str, login_url: &str) -> Result<Provisioned, String> {
        if raw.is_empty() {
            return Err("No email provided".to_owned());
        }
        let email = Email::parse(raw).map_err(|e| e.to_string())?;
        if self.users.get_by_email(&email).await.map_err(internal)?.is_some() {
            return Err("User already exists".to_owned());
        }

        let username = self.free_username(&email).await?;
        let password = generate_password();
        let hash = hash_password(&password).map_err(|e| e.to_string())?;

        let mut new_user = NewUser::with_password(username, Some(email.clone()), hash);
        new_user.is_verified = true;
        new_user.is_admin_verified = true;
        new_user.must_change_password = true;
        let user = self.users.create(new_user).await.map_err(|e| match e {
            RepositoryError::Conflict(msg) => msg,
            other => internal(other),
        })?;

        let email_sent = match self.mailer {
            Some(mailer) => {
                let sent = match email::credentials_email(
                    &email,
                    user.username.as_str(),
                    &password,
                    login_url,
                ) {
                    Ok(message) => mailer.send(&message).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &sent {
                    tracing::warn!(user_id = %user.id, error = %e, "Failed to send credentials");
                }
                sent.is_ok()
            }
            None => false,
        };

        Ok(Provisioned {
            email: email.to_string(),
            username: user.username,
            email_sent,
        })
    }

    async fn free_username(&self, email: &Email) -> Result<Username, String> {
        for attempt in 0..MAX_USERNAME_ATTEMPTS {
            let candidate = Username::from_email(email, attempt);
            if self
                .users
                .get_by_username(candidate.as_str())
                .await
                .map_err(internal)?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        Err("Could not derive a free username".to_owned())
    }
}

fn internal(e: RepositoryError) -> String {
    tracing::error!(error = %e, "Provisioning row failed");
    "Internal error".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryStore;
    use crate::services::auth::verify_password;
    use crate::services::email::RecordingMailer;

    async fn user(store: &InMemoryStore, name: &str, admin: bool) -> User {
        let mut new_user = NewUser::with_password(
            Username::parse(name).unwrap(),
            Some(Email::parse(&format!("{name}@shop.io")).unwrap()),
            "hash".to_owned(),
        );
        new_user.is_admin = admin;
        new_user.is_verified = true;
        store.create(new_user).await.unwrap()
    }

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LENGTH);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[tokio::test]
    async fn test_verification_cascades() {
        let store = InMemoryStore::new();
        let bob = user(&store, "bob", false).await;
        let admin = AdminService::new(&store, None, "admin");

        let revoked = admin.set_verification(bob.id, false).await.unwrap();
        assert!(!revoked.is_admin_verified);
        assert!(!revoked.is_verified);

        let approved = admin.set_verification(bob.id, true).await.unwrap();
        assert!(approved.is_admin_verified);
        assert!(approved.is_verified);

        assert!(matches!(
            admin.set_verification(UserId::new(999), true).await,
            Err(AdminError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_protected_admin_cannot_be_demoted() {
        let store = InMemoryStore::new();
        let root = user(&store, "admin", true).await;
        let admin = AdminService::new(&store, None, "admin");

        let demote = UserUpdate {
            is_admin: Some(false),
            ..UserUpdate::default()
        };
        assert!(matches!(
            admin.update_user(root.id, demote).await,
            Err(AdminError::ProtectedAccount)
        ));
        assert!(matches!(
            admin.set_verification(root.id, false).await,
            Err(AdminError::ProtectedAccount)
        ));

        let new_email = UserUpdate {
            email: Some(Email::parse("root@shop.io").unwrap()),
            ..UserUpdate::default()
        };
        let updated = admin.update_user(root.id, new_email).await.unwrap();
        assert_eq!(updated.email.unwrap().as_str(), "root@shop.io");
    }

    #[tokio::test]
    async fn test_bulk_delete_skips_protected() {
        let store = InMemoryStore::new();
        let root = user(&store, "admin", true).await;
        let bob = user(&store, "bob", false).await;
        let admin = AdminService::new(&store, None, "admin");

        assert!(matches!(
            admin.bulk_delete(&[]).await,
            Err(AdminError::NothingSelected)
        ));
        assert_eq!(admin.bulk_delete(&[root.id, bob.id]).await.unwrap(), 1);
        assert!(store.get_by_id(root.id).await.unwrap().is_some());
        assert!(store.get_by_id(bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provision_rows() {
        let store = InMemoryStore::new();
        user(&store, "jane", false).await;
        let mailer = RecordingMailer::new();
        let admin = AdminService::new(&store, Some(&mailer), "admin");

        let report = admin
            .provision(
                &[
                    "Jane@corp.io".to_owned(),
                    "not-an-email".to_owned(),
                    "jane@shop.io".to_owned(),
                    String::new(),
                ],
                "https://shop.io/login.html",
            )
            .await;

        assert_eq!(report.success.len(), 1);
        let created = report.success.first().unwrap();
        assert_eq!(created.username.as_str(), "jane1");
        assert!(created.email_sent);

        let reasons: Vec<&str> = report.failed.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.contains(&"User already exists"));
        assert!(reasons.contains(&"No email provided"));
        assert!(report.failed.iter().any(|f| f.email == "N/A"));

        let stored = store.get_by_username("jane1").await.unwrap().unwrap();
        assert!(stored.is_verified && stored.is_admin_verified && stored.must_change_password);

        let mail = mailer.sent().pop().unwrap();
        let password = mail
            .body
            .lines()
            .find_map(|l| l.strip_prefix("Temporary password: "))
            .unwrap();
        assert!(verify_password(password, stored.password_hash.as_deref().unwrap()).is_ok());
    }
}
