//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ShopConfig;
use crate::db::{OrderStore, ProductStore, Stores, UserStore};
use crate::services::admin::AdminService;
use crate::services::auth::AuthService;
use crate::services::email::{Mailer, SmtpMailer};
use crate::services::google::{GoogleOAuthClient, OAuthProvider};
use crate::services::orders::OrderService;

/// Error wiring up the external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SMTP configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Repositories, the mailer and
/// the OAuth provider sit behind trait objects so tests can swap them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ShopConfig,
    stores: Stores,
    mailer: Option<Arc<dyn Mailer>>,
    oauth: Option<Arc<dyn OAuthProvider>>,
}

impl AppState {
    /// Assemble state from already-built collaborators.
    #[must_use]
    pub fn new(
        config: ShopConfig,
        stores: Stores,
        mailer: Option<Arc<dyn Mailer>>,
        oauth: Option<Arc<dyn OAuthProvider>>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                mailer,
                oauth,
            }),
        }
    }

    /// Production wiring: Postgres repositories, SMTP if configured, Google
    /// if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay cannot be configured.
    pub fn from_config(config: ShopConfig, pool: &PgPool) -> Result<Self, StateError> {
        let mailer: Option<Arc<dyn Mailer>> = match &config.email {
            Some(email) => Some(Arc::new(SmtpMailer::new(email)?)),
            None => {
                tracing::warn!("SMTP_HOST not set, one-time codes will be returned in responses");
                None
            }
        };
        let oauth: Option<Arc<dyn OAuthProvider>> = config
            .google
            .as_ref()
            .map(|g| Arc::new(GoogleOAuthClient::new(g)) as Arc<dyn OAuthProvider>);

        Ok(Self::new(config, Stores::postgres(pool), mailer, oauth))
    }

    #[must_use]
    pub fn config(&self) -> &ShopConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.stores.users.as_ref()
    }

    #[must_use]
    pub fn products(&self) -> &dyn ProductStore {
        self.inner.stores.products.as_ref()
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.stores.orders.as_ref()
    }

    /// The outgoing mailer, if SMTP is configured.
    #[must_use]
    pub fn mailer(&self) -> Option<&dyn Mailer> {
        self.inner.mailer.as_deref()
    }

    /// The Google sign-in provider, if configured.
    #[must_use]
    pub fn oauth(&self) -> Option<&dyn OAuthProvider> {
        self.inner.oauth.as_deref()
    }

    #[must_use]
    pub fn auth_service(&self) -> AuthService<'_> {
        AuthService::new(self.users(), self.mailer(), &self.inner.config.auth)
    }

    #[must_use]
    pub fn order_service(&self) -> OrderService<'_> {
        OrderService::new(self.orders(), self.users(), self.mailer())
    }

    #[must_use]
    pub fn admin_service(&self) -> AdminService<'_> {
        AdminService::new(
            self.users(),
            self.mailer(),
            &self.inner.config.auth.protected_admin_username,
        )
    }
}
