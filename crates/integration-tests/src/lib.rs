//! End-to-end tests for ModernShop.
//!
//! Every test drives the real router through `tower::ServiceExt::oneshot`,
//! backed by the in-memory repositories, an in-memory session store and a
//! recording (or failing) mailer. No database or network is needed.
//!
//! ```bash
//! cargo test -p modernshop-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use modernshop_core::{Email, Price, Username};
use modernshop_storefront::config::ShopConfig;
use modernshop_storefront::db::memory::InMemoryStore;
use modernshop_storefront::db::{ProductStore, Stores, UserStore};
use modernshop_storefront::middleware::create_session_layer;
use modernshop_storefront::middleware::session::SESSION_COOKIE_NAME;
use modernshop_storefront::models::{NewProduct, NewUser, Product, User};
use modernshop_storefront::routes;
use modernshop_storefront::services::auth::hash_password;
use modernshop_storefront::services::email::{FailingMailer, Mailer, OutgoingEmail, RecordingMailer};
use modernshop_storefront::services::google::{OAuthProvider, ScriptedOAuthProvider};
use modernshop_storefront::state::AppState;

/// Password given to every seeded account.
pub const PASSWORD: &str = "correct horse battery staple";

/// How the app sends mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mail {
    Recording,
    Failing,
    Disabled,
}

/// Account flags for [`TestApp::seed_user`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub verified: bool,
    pub admin_verified: bool,
    pub admin: bool,
}

impl Flags {
    pub const VERIFIED: Self = Self {
        verified: true,
        admin_verified: false,
        admin: false,
    };
    pub const UNVERIFIED: Self = Self {
        verified: false,
        admin_verified: false,
        admin: false,
    };
    pub const ADMIN: Self = Self {
        verified: true,
        admin_verified: true,
        admin: true,
    };
}

/// A running app over in-memory collaborators.
pub struct TestApp {
    router: Router,
    pub store: Arc<InMemoryStore>,
    mailer: Arc<RecordingMailer>,
    next_ip: Arc<AtomicU32>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// Recording mailer, no Google.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Mail::Recording, None, ShopConfig::for_testing())
    }

    #[must_use]
    pub fn with_mail(mail: Mail) -> Self {
        Self::build(mail, None, ShopConfig::for_testing())
    }

    #[must_use]
    pub fn with_google(provider: ScriptedOAuthProvider) -> Self {
        Self::build(Mail::Recording, Some(provider), ShopConfig::for_testing())
    }

    #[must_use]
    pub fn build(mail: Mail, oauth: Option<ScriptedOAuthProvider>, config: ShopConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(RecordingMailer::new());
        let mailer: Option<Arc<dyn Mailer>> = match mail {
            Mail::Recording => Some(recorder.clone()),
            Mail::Failing => Some(Arc::new(FailingMailer)),
            Mail::Disabled => None,
        };
        let oauth = oauth.map(|p| Arc::new(p) as Arc<dyn OAuthProvider>);

        let session_layer = create_session_layer(MemoryStore::default(), &config).unwrap();
        let state = AppState::new(config, Stores::in_memory(&store), mailer, oauth);

        Self {
            router: routes::app(state, session_layer),
            store,
            mailer: recorder,
            next_ip: Arc::new(AtomicU32::new(1)),
        }
    }

    /// A client with an empty cookie jar and its own client address.
    #[must_use]
    pub fn client(&self) -> TestClient {
        let n = self.next_ip.fetch_add(1, Ordering::Relaxed);
        let [_, a, b, c] = n.to_be_bytes();
        TestClient {
            router: self.router.clone(),
            cookie: None,
            ip: format!("10.{a}.{b}.{c}"),
        }
    }

    /// Mail captured by the recording mailer.
    #[must_use]
    pub fn sent_mail(&self) -> Vec<OutgoingEmail> {
        self.mailer.sent()
    }

    #[must_use]
    pub fn latest_code_for(&self, email: &str) -> Option<String> {
        self.mailer.latest_code_for(email)
    }

    /// Insert a password account that logged in just now.
    pub async fn seed_user(&self, username: &str, email: &str, flags: Flags) -> User {
        let mut user = NewUser::with_password(
            Username::parse(username).unwrap(),
            Some(Email::parse(email).unwrap()),
            hash_password(PASSWORD).unwrap(),
        );
        user.is_verified = flags.verified;
        user.is_admin_verified = flags.admin_verified;
        user.is_admin = flags.admin;
        user.last_login_at = Some(Utc::now());
        UserStore::create(self.store.as_ref(), user).await.unwrap()
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Product {
        ProductStore::create(
            self.store.as_ref(),
            NewProduct {
                name: name.to_owned(),
                description: None,
                image_url: "https://img.test/p.png".to_owned(),
                price: Price::new(price).unwrap(),
                stock,
            },
        )
        .await
        .unwrap()
    }

    /// A client signed in with the seeded password.
    pub async fn signed_in(&self, username: &str) -> TestClient {
        let mut client = self.client();
        let res = client
            .post_json(
                "/api/login",
                &serde_json::json!({ "username": username, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.text());
        client
    }
}

/// A browser-like client: keeps the session cookie between requests.
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
    ip: String,
}

impl TestClient {
    /// Pin the client address, e.g. to exercise the rate limiter.
    #[must_use]
    pub fn with_ip(mut self, ip: &str) -> Self {
        ip.clone_into(&mut self.ip);
        self
    }

    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.cookie.is_some()
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None).await
    }

    pub async fn post_json(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put_json(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch_json(&mut self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    async fn send(&mut self, method: Method, uri: &str, body: Option<&Value>) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.ip);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(json).unwrap())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        self.store_cookie(response.headers());

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    fn store_cookie(&mut self, headers: &HeaderMap) {
        let prefix = format!("{SESSION_COOKIE_NAME}=");
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Some(pair) = raw.split(';').next().filter(|p| p.starts_with(&prefix)) else {
                continue;
            };
            let removed = pair.len() == prefix.len() || raw.contains("Max-Age=0");
            self.cookie = (!removed).then(|| pair.to_owned());
        }
    }
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("not JSON ({e}): {}", self.text()))
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Location` of a redirect.
    #[must_use]
    pub fn location(&self) -> &str {
        self.header("location").unwrap_or_default()
    }

    /// The `error` field of a JSON error body.
    #[must_use]
    pub fn error(&self) -> String {
        self.json()["error"].as_str().unwrap_or_default().to_owned()
    }
}
