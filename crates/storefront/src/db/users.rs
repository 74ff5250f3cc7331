//! User repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use modernshop_core::{Email, UserId};

use super::{RepositoryError, UserStore, map_unique_violation};
use crate::models::{NewUser, User, UserUpdate};

/// Every column of `shop.users`, in `User` field order.
macro_rules! user_columns {
    () => {
        "id, username, email, password_hash, google_id, display_name, phone, \
         is_verified, is_admin_verified, is_admin, must_change_password, \
         otp_code, otp_expires_at, last_login_at, created_at, updated_at"
    };
}

/// Postgres-backed [`UserStore`].
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "INSERT INTO shop.users (username, email, password_hash, google_id, display_name, \
             phone, is_verified, is_admin_verified, is_admin, must_change_password, \
             otp_code, otp_expires_at, last_login_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING ",
            user_columns!()
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.display_name)
        .bind(&user.phone)
        .bind(user.is_verified)
        .bind(user.is_admin_verified)
        .bind(user.is_admin)
        .bind(user.must_change_password)
        .bind(&user.otp_code)
        .bind(user.otp_expires_at)
        .bind(user.last_login_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.users WHERE google_id = $1"
        ))
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn set_otp(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.users SET otp_code = $2, otp_expires_at = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn consume_otp(
        &self,
        id: UserId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        // Single statement: two concurrent submissions cannot both succeed.
        let user = sqlx::query_as::<_, User>(concat!(
            "UPDATE shop.users \
             SET otp_code = NULL, otp_expires_at = NULL, last_login_at = $3, \
                 is_verified = TRUE, updated_at = now() \
             WHERE id = $1 AND otp_code = $2 AND otp_expires_at > $3 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn record_login(
        &self,
        id: UserId,
        at: DateTime<Utc>,
        mark_verified: bool,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "UPDATE shop.users \
             SET last_login_at = $2, is_verified = is_verified OR $3, updated_at = now() \
             WHERE id = $1 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(at)
        .bind(mark_verified)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.users \
             SET password_hash = $2, must_change_password = FALSE, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_admin_verification(
        &self,
        id: UserId,
        verified: bool,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "UPDATE shop.users \
             SET is_admin_verified = $2, is_verified = $2, updated_at = now() \
             WHERE id = $1 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(verified)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, id: UserId, update: UserUpdate) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(concat!(
            "UPDATE shop.users \
             SET email = COALESCE($2, email), \
                 is_verified = COALESCE($3, is_verified), \
                 is_admin = COALESCE($4, is_admin), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(&update.email)
        .bind(update.is_verified)
        .bind(update.is_admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?
        .ok_or(RepositoryError::NotFound)
    }

    async fn delete_with_orders(&self, ids: &[UserId]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let raw: Vec<i32> = ids.iter().map(UserId::as_i32).collect();

        let mut tx = self.pool.begin().await?;

        // Every order that was not cancelled still holds a unit of stock.
        sqlx::query(
            "UPDATE shop.products p SET stock = p.stock + o.held \
             FROM ( \
                 SELECT product_id, COUNT(*)::INT AS held FROM shop.orders \
                 WHERE user_id = ANY($1) AND status <> 'cancelled' AND product_id IS NOT NULL \
                 GROUP BY product_id \
             ) o \
             WHERE p.id = o.product_id",
        )
        .bind(&raw)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM shop.orders WHERE user_id = ANY($1)")
            .bind(&raw)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM shop.users WHERE id = ANY($1)")
            .bind(&raw)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }
}
