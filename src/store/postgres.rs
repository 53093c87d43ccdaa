//! Postgres-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenFilter, RefreshTokenStore, UserStore};
use crate::domain::{Credential, NewRefreshTokenRecord, NewUser, RefreshTokenRecord, User};
use crate::error::AppError;

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_USER: &str = r#"
    INSERT INTO users (id, email, email_verified, verification_token, name, user_type, deleted, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    "#;

const INSERT_CREDENTIAL: &str = r#"
    INSERT INTO user_credentials (id, user_id, password_hash)
    VALUES ($1, $2, $3)
    RETURNING id, user_id, password_hash
    "#;

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let user = new_user.into_user();

        sqlx::query(INSERT_USER)
            .bind(user.id)
            .bind(&user.email)
            .bind(user.email_verified)
            .bind(&user.verification_token)
            .bind(&user.name)
            .bind(&user.user_type)
            .bind(user.deleted)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, email_verified, verification_token, name, user_type, deleted, created_at
            FROM users
            WHERE email = $1 AND deleted = false
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, email_verified, verification_token, name, user_type, deleted, created_at
            FROM users
            WHERE id = $1 AND deleted = false
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_credential(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<Credential, AppError> {
        let credential = sqlx::query_as::<_, Credential>(INSERT_CREDENTIAL)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(credential)
    }

    async fn find_credential(&self, user_id: Uuid) -> Result<Option<Credential>, AppError> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, user_id, password_hash FROM user_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    /// Both rows are written in one transaction, so no orphaned user survives
    /// a failed credential insert.
    async fn create_user_with_credential(
        &self,
        new_user: NewUser,
        password_hash: String,
    ) -> Result<User, AppError> {
        let user = new_user.into_user();
        let mut tx = self.pool.begin().await?;

        sqlx::query(INSERT_USER)
            .bind(user.id)
            .bind(&user.email)
            .bind(user.email_verified)
            .bind(&user.verification_token)
            .bind(&user.name)
            .bind(&user.user_type)
            .bind(user.deleted)
            .bind(user.created_at)
            .execute(&mut tx)
            .await?;

        sqlx::query(INSERT_CREDENTIAL)
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(password_hash)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Unset filter fields bind as NULL and match every row.
const FILTER_CLAUSE: &str = r#"
    ($1::uuid IS NULL OR user_id = $1)
    AND ($2::text IS NULL OR user_agent = $2)
    AND ($3::text IS NULL OR refresh_token = $3)
    "#;

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, record: NewRefreshTokenRecord) -> Result<RefreshTokenRecord, AppError> {
        let record = record.into_record();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, refresh_token, user_agent, created, refreshed)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.refresh_token)
        .bind(&record.user_agent)
        .bind(record.created)
        .bind(record.refreshed)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_one(
        &self,
        filter: &RefreshTokenFilter,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let query = format!(
            "SELECT id, user_id, refresh_token, user_agent, created, refreshed \
             FROM refresh_tokens WHERE {} ORDER BY created LIMIT 1",
            FILTER_CLAUSE
        );

        let record = sqlx::query_as::<_, RefreshTokenRecord>(&query)
            .bind(filter.user_id)
            .bind(&filter.user_agent)
            .bind(&filter.refresh_token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn delete_all(&self, filter: &RefreshTokenFilter) -> Result<u64, AppError> {
        let query = format!("DELETE FROM refresh_tokens WHERE {}", FILTER_CLAUSE);

        let result = sqlx::query(&query)
            .bind(filter.user_id)
            .bind(&filter.user_agent)
            .bind(&filter.refresh_token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn touch_refreshed(
        &self,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET refreshed = $1 WHERE refresh_token = $2")
                .bind(at)
                .bind(refresh_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
