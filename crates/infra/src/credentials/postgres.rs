//! Postgres-backed bridge credential store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use fiscalbridge_auth::{BridgeCredential, BridgeHeartbeat, BridgeToken, CredentialStatus};
use fiscalbridge_core::{AccountId, BridgeId};

use super::store::{CredentialStore, CredentialStoreError};

const CREDENTIAL_COLUMNS: &str = r#"
    id, account_id, token, name, status, last_version, last_info,
    last_heartbeat_at, created_at, revoked_at
"#;

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, credential), fields(account_id = %credential.account_id, bridge_id = %credential.id), err)]
    async fn insert(&self, credential: BridgeCredential) -> Result<BridgeCredential, CredentialStoreError> {
        sqlx::query(
            r#"
            INSERT INTO bridge_credentials (
                id, account_id, token, name, status, last_version, last_info,
                last_heartbeat_at, created_at, revoked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(credential.id.as_uuid())
        .bind(credential.account_id.as_uuid())
        .bind(credential.token.as_str())
        .bind(&credential.name)
        .bind(credential.status.as_str())
        .bind(credential.last_version.as_deref())
        .bind(credential.last_info.as_ref())
        .bind(credential.last_heartbeat_at)
        .bind(credential.created_at)
        .bind(credential.revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CredentialStoreError::AlreadyExists(credential.id)
            }
            other => map_sqlx_error("insert", other),
        })?;

        Ok(credential)
    }

    // Not instrumented with arguments: the token is a secret.
    #[instrument(skip_all, err)]
    async fn authenticate(
        &self,
        token: &str,
        heartbeat: &BridgeHeartbeat,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE bridge_credentials SET
                last_version = COALESCE($2, last_version),
                last_info = COALESCE($3, last_info),
                last_heartbeat_at = $4
            WHERE token = $1 AND status = 'active'
            RETURNING {CREDENTIAL_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(heartbeat.version.as_deref())
        .bind(heartbeat.info.as_ref())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("authenticate", e))?;

        row.as_ref().map(credential_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id, bridge_id = %bridge_id), err)]
    async fn get(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM bridge_credentials WHERE id = $1 AND account_id = $2"
        ))
        .bind(bridge_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(credential_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list(&self, account_id: AccountId) -> Result<Vec<BridgeCredential>, CredentialStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CREDENTIAL_COLUMNS} FROM bridge_credentials
            WHERE account_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(credential_from_row).collect()
    }

    #[instrument(skip(self), fields(account_id = %account_id, bridge_id = %bridge_id), err)]
    async fn revoke(
        &self,
        account_id: AccountId,
        bridge_id: BridgeId,
        now: DateTime<Utc>,
    ) -> Result<Option<BridgeCredential>, CredentialStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE bridge_credentials SET
                status = 'revoked',
                revoked_at = COALESCE(revoked_at, $3)
            WHERE id = $1 AND account_id = $2
            RETURNING {CREDENTIAL_COLUMNS}
            "#
        ))
        .bind(bridge_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke", e))?;

        row.as_ref().map(credential_from_row).transpose()
    }
}

fn credential_from_row(row: &PgRow) -> Result<BridgeCredential, CredentialStoreError> {
    let status: String = row.try_get("status").map_err(row_error)?;
    let token: String = row.try_get("token").map_err(row_error)?;

    Ok(BridgeCredential {
        id: BridgeId::from(row.try_get::<Uuid, _>("id").map_err(row_error)?),
        account_id: AccountId::from(row.try_get::<Uuid, _>("account_id").map_err(row_error)?),
        token: BridgeToken::new(token),
        name: row.try_get("name").map_err(row_error)?,
        status: CredentialStatus::parse(&status).ok_or_else(|| {
            CredentialStoreError::Storage(format!("unknown credential status {status:?}"))
        })?,
        last_version: row.try_get("last_version").map_err(row_error)?,
        last_info: row.try_get("last_info").map_err(row_error)?,
        last_heartbeat_at: row.try_get("last_heartbeat_at").map_err(row_error)?,
        created_at: row.try_get("created_at").map_err(row_error)?,
        revoked_at: row.try_get("revoked_at").map_err(row_error)?,
    })
}

fn row_error(err: sqlx::Error) -> CredentialStoreError {
    CredentialStoreError::Storage(format!("failed to decode credential row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CredentialStoreError {
    match err {
        sqlx::Error::Database(db_err) => CredentialStoreError::Storage(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            CredentialStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => CredentialStoreError::Storage(format!("{operation} failed: {other}")),
    }
}
