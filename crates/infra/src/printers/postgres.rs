//! Postgres-backed printer config store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use fiscalbridge_core::AccountId;
use fiscalbridge_fiscal::{FiscalPrinterConfig, ProviderId, ShiftUpdate};

use super::store::{ConfigStoreError, PrinterConfigStore};

const CONFIG_COLUMNS: &str =
    "account_id, provider, is_active, settings, shift_open, shift_opened_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresPrinterConfigStore {
    pool: Arc<PgPool>,
}

impl PostgresPrinterConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PrinterConfigStore for PostgresPrinterConfigStore {
    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn get_active(
        &self,
        account_id: AccountId,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM fiscal_printer_configs WHERE account_id = $1 AND is_active"
        ))
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_active", e))?;

        row.as_ref().map(config_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn get(&self, account_id: AccountId) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM fiscal_printer_configs WHERE account_id = $1"
        ))
        .bind(account_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(config_from_row).transpose()
    }

    #[instrument(skip(self, config), fields(account_id = %config.account_id), err)]
    async fn upsert(&self, config: FiscalPrinterConfig) -> Result<FiscalPrinterConfig, ConfigStoreError> {
        sqlx::query(
            r#"
            INSERT INTO fiscal_printer_configs (
                account_id, provider, is_active, settings, shift_open, shift_opened_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_id) DO UPDATE SET
                provider = EXCLUDED.provider,
                is_active = EXCLUDED.is_active,
                settings = EXCLUDED.settings,
                shift_open = EXCLUDED.shift_open,
                shift_opened_at = EXCLUDED.shift_opened_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.account_id.as_uuid())
        .bind(config.provider.as_str())
        .bind(config.is_active)
        .bind(&config.settings)
        .bind(config.shift_open)
        .bind(config.shift_opened_at)
        .bind(config.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", e))?;

        Ok(config)
    }

    #[instrument(skip(self, update), fields(account_id = %account_id, shift_open = update.shift_open), err)]
    async fn apply_shift(
        &self,
        account_id: AccountId,
        update: &ShiftUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        // Same rule as `FiscalPrinterConfig::apply_shift`: closing clears the
        // opening time, opening without a time keeps the recorded one.
        let row = sqlx::query(&format!(
            r#"
            UPDATE fiscal_printer_configs SET
                shift_open = $2,
                shift_opened_at = CASE WHEN $2 THEN COALESCE($3, shift_opened_at) ELSE NULL END,
                updated_at = $4
            WHERE account_id = $1 AND is_active
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(update.shift_open)
        .bind(update.shift_opened_at)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("apply_shift", e))?;

        row.as_ref().map(config_from_row).transpose()
    }
}

fn config_from_row(row: &PgRow) -> Result<FiscalPrinterConfig, ConfigStoreError> {
    let provider: String = row.try_get("provider").map_err(row_error)?;
    Ok(FiscalPrinterConfig {
        account_id: AccountId::from(row.try_get::<Uuid, _>("account_id").map_err(row_error)?),
        provider: ProviderId::new(provider),
        is_active: row.try_get("is_active").map_err(row_error)?,
        settings: row.try_get("settings").map_err(row_error)?,
        shift_open: row.try_get("shift_open").map_err(row_error)?,
        shift_opened_at: row.try_get("shift_opened_at").map_err(row_error)?,
        updated_at: row.try_get("updated_at").map_err(row_error)?,
    })
}

fn row_error(err: sqlx::Error) -> ConfigStoreError {
    ConfigStoreError::Storage(format!("failed to decode printer config row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ConfigStoreError {
    match err {
        sqlx::Error::Database(db_err) => ConfigStoreError::Storage(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        other => ConfigStoreError::Storage(format!("{operation} failed: {other}")),
    }
}
