//! Postgres schema for the persistent stores.
//!
//! Statements are idempotent and run on every startup.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS bridge_credentials (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL,
        token TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('active', 'revoked')),
        last_version TEXT,
        last_info JSONB,
        last_heartbeat_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS bridge_credentials_account_idx
        ON bridge_credentials (account_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fiscal_printer_jobs (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL,
        sale_id UUID,
        return_id UUID,
        operation_type TEXT NOT NULL DEFAULT 'sale',
        provider TEXT NOT NULL,
        request_data JSONB NOT NULL,
        response_data JSONB,
        status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
        picked_up_at TIMESTAMPTZ,
        retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
        next_retry_at TIMESTAMPTZ,
        error_message TEXT,
        reaped_at TIMESTAMPTZ,
        fiscal_number TEXT,
        fiscal_document_id TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ,
        CHECK ((status = 'processing') = (picked_up_at IS NOT NULL))
    )
    "#,
    r#"
    ALTER TABLE fiscal_printer_jobs ADD COLUMN IF NOT EXISTS reaped_at TIMESTAMPTZ
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS fiscal_printer_jobs_poll_idx
        ON fiscal_printer_jobs (account_id, status, created_at, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fiscal_printer_configs (
        account_id UUID PRIMARY KEY,
        provider TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        settings JSONB NOT NULL DEFAULT '{}'::jsonb,
        shift_open BOOLEAN NOT NULL DEFAULT FALSE,
        shift_opened_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Create tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(tables = 3, "database schema ensured");
    Ok(())
}
