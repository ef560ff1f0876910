use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use fiscalbridge_auth::BridgeHeartbeat;
use fiscalbridge_core::{AccountId, Clock, ManualClock, SaleId};
use fiscalbridge_fiscal::{
    FiscalPrinterConfig, JobStatus, NewFiscalJob, OperationType, ProviderId, ShiftStatus,
    ShiftUpdate,
};

use super::*;
use crate::config::DispatchConfig;
use crate::credentials::InMemoryCredentialStore;
use crate::jobs::InMemoryFiscalJobStore;
use crate::printers::{ConfigStoreError, PrinterConfigStore};
use crate::shift_cache::{CacheError, InMemoryShiftStatusCache, ShiftStatusCache};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-05T06:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Harness {
    service: DispatchService,
    clock: Arc<ManualClock>,
    printers: Arc<dyn PrinterConfigStore>,
    account: AccountId,
    token: String,
}

impl Harness {
    async fn new() -> Self {
        Self::with_stores(|stores| stores).await
    }

    async fn with_stores(customize: impl FnOnce(DispatchStores) -> DispatchStores) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let config = DispatchConfig::default();
        let stores = customize(DispatchStores::in_memory(&config, clock.clone()));
        let printers = stores.printers.clone();
        let service = DispatchService::new(stores, config, clock.clone());

        let account = AccountId::new();
        let credential = service.provision_bridge(account, "Front desk").await.unwrap();

        Self {
            service,
            clock,
            printers,
            account,
            token: credential.token.as_str().to_string(),
        }
    }

    async fn sale_job(&self) -> fiscalbridge_fiscal::FiscalPrinterJob {
        self.service
            .enqueue(
                self.account,
                NewFiscalJob::sale(
                    SaleId::new(),
                    ProviderId::new("generic"),
                    serde_json::json!({"total": 1250}),
                ),
            )
            .await
            .unwrap()
    }

    async fn configure_printer(&self) {
        self.service
            .upsert_printer_config(
                self.account,
                "generic".into(),
                serde_json::json!({"device": "COM3"}),
                true,
            )
            .await
            .unwrap();
    }

    fn advance(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }
}

fn fn001() -> CompleteJob {
    CompleteJob {
        fiscal_number: Some("FN-001".into()),
        fiscal_document_id: Some("DOC-1".into()),
        response: Some(serde_json::json!({"raw": "OK 0001"})),
    }
}

fn failure(error: &str) -> FailJob {
    FailJob {
        error: Some(error.into()),
        response: None,
    }
}

#[tokio::test]
async fn transient_failure_is_retried_then_completed() {
    let h = Harness::new().await;
    let job = h.sale_job().await;

    let polled = h.service.poll(h.account).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].id, job.id);

    let (failed, outcome) = h
        .service
        .fail(h.account, job.id, failure("Printer offline"))
        .await
        .unwrap();
    assert!(outcome.is_retriable);
    assert!(outcome.can_retry);
    assert_eq!(failed.status, JobStatus::Pending);
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.next_retry_at, Some(t0() + Duration::seconds(30)));

    // Not eligible during the back-off window.
    h.advance(29);
    assert!(h.service.poll(h.account).await.unwrap().is_empty());

    h.advance(1);
    let polled = h.service.poll(h.account).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].retry_count, 1);

    let done = h.service.complete(h.account, job.id, fn001()).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.fiscal_number.as_deref(), Some("FN-001"));
    assert_eq!(done.response_data, Some(serde_json::json!({"raw": "OK 0001"})));
    assert!(done.picked_up_at.is_none());
    assert!(done.next_retry_at.is_none());
}

#[tokio::test]
async fn stuck_job_is_reaped_before_selection() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    h.advance(6 * 60);
    let reap_time = h.clock.now();

    // The reaped job is cooling down, so this poll returns nothing.
    assert!(h.service.poll(h.account).await.unwrap().is_empty());

    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert!(stored.picked_up_at.is_none());
    assert_eq!(stored.next_retry_at, Some(reap_time + Duration::seconds(30)));
    assert_eq!(stored.retry_count, 0);

    h.advance(30);
    let polled = h.service.poll(h.account).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].id, job.id);
}

#[tokio::test]
async fn duplicate_document_fails_permanently() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    let (failed, outcome) = h
        .service
        .fail(h.account, job.id, failure("Duplicate fiscal document 12345"))
        .await
        .unwrap();

    assert!(!outcome.is_retriable);
    assert!(!outcome.can_retry);
    assert_eq!(failed.status, JobStatus::Failed);

    h.advance(3600);
    assert!(h.service.poll(h.account).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_ceiling_fails_the_job() {
    let h = Harness::new().await;
    let job = h.sale_job().await;

    for attempt in 1..=3u32 {
        let polled = h.service.poll(h.account).await.unwrap();
        assert_eq!(polled.len(), 1, "attempt {attempt}");
        let (_, outcome) = h
            .service
            .fail(h.account, job.id, failure("Paper out"))
            .await
            .unwrap();
        assert_eq!(outcome.retry_count, attempt);
        assert_eq!(outcome.can_retry, attempt < 3);
        h.advance(31);
    }

    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("Paper out"));
}

#[tokio::test]
async fn terminal_jobs_answer_not_found() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();
    h.service.complete(h.account, job.id, fn001()).await.unwrap();

    let again = CompleteJob {
        fiscal_number: Some("FN-002".into()),
        ..Default::default()
    };
    assert!(matches!(
        h.service.complete(h.account, job.id, again).await,
        Err(DispatchError::NotFound(_))
    ));
    assert!(matches!(
        h.service.fail(h.account, job.id, failure("Printer offline")).await,
        Err(DispatchError::NotFound(_))
    ));

    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.fiscal_number.as_deref(), Some("FN-001"));
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn required_fields_are_validated() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    let err = h
        .service
        .complete(h.account, job.id, CompleteJob::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation { field: Some(ref f), .. } if f == "fiscal_number"));

    let err = h
        .service
        .fail(h.account, job.id, FailJob::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation { field: Some(ref f), .. } if f == "error"));

    let err = h
        .service
        .push_status(
            h.account,
            PushStatus {
                shift_open: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation { field: Some(ref f), .. } if f == "provider"));

    // Nothing above changed the job.
    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.retry_count, 0);
}

#[tokio::test]
async fn jobs_are_invisible_to_other_accounts() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    let other = AccountId::new();

    assert!(h.service.poll(other).await.unwrap().is_empty());
    assert!(matches!(
        h.service.complete(other, job.id, fn001()).await,
        Err(DispatchError::NotFound(_))
    ));
    assert!(matches!(
        h.service.job_status(other, job.id).await,
        Err(DispatchError::NotFound(_))
    ));
}

#[tokio::test]
async fn late_completion_after_reap_is_accepted() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    h.advance(6 * 60);
    h.service.poll(h.account).await.unwrap();

    let done = h.service.complete(h.account, job.id, fn001()).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    h.advance(60);
    assert!(h.service.poll(h.account).await.unwrap().is_empty());
}

#[tokio::test]
async fn resent_failure_does_not_consume_the_retry_budget() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    h.service
        .fail(h.account, job.id, failure("Printer offline"))
        .await
        .unwrap();
    for _ in 0..2 {
        assert!(matches!(
            h.service.fail(h.account, job.id, failure("Printer offline")).await,
            Err(DispatchError::NotFound(_))
        ));
    }

    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.retry_count, 1);

    // A retry-scheduled job is not a reaped one: completion waits for the next claim.
    assert!(matches!(
        h.service.complete(h.account, job.id, fn001()).await,
        Err(DispatchError::NotFound(_))
    ));

    h.advance(30);
    let polled = h.service.poll(h.account).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].retry_count, 1);
}

#[tokio::test]
async fn reaped_job_must_be_claimed_again_before_failing() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    h.advance(6 * 60);
    h.service.poll(h.account).await.unwrap();

    assert!(matches!(
        h.service.fail(h.account, job.id, failure("Printer offline")).await,
        Err(DispatchError::NotFound(_))
    ));
    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.retry_count, 0);
    assert!(stored.reaped_at.is_some());
}

#[tokio::test]
async fn shift_jobs_cannot_complete_as_sales() {
    let h = Harness::new().await;
    h.configure_printer().await;

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftOpen)
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();

    assert!(matches!(
        h.service.complete(h.account, job.id, fn001()).await,
        Err(DispatchError::NotFound(_))
    ));
    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert!(stored.fiscal_number.is_none());

    h.service
        .complete_shift_operation(h.account, job.id, Some(serde_json::json!({"shift_open": true})))
        .await
        .unwrap();
    let view = h.service.shift_status(h.account).await;
    assert!(view.online);
    assert_eq!(view.shift_open, Some(true));
}

#[tokio::test]
async fn configured_phrases_fail_permanently() {
    let clock = Arc::new(ManualClock::new(t0()));
    let config = DispatchConfig {
        failure_classifier: fiscalbridge_fiscal::FailureClassifier::default()
            .with_pattern("invalid tin"),
        ..DispatchConfig::default()
    };
    let service = DispatchService::new(DispatchStores::in_memory(&config, clock.clone()), config, clock);
    let account = AccountId::new();
    let job = service
        .enqueue(
            account,
            NewFiscalJob::sale(SaleId::new(), ProviderId::new("generic"), serde_json::json!({})),
        )
        .await
        .unwrap();
    service.poll(account).await.unwrap();

    let (failed, outcome) = service
        .fail(account, job.id, failure("Invalid TIN for buyer"))
        .await
        .unwrap();
    assert!(!outcome.is_retriable);
    assert_eq!(failed.status, JobStatus::Failed);
}

#[tokio::test]
async fn authentication_and_heartbeat() {
    let h = Harness::new().await;

    let registration = h
        .service
        .register(
            &h.token,
            &BridgeHeartbeat {
                version: Some("1.4.2".into()),
                info: Some(serde_json::json!({"host": "POS-1"})),
            },
        )
        .await
        .unwrap();
    assert_eq!(registration.account_id, h.account);
    assert_eq!(registration.bridge_name, "Front desk");
    assert_eq!(registration.poll_interval_ms, 2000);

    h.advance(5);
    let at = h
        .service
        .heartbeat(&h.token, &BridgeHeartbeat::default())
        .await
        .unwrap();
    assert_eq!(at, h.clock.now());

    let bridges = h.service.list_bridges(h.account).await.unwrap();
    assert_eq!(bridges[0].last_version.as_deref(), Some("1.4.2"));
    assert_eq!(bridges[0].last_heartbeat_at, Some(h.clock.now()));

    h.service
        .revoke_bridge(h.account, registration.bridge_id)
        .await
        .unwrap();
    assert!(matches!(
        h.service.authenticate(&h.token, &BridgeHeartbeat::default()).await,
        Err(DispatchError::Unauthorized)
    ));
    assert!(matches!(
        h.service.authenticate("", &BridgeHeartbeat::default()).await,
        Err(DispatchError::Unauthorized)
    ));
}

#[tokio::test]
async fn shift_open_job_updates_cache_and_config() {
    let h = Harness::new().await;
    h.configure_printer().await;

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftOpen)
        .await
        .unwrap();
    assert_eq!(job.request_data["command"], "shift_open");
    assert!(job.sale_id.is_none());

    h.service.poll(h.account).await.unwrap();
    h.service
        .complete_shift_operation(
            h.account,
            job.id,
            Some(serde_json::json!({"shift_opened_at": "05.01.2026 09:15:00"})),
        )
        .await
        .unwrap();

    // Dotted v1 format, merchant offset +03:00.
    let opened_at = t0() + Duration::minutes(15);
    let view = h.service.shift_status(h.account).await;
    assert!(view.online);
    assert_eq!(view.shift_open, Some(true));
    assert_eq!(view.shift_opened_at, Some(opened_at));

    let config = h.printers.get_active(h.account).await.unwrap().unwrap();
    assert!(config.shift_open);
    assert_eq!(config.shift_opened_at, Some(opened_at));
}

#[tokio::test]
async fn shift_open_without_reported_time_uses_completion_time() {
    let h = Harness::new().await;
    h.configure_printer().await;

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftOpen)
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();
    h.advance(10);
    h.service
        .complete_shift_operation(h.account, job.id, Some(serde_json::json!({"shift_opened_at": "soon"})))
        .await
        .unwrap();

    let config = h.printers.get_active(h.account).await.unwrap().unwrap();
    assert_eq!(config.shift_opened_at, Some(h.clock.now()));
}

#[tokio::test]
async fn shift_close_clears_opened_at() {
    let h = Harness::new().await;
    h.configure_printer().await;

    h.service
        .push_status(
            h.account,
            PushStatus {
                shift_open: Some(true),
                shift_opened_at: Some("2026-01-05T09:00:00+03:00".into()),
                provider: Some("generic".into()),
            },
        )
        .await
        .unwrap();

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftClose)
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();
    h.service
        .complete_shift_operation(h.account, job.id, None)
        .await
        .unwrap();

    let view = h.service.shift_status(h.account).await;
    assert_eq!(view.shift_open, Some(false));
    assert!(view.shift_opened_at.is_none());
    assert_eq!(view.last_updated, Some(h.clock.now()));

    let config = h.printers.get_active(h.account).await.unwrap().unwrap();
    assert!(!config.shift_open);
    assert!(config.shift_opened_at.is_none());
}

#[tokio::test]
async fn shift_status_reply_without_flag_leaves_projection_alone() {
    let h = Harness::new().await;
    h.configure_printer().await;

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftStatus)
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();
    h.service
        .complete_shift_operation(h.account, job.id, Some(serde_json::json!({"raw": "STATUS 7"})))
        .await
        .unwrap();

    assert!(!h.service.shift_status(h.account).await.online);

    let job = h
        .service
        .request_shift_operation(h.account, OperationType::ShiftStatus)
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();
    h.service
        .complete_shift_operation(h.account, job.id, Some(serde_json::json!({"shift_open": true})))
        .await
        .unwrap();
    assert_eq!(h.service.shift_status(h.account).await.shift_open, Some(true));
}

#[tokio::test]
async fn complete_shift_rejects_sale_jobs() {
    let h = Harness::new().await;
    let job = h.sale_job().await;
    h.service.poll(h.account).await.unwrap();

    assert!(matches!(
        h.service.complete_shift_operation(h.account, job.id, None).await,
        Err(DispatchError::NotFound(_))
    ));
    let stored = h.service.job_status(h.account, job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
}

#[tokio::test]
async fn shift_status_request_needs_config_and_provider() {
    let h = Harness::new().await;
    assert!(matches!(
        h.service.shift_status_request(h.account).await,
        Err(DispatchError::NotFound(_))
    ));

    h.service
        .upsert_printer_config(h.account, "vendor-x".into(), serde_json::json!({}), true)
        .await
        .unwrap();
    assert!(matches!(
        h.service.shift_status_request(h.account).await,
        Err(DispatchError::NotFound(_))
    ));

    h.configure_printer().await;
    let request = h.service.shift_status_request(h.account).await.unwrap();
    assert_eq!(request["command"], "shift_status");
    assert_eq!(request["settings"]["device"], "COM3");
}

#[tokio::test]
async fn cache_expiry_reports_offline_not_closed() {
    let h = Harness::new().await;
    h.configure_printer().await;
    h.service
        .push_status(
            h.account,
            PushStatus {
                shift_open: Some(true),
                shift_opened_at: None,
                provider: Some("generic".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(h.service.shift_status(h.account).await.shift_open, Some(true));

    h.advance(121);
    let view = h.service.shift_status(h.account).await;
    assert!(!view.online);
    assert_eq!(view.shift_open, None);

    // The durable layer still knows.
    assert!(h.printers.get_active(h.account).await.unwrap().unwrap().shift_open);
}

struct BrokenCache;

#[async_trait]
impl ShiftStatusCache for BrokenCache {
    async fn put(&self, _: AccountId, _: &ShiftStatus) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn get(&self, _: AccountId) -> Result<Option<ShiftStatus>, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

struct BrokenPrinters;

#[async_trait]
impl PrinterConfigStore for BrokenPrinters {
    async fn get_active(&self, _: AccountId) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        Err(ConfigStoreError::Storage("db down".into()))
    }

    async fn get(&self, _: AccountId) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        Err(ConfigStoreError::Storage("db down".into()))
    }

    async fn upsert(&self, _: FiscalPrinterConfig) -> Result<FiscalPrinterConfig, ConfigStoreError> {
        Err(ConfigStoreError::Storage("db down".into()))
    }

    async fn apply_shift(
        &self,
        _: AccountId,
        _: &ShiftUpdate,
        _: DateTime<Utc>,
    ) -> Result<Option<FiscalPrinterConfig>, ConfigStoreError> {
        Err(ConfigStoreError::Storage("db down".into()))
    }
}

#[tokio::test]
async fn broken_cache_does_not_block_durable_write() {
    let h = Harness::with_stores(|mut stores| {
        stores.shift_cache = Arc::new(BrokenCache);
        stores
    })
    .await;
    h.configure_printer().await;

    h.service
        .push_status(
            h.account,
            PushStatus {
                shift_open: Some(true),
                shift_opened_at: Some("2026-01-05 09:30:00".into()),
                provider: Some("generic".into()),
            },
        )
        .await
        .unwrap();

    let config = h.printers.get_active(h.account).await.unwrap().unwrap();
    assert!(config.shift_open);
    assert_eq!(config.shift_opened_at, Some(t0() + Duration::minutes(30)));

    // Read errors degrade to "offline".
    let view = h.service.shift_status(h.account).await;
    assert!(!view.online);
    assert_eq!(view.shift_open, None);
}

#[tokio::test]
async fn broken_durable_layer_fails_push_but_fills_cache() {
    let clock = Arc::new(ManualClock::new(t0()));
    let config = DispatchConfig::default();
    let cache = Arc::new(InMemoryShiftStatusCache::new(config.shift_status_ttl, clock.clone()));
    let stores = DispatchStores {
        jobs: Arc::new(InMemoryFiscalJobStore::new()),
        credentials: Arc::new(InMemoryCredentialStore::new()),
        printers: Arc::new(BrokenPrinters),
        shift_cache: cache.clone(),
    };
    let service = DispatchService::new(stores, config, clock.clone());
    let account = AccountId::new();

    let err = service
        .push_status(
            account,
            PushStatus {
                shift_open: Some(false),
                shift_opened_at: None,
                provider: Some("generic".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));
    assert_eq!(cache.get(account).await.unwrap().map(|s| s.shift_open), Some(false));
}

#[tokio::test]
async fn shift_sync_failure_does_not_undo_completion() {
    let h = Harness::with_stores(|mut stores| {
        stores.shift_cache = Arc::new(BrokenCache);
        stores
    })
    .await;
    let job = h
        .service
        .enqueue(
            h.account,
            NewFiscalJob::shift(OperationType::ShiftClose, ProviderId::new("generic"), serde_json::json!({})),
        )
        .await
        .unwrap();
    h.service.poll(h.account).await.unwrap();

    // No printer config and a broken cache: completion still succeeds.
    let done = h
        .service
        .complete_shift_operation(h.account, job.id, None)
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn reconfiguring_printer_keeps_shift_state() {
    let h = Harness::new().await;
    h.configure_printer().await;
    h.service
        .push_status(
            h.account,
            PushStatus {
                shift_open: Some(true),
                shift_opened_at: None,
                provider: Some("generic".into()),
            },
        )
        .await
        .unwrap();

    let config = h
        .service
        .upsert_printer_config(h.account, "generic".into(), serde_json::json!({"device": "COM4"}), true)
        .await
        .unwrap();
    assert!(config.shift_open);
    assert_eq!(config.settings["device"], "COM4");
}

#[tokio::test]
async fn listing_and_stats() {
    let h = Harness::new().await;
    for _ in 0..3 {
        h.sale_job().await;
        h.advance(1);
    }
    h.service.poll(h.account).await.unwrap();
    h.sale_job().await;

    let stats = h.service.job_stats(h.account).await.unwrap();
    assert_eq!(stats.processing, 3);
    assert_eq!(stats.pending, 1);

    let pending = h
        .service
        .list_jobs(h.account, Some(JobStatus::Pending), None)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let limited = h.service.list_jobs(h.account, None, Some(0)).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn invalid_job_requests_are_rejected() {
    let h = Harness::new().await;
    let mut request = NewFiscalJob::shift(
        OperationType::ShiftOpen,
        ProviderId::new("generic"),
        serde_json::json!({}),
    );
    request.sale_id = Some(SaleId::new());

    assert!(matches!(
        h.service.enqueue(h.account, request).await,
        Err(DispatchError::Validation { .. })
    ));
    assert!(matches!(
        h.service.request_shift_operation(h.account, OperationType::Sale).await,
        Err(DispatchError::Validation { .. })
    ));
    assert!(matches!(
        h.service.request_shift_operation(h.account, OperationType::ShiftOpen).await,
        Err(DispatchError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_polls_never_share_a_job() {
    let h = Harness::new().await;
    for _ in 0..12 {
        h.sale_job().await;
    }

    let service = Arc::new(h.service.clone());
    let mut handles = Vec::new();
    for _ in 0..6 {
        let service = service.clone();
        let account = h.account;
        handles.push(tokio::spawn(async move { service.poll(account).await.unwrap() }));
    }

    let mut seen = std::collections::HashSet::new();
    for handle in handles {
        let batch = handle.await.unwrap();
        assert!(batch.len() <= 5);
        for job in batch {
            assert!(seen.insert(job.id), "job {} handed out twice", job.id);
        }
    }
    assert_eq!(seen.len(), 12);
}
