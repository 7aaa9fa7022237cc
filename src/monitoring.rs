// src/monitoring.rs
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::future::LocalBoxFuture;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::time::{interval, sleep, Duration};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub response_times: Arc<std::sync::Mutex<Vec<u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            response_times: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, time_ms: u64) {
        if let Ok(mut times) = self.response_times.lock() {
            times.push(time_ms);
            if times.len() > 1000 {
                times.remove(0);
            }
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub requests_total: u64,
    pub errors_total: u64,
    pub avg_response_time_ms: f64,
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn readiness_check(pool: web::Data<SqlitePool>) -> HttpResponse {
    match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        })),
        Err(_) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not ready",
            "database": "disconnected"
        })),
    }
}

pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "alive",
        "timestamp": Utc::now()
    }))
}

pub async fn metrics_endpoint(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    let request_count = metrics.request_count.load(Ordering::Relaxed);
    let error_count = metrics.error_count.load(Ordering::Relaxed);

    let avg_response_time = if let Ok(times) = metrics.response_times.lock() {
        if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<u64>() as f64 / times.len() as f64
        }
    } else {
        0.0
    };

    HttpResponse::Ok().json(MetricsResponse {
        requests_total: request_count,
        errors_total: error_count,
        avg_response_time_ms: avg_response_time,
    })
}

pub struct RequestLogger {
    metrics: Arc<Metrics>,
}

impl RequestLogger {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> actix_web::dev::Transform<S, actix_web::dev::ServiceRequest> for RequestLogger
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerMiddleware {
            service,
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    metrics: Arc<Metrics>,
}

impl<S, B> actix_web::dev::Service<actix_web::dev::ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: actix_web::dev::ServiceRequest) -> Self::Future {
        let start_time = std::time::Instant::now();
        let metrics = self.metrics.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            metrics.increment_requests();
            let res = fut.await;
            let elapsed = start_time.elapsed().as_millis() as u64;
            metrics.record_response_time(elapsed);

            if let Ok(ref response) = res {
                if response.status().is_client_error() || response.status().is_server_error() {
                    metrics.increment_errors();
                }
            }
            res
        })
    }
}

// ==================== BACKGROUND MAINTENANCE ====================

pub async fn start_maintenance_tasks(pool: SqlitePool) {
    let expiry_pool = pool.clone();
    let cleanup_pool = pool.clone();

    tokio::spawn(async move {
        expire_overdue_contracts(expiry_pool).await;
    });

    tokio::spawn(async move {
        cleanup_stale_activation_tokens(cleanup_pool).await;
    });
}

/// Hourly sweep marking active contracts past their expiry date as
/// expired, in chunks so a huge backlog cannot hold a write lock.
async fn expire_overdue_contracts(pool: SqlitePool) {
    let mut interval = interval(Duration::from_secs(3600));

    loop {
        interval.tick().await;
        match run_contract_expiry_sweep(&pool).await {
            Ok(0) => {}
            Ok(updated) => log::info!("Marked {} contract(s) as expired", updated),
            Err(e) => log::error!("Contract expiry sweep aborted: {}", e),
        }
    }
}

/// One full sweep over the overdue backlog. Any error aborts the sweep;
/// the next hourly tick starts over. A failing chunk must never retry
/// in a tight loop against the same rows.
pub async fn run_contract_expiry_sweep(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let mut total_updated = 0;

    loop {
        let contract_ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT id FROM contracts
               WHERE status = 'active'
               AND date(expiry_date) < date('now')
               LIMIT 1000"#,
        )
        .fetch_all(pool)
        .await?;

        if contract_ids.is_empty() {
            return Ok(total_updated);
        }

        let query = format!(
            "UPDATE contracts SET status = 'expired', updated_at = datetime('now') WHERE id IN ({})",
            contract_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",")
        );
        let mut q = sqlx::query(&query);
        for id in &contract_ids {
            q = q.bind(id);
        }
        q.execute(pool).await?;
        total_updated += contract_ids.len();

        sleep(Duration::from_millis(50)).await;
    }
}

/// Daily cleanup clearing activation tokens older than 7 days on
/// accounts that were never activated. The account stays; the admin can
/// issue a fresh invitation.
async fn cleanup_stale_activation_tokens(pool: SqlitePool) {
    let mut interval = interval(Duration::from_secs(24 * 3600));

    loop {
        interval.tick().await;

        let result = sqlx::query(
            r#"UPDATE users SET
                activation_token = NULL,
                activation_token_created_at = NULL,
                temporary_password_hash = NULL,
                updated_at = datetime('now')
               WHERE is_active = 0
               AND activation_token IS NOT NULL
               AND activation_token_created_at < datetime('now', '-7 days')"#,
        )
        .execute(&pool)
        .await;

        match result {
            Ok(res) if res.rows_affected() > 0 => {
                log::info!("Cleared {} stale activation token(s)", res.rows_affected());
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("Failed to clear stale activation tokens: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn insert_supplier(pool: &SqlitePool, id: &str) {
        sqlx::query(
            r#"INSERT INTO suppliers (id, name, supplier_kind, category_kind, active, created_at, updated_at)
               VALUES (?, ?, 'local', 'goods', 1, datetime('now'), datetime('now'))"#,
        )
        .bind(id)
        .bind(format!("Supplier {}", id))
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_contract(pool: &SqlitePool, id: &str, status: &str, expiry_date: &str) {
        sqlx::query(
            r#"INSERT INTO contracts (id, number, subject, kind, amount, expiry_date,
                                      supplier_id, status, created_at, updated_at)
               VALUES (?, ?, 'Maintenance services', 'service', 1000.0, ?, 's1', ?,
                       datetime('now'), datetime('now'))"#,
        )
        .bind(id)
        .bind(format!("CTR-{}", id))
        .bind(expiry_date)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_expiry_sweep_marks_only_overdue_active_contracts() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1").await;
        insert_contract(&pool, "c1", "active", "2020-01-01").await;
        insert_contract(&pool, "c2", "active", "2099-01-01").await;
        insert_contract(&pool, "c3", "pending", "2020-01-01").await;

        let updated = run_contract_expiry_sweep(&pool).await.unwrap();
        assert_eq!(updated, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM contracts WHERE id = 'c1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "expired");

        let status: String = sqlx::query_scalar("SELECT status FROM contracts WHERE id = 'c2'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "active");

        let status: String = sqlx::query_scalar("SELECT status FROM contracts WHERE id = 'c3'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "pending");

        // nothing left for the next sweep
        assert_eq!(run_contract_expiry_sweep(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expiry_sweep_aborts_when_update_fails() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1").await;
        insert_contract(&pool, "c1", "active", "2020-01-01").await;

        // The UPDATE fails while the SELECT keeps returning the same rows.
        // The sweep must surface the error instead of retrying the chunk.
        sqlx::query(
            r#"CREATE TRIGGER contracts_update_blocked BEFORE UPDATE ON contracts
               BEGIN SELECT RAISE(ABORT, 'update blocked'); END"#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = run_contract_expiry_sweep(&pool).await;
        assert!(result.is_err());

        let status: String = sqlx::query_scalar("SELECT status FROM contracts WHERE id = 'c1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "active");
    }
}
