// src/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::get_current_user;
use crate::error::ApiResult;
use crate::models::{rating_badge, weighted_rating};
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub supplier_id: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }

    /// Builds an ORDER BY clause from `sort_by`/`sort_order`. Only columns in
    /// `allowed` are accepted, anything else falls back to `default`.
    pub fn order_clause(&self, allowed: &[&str], default: &str) -> String {
        let column = match self.sort_by.as_deref() {
            Some(col) if allowed.contains(&col) => col,
            _ => default,
        };
        let direction = match self.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("desc") => "DESC",
            _ => "ASC",
        };
        format!("{} {}", column, direction)
    }
}

// ==================== DASHBOARD ====================

#[derive(Debug, Serialize)]
pub struct ContractStatusCounts {
    pub pending: i64,
    pub active: i64,
    pub expired: i64,
    pub rejected: i64,
    pub suspended: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ContractSummary {
    pub id: String,
    pub number: String,
    pub subject: String,
    pub supplier_name: String,
    pub status: String,
    pub expiry_date: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EvaluationSummaryRow {
    pub id: String,
    pub supplier_name: String,
    pub final_rating: f64,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub contracts: ContractStatusCounts,
    pub total_suppliers: i64,
    pub active_suppliers: i64,
    pub vendor_evaluations: i64,
    pub buyer_evaluations: i64,
    pub evaluated_suppliers: i64,
    pub average_weighted_rating: f64,
    pub average_badge: &'static str,
    pub pending_validation: Vec<ContractSummary>,
}

#[derive(Debug, Serialize)]
pub struct CollaboratorDashboard {
    pub my_contracts: ContractStatusCounts,
    pub my_evaluations: i64,
    pub total_suppliers: i64,
    pub recent_contracts: Vec<ContractSummary>,
    pub recent_evaluations: Vec<EvaluationSummaryRow>,
}

/// The only capability check for the dashboard happens here; each variant
/// carries everything its view needs.
#[derive(Debug, Serialize)]
#[serde(tag = "view", content = "data", rename_all = "snake_case")]
pub enum DashboardView {
    Admin(AdminDashboard),
    Collaborator(CollaboratorDashboard),
}

pub async fn get_dashboard(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let pool = &app_state.db_pool;

    let view = if claims.role.is_admin() {
        DashboardView::Admin(admin_dashboard(pool).await?)
    } else {
        DashboardView::Collaborator(collaborator_dashboard(pool, &claims.sub).await?)
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(view)))
}

async fn contract_counts(
    pool: &sqlx::SqlitePool,
    created_by: Option<&str>,
) -> ApiResult<ContractStatusCounts> {
    let mut counts = ContractStatusCounts {
        pending: 0,
        active: 0,
        expired: 0,
        rejected: 0,
        suspended: 0,
    };

    let rows: Vec<(String, i64)> = match created_by {
        Some(user_id) => {
            sqlx::query_as(
                "SELECT status, COUNT(*) FROM contracts WHERE created_by = ? GROUP BY status",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT status, COUNT(*) FROM contracts GROUP BY status")
                .fetch_all(pool)
                .await?
        }
    };

    for (status, count) in rows {
        match status.as_str() {
            "pending" => counts.pending = count,
            "active" => counts.active = count,
            "expired" => counts.expired = count,
            "rejected" => counts.rejected = count,
            "suspended" => counts.suspended = count,
            _ => {}
        }
    }
    Ok(counts)
}

async fn admin_dashboard(pool: &sqlx::SqlitePool) -> ApiResult<AdminDashboard> {
    let contracts = contract_counts(pool, None).await?;

    let total_suppliers: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM suppliers")
        .fetch_one(pool)
        .await?;
    let active_suppliers: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM suppliers WHERE active = 1")
        .fetch_one(pool)
        .await?;
    let vendor_evaluations: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM supplier_evaluations")
        .fetch_one(pool)
        .await?;
    let buyer_evaluations: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM buyer_evaluations")
        .fetch_one(pool)
        .await?;
    let evaluated_suppliers: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM (
            SELECT supplier_id FROM supplier_evaluations
            UNION
            SELECT supplier_id FROM buyer_evaluations
        )"#,
    )
    .fetch_one(pool)
    .await?;

    // Average of per-supplier weighted ratings over rated suppliers
    let per_supplier: Vec<(Option<f64>, Option<f64>)> = sqlx::query_as(
        r#"SELECT
            (SELECT AVG(final_rating) FROM supplier_evaluations se WHERE se.supplier_id = s.id),
            (SELECT AVG(final_rating) FROM buyer_evaluations be WHERE be.supplier_id = s.id)
        FROM suppliers s"#,
    )
    .fetch_all(pool)
    .await?;

    let weighted: Vec<f64> = per_supplier
        .into_iter()
        .filter(|(v, b)| v.is_some() || b.is_some())
        .map(|(v, b)| weighted_rating(v.unwrap_or(0.0), b.unwrap_or(0.0)))
        .collect();
    let average_weighted_rating = if weighted.is_empty() {
        0.0
    } else {
        crate::models::round2(weighted.iter().sum::<f64>() / weighted.len() as f64)
    };

    let pending_validation: Vec<ContractSummary> = sqlx::query_as(
        r#"SELECT c.id, c.number, c.subject, s.name AS supplier_name, c.status, c.expiry_date
           FROM contracts c
           JOIN suppliers s ON c.supplier_id = s.id
           WHERE c.status = 'pending'
           ORDER BY c.created_at DESC
           LIMIT 5"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(AdminDashboard {
        contracts,
        total_suppliers: total_suppliers.0,
        active_suppliers: active_suppliers.0,
        vendor_evaluations: vendor_evaluations.0,
        buyer_evaluations: buyer_evaluations.0,
        evaluated_suppliers: evaluated_suppliers.0,
        average_weighted_rating,
        average_badge: rating_badge(average_weighted_rating),
        pending_validation,
    })
}

async fn collaborator_dashboard(
    pool: &sqlx::SqlitePool,
    user_id: &str,
) -> ApiResult<CollaboratorDashboard> {
    let my_contracts = contract_counts(pool, Some(user_id)).await?;

    let my_evaluations: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM supplier_evaluations WHERE evaluator_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    let total_suppliers: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM suppliers")
        .fetch_one(pool)
        .await?;

    let recent_contracts: Vec<ContractSummary> = sqlx::query_as(
        r#"SELECT c.id, c.number, c.subject, s.name AS supplier_name, c.status, c.expiry_date
           FROM contracts c
           JOIN suppliers s ON c.supplier_id = s.id
           WHERE c.created_by = ?
           ORDER BY c.created_at DESC
           LIMIT 5"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let recent_evaluations: Vec<EvaluationSummaryRow> = sqlx::query_as(
        r#"SELECT e.id, s.name AS supplier_name, e.final_rating
           FROM supplier_evaluations e
           JOIN suppliers s ON e.supplier_id = s.id
           WHERE e.evaluator_id = ?
           ORDER BY e.created_at DESC
           LIMIT 5"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(CollaboratorDashboard {
        my_contracts,
        my_evaluations: my_evaluations.0,
        total_suppliers: total_suppliers.0,
        recent_contracts,
        recent_evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normalize() {
        let query = PaginationQuery {
            page: None,
            per_page: None,
            search: None,
            status: None,
            kind: None,
            category: None,
            active: None,
            supplier_id: None,
            sort_by: None,
            sort_order: None,
        };
        assert_eq!(query.normalize(), (1, 20, 0));

        let query = PaginationQuery {
            page: Some(3),
            per_page: Some(500),
            ..query
        };
        // per_page clamps at 100
        assert_eq!(query.normalize(), (3, 100, 200));

        let query = PaginationQuery {
            page: Some(-2),
            per_page: Some(0),
            ..query
        };
        assert_eq!(query.normalize(), (1, 1, 0));
    }

    #[test]
    fn test_order_clause_whitelists_columns() {
        let query = PaginationQuery {
            page: None,
            per_page: None,
            search: None,
            status: None,
            kind: None,
            category: None,
            active: None,
            supplier_id: None,
            sort_by: None,
            sort_order: None,
        };
        assert_eq!(query.order_clause(&["name", "created_at"], "name"), "name ASC");

        let query = PaginationQuery {
            sort_by: Some("created_at".to_string()),
            sort_order: Some("desc".to_string()),
            ..query
        };
        assert_eq!(
            query.order_clause(&["name", "created_at"], "name"),
            "created_at DESC"
        );

        // unknown columns fall back to the default, injection stays out
        let query = PaginationQuery {
            sort_by: Some("name; DROP TABLE suppliers".to_string()),
            sort_order: Some("sideways".to_string()),
            ..query
        };
        assert_eq!(query.order_clause(&["name", "created_at"], "name"), "name ASC");
    }
}
