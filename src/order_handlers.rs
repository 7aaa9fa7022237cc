// src/order_handlers.rs - purchase order browsing and spreadsheet import
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::audit;
use crate::auth::{require_permission, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::import;
use crate::models::{ImportedFile, PurchaseOrder, PurchaseOrderLine};
use crate::AppState;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OrderListItem {
    pub id: String,
    pub number: String,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
    pub document_date: Option<String>,
    pub total: f64,
    pub received: f64,
    pub remaining: f64,
    pub progress_rate: f64,
    pub line_count: i64,
}

pub async fn list_orders(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = r#"
        SELECT COUNT(*) FROM purchase_orders po
        LEFT JOIN suppliers s ON s.id = po.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut list_sql = r#"
        SELECT po.id, po.number, po.supplier_id, s.name AS supplier_name,
               po.document_date, po.total, po.received, po.remaining, po.progress_rate,
               (SELECT COUNT(*) FROM purchase_order_lines l WHERE l.order_id = po.id) AS line_count
        FROM purchase_orders po
        LEFT JOIN suppliers s ON s.id = po.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(supplier_id) = &query.supplier_id {
        count_sql.push_str(" AND po.supplier_id = ?");
        list_sql.push_str(" AND po.supplier_id = ?");
        params.push(supplier_id.clone());
    }
    if let Some(search) = &query.search {
        let clause = " AND (po.number LIKE ? OR s.name LIKE ?)";
        count_sql.push_str(clause);
        list_sql.push_str(clause);
        let pattern = format!("%{}%", search);
        params.push(pattern.clone());
        params.push(pattern);
    }

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total = count_query.fetch_one(pool).await?;

    let order = query.order_clause(
        &["number", "document_date", "total", "progress_rate"],
        "number",
    );
    list_sql.push_str(&format!(" ORDER BY po.{} LIMIT ? OFFSET ?", order));
    let mut list_query = sqlx::query_as::<_, OrderListItem>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let orders = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: orders,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub supplier_name: Option<String>,
    pub lines: Vec<PurchaseOrderLine>,
}

pub async fn get_order(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let order_id = path.into_inner();

    let order = sqlx::query_as::<_, PurchaseOrder>("SELECT * FROM purchase_orders WHERE id = ?")
        .bind(&order_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::order_not_found(&order_id))?;

    let supplier_name: Option<String> = match &order.supplier_id {
        Some(supplier_id) => {
            sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
                .bind(supplier_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let lines = sqlx::query_as::<_, PurchaseOrderLine>(
        "SELECT * FROM purchase_order_lines WHERE order_id = ? ORDER BY item_number ASC",
    )
    .bind(&order_id)
    .fetch_all(pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(OrderDetail {
        order,
        supplier_name,
        lines,
    })))
}

pub async fn list_imported_files(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let files = sqlx::query_as::<_, ImportedFile>(
        "SELECT * FROM imported_files ORDER BY imported_at DESC LIMIT 100",
    )
    .fetch_all(pool)
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(files)))
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub filename: Option<String>,
}

/// Upload a spreadsheet (xlsx, xls or csv) of purchase order lines.
/// The body is the raw file; the name comes from the query string or
/// the X-Filename header.
pub async fn import_orders(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<ImportQuery>,
    body: web::Bytes,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::can_import_orders)?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty file".to_string()));
    }

    let filename = query
        .filename
        .clone()
        .or_else(|| {
            http_request
                .headers()
                .get("X-Filename")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "upload.xlsx".to_string());

    log::info!(
        "Purchase order import started: {} ({} bytes) by {}",
        filename,
        body.len(),
        claims.email
    );

    let summary = import::import_purchase_orders(pool, &body, &filename, Some(&claims.sub)).await?;

    audit(
        pool,
        &claims.sub,
        "import",
        "purchase_order",
        &filename,
        &format!(
            "Imported {} line(s), {} PO(s) created, {} updated, {} error(s)",
            summary.lines_processed,
            summary.pos_created,
            summary.pos_updated,
            summary.errors.len()
        ),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        summary,
        "Import completed".to_string(),
    )))
}
