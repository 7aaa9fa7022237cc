// src/evaluation_handlers.rs - two-sided evaluation endpoints
//
// Vendor evaluations: the team scores the supplier on 5 criteria.
// Buyer evaluations: the supplier scores the buying organization on 6.
// Final ratings are stored denormalized and recomputed on every write.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::audit::audit;
use crate::auth::get_current_user;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{
    final_rating, rating_badge, round2, weighted_rating, BuyerEvaluation,
    CreateBuyerEvaluationRequest, CreateSupplierEvaluationRequest, SupplierEvaluation,
    UpdateBuyerEvaluationRequest, UpdateSupplierEvaluationRequest, BUYER_CRITERIA,
    VENDOR_CRITERIA,
};
use crate::AppState;

async fn require_supplier(pool: &SqlitePool, supplier_id: &str) -> ApiResult<String> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
        .bind(supplier_id)
        .fetch_optional(pool)
        .await?;
    name.ok_or_else(|| ApiError::supplier_not_found(supplier_id))
}

// ==================== CRITERIA CATALOG ====================

#[derive(Debug, Serialize)]
pub struct CriterionInfo {
    pub key: &'static str,
    pub label_fr: &'static str,
    pub label_en: &'static str,
}

/// Both criteria catalogs, in storage order.
pub async fn get_criteria() -> ApiResult<HttpResponse> {
    let vendor: Vec<CriterionInfo> = VENDOR_CRITERIA
        .iter()
        .map(|(key, fr, en)| CriterionInfo {
            key,
            label_fr: fr,
            label_en: en,
        })
        .collect();
    let buyer: Vec<CriterionInfo> = BUYER_CRITERIA
        .iter()
        .map(|(key, fr, en)| CriterionInfo {
            key,
            label_fr: fr,
            label_en: en,
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "vendor": vendor,
        "buyer": buyer,
    }))))
}

// ==================== VENDOR EVALUATIONS ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VendorEvaluationListItem {
    pub id: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub final_rating: f64,
    pub evaluator_id: Option<String>,
    pub created_at: String,
}

pub async fn list_vendor_evaluations(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = r#"
        SELECT COUNT(*) FROM supplier_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut list_sql = r#"
        SELECT e.id, e.supplier_id, s.name AS supplier_name, e.final_rating,
               e.evaluator_id, e.created_at
        FROM supplier_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(supplier_id) = &query.supplier_id {
        count_sql.push_str(" AND e.supplier_id = ?");
        list_sql.push_str(" AND e.supplier_id = ?");
        params.push(supplier_id.clone());
    }
    if let Some(search) = &query.search {
        count_sql.push_str(" AND s.name LIKE ?");
        list_sql.push_str(" AND s.name LIKE ?");
        params.push(format!("%{}%", search));
    }

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total = count_query.fetch_one(pool).await?;

    list_sql.push_str(" ORDER BY e.created_at DESC LIMIT ? OFFSET ?");
    let mut list_query = sqlx::query_as::<_, VendorEvaluationListItem>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let evaluations = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: evaluations,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

pub async fn get_vendor_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let evaluation_id = path.into_inner();

    let evaluation =
        sqlx::query_as::<_, SupplierEvaluation>("SELECT * FROM supplier_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::evaluation_not_found(&evaluation_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(evaluation)))
}

pub async fn create_vendor_evaluation(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateSupplierEvaluationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let supplier_name = require_supplier(pool, &request.supplier_id).await?;

    let scores = [
        request.delivery_compliance,
        request.delivery_timeline,
        request.advising_capability,
        request.after_sales_qos,
        request.vendor_relationship,
    ];
    let rating = final_rating(&scores);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO supplier_evaluations (
            id, supplier_id, delivery_compliance, delivery_timeline,
            advising_capability, after_sales_qos, vendor_relationship,
            final_rating, comments, evaluator_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&request.supplier_id)
    .bind(request.delivery_compliance)
    .bind(request.delivery_timeline)
    .bind(request.advising_capability)
    .bind(request.after_sales_qos)
    .bind(request.vendor_relationship)
    .bind(rating)
    .bind(&request.comments)
    .bind(&claims.sub)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let evaluation =
        sqlx::query_as::<_, SupplierEvaluation>("SELECT * FROM supplier_evaluations WHERE id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await?;

    log::info!(
        "Vendor evaluation created for {} (rating {:.2})",
        supplier_name,
        rating
    );
    audit(
        pool,
        &claims.sub,
        "create",
        "supplier_evaluation",
        &id,
        &format!("Evaluated supplier '{}' at {:.2}", supplier_name, rating),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        evaluation,
        "Evaluation recorded successfully".to_string(),
    )))
}

pub async fn update_vendor_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateSupplierEvaluationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let evaluation_id = path.into_inner();
    request.validate()?;

    let existing =
        sqlx::query_as::<_, SupplierEvaluation>("SELECT * FROM supplier_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::evaluation_not_found(&evaluation_id))?;

    let scores = [
        request.delivery_compliance.unwrap_or(existing.delivery_compliance),
        request.delivery_timeline.unwrap_or(existing.delivery_timeline),
        request.advising_capability.unwrap_or(existing.advising_capability),
        request.after_sales_qos.unwrap_or(existing.after_sales_qos),
        request.vendor_relationship.unwrap_or(existing.vendor_relationship),
    ];
    let rating = final_rating(&scores);

    sqlx::query(
        r#"
        UPDATE supplier_evaluations SET
            delivery_compliance = ?, delivery_timeline = ?, advising_capability = ?,
            after_sales_qos = ?, vendor_relationship = ?, final_rating = ?,
            comments = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(scores[0])
    .bind(scores[1])
    .bind(scores[2])
    .bind(scores[3])
    .bind(scores[4])
    .bind(rating)
    .bind(request.comments.clone().or(existing.comments))
    .bind(Utc::now())
    .bind(&evaluation_id)
    .execute(pool)
    .await?;

    let evaluation =
        sqlx::query_as::<_, SupplierEvaluation>("SELECT * FROM supplier_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_one(pool)
            .await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "supplier_evaluation",
        &evaluation_id,
        &format!("Updated evaluation to {:.2}", rating),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        evaluation,
        "Evaluation updated successfully".to_string(),
    )))
}

pub async fn delete_vendor_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let evaluation_id = path.into_inner();

    let result = sqlx::query("DELETE FROM supplier_evaluations WHERE id = ?")
        .bind(&evaluation_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::evaluation_not_found(&evaluation_id));
    }

    audit(
        pool,
        &claims.sub,
        "delete",
        "supplier_evaluation",
        &evaluation_id,
        "Deleted vendor evaluation",
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        serde_json::json!({ "id": evaluation_id }),
        "Evaluation deleted successfully".to_string(),
    )))
}

// ==================== BUYER EVALUATIONS ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BuyerEvaluationListItem {
    pub id: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub final_rating: f64,
    pub respondent: Option<String>,
    pub created_at: String,
}

pub async fn list_buyer_evaluations(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = r#"
        SELECT COUNT(*) FROM buyer_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut list_sql = r#"
        SELECT e.id, e.supplier_id, s.name AS supplier_name, e.final_rating,
               e.respondent, e.created_at
        FROM buyer_evaluations e
        JOIN suppliers s ON s.id = e.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(supplier_id) = &query.supplier_id {
        count_sql.push_str(" AND e.supplier_id = ?");
        list_sql.push_str(" AND e.supplier_id = ?");
        params.push(supplier_id.clone());
    }
    if let Some(search) = &query.search {
        count_sql.push_str(" AND s.name LIKE ?");
        list_sql.push_str(" AND s.name LIKE ?");
        params.push(format!("%{}%", search));
    }

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total = count_query.fetch_one(pool).await?;

    list_sql.push_str(" ORDER BY e.created_at DESC LIMIT ? OFFSET ?");
    let mut list_query = sqlx::query_as::<_, BuyerEvaluationListItem>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let evaluations = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: evaluations,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

pub async fn get_buyer_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let evaluation_id = path.into_inner();

    let evaluation =
        sqlx::query_as::<_, BuyerEvaluation>("SELECT * FROM buyer_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::evaluation_not_found(&evaluation_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(evaluation)))
}

pub async fn create_buyer_evaluation(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBuyerEvaluationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let supplier_name = require_supplier(pool, &request.supplier_id).await?;

    let scores = [
        request.price_flexibility,
        request.rfx_deadline_compliance,
        request.advisory_capability,
        request.relationship_quality,
        request.rfx_response_quality,
        request.credit_policy,
    ];
    let rating = final_rating(&scores);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO buyer_evaluations (
            id, supplier_id, price_flexibility, rfx_deadline_compliance,
            advisory_capability, relationship_quality, rfx_response_quality,
            credit_policy, final_rating, comments, respondent, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&request.supplier_id)
    .bind(request.price_flexibility)
    .bind(request.rfx_deadline_compliance)
    .bind(request.advisory_capability)
    .bind(request.relationship_quality)
    .bind(request.rfx_response_quality)
    .bind(request.credit_policy)
    .bind(rating)
    .bind(&request.comments)
    .bind(&request.respondent)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let evaluation =
        sqlx::query_as::<_, BuyerEvaluation>("SELECT * FROM buyer_evaluations WHERE id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await?;

    log::info!(
        "Buyer evaluation recorded for {} (rating {:.2})",
        supplier_name,
        rating
    );
    audit(
        pool,
        &claims.sub,
        "create",
        "buyer_evaluation",
        &id,
        &format!("Buyer evaluation for '{}' at {:.2}", supplier_name, rating),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        evaluation,
        "Evaluation recorded successfully".to_string(),
    )))
}

pub async fn update_buyer_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateBuyerEvaluationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let evaluation_id = path.into_inner();
    request.validate()?;

    let existing =
        sqlx::query_as::<_, BuyerEvaluation>("SELECT * FROM buyer_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::evaluation_not_found(&evaluation_id))?;

    let scores = [
        request.price_flexibility.unwrap_or(existing.price_flexibility),
        request
            .rfx_deadline_compliance
            .unwrap_or(existing.rfx_deadline_compliance),
        request.advisory_capability.unwrap_or(existing.advisory_capability),
        request.relationship_quality.unwrap_or(existing.relationship_quality),
        request
            .rfx_response_quality
            .unwrap_or(existing.rfx_response_quality),
        request.credit_policy.unwrap_or(existing.credit_policy),
    ];
    let rating = final_rating(&scores);

    sqlx::query(
        r#"
        UPDATE buyer_evaluations SET
            price_flexibility = ?, rfx_deadline_compliance = ?,
            advisory_capability = ?, relationship_quality = ?,
            rfx_response_quality = ?, credit_policy = ?, final_rating = ?,
            comments = ?, respondent = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(scores[0])
    .bind(scores[1])
    .bind(scores[2])
    .bind(scores[3])
    .bind(scores[4])
    .bind(scores[5])
    .bind(rating)
    .bind(request.comments.clone().or(existing.comments))
    .bind(request.respondent.clone().or(existing.respondent))
    .bind(Utc::now())
    .bind(&evaluation_id)
    .execute(pool)
    .await?;

    let evaluation =
        sqlx::query_as::<_, BuyerEvaluation>("SELECT * FROM buyer_evaluations WHERE id = ?")
            .bind(&evaluation_id)
            .fetch_one(pool)
            .await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "buyer_evaluation",
        &evaluation_id,
        &format!("Updated buyer evaluation to {:.2}", rating),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        evaluation,
        "Evaluation updated successfully".to_string(),
    )))
}

pub async fn delete_buyer_evaluation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let evaluation_id = path.into_inner();

    let result = sqlx::query("DELETE FROM buyer_evaluations WHERE id = ?")
        .bind(&evaluation_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::evaluation_not_found(&evaluation_id));
    }

    audit(
        pool,
        &claims.sub,
        "delete",
        "buyer_evaluation",
        &evaluation_id,
        "Deleted buyer evaluation",
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        serde_json::json!({ "id": evaluation_id }),
        "Evaluation deleted successfully".to_string(),
    )))
}

// ==================== SUPPLIER STATS ====================

#[derive(Debug, Serialize)]
pub struct CriterionAverage {
    pub key: &'static str,
    pub label_fr: &'static str,
    pub label_en: &'static str,
    pub average: f64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct YearlyAverage {
    pub year: String,
    pub average: f64,
    pub count: i64,
}

async fn criterion_averages(
    pool: &SqlitePool,
    table: &str,
    catalog: &[(&'static str, &'static str, &'static str)],
    supplier_id: &str,
) -> ApiResult<Vec<CriterionAverage>> {
    let mut averages = Vec::with_capacity(catalog.len());
    for (key, fr, en) in catalog {
        // Column names come from the static catalogs, never from input
        let sql = format!("SELECT AVG({}) FROM {} WHERE supplier_id = ?", key, table);
        let average: Option<f64> = sqlx::query_scalar(&sql)
            .bind(supplier_id)
            .fetch_one(pool)
            .await?;
        averages.push(CriterionAverage {
            key,
            label_fr: fr,
            label_en: en,
            average: round2(average.unwrap_or(0.0)),
        });
    }
    Ok(averages)
}

async fn yearly_averages(
    pool: &SqlitePool,
    table: &str,
    supplier_id: &str,
) -> ApiResult<Vec<YearlyAverage>> {
    let sql = format!(
        r#"
        SELECT strftime('%Y', created_at) AS year,
               AVG(final_rating) AS average,
               COUNT(*) AS count
        FROM {}
        WHERE supplier_id = ?
        GROUP BY year ORDER BY year ASC
        "#,
        table
    );
    let mut rows = sqlx::query_as::<_, YearlyAverage>(&sql)
        .bind(supplier_id)
        .fetch_all(pool)
        .await?;
    for row in &mut rows {
        row.average = round2(row.average);
    }
    Ok(rows)
}

pub async fn get_supplier_stats(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let supplier_id = path.into_inner();
    let supplier_name = require_supplier(pool, &supplier_id).await?;

    let rating = crate::supplier_handlers::supplier_rating(pool, &supplier_id).await?;
    let vendor_criteria =
        criterion_averages(pool, "supplier_evaluations", &VENDOR_CRITERIA, &supplier_id).await?;
    let buyer_criteria =
        criterion_averages(pool, "buyer_evaluations", &BUYER_CRITERIA, &supplier_id).await?;
    let vendor_yearly = yearly_averages(pool, "supplier_evaluations", &supplier_id).await?;
    let buyer_yearly = yearly_averages(pool, "buyer_evaluations", &supplier_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "supplier_id": supplier_id,
        "supplier_name": supplier_name,
        "rating": rating,
        "vendor_criteria": vendor_criteria,
        "buyer_criteria": buyer_criteria,
        "vendor_yearly": vendor_yearly,
        "buyer_yearly": buyer_yearly,
    }))))
}

// ==================== RANKING ====================

#[derive(Debug, sqlx::FromRow)]
struct RankingRow {
    id: String,
    name: String,
    vendor_avg: Option<f64>,
    vendor_count: i64,
    buyer_avg: Option<f64>,
    buyer_count: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct RankingEntry {
    pub rank: i64,
    pub supplier_id: String,
    pub supplier_name: String,
    pub vendor_avg: f64,
    pub buyer_avg: f64,
    pub weighted: f64,
    pub evaluation_count: i64,
    pub badge: &'static str,
}

/// Ranking of all evaluated suppliers by weighted rating, best first.
/// Ties break on name so ranks are stable across requests.
pub async fn compute_ranking(pool: &SqlitePool) -> ApiResult<Vec<RankingEntry>> {
    let rows = sqlx::query_as::<_, RankingRow>(
        r#"
        SELECT s.id, s.name,
               (SELECT AVG(final_rating) FROM supplier_evaluations e WHERE e.supplier_id = s.id) AS vendor_avg,
               (SELECT COUNT(*) FROM supplier_evaluations e WHERE e.supplier_id = s.id) AS vendor_count,
               (SELECT AVG(final_rating) FROM buyer_evaluations b WHERE b.supplier_id = s.id) AS buyer_avg,
               (SELECT COUNT(*) FROM buyer_evaluations b WHERE b.supplier_id = s.id) AS buyer_count
        FROM suppliers s
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut entries: Vec<RankingEntry> = rows
        .into_iter()
        .filter(|row| row.vendor_count > 0 || row.buyer_count > 0)
        .map(|row| {
            let vendor_avg = round2(row.vendor_avg.unwrap_or(0.0));
            let buyer_avg = round2(row.buyer_avg.unwrap_or(0.0));
            let weighted = weighted_rating(vendor_avg, buyer_avg);
            RankingEntry {
                rank: 0,
                supplier_id: row.id,
                supplier_name: row.name,
                vendor_avg,
                buyer_avg,
                weighted,
                evaluation_count: row.vendor_count + row.buyer_count,
                badge: rating_badge(weighted),
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.weighted
            .partial_cmp(&a.weighted)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.supplier_name.cmp(&b.supplier_name))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = (i + 1) as i64;
    }
    Ok(entries)
}

#[derive(Debug, Serialize)]
pub struct YearlyOverviewPoint {
    pub year: String,
    pub vendor_avg: f64,
    pub buyer_avg: f64,
    pub weighted: f64,
    pub moving_avg: f64,
    pub count: i64,
}

/// Year-by-year averages across all suppliers, both sides, with a
/// running mean of the weighted score over the years seen so far.
pub async fn yearly_series(pool: &SqlitePool) -> ApiResult<Vec<YearlyOverviewPoint>> {
    let vendor: Vec<(String, f64, i64)> = sqlx::query_as(
        r#"
        SELECT strftime('%Y', created_at) AS year, AVG(final_rating), COUNT(*)
        FROM supplier_evaluations GROUP BY year ORDER BY year ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    let buyer: Vec<(String, f64, i64)> = sqlx::query_as(
        r#"
        SELECT strftime('%Y', created_at) AS year, AVG(final_rating), COUNT(*)
        FROM buyer_evaluations GROUP BY year ORDER BY year ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut years: BTreeMap<String, (Option<f64>, Option<f64>, i64)> = BTreeMap::new();
    for (year, avg, count) in vendor {
        let slot = years.entry(year).or_insert((None, None, 0));
        slot.0 = Some(avg);
        slot.2 += count;
    }
    for (year, avg, count) in buyer {
        let slot = years.entry(year).or_insert((None, None, 0));
        slot.1 = Some(avg);
        slot.2 += count;
    }

    let mut points = Vec::with_capacity(years.len());
    let mut running = 0.0;
    for (i, (year, (vendor_avg, buyer_avg, count))) in years.into_iter().enumerate() {
        let vendor_avg = round2(vendor_avg.unwrap_or(0.0));
        let buyer_avg = round2(buyer_avg.unwrap_or(0.0));
        let weighted = weighted_rating(vendor_avg, buyer_avg);
        running += weighted;
        points.push(YearlyOverviewPoint {
            year,
            vendor_avg,
            buyer_avg,
            weighted,
            moving_avg: round2(running / (i + 1) as f64),
            count,
        });
    }
    Ok(points)
}

pub async fn get_ranking(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let entries = compute_ranking(pool).await?;
    let yearly = yearly_series(pool).await?;

    let top10: Vec<&RankingEntry> = entries.iter().take(10).collect();
    let bottom10: Vec<&RankingEntry> = entries.iter().rev().take(10).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "total_ranked": entries.len(),
        "top10": top10,
        "bottom10": bottom10,
        "yearly": yearly,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn insert_supplier(pool: &SqlitePool, id: &str, name: &str) {
        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, supplier_kind, category_kind, active, created_at, updated_at)
            VALUES (?, ?, 'local', 'goods', 1, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_vendor_eval(pool: &SqlitePool, supplier_id: &str, rating: f64) {
        sqlx::query(
            r#"
            INSERT INTO supplier_evaluations
                (id, supplier_id, delivery_compliance, delivery_timeline, advising_capability,
                 after_sales_qos, vendor_relationship, final_rating, created_at, updated_at)
            VALUES (?, ?, 8, 8, 8, 8, 8, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(supplier_id)
        .bind(rating)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_ranking_orders_by_weighted_desc() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "Alpha").await;
        insert_supplier(&pool, "s2", "Bravo").await;
        insert_supplier(&pool, "s3", "Charlie").await;
        insert_vendor_eval(&pool, "s1", 6.0).await;
        insert_vendor_eval(&pool, "s2", 9.0).await;
        // Charlie has no evaluations and must not appear

        let ranking = compute_ranking(&pool).await.unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].supplier_name, "Bravo");
        assert_eq!(ranking[0].rank, 1);
        // 0.6 * 9.0 = 5.4
        assert_eq!(ranking[0].weighted, 5.4);
        assert_eq!(ranking[1].supplier_name, "Alpha");
        assert_eq!(ranking[1].rank, 2);
    }

    #[tokio::test]
    async fn test_ranking_ties_break_on_name() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "Zulu").await;
        insert_supplier(&pool, "s2", "Alpha").await;
        insert_vendor_eval(&pool, "s1", 7.0).await;
        insert_vendor_eval(&pool, "s2", 7.0).await;

        let ranking = compute_ranking(&pool).await.unwrap();
        assert_eq!(ranking[0].supplier_name, "Alpha");
        assert_eq!(ranking[1].supplier_name, "Zulu");
    }

    #[tokio::test]
    async fn test_criterion_averages_empty_supplier() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;

        let averages = criterion_averages(&pool, "supplier_evaluations", &VENDOR_CRITERIA, "s1")
            .await
            .unwrap();
        assert_eq!(averages.len(), 5);
        assert!(averages.iter().all(|a| a.average == 0.0));
    }

    #[tokio::test]
    async fn test_yearly_series_groups_by_year() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;
        insert_vendor_eval(&pool, "s1", 6.0).await;
        insert_vendor_eval(&pool, "s1", 8.0).await;

        let series = yearly_series(&pool).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].vendor_avg, 7.0);
        assert_eq!(series[0].buyer_avg, 0.0);
        // Only the vendor side contributes: 0.6 * 7.0
        assert_eq!(series[0].weighted, 4.2);
        assert_eq!(series[0].moving_avg, 4.2);
        assert_eq!(series[0].count, 2);
    }
}
