// src/supplier_handlers.rs - supplier and bank endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::audit::audit;
use crate::auth::{get_current_user, require_permission, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::mailer::{self, EvaluationMailKind};
use crate::models::{
    normalize_iban, rating_badge, round2, weighted_rating, Bank, CreateBankRequest,
    CreateSupplierRequest, SearchQuery, Supplier, SupplierEvaluation, SupplierRating,
    UpdateBankRequest, UpdateSupplierRequest,
};
use crate::AppState;

const SUPPLIER_KINDS: [&str; 2] = ["local", "foreign"];
const CATEGORY_KINDS: [&str; 3] = ["goods", "services", "other"];
const PAYMENT_TERMS: [&str; 3] = ["net_30", "net_60", "net_90"];

fn validate_supplier_kind(kind: &str) -> ApiResult<()> {
    if SUPPLIER_KINDS.contains(&kind) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid supplier kind '{}'. Allowed: local, foreign",
            kind
        )))
    }
}

fn validate_category_kind(kind: &str) -> ApiResult<()> {
    if CATEGORY_KINDS.contains(&kind) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid category kind '{}'. Allowed: goods, services, other",
            kind
        )))
    }
}

fn validate_payment_terms(terms: &str) -> ApiResult<()> {
    if PAYMENT_TERMS.contains(&terms) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid payment terms '{}'. Allowed: net_30, net_60, net_90",
            terms
        )))
    }
}

/// Bank details propagated onto a supplier record. Name and BIC only
/// fill empty fields; the IBAN is normalized with the bank prefix.
struct BankReference {
    bank_name: Option<String>,
    bic_swift: Option<String>,
    iban_prefix: String,
}

async fn resolve_bank_reference(
    pool: &SqlitePool,
    bank_id: Option<&str>,
) -> ApiResult<BankReference> {
    match bank_id {
        Some(id) => {
            let bank = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| ApiError::bank_not_found(id))?;
            Ok(BankReference {
                bank_name: Some(bank.name),
                bic_swift: bank.bic_code,
                iban_prefix: bank.iban_prefix,
            })
        }
        None => Ok(BankReference {
            bank_name: None,
            bic_swift: None,
            iban_prefix: "CI93".to_string(),
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

// ==================== SUPPLIERS ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SupplierListItem {
    pub id: String,
    pub name: String,
    pub supplier_kind: String,
    pub category_kind: String,
    pub category: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_person: Option<String>,
    pub active: bool,
    pub created_at: String,
}

pub async fn list_suppliers(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = "SELECT COUNT(*) FROM suppliers WHERE 1=1".to_string();
    let mut list_sql = r#"
        SELECT id, name, supplier_kind, category_kind, category, email, phone,
               contact_person, active, created_at
        FROM suppliers WHERE 1=1
    "#
    .to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(kind) = &query.kind {
        count_sql.push_str(" AND supplier_kind = ?");
        list_sql.push_str(" AND supplier_kind = ?");
        params.push(kind.clone());
    }
    if let Some(category) = &query.category {
        count_sql.push_str(" AND category = ?");
        list_sql.push_str(" AND category = ?");
        params.push(category.clone());
    }
    if let Some(active) = query.active {
        count_sql.push_str(" AND active = ?");
        list_sql.push_str(" AND active = ?");
        params.push(if active { "1".to_string() } else { "0".to_string() });
    }
    if let Some(search) = &query.search {
        let clause = " AND (name LIKE ? OR email LIKE ? OR contact_person LIKE ?)";
        count_sql.push_str(clause);
        list_sql.push_str(clause);
        let pattern = format!("%{}%", search);
        params.push(pattern.clone());
        params.push(pattern.clone());
        params.push(pattern);
    }

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total = count_query.fetch_one(pool).await?;

    let order = query.order_clause(&["name", "supplier_kind", "category", "created_at"], "name");
    list_sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order));
    let mut list_query = sqlx::query_as::<_, SupplierListItem>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let suppliers = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: suppliers,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

pub async fn supplier_rating(pool: &SqlitePool, supplier_id: &str) -> ApiResult<SupplierRating> {
    let (vendor_avg, vendor_count): (Option<f64>, i64) = sqlx::query_as(
        "SELECT AVG(final_rating), COUNT(*) FROM supplier_evaluations WHERE supplier_id = ?",
    )
    .bind(supplier_id)
    .fetch_one(pool)
    .await?;

    let (buyer_avg, buyer_count): (Option<f64>, i64) = sqlx::query_as(
        "SELECT AVG(final_rating), COUNT(*) FROM buyer_evaluations WHERE supplier_id = ?",
    )
    .bind(supplier_id)
    .fetch_one(pool)
    .await?;

    let vendor_avg = round2(vendor_avg.unwrap_or(0.0));
    let buyer_avg = round2(buyer_avg.unwrap_or(0.0));
    let weighted = weighted_rating(vendor_avg, buyer_avg);

    Ok(SupplierRating {
        vendor_avg,
        buyer_avg,
        weighted,
        vendor_count,
        buyer_count,
        badge: rating_badge(weighted),
    })
}

#[derive(Debug, Serialize)]
pub struct SupplierDetail {
    #[serde(flatten)]
    pub supplier: Supplier,
    pub rating: SupplierRating,
}

pub async fn get_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let supplier_id = path.into_inner();

    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let rating = supplier_rating(pool, &supplier_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SupplierDetail { supplier, rating })))
}

pub async fn create_supplier(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateSupplierRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let supplier_kind = request
        .supplier_kind
        .clone()
        .unwrap_or_else(|| "local".to_string());
    validate_supplier_kind(&supplier_kind)?;
    let category_kind = request
        .category_kind
        .clone()
        .unwrap_or_else(|| "goods".to_string());
    validate_category_kind(&category_kind)?;
    if let Some(terms) = &request.payment_terms {
        validate_payment_terms(terms)?;
    }

    let name = request.name.trim().to_string();
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM suppliers WHERE LOWER(name) = LOWER(?)")
            .bind(&name)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::supplier_already_exists(&name));
    }

    let bank = resolve_bank_reference(pool, request.bank_id.as_deref()).await?;
    let bank_name = non_empty(request.bank_name.clone()).or(bank.bank_name);
    let bic_swift = non_empty(request.bic_swift.clone()).or(bank.bic_swift);
    let iban = normalize_iban(&supplier_kind, request.iban.clone(), &bank.iban_prefix);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO suppliers (
            id, name, supplier_kind, organization_kind, registration_date,
            physical_address, head_office_address, phone, email, website,
            legal_representative, representative_role, contact_person,
            contact_phone, contact_email, trade_register, taxpayer_account,
            tax_clearance, social_security_number, bank_id, bank_name,
            bank_branch, iban, bic_swift, payment_terms, category_kind,
            category, description, active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&name)
    .bind(&supplier_kind)
    .bind(&request.organization_kind)
    .bind(&request.registration_date)
    .bind(&request.physical_address)
    .bind(&request.head_office_address)
    .bind(&request.phone)
    .bind(&request.email)
    .bind(&request.website)
    .bind(&request.legal_representative)
    .bind(&request.representative_role)
    .bind(&request.contact_person)
    .bind(&request.contact_phone)
    .bind(&request.contact_email)
    .bind(&request.trade_register)
    .bind(&request.taxpayer_account)
    .bind(&request.tax_clearance)
    .bind(&request.social_security_number)
    .bind(&request.bank_id)
    .bind(&bank_name)
    .bind(&request.bank_branch)
    .bind(&iban)
    .bind(&bic_swift)
    .bind(&request.payment_terms)
    .bind(&category_kind)
    .bind(&request.category)
    .bind(&request.description)
    .bind(request.active.unwrap_or(true))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    log::info!("Supplier created: {} ({})", supplier.name, supplier.id);
    audit(
        pool,
        &claims.sub,
        "create",
        "supplier",
        &id,
        &format!("Created supplier '{}'", supplier.name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        supplier,
        "Supplier created successfully".to_string(),
    )))
}

pub async fn update_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateSupplierRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let supplier_id = path.into_inner();
    request.validate()?;

    let existing = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let name = match &request.name {
        Some(name) => {
            let trimmed = name.trim().to_string();
            let clash: Option<String> =
                sqlx::query_scalar("SELECT id FROM suppliers WHERE LOWER(name) = LOWER(?) AND id != ?")
                    .bind(&trimmed)
                    .bind(&supplier_id)
                    .fetch_optional(pool)
                    .await?;
            if clash.is_some() {
                return Err(ApiError::supplier_already_exists(&trimmed));
            }
            trimmed
        }
        None => existing.name.clone(),
    };

    let supplier_kind = request
        .supplier_kind
        .clone()
        .unwrap_or_else(|| existing.supplier_kind.clone());
    validate_supplier_kind(&supplier_kind)?;
    let category_kind = request
        .category_kind
        .clone()
        .unwrap_or_else(|| existing.category_kind.clone());
    validate_category_kind(&category_kind)?;
    if let Some(terms) = &request.payment_terms {
        validate_payment_terms(terms)?;
    }

    let bank_id = request.bank_id.clone().or_else(|| existing.bank_id.clone());
    let bank = resolve_bank_reference(pool, bank_id.as_deref()).await?;
    let bank_name = non_empty(request.bank_name.clone())
        .or_else(|| non_empty(existing.bank_name.clone()))
        .or(bank.bank_name);
    let bic_swift = non_empty(request.bic_swift.clone())
        .or_else(|| non_empty(existing.bic_swift.clone()))
        .or(bank.bic_swift);
    let iban = normalize_iban(
        &supplier_kind,
        request.iban.clone().or_else(|| existing.iban.clone()),
        &bank.iban_prefix,
    );

    sqlx::query(
        r#"
        UPDATE suppliers SET
            name = ?, supplier_kind = ?, organization_kind = ?, registration_date = ?,
            physical_address = ?, head_office_address = ?, phone = ?, email = ?,
            website = ?, legal_representative = ?, representative_role = ?,
            contact_person = ?, contact_phone = ?, contact_email = ?,
            trade_register = ?, taxpayer_account = ?, tax_clearance = ?,
            social_security_number = ?, bank_id = ?, bank_name = ?, bank_branch = ?,
            iban = ?, bic_swift = ?, payment_terms = ?, category_kind = ?,
            category = ?, description = ?, active = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(&supplier_kind)
    .bind(request.organization_kind.clone().or(existing.organization_kind))
    .bind(request.registration_date.clone().or(existing.registration_date))
    .bind(request.physical_address.clone().or(existing.physical_address))
    .bind(request.head_office_address.clone().or(existing.head_office_address))
    .bind(request.phone.clone().or(existing.phone))
    .bind(request.email.clone().or(existing.email))
    .bind(request.website.clone().or(existing.website))
    .bind(request.legal_representative.clone().or(existing.legal_representative))
    .bind(request.representative_role.clone().or(existing.representative_role))
    .bind(request.contact_person.clone().or(existing.contact_person))
    .bind(request.contact_phone.clone().or(existing.contact_phone))
    .bind(request.contact_email.clone().or(existing.contact_email))
    .bind(request.trade_register.clone().or(existing.trade_register))
    .bind(request.taxpayer_account.clone().or(existing.taxpayer_account))
    .bind(request.tax_clearance.clone().or(existing.tax_clearance))
    .bind(request.social_security_number.clone().or(existing.social_security_number))
    .bind(&bank_id)
    .bind(&bank_name)
    .bind(request.bank_branch.clone().or(existing.bank_branch))
    .bind(&iban)
    .bind(&bic_swift)
    .bind(request.payment_terms.clone().or(existing.payment_terms))
    .bind(&category_kind)
    .bind(request.category.clone().or(existing.category))
    .bind(request.description.clone().or(existing.description))
    .bind(request.active.unwrap_or(existing.active))
    .bind(Utc::now())
    .bind(&supplier_id)
    .execute(pool)
    .await?;

    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_one(pool)
        .await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "supplier",
        &supplier_id,
        &format!("Updated supplier '{}'", supplier.name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        supplier,
        "Supplier updated successfully".to_string(),
    )))
}

pub async fn delete_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::is_admin)?;
    let supplier_id = path.into_inner();

    let name: Option<String> = sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_optional(pool)
        .await?;
    let name = name.ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let contract_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE supplier_id = ?")
            .bind(&supplier_id)
            .fetch_one(pool)
            .await?;
    if contract_count > 0 {
        return Err(ApiError::BadRequest(format!(
            "Cannot delete supplier '{}': {} contract(s) reference it",
            name, contract_count
        )));
    }

    sqlx::query("DELETE FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .execute(pool)
        .await?;

    log::info!("Supplier deleted: {} ({})", name, supplier_id);
    audit(
        pool,
        &claims.sub,
        "delete",
        "supplier",
        &supplier_id,
        &format!("Deleted supplier '{}'", name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        serde_json::json!({ "id": supplier_id }),
        "Supplier deleted successfully".to_string(),
    )))
}

// ==================== EVALUATION SUMMARY / MAIL ====================

#[derive(Debug, Deserialize)]
pub struct EvaluationSummaryQuery {
    pub kind: String,
}

async fn latest_vendor_evaluation(
    pool: &SqlitePool,
    supplier_id: &str,
) -> ApiResult<Option<SupplierEvaluation>> {
    let evaluation = sqlx::query_as::<_, SupplierEvaluation>(
        "SELECT * FROM supplier_evaluations WHERE supplier_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(supplier_id)
    .fetch_optional(pool)
    .await?;
    Ok(evaluation)
}

/// Preview of the mail body that `send_evaluation_mail` would send.
pub async fn get_evaluation_summary(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<EvaluationSummaryQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let supplier_id = path.into_inner();

    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let kind = EvaluationMailKind::from_param(&query.kind).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid kind '{}'. Allowed: buyer, requester",
            query.kind
        ))
    })?;

    let preview = match kind {
        EvaluationMailKind::Buyer => mailer::buyer_evaluation_preview(&supplier.name),
        EvaluationMailKind::Requester => {
            let evaluation = latest_vendor_evaluation(pool, &supplier_id)
                .await?
                .ok_or_else(|| ApiError::no_vendor_evaluations(&supplier.name))?;
            let rating = supplier_rating(pool, &supplier_id).await?;
            mailer::requester_evaluation_preview(&supplier.name, &evaluation, rating.weighted)
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(preview)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendEvaluationMailRequest {
    pub kind: String,
    #[validate(length(min = 1, message = "At least one recipient is required"))]
    pub recipients: Vec<String>,
}

pub async fn send_evaluation_mail(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<SendEvaluationMailRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let supplier_id = path.into_inner();
    request.validate()?;

    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(&supplier_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::supplier_not_found(&supplier_id))?;

    let kind = EvaluationMailKind::from_param(&request.kind).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid kind '{}'. Allowed: buyer, requester",
            request.kind
        ))
    })?;

    let (subject, body) = match kind {
        EvaluationMailKind::Buyer => mailer::buyer_evaluation_email(&supplier.name),
        EvaluationMailKind::Requester => {
            let evaluation = latest_vendor_evaluation(pool, &supplier_id)
                .await?
                .ok_or_else(|| ApiError::no_vendor_evaluations(&supplier.name))?;
            let rating = supplier_rating(pool, &supplier_id).await?;
            mailer::requester_evaluation_email(&supplier.name, &evaluation, rating.weighted)
        }
    };

    let outcomes = app_state.mailer.send_each(&request.recipients, &subject, &body);
    let sent = outcomes.iter().filter(|o| o.success).count();
    let failed = outcomes.len() - sent;

    log::info!(
        "Evaluation mail for supplier {}: {} sent, {} failed",
        supplier.name,
        sent,
        failed
    );
    audit(
        pool,
        &claims.sub,
        "send_mail",
        "supplier",
        &supplier_id,
        &format!("Sent {} evaluation mail to {} recipient(s)", request.kind, sent),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "sent": sent,
        "failed": failed,
        "outcomes": outcomes,
    }))))
}

// ==================== BANKS ====================

pub async fn list_banks(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = "SELECT COUNT(*) FROM banks WHERE 1=1".to_string();
    let mut list_sql = "SELECT * FROM banks WHERE 1=1".to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(search) = &query.search {
        let clause = " AND (name LIKE ? OR acronym LIKE ? OR bank_code LIKE ?)";
        count_sql.push_str(clause);
        list_sql.push_str(clause);
        let pattern = format!("%{}%", search);
        params.push(pattern.clone());
        params.push(pattern.clone());
        params.push(pattern);
    }

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total = count_query.fetch_one(pool).await?;

    list_sql.push_str(" ORDER BY name ASC LIMIT ? OFFSET ?");
    let mut list_query = sqlx::query_as::<_, Bank>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let banks = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: banks,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BankSuggestion {
    pub id: String,
    pub name: String,
    pub acronym: Option<String>,
    pub bank_code: Option<String>,
}

/// Compact suggestions for form autocompletion, capped at 10 rows.
pub async fn autocomplete_banks(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<SearchQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let q = query.q.as_deref().unwrap_or("").trim();
    if q.is_empty() {
        return Ok(HttpResponse::Ok().json(ApiResponse::success(Vec::<BankSuggestion>::new())));
    }

    let limit = query.limit.unwrap_or(10).clamp(1, 10);
    let pattern = format!("%{}%", q);
    let suggestions = sqlx::query_as::<_, BankSuggestion>(
        r#"
        SELECT id, name, acronym, bank_code FROM banks
        WHERE name LIKE ? OR acronym LIKE ? OR bank_code LIKE ?
        ORDER BY name ASC LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(suggestions)))
}

pub async fn get_bank_details(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let bank_id = path.into_inner();

    let bank = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE id = ?")
        .bind(&bank_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::bank_not_found(&bank_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(bank)))
}

pub async fn create_bank(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBankRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let name = request.name.trim().to_string();
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM banks WHERE LOWER(name) = LOWER(?)")
            .bind(&name)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Bank '{}' already exists",
            name
        )));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO banks (id, name, acronym, bank_code, bic_code, iban_prefix,
                           address, phone, email, website, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&name)
    .bind(&request.acronym)
    .bind(&request.bank_code)
    .bind(&request.bic_code)
    .bind(request.iban_prefix.clone().unwrap_or_else(|| "CI93".to_string()))
    .bind(&request.address)
    .bind(&request.phone)
    .bind(&request.email)
    .bind(&request.website)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let bank = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    audit(
        pool,
        &claims.sub,
        "create",
        "bank",
        &id,
        &format!("Created bank '{}'", bank.name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        bank,
        "Bank created successfully".to_string(),
    )))
}

pub async fn update_bank(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateBankRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let bank_id = path.into_inner();
    request.validate()?;

    let existing = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE id = ?")
        .bind(&bank_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::bank_not_found(&bank_id))?;

    let name = match &request.name {
        Some(name) => {
            let trimmed = name.trim().to_string();
            let clash: Option<String> =
                sqlx::query_scalar("SELECT id FROM banks WHERE LOWER(name) = LOWER(?) AND id != ?")
                    .bind(&trimmed)
                    .bind(&bank_id)
                    .fetch_optional(pool)
                    .await?;
            if clash.is_some() {
                return Err(ApiError::BadRequest(format!(
                    "Bank '{}' already exists",
                    trimmed
                )));
            }
            trimmed
        }
        None => existing.name.clone(),
    };

    sqlx::query(
        r#"
        UPDATE banks SET name = ?, acronym = ?, bank_code = ?, bic_code = ?,
                         iban_prefix = ?, address = ?, phone = ?, email = ?,
                         website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(request.acronym.clone().or(existing.acronym))
    .bind(request.bank_code.clone().or(existing.bank_code))
    .bind(request.bic_code.clone().or(existing.bic_code))
    .bind(request.iban_prefix.clone().unwrap_or(existing.iban_prefix))
    .bind(request.address.clone().or(existing.address))
    .bind(request.phone.clone().or(existing.phone))
    .bind(request.email.clone().or(existing.email))
    .bind(request.website.clone().or(existing.website))
    .bind(Utc::now())
    .bind(&bank_id)
    .execute(pool)
    .await?;

    let bank = sqlx::query_as::<_, Bank>("SELECT * FROM banks WHERE id = ?")
        .bind(&bank_id)
        .fetch_one(pool)
        .await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "bank",
        &bank_id,
        &format!("Updated bank '{}'", bank.name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        bank,
        "Bank updated successfully".to_string(),
    )))
}

pub async fn delete_bank(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::is_admin)?;
    let bank_id = path.into_inner();

    let name: Option<String> = sqlx::query_scalar("SELECT name FROM banks WHERE id = ?")
        .bind(&bank_id)
        .fetch_optional(pool)
        .await?;
    let name = name.ok_or_else(|| ApiError::bank_not_found(&bank_id))?;

    let supplier_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM suppliers WHERE bank_id = ?")
            .bind(&bank_id)
            .fetch_one(pool)
            .await?;
    if supplier_count > 0 {
        return Err(ApiError::BadRequest(format!(
            "Cannot delete bank '{}': {} supplier(s) reference it",
            name, supplier_count
        )));
    }

    sqlx::query("DELETE FROM banks WHERE id = ?")
        .bind(&bank_id)
        .execute(pool)
        .await?;

    audit(
        pool,
        &claims.sub,
        "delete",
        "bank",
        &bank_id,
        &format!("Deleted bank '{}'", name),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        serde_json::json!({ "id": bank_id }),
        "Bank deleted successfully".to_string(),
    )))
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

    async fn insert_buyer_eval(pool: &SqlitePool, supplier_id: &str, rating: f64) {
        sqlx::query(
            r#"
            INSERT INTO buyer_evaluations
                (id, supplier_id, price_flexibility, rfx_deadline_compliance, advisory_capability,
                 relationship_quality, rfx_response_quality, credit_policy, final_rating,
                 created_at, updated_at)
            VALUES (?, ?, 7, 7, 7, 7, 7, 7, ?, ?, ?)
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
    async fn test_supplier_rating_no_evaluations() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;

        let rating = supplier_rating(&pool, "s1").await.unwrap();
        assert_eq!(rating.vendor_avg, 0.0);
        assert_eq!(rating.buyer_avg, 0.0);
        assert_eq!(rating.weighted, 0.0);
        assert_eq!(rating.vendor_count, 0);
        assert_eq!(rating.buyer_count, 0);
        assert_eq!(rating.badge, "poor");
    }

    #[tokio::test]
    async fn test_supplier_rating_weighted_blend() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;
        insert_vendor_eval(&pool, "s1", 8.0).await;
        insert_buyer_eval(&pool, "s1", 7.0).await;

        let rating = supplier_rating(&pool, "s1").await.unwrap();
        assert_eq!(rating.vendor_avg, 8.0);
        assert_eq!(rating.buyer_avg, 7.0);
        // 0.6 * 8.0 + 0.4 * 7.0 = 7.6
        assert_eq!(rating.weighted, 7.6);
        assert_eq!(rating.vendor_count, 1);
        assert_eq!(rating.buyer_count, 1);
        assert_eq!(rating.badge, "good");
    }

    #[tokio::test]
    async fn test_supplier_rating_vendor_only() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;
        insert_vendor_eval(&pool, "s1", 9.0).await;
        insert_vendor_eval(&pool, "s1", 8.0).await;

        let rating = supplier_rating(&pool, "s1").await.unwrap();
        assert_eq!(rating.vendor_avg, 8.5);
        assert_eq!(rating.buyer_avg, 0.0);
        // 0.6 * 8.5 = 5.1
        assert_eq!(rating.weighted, 5.1);
        assert_eq!(rating.badge, "fair");
    }

    #[tokio::test]
    async fn test_latest_vendor_evaluation_ordering() {
        let pool = db::test_pool().await;
        insert_supplier(&pool, "s1", "ACME").await;
        assert!(latest_vendor_evaluation(&pool, "s1").await.unwrap().is_none());

        insert_vendor_eval(&pool, "s1", 6.0).await;
        let latest = latest_vendor_evaluation(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(latest.final_rating, 6.0);
    }

    #[tokio::test]
    async fn test_resolve_bank_reference_defaults() {
        let pool = db::test_pool().await;
        let reference = resolve_bank_reference(&pool, None).await.unwrap();
        assert_eq!(reference.iban_prefix, "CI93");
        assert!(reference.bank_name.is_none());

        let missing = resolve_bank_reference(&pool, Some("nope")).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty(Some("  x ".to_string())), Some("x".to_string()));
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(non_empty(None), None);
    }

    #[tokio::test]
    async fn test_bank_autocomplete_limit_is_clamped() {
        let pool = db::test_pool().await;
        for i in 0..5 {
            sqlx::query(
                r#"INSERT INTO banks (id, name, created_at, updated_at)
                   VALUES (?, ?, datetime('now'), datetime('now'))"#,
            )
            .bind(format!("b{}", i))
            .bind(format!("Banque Test {}", i))
            .execute(&pool)
            .await
            .unwrap();
        }

        let limit = 2i32.clamp(1, 10);
        let rows = sqlx::query_as::<_, BankSuggestion>(
            r#"
            SELECT id, name, acronym, bank_code FROM banks
            WHERE name LIKE ? OR acronym LIKE ? OR bank_code LIKE ?
            ORDER BY name ASC LIMIT ?
            "#,
        )
        .bind("%Banque%")
        .bind("%Banque%")
        .bind("%Banque%")
        .bind(limit)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Banque Test 0");
    }
}
