// src/contract_handlers.rs - contract lifecycle endpoints
//
// Contracts are created in pending status and only an administrator can
// move them to active or rejected.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::audit::audit;
use crate::auth::{get_current_user, require_permission, UserRole};
use crate::error::{validate_amount, validate_currency, ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{
    Contract, ContractKind, ContractStatus, CreateContractRequest, RenewalKind,
    UpdateContractRequest,
};
use crate::AppState;

fn validate_contract_kind(kind: &str) -> ApiResult<()> {
    ContractKind::from_str(kind).map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid contract kind '{}'. Allowed: capex, opex, service, works, it",
            kind
        ))
    })?;
    Ok(())
}

fn validate_renewal_kind(kind: &str) -> ApiResult<()> {
    RenewalKind::from_str(kind).map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid renewal kind '{}'. Allowed: tacit, express_agreement, amendment",
            kind
        ))
    })?;
    Ok(())
}

fn validate_date(value: &str, field: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid {} '{}', expected YYYY-MM-DD", field, value))
    })
}

// ==================== LIST / GET ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ContractListItem {
    pub id: String,
    pub number: String,
    pub subject: String,
    pub kind: String,
    pub amount: f64,
    pub currency: String,
    pub expiry_date: String,
    pub status: String,
    pub supplier_id: String,
    pub supplier_name: String,
}

pub async fn list_contracts(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let (page, per_page, offset) = query.normalize();

    let mut count_sql = r#"
        SELECT COUNT(*) FROM contracts c
        JOIN suppliers s ON s.id = c.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut list_sql = r#"
        SELECT c.id, c.number, c.subject, c.kind, c.amount, c.currency,
               c.expiry_date, c.status, c.supplier_id, s.name AS supplier_name
        FROM contracts c
        JOIN suppliers s ON s.id = c.supplier_id
        WHERE 1=1
    "#
    .to_string();
    let mut params: Vec<String> = Vec::new();

    if let Some(status) = &query.status {
        count_sql.push_str(" AND c.status = ?");
        list_sql.push_str(" AND c.status = ?");
        params.push(status.clone());
    }
    if let Some(kind) = &query.kind {
        count_sql.push_str(" AND c.kind = ?");
        list_sql.push_str(" AND c.kind = ?");
        params.push(kind.clone());
    }
    if let Some(supplier_id) = &query.supplier_id {
        count_sql.push_str(" AND c.supplier_id = ?");
        list_sql.push_str(" AND c.supplier_id = ?");
        params.push(supplier_id.clone());
    }
    if let Some(search) = &query.search {
        let clause = " AND (c.number LIKE ? OR c.subject LIKE ? OR s.name LIKE ?)";
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

    let order = query.order_clause(
        &["number", "subject", "amount", "expiry_date", "status", "created_at"],
        "expiry_date",
    );
    list_sql.push_str(&format!(" ORDER BY c.{} LIMIT ? OFFSET ?", order));
    let mut list_query = sqlx::query_as::<_, ContractListItem>(&list_sql);
    for param in &params {
        list_query = list_query.bind(param);
    }
    let contracts = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: contracts,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

#[derive(Debug, Serialize)]
pub struct ContractDetail {
    #[serde(flatten)]
    pub contract: Contract,
    pub supplier_name: String,
    pub days_until_expiry: Option<i64>,
    pub needs_renewal: bool,
}

pub async fn get_contract(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let contract_id = path.into_inner();

    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(&contract_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::contract_not_found(&contract_id))?;

    let supplier_name: String = sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
        .bind(&contract.supplier_id)
        .fetch_one(pool)
        .await?;

    let today = Utc::now().date_naive();
    let detail = ContractDetail {
        days_until_expiry: contract.days_until_expiry(today),
        needs_renewal: contract.needs_renewal(today),
        supplier_name,
        contract,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}

/// Active contracts currently inside their notice window, soonest first.
pub async fn get_expiring_contracts(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let today = Utc::now().date_naive();

    let contracts = sqlx::query_as::<_, Contract>(
        "SELECT * FROM contracts WHERE status = 'active' ORDER BY expiry_date ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut expiring = Vec::new();
    for contract in contracts {
        if contract.needs_renewal(today) {
            let supplier_name: String =
                sqlx::query_scalar("SELECT name FROM suppliers WHERE id = ?")
                    .bind(&contract.supplier_id)
                    .fetch_one(pool)
                    .await?;
            expiring.push(ContractDetail {
                days_until_expiry: contract.days_until_expiry(today),
                needs_renewal: true,
                supplier_name,
                contract,
            });
        }
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(expiring)))
}

// ==================== CREATE / UPDATE / DELETE ====================

pub async fn create_contract(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateContractRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    validate_contract_kind(&request.kind)?;
    validate_amount(request.amount)?;
    let currency = request.currency.clone().unwrap_or_else(|| "XOF".to_string());
    validate_currency(&currency)?;
    if let Some(renewal) = &request.renewal_kind {
        validate_renewal_kind(renewal)?;
    }
    validate_date(&request.expiry_date, "expiry date")?;
    if let Some(date) = &request.signature_date {
        validate_date(date, "signature date")?;
    }
    if let Some(date) = &request.effective_date {
        validate_date(date, "effective date")?;
    }

    let supplier_exists: Option<String> =
        sqlx::query_scalar("SELECT id FROM suppliers WHERE id = ?")
            .bind(&request.supplier_id)
            .fetch_optional(pool)
            .await?;
    if supplier_exists.is_none() {
        return Err(ApiError::supplier_not_found(&request.supplier_id));
    }

    let number = request.number.trim().to_string();
    let clash: Option<String> = sqlx::query_scalar("SELECT id FROM contracts WHERE number = ?")
        .bind(&number)
        .fetch_optional(pool)
        .await?;
    if clash.is_some() {
        return Err(ApiError::contract_number_taken(&number));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO contracts (
            id, number, subject, kind, contract_type, activity_type, amount,
            currency, signature_date, effective_date, expiry_date, notice_days,
            duration_years, renewal_kind, supplier_id, status, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&number)
    .bind(request.subject.trim())
    .bind(&request.kind)
    .bind(&request.contract_type)
    .bind(&request.activity_type)
    .bind(request.amount)
    .bind(&currency)
    .bind(&request.signature_date)
    .bind(&request.effective_date)
    .bind(&request.expiry_date)
    .bind(request.notice_days.unwrap_or(90))
    .bind(request.duration_years)
    .bind(&request.renewal_kind)
    .bind(&request.supplier_id)
    .bind(&claims.sub)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    log::info!("Contract created: {} ({})", contract.number, contract.id);
    audit(
        pool,
        &claims.sub,
        "create",
        "contract",
        &id,
        &format!("Created contract '{}'", contract.number),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        contract,
        "Contract created successfully".to_string(),
    )))
}

pub async fn update_contract(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateContractRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = get_current_user(&http_request)?;
    let contract_id = path.into_inner();
    request.validate()?;

    let existing = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(&contract_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::contract_not_found(&contract_id))?;

    let kind = request.kind.clone().unwrap_or_else(|| existing.kind.clone());
    validate_contract_kind(&kind)?;
    let amount = request.amount.unwrap_or(existing.amount);
    validate_amount(amount)?;
    let currency = request
        .currency
        .clone()
        .unwrap_or_else(|| existing.currency.clone());
    validate_currency(&currency)?;
    if let Some(renewal) = &request.renewal_kind {
        validate_renewal_kind(renewal)?;
    }
    let expiry_date = request
        .expiry_date
        .clone()
        .unwrap_or_else(|| existing.expiry_date.clone());
    validate_date(&expiry_date, "expiry date")?;

    let supplier_id = request
        .supplier_id
        .clone()
        .unwrap_or_else(|| existing.supplier_id.clone());
    let supplier_exists: Option<String> =
        sqlx::query_scalar("SELECT id FROM suppliers WHERE id = ?")
            .bind(&supplier_id)
            .fetch_optional(pool)
            .await?;
    if supplier_exists.is_none() {
        return Err(ApiError::supplier_not_found(&supplier_id));
    }

    sqlx::query(
        r#"
        UPDATE contracts SET
            subject = ?, kind = ?, contract_type = ?, activity_type = ?,
            amount = ?, currency = ?, signature_date = ?, effective_date = ?,
            expiry_date = ?, notice_days = ?, duration_years = ?,
            renewal_kind = ?, supplier_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(request.subject.clone().unwrap_or(existing.subject))
    .bind(&kind)
    .bind(request.contract_type.clone().or(existing.contract_type))
    .bind(request.activity_type.clone().or(existing.activity_type))
    .bind(amount)
    .bind(&currency)
    .bind(request.signature_date.clone().or(existing.signature_date))
    .bind(request.effective_date.clone().or(existing.effective_date))
    .bind(&expiry_date)
    .bind(request.notice_days.unwrap_or(existing.notice_days))
    .bind(request.duration_years.or(existing.duration_years))
    .bind(request.renewal_kind.clone().or(existing.renewal_kind))
    .bind(&supplier_id)
    .bind(Utc::now())
    .bind(&contract_id)
    .execute(pool)
    .await?;

    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(&contract_id)
        .fetch_one(pool)
        .await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "contract",
        &contract_id,
        &format!("Updated contract '{}'", contract.number),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        contract,
        "Contract updated successfully".to_string(),
    )))
}

pub async fn delete_contract(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::is_admin)?;
    let contract_id = path.into_inner();

    let number: Option<String> = sqlx::query_scalar("SELECT number FROM contracts WHERE id = ?")
        .bind(&contract_id)
        .fetch_optional(pool)
        .await?;
    let number = number.ok_or_else(|| ApiError::contract_not_found(&contract_id))?;

    sqlx::query("DELETE FROM contracts WHERE id = ?")
        .bind(&contract_id)
        .execute(pool)
        .await?;

    log::info!("Contract deleted: {} ({})", number, contract_id);
    audit(
        pool,
        &claims.sub,
        "delete",
        "contract",
        &contract_id,
        &format!("Deleted contract '{}'", number),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        serde_json::json!({ "id": contract_id }),
        "Contract deleted successfully".to_string(),
    )))
}

// ==================== VALIDATION WORKFLOW ====================

async fn transition_contract(
    app_state: &AppState,
    http_request: &HttpRequest,
    contract_id: &str,
    new_status: ContractStatus,
) -> ApiResult<Contract> {
    let pool = &app_state.db_pool;
    let claims = require_permission(http_request, UserRole::can_validate_contracts)
        .map_err(|_| ApiError::validation_rights_required())?;

    let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(contract_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::contract_not_found(contract_id))?;

    if contract.status != ContractStatus::Pending.to_string() {
        return Err(ApiError::BadRequest(format!(
            "Contract '{}' is not pending validation (status: {})",
            contract.number, contract.status
        )));
    }

    sqlx::query("UPDATE contracts SET status = ?, validated_by = ?, updated_at = ? WHERE id = ?")
        .bind(new_status.to_string())
        .bind(&claims.sub)
        .bind(Utc::now())
        .bind(contract_id)
        .execute(pool)
        .await?;

    let updated = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = ?")
        .bind(contract_id)
        .fetch_one(pool)
        .await?;

    log::info!(
        "Contract {} moved to {} by {}",
        updated.number,
        updated.status,
        claims.email
    );
    audit(
        pool,
        &claims.sub,
        new_status.to_string().as_str(),
        "contract",
        contract_id,
        &format!("Contract '{}' moved to {}", updated.number, updated.status),
        http_request,
    )
    .await;

    Ok(updated)
}

pub async fn validate_contract(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let contract =
        transition_contract(&app_state, &http_request, &path.into_inner(), ContractStatus::Active)
            .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        contract,
        "Contract validated".to_string(),
    )))
}

pub async fn reject_contract(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let contract = transition_contract(
        &app_state,
        &http_request,
        &path.into_inner(),
        ContractStatus::Rejected,
    )
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        contract,
        "Contract rejected".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_contract_kind() {
        assert!(validate_contract_kind("capex").is_ok());
        assert!(validate_contract_kind("opex").is_ok());
        assert!(validate_contract_kind("it").is_ok());
        assert!(validate_contract_kind("lease").is_err());
    }

    #[test]
    fn test_validate_renewal_kind() {
        assert!(validate_renewal_kind("tacit").is_ok());
        assert!(validate_renewal_kind("express_agreement").is_ok());
        assert!(validate_renewal_kind("automatic").is_err());
    }

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2026-12-31", "expiry date").is_ok());
        assert!(validate_date("31/12/2026", "expiry date").is_err());
        assert!(validate_date("2026-13-01", "expiry date").is_err());
    }
}
