use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

// Domain-specific helpers
impl ApiError {
    pub fn supplier_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Supplier with ID '{}' not found", id))
    }

    pub fn contract_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Contract with ID '{}' not found", id))
    }

    pub fn evaluation_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Evaluation with ID '{}' not found", id))
    }

    pub fn bank_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Bank with ID '{}' not found", id))
    }

    pub fn order_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Purchase order with ID '{}' not found", id))
    }

    pub fn contract_number_taken(number: &str) -> Self {
        ApiError::BadRequest(format!("Contract number '{}' is already in use", number))
    }

    pub fn supplier_already_exists(name: &str) -> Self {
        ApiError::BadRequest(format!("Supplier '{}' already exists", name))
    }

    pub fn validation_rights_required() -> Self {
        ApiError::Forbidden("Only an administrator can validate or reject contracts".to_string())
    }

    pub fn no_vendor_evaluations(name: &str) -> Self {
        ApiError::BadRequest(format!(
            "Supplier '{}' has no vendor evaluation to summarize",
            name
        ))
    }
}

// Free validation helpers shared by several handlers
pub fn validate_currency(currency: &str) -> Result<(), ApiError> {
    let valid = ["XOF", "EUR", "USD", "GBP"];
    if !valid.contains(&currency) {
        return Err(ApiError::ValidationError(format!(
            "Invalid currency '{}'. Valid currencies: {}",
            currency,
            valid.join(", ")
        )));
    }
    Ok(())
}

pub fn validate_amount(amount: f64) -> Result<(), ApiError> {
    if amount < 0.0 {
        return Err(ApiError::ValidationError(
            "Amount cannot be negative".to_string(),
        ));
    }
    if amount > 1e15 {
        return Err(ApiError::ValidationError("Amount too large".to_string()));
    }
    Ok(())
}
