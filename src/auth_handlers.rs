// src/auth_handlers.rs - authentication and user administration
//
// New accounts are created by an administrator in a pending state. The
// user receives a temporary password and an activation link by mail and
// activates the account with a password of their own.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::audit::audit;
use crate::auth::{
    generate_activation_token, generate_temporary_password, get_current_user, require_permission,
    ActivateAccountRequest, AuthService, ChangePasswordRequest, CreateUserRequest, LoginRequest,
    LoginResponse, User, UserInfo, UserRole,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::mailer;
use crate::AppState;

// ==================== LOGIN / PROFILE ====================

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;

    let mut user = User::find_by_email(pool, &request.email)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid email or password".to_string()))?;

    if user.is_locked() {
        return Err(ApiError::AuthError(
            "Account is temporarily locked. Try again later.".to_string(),
        ));
    }

    if !user.is_active {
        return Err(ApiError::AuthError(
            "Account is not activated. Check your activation email.".to_string(),
        ));
    }

    if !auth_service
        .verify_password(&request.password, &user.password_hash)
        .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?
    {
        user.increment_failed_attempts(pool).await?;

        let max_attempts = app_state.config.auth.max_login_attempts as i64;
        if user.failed_login_attempts >= max_attempts {
            let lockout = Duration::minutes(app_state.config.auth.lockout_duration_minutes as i64);
            user.lock_for_duration(pool, lockout).await?;
            log::warn!("Account locked after failed logins: {}", user.email);
            return Err(ApiError::AuthError(
                "Account locked due to too many failed attempts.".to_string(),
            ));
        }

        return Err(ApiError::BadRequest("Invalid email or password".to_string()));
    }

    user.reset_failed_attempts(pool).await?;
    user.update_last_login(pool).await?;

    let token = auth_service.generate_token(&user)?;
    let response = LoginResponse {
        token,
        expires_in: auth_service.token_expiration_hours() * 3600,
        user: user.clone().into(),
    };

    log::info!("User {} logged in", user.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

/// Complete the activation flow started by an admin creating the account.
pub async fn activate_account(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    path: web::Path<String>,
    request: web::Json<ActivateAccountRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let pool = &app_state.db_pool;
    let token = path.into_inner();

    let user = User::find_by_activation_token(pool, &token)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid or expired activation link".to_string()))?;

    if user.is_active {
        return Err(ApiError::BadRequest("Account is already activated".to_string()));
    }
    if user.email.to_lowercase() != request.email.to_lowercase() {
        return Err(ApiError::BadRequest("Email does not match this activation link".to_string()));
    }
    if !user.activation_token_valid(app_state.config.auth.activation_token_hours) {
        return Err(ApiError::BadRequest(
            "Activation link has expired. Ask an administrator for a new one.".to_string(),
        ));
    }

    let temp_hash = user
        .temporary_password_hash
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired activation link".to_string()))?;
    if !auth_service
        .verify_password(&request.temporary_password, temp_hash)
        .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?
    {
        return Err(ApiError::BadRequest("Temporary password is incorrect".to_string()));
    }

    let new_hash = auth_service
        .hash_password(&request.new_password)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to hash password: {}", e)))?;
    user.activate(pool, &new_hash).await?;

    log::info!("Account activated: {}", user.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Account activated. You can now log in.".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;
    let info: UserInfo = user.into();
    Ok(HttpResponse::Ok().json(ApiResponse::success(info)))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;

    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;
    user.change_password(
        &app_state.db_pool,
        &request.current_password,
        &request.new_password,
        &auth_service,
    )
    .await?;

    log::info!("User {} changed password", user.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

// ==================== USER MANAGEMENT (ADMIN) ====================

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user: UserInfo,
    pub activation_mail_sent: bool,
}

pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<CreateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::can_manage_users)?;
    request.validate()?;

    let role = match &request.role {
        Some(role_str) => UserRole::from_str(role_str).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid role '{}'. Valid roles: admin, collaborator",
                role_str
            ))
        })?,
        None => UserRole::Collaborator,
    };

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Email '{}' already exists",
            request.email
        )));
    }

    let temporary_password = generate_temporary_password();
    let activation_token = generate_activation_token();
    let temp_hash = auth_service
        .hash_temporary_password(&temporary_password)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to hash password: {}", e)))?;

    let user = User::create_pending(pool, &request, role, &temp_hash, &activation_token).await?;

    // A mail failure must not roll back the account; the admin can
    // re-trigger the mail or pass the credentials along by hand.
    let activation_url = app_state.mailer.activation_url(&activation_token);
    let (subject, body) =
        mailer::activation_email(&user.first_name, &activation_url, &temporary_password);
    let mail_sent = match app_state.mailer.send(&user.email, &subject, &body) {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to send activation mail to {}: {:#}", user.email, e);
            false
        }
    };

    log::info!(
        "Admin {} created user {} with role {}",
        claims.email,
        user.email,
        role
    );
    audit(
        pool,
        &claims.sub,
        "create",
        "user",
        &user.id,
        &format!("Created user '{}' ({})", user.email, role),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        CreateUserResponse {
            user: user.into(),
            activation_mail_sent: mail_sent,
        },
        "User created. Activation instructions sent by mail.".to_string(),
    )))
}

pub async fn list_users(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, UserRole::can_manage_users)?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&app_state.db_pool)
        .await?;
    let infos: Vec<UserInfo> = users.into_iter().map(|u| u.into()).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(infos)))
}

pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, UserRole::can_manage_users)?;

    let user = User::find_by_id(&app_state.db_pool, &path.into_inner()).await?;
    let info: UserInfo = user.into();
    Ok(HttpResponse::Ok().json(ApiResponse::success(info)))
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub is_active: Option<bool>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Department cannot exceed 100 characters"))]
    pub department: Option<String>,
}

pub async fn update_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::can_manage_users)?;
    let user_id = path.into_inner();
    request.validate()?;

    let existing = User::find_by_id(pool, &user_id).await?;

    let role = match &request.role {
        Some(role_str) => UserRole::from_str(role_str)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Invalid role '{}'. Valid roles: admin, collaborator",
                    role_str
                ))
            })?
            .as_str()
            .to_string(),
        None => existing.role.clone(),
    };

    // Admins cannot demote or deactivate themselves
    if user_id == claims.sub {
        if role != claims.role.as_str() {
            return Err(ApiError::BadRequest("Cannot change your own role".to_string()));
        }
        if request.is_active == Some(false) {
            return Err(ApiError::BadRequest(
                "Cannot deactivate your own account".to_string(),
            ));
        }
    }

    sqlx::query(
        "UPDATE users SET role = ?, is_active = ?, phone = ?, department = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&role)
    .bind(request.is_active.unwrap_or(existing.is_active))
    .bind(request.phone.clone().or(existing.phone))
    .bind(request.department.clone().or(existing.department))
    .bind(Utc::now())
    .bind(&user_id)
    .execute(pool)
    .await?;

    let user = User::find_by_id(pool, &user_id).await?;

    audit(
        pool,
        &claims.sub,
        "update",
        "user",
        &user_id,
        &format!("Updated user '{}'", user.email),
        &http_request,
    )
    .await;

    let info: UserInfo = user.into();
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        info,
        "User updated successfully".to_string(),
    )))
}

pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let pool = &app_state.db_pool;
    let claims = require_permission(&http_request, UserRole::can_manage_users)?;
    let user_id = path.into_inner();

    if user_id == claims.sub {
        return Err(ApiError::BadRequest("Cannot delete your own account".to_string()));
    }

    let target = User::find_by_id(pool, &user_id).await?;

    if target.role == UserRole::Admin.as_str() {
        let admin_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
        )
        .fetch_one(pool)
        .await?;
        if admin_count <= 1 {
            return Err(ApiError::BadRequest(
                "Cannot delete the last administrator".to_string(),
            ));
        }
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user_id)
        .execute(pool)
        .await?;

    log::info!("Admin {} deleted user {}", claims.email, target.email);
    audit(
        pool,
        &claims.sub,
        "delete",
        "user",
        &user_id,
        &format!("Deleted user '{}'", target.email),
        &http_request,
    )
    .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "User deleted successfully".to_string(),
    )))
}

pub async fn get_roles(http_request: HttpRequest) -> ApiResult<HttpResponse> {
    require_permission(&http_request, UserRole::can_manage_users)?;

    #[derive(Serialize)]
    struct RoleInfo {
        id: &'static str,
        name: &'static str,
        description: &'static str,
    }

    let roles: Vec<RoleInfo> = UserRole::all_roles()
        .into_iter()
        .map(|role| RoleInfo {
            id: role.as_str(),
            name: role.display_name(),
            description: role.description(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}
