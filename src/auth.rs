use actix_web::web;
use actix_web::HttpMessage;
use actix_web::{dev::ServiceRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ======== USER MODEL ========

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub temporary_password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub activation_token: Option<String>,
    pub activation_token_created_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ======== USER ROLE ========

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum UserRole {
    Admin,
    Collaborator,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "collaborator" => Some(UserRole::Collaborator),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Collaborator => "collaborator",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Administrator",
            UserRole::Collaborator => "Collaborator",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UserRole::Admin => {
                "Full access: contract validation, imports, exports and user management"
            }
            UserRole::Collaborator => {
                "Creates suppliers, contracts and evaluations; no validation or export rights"
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== USER MANAGEMENT ========
    pub fn can_manage_users(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== CONTRACT PERMISSIONS ========
    pub fn can_validate_contracts(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== REPORT PERMISSIONS ========
    pub fn can_export_reports(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== IMPORT PERMISSIONS ========
    pub fn can_import_orders(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn all_roles() -> Vec<Self> {
        vec![UserRole::Admin, UserRole::Collaborator]
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Department cannot exceed 100 characters"))]
    pub department: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateAccountRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Temporary password is required"))]
    pub temporary_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub department: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: UserRole::from_str(&user.role).unwrap_or(UserRole::Collaborator),
            department: user.department,
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        match validate_password_strength(password) {
            Ok(_) => hash(password, 12),
            Err(e) => Err(bcrypt::BcryptError::InvalidHash(e.to_string())),
        }
    }

    /// Temporary passwords are random, so strength rules do not apply.
    pub fn hash_temporary_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        hash(password, 12)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        verify(password, hash)
    }

    pub fn token_expiration_hours(&self) -> i64 {
        self.token_expiration_hours
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: format!("{} {}", user.first_name, user.last_name),
            role: UserRole::from_str(&user.role).unwrap_or(UserRole::Collaborator),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

// ======== ACTIVATION HELPERS ========

pub fn generate_temporary_password() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

pub fn generate_activation_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_activation_token(pool: &SqlitePool, token: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE activation_token = ?")
            .bind(token)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("Activation token not found".to_string()))
    }

    /// Create a pending account. The caller generates the temporary
    /// password and token and mails them to the user.
    pub async fn create_pending(
        pool: &SqlitePool,
        request: &CreateUserRequest,
        role: UserRole,
        temporary_password_hash: &str,
        activation_token: &str,
    ) -> ApiResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // Accounts cannot be logged into until activated, so the real
        // password slot holds the temporary hash as a placeholder.
        let user = User {
            id: id.clone(),
            email: request.email.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            phone: request.phone.clone(),
            department: request.department.clone(),
            role: role.as_str().to_string(),
            password_hash: temporary_password_hash.to_string(),
            is_active: false,
            temporary_password_hash: Some(temporary_password_hash.to_string()),
            activation_token: Some(activation_token.to_string()),
            activation_token_created_at: Some(now),
            last_login: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO users (
                id, email, first_name, last_name, phone, department, role,
                password_hash, is_active, temporary_password_hash,
                activation_token, activation_token_created_at,
                failed_login_attempts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.department)
        .bind(&user.role)
        .bind(&user.password_hash)
        .bind(user.is_active as i32)
        .bind(&user.temporary_password_hash)
        .bind(&user.activation_token)
        .bind(user.activation_token_created_at)
        .bind(user.failed_login_attempts)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub fn activation_token_valid(&self, validity_hours: i64) -> bool {
        match self.activation_token_created_at {
            Some(issued) => Utc::now() - issued <= Duration::hours(validity_hours),
            None => false,
        }
    }

    /// Complete the activation flow: set the real password, mark active,
    /// clear the token and temporary password.
    pub async fn activate(&self, pool: &SqlitePool, new_password_hash: &str) -> ApiResult<()> {
        sqlx::query(
            r#"UPDATE users SET
                password_hash = ?, is_active = 1,
                temporary_password_hash = NULL,
                activation_token = NULL,
                activation_token_created_at = NULL,
                updated_at = datetime('now')
            WHERE id = ?"#,
        )
        .bind(new_password_hash)
        .bind(&self.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_last_login(&self, pool: &SqlitePool) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_login = datetime('now') WHERE id = ?")
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        pool: &SqlitePool,
        current_password: &str,
        new_password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<()> {
        if !auth_service
            .verify_password(current_password, &self.password_hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?
        {
            return Err(ApiError::AuthError("Current password is incorrect".to_string()));
        }

        validate_password_strength(new_password)?;

        let new_hash = auth_service
            .hash_password(new_password)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))?;

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(&new_hash)
            .bind(&self.id)
            .execute(pool)
            .await?;

        Ok(())
    }

    // Methods for lock management
    pub fn is_locked(&self) -> bool {
        if let Some(locked_until) = self.locked_until {
            Utc::now() < locked_until
        } else {
            false
        }
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE users SET failed_login_attempts = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(
        &mut self,
        pool: &SqlitePool,
        duration: Duration,
    ) -> ApiResult<()> {
        self.locked_until = Some(Utc::now() + duration);
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(self.locked_until)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query("UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?")
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

pub fn check_permission<F>(claims: &Claims, check: F) -> ApiResult<()>
where
    F: Fn(&UserRole) -> bool,
{
    if check(&claims.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

pub fn require_permission(
    req: &HttpRequest,
    permission_check: fn(&UserRole) -> bool,
) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, permission_check)?;
    Ok(claims)
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Passw0rd").is_ok());
        assert!(validate_password_strength("short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
    }

    #[test]
    fn test_role_permissions() {
        let admin = UserRole::Admin;
        let collab = UserRole::Collaborator;

        assert!(admin.can_validate_contracts());
        assert!(admin.can_export_reports());
        assert!(admin.can_import_orders());
        assert!(admin.can_manage_users());

        assert!(!collab.can_validate_contracts());
        assert!(!collab.can_export_reports());
        assert!(!collab.can_import_orders());
        assert!(!collab.can_manage_users());
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(UserRole::from_str("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("collaborator"), Some(UserRole::Collaborator));
        assert_eq!(UserRole::from_str("manager"), None);
    }

    #[test]
    fn test_token_round_trip() {
        let service = AuthService::new("test_secret_1234567890_1234567890_12", 24);
        let now = Utc::now();
        let user = User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Diabate".to_string(),
            phone: None,
            department: None,
            role: "admin".to_string(),
            password_hash: String::new(),
            is_active: true,
            temporary_password_hash: None,
            activation_token: None,
            activation_token_created_at: None,
            last_login: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        let token = service.generate_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, UserRole::Admin);

        let other = AuthService::new("another_secret_9876543210_987654321", 24);
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_activation_token_validity() {
        let now = Utc::now();
        let mut user = User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Diabate".to_string(),
            phone: None,
            department: None,
            role: "collaborator".to_string(),
            password_hash: String::new(),
            is_active: false,
            temporary_password_hash: Some("hash".to_string()),
            activation_token: Some("token".to_string()),
            activation_token_created_at: Some(now - Duration::hours(12)),
            last_login: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        assert!(user.activation_token_valid(48));

        user.activation_token_created_at = Some(now - Duration::hours(49));
        assert!(!user.activation_token_valid(48));

        user.activation_token_created_at = None;
        assert!(!user.activation_token_valid(48));
    }

    #[test]
    fn test_generated_credentials_shape() {
        assert_eq!(generate_temporary_password().len(), 12);
        assert_eq!(generate_activation_token().len(), 48);
        assert_ne!(generate_activation_token(), generate_activation_token());
    }
}
