use actix_web::{
    http::header,
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use actix_cors::Cors;
use actix_web_httpauth::middleware::HttpAuthentication;
use anyhow::Context;
use rand::seq::SliceRandom;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteConnectOptions, Sqlite, SqlitePool};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit;
mod auth;
mod auth_handlers;
mod config;
mod contract_handlers;
mod db;
mod error;
mod evaluation_handlers;
mod handlers;
mod import;
mod mailer;
mod models;
mod monitoring;
mod order_handlers;
mod report_handlers;
mod supplier_handlers;

use auth::{jwt_middleware, AuthService};
use config::{load_config, Config};
use mailer::Mailer;
use monitoring::{Metrics, RequestLogger};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub mailer: Mailer,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
    ));

    create_default_admin_if_needed(&pool, &auth_service).await?;

    let mailer = Mailer::from_config(&config.smtp)?;

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        mailer,
    });

    let maintenance_pool = pool.clone();
    tokio::spawn(async move {
        monitoring::start_maintenance_tasks(maintenance_pool).await;
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let metrics_arc = Arc::new(Metrics::new());
    let workers = config.server.workers;
    let keep_alive = config.server.keep_alive;
    let client_timeout = config.server.client_timeout;
    let client_shutdown = config.server.client_shutdown;

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins, config.is_production());
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(metrics_arc.clone()))
            .app_data(web::PayloadConfig::new(config.security.max_upload_size))
            // Health and metrics, no auth
            .route("/health", web::get().to(monitoring::health_check))
            .route("/health/ready", web::get().to(monitoring::readiness_check))
            .route("/health/live", web::get().to(monitoring::liveness_check))
            .route("/metrics", web::get().to(monitoring::metrics_endpoint))
            // Login and account activation, no auth
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(auth_handlers::login))
                    .route(
                        "/activate/{token}",
                        web::post().to(auth_handlers::activate_account),
                    ),
            )
            .service(
                web::scope("/api/v1")
                    .wrap(auth_middleware)
                    .service(
                        web::scope("/auth")
                            .route("/profile", web::get().to(auth_handlers::get_profile))
                            .route(
                                "/change-password",
                                web::post().to(auth_handlers::change_password),
                            )
                            .route("/roles", web::get().to(auth_handlers::get_roles)),
                    )
                    .service(
                        web::scope("/users")
                            .route("", web::get().to(auth_handlers::list_users))
                            .route("", web::post().to(auth_handlers::create_user))
                            .route("/{id}", web::get().to(auth_handlers::get_user))
                            .route("/{id}", web::put().to(auth_handlers::update_user))
                            .route("/{id}", web::delete().to(auth_handlers::delete_user)),
                    )
                    .service(
                        web::scope("/banks")
                            .route("", web::get().to(supplier_handlers::list_banks))
                            .route("", web::post().to(supplier_handlers::create_bank))
                            .route(
                                "/autocomplete",
                                web::get().to(supplier_handlers::autocomplete_banks),
                            )
                            .route("/{id}", web::get().to(supplier_handlers::get_bank_details))
                            .route(
                                "/{id}/details",
                                web::get().to(supplier_handlers::get_bank_details),
                            )
                            .route("/{id}", web::put().to(supplier_handlers::update_bank))
                            .route("/{id}", web::delete().to(supplier_handlers::delete_bank)),
                    )
                    .service(
                        web::scope("/suppliers")
                            .route("", web::get().to(supplier_handlers::list_suppliers))
                            .route("", web::post().to(supplier_handlers::create_supplier))
                            .route("/{id}", web::get().to(supplier_handlers::get_supplier))
                            .route("/{id}", web::put().to(supplier_handlers::update_supplier))
                            .route("/{id}", web::delete().to(supplier_handlers::delete_supplier))
                            .route(
                                "/{id}/evaluation-summary",
                                web::get().to(supplier_handlers::get_evaluation_summary),
                            )
                            .route(
                                "/{id}/send-evaluation-mail",
                                web::post().to(supplier_handlers::send_evaluation_mail),
                            ),
                    )
                    .service(
                        web::scope("/contracts")
                            .route("", web::get().to(contract_handlers::list_contracts))
                            .route("", web::post().to(contract_handlers::create_contract))
                            .route(
                                "/expiring",
                                web::get().to(contract_handlers::get_expiring_contracts),
                            )
                            .route("/{id}", web::get().to(contract_handlers::get_contract))
                            .route("/{id}", web::put().to(contract_handlers::update_contract))
                            .route("/{id}", web::delete().to(contract_handlers::delete_contract))
                            .route(
                                "/{id}/validate",
                                web::post().to(contract_handlers::validate_contract),
                            )
                            .route(
                                "/{id}/reject",
                                web::post().to(contract_handlers::reject_contract),
                            ),
                    )
                    .service(
                        web::scope("/evaluations")
                            .route("/criteria", web::get().to(evaluation_handlers::get_criteria))
                            .route("/ranking", web::get().to(evaluation_handlers::get_ranking))
                            .route(
                                "/suppliers/{id}/stats",
                                web::get().to(evaluation_handlers::get_supplier_stats),
                            )
                            .route(
                                "/vendor",
                                web::get().to(evaluation_handlers::list_vendor_evaluations),
                            )
                            .route(
                                "/vendor",
                                web::post().to(evaluation_handlers::create_vendor_evaluation),
                            )
                            .route(
                                "/vendor/{id}",
                                web::get().to(evaluation_handlers::get_vendor_evaluation),
                            )
                            .route(
                                "/vendor/{id}",
                                web::put().to(evaluation_handlers::update_vendor_evaluation),
                            )
                            .route(
                                "/vendor/{id}",
                                web::delete().to(evaluation_handlers::delete_vendor_evaluation),
                            )
                            .route(
                                "/buyer",
                                web::get().to(evaluation_handlers::list_buyer_evaluations),
                            )
                            .route(
                                "/buyer",
                                web::post().to(evaluation_handlers::create_buyer_evaluation),
                            )
                            .route(
                                "/buyer/{id}",
                                web::get().to(evaluation_handlers::get_buyer_evaluation),
                            )
                            .route(
                                "/buyer/{id}",
                                web::put().to(evaluation_handlers::update_buyer_evaluation),
                            )
                            .route(
                                "/buyer/{id}",
                                web::delete().to(evaluation_handlers::delete_buyer_evaluation),
                            ),
                    )
                    .service(
                        web::scope("/orders")
                            .route("", web::get().to(order_handlers::list_orders))
                            .route("/imports", web::get().to(order_handlers::list_imported_files))
                            .route("/import", web::post().to(order_handlers::import_orders))
                            .route("/{id}", web::get().to(order_handlers::get_order)),
                    )
                    .service(
                        web::scope("/reports")
                            .route(
                                "/contracts.csv",
                                web::get().to(report_handlers::export_contracts_csv),
                            )
                            .route(
                                "/suppliers.csv",
                                web::get().to(report_handlers::export_suppliers_csv),
                            )
                            .route(
                                "/evaluations.csv",
                                web::get().to(report_handlers::export_evaluations_csv),
                            )
                            .route(
                                "/ranking/top.csv",
                                web::get().to(report_handlers::export_top_suppliers_csv),
                            )
                            .route(
                                "/ranking/bottom.csv",
                                web::get().to(report_handlers::export_bottom_suppliers_csv),
                            )
                            .route(
                                "/suppliers/{id}/evaluations.csv",
                                web::get().to(report_handlers::export_supplier_evaluations_csv),
                            )
                            .route(
                                "/ranking.xlsx",
                                web::get().to(report_handlers::export_ranking_xlsx),
                            ),
                    )
                    .route("/dashboard", web::get().to(handlers::get_dashboard)),
            )
    })
    .keep_alive(Duration::from_secs(keep_alive))
    .client_request_timeout(Duration::from_secs(client_timeout))
    .client_disconnect_timeout(Duration::from_secs(client_shutdown));

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret == "dummy_development_secret_32_chars!"
        || config.auth.jwt_secret.len() < 32
    {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }

    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    if config.smtp.dry_run {
        log::warn!("SMTP dry run is enabled in production, no mail will be sent");
    }

    Ok(())
}

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .expose_headers(vec![header::CONTENT_DISPOSITION, header::CONTENT_LENGTH])
        .max_age(3600);

    if allowed_origins.contains(&"*".to_string()) {
        if is_production {
            panic!("Cannot start server with wildcard CORS in production");
        }
        log::warn!("Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload",
        ));
    }

    headers
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(
    db_config: &crate::config::DatabaseConfig,
) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_config.url.trim_start_matches("sqlite:"))
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect_with(options)
        .await?;

    Ok(pool)
}

// Generated password satisfies the strength rules checked at login.
fn generate_admin_password() -> String {
    let mut rng = thread_rng();
    let digits: Vec<char> = "0123456789".chars().collect();
    let uppercase: Vec<char> = "ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().collect();
    let lowercase: Vec<char> = "abcdefghijklmnopqrstuvwxyz".chars().collect();

    let mut pwd_chars: Vec<char> = Vec::new();
    pwd_chars.push(*digits.choose(&mut rng).unwrap());
    pwd_chars.push(*uppercase.choose(&mut rng).unwrap());
    pwd_chars.push(*lowercase.choose(&mut rng).unwrap());

    for _ in 0..13 {
        pwd_chars.push(char::from(rng.sample(Alphanumeric)));
    }

    pwd_chars.shuffle(&mut rng);
    pwd_chars.into_iter().collect()
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 > 0 {
        return Ok(());
    }

    let password =
        env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| generate_admin_password());

    let password_hash = auth_service
        .hash_password(&password)
        .map_err(|e| anyhow::anyhow!("Failed to hash default admin password: {}", e))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (
            id, email, first_name, last_name, role, password_hash,
            is_active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, 'admin', ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind("admin@srm.local")
    .bind("Default")
    .bind("Admin")
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create default admin user")?;

    log::warn!("Default admin account created:");
    log::warn!("  Email: admin@srm.local");
    log::warn!("  Password: {} (generated - change immediately)", password);

    Ok(())
}
