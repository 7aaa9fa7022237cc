// src/db.rs - Database migrations and setup

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Users table. Accounts start inactive and are unlocked through the
    // activation flow (temporary password + token, 48h validity).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            first_name TEXT NOT NULL CHECK(length(first_name) <= 100),
            last_name TEXT NOT NULL CHECK(length(last_name) <= 100),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 30),
            department TEXT CHECK(department IS NULL OR length(department) <= 100),
            role TEXT NOT NULL DEFAULT 'collaborator' CHECK(
                role IN ('admin', 'collaborator')
            ),
            password_hash TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0 CHECK(is_active IN (0, 1)),
            temporary_password_hash TEXT,
            activation_token TEXT,
            activation_token_created_at DATETIME,
            last_login DATETIME,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Bank reference registry used to prefill supplier bank details
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS banks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            acronym TEXT CHECK(acronym IS NULL OR length(acronym) <= 50),
            bank_code TEXT CHECK(bank_code IS NULL OR length(bank_code) <= 20),
            bic_code TEXT CHECK(bic_code IS NULL OR length(bic_code) <= 20),
            iban_prefix TEXT NOT NULL DEFAULT 'CI93' CHECK(length(iban_prefix) <= 10),
            address TEXT CHECK(address IS NULL OR length(address) <= 500),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 30),
            email TEXT CHECK(email IS NULL OR length(email) <= 255),
            website TEXT CHECK(website IS NULL OR length(website) <= 255),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suppliers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            supplier_kind TEXT NOT NULL DEFAULT 'local' CHECK(
                supplier_kind IN ('local', 'foreign')
            ),
            organization_kind TEXT CHECK(organization_kind IS NULL OR length(organization_kind) <= 50),
            registration_date TEXT,
            physical_address TEXT CHECK(physical_address IS NULL OR length(physical_address) <= 500),
            head_office_address TEXT CHECK(head_office_address IS NULL OR length(head_office_address) <= 500),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 30),
            email TEXT CHECK(email IS NULL OR length(email) <= 255),
            website TEXT CHECK(website IS NULL OR length(website) <= 255),
            legal_representative TEXT CHECK(legal_representative IS NULL OR length(legal_representative) <= 255),
            representative_role TEXT CHECK(representative_role IS NULL OR length(representative_role) <= 100),
            contact_person TEXT CHECK(contact_person IS NULL OR length(contact_person) <= 255),
            contact_phone TEXT CHECK(contact_phone IS NULL OR length(contact_phone) <= 30),
            contact_email TEXT CHECK(contact_email IS NULL OR length(contact_email) <= 255),
            trade_register TEXT CHECK(trade_register IS NULL OR length(trade_register) <= 100),
            taxpayer_account TEXT CHECK(taxpayer_account IS NULL OR length(taxpayer_account) <= 100),
            tax_clearance TEXT CHECK(tax_clearance IS NULL OR length(tax_clearance) <= 100),
            social_security_number TEXT CHECK(social_security_number IS NULL OR length(social_security_number) <= 100),
            bank_id TEXT,
            bank_name TEXT CHECK(bank_name IS NULL OR length(bank_name) <= 255),
            bank_branch TEXT CHECK(bank_branch IS NULL OR length(bank_branch) <= 255),
            iban TEXT CHECK(iban IS NULL OR length(iban) <= 50),
            bic_swift TEXT CHECK(bic_swift IS NULL OR length(bic_swift) <= 20),
            payment_terms TEXT CHECK(payment_terms IS NULL OR payment_terms IN ('net_30', 'net_60', 'net_90')),
            category_kind TEXT NOT NULL DEFAULT 'goods' CHECK(
                category_kind IN ('goods', 'services', 'other')
            ),
            category TEXT CHECK(category IS NULL OR length(category) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            active INTEGER NOT NULL DEFAULT 1 CHECK(active IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (bank_id) REFERENCES banks (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contracts (
            id TEXT PRIMARY KEY,
            number TEXT NOT NULL UNIQUE CHECK(length(number) > 0 AND length(number) <= 100),
            subject TEXT NOT NULL CHECK(length(subject) > 0 AND length(subject) <= 500),
            kind TEXT NOT NULL CHECK(kind IN ('capex', 'opex', 'service', 'works', 'it')),
            contract_type TEXT CHECK(contract_type IS NULL OR length(contract_type) <= 100),
            activity_type TEXT CHECK(activity_type IS NULL OR length(activity_type) <= 100),
            amount REAL NOT NULL CHECK(amount >= 0),
            currency TEXT NOT NULL DEFAULT 'XOF' CHECK(currency IN ('XOF', 'EUR', 'USD', 'GBP')),
            signature_date TEXT,
            effective_date TEXT,
            expiry_date TEXT NOT NULL,
            notice_days INTEGER NOT NULL DEFAULT 90 CHECK(notice_days >= 0),
            duration_years INTEGER CHECK(duration_years IS NULL OR (duration_years >= 1 AND duration_years <= 5)),
            renewal_kind TEXT CHECK(
                renewal_kind IS NULL OR renewal_kind IN ('tacit', 'express_agreement', 'amendment')
            ),
            supplier_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'active', 'expired', 'rejected', 'suspended')
            ),
            created_by TEXT,
            validated_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (supplier_id) REFERENCES suppliers (id) ON DELETE CASCADE,
            FOREIGN KEY (created_by) REFERENCES users (id),
            FOREIGN KEY (validated_by) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vendor side: the team scores the supplier on 5 criteria
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS supplier_evaluations (
            id TEXT PRIMARY KEY,
            supplier_id TEXT NOT NULL,
            delivery_compliance INTEGER NOT NULL CHECK(delivery_compliance BETWEEN 0 AND 10),
            delivery_timeline INTEGER NOT NULL CHECK(delivery_timeline BETWEEN 0 AND 10),
            advising_capability INTEGER NOT NULL CHECK(advising_capability BETWEEN 0 AND 10),
            after_sales_qos INTEGER NOT NULL CHECK(after_sales_qos BETWEEN 0 AND 10),
            vendor_relationship INTEGER NOT NULL CHECK(vendor_relationship BETWEEN 0 AND 10),
            final_rating REAL NOT NULL CHECK(final_rating >= 0 AND final_rating <= 10),
            comments TEXT CHECK(comments IS NULL OR length(comments) <= 2000),
            evaluator_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (supplier_id) REFERENCES suppliers (id) ON DELETE CASCADE,
            FOREIGN KEY (evaluator_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Buyer side: the supplier scores the buying organization on 6 criteria
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS buyer_evaluations (
            id TEXT PRIMARY KEY,
            supplier_id TEXT NOT NULL,
            price_flexibility INTEGER NOT NULL CHECK(price_flexibility BETWEEN 0 AND 10),
            rfx_deadline_compliance INTEGER NOT NULL CHECK(rfx_deadline_compliance BETWEEN 0 AND 10),
            advisory_capability INTEGER NOT NULL CHECK(advisory_capability BETWEEN 0 AND 10),
            relationship_quality INTEGER NOT NULL CHECK(relationship_quality BETWEEN 0 AND 10),
            rfx_response_quality INTEGER NOT NULL CHECK(rfx_response_quality BETWEEN 0 AND 10),
            credit_policy INTEGER NOT NULL CHECK(credit_policy BETWEEN 0 AND 10),
            final_rating REAL NOT NULL CHECK(final_rating >= 0 AND final_rating <= 10),
            comments TEXT CHECK(comments IS NULL OR length(comments) <= 2000),
            respondent TEXT CHECK(respondent IS NULL OR length(respondent) <= 255),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (supplier_id) REFERENCES suppliers (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Purchase orders. Cached amounts are recomputed from lines after import.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_orders (
            id TEXT PRIMARY KEY,
            number TEXT NOT NULL UNIQUE CHECK(length(number) > 0 AND length(number) <= 50),
            supplier_id TEXT,
            release_indicator TEXT CHECK(release_indicator IS NULL OR length(release_indicator) <= 50),
            document_date TEXT,
            purchasing_group TEXT CHECK(purchasing_group IS NULL OR length(purchasing_group) <= 50),
            release_date TEXT,
            ordered_by TEXT CHECK(ordered_by IS NULL OR length(ordered_by) <= 255),
            total REAL NOT NULL DEFAULT 0,
            received REAL NOT NULL DEFAULT 0,
            remaining REAL NOT NULL DEFAULT 0,
            progress_rate REAL NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (supplier_id) REFERENCES suppliers (id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_order_lines (
            id TEXT PRIMARY KEY,
            business_id TEXT NOT NULL UNIQUE,
            order_id TEXT NOT NULL,
            item_number TEXT NOT NULL CHECK(length(item_number) > 0 AND length(item_number) <= 20),
            description TEXT CHECK(description IS NULL OR length(description) <= 500),
            ordered_quantity REAL NOT NULL DEFAULT 0,
            received_quantity REAL NOT NULL DEFAULT 0,
            still_to_deliver REAL NOT NULL DEFAULT 0,
            net_price REAL NOT NULL DEFAULT 0,
            net_order_value REAL NOT NULL DEFAULT 0,
            currency TEXT CHECK(currency IS NULL OR length(currency) <= 10),
            delivery_date TEXT,
            plant TEXT CHECK(plant IS NULL OR length(plant) <= 50),
            storage_location TEXT CHECK(storage_location IS NULL OR length(storage_location) <= 50),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (order_id) REFERENCES purchase_orders (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Upload trace, written after each import; failures here never fail imports
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imported_files (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL CHECK(length(filename) <= 255),
            extension TEXT CHECK(extension IS NULL OR length(extension) <= 10),
            rows_count INTEGER NOT NULL DEFAULT 0,
            uploaded_by TEXT,
            imported_at DATETIME NOT NULL,
            FOREIGN KEY (uploaded_by) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            changes TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let index_queries = [
        "CREATE INDEX IF NOT EXISTS idx_suppliers_name ON suppliers (name)",
        "CREATE INDEX IF NOT EXISTS idx_suppliers_active ON suppliers (active)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_status ON contracts (status)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_supplier ON contracts (supplier_id)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_expiry ON contracts (expiry_date)",
        "CREATE INDEX IF NOT EXISTS idx_supplier_evaluations_supplier ON supplier_evaluations (supplier_id)",
        "CREATE INDEX IF NOT EXISTS idx_buyer_evaluations_supplier ON buyer_evaluations (supplier_id)",
        "CREATE INDEX IF NOT EXISTS idx_po_number ON purchase_orders (number)",
        "CREATE INDEX IF NOT EXISTS idx_po_lines_order ON purchase_order_lines (order_id)",
        "CREATE INDEX IF NOT EXISTS idx_po_lines_business_id ON purchase_order_lines (business_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs (created_at)",
    ];

    for query in index_queries.iter() {
        sqlx::query(query).execute(pool).await?;
    }

    Ok(())
}

/// Check if a column exists in a table
#[allow(dead_code)]
pub async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let query = format!(
        "SELECT COUNT(*) as count FROM pragma_table_info('{}') WHERE name = ?",
        table
    );
    let result: (i32,) = sqlx::query_as(&query).bind(column).fetch_one(pool).await?;
    Ok(result.0 > 0)
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        assert!(column_exists(&pool, "suppliers", "bank_id").await.unwrap());
        assert!(column_exists(&pool, "purchase_orders", "progress_rate").await.unwrap());
        assert!(column_exists(&pool, "users", "activation_token").await.unwrap());
    }
}
