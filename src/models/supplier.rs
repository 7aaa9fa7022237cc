// src/models/supplier.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::round2;

pub const VENDOR_WEIGHT: f64 = 0.60;
pub const BUYER_WEIGHT: f64 = 0.40;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Bank {
    pub id: String,
    pub name: String,
    pub acronym: Option<String>,
    pub bank_code: Option<String>,
    pub bic_code: Option<String>,
    pub iban_prefix: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBankRequest {
    #[validate(length(min = 1, max = 255, message = "Bank name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 50, message = "Acronym cannot exceed 50 characters"))]
    pub acronym: Option<String>,
    #[validate(length(max = 20, message = "Bank code cannot exceed 20 characters"))]
    pub bank_code: Option<String>,
    #[validate(length(max = 20, message = "BIC cannot exceed 20 characters"))]
    pub bic_code: Option<String>,
    #[validate(length(max = 10, message = "IBAN prefix cannot exceed 10 characters"))]
    pub iban_prefix: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Website cannot exceed 255 characters"))]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBankRequest {
    #[validate(length(min = 1, max = 255, message = "Bank name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 50, message = "Acronym cannot exceed 50 characters"))]
    pub acronym: Option<String>,
    #[validate(length(max = 20, message = "Bank code cannot exceed 20 characters"))]
    pub bank_code: Option<String>,
    #[validate(length(max = 20, message = "BIC cannot exceed 20 characters"))]
    pub bic_code: Option<String>,
    #[validate(length(max = 10, message = "IBAN prefix cannot exceed 10 characters"))]
    pub iban_prefix: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Website cannot exceed 255 characters"))]
    pub website: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub supplier_kind: String,
    pub organization_kind: Option<String>,
    pub registration_date: Option<String>,
    pub physical_address: Option<String>,
    pub head_office_address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub legal_representative: Option<String>,
    pub representative_role: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub trade_register: Option<String>,
    pub taxpayer_account: Option<String>,
    pub tax_clearance: Option<String>,
    pub social_security_number: Option<String>,
    pub bank_id: Option<String>,
    pub bank_name: Option<String>,
    pub bank_branch: Option<String>,
    pub iban: Option<String>,
    pub bic_swift: Option<String>,
    pub payment_terms: Option<String>,
    pub category_kind: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSupplierRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub supplier_kind: Option<String>,
    #[validate(length(max = 50, message = "Organization kind cannot exceed 50 characters"))]
    pub organization_kind: Option<String>,
    pub registration_date: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub physical_address: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub head_office_address: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Website cannot exceed 255 characters"))]
    pub website: Option<String>,
    #[validate(length(max = 255, message = "Representative cannot exceed 255 characters"))]
    pub legal_representative: Option<String>,
    #[validate(length(max = 100, message = "Role cannot exceed 100 characters"))]
    pub representative_role: Option<String>,
    #[validate(length(max = 255, message = "Contact cannot exceed 255 characters"))]
    pub contact_person: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub contact_phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub contact_email: Option<String>,
    #[validate(length(max = 100, message = "Trade register cannot exceed 100 characters"))]
    pub trade_register: Option<String>,
    #[validate(length(max = 100, message = "Taxpayer account cannot exceed 100 characters"))]
    pub taxpayer_account: Option<String>,
    #[validate(length(max = 100, message = "Tax clearance cannot exceed 100 characters"))]
    pub tax_clearance: Option<String>,
    #[validate(length(max = 100, message = "Social security number cannot exceed 100 characters"))]
    pub social_security_number: Option<String>,
    pub bank_id: Option<String>,
    #[validate(length(max = 255, message = "Bank name cannot exceed 255 characters"))]
    pub bank_name: Option<String>,
    #[validate(length(max = 255, message = "Branch cannot exceed 255 characters"))]
    pub bank_branch: Option<String>,
    #[validate(length(max = 50, message = "IBAN cannot exceed 50 characters"))]
    pub iban: Option<String>,
    #[validate(length(max = 20, message = "BIC cannot exceed 20 characters"))]
    pub bic_swift: Option<String>,
    pub payment_terms: Option<String>,
    pub category_kind: Option<String>,
    #[validate(length(max = 255, message = "Category cannot exceed 255 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSupplierRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub supplier_kind: Option<String>,
    #[validate(length(max = 50, message = "Organization kind cannot exceed 50 characters"))]
    pub organization_kind: Option<String>,
    pub registration_date: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub physical_address: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub head_office_address: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Website cannot exceed 255 characters"))]
    pub website: Option<String>,
    #[validate(length(max = 255, message = "Representative cannot exceed 255 characters"))]
    pub legal_representative: Option<String>,
    #[validate(length(max = 100, message = "Role cannot exceed 100 characters"))]
    pub representative_role: Option<String>,
    #[validate(length(max = 255, message = "Contact cannot exceed 255 characters"))]
    pub contact_person: Option<String>,
    #[validate(length(max = 30, message = "Phone cannot exceed 30 characters"))]
    pub contact_phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub contact_email: Option<String>,
    #[validate(length(max = 100, message = "Trade register cannot exceed 100 characters"))]
    pub trade_register: Option<String>,
    #[validate(length(max = 100, message = "Taxpayer account cannot exceed 100 characters"))]
    pub taxpayer_account: Option<String>,
    #[validate(length(max = 100, message = "Tax clearance cannot exceed 100 characters"))]
    pub tax_clearance: Option<String>,
    #[validate(length(max = 100, message = "Social security number cannot exceed 100 characters"))]
    pub social_security_number: Option<String>,
    pub bank_id: Option<String>,
    #[validate(length(max = 255, message = "Bank name cannot exceed 255 characters"))]
    pub bank_name: Option<String>,
    #[validate(length(max = 255, message = "Branch cannot exceed 255 characters"))]
    pub bank_branch: Option<String>,
    #[validate(length(max = 50, message = "IBAN cannot exceed 50 characters"))]
    pub iban: Option<String>,
    #[validate(length(max = 20, message = "BIC cannot exceed 20 characters"))]
    pub bic_swift: Option<String>,
    pub payment_terms: Option<String>,
    pub category_kind: Option<String>,
    #[validate(length(max = 255, message = "Category cannot exceed 255 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
    pub active: Option<bool>,
}

/// Rating summary attached to supplier detail responses
#[derive(Debug, Serialize, Clone)]
pub struct SupplierRating {
    pub vendor_avg: f64,
    pub buyer_avg: f64,
    pub weighted: f64,
    pub vendor_count: i64,
    pub buyer_count: i64,
    pub badge: &'static str,
}

/// Weighted rating: 60% vendor side, 40% buyer side. A side with no
/// evaluations contributes 0; both sides empty yields 0.00.
pub fn weighted_rating(vendor_avg: f64, buyer_avg: f64) -> f64 {
    if vendor_avg == 0.0 && buyer_avg == 0.0 {
        return 0.0;
    }
    round2(VENDOR_WEIGHT * vendor_avg + BUYER_WEIGHT * buyer_avg)
}

pub fn rating_badge(weighted: f64) -> &'static str {
    if weighted >= 8.0 {
        "excellent"
    } else if weighted >= 6.0 {
        "good"
    } else if weighted >= 4.0 {
        "fair"
    } else {
        "poor"
    }
}

/// Bank-derived IBAN normalization: local suppliers get the bank prefix
/// prepended unless the IBAN already carries a country code.
pub fn normalize_iban(supplier_kind: &str, iban: Option<String>, prefix: &str) -> Option<String> {
    let iban = iban?;
    let trimmed = iban.trim();
    if trimmed.is_empty() {
        return None;
    }
    if supplier_kind == "local" && !trimmed.to_uppercase().starts_with("CI") {
        Some(format!("{}{}", prefix, trimmed))
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_rating_blend() {
        // 0.6 * 8.2 + 0.4 * 7.2 = 7.80
        assert_eq!(weighted_rating(8.2, 7.2), 7.8);
        assert_eq!(weighted_rating(10.0, 10.0), 10.0);
    }

    #[test]
    fn test_weighted_rating_one_side_empty() {
        assert_eq!(weighted_rating(8.0, 0.0), 4.8);
        assert_eq!(weighted_rating(0.0, 5.0), 2.0);
    }

    #[test]
    fn test_weighted_rating_both_empty() {
        assert_eq!(weighted_rating(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_rating_badge_thresholds() {
        assert_eq!(rating_badge(8.0), "excellent");
        assert_eq!(rating_badge(7.99), "good");
        assert_eq!(rating_badge(6.0), "good");
        assert_eq!(rating_badge(4.5), "fair");
        assert_eq!(rating_badge(3.99), "poor");
    }

    #[test]
    fn test_normalize_iban_local_prefix() {
        assert_eq!(
            normalize_iban("local", Some("12345".to_string()), "CI93"),
            Some("CI9312345".to_string())
        );
        // Already carries a country code
        assert_eq!(
            normalize_iban("local", Some("CI9312345".to_string()), "CI93"),
            Some("CI9312345".to_string())
        );
        // Foreign suppliers keep their IBAN untouched
        assert_eq!(
            normalize_iban("foreign", Some("FR7612345".to_string()), "CI93"),
            Some("FR7612345".to_string())
        );
        assert_eq!(normalize_iban("local", Some("  ".to_string()), "CI93"), None);
        assert_eq!(normalize_iban("local", None, "CI93"), None);
    }
}
