// src/models/contract.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ContractStatus {
    Pending,
    Active,
    Expired,
    Rejected,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ContractKind {
    Capex,
    Opex,
    Service,
    Works,
    It,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RenewalKind {
    Tacit,
    ExpressAgreement,
    Amendment,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Contract {
    pub id: String,
    pub number: String,
    pub subject: String,
    pub kind: String,
    pub contract_type: Option<String>,
    pub activity_type: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub signature_date: Option<String>,
    pub effective_date: Option<String>,
    pub expiry_date: String,
    pub notice_days: i64,
    pub duration_years: Option<i64>,
    pub renewal_kind: Option<String>,
    pub supplier_id: String,
    pub status: String,
    pub created_by: Option<String>,
    pub validated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Days between today and the expiry date. Negative once expired.
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        let expiry = NaiveDate::parse_from_str(&self.expiry_date, "%Y-%m-%d").ok()?;
        Some((expiry - today).num_days())
    }

    /// An active contract is up for renewal while inside its notice window.
    pub fn needs_renewal(&self, today: NaiveDate) -> bool {
        if self.status != ContractStatus::Active.to_string() {
            return false;
        }
        match self.days_until_expiry(today) {
            Some(days) => days >= 0 && days <= self.notice_days,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractRequest {
    #[validate(length(min = 1, max = 100, message = "Number must be between 1 and 100 characters"))]
    pub number: String,
    #[validate(length(min = 1, max = 500, message = "Subject must be between 1 and 500 characters"))]
    pub subject: String,
    pub kind: String,
    #[validate(length(max = 100, message = "Contract type cannot exceed 100 characters"))]
    pub contract_type: Option<String>,
    #[validate(length(max = 100, message = "Activity type cannot exceed 100 characters"))]
    pub activity_type: Option<String>,
    pub amount: f64,
    pub currency: Option<String>,
    pub signature_date: Option<String>,
    pub effective_date: Option<String>,
    pub expiry_date: String,
    #[validate(range(min = 0, max = 3650, message = "Notice period must be between 0 and 3650 days"))]
    pub notice_days: Option<i64>,
    #[validate(range(min = 1, max = 5, message = "Duration must be between 1 and 5 years"))]
    pub duration_years: Option<i64>,
    pub renewal_kind: Option<String>,
    pub supplier_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateContractRequest {
    #[validate(length(min = 1, max = 500, message = "Subject must be between 1 and 500 characters"))]
    pub subject: Option<String>,
    pub kind: Option<String>,
    #[validate(length(max = 100, message = "Contract type cannot exceed 100 characters"))]
    pub contract_type: Option<String>,
    #[validate(length(max = 100, message = "Activity type cannot exceed 100 characters"))]
    pub activity_type: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub signature_date: Option<String>,
    pub effective_date: Option<String>,
    pub expiry_date: Option<String>,
    #[validate(range(min = 0, max = 3650, message = "Notice period must be between 0 and 3650 days"))]
    pub notice_days: Option<i64>,
    #[validate(range(min = 1, max = 5, message = "Duration must be between 1 and 5 years"))]
    pub duration_years: Option<i64>,
    pub renewal_kind: Option<String>,
    pub supplier_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(status: &str, expiry: &str, notice_days: i64) -> Contract {
        Contract {
            id: "c1".to_string(),
            number: "CT-2025-001".to_string(),
            subject: "Maintenance".to_string(),
            kind: "service".to_string(),
            contract_type: None,
            activity_type: None,
            amount: 1_000_000.0,
            currency: "XOF".to_string(),
            signature_date: None,
            effective_date: None,
            expiry_date: expiry.to_string(),
            notice_days,
            duration_years: Some(1),
            renewal_kind: None,
            supplier_id: "s1".to_string(),
            status: status.to_string(),
            created_by: None,
            validated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_days_until_expiry() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let c = contract("active", "2025-06-30", 90);
        assert_eq!(c.days_until_expiry(today), Some(29));

        let past = contract("active", "2025-05-01", 90);
        assert_eq!(past.days_until_expiry(today), Some(-31));

        let bad = contract("active", "not-a-date", 90);
        assert_eq!(bad.days_until_expiry(today), None);
    }

    #[test]
    fn test_needs_renewal_window() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        // Inside the notice window
        assert!(contract("active", "2025-06-30", 90).needs_renewal(today));
        // Expiring today still counts
        assert!(contract("active", "2025-06-01", 90).needs_renewal(today));
        // Outside the window
        assert!(!contract("active", "2026-06-01", 90).needs_renewal(today));
        // Already past expiry
        assert!(!contract("active", "2025-05-01", 90).needs_renewal(today));
        // Only active contracts renew
        assert!(!contract("pending", "2025-06-30", 90).needs_renewal(today));
        assert!(!contract("expired", "2025-06-30", 90).needs_renewal(today));
    }

    #[test]
    fn test_status_round_trip() {
        use std::str::FromStr;
        assert_eq!(ContractStatus::Active.to_string(), "active");
        assert_eq!(
            ContractStatus::from_str("suspended").unwrap(),
            ContractStatus::Suspended
        );
        assert_eq!(
            RenewalKind::ExpressAgreement.to_string(),
            "express_agreement"
        );
        assert!(ContractKind::from_str("leasing").is_err());
    }
}
