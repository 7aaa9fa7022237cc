// src/models/evaluation.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::round2;

/// Vendor-side criteria: the team scores the supplier. Key, French label,
/// English label. Order matters for exports and email bodies.
pub const VENDOR_CRITERIA: [(&str, &str, &str); 5] = [
    (
        "delivery_compliance",
        "Conformité des livraisons",
        "Delivery compliance",
    ),
    (
        "delivery_timeline",
        "Respect des délais de livraison",
        "Delivery timeline",
    ),
    (
        "advising_capability",
        "Capacité de conseil",
        "Advising capability",
    ),
    (
        "after_sales_qos",
        "Qualité du service après-vente",
        "After-sales quality of service",
    ),
    (
        "vendor_relationship",
        "Qualité de la relation fournisseur",
        "Vendor relationship",
    ),
];

/// Buyer-side criteria: the supplier scores the buying organization.
pub const BUYER_CRITERIA: [(&str, &str, &str); 6] = [
    (
        "price_flexibility",
        "Flexibilité sur les prix",
        "Price flexibility",
    ),
    (
        "rfx_deadline_compliance",
        "Respect des délais RFX",
        "RFX deadline compliance",
    ),
    (
        "advisory_capability",
        "Capacité de conseil",
        "Advisory capability",
    ),
    (
        "relationship_quality",
        "Qualité de la relation",
        "Relationship quality",
    ),
    (
        "rfx_response_quality",
        "Qualité des réponses RFX",
        "RFX response quality",
    ),
    (
        "credit_policy",
        "Politique de crédit",
        "Credit policy",
    ),
];

/// Plain arithmetic mean of criterion scores, 2 decimals.
pub fn final_rating(scores: &[i64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: i64 = scores.iter().sum();
    round2(sum as f64 / scores.len() as f64)
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct SupplierEvaluation {
    pub id: String,
    pub supplier_id: String,
    pub delivery_compliance: i64,
    pub delivery_timeline: i64,
    pub advising_capability: i64,
    pub after_sales_qos: i64,
    pub vendor_relationship: i64,
    pub final_rating: f64,
    pub comments: Option<String>,
    pub evaluator_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupplierEvaluation {
    pub fn scores(&self) -> [i64; 5] {
        [
            self.delivery_compliance,
            self.delivery_timeline,
            self.advising_capability,
            self.after_sales_qos,
            self.vendor_relationship,
        ]
    }

    /// Sum of the 5 criteria, out of 50.
    pub fn total_score(&self) -> i64 {
        self.scores().iter().sum()
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BuyerEvaluation {
    pub id: String,
    pub supplier_id: String,
    pub price_flexibility: i64,
    pub rfx_deadline_compliance: i64,
    pub advisory_capability: i64,
    pub relationship_quality: i64,
    pub rfx_response_quality: i64,
    pub credit_policy: i64,
    pub final_rating: f64,
    pub comments: Option<String>,
    pub respondent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSupplierEvaluationRequest {
    pub supplier_id: String,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub delivery_compliance: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub delivery_timeline: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub advising_capability: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub after_sales_qos: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub vendor_relationship: i64,
    #[validate(length(max = 2000, message = "Comments cannot exceed 2000 characters"))]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSupplierEvaluationRequest {
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub delivery_compliance: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub delivery_timeline: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub advising_capability: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub after_sales_qos: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub vendor_relationship: Option<i64>,
    #[validate(length(max = 2000, message = "Comments cannot exceed 2000 characters"))]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBuyerEvaluationRequest {
    pub supplier_id: String,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub price_flexibility: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub rfx_deadline_compliance: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub advisory_capability: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub relationship_quality: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub rfx_response_quality: i64,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub credit_policy: i64,
    #[validate(length(max = 2000, message = "Comments cannot exceed 2000 characters"))]
    pub comments: Option<String>,
    #[validate(length(max = 255, message = "Respondent cannot exceed 255 characters"))]
    pub respondent: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBuyerEvaluationRequest {
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub price_flexibility: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub rfx_deadline_compliance: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub advisory_capability: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub relationship_quality: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub rfx_response_quality: Option<i64>,
    #[validate(range(min = 0, max = 10, message = "Score must be between 0 and 10"))]
    pub credit_policy: Option<i64>,
    #[validate(length(max = 2000, message = "Comments cannot exceed 2000 characters"))]
    pub comments: Option<String>,
    #[validate(length(max = 255, message = "Respondent cannot exceed 255 characters"))]
    pub respondent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_rating_mean() {
        // (8+7+9+8+7)/5 = 7.8
        assert_eq!(final_rating(&[8, 7, 9, 8, 7]), 7.8);
        // (10+10+10+10+10)/5 = 10.0
        assert_eq!(final_rating(&[10, 10, 10, 10, 10]), 10.0);
        // Six criteria: (8+7+9+8+7+6)/6 = 7.5
        assert_eq!(final_rating(&[8, 7, 9, 8, 7, 6]), 7.5);
        // Thirds round to 2 decimals: (7+7+6)/3 = 6.67
        assert_eq!(final_rating(&[7, 7, 6]), 6.67);
        assert_eq!(final_rating(&[]), 0.0);
    }

    #[test]
    fn test_total_scores() {
        let eval = SupplierEvaluation {
            id: "e1".to_string(),
            supplier_id: "s1".to_string(),
            delivery_compliance: 8,
            delivery_timeline: 7,
            advising_capability: 9,
            after_sales_qos: 8,
            vendor_relationship: 7,
            final_rating: 7.8,
            comments: None,
            evaluator_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(eval.total_score(), 39);
        assert_eq!(final_rating(&eval.scores()), 7.8);
    }

    #[test]
    fn test_criteria_catalogs() {
        assert_eq!(VENDOR_CRITERIA.len(), 5);
        assert_eq!(BUYER_CRITERIA.len(), 6);
        assert_eq!(VENDOR_CRITERIA[0].0, "delivery_compliance");
        assert_eq!(BUYER_CRITERIA[5].0, "credit_policy");
    }
}
