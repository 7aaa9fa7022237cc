// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::round2;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PurchaseOrder {
    pub id: String,
    pub number: String,
    pub supplier_id: Option<String>,
    pub release_indicator: Option<String>,
    pub document_date: Option<String>,
    pub purchasing_group: Option<String>,
    pub release_date: Option<String>,
    pub ordered_by: Option<String>,
    pub total: f64,
    pub received: f64,
    pub remaining: f64,
    pub progress_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PurchaseOrderLine {
    pub id: String,
    pub business_id: String,
    pub order_id: String,
    pub item_number: String,
    pub description: Option<String>,
    pub ordered_quantity: f64,
    pub received_quantity: f64,
    pub still_to_deliver: f64,
    pub net_price: f64,
    pub net_order_value: f64,
    pub currency: Option<String>,
    pub delivery_date: Option<String>,
    pub plant: Option<String>,
    pub storage_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ImportedFile {
    pub id: String,
    pub filename: String,
    pub extension: Option<String>,
    pub rows_count: i64,
    pub uploaded_by: Option<String>,
    pub imported_at: DateTime<Utc>,
}

/// Stable line key: PO number plus the item number zero-padded to at
/// least 4 digits. Re-imports of the same row hit the same key.
pub fn generate_business_id(po_number: &str, item_number: &str) -> String {
    format!("{}-{:0>4}", po_number.trim(), item_number.trim())
}

/// Received / total as a percentage, 0 when the order has no value.
pub fn progress_rate(total: f64, received: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    round2(received / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_business_id() {
        assert_eq!(generate_business_id("4500001234", "10"), "4500001234-0010");
        assert_eq!(generate_business_id("4500001234", "1"), "4500001234-0001");
        // Items longer than 4 digits are kept as-is
        assert_eq!(generate_business_id("PO-7", "12345"), "PO-7-12345");
        assert_eq!(generate_business_id(" 4500001234 ", " 20 "), "4500001234-0020");
    }

    #[test]
    fn test_progress_rate() {
        assert_eq!(progress_rate(1000.0, 250.0), 25.0);
        assert_eq!(progress_rate(300.0, 100.0), 33.33);
        assert_eq!(progress_rate(0.0, 0.0), 0.0);
        // Zero total never divides
        assert_eq!(progress_rate(0.0, 500.0), 0.0);
        assert_eq!(progress_rate(1000.0, 1000.0), 100.0);
    }
}
