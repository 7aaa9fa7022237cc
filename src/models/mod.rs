// src/models/mod.rs

pub mod contract;
pub mod evaluation;
pub mod order;
pub mod supplier;

pub use contract::*;
pub use evaluation::*;
pub use order::*;
pub use supplier::*;

use serde::Deserialize;

// ==================== COMMON / SHARED ====================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i32>,
}

/// Round half away from zero to 2 decimals. All monetary amounts and
/// ratings in the system go through this before being stored or compared.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(7.804), 7.8);
        assert_eq!(round2(7.806), 7.81);
        assert_eq!(round2(10.0 / 3.0), 3.33);
        assert_eq!(round2(5.0 / 3.0), 1.67);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(-7.806), -7.81);
    }
}
