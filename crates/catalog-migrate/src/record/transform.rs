//! Raw row to canonical record transformation.
//!
//! Pure per-row function: given one [`RawRow`] it yields either a
//! [`CanonicalRecord`] or a [`Rejection`]. No side effects, no clamping.

use rust_decimal::Decimal;

use super::sku::KeySynthesizer;
use super::{CanonicalRecord, RawRow, RecordStatus, RejectReason, Rejection};

/// Applies type coercion and defaulting rules to raw rows.
#[derive(Debug, Clone)]
pub struct Transformer {
    synthesizer: KeySynthesizer,
    fallback_category: String,
}

impl Transformer {
    pub fn new(synthesizer: KeySynthesizer, fallback_category: impl Into<String>) -> Self {
        Self {
            synthesizer,
            fallback_category: fallback_category.into(),
        }
    }

    /// Transform one row. Rejections identify the offending field; invalid
    /// numeric input is rejected, never clamped to zero.
    pub fn transform(&self, row: &RawRow) -> Result<CanonicalRecord, Rejection> {
        let name = row
            .get_trimmed("name")
            .ok_or_else(|| reject(row, "name", RejectReason::MissingRequiredField))?
            .to_string();

        let price = parse_price(row.get("price").unwrap_or_default())
            .ok_or_else(|| reject(row, "price", RejectReason::InvalidNumericField))?;

        let stock = parse_stock(row.get("stock").unwrap_or_default())
            .ok_or_else(|| reject(row, "stock", RejectReason::InvalidNumericField))?;

        let company_name = row.get_trimmed("company_name").unwrap_or_default().to_string();

        let category = row
            .get_trimmed("category")
            .unwrap_or(&self.fallback_category)
            .to_string();

        let sku = match row.get_trimmed("sku") {
            Some(sku) => sku.to_string(),
            None => self.synthesizer.synthesize(&name),
        };

        let description = match row.get_trimmed("description") {
            Some(desc) => desc.to_string(),
            None => format!("{} - {}", category, name),
        };

        let status = row
            .get_trimmed("status")
            .map(RecordStatus::parse)
            .unwrap_or_default();

        Ok(CanonicalRecord {
            name,
            company_name,
            price,
            stock,
            sku,
            category,
            description,
            status,
        })
    }
}

fn reject(row: &RawRow, field: &str, reason: RejectReason) -> Rejection {
    Rejection {
        row_index: row.index,
        field: field.to_string(),
        reason,
    }
}

/// Parse a non-negative price, canonicalized to two-decimal precision.
fn parse_price(text: &str) -> Option<Decimal> {
    let price: Decimal = text.trim().parse().ok()?;
    if price.is_sign_negative() {
        return None;
    }
    Some(price.round_dp(2))
}

/// Parse a non-negative integer stock count.
fn parse_stock(text: &str) -> Option<i64> {
    let stock: i64 = text.trim().parse().ok()?;
    if stock < 0 {
        return None;
    }
    Some(stock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KeyPolicy;

    fn transformer() -> Transformer {
        Transformer::new(
            KeySynthesizer::new(KeyPolicy::DeterministicPrefix, 4),
            "uncategorized",
        )
    }

    fn full_row() -> RawRow {
        RawRow::new(0)
            .with("name", "Pin Header")
            .with("company_name", "Acme Electronics")
            .with("price", "12.50")
            .with("stock", "240")
            .with("sku", "CON-PH254")
            .with("category", "connector")
            .with("description", "2.54mm pin header")
            .with("status", "active")
    }

    #[test]
    fn test_complete_row_round_trips() {
        let record = transformer().transform(&full_row()).unwrap();
        assert_eq!(record.name, "Pin Header");
        assert_eq!(record.price, Decimal::new(1250, 2));
        assert_eq!(record.stock, 240);
        assert_eq!(record.sku, "CON-PH254");
        assert_eq!(record.category, "connector");
        assert_eq!(record.status, RecordStatus::Active);
    }

    #[test]
    fn test_invalid_price_rejected_not_clamped() {
        for bad in ["abc", "", "12.5.0", "-3.00", "NaN"] {
            let row = full_row().with("price", bad);
            let rejection = transformer().transform(&row).unwrap_err();
            assert_eq!(rejection.reason, RejectReason::InvalidNumericField);
            assert_eq!(rejection.field, "price");
        }
    }

    #[test]
    fn test_invalid_stock_rejected() {
        for bad in ["many", "-1", "3.5", ""] {
            let row = full_row().with("stock", bad);
            let rejection = transformer().transform(&row).unwrap_err();
            assert_eq!(rejection.reason, RejectReason::InvalidNumericField);
            assert_eq!(rejection.field, "stock");
        }
    }

    #[test]
    fn test_price_canonicalized_to_two_decimals() {
        let row = full_row().with("price", "12.505");
        let record = transformer().transform(&row).unwrap();
        assert_eq!(record.price, Decimal::new(1251, 2));
        assert!(record.price >= Decimal::ZERO);
    }

    #[test]
    fn test_empty_name_is_missing_required_field() {
        let row = full_row().with("name", "   ");
        let rejection = transformer().transform(&row).unwrap_err();
        assert_eq!(rejection.reason, RejectReason::MissingRequiredField);
        assert_eq!(rejection.field, "name");
    }

    #[test]
    fn test_missing_sku_synthesized() {
        let row = full_row().with("sku", "");
        let record = transformer().transform(&row).unwrap();
        assert!(record.sku.starts_with("PINH-"), "got {}", record.sku);
    }

    #[test]
    fn test_category_fallback_and_description_template() {
        let row = full_row().with("category", " ").with("description", "");
        let record = transformer().transform(&row).unwrap();
        assert_eq!(record.category, "uncategorized");
        assert_eq!(record.description, "uncategorized - Pin Header");
    }

    #[test]
    fn test_missing_status_defaults_active() {
        let row = full_row().with("status", "");
        let record = transformer().transform(&row).unwrap();
        assert_eq!(record.status, RecordStatus::Active);
    }

    #[test]
    fn test_rejection_carries_row_index() {
        let mut row = full_row().with("price", "abc");
        row.index = 17;
        let rejection = transformer().transform(&row).unwrap_err();
        assert_eq!(rejection.row_index, 17);
    }
}
