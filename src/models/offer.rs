use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::lenient;
use crate::errors::ServiceError;

/// `unit_price * quantity`, refusing products that do not fit a `Decimal`
pub fn line_total(unit_price: Decimal, quantity: Decimal) -> Result<Decimal, ServiceError> {
    unit_price.checked_mul(quantity).ok_or_else(|| {
        ServiceError::InvalidInput(format!(
            "total price out of range: {} x {}",
            unit_price, quantity
        ))
    })
}

/// A supplier's price for one line item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOffer {
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub unit_price: Decimal,
    /// Always `unit_price * item.quantity`
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub total_price: Decimal,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u32"
    )]
    pub delivery_days: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub notes: String,
}

impl SupplierOffer {
    pub fn priced(unit_price: Decimal, quantity: Decimal) -> Result<Self, ServiceError> {
        Ok(Self {
            unit_price,
            total_price: line_total(unit_price, quantity)?,
            delivery_days: None,
            notes: String::new(),
        })
    }

    /// Only offers with a positive total count as real offers
    pub fn is_positive(&self) -> bool {
        self.total_price > Decimal::ZERO
    }

    pub fn reprice(&mut self, quantity: Decimal) -> Result<(), ServiceError> {
        self.total_price = line_total(self.unit_price, quantity)?;
        Ok(())
    }
}

/// `supplier id -> item index -> offer`
pub type OfferBook = BTreeMap<String, BTreeMap<usize, SupplierOffer>>;

/// `item index -> recommended supplier id`
pub type Recommendations = BTreeMap<usize, String>;

/// Looks up the offer a supplier made for an item
pub fn offer_for<'a>(
    offers: &'a OfferBook,
    supplier_id: &str,
    item_index: usize,
) -> Option<&'a SupplierOffer> {
    offers.get(supplier_id)?.get(&item_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn wire_names_are_camel_case() {
        let offer: SupplierOffer = serde_json::from_value(json!({
            "unitPrice": 12.5,
            "totalPrice": "125",
            "deliveryDays": "7",
            "notes": "FOB"
        }))
        .unwrap();
        assert_eq!(offer.unit_price, dec!(12.5));
        assert_eq!(offer.total_price, dec!(125));
        assert_eq!(offer.delivery_days, Some(7));
        assert!(offer.is_positive());
    }

    #[test]
    fn reprice_follows_quantity() {
        let mut offer = SupplierOffer::priced(dec!(2.5), dec!(4)).unwrap();
        assert_eq!(offer.total_price, dec!(10));
        offer.reprice(dec!(6)).unwrap();
        assert_eq!(offer.total_price, dec!(15));
    }

    #[test]
    fn oversized_totals_are_refused() {
        let huge = dec!(100000000000000000);
        assert_matches!(
            SupplierOffer::priced(huge, dec!(1000000000000000)),
            Err(ServiceError::InvalidInput(_))
        );

        let mut offer = SupplierOffer::priced(dec!(2), dec!(3)).unwrap();
        assert!(offer.reprice(Decimal::MAX).is_err());
        assert_eq!(offer.total_price, dec!(6));
    }
}
