//! Price comparison across suppliers: recommendations, currency conversion
//! and the summary shown under the comparison table.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use crate::errors::ServiceError;
use crate::models::{to_two_places, Currency, CurrencyRates, RequestData, SupplierOffer, Unit};

fn has_positive_offer(data: &RequestData, supplier_id: &str, item_index: usize) -> bool {
    data.offer(supplier_id, item_index)
        .is_some_and(SupplierOffer::is_positive)
}

/// Recommends `supplier_id` for an item, or clears the choice when it is
/// already the recommended one. Returns the resulting recommendation.
pub fn toggle_recommendation(
    data: &mut RequestData,
    item_index: usize,
    supplier_id: &str,
) -> Result<Option<String>, ServiceError> {
    if item_index >= data.items.len() {
        return Err(ServiceError::NotFound(format!("item at index {}", item_index)));
    }
    if data.recommendations.get(&item_index).map(String::as_str) == Some(supplier_id) {
        data.recommendations.remove(&item_index);
        return Ok(None);
    }
    if !has_positive_offer(data, supplier_id, item_index) {
        return Err(ServiceError::InvalidOperation(format!(
            "supplier {} has no offer for item {}",
            supplier_id,
            item_index + 1
        )));
    }
    data.recommendations
        .insert(item_index, supplier_id.to_string());
    Ok(Some(supplier_id.to_string()))
}

/// Recommends a supplier for every item it has a positive offer on; when it
/// is already recommended for all of them, clears those recommendations
/// instead. Returns how many items were touched.
pub fn recommend_supplier_for_all(
    data: &mut RequestData,
    supplier_id: &str,
) -> Result<usize, ServiceError> {
    if data.supplier(supplier_id).is_none() {
        return Err(ServiceError::NotFound(format!("supplier {}", supplier_id)));
    }

    let offered: Vec<usize> = (0..data.items.len())
        .filter(|&index| has_positive_offer(data, supplier_id, index))
        .collect();
    let all_recommended = offered
        .iter()
        .all(|index| data.recommendations.get(index).map(String::as_str) == Some(supplier_id));

    for &index in &offered {
        if all_recommended {
            data.recommendations.remove(&index);
        } else {
            data.recommendations.insert(index, supplier_id.to_string());
        }
    }
    Ok(offered.len())
}

/// Converts through the TRY-based table; `None` when a rate is missing
pub fn convert_currency(
    amount: Decimal,
    from: Currency,
    to: Currency,
    rates: &CurrencyRates,
) -> Option<Decimal> {
    if from == to {
        return Some(amount);
    }
    let from_rate = rates.rate(from)?;
    let to_rate = rates.rate(to)?;
    amount.checked_div(from_rate)?.checked_mul(to_rate)
}

fn checked_sum(sum: Decimal, amount: Decimal, what: &str) -> Result<Decimal, ServiceError> {
    sum.checked_add(amount)
        .ok_or_else(|| ServiceError::InvalidInput(format!("{} is out of range", what)))
}

/// Sum of the recommended offers in EUR, rounded to two places.
///
/// Zero when no rates are available.
pub fn total_amount_eur(
    data: &RequestData,
    rates: Option<&CurrencyRates>,
) -> Result<Decimal, ServiceError> {
    let Some(rates) = rates.filter(|rates| !rates.is_empty()) else {
        return Ok(to_two_places(Decimal::ZERO));
    };

    let mut total = Decimal::ZERO;
    for (&item_index, supplier_id) in &data.recommendations {
        let Some(offer) = data
            .offer(supplier_id, item_index)
            .filter(|offer| offer.is_positive())
        else {
            continue;
        };
        let Some(supplier) = data.supplier(supplier_id) else {
            continue;
        };
        match convert_currency(offer.total_price, supplier.currency(), Currency::EUR, rates) {
            Some(amount) => total = checked_sum(total, amount, "EUR total")?,
            None => warn!(
                supplier_id = %supplier_id,
                currency = %supplier.currency(),
                "No exchange rate; offer left out of the EUR total"
            ),
        }
    }
    Ok(to_two_places(total))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitQuantity {
    pub unit: Unit,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_items: usize,
    /// Distinct suppliers recommended for at least one item
    pub recommended_suppliers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount_eur: Option<Decimal>,
    pub quantity_by_unit: Vec<UnitQuantity>,
}

pub fn summarize(
    data: &RequestData,
    rates: Option<&CurrencyRates>,
) -> Result<ComparisonSummary, ServiceError> {
    let recommended: BTreeSet<&str> = data.recommendations.values().map(String::as_str).collect();

    let mut quantity_by_unit: Vec<UnitQuantity> = Vec::new();
    for item in &data.items {
        match quantity_by_unit.iter_mut().find(|q| q.unit == item.unit) {
            Some(entry) => {
                entry.quantity = checked_sum(entry.quantity, item.quantity, "quantity total")?
            }
            None => quantity_by_unit.push(UnitQuantity {
                unit: item.unit,
                quantity: item.quantity,
            }),
        }
    }

    let eur_total = match rates.filter(|rates| !rates.is_empty()) {
        Some(_) => Some(total_amount_eur(data, rates)?),
        None => None,
    };

    Ok(ComparisonSummary {
        total_items: data.items.len(),
        recommended_suppliers: recommended.len(),
        total_amount_eur: eur_total,
        quantity_by_unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItem, Supplier};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn rates() -> CurrencyRates {
        CurrencyRates::new()
            .with_rate(Currency::TRY, dec!(1))
            .with_rate(Currency::EUR, dec!(0.025))
            .with_rate(Currency::USD, dec!(0.03))
    }

    fn request() -> RequestData {
        let mut data = RequestData {
            items: vec![
                LineItem::new("A", "Bolt", "J1", dec!(10), Unit::Adet),
                LineItem::new("B", "Sheet", "J1", dec!(2.5), Unit::Kg),
                LineItem::new("C", "Nut", "J2", dec!(4), Unit::Adet),
            ],
            suppliers: vec![
                Supplier::new("try", "Yerel"),
                Supplier::new("usd", "Global").with_currency(Currency::USD),
                Supplier::new("gbp", "London").with_currency(Currency::GBP),
            ],
            ..RequestData::default()
        };
        data.offers.entry("try".into()).or_default().extend([
            (0, SupplierOffer::priced(dec!(40), dec!(10)).unwrap()),
            (2, SupplierOffer::priced(dec!(10), dec!(4)).unwrap()),
        ]);
        data.offers
            .entry("usd".into())
            .or_default()
            .insert(1, SupplierOffer::priced(dec!(12), dec!(2.5)).unwrap());
        data.offers
            .entry("gbp".into())
            .or_default()
            .insert(2, SupplierOffer::priced(dec!(1), dec!(4)).unwrap());
        data
    }

    #[test]
    fn conversion_goes_through_try() {
        let rates = rates();
        assert_eq!(
            convert_currency(dec!(400), Currency::TRY, Currency::EUR, &rates),
            Some(dec!(10))
        );
        assert_eq!(
            convert_currency(dec!(30), Currency::USD, Currency::EUR, &rates),
            Some(dec!(25))
        );
        assert_eq!(convert_currency(dec!(1), Currency::GBP, Currency::EUR, &rates), None);
        assert_eq!(
            convert_currency(dec!(7), Currency::GBP, Currency::GBP, &CurrencyRates::new()),
            Some(dec!(7))
        );
    }

    #[test]
    fn eur_total_covers_recommended_offers() {
        let mut data = request();
        data.recommendations.insert(0, "try".into());
        data.recommendations.insert(1, "usd".into());
        data.recommendations.insert(2, "gbp".into());

        // 400 TRY -> 10 EUR, 30 USD -> 25 EUR, GBP has no rate
        let total = total_amount_eur(&data, Some(&rates())).unwrap();
        assert_eq!(total, dec!(35));
        assert_eq!(total.to_string(), "35.00");
        assert_eq!(total_amount_eur(&data, None).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn totals_past_the_decimal_range_are_refused() {
        let mut data = request();
        for index in [0, 2] {
            data.offers.get_mut("try").unwrap().insert(
                index,
                SupplierOffer {
                    unit_price: Decimal::MAX,
                    total_price: Decimal::MAX,
                    ..SupplierOffer::default()
                },
            );
            data.recommendations.insert(index, "try".into());
            data.items[index].quantity = Decimal::MAX;
        }

        let at_par = CurrencyRates::new()
            .with_rate(Currency::TRY, dec!(1))
            .with_rate(Currency::EUR, dec!(1));
        assert_matches!(
            total_amount_eur(&data, Some(&at_par)),
            Err(ServiceError::InvalidInput(_))
        );
        assert_matches!(summarize(&data, None), Err(ServiceError::InvalidInput(_)));
    }

    #[test]
    fn toggling_requires_an_offer_and_clears_on_repeat() {
        let mut data = request();
        assert_matches!(
            toggle_recommendation(&mut data, 1, "try"),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_eq!(
            toggle_recommendation(&mut data, 0, "try").unwrap().as_deref(),
            Some("try")
        );
        assert_eq!(toggle_recommendation(&mut data, 0, "try").unwrap(), None);
        assert!(data.recommendations.is_empty());
    }

    #[test]
    fn recommend_for_all_toggles_as_a_block() {
        let mut data = request();
        data.recommendations.insert(2, "gbp".into());

        assert_eq!(recommend_supplier_for_all(&mut data, "try").unwrap(), 2);
        assert_eq!(data.recommendations[&0], "try");
        assert_eq!(data.recommendations[&2], "try");

        recommend_supplier_for_all(&mut data, "try").unwrap();
        assert!(data.recommendations.is_empty());
    }

    #[test]
    fn summary_groups_quantities_by_unit() {
        let mut data = request();
        data.recommendations.insert(0, "try".into());
        data.recommendations.insert(2, "try".into());

        let summary = summarize(&data, None).unwrap();
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.recommended_suppliers, 1);
        assert_eq!(summary.total_amount_eur, None);
        assert_eq!(
            summary.quantity_by_unit,
            vec![
                UnitQuantity { unit: Unit::Adet, quantity: dec!(14) },
                UnitQuantity { unit: Unit::Kg, quantity: dec!(2.5) },
            ]
        );
        assert_eq!(
            summarize(&data, Some(&rates())).unwrap().total_amount_eur,
            Some(dec!(11))
        );
    }
}
