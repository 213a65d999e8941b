use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ServiceError;
use crate::models::{
    generate_supplier_id, Currency, RequestData, SubmissionSupplier, Supplier, SupplierOffer,
};

/// Price entered for one supplier and item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferInput {
    pub unit_price: Decimal,
    #[serde(default)]
    pub delivery_days: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

impl OfferInput {
    pub fn unit_price(unit_price: Decimal) -> Self {
        Self {
            unit_price,
            ..Self::default()
        }
    }
}

/// Partial edit of a supplier; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierUpdate {
    pub name: Option<String>,
    pub default_currency: Option<Currency>,
    pub default_payment_terms: Option<i64>,
    pub default_tax_rate: Option<Decimal>,
}

fn supplier_not_found(supplier_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("supplier {}", supplier_id))
}

fn require_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "Tedarikçi adı zorunludur".to_string(),
        ));
    }
    Ok(())
}

/// Adds a supplier and returns its id, generating one when blank
pub fn add_supplier(data: &mut RequestData, mut supplier: Supplier) -> Result<String, ServiceError> {
    require_name(&supplier.name)?;
    if supplier.id.trim().is_empty() {
        supplier.id = generate_supplier_id();
    } else if data.supplier(&supplier.id).is_some() {
        return Err(ServiceError::InvalidOperation(format!(
            "supplier {} already exists",
            supplier.id
        )));
    }
    supplier.name = supplier.name.trim().to_string();
    let id = supplier.id.clone();
    data.suppliers.push(supplier);
    Ok(id)
}

pub fn update_supplier(
    data: &mut RequestData,
    supplier_id: &str,
    update: SupplierUpdate,
) -> Result<(), ServiceError> {
    if let Some(name) = &update.name {
        require_name(name)?;
    }
    let supplier = data
        .suppliers
        .iter_mut()
        .find(|s| s.id == supplier_id)
        .ok_or_else(|| supplier_not_found(supplier_id))?;

    if let Some(name) = update.name {
        supplier.name = name.trim().to_string();
    }
    if update.default_currency.is_some() {
        supplier.default_currency = update.default_currency;
    }
    if update.default_payment_terms.is_some() {
        supplier.default_payment_terms = update.default_payment_terms;
    }
    if update.default_tax_rate.is_some() {
        supplier.default_tax_rate = update.default_tax_rate;
    }
    Ok(())
}

/// Removes a supplier with its offers and every recommendation naming it
pub fn remove_supplier(data: &mut RequestData, supplier_id: &str) -> Result<Supplier, ServiceError> {
    let position = data
        .suppliers
        .iter()
        .position(|s| s.id == supplier_id)
        .ok_or_else(|| supplier_not_found(supplier_id))?;
    let removed = data.suppliers.remove(position);
    data.offers.remove(supplier_id);
    data.recommendations.retain(|_, chosen| chosen != supplier_id);
    debug!(supplier_id, "Supplier removed");
    Ok(removed)
}

/// Records a supplier's price for an item; the total follows the item quantity
pub fn set_offer(
    data: &mut RequestData,
    supplier_id: &str,
    item_index: usize,
    input: OfferInput,
) -> Result<(), ServiceError> {
    if data.supplier(supplier_id).is_none() {
        return Err(supplier_not_found(supplier_id));
    }
    let quantity = data
        .items
        .get(item_index)
        .map(|item| item.quantity)
        .ok_or_else(|| ServiceError::NotFound(format!("item at index {}", item_index)))?;
    if input.unit_price < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "unit price must not be negative".to_string(),
        ));
    }

    let mut offer = SupplierOffer::priced(input.unit_price, quantity)?;
    offer.delivery_days = input.delivery_days;
    offer.notes = input.notes;
    data.offers
        .entry(supplier_id.to_string())
        .or_default()
        .insert(item_index, offer);
    Ok(())
}

pub fn remove_offer(data: &mut RequestData, supplier_id: &str, item_index: usize) -> bool {
    data.offers
        .get_mut(supplier_id)
        .and_then(|per_item| per_item.remove(&item_index))
        .is_some()
}

const RESERVED_KEYS: [&str; 9] = [
    "id",
    "name",
    "currency",
    "payment_terms_id",
    "payment_terms",
    "tax_rate",
    "default_currency",
    "default_payment_terms",
    "default_tax_rate",
];

/// Renames the `default_*` fields to the names the backend expects
pub fn transform_suppliers_for_submission(suppliers: &[Supplier]) -> Vec<SubmissionSupplier> {
    suppliers
        .iter()
        .map(|supplier| {
            let mut extra = supplier.extra.clone();
            for key in RESERVED_KEYS {
                extra.remove(key);
            }
            SubmissionSupplier {
                id: supplier.id.clone(),
                name: supplier.name.clone(),
                currency: supplier.default_currency,
                payment_terms_id: supplier.default_payment_terms,
                tax_rate: supplier.default_tax_rate.filter(|rate| !rate.is_zero()),
                extra,
            }
        })
        .collect()
}
