//! Line item editing and spreadsheet-style bulk import.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::{generate_item_id, LineItem, Priority, RequestData, Unit};

/// Partial edit of a line item; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub code: Option<String>,
    pub name: Option<String>,
    pub job_no: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<Unit>,
    pub priority: Option<Priority>,
    pub specifications: Option<String>,
    pub item_description: Option<String>,
}

fn item_not_found(index: usize) -> ServiceError {
    ServiceError::NotFound(format!("item at index {}", index))
}

/// Appends an item and returns its index
pub fn add_item(data: &mut RequestData, mut item: LineItem) -> usize {
    if item.id.trim().is_empty() {
        item.id = generate_item_id();
    }
    data.items.push(item);
    data.items.len() - 1
}

/// Applies an edit; offer totals follow a quantity change
pub fn update_item(
    data: &mut RequestData,
    index: usize,
    update: ItemUpdate,
) -> Result<(), ServiceError> {
    if index >= data.items.len() {
        return Err(item_not_found(index));
    }
    if let Some(quantity) = update.quantity.filter(|q| *q != data.items[index].quantity) {
        let mut repriced = Vec::new();
        for (supplier_id, per_item) in &data.offers {
            if let Some(offer) = per_item.get(&index) {
                let mut offer = offer.clone();
                offer.reprice(quantity)?;
                repriced.push((supplier_id.clone(), offer));
            }
        }
        for (supplier_id, offer) in repriced {
            data.offers
                .entry(supplier_id)
                .or_default()
                .insert(index, offer);
        }
        data.items[index].quantity = quantity;
    }

    let item = &mut data.items[index];
    if let Some(code) = update.code {
        item.code = code;
    }
    if let Some(name) = update.name {
        item.name = name;
    }
    if let Some(job_no) = update.job_no {
        item.job_no = job_no;
    }
    if let Some(unit) = update.unit {
        item.unit = unit;
    }
    if let Some(priority) = update.priority {
        item.priority = priority;
    }
    if let Some(specifications) = update.specifications {
        item.specifications = specifications;
    }
    if let Some(item_description) = update.item_description {
        item.item_description = item_description;
    }
    Ok(())
}

fn shift_down<V>(map: BTreeMap<usize, V>, removed: usize) -> BTreeMap<usize, V> {
    map.into_iter()
        .filter(|(index, _)| *index != removed)
        .map(|(index, value)| {
            if index > removed {
                (index - 1, value)
            } else {
                (index, value)
            }
        })
        .collect()
}

/// Removes an item, dropping its offers and recommendation and moving
/// higher indices down by one
pub fn remove_item(data: &mut RequestData, index: usize) -> Result<LineItem, ServiceError> {
    if index >= data.items.len() {
        return Err(item_not_found(index));
    }
    let removed = data.items.remove(index);
    for per_item in data.offers.values_mut() {
        *per_item = shift_down(std::mem::take(per_item), index);
    }
    data.recommendations = shift_down(std::mem::take(&mut data.recommendations), index);
    Ok(removed)
}

/// Removes every item together with all offers and recommendations
pub fn clear_items(data: &mut RequestData) {
    data.items.clear();
    data.offers.clear();
    data.recommendations.clear();
}

/// One parsed line of a bulk import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRow {
    /// Line number in the source text, header included
    pub line: usize,
    pub code: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit: Unit,
    pub priority: Priority,
    pub specifications: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkRow {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    fn into_item(self) -> LineItem {
        LineItem {
            code: self.code,
            name: self.name,
            quantity: self.quantity,
            unit: self.unit,
            priority: self.priority,
            specifications: self.specifications,
            ..LineItem::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkImportPreview {
    pub rows: Vec<BulkRow>,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

const MIN_CELLS: usize = 4;

fn split_cells(line: &str) -> Vec<&str> {
    let delimiter = if line.contains('\t') {
        '\t'
    } else if line.contains(';') {
        ';'
    } else {
        ','
    };
    line.split(delimiter).map(str::trim).collect()
}

/// Reads a quantity the way a spreadsheet user types it: stray characters are
/// ignored and a comma may be the decimal separator
pub fn parse_quantity(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

fn row_error(code: &str, name: &str, quantity: Decimal) -> Option<String> {
    if code.is_empty() {
        Some("Malzeme kodu eksik".to_string())
    } else if name.is_empty() {
        Some("Malzeme adı eksik".to_string())
    } else if quantity <= Decimal::ZERO {
        Some("Geçersiz miktar".to_string())
    } else {
        None
    }
}

/// Parses delimited text with the columns
/// `code, name, quantity, unit, priority, specifications`.
///
/// The first line is a header. Lines with fewer than four cells are skipped.
#[instrument(skip(text))]
pub fn parse_bulk_text(text: &str) -> BulkImportPreview {
    let mut preview = BulkImportPreview::default();

    for (offset, line) in text.lines().enumerate().skip(1) {
        let cells = split_cells(line);
        if cells.len() < MIN_CELLS {
            continue;
        }
        let cell = |i: usize| cells.get(i).copied().unwrap_or_default();

        let code = cell(0).to_string();
        let name = cell(1).to_string();
        let quantity = parse_quantity(cell(2));
        let error = row_error(&code, &name, quantity);

        preview.rows.push(BulkRow {
            line: offset + 1,
            code,
            name,
            quantity,
            unit: Unit::parse_or_default(cell(3)),
            priority: Priority::parse_or_default(cell(4)),
            specifications: cell(5).to_string(),
            error,
        });
    }

    preview.total = preview.rows.len();
    preview.valid = preview.rows.iter().filter(|r| r.is_valid()).count();
    preview.invalid = preview.total - preview.valid;
    debug!(
        total = preview.total,
        valid = preview.valid,
        "Parsed bulk import"
    );
    preview
}

/// Appends the valid rows of a preview and returns how many were added
pub fn import_rows(data: &mut RequestData, preview: &BulkImportPreview) -> usize {
    let before = data.items.len();
    data.items.extend(
        preview
            .rows
            .iter()
            .filter(|row| row.is_valid())
            .cloned()
            .map(BulkRow::into_item),
    );
    data.items.len() - before
}
