//! Pre-submission validation of a purchase request.
//!
//! Produces a flat list of user-facing messages together with structured
//! feedback a front end can render: a validity state per header field and a
//! marker per comparison row that still lacks an offer or a recommendation.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, instrument};

use crate::config::ValidationConfig;
use crate::models::{LineItem, RequestData};
use crate::services::session::{RequestChange, RequestObserver};

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern")
});

/// Bounds the rules are checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    pub title_min_len: usize,
    pub title_max_len: usize,
    pub description_max_len: usize,
    pub min_suppliers: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

impl From<&ValidationConfig> for ValidationRules {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            title_min_len: config.title_min_len,
            title_max_len: config.title_max_len,
            description_max_len: config.description_max_len,
            min_suppliers: config.min_suppliers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum FieldState {
    Valid,
    Invalid(String),
    /// Nothing to show: an optional field that passed
    Neutral,
}

impl FieldState {
    pub fn css_class(&self) -> Option<&'static str> {
        match self {
            Self::Valid => Some("is-valid"),
            Self::Invalid(_) => Some("is-invalid"),
            Self::Neutral => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Invalid(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFeedback {
    pub field: String,
    pub state: FieldState,
}

impl FieldFeedback {
    fn new(field: &str, state: FieldState) -> Self {
        Self {
            field: field.to_string(),
            state,
        }
    }
}

/// Why a comparison row needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemMarker {
    NoOffer,
    NoRecommendation,
}

impl ItemMarker {
    pub fn css_class(self) -> &'static str {
        match self {
            Self::NoOffer => "item-no-offer",
            Self::NoRecommendation => "item-no-recommendation",
        }
    }

    pub fn tooltip(self) -> &'static str {
        match self {
            Self::NoOffer => "Bu malzeme için hiçbir tedarikçiden teklif bulunmamaktadır",
            Self::NoRecommendation => "Bu malzeme için tedarikçi önerisi seçmelisiniz",
        }
    }
}

/// Marker for one item; a missing offer outranks a missing recommendation
pub fn item_marker(data: &RequestData, item_index: usize) -> Option<ItemMarker> {
    if !data.has_any_offer(item_index) {
        Some(ItemMarker::NoOffer)
    } else if !data.has_valid_recommendation(item_index) {
        Some(ItemMarker::NoRecommendation)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub fields: Vec<FieldFeedback>,
    pub item_markers: BTreeMap<usize, ItemMarker>,
}

pub fn validate_title(title: &str, rules: &ValidationRules) -> FieldState {
    let length = title.trim().chars().count();
    if length == 0 {
        FieldState::Invalid("Talep başlığı zorunludur".to_string())
    } else if length < rules.title_min_len {
        FieldState::Invalid(format!(
            "Talep başlığı en az {} karakter olmalıdır",
            rules.title_min_len
        ))
    } else if length > rules.title_max_len {
        FieldState::Invalid(format!(
            "Talep başlığı en fazla {} karakter olabilir",
            rules.title_max_len
        ))
    } else {
        FieldState::Valid
    }
}

pub fn validate_description(description: &str, rules: &ValidationRules) -> FieldState {
    if description.trim().chars().count() > rules.description_max_len {
        FieldState::Invalid(format!(
            "Talep açıklaması en fazla {} karakter olabilir",
            rules.description_max_len
        ))
    } else {
        FieldState::Neutral
    }
}

/// Blank is fine; anything else must be a real `YYYY-MM-DD` date
pub fn validate_needed_date(needed_date: &str) -> FieldState {
    let value = needed_date.trim();
    let is_date = |v: &str| {
        ISO_DATE.is_match(v) && NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok()
    };
    if value.is_empty() || is_date(value) {
        FieldState::Neutral
    } else {
        FieldState::Invalid("İhtiyaç tarihi YYYY-AA-GG biçiminde olmalıdır".to_string())
    }
}

fn item_errors(index: usize, item: &LineItem) -> Vec<String> {
    let n = index + 1;
    let mut errors = Vec::new();
    if item.code.trim().is_empty() {
        errors.push(format!("Malzeme {}: Malzeme kodu zorunludur", n));
    }
    if item.name.trim().is_empty() {
        errors.push(format!("Malzeme {}: Malzeme adı zorunludur", n));
    }
    if item.allocations.is_empty() && item.job_no.trim().is_empty() {
        errors.push(format!("Malzeme {}: İş numarası zorunludur", n));
    }
    if item.quantity <= rust_decimal::Decimal::ZERO {
        errors.push(format!(
            "Malzeme {}: Miktar zorunludur ve 0'dan büyük olmalıdır",
            n
        ));
    } else if item.unit.is_discrete() && !item.quantity.fract().is_zero() {
        errors.push(format!(
            "Malzeme {}: 'Adet' birimi için miktar tam sayı olmalıdır",
            n
        ));
    }
    errors
}

/// Runs every rule and collects all failures
#[instrument(skip_all, fields(items = data.items.len(), suppliers = data.suppliers.len()))]
pub fn validate_request(data: &RequestData, rules: &ValidationRules) -> ValidationReport {
    let fields = vec![
        FieldFeedback::new("title", validate_title(&data.title, rules)),
        FieldFeedback::new("description", validate_description(&data.description, rules)),
        FieldFeedback::new("needed_date", validate_needed_date(&data.needed_date)),
    ];
    let mut errors: Vec<String> = fields
        .iter()
        .filter_map(|f| f.state.message().map(str::to_string))
        .collect();

    if data.items.is_empty() {
        errors.push("En az bir malzeme eklemelisiniz".to_string());
    }
    for (index, item) in data.items.iter().enumerate() {
        errors.extend(item_errors(index, item));
    }

    if data.suppliers.len() < rules.min_suppliers {
        errors.push(format!(
            "En az {} tedarikçi eklemelisiniz",
            rules.min_suppliers
        ));
    } else {
        for (index, supplier) in data.suppliers.iter().enumerate() {
            if supplier.name.trim().is_empty() {
                errors.push(format!(
                    "Tedarikçi {}: Tedarikçi adı zorunludur",
                    index + 1
                ));
            }
        }
    }

    for index in 0..data.items.len() {
        if !data.has_any_offer(index) {
            errors.push(format!(
                "Malzeme {}: Bu malzeme için hiçbir tedarikçiden teklif bulunmamaktadır",
                index + 1
            ));
        }
    }
    for index in 0..data.items.len() {
        if !data.has_valid_recommendation(index) {
            errors.push(format!(
                "Malzeme {}: Bu malzeme için tedarikçi önerisi seçmelisiniz",
                index + 1
            ));
        }
    }

    let item_markers = (0..data.items.len())
        .filter_map(|index| item_marker(data, index).map(|marker| (index, marker)))
        .collect();

    debug!(error_count = errors.len(), "Validated purchase request");
    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        fields,
        item_markers,
    }
}

/// Current row markers of the comparison table
#[derive(Debug, Default)]
pub struct MarkerBoard {
    markers: RwLock<BTreeMap<usize, ItemMarker>>,
}

impl MarkerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> BTreeMap<usize, ItemMarker> {
        self.markers
            .read()
            .map(|markers| markers.clone())
            .unwrap_or_default()
    }

    pub fn marker(&self, item_index: usize) -> Option<ItemMarker> {
        self.markers
            .read()
            .ok()
            .and_then(|markers| markers.get(&item_index).copied())
    }

    /// Recomputes one row and leaves every other marker untouched
    pub fn revalidate_item(&self, item_index: usize, data: &RequestData) -> Option<ItemMarker> {
        let marker = if item_index < data.items.len() {
            item_marker(data, item_index)
        } else {
            None
        };
        if let Ok(mut markers) = self.markers.write() {
            match marker {
                Some(marker) => markers.insert(item_index, marker),
                None => markers.remove(&item_index),
            };
        }
        marker
    }

    pub fn rebuild(&self, data: &RequestData) {
        let fresh: BTreeMap<usize, ItemMarker> = (0..data.items.len())
            .filter_map(|index| item_marker(data, index).map(|marker| (index, marker)))
            .collect();
        if let Ok(mut markers) = self.markers.write() {
            *markers = fresh;
        }
    }
}

impl RequestObserver for MarkerBoard {
    fn on_change(&self, change: &RequestChange, data: &RequestData) {
        match change {
            RequestChange::HeaderChanged => {}
            RequestChange::Cleared => self.rebuild(data),
            change => match change.touched_item() {
                Some(item_index) => {
                    self.revalidate_item(item_index, data);
                }
                None => self.rebuild(data),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Allocation, Supplier, SupplierOffer, Unit};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn rules() -> ValidationRules {
        ValidationRules::default()
    }

    #[rstest]
    #[case("", Some("Talep başlığı zorunludur"))]
    #[case("   ", Some("Talep başlığı zorunludur"))]
    #[case(" ab ", Some("Talep başlığı en az 3 karakter olmalıdır"))]
    #[case("Çelik", None)]
    fn title_rules(#[case] title: &str, #[case] expected: Option<&str>) {
        let state = validate_title(title, &rules());
        assert_eq!(state.message(), expected);
        if expected.is_none() {
            assert_eq!(state.css_class(), Some("is-valid"));
        }
    }

    #[test]
    fn long_title_and_description_are_rejected() {
        let state = validate_title(&"x".repeat(101), &rules());
        assert_eq!(state.message(), Some("Talep başlığı en fazla 100 karakter olabilir"));
        assert_eq!(state.css_class(), Some("is-invalid"));

        assert_eq!(validate_description("", &rules()), FieldState::Neutral);
        assert!(validate_description(&"x".repeat(501), &rules()).message().is_some());
    }

    #[rstest]
    #[case("", true)]
    #[case("2026-11-30", true)]
    #[case("2026-02-30", false)]
    #[case("30.11.2026", false)]
    fn needed_date_rules(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(validate_needed_date(value) == FieldState::Neutral, ok);
    }

    #[test]
    fn item_rules_report_every_failure() {
        let fractional = LineItem::new("A", "Bolt", "J1", dec!(1.5), Unit::Adet);
        let blank = LineItem::new(" ", "", "", dec!(0), Unit::Kg);
        let mut merged = LineItem::new("C", "Pipe", "", dec!(2.5), Unit::Metre);
        merged.allocations = vec![Allocation::new("J1", dec!(2.5))];

        let data = RequestData {
            title: "Talep".into(),
            items: vec![fractional, blank, merged],
            ..RequestData::default()
        };
        let report = validate_request(&data, &rules());

        assert!(report
            .errors
            .contains(&"Malzeme 1: 'Adet' birimi için miktar tam sayı olmalıdır".to_string()));
        assert!(report.errors.contains(&"Malzeme 2: Malzeme kodu zorunludur".to_string()));
        assert!(report.errors.contains(&"Malzeme 2: Malzeme adı zorunludur".to_string()));
        assert!(report.errors.contains(&"Malzeme 2: İş numarası zorunludur".to_string()));
        assert!(report
            .errors
            .contains(&"Malzeme 2: Miktar zorunludur ve 0'dan büyük olmalıdır".to_string()));
        assert!(!report.errors.iter().any(|e| e.starts_with("Malzeme 3: İş")));
        assert!(report.errors.contains(&"En az 2 tedarikçi eklemelisiniz".to_string()));
        assert_eq!(report.item_markers.len(), 3);
    }

    #[test]
    fn complete_request_passes() {
        let mut data = RequestData {
            title: "Bakım malzemeleri".into(),
            items: vec![LineItem::new("A", "Bolt", "J1", dec!(4), Unit::Adet)],
            suppliers: vec![Supplier::new("s1", "Acme"), Supplier::new("s2", "Beta")],
            ..RequestData::default()
        };
        data.offers
            .entry("s1".into())
            .or_default()
            .insert(0, SupplierOffer::priced(dec!(2), dec!(4)).unwrap());
        data.recommendations.insert(0, "s1".into());

        let report = validate_request(&data, &rules());
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(report.item_markers.is_empty());
    }

    #[test]
    fn missing_offer_outranks_missing_recommendation() {
        let mut data = RequestData {
            items: vec![
                LineItem::new("A", "Bolt", "J1", dec!(1), Unit::Adet),
                LineItem::new("B", "Nut", "J1", dec!(1), Unit::Adet),
            ],
            suppliers: vec![Supplier::new("s1", "Acme")],
            ..RequestData::default()
        };
        data.offers
            .entry("s1".into())
            .or_default()
            .insert(1, SupplierOffer::priced(dec!(3), dec!(1)).unwrap());

        assert_eq!(item_marker(&data, 0), Some(ItemMarker::NoOffer));
        assert_eq!(item_marker(&data, 1), Some(ItemMarker::NoRecommendation));
        assert_eq!(ItemMarker::NoOffer.css_class(), "item-no-offer");
    }
}
