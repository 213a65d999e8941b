use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::lenient;

/// Unit of measure accepted on a purchase request line
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Unit {
    /// Piece; quantities must be whole numbers
    #[default]
    Adet,
    Kg,
    Metre,
    Litre,
    Paket,
    Kutu,
}

impl Unit {
    /// Discrete units only accept integer quantities
    pub fn is_discrete(self) -> bool {
        matches!(self, Unit::Adet)
    }

    /// Parses user-entered text, falling back to pieces for anything unknown
    pub fn parse_or_default(raw: &str) -> Unit {
        raw.trim().parse().unwrap_or_default()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Priority {
    #[default]
    #[strum(to_string = "normal")]
    Normal,
    #[serde(alias = "acil")]
    #[strum(to_string = "urgent", serialize = "acil")]
    Urgent,
    #[serde(alias = "kritik")]
    #[strum(to_string = "critical", serialize = "kritik")]
    Critical,
}

impl Priority {
    pub fn parse_or_default(raw: &str) -> Priority {
        raw.trim().parse().unwrap_or_default()
    }
}

/// Quantity of a merged line charged to one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(default, deserialize_with = "lenient::string")]
    pub job_no: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub quantity: Decimal,
}

impl Allocation {
    pub fn new(job_no: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            job_no: job_no.into(),
            quantity: to_two_places(quantity),
        }
    }
}

/// Rounds half away from zero and pins the scale at two fractional digits
pub fn to_two_places(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub fn generate_item_id() -> String {
    format!("item_{}", Uuid::new_v4().simple())
}

/// One row of a purchase request before submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default = "generate_item_id", deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub job_no: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "lenient::string")]
    pub specifications: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub item_description: String,
    #[serde(default)]
    pub file_asset_ids: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_i64"
    )]
    pub source_planning_request_item_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::i64_list"
    )]
    pub source_planning_request_item_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<Allocation>,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            id: generate_item_id(),
            code: String::new(),
            name: String::new(),
            job_no: String::new(),
            quantity: Decimal::ZERO,
            unit: Unit::default(),
            priority: Priority::default(),
            specifications: String::new(),
            item_description: String::new(),
            file_asset_ids: Vec::new(),
            source_planning_request_item_id: None,
            source_planning_request_item_ids: Vec::new(),
            allocations: Vec::new(),
        }
    }
}

impl LineItem {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        job_no: impl Into<String>,
        quantity: Decimal,
        unit: Unit,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            job_no: job_no.into(),
            quantity,
            unit,
            ..Self::default()
        }
    }

    pub fn with_specifications(mut self, specifications: impl Into<String>) -> Self {
        self.specifications = specifications.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.item_description = description.into();
        self
    }

    /// `(job_no, quantity)` pairs this row contributes: its allocations when
    /// present, otherwise the bare job number and quantity
    pub fn job_quantities(&self) -> Vec<(&str, Decimal)> {
        if self.allocations.is_empty() {
            vec![(self.job_no.as_str(), self.quantity)]
        } else {
            self.allocations
                .iter()
                .map(|a| (a.job_no.as_str(), a.quantity))
                .collect()
        }
    }

    /// Every job number referenced by this row
    pub fn job_numbers(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.job_no.as_str())
            .chain(self.allocations.iter().map(|a| a.job_no.as_str()))
            .filter(|job| !job.is_empty())
    }

    /// Planning items this row was sourced from, single and merged forms combined
    pub fn planning_item_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.source_planning_request_item_id
            .into_iter()
            .chain(self.source_planning_request_item_ids.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn unit_and_priority_parse_leniently() {
        assert_eq!(Unit::parse_or_default("KG"), Unit::Kg);
        assert_eq!(Unit::parse_or_default("pcs"), Unit::Adet);
        assert_eq!(Priority::parse_or_default("acil"), Priority::Urgent);
        assert_eq!(Priority::parse_or_default("Kritik"), Priority::Critical);
        assert_eq!(Priority::parse_or_default("whenever"), Priority::Normal);
        assert_eq!(Priority::Urgent.to_string(), "urgent");
    }

    #[test]
    fn legacy_priority_spelling_deserializes() {
        let item: LineItem = serde_json::from_value(json!({
            "code": "A", "name": "Bolt", "priority": "acil", "quantity": 3
        }))
        .unwrap();
        assert_eq!(item.priority, Priority::Urgent);
        assert!(item.id.starts_with("item_"));
    }

    #[test]
    fn job_quantities_prefer_allocations() {
        let mut item = LineItem::new("A", "Bolt", "J1", dec!(4), Unit::Adet);
        assert_eq!(item.job_quantities(), vec![("J1", dec!(4))]);

        item.job_no.clear();
        item.allocations = vec![
            Allocation::new("J2", dec!(1)),
            Allocation::new("J3", dec!(3)),
        ];
        assert_eq!(item.job_quantities(), vec![("J2", dec!(1)), ("J3", dec!(3))]);
        assert_eq!(item.job_numbers().collect::<Vec<_>>(), vec!["J2", "J3"]);
    }

    #[test]
    fn allocation_quantity_renders_two_decimals() {
        let allocation = Allocation::new("J1", dec!(10));
        assert_eq!(serde_json::to_value(&allocation).unwrap()["quantity"], "10.00");
    }
}
