use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use super::lenient;

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
#[strum(ascii_case_insensitive)]
#[allow(clippy::upper_case_acronyms)]
pub enum Currency {
    #[default]
    TRY,
    USD,
    EUR,
    GBP,
}

/// Exchange table against a TRY base: each rate is the amount of that
/// currency equal to one TRY.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyRates(BTreeMap<String, Decimal>);

impl CurrencyRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.0.insert(currency.to_string(), rate);
        self
    }

    /// Rate for a currency; zero or missing rates are unusable
    pub fn rate(&self, currency: Currency) -> Option<Decimal> {
        self.0
            .get(currency.as_ref())
            .copied()
            .filter(|rate| !rate.is_zero())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.0.iter().map(|(code, rate)| (code.as_str(), *rate))
    }
}

pub fn generate_supplier_id() -> String {
    format!("supplier_{}", Uuid::new_v4().simple())
}

/// A supplier taking part in the price comparison
///
/// Fields this crate does not interpret are kept in `extra` and written back
/// untouched, so migrated documents never lose data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_from_str"
    )]
    pub default_currency: Option<Currency>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_i64"
    )]
    pub default_payment_terms: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_decimal"
    )]
    pub default_tax_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Supplier {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            default_currency: None,
            default_payment_terms: None,
            default_tax_rate: None,
            extra: Map::new(),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.default_currency = Some(currency);
        self
    }

    /// Offers are priced in the supplier's default currency, TRY when unset
    pub fn currency(&self) -> Currency {
        self.default_currency.unwrap_or_default()
    }
}

/// Supplier in the shape the purchase-request backend expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSupplier {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Decimal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
