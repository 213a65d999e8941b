//! Tolerant field deserializers for documents written by older clients.
//!
//! Persisted drafts and imported files carry numbers as strings, ids as
//! numbers, empty strings where a value is absent and `null` almost anywhere.

use rust_decimal::Decimal;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::offer::{OfferBook, Recommendations, SupplierOffer};

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn value_to_decimal(value: &Value) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Some)
            .map_err(|e| format!("invalid number {}: {}", n, e)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| format!("invalid number {:?}: {}", s, e)),
        other => Err(format!("expected a number, found {}", other)),
    }
}

fn value_to_i64(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("expected an integer, found {}", n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| format!("invalid integer {:?}: {}", s, e)),
        other => Err(format!("expected an integer, found {}", other)),
    }
}

/// Text field that may be `null` or a bare number
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Decimal that may be written as a number, a numeric string, `""` or `null` (zero)
pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_decimal(&value)
        .map(Option::unwrap_or_default)
        .map_err(D::Error::custom)
}

pub fn opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_decimal(&value).map_err(D::Error::custom)
}

pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_i64(&value).map_err(D::Error::custom)
}

pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value_to_i64(&value).map_err(D::Error::custom)? {
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("value out of range: {}", n))),
        None => Ok(None),
    }
}

/// `null` or a list of integers / numeric strings
pub fn i64_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for value in &values {
                if let Some(n) = value_to_i64(value).map_err(D::Error::custom)? {
                    out.push(n);
                }
            }
            Ok(out)
        }
        single => Ok(value_to_i64(&single)
            .map_err(D::Error::custom)?
            .into_iter()
            .collect()),
    }
}

/// Enum parsed from free text; blank or `null` means absent
pub fn opt_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value_to_string(Value::deserialize(deserializer)?) {
        Some(s) if !s.trim().is_empty() => T::from_str(s.trim())
            .map(Some)
            .map_err(|e| D::Error::custom(format!("{:?}: {}", s, e))),
        _ => Ok(None),
    }
}

fn parse_index(key: &str) -> Option<usize> {
    key.trim().parse::<usize>().ok()
}

/// `supplier -> item index -> offer`; `null` entries and non-numeric indices are dropped
pub fn offer_book<'de, D>(deserializer: D) -> Result<OfferBook, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        Value::Null => return Ok(OfferBook::new()),
        other => {
            return Err(D::Error::custom(format!(
                "offers must be an object, found {}",
                other
            )))
        }
    };

    let mut book = OfferBook::new();
    for (supplier_id, per_item) in raw {
        let Value::Object(per_item) = per_item else {
            continue;
        };
        let mut offers = BTreeMap::new();
        for (key, offer) in per_item {
            let Some(index) = parse_index(&key) else {
                continue;
            };
            if offer.is_null() {
                continue;
            }
            let offer: SupplierOffer = serde_json::from_value(offer).map_err(D::Error::custom)?;
            offers.insert(index, offer);
        }
        book.insert(supplier_id, offers);
    }
    Ok(book)
}

/// `item index -> supplier id`; cleared (`null` / empty) choices are dropped
pub fn recommendations<'de, D>(deserializer: D) -> Result<Recommendations, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        Value::Null => return Ok(Recommendations::new()),
        other => {
            return Err(D::Error::custom(format!(
                "recommendations must be an object, found {}",
                other
            )))
        }
    };

    Ok(raw
        .into_iter()
        .filter_map(|(key, supplier)| {
            let index = parse_index(&key)?;
            let supplier = value_to_string(supplier).filter(|s| !s.is_empty())?;
            Some((index, supplier))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "decimal")]
        qty: Decimal,
        #[serde(default, deserialize_with = "opt_i64")]
        terms: Option<i64>,
        #[serde(default, deserialize_with = "i64_list")]
        ids: Vec<i64>,
        #[serde(default, deserialize_with = "string")]
        job: String,
    }

    #[test]
    fn accepts_loosely_typed_values() {
        let probe: Probe = serde_json::from_value(json!({
            "qty": "12.5",
            "terms": "30",
            "ids": [1, "2", null],
            "job": 4410
        }))
        .unwrap();
        assert_eq!(probe.qty, dec!(12.5));
        assert_eq!(probe.terms, Some(30));
        assert_eq!(probe.ids, vec![1, 2]);
        assert_eq!(probe.job, "4410");
    }

    #[test]
    fn blanks_and_nulls_mean_absent() {
        let probe: Probe = serde_json::from_value(json!({
            "qty": "",
            "terms": null,
            "ids": null,
            "job": null
        }))
        .unwrap();
        assert_eq!(probe.qty, Decimal::ZERO);
        assert_eq!(probe.terms, None);
        assert!(probe.ids.is_empty());
        assert_eq!(probe.job, "");
    }

    #[test]
    fn rejects_garbage_numbers() {
        let result: Result<Probe, _> = serde_json::from_value(json!({ "qty": "ten" }));
        assert!(result.is_err());
    }
}
