use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::line_item::{LineItem, Priority};
use super::offer::{OfferBook, Recommendations, SupplierOffer};
use super::supplier::Supplier;

/// The purchase request being composed: header, lines, suppliers and the
/// price comparison between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// ISO `YYYY-MM-DD`, blank when not chosen yet
    #[serde(default, deserialize_with = "lenient::string")]
    pub needed_date: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub suppliers: Vec<Supplier>,
    #[serde(default, deserialize_with = "lenient::offer_book")]
    pub offers: OfferBook,
    #[serde(default, deserialize_with = "lenient::recommendations")]
    pub recommendations: Recommendations,
}

impl RequestData {
    /// Whether anything worth persisting has been entered
    pub fn has_meaningful_data(&self) -> bool {
        !self.title.trim().is_empty()
            || !self.description.trim().is_empty()
            || !self.needed_date.trim().is_empty()
            || !self.items.is_empty()
            || !self.suppliers.is_empty()
            || !self.offers.is_empty()
            || !self.recommendations.is_empty()
    }

    pub fn supplier(&self, supplier_id: &str) -> Option<&Supplier> {
        self.suppliers.iter().find(|s| s.id == supplier_id)
    }

    pub fn offer(&self, supplier_id: &str, item_index: usize) -> Option<&SupplierOffer> {
        super::offer::offer_for(&self.offers, supplier_id, item_index)
    }

    /// True when a listed supplier has a positive offer for the item
    pub fn has_any_offer(&self, item_index: usize) -> bool {
        self.suppliers.iter().any(|supplier| {
            self.offer(&supplier.id, item_index)
                .is_some_and(SupplierOffer::is_positive)
        })
    }

    /// True when the item's recommendation points at a positive offer
    pub fn has_valid_recommendation(&self, item_index: usize) -> bool {
        self.recommendations
            .get(&item_index)
            .and_then(|supplier_id| self.offer(supplier_id, item_index))
            .is_some_and(SupplierOffer::is_positive)
    }

    /// Union of planning item back-references over all items, first-seen order
    pub fn planning_request_item_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::new();
        for id in self.items.iter().flat_map(LineItem::planning_item_ids) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn stats(&self) -> DataStats {
        DataStats {
            total_items: self.items.len(),
            total_suppliers: self.suppliers.len(),
            total_offers: self.offers.values().map(|per_item| per_item.len()).sum(),
            total_recommendations: self.recommendations.len(),
        }
    }
}

/// Counters shown next to a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStats {
    pub total_items: usize,
    pub total_suppliers: usize,
    pub total_offers: usize,
    pub total_recommendations: usize,
}

/// A persisted snapshot of [`RequestData`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(flatten)]
    pub data: RequestData,
    #[serde(default, deserialize_with = "lenient::i64_list")]
    pub planning_request_item_ids: Vec<i64>,
    pub timestamp: DateTime<Utc>,
}

impl Draft {
    pub fn capture(data: RequestData, now: DateTime<Utc>) -> Self {
        let planning_request_item_ids = data.planning_request_item_ids();
        Self {
            data,
            planning_request_item_ids,
            timestamp: now,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
