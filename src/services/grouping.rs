//! Collapsing purchase request lines into submission records.
//!
//! Grouping runs in two passes. The first buckets rows by
//! `code|name|job_no|specifications|item_description`; any bucket holding two
//! different rows is an unmergeable duplicate and the whole operation fails
//! with a report naming every such bucket. Only when that pass is clean are
//! rows merged by `code|name|unit|specifications|item_description`, with the
//! job numbers folded into per-job allocations.
//!
//! Offers and recommendations are keyed by the pre-grouping row index, so
//! [`reindex_offers`] and [`reindex_recommendations`] re-key them once, at
//! this boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::errors::ServiceError;
use crate::models::{
    to_two_places, Allocation, LineItem, OfferBook, Priority, Recommendations, SupplierOffer,
    Unit,
};

/// One offending row inside a conflict group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRow {
    /// 1-based row number as shown to the user
    pub row: usize,
    /// 0-based index into the submitted item list
    pub index: usize,
    pub quantity: Decimal,
    pub unit: Unit,
}

/// Two or more rows sharing the full non-mergeable key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictGroup {
    pub code: String,
    pub name: String,
    pub job_no: String,
    pub specifications: String,
    pub item_description: String,
    pub rows: Vec<ConflictRow>,
}

impl ConflictGroup {
    pub fn message(&self) -> String {
        let rows = self
            .rows
            .iter()
            .map(|r| format!("{} ({} {})", r.row, r.quantity.normalize(), r.unit))
            .collect::<Vec<_>>()
            .join(", ");
        let mut label = format!("{} - {}", self.code, self.name);
        if !self.specifications.is_empty() {
            label.push_str(&format!(" [{}]", self.specifications));
        }
        format!(
            "Aynı iş numarası ({}) için tekrarlanan malzeme {}; satırlar: {}",
            self.job_no, label, rows
        )
    }
}

/// Every unmergeable duplicate group found in one grouping attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub groups: Vec<ConflictGroup>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One remediation line per group
    pub fn messages(&self) -> Vec<String> {
        self.groups.iter().map(ConflictGroup::message).collect()
    }

    /// Original row indices involved in any conflict, ascending
    pub fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .groups
            .iter()
            .flat_map(|g| g.rows.iter().map(|r| r.index))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, message) in self.messages().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", message)?;
        }
        Ok(())
    }
}

/// A submission record produced by merging rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedItem {
    pub code: String,
    pub name: String,
    pub unit: Unit,
    pub quantity: Decimal,
    pub priority: Priority,
    pub specifications: String,
    pub item_description: String,
    pub allocations: Vec<Allocation>,
    pub file_asset_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_planning_request_item_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub source_planning_request_item_ids: Vec<i64>,
    /// Original row indices merged into this record, ascending
    #[serde(skip)]
    pub member_indices: Vec<usize>,
}

impl GroupedItem {
    pub fn job_numbers(&self) -> impl Iterator<Item = &str> + '_ {
        self.allocations.iter().map(|a| a.job_no.as_str())
    }
}

/// Successful grouping result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedItems {
    #[serde(rename = "groupedItems")]
    pub items: Vec<GroupedItem>,
    /// `original_index_to_grouped_index[i]` is the record row `i` was merged into
    #[serde(rename = "originalIndexToGroupedIndexMap")]
    pub original_index_to_grouped_index: Vec<usize>,
}

impl GroupedItems {
    pub fn grouped_index(&self, original_index: usize) -> Option<usize> {
        self.original_index_to_grouped_index
            .get(original_index)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConflictKey<'a> {
    code: &'a str,
    name: &'a str,
    job_no: &'a str,
    specifications: &'a str,
    item_description: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MergeKey<'a> {
    code: &'a str,
    name: &'a str,
    unit: Unit,
    specifications: &'a str,
    item_description: &'a str,
}

impl<'a> MergeKey<'a> {
    fn of(item: &'a LineItem) -> Self {
        Self {
            code: &item.code,
            name: &item.name,
            unit: item.unit,
            specifications: &item.specifications,
            item_description: &item.item_description,
        }
    }
}

/// Buckets with first-seen key order
struct OrderedBuckets<K, V> {
    positions: HashMap<K, usize>,
    buckets: Vec<(K, Vec<V>)>,
}

impl<K: Clone + Eq + std::hash::Hash, V> OrderedBuckets<K, V> {
    fn new() -> Self {
        Self {
            positions: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    fn push(&mut self, key: K, value: V) -> usize {
        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                self.buckets.push((key.clone(), Vec::new()));
                self.positions.insert(key, self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        self.buckets[position].1.push(value);
        position
    }
}

/// Finds every group of distinct rows sharing the non-mergeable key
pub fn detect_conflicts(items: &[LineItem]) -> ConflictReport {
    let mut buckets: OrderedBuckets<ConflictKey<'_>, ConflictRow> = OrderedBuckets::new();

    for (index, item) in items.iter().enumerate() {
        for (job_no, quantity) in item.job_quantities() {
            let key = ConflictKey {
                code: &item.code,
                name: &item.name,
                job_no,
                specifications: &item.specifications,
                item_description: &item.item_description,
            };
            buckets.push(
                key,
                ConflictRow {
                    row: index + 1,
                    index,
                    quantity,
                    unit: item.unit,
                },
            );
        }
    }

    let groups = buckets
        .buckets
        .into_iter()
        .filter_map(|(key, mut rows)| {
            rows.dedup_by_key(|r| r.index);
            (rows.len() > 1).then(|| ConflictGroup {
                code: key.code.to_string(),
                name: key.name.to_string(),
                job_no: key.job_no.to_string(),
                specifications: key.specifications.to_string(),
                item_description: key.item_description.to_string(),
                rows,
            })
        })
        .collect();

    ConflictReport { groups }
}

/// Groups rows into submission records.
///
/// Fails with [`ServiceError::ItemConflict`] listing every unmergeable
/// duplicate, or with [`ServiceError::InvalidInput`] when a merged quantity
/// does not fit a `Decimal`.
#[instrument(skip(items), fields(item_count = items.len()))]
pub fn group_items(items: &[LineItem]) -> Result<GroupedItems, ServiceError> {
    let conflicts = detect_conflicts(items);
    if !conflicts.is_empty() {
        warn!(
            conflict_groups = conflicts.groups.len(),
            "Refusing to merge duplicate rows"
        );
        return Err(ServiceError::ItemConflict(conflicts));
    }

    let mut buckets: OrderedBuckets<MergeKey<'_>, usize> = OrderedBuckets::new();
    let mut original_index_to_grouped_index = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        original_index_to_grouped_index.push(buckets.push(MergeKey::of(item), index));
    }

    let grouped: Vec<GroupedItem> = buckets
        .buckets
        .into_iter()
        .map(|(_, members)| merge_members(items, members))
        .collect::<Result<_, _>>()?;

    debug!(
        grouped_count = grouped.len(),
        "Merged rows into submission records"
    );

    Ok(GroupedItems {
        items: grouped,
        original_index_to_grouped_index,
    })
}

fn add_quantity(sum: Decimal, quantity: Decimal, code: &str) -> Result<Decimal, ServiceError> {
    sum.checked_add(quantity).ok_or_else(|| {
        ServiceError::InvalidInput(format!("merged quantity of {} is out of range", code))
    })
}

fn merge_members(
    items: &[LineItem],
    member_indices: Vec<usize>,
) -> Result<GroupedItem, ServiceError> {
    let first = &items[member_indices[0]];

    let mut total = Decimal::ZERO;
    let mut per_job: Vec<(String, Decimal)> = Vec::new();
    let mut file_asset_ids: Vec<String> = Vec::new();
    let mut planning_ids: Vec<i64> = Vec::new();
    let mut priority = first.priority;

    for &index in &member_indices {
        let item = &items[index];
        priority = priority.max(item.priority);

        for (job_no, quantity) in item.job_quantities() {
            total = add_quantity(total, quantity, &first.code)?;
            match per_job.iter_mut().find(|(job, _)| job == job_no) {
                Some((_, sum)) => *sum = add_quantity(*sum, quantity, &first.code)?,
                None => per_job.push((job_no.to_string(), quantity)),
            }
        }

        for asset in &item.file_asset_ids {
            if !file_asset_ids.contains(asset) {
                file_asset_ids.push(asset.clone());
            }
        }

        for id in item.planning_item_ids() {
            if !planning_ids.contains(&id) {
                planning_ids.push(id);
            }
        }
    }

    let source_planning_request_item_id = match planning_ids.as_slice() {
        [only] => Some(*only),
        _ => None,
    };

    Ok(GroupedItem {
        code: first.code.clone(),
        name: first.name.clone(),
        unit: first.unit,
        quantity: to_two_places(total),
        priority,
        specifications: first.specifications.clone(),
        item_description: first.item_description.clone(),
        allocations: per_job
            .into_iter()
            .map(|(job_no, quantity)| Allocation::new(job_no, quantity))
            .collect(),
        file_asset_ids,
        source_planning_request_item_id,
        source_planning_request_item_ids: planning_ids,
        member_indices,
    })
}

/// Re-keys offers from original row indices to grouped record indices.
///
/// When several rows collapse into one record, the lowest row carrying an
/// offer from a supplier supplies that supplier's price, and the total is
/// recomputed for the merged quantity.
pub fn reindex_offers(
    offers: &OfferBook,
    grouped: &GroupedItems,
) -> Result<OfferBook, ServiceError> {
    let mut reindexed = OfferBook::new();

    for (supplier_id, per_item) in offers {
        let mut target: BTreeMap<usize, SupplierOffer> = BTreeMap::new();
        for (&original_index, offer) in per_item {
            let Some(grouped_index) = grouped.grouped_index(original_index) else {
                debug!(
                    supplier_id = %supplier_id,
                    original_index,
                    "Dropping offer for a row that no longer exists"
                );
                continue;
            };

            match target.get(&grouped_index) {
                Some(existing) => {
                    if existing.unit_price != offer.unit_price {
                        warn!(
                            supplier_id = %supplier_id,
                            grouped_index,
                            kept = %existing.unit_price,
                            ignored = %offer.unit_price,
                            "Merged rows carry different unit prices; keeping the first"
                        );
                    }
                }
                None => {
                    let mut merged = offer.clone();
                    merged.reprice(grouped.items[grouped_index].quantity)?;
                    target.insert(grouped_index, merged);
                }
            }
        }
        reindexed.insert(supplier_id.clone(), target);
    }

    Ok(reindexed)
}

/// Re-keys recommendations; the lowest merged row's choice wins
pub fn reindex_recommendations(
    recommendations: &Recommendations,
    grouped: &GroupedItems,
) -> Recommendations {
    let mut reindexed = Recommendations::new();

    for (&original_index, supplier_id) in recommendations {
        let Some(grouped_index) = grouped.grouped_index(original_index) else {
            continue;
        };
        match reindexed.get(&grouped_index) {
            Some(existing) if existing != supplier_id => {
                warn!(
                    grouped_index,
                    kept = %existing,
                    ignored = %supplier_id,
                    "Merged rows recommend different suppliers; keeping the first"
                );
            }
            Some(_) => {}
            None => {
                reindexed.insert(grouped_index, supplier_id.clone());
            }
        }
    }

    reindexed
}
