//! The single owner of an in-progress purchase request.
//!
//! Every mutation goes through [`RequestSession`], which applies it with the
//! pure functions in [`items`](super::items), [`suppliers`](super::suppliers)
//! and [`comparison`](super::comparison) and then tells each registered
//! [`RequestObserver`] what changed.

use std::sync::Arc;
use tracing::debug;

use crate::errors::ServiceError;
use crate::models::{LineItem, Priority, RequestData, Supplier};
use crate::services::comparison;
use crate::services::items::{self, BulkImportPreview, ItemUpdate};
use crate::services::suppliers::{self, OfferInput, SupplierUpdate};

/// What a mutation touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestChange {
    HeaderChanged,
    ItemsChanged,
    SuppliersChanged,
    OfferChanged { item_index: usize, supplier_id: String },
    RecommendationChanged { item_index: usize },
    RecommendationsChanged,
    Replaced,
    Cleared,
}

impl RequestChange {
    /// The single item affected, for changes scoped to one row
    pub fn touched_item(&self) -> Option<usize> {
        match self {
            Self::OfferChanged { item_index, .. } | Self::RecommendationChanged { item_index } => {
                Some(*item_index)
            }
            _ => None,
        }
    }
}

pub trait RequestObserver: Send + Sync {
    fn on_change(&self, change: &RequestChange, data: &RequestData);
}

/// Header fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct HeaderUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub needed_date: Option<String>,
}

#[derive(Default)]
pub struct RequestSession {
    data: RequestData,
    observers: Vec<Arc<dyn RequestObserver>>,
}

impl RequestSession {
    pub fn new(data: RequestData) -> Self {
        Self {
            data,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn RequestObserver>) {
        self.observers.push(observer);
    }

    pub fn data(&self) -> &RequestData {
        &self.data
    }

    pub fn into_data(self) -> RequestData {
        self.data
    }

    fn notify(&self, change: RequestChange) {
        debug!(?change, observers = self.observers.len(), "Request changed");
        for observer in &self.observers {
            observer.on_change(&change, &self.data);
        }
    }

    pub fn update_header(&mut self, update: HeaderUpdate) {
        if let Some(title) = update.title {
            self.data.title = title;
        }
        if let Some(description) = update.description {
            self.data.description = description;
        }
        if let Some(priority) = update.priority {
            self.data.priority = priority;
        }
        if let Some(needed_date) = update.needed_date {
            self.data.needed_date = needed_date;
        }
        self.notify(RequestChange::HeaderChanged);
    }

    pub fn add_item(&mut self, item: LineItem) -> usize {
        let index = items::add_item(&mut self.data, item);
        self.notify(RequestChange::ItemsChanged);
        index
    }

    pub fn update_item(&mut self, index: usize, update: ItemUpdate) -> Result<(), ServiceError> {
        items::update_item(&mut self.data, index, update)?;
        self.notify(RequestChange::ItemsChanged);
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<LineItem, ServiceError> {
        let removed = items::remove_item(&mut self.data, index)?;
        self.notify(RequestChange::ItemsChanged);
        Ok(removed)
    }

    pub fn clear_items(&mut self) {
        items::clear_items(&mut self.data);
        self.notify(RequestChange::ItemsChanged);
    }

    pub fn import_rows(&mut self, preview: &BulkImportPreview) -> usize {
        let imported = items::import_rows(&mut self.data, preview);
        if imported > 0 {
            self.notify(RequestChange::ItemsChanged);
        }
        imported
    }

    pub fn add_supplier(&mut self, supplier: Supplier) -> Result<String, ServiceError> {
        let id = suppliers::add_supplier(&mut self.data, supplier)?;
        self.notify(RequestChange::SuppliersChanged);
        Ok(id)
    }

    pub fn update_supplier(
        &mut self,
        supplier_id: &str,
        update: SupplierUpdate,
    ) -> Result<(), ServiceError> {
        suppliers::update_supplier(&mut self.data, supplier_id, update)?;
        self.notify(RequestChange::SuppliersChanged);
        Ok(())
    }

    pub fn remove_supplier(&mut self, supplier_id: &str) -> Result<Supplier, ServiceError> {
        let removed = suppliers::remove_supplier(&mut self.data, supplier_id)?;
        self.notify(RequestChange::SuppliersChanged);
        Ok(removed)
    }

    pub fn set_offer(
        &mut self,
        supplier_id: &str,
        item_index: usize,
        input: OfferInput,
    ) -> Result<(), ServiceError> {
        suppliers::set_offer(&mut self.data, supplier_id, item_index, input)?;
        self.notify(RequestChange::OfferChanged {
            item_index,
            supplier_id: supplier_id.to_string(),
        });
        Ok(())
    }

    pub fn remove_offer(&mut self, supplier_id: &str, item_index: usize) -> bool {
        let removed = suppliers::remove_offer(&mut self.data, supplier_id, item_index);
        if removed {
            self.notify(RequestChange::OfferChanged {
                item_index,
                supplier_id: supplier_id.to_string(),
            });
        }
        removed
    }

    /// Returns the supplier now recommended for the item, if any
    pub fn toggle_recommendation(
        &mut self,
        item_index: usize,
        supplier_id: &str,
    ) -> Result<Option<String>, ServiceError> {
        let chosen = comparison::toggle_recommendation(&mut self.data, item_index, supplier_id)?;
        self.notify(RequestChange::RecommendationChanged { item_index });
        Ok(chosen)
    }

    pub fn recommend_supplier_for_all(&mut self, supplier_id: &str) -> Result<usize, ServiceError> {
        let changed = comparison::recommend_supplier_for_all(&mut self.data, supplier_id)?;
        self.notify(RequestChange::RecommendationsChanged);
        Ok(changed)
    }

    /// Swaps in a whole new state, as when a draft is loaded
    pub fn replace(&mut self, data: RequestData) {
        self.data = data;
        self.notify(RequestChange::Replaced);
    }

    pub fn clear(&mut self) {
        self.data = RequestData::default();
        self.notify(RequestChange::Cleared);
    }
}
