//! Draft persistence: stores, legacy-field migration and the auto-save loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::DraftConfig;
use crate::errors::ServiceError;
use crate::events::{DiscardReason, Event, EventSender};
use crate::models::{generate_item_id, Draft, LineItem, OfferBook, RequestData};
use crate::services::session::{RequestChange, RequestObserver};

/// Key the single in-progress purchase request is stored under
pub const DRAFT_KEY: &str = "purchaseRequestDraft";

/// Raw blob storage for drafts.
///
/// Blobs come back as bytes; whether they decode is the reader's concern.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError>;
    async fn put(&self, key: &str, blob: String) -> Result<(), ServiceError>;
    async fn remove(&self, key: &str) -> Result<(), ServiceError>;
}

/// Accepts keys made only of `[A-Za-z0-9_-]`
pub fn validate_key(key: &str) -> Result<&str, ServiceError> {
    if key.is_empty() {
        return Err(ServiceError::InvalidInput(
            "draft key must not be empty".to_string(),
        ));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ServiceError::InvalidInput(format!(
            "draft key {:?} contains {:?}; use letters, digits, '_' or '-'",
            key, c
        )));
    }
    Ok(key)
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ServiceError> {
        Ok(self.dir.join(format!("{}.json", validate_key(key)?)))
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read draft");
                Err(e.into())
            }
        }
    }

    async fn put(&self, key: &str, blob: String) -> Result<(), ServiceError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    blobs: DashMap<String, String>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        Ok(self
            .blobs
            .get(key)
            .map(|blob| blob.value().clone().into_bytes()))
    }

    async fn put(&self, key: &str, blob: String) -> Result<(), ServiceError> {
        self.blobs.insert(key.to_string(), blob);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ServiceError> {
        self.blobs.remove(key);
        Ok(())
    }
}

const SUPPLIER_RENAMES: [(&str, &str); 4] = [
    ("currency", "default_currency"),
    ("payment_terms_id", "default_payment_terms"),
    ("tax_rate", "default_tax_rate"),
    ("payment_terms", "default_payment_terms"),
];

const ITEM_RENAMES: [(&str, &str); 3] = [
    ("specs", "specifications"),
    ("planning_request_item_id", "source_planning_request_item_id"),
    ("planning_request_item_ids", "source_planning_request_item_ids"),
];

/// Moves `from` to `to` when `from` is present and `to` is missing.
///
/// An explicit `null` under `to` counts as present.
fn rename_field(object: &mut Map<String, Value>, from: &str, to: &str) -> bool {
    if !object.contains_key(from) || object.contains_key(to) {
        return false;
    }
    match object.remove(from) {
        Some(value) => {
            object.insert(to.to_string(), value);
            true
        }
        None => false,
    }
}

fn migrate_objects(list: Option<&mut Value>, renames: &[(&str, &str)]) -> usize {
    let Some(Value::Array(entries)) = list else {
        return 0;
    };
    let mut renamed = 0;
    for entry in entries.iter_mut() {
        if let Value::Object(object) = entry {
            for (from, to) in renames {
                if rename_field(object, from, to) {
                    renamed += 1;
                }
            }
        }
    }
    renamed
}

/// Renames legacy field names in a persisted request document, in place.
///
/// Only acts when the legacy key is present and the current key is absent,
/// so unknown fields survive and running it twice changes nothing. Returns
/// the number of renamed fields.
pub fn migrate_draft(document: &mut Value) -> usize {
    let Value::Object(root) = document else {
        return 0;
    };

    let mut renamed = 0;
    let recommendations_missing = match root.get("recommendations") {
        None | Some(Value::Null) => true,
        Some(Value::Object(existing)) => existing.is_empty(),
        Some(_) => false,
    };
    if recommendations_missing && root.contains_key("itemRecommendations") {
        if let Some(legacy) = root.remove("itemRecommendations") {
            root.insert("recommendations".to_string(), legacy);
            renamed += 1;
        }
    }

    renamed += migrate_objects(root.get_mut("suppliers"), &SUPPLIER_RENAMES);
    renamed += migrate_objects(root.get_mut("items"), &ITEM_RENAMES);

    if renamed > 0 {
        debug!(renamed, "Migrated legacy draft fields");
    }
    renamed
}

/// Migrates and parses an incoming request document
pub fn request_from_value(mut document: Value) -> Result<RequestData, ServiceError> {
    migrate_draft(&mut document);
    serde_json::from_value(document)
        .map_err(|e| ServiceError::InvalidInput(format!("invalid request document: {}", e)))
}

/// Splits rows carrying allocations back into one row per job.
///
/// Offers and recommendations follow the split: each new row inherits its
/// source row's entries with totals repriced for the row's quantity.
/// Returns whether anything was split; a total that no longer fits a
/// `Decimal` leaves `data` untouched and fails.
pub fn ungroup_items(data: &mut RequestData) -> Result<bool, ServiceError> {
    if data.items.iter().all(|item| item.allocations.is_empty()) {
        return Ok(false);
    }

    let mut items: Vec<LineItem> = Vec::new();
    let mut sources: Vec<usize> = Vec::new();
    for (index, item) in data.items.iter().enumerate() {
        if item.allocations.is_empty() {
            items.push(item.clone());
            sources.push(index);
            continue;
        }
        for allocation in &item.allocations {
            items.push(LineItem {
                id: generate_item_id(),
                job_no: allocation.job_no.clone(),
                quantity: allocation.quantity,
                allocations: Vec::new(),
                ..item.clone()
            });
            sources.push(index);
        }
    }

    let mut offers = OfferBook::new();
    for (supplier_id, per_item) in &data.offers {
        let mut split = std::collections::BTreeMap::new();
        for (new_index, source) in sources.iter().enumerate() {
            if let Some(offer) = per_item.get(source) {
                let mut offer = offer.clone();
                offer.reprice(items[new_index].quantity)?;
                split.insert(new_index, offer);
            }
        }
        offers.insert(supplier_id.clone(), split);
    }

    let recommendations = sources
        .iter()
        .enumerate()
        .filter_map(|(new_index, source)| {
            data.recommendations
                .get(source)
                .map(|supplier_id| (new_index, supplier_id.clone()))
        })
        .collect();

    debug!(
        grouped = data.items.len(),
        rows = items.len(),
        "Ungrouped merged draft items"
    );
    data.items = items;
    data.offers = offers;
    data.recommendations = recommendations;
    Ok(true)
}

/// Saves, loads and expires drafts in a [`DraftStore`]
#[derive(Clone)]
pub struct DraftService {
    store: Arc<dyn DraftStore>,
    freshness: chrono::Duration,
    event_sender: Option<EventSender>,
}

impl DraftService {
    pub fn new(store: Arc<dyn DraftStore>, config: &DraftConfig) -> Self {
        Self {
            store,
            freshness: config.freshness_window(),
            event_sender: None,
        }
    }

    pub fn with_events(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    pub async fn save(&self, key: &str, data: &RequestData) -> Result<Draft, ServiceError> {
        self.save_as_of(key, data, Utc::now()).await
    }

    /// Overwrites whatever is stored under `key`
    #[instrument(skip(self, data), fields(item_count = data.items.len()))]
    pub async fn save_as_of(
        &self,
        key: &str,
        data: &RequestData,
        now: DateTime<Utc>,
    ) -> Result<Draft, ServiceError> {
        validate_key(key)?;
        let draft = Draft::capture(data.clone(), now);
        let blob = serde_json::to_string(&draft)?;
        self.store.put(key, blob).await?;
        debug!(key, "Draft saved");
        self.emit(Event::DraftSaved {
            key: key.to_string(),
            item_count: draft.data.items.len(),
            saved_at: now,
        })
        .await;
        Ok(draft)
    }

    pub async fn load(&self, key: &str) -> Result<Option<Draft>, ServiceError> {
        self.load_as_of(key, Utc::now()).await
    }

    /// Returns the stored draft when it is fresh and readable.
    ///
    /// Stale or unreadable drafts are deleted and reported as absent.
    #[instrument(skip(self))]
    pub async fn load_as_of(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Draft>, ServiceError> {
        validate_key(key)?;
        let Some(blob) = self.store.get(key).await? else {
            return Ok(None);
        };

        let parsed = serde_json::from_slice::<Value>(&blob).and_then(|mut document| {
            migrate_draft(&mut document);
            serde_json::from_value::<Draft>(document)
        });
        let mut draft = match parsed {
            Ok(draft) => draft,
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable draft");
                self.discard(key, DiscardReason::Corrupt).await?;
                return Ok(None);
            }
        };

        if draft.age(now) >= self.freshness {
            warn!(key, saved_at = %draft.timestamp, "Discarding stale draft");
            self.discard(key, DiscardReason::Stale).await?;
            return Ok(None);
        }

        if let Err(e) = ungroup_items(&mut draft.data) {
            warn!(key, error = %e, "Discarding draft whose rows cannot be split");
            self.discard(key, DiscardReason::Corrupt).await?;
            return Ok(None);
        }
        draft.planning_request_item_ids = draft.data.planning_request_item_ids();
        info!(key, item_count = draft.data.items.len(), "Draft loaded");
        self.emit(Event::DraftLoaded {
            key: key.to_string(),
            item_count: draft.data.items.len(),
        })
        .await;
        Ok(Some(draft))
    }

    async fn discard(&self, key: &str, reason: DiscardReason) -> Result<(), ServiceError> {
        self.store.remove(key).await?;
        self.emit(Event::DraftDiscarded {
            key: key.to_string(),
            reason,
        })
        .await;
        Ok(())
    }

    /// Reads from the store under a key no draft uses
    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.store.get("__health__").await.map(|_| ())
    }

    pub async fn clear(&self, key: &str) -> Result<(), ServiceError> {
        validate_key(key)?;
        self.store.remove(key).await?;
        info!(key, "Draft cleared");
        self.emit(Event::DraftCleared {
            key: key.to_string(),
        })
        .await;
        Ok(())
    }
}

/// Serializes a request for download, stamped with `exportDate`
pub fn export_document(data: &RequestData) -> Result<String, ServiceError> {
    let mut document = serde_json::to_value(data)?;
    if let Value::Object(root) = &mut document {
        root.insert(
            "exportDate".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Reads a previously exported request
pub fn import_document(raw: &str) -> Result<RequestData, ServiceError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|_| ServiceError::InvalidInput("invalid data format".to_string()))?;
    let has_required = document
        .as_object()
        .is_some_and(|root| root.contains_key("items") && root.contains_key("suppliers"));
    if !has_required {
        return Err(ServiceError::InvalidInput(
            "invalid data format".to_string(),
        ));
    }
    request_from_value(document)
}

#[derive(Debug)]
enum AutoSaveSignal {
    Edited(RequestData),
    Replaced(RequestData),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Background writer that saves the latest snapshot after edits settle and
/// on a fixed interval
pub struct AutoSaver {
    signals: mpsc::UnboundedSender<AutoSaveSignal>,
    handle: JoinHandle<()>,
}

impl AutoSaver {
    pub fn spawn(
        service: DraftService,
        key: impl Into<String>,
        debounce: Duration,
        interval: Duration,
    ) -> Self {
        let (signals, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_autosave(service, key.into(), rx, debounce, interval));
        Self { signals, handle }
    }

    pub fn from_config(service: DraftService, key: impl Into<String>, config: &DraftConfig) -> Self {
        Self::spawn(service, key, config.debounce(), config.autosave_interval())
    }

    /// Records a new snapshot and re-arms the debounce timer
    pub fn notify_edit(&self, data: &RequestData) {
        self.signal(AutoSaveSignal::Edited(data.clone()));
    }

    /// Records a new snapshot without arming the timer
    pub fn notify_replaced(&self, data: &RequestData) {
        self.signal(AutoSaveSignal::Replaced(data.clone()));
    }

    /// Saves the latest snapshot now
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.signal(AutoSaveSignal::Flush(tx));
        let _ = rx.await;
    }

    /// Saves the latest snapshot and stops the loop
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.signal(AutoSaveSignal::Shutdown(tx));
        let _ = rx.await;
    }

    fn signal(&self, signal: AutoSaveSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Auto-save loop already stopped");
        }
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl RequestObserver for AutoSaver {
    fn on_change(&self, change: &RequestChange, data: &RequestData) {
        match change {
            RequestChange::Replaced | RequestChange::Cleared => self.notify_replaced(data),
            _ => self.notify_edit(data),
        }
    }
}

async fn save_snapshot(service: &DraftService, key: &str, latest: Option<&RequestData>) {
    let Some(data) = latest.filter(|data| data.has_meaningful_data()) else {
        return;
    };
    if let Err(e) = service.save(key, data).await {
        error!(key, error = %e, "Auto-save failed");
    }
}

async fn run_autosave(
    service: DraftService,
    key: String,
    mut rx: mpsc::UnboundedReceiver<AutoSaveSignal>,
    debounce: Duration,
    interval: Duration,
) {
    let mut latest: Option<RequestData> = None;
    let mut deadline: Option<Instant> = None;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let settle = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            signal = rx.recv() => match signal {
                Some(AutoSaveSignal::Edited(data)) => {
                    latest = Some(data);
                    deadline = Some(Instant::now() + debounce);
                }
                Some(AutoSaveSignal::Replaced(data)) => {
                    latest = Some(data);
                }
                Some(AutoSaveSignal::Flush(done)) => {
                    deadline = None;
                    save_snapshot(&service, &key, latest.as_ref()).await;
                    let _ = done.send(());
                }
                Some(AutoSaveSignal::Shutdown(done)) => {
                    save_snapshot(&service, &key, latest.as_ref()).await;
                    let _ = done.send(());
                    break;
                }
                None => break,
            },
            _ = settle => {
                deadline = None;
                save_snapshot(&service, &key, latest.as_ref()).await;
            }
            _ = ticker.tick() => {
                save_snapshot(&service, &key, latest.as_ref()).await;
            }
        }
    }
    debug!(key = %key, "Auto-save loop stopped");
}
