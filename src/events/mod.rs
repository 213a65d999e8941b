use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is gone
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Why a persisted draft was dropped instead of loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Stale,
    Corrupt,
}

// Define the various events that can occur while composing a purchase request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    DraftSaved {
        key: String,
        item_count: usize,
        saved_at: DateTime<Utc>,
    },
    DraftLoaded {
        key: String,
        item_count: usize,
    },
    DraftDiscarded {
        key: String,
        reason: DiscardReason,
    },
    DraftCleared {
        key: String,
    },
    ItemConflictDetected {
        conflict_groups: usize,
    },
    PurchaseRequestComposed {
        item_count: usize,
        grouped_item_count: usize,
        total_amount_eur: Decimal,
        is_rolling_mill: bool,
    },
    ItemsImported {
        imported: usize,
        skipped: usize,
    },
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

// Process incoming events: log each one, then fan it out to the registered handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::DraftSaved {
                key, item_count, ..
            } => {
                info!(draft_key = %key, item_count, "Draft saved");
            }
            Event::DraftLoaded { key, item_count } => {
                info!(draft_key = %key, item_count, "Draft loaded");
            }
            Event::DraftDiscarded { key, reason } => {
                warn!(draft_key = %key, ?reason, "Draft discarded");
            }
            Event::DraftCleared { key } => {
                info!(draft_key = %key, "Draft cleared");
            }
            Event::ItemConflictDetected { conflict_groups } => {
                warn!(conflict_groups, "Unmergeable duplicate items detected");
            }
            Event::PurchaseRequestComposed {
                item_count,
                grouped_item_count,
                total_amount_eur,
                is_rolling_mill,
            } => {
                info!(
                    item_count,
                    grouped_item_count,
                    total_amount_eur = %total_amount_eur,
                    is_rolling_mill,
                    "Purchase request composed"
                );
            }
            Event::ItemsImported { imported, skipped } => {
                info!(imported, skipped, "Bulk item import applied");
            }
        }

        let results = join_all(handlers.iter().map(|h| h.handle_event(&event))).await;
        for result in results {
            if let Err(e) = result {
                error!("Event handler failed: event={:?}, error={}", event, e);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle_event(&self, _event: &Event) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_reach_every_handler() {
        let (tx, rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let counter = Arc::new(Counting(AtomicUsize::new(0)));

        sender
            .send(Event::DraftCleared { key: "u1".into() })
            .await
            .unwrap();
        sender
            .send(Event::ItemConflictDetected { conflict_groups: 2 })
            .await
            .unwrap();
        drop(sender);

        process_events(rx, vec![counter.clone() as Arc<dyn EventHandler>]).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::DraftCleared { key: "gone".into() })
            .await
            .is_err());
        sender
            .send_or_log(Event::DraftCleared { key: "gone".into() })
            .await;
    }
}
