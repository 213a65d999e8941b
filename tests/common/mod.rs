#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use purchase_request_core::{
    app_router,
    config::AppConfig,
    events::{Event, EventSender},
    logging::{plain_logger, LoggingState},
    models::{Currency, CurrencyRates},
    services::{DraftStore, InMemoryDraftStore},
    AppState,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

/// Router over an in-memory draft store, with the event stream kept for
/// inspection.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryDraftStore>,
    events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (event_tx, events) = mpsc::channel(64);
        let store = Arc::new(InMemoryDraftStore::new());
        let state = AppState::new(
            config,
            store.clone() as Arc<dyn DraftStore>,
            EventSender::new(event_tx),
        );
        let access_log = Arc::new(LoggingState::new(plain_logger(std::io::sink())));

        Self {
            router: app_router(state.clone(), access_log),
            state,
            store,
            events,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends a request and returns the status with the decoded JSON body
    pub async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Events emitted so far
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

/// Three rows, two of which merge across jobs; every row has an offer and a
/// recommendation.
///
/// EUR total with [`rates`]: 40 TRY + 20 TRY + 7.5 USD = 1 + 0.5 + 6.25.
pub fn sample_request() -> Value {
    json!({
        "title": "Haddehane bakım malzemeleri",
        "description": "Yıllık bakım",
        "priority": "normal",
        "needed_date": "2026-11-02",
        "items": [
            {"id": "i1", "code": "B-10", "name": "Civata", "job_no": "RM-100", "quantity": 10, "unit": "adet"},
            {"id": "i2", "code": "B-10", "name": "Civata", "job_no": "J-200", "quantity": 5, "unit": "adet", "priority": "acil"},
            {"id": "i3", "code": "S-1", "name": "Sac", "job_no": "J-200", "quantity": "2.5", "unit": "kg", "planning_request_item_id": 77}
        ],
        "suppliers": [
            {"id": "s1", "name": "Acme", "currency": "TRY", "payment_terms_id": 30},
            {"id": "s2", "name": "Globex", "default_currency": "USD", "default_tax_rate": 20}
        ],
        "offers": {
            "s1": {
                "0": {"unitPrice": 4, "totalPrice": 40},
                "1": {"unitPrice": 4, "totalPrice": 20},
                "2": {"unitPrice": 100, "totalPrice": 250}
            },
            "s2": {
                "0": {"unitPrice": "0.2", "totalPrice": 2},
                "2": {"unitPrice": 3, "totalPrice": "7.5"}
            }
        },
        "itemRecommendations": {"0": "s1", "1": "s1", "2": "s2"}
    })
}

pub fn rates() -> CurrencyRates {
    CurrencyRates::new()
        .with_rate(Currency::TRY, dec!(1))
        .with_rate(Currency::EUR, dec!(0.025))
        .with_rate(Currency::USD, dec!(0.03))
}

pub fn rates_json() -> Value {
    json!({"TRY": 1, "EUR": "0.025", "USD": "0.03"})
}

/// Reads a decimal serialized either as a JSON string or a number
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    use std::str::FromStr;
    match value {
        Value::String(s) => rust_decimal::Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => rust_decimal::Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, found {}", other),
    }
}
