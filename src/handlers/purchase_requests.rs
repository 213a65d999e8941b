use super::common::{
    map_service_error, no_content_response, parse_request, success_response, validate_input,
};
use crate::{
    errors::{ApiError, ServiceError},
    events::Event,
    handlers::AppState,
    models::{CurrencyRates, DataStats, RequestData},
    services::{
        comparison::summarize,
        grouping::group_items,
        items::{import_rows, parse_bulk_text, BulkImportPreview},
        validation::validate_request,
    },
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

// Request and response DTOs

/// A request document together with the exchange table used for totals
#[derive(Debug, Deserialize, Validate)]
pub struct ComposeRequest {
    pub request: Value,
    #[serde(default)]
    #[validate(custom = "validate_rates")]
    pub currency_rates: Option<CurrencyRates>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportItemsRequest {
    #[validate(length(min = 1, message = "Import text is required"))]
    pub text: String,
    /// Request to append to; a blank one when absent
    #[serde(default)]
    pub request: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ImportItemsResponse {
    pub preview: BulkImportPreview,
    pub imported: usize,
    pub request: RequestData,
}

#[derive(Debug, Serialize)]
pub struct SavedDraftResponse {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub stats: DataStats,
}

fn validate_rates(rates: &CurrencyRates) -> Result<(), ValidationError> {
    if rates.iter().any(|(_, rate)| rate.is_sign_negative()) {
        return Err(ValidationError::new("negative_currency_rate"));
    }
    Ok(())
}

fn parse_compose(payload: ComposeRequest) -> Result<(RequestData, Option<CurrencyRates>), ApiError> {
    validate_input(&payload)?;
    let data = parse_request(payload.request)?;
    Ok((data, payload.currency_rates))
}

// Handler functions

/// Merge line items that share code, name and unit
pub async fn group_request_items(
    Json(document): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let data = parse_request(document)?;
    let grouped = group_items(&data.items).map_err(|err| {
        if let ServiceError::ItemConflict(report) = &err {
            warn!(conflict_groups = report.groups.len(), "Grouping rejected");
        }
        map_service_error(err)
    })?;

    info!(
        item_count = data.items.len(),
        grouped_item_count = grouped.len(),
        "Items grouped"
    );
    Ok(success_response(grouped))
}

/// Run the pre-submission checks and return the full report
pub async fn validate_purchase_request(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let data = parse_request(document)?;
    let report = validate_request(&data, state.submission.rules());
    Ok(success_response(report))
}

/// Build the submission payload
pub async fn compose_purchase_request(
    State(state): State<AppState>,
    Json(payload): Json<ComposeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, rates) = parse_compose(payload)?;
    let composed = state
        .submission
        .compose(&data, rates.as_ref())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(composed))
}

/// Build a server-side draft; header fields fall back to defaults
pub async fn compose_server_draft(
    State(state): State<AppState>,
    Json(payload): Json<ComposeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, rates) = parse_compose(payload)?;
    let draft = state
        .submission
        .compose_server_draft(&data, rates.as_ref(), Utc::now().date_naive())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(draft))
}

/// Comparison table summary
pub async fn summarize_purchase_request(
    Json(payload): Json<ComposeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, rates) = parse_compose(payload)?;
    let summary = summarize(&data, rates.as_ref()).map_err(map_service_error)?;
    Ok(success_response(summary))
}

/// Parse pasted spreadsheet rows and append the valid ones
pub async fn import_items(
    State(state): State<AppState>,
    Json(payload): Json<ImportItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let mut data = match payload.request {
        Some(document) => parse_request(document)?,
        None => RequestData::default(),
    };
    let preview = parse_bulk_text(&payload.text);
    let imported = import_rows(&mut data, &preview);

    info!(imported, skipped = preview.invalid, "Bulk import applied");
    state
        .event_sender
        .send_or_log(Event::ItemsImported {
            imported,
            skipped: preview.invalid,
        })
        .await;

    Ok(success_response(ImportItemsResponse {
        preview,
        imported,
        request: data,
    }))
}

/// Fetch a stored draft; stale or unreadable ones are gone
pub async fn get_draft(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = state
        .drafts
        .load(&key)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Draft {} not found", key)))?;
    Ok(success_response(draft))
}

/// Store a draft, replacing any previous one under the key
pub async fn save_draft(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(document): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let data = parse_request(document)?;
    let draft = state
        .drafts
        .save(&key, &data)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(SavedDraftResponse {
        key,
        timestamp: draft.timestamp,
        stats: draft.data.stats(),
    }))
}

pub async fn delete_draft(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.drafts.clear(&key).await.map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn purchase_request_routes() -> Router<AppState> {
    Router::new()
        .route("/group", post(group_request_items))
        .route("/validate", post(validate_purchase_request))
        .route("/compose", post(compose_purchase_request))
        .route("/compose/draft", post(compose_server_draft))
        .route("/summary", post(summarize_purchase_request))
        .route("/items/import", post(import_items))
        .route(
            "/drafts/:key",
            get(get_draft).put(save_draft).delete(delete_draft),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::models::Currency;

    #[test]
    fn negative_rates_fail_validation() {
        let payload = ComposeRequest {
            request: json!({}),
            currency_rates: Some(CurrencyRates::new().with_rate(Currency::EUR, dec!(-0.1))),
        };
        assert!(payload.validate().is_err());

        let payload = ComposeRequest {
            request: json!({}),
            currency_rates: None,
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn compose_bodies_are_migrated() {
        let payload: ComposeRequest = serde_json::from_value(json!({
            "request": {"itemRecommendations": {"1": "s2"}},
            "currency_rates": {"TRY": 1, "EUR": "0.025"}
        }))
        .unwrap();

        let (data, rates) = parse_compose(payload).unwrap();
        assert_eq!(data.recommendations[&1], "s2");
        assert_eq!(rates.unwrap().rate(Currency::EUR), Some(dec!(0.025)));
    }
}
