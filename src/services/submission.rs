use chrono::NaiveDate;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::SubmissionConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    CurrencyRates, OfferBook, Priority, Recommendations, RequestData, SubmissionSupplier,
};
use crate::services::comparison::total_amount_eur;
use crate::services::grouping::{
    group_items, reindex_offers, reindex_recommendations, GroupedItem, GroupedItems,
};
use crate::services::suppliers::transform_suppliers_for_submission;
use crate::services::validation::{validate_request, ValidationRules};

/// Document handed to the purchase-request backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub needed_date: String,
    pub items: Vec<GroupedItem>,
    pub suppliers: Vec<SubmissionSupplier>,
    pub offers: OfferBook,
    pub recommendations: Recommendations,
    pub total_amount_eur: Decimal,
    pub is_rolling_mill: bool,
    pub planning_request_item_ids: Vec<i64>,
}

/// A submission stored server-side for later completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDraft {
    pub title: String,
    pub description: String,
    pub needed_date: String,
    pub priority: Priority,
    pub data: SubmissionPayload,
}

/// Turns a composed request into the backend's submission shape
#[derive(Clone)]
pub struct SubmissionService {
    config: SubmissionConfig,
    rules: ValidationRules,
    event_sender: Option<EventSender>,
}

impl SubmissionService {
    pub fn new(config: SubmissionConfig, rules: ValidationRules) -> Self {
        Self {
            config,
            rules,
            event_sender: None,
        }
    }

    pub fn with_events(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    /// Any allocated job number carrying the rolling-mill prefix
    pub fn is_rolling_mill(&self, items: &[GroupedItem]) -> bool {
        let prefix = self.config.rolling_mill_prefix.to_uppercase();
        items
            .iter()
            .flat_map(GroupedItem::job_numbers)
            .any(|job| job.trim().to_uppercase().starts_with(&prefix))
    }

    async fn group(&self, data: &RequestData) -> Result<GroupedItems, ServiceError> {
        let result = group_items(&data.items);
        if let Err(ServiceError::ItemConflict(report)) = &result {
            counter!("purchase_requests.item_conflicts", 1);
            self.emit(Event::ItemConflictDetected {
                conflict_groups: report.groups.len(),
            })
            .await;
        }
        result
    }

    fn payload(
        &self,
        data: &RequestData,
        grouped: GroupedItems,
        rates: Option<&CurrencyRates>,
        title: String,
        description: String,
    ) -> Result<SubmissionPayload, ServiceError> {
        let offers = reindex_offers(&data.offers, &grouped)?;
        let recommendations = reindex_recommendations(&data.recommendations, &grouped);
        let is_rolling_mill = self.is_rolling_mill(&grouped.items);

        Ok(SubmissionPayload {
            title,
            description,
            priority: data.priority,
            needed_date: data.needed_date.trim().to_string(),
            items: grouped.items,
            suppliers: transform_suppliers_for_submission(&data.suppliers),
            offers,
            recommendations,
            total_amount_eur: total_amount_eur(data, rates)?,
            is_rolling_mill,
            planning_request_item_ids: data.planning_request_item_ids(),
        })
    }

    /// Validates, groups and re-keys a request for submission
    #[instrument(skip_all, fields(item_count = data.items.len()))]
    pub async fn compose(
        &self,
        data: &RequestData,
        rates: Option<&CurrencyRates>,
    ) -> Result<SubmissionPayload, ServiceError> {
        let started = Instant::now();

        let report = validate_request(data, &self.rules);
        if !report.is_valid {
            counter!("purchase_requests.validation_failures", 1);
            warn!(
                error_count = report.errors.len(),
                "Purchase request failed validation"
            );
            return Err(ServiceError::ValidationFailed(report.errors));
        }

        let grouped = self.group(data).await?;
        if rates.map_or(true, CurrencyRates::is_empty) {
            warn!("No currency rates supplied; total_amount_eur will be zero");
        }
        let payload = self.payload(
            data,
            grouped,
            rates,
            data.title.trim().to_string(),
            data.description.trim().to_string(),
        )?;

        counter!("purchase_requests.composed", 1);
        histogram!(
            "purchase_requests.compose_seconds",
            started.elapsed().as_secs_f64()
        );
        info!(
            grouped_item_count = payload.items.len(),
            total_amount_eur = %payload.total_amount_eur,
            is_rolling_mill = payload.is_rolling_mill,
            "Purchase request composed"
        );
        self.emit(Event::PurchaseRequestComposed {
            item_count: data.items.len(),
            grouped_item_count: payload.items.len(),
            total_amount_eur: payload.total_amount_eur,
            is_rolling_mill: payload.is_rolling_mill,
        })
        .await;
        Ok(payload)
    }

    /// Builds a server-side draft: no validation, but grouping still applies
    #[instrument(skip_all, fields(item_count = data.items.len()))]
    pub async fn compose_server_draft(
        &self,
        data: &RequestData,
        rates: Option<&CurrencyRates>,
        today: NaiveDate,
    ) -> Result<ServerDraft, ServiceError> {
        let grouped = self.group(data).await?;

        let title = non_blank(&data.title).unwrap_or(self.config.default_title.as_str());
        let description =
            non_blank(&data.description).unwrap_or(self.config.default_description.as_str());
        let payload = self.payload(
            data,
            grouped,
            rates,
            title.to_string(),
            description.to_string(),
        )?;

        counter!("purchase_requests.server_drafts", 1);
        Ok(ServerDraft {
            title: title.to_string(),
            description: description.to_string(),
            needed_date: non_blank(&data.needed_date)
                .map(str::to_string)
                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
            priority: data.priority,
            data: payload,
        })
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Allocation, LineItem, Supplier, SupplierOffer, Unit};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn service() -> SubmissionService {
        SubmissionService::new(SubmissionConfig::default(), ValidationRules::default())
    }

    fn grouped_with_jobs(jobs: &[&str]) -> Vec<GroupedItem> {
        let items: Vec<LineItem> = jobs
            .iter()
            .map(|job| LineItem::new("A", "Bolt", *job, dec!(1), Unit::Adet))
            .collect();
        group_items(&items).unwrap().items
    }

    #[test]
    fn rolling_mill_prefix_is_case_insensitive() {
        let service = service();
        assert!(service.is_rolling_mill(&grouped_with_jobs(&["J1", "rm-204"])));
        assert!(!service.is_rolling_mill(&grouped_with_jobs(&["J1", "ARM-1"])));
    }

    #[tokio::test]
    async fn invalid_requests_are_not_composed() {
        let result = service().compose(&RequestData::default(), None).await;
        assert_matches!(result, Err(ServiceError::ValidationFailed(errors)) => {
            assert!(errors.contains(&"Talep başlığı zorunludur".to_string()));
        });
    }

    #[tokio::test]
    async fn server_draft_fills_defaults_and_skips_validation() {
        let mut merged = LineItem::new("A", "Bolt", "", dec!(3), Unit::Adet);
        merged.allocations = vec![Allocation::new("RM12", dec!(3))];
        let mut data = RequestData {
            items: vec![merged],
            suppliers: vec![Supplier::new("s1", "Acme")],
            ..RequestData::default()
        };
        data.offers
            .entry("s1".into())
            .or_default()
            .insert(0, SupplierOffer::priced(dec!(2), dec!(3)).unwrap());

        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let draft = service()
            .compose_server_draft(&data, None, today)
            .await
            .unwrap();

        assert_eq!(draft.title, "Malzeme Satın Alma Talebi");
        assert_eq!(draft.description, "Proje için gerekli malzemeler");
        assert_eq!(draft.needed_date, "2026-10-18");
        assert_eq!(draft.data.needed_date, "");
        assert!(draft.data.is_rolling_mill);
        assert_eq!(draft.data.offers["s1"][&0].total_price, dec!(6));
    }
}
