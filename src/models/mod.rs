//! Data carried through purchase request composition.

pub mod lenient;
pub mod line_item;
pub mod offer;
pub mod request;
pub mod supplier;

pub use line_item::{generate_item_id, to_two_places, Allocation, LineItem, Priority, Unit};
pub use offer::{line_total, offer_for, OfferBook, Recommendations, SupplierOffer};
pub use request::{DataStats, Draft, RequestData};
pub use supplier::{generate_supplier_id, Currency, CurrencyRates, SubmissionSupplier, Supplier};
