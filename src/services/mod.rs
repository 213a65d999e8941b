// Grouping and submission
pub mod grouping;
pub mod submission;

// Request editing
pub mod comparison;
pub mod items;
pub mod session;
pub mod suppliers;

// Persistence and checks
pub mod drafts;
pub mod validation;

pub use drafts::{DraftService, DraftStore, FileDraftStore, InMemoryDraftStore, DRAFT_KEY};
pub use grouping::{group_items, ConflictReport, GroupedItem, GroupedItems};
pub use session::{RequestChange, RequestObserver, RequestSession};
pub use submission::{ServerDraft, SubmissionPayload, SubmissionService};
pub use validation::{validate_request, MarkerBoard, ValidationReport, ValidationRules};
