pub mod common;
pub mod health;
pub mod purchase_requests;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
