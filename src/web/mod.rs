//! Web server module
//!
//! A thin HTTP surface over the search contract, one pair of routes per
//! configured engine.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
