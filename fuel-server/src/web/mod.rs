//! Web layer for the fuel station finder.
//!
//! A thin JSON adapter over [`FuelFinder`](crate::search::FuelFinder).

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
