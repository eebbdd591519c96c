pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod repository;
pub mod rotation;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
