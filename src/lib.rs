pub mod app;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod permissions;
pub mod secrets;
pub mod state;
pub mod storage;
pub mod uploads;

#[cfg(test)]
pub mod testing;

pub use app::app;
pub use state::AppState;
