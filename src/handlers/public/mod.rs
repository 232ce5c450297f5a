// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route Prefix: none (/health, /auth/*)
pub mod auth;
pub mod health;

pub use health::health_get;
