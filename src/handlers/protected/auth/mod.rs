// handlers/protected/auth/mod.rs - Account endpoints for the authenticated user

pub mod mfa;    // POST /api/auth/mfa/setup, POST /api/auth/mfa/confirm
pub mod whoami; // GET /api/auth/whoami

pub use mfa::{mfa_confirm_post, mfa_setup_post};
pub use whoami::whoami_get;
