// handlers/public/auth/mod.rs - Token acquisition

pub mod login;   // POST /auth/login - credentials (+ second factor) for a token pair
pub mod refresh; // POST /auth/refresh - refresh token for a new pair

pub use login::login_post;
pub use refresh::refresh_post;
