// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (Bearer access token, user resolved by the
// auth middleware and passed as `Extension<User>`)
pub mod protected;
pub mod public;
