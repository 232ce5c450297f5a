use tracing::error;

use super::AuthError;
use crate::config::PasswordPolicy;

/// bcrypt with a fixed cost factor
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, self.cost).map_err(|e| {
            error!("bcrypt hashing failed: {}", e);
            AuthError::Hashing
        })
    }

    /// A malformed stored hash counts as a mismatch
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

/// Check `password` against `policy`, collecting every unmet rule
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> Result<(), AuthError> {
    let mut problems = Vec::new();

    if password.chars().count() < policy.min_length {
        problems.push(format!("must be at least {} characters", policy.min_length));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        problems.push("must contain an uppercase letter".to_string());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        problems.push("must contain a lowercase letter".to_string());
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("must contain a digit".to_string());
    }
    if policy.require_symbol && !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        problems.push("must contain a symbol".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(problems))
    }
}
