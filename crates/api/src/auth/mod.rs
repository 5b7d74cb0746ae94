//! Authentication for SoloBoard: session tokens, passwords, admin and cron guards

pub mod cron;
#[cfg(test)]
mod edge_case_tests;
pub mod jwt;
pub mod middleware;
#[cfg(test)]
mod middleware_tests;
pub mod password;

pub use cron::{require_cron, CronAuth};
pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{
    authenticate, extract_session_token, require_admin, require_auth, secrets_match,
    session_cookie, AdminState, AuthError, AuthState, AuthUser, SESSION_COOKIE,
};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordError};
