//! Authentication and authorization
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - Roles and per-route allow-lists
//! - The request gate that resolves a bearer token to a live user

pub mod gate;
pub mod jwt;
pub mod password;
pub mod roles;

pub use gate::{authenticate, authorize, require_role, AuthUser};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput};
pub use password::{check_password_policy, hash_password, verify_password};
pub use roles::{allow, is_role_allowed, Role};
