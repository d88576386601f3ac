//! Business logic behind the HTTP routes
//!
//! Services take a [`Database`](crate::db::Database) and typed inputs and
//! return documents or views; they know nothing about HTTP.

pub mod accounts;
pub mod assignment;
pub mod centers;
pub mod companies;
pub mod dashboard;
pub mod finance;
pub mod financial_sessions;
pub mod notifications;
pub mod resources;
pub mod sessions;
pub mod settlement;
pub mod statement;
pub mod visibility;
