//! Wellspring - employee assistance counseling platform
//!
//! Companies buy counseling allowances for their employees; employees book
//! sessions that are auto-assigned to counselors; counselors are paid through
//! monthly settlements that a super-admin approves and pays.
//!
//! ## Services
//!
//! - **Sessions**: booking, assignment, status machine, records, ratings, disputes
//! - **Settlement**: monthly statements, approval, payment, disputes
//! - **Centers**: counseling centers and their counselors
//! - **Companies**: company administration, usage, ROI metrics
//! - **Dashboard**: super-admin aggregates behind a TTL cache
//! - **Resources, notifications, financial profile and goals**

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, WellspringError};
