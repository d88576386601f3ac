//! Shared types for Wellspring

mod error;

pub use error::{ErrorBody, FieldError, Result, WellspringError};
