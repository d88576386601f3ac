//! HTTP server

mod http;

pub use http::{dispatch, run, AppState};
