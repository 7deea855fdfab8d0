//! Core business logic for quill.
//!
//! Every write that touches a counter runs in one database transaction
//! together with the record it counts. Side effects (stream events,
//! notifications, audit records, email) run after commit and never fail
//! the operation that triggered them.

pub mod services;

pub use services::*;
