//! Completion Validation
//!
//! Decides whether a provider result is usable before a request is marked
//! completed. Validator failures are terminal: an empty completion produced
//! from identical inputs is likely to repeat, so it is never retried.

mod response;

pub use response::{ResponseValidator, ValidationOutcome};
