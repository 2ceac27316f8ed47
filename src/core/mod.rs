//! Core types shared by every hothost component.
//!
//! At the moment this is the error taxonomy: [`HotError`] for typed failures and
//! [`ErrorContext`] / [`user_friendly_error`] for rendering them to operators.

pub mod error;

pub use error::{ErrorContext, HotError, user_friendly_error};
