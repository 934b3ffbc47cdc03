//! Request handlers, one module per sub-application.

pub mod admin;
pub mod analyzer;
pub mod files;
pub mod health;
pub mod labeler;

pub use health::*;
