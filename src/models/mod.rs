//! Data Models
//!
//! Configuration and command envelope types. Analysis results live in
//! `webaudit_pipeline::models`.

pub mod response;
pub mod settings;

pub use response::*;
pub use settings::*;
