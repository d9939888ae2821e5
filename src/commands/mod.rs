//! CLI Commands
//!
//! Command handlers invoked by the `webaudit` binary. Each returns a
//! `CommandResponse` that the binary prints as JSON.

pub mod analyze;
pub mod health;
pub mod init;
pub mod settings;

pub use analyze::*;
pub use health::*;
pub use init::*;
pub use settings::*;
