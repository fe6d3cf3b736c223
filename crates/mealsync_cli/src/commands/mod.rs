//! CLI command implementations.

pub mod auth;
pub mod edit;
pub mod meals;
pub mod queue;
pub mod status;
pub mod sync;
