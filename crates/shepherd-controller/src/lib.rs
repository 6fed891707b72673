pub mod assign;
pub mod claim;
pub mod config;
pub mod error;
pub mod lease;
pub mod reconcile;
pub mod token;

pub use reconcile::{error_policy, reconcile, Context};
