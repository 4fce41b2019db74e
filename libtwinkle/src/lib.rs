//! Twinklecast - content catalog and publishing scheduler
//!
//! This library maintains a lockable catalog of product entries and a
//! set of reusable post fragments, composes social-media posts from
//! them, and schedules posts for at-most-once delivery through an
//! external publisher collaborator.

pub mod catalog;
pub mod composer;
pub mod config;
pub mod error;
pub mod fragments;
mod fsio;
pub mod ledger;
pub mod logging;
pub mod publisher;
pub mod scheduler;
pub mod scheduling;
pub mod selector;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use catalog::CatalogStore;
pub use config::Config;
pub use error::{Result, TwinkleError};
pub use fragments::FragmentStore;
pub use ledger::JobLedger;
pub use scheduler::{SchedulerCore, SchedulerPolicy};
pub use types::{CatalogEntry, ComposedPost, Deal, FragmentSet, JobStatus, ScheduledJob};
