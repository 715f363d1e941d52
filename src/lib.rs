//! Resumable, file-based pipeline that turns generated devotional text into
//! narrated videos.
//!
//! The filesystem is the state store: every stage writes one artifact per item
//! into its own directory, and a run resumes each item at its first missing
//! artifact.
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod identity;
pub mod layout;
pub mod probe;
pub mod readiness;
pub mod stage;
pub mod util;
pub mod workflow;
