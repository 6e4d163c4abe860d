//! cidelta core library
//!
//! Tracks which root build each branch should be compared against, triggers
//! verification builds for local changes, and reports only the test failures
//! those changes introduced.

pub mod branch;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod filters;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod registrar;
pub mod sync;
pub mod workspace;

pub use branch::{BranchGuess, BranchTracker, BuildIndex};
pub use client::{BuildServer, Reporter, VersionControl};
pub use config::{CideltaConfig, JobsConfig, LoggingConfig, ServerConfig, TrackingConfig};
pub use diff::{DiffResult, DiffStatus, diff};
pub use error::{CoreError, Result};
pub use filters::FilterResolver;
pub use jobs::JobCache;
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use registrar::Registrar;
pub use sync::{DiffReport, SyncSummary, Synchronizer};
pub use workspace::Workspace;
