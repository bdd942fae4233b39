//! Course completion from watch-time and grade exports: agent leaderboards,
//! module funnels and per-student summaries.

pub use catalog::{Catalog, Discipline, DomainSet, Module};
pub use completion::{GradeBook, ThresholdProfile};
pub use config::{Config, ReportKind};
pub use error::{Error, Result};
pub use models::*;
pub use progress::{ProgressIndex, RecordFilter};

pub mod agents;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod duration;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod modules;
pub mod progress;
pub mod report;
