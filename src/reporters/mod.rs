pub mod writer;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RunConfig;
use crate::core::models::{StageName, StageResult};

pub use writer::FileReporter;

/// Everything a report renders: run metadata plus every stage result.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub target: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub results: &'a BTreeMap<StageName, StageResult>,
    pub config: &'a RunConfig,
}
