use std::collections::BTreeSet;

use super::models::StageName;
use crate::config::types::Mode;

/// Ordered stage list for a mode. Never empty.
pub fn resolve_stages(mode: Mode) -> Vec<StageName> {
    use StageName::*;

    match mode {
        Mode::Discover | Mode::Passive => vec![Discovery],
        Mode::Scan => vec![Scanning],
        Mode::Web => vec![Web],
        Mode::Content => vec![Content],
        Mode::Vuln => vec![Vulnerability],
        Mode::Active => vec![Scanning, Web, Content],
        Mode::Full => StageName::ALL.to_vec(),
    }
}

/// Drops stages already recorded as completed, preserving relative order.
pub fn filter_completed(stages: &[StageName], completed: &BTreeSet<StageName>) -> Vec<StageName> {
    stages
        .iter()
        .copied()
        .filter(|stage| !completed.contains(stage))
        .collect()
}

/// Stage list for a run: the mode's stages, minus completed ones when resuming.
pub fn plan(mode: Mode, completed: Option<&BTreeSet<StageName>>) -> Vec<StageName> {
    let stages = resolve_stages(mode);
    match completed {
        Some(done) => filter_completed(&stages, done),
        None => stages,
    }
}
