use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::events::Event;
use super::models::{StageName, StageResult, StageStatus};
use crate::utils::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Running,
    Completed,
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed,
}

/// Mutable aggregate for one pipeline invocation.
#[derive(Debug, Serialize)]
pub struct RunState {
    pub target: String,
    pub phase: RunPhase,
    pub planned: Vec<StageName>,
    pub stage_states: BTreeMap<StageName, StageState>,
    pub results: BTreeMap<StageName, StageResult>,
    /// Stages a previous, interrupted run already attempted.
    pub resumed_from: BTreeSet<StageName>,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
}

impl RunState {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            phase: RunPhase::NotStarted,
            planned: Vec::new(),
            stage_states: BTreeMap::new(),
            results: BTreeMap::new(),
            resumed_from: BTreeSet::new(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn on_event(&mut self, ev: Event) {
        match ev {
            Event::RunStarted(stages) => {
                tracing::debug!("Run started with stages: {:?}", stages);
                self.phase = RunPhase::Running;
                self.start_time.get_or_insert_with(time::now);
                self.stage_states = stages.iter().map(|s| (*s, StageState::Pending)).collect();
                self.planned = stages;
            }
            Event::StageStarted(stage) => {
                tracing::debug!("Stage started: {}", stage);
                self.stage_states.insert(stage, StageState::Running);
            }
            Event::StageDeclined(stage) => {
                tracing::info!("Skipping {}", stage);
                self.stage_states.insert(stage, StageState::Skipped);
            }
            Event::StageFinished(stage, result) => {
                let state = match result.status {
                    StageStatus::Failed => StageState::Failed,
                    _ => StageState::Succeeded,
                };
                tracing::debug!("Stage finished: {} ({})", stage, result.status);
                self.stage_states.insert(stage, state);
                self.results.insert(stage, result);
            }
            Event::RunInterrupted(stage) => {
                match stage {
                    Some(stage) => tracing::warn!("Scan interrupted during stage {}", stage),
                    None => tracing::warn!("Scan interrupted"),
                }
                self.phase = RunPhase::Interrupted;
            }
            Event::RunFailed(reason) => {
                tracing::error!("Workflow error: {}", reason);
                self.phase = RunPhase::Failed;
            }
            Event::RunCompleted => {
                self.phase = RunPhase::Completed;
                self.end_time = Some(time::now());
            }
        }
    }

    /// Starts the run clock ahead of any setup I/O. `RunStarted` keeps it.
    pub fn mark_started(&mut self) {
        self.start_time = Some(time::now());
    }

    /// Every stage attempted so far, including those from the resumed run,
    /// in pipeline order.
    pub fn attempted_stages(&self) -> Vec<StageName> {
        let mut attempted: BTreeSet<StageName> = self.resumed_from.clone();
        attempted.extend(self.results.keys().copied());
        attempted.into_iter().collect()
    }

    pub fn failed_stages(&self) -> Vec<StageName> {
        self.results
            .iter()
            .filter(|(_, r)| r.status == StageStatus::Failed)
            .map(|(s, _)| *s)
            .collect()
    }

    pub fn duration_seconds(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => time::duration_seconds(start, end),
            (Some(start), None) => time::duration_seconds(start, time::now()),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut state = RunState::new("example.com");
        assert_eq!(state.phase, RunPhase::NotStarted);

        state.on_event(Event::RunStarted(vec![StageName::Discovery, StageName::Scanning]));
        assert_eq!(state.phase, RunPhase::Running);
        assert_eq!(state.stage_states[&StageName::Scanning], StageState::Pending);

        state.on_event(Event::StageStarted(StageName::Discovery));
        state.on_event(Event::StageFinished(
            StageName::Discovery,
            StageResult::failed("/tmp/01-discovery", "boom"),
        ));
        state.on_event(Event::StageDeclined(StageName::Scanning));
        state.on_event(Event::RunCompleted);

        assert_eq!(state.phase, RunPhase::Completed);
        assert_eq!(state.stage_states[&StageName::Discovery], StageState::Failed);
        assert_eq!(state.stage_states[&StageName::Scanning], StageState::Skipped);
        assert_eq!(state.attempted_stages(), vec![StageName::Discovery]);
        assert_eq!(state.failed_stages(), vec![StageName::Discovery]);
        assert!(state.end_time.is_some());
    }

    #[test]
    fn test_run_started_keeps_earlier_start_time() {
        let mut state = RunState::new("example.com");
        state.mark_started();
        let started = state.start_time;
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.on_event(Event::RunStarted(vec![StageName::Discovery]));
        assert_eq!(state.start_time, started);
    }

    #[test]
    fn test_attempted_includes_resumed_stages() {
        let mut state = RunState::new("example.com");
        state.resumed_from.insert(StageName::Discovery);
        state.on_event(Event::RunStarted(vec![StageName::Web]));
        state.on_event(Event::StageFinished(
            StageName::Web,
            StageResult::new(StageStatus::Success, "/tmp/03-web"),
        ));
        assert_eq!(state.attempted_stages(), vec![StageName::Discovery, StageName::Web]);
    }
}
