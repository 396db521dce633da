use super::models::{StageName, StageResult};

#[derive(Debug, Clone)]
pub enum Event {
    RunStarted(Vec<StageName>),
    StageStarted(StageName),
    StageDeclined(StageName), // operator said no in interactive mode
    StageFinished(StageName, StageResult),
    RunInterrupted(Option<StageName>),
    RunFailed(String),
    RunCompleted,
}
