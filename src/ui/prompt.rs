use async_trait::async_trait;
use indicatif::ProgressBar;
use std::io::{self, BufRead, Write};

use crate::core::models::StageName;
use crate::core::pipeline::Confirm;

/// Asks on stdin before each stage. Only an explicit `n`/`no` declines.
pub struct StdinConfirm {
    progress: Option<ProgressBar>,
}

impl StdinConfirm {
    pub fn new(progress: Option<ProgressBar>) -> Self {
        Self { progress }
    }
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, stage: StageName) -> bool {
        let question = format!("[?] Execute {}? [Y/n]: ", stage);
        let progress = self.progress.clone();

        let answer = tokio::task::spawn_blocking(move || match progress {
            Some(bar) => bar.suspend(|| ask(&question)),
            None => ask(&question),
        })
        .await;

        match answer {
            Ok(Some(line)) => is_accepted(&line),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Prompt failed, continuing with {}: {}", stage, e);
                true
            }
        }
    }
}

fn ask(question: &str) -> Option<String> {
    print!("{}", question);
    let _ = io::stdout().flush();

    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input),
    }
}

fn is_accepted(response: &str) -> bool {
    !matches!(response.trim().to_lowercase().as_str(), "n" | "no")
}
