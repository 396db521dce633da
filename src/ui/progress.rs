use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::models::{StageName, StageStatus};

/// One bar over the planned stages of a run.
pub struct ProgressManager {
    bar: ProgressBar,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    /// A manager that never draws; used when verbose logs own the terminal.
    pub fn hidden() -> Self {
        let manager = Self::new();
        manager.bar.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    /// Handle for suspending the bar while something else writes to the terminal.
    pub fn handle(&self) -> ProgressBar {
        self.bar.clone()
    }

    pub fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.enable_steady_tick(std::time::Duration::from_millis(120));
    }

    pub fn stage_started(&self, stage: StageName) {
        self.bar.set_message(format!("running {}", stage));
    }

    pub fn stage_finished(&self, stage: StageName, status: StageStatus) {
        self.bar.println(format!("{} {}", status_marker(status), stage));
        self.bar.inc(1);
    }

    pub fn stage_declined(&self, stage: StageName) {
        self.bar.println(format!("[-] {} skipped by operator", stage));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn abandon(&self) {
        self.bar.abandon_with_message("interrupted");
    }
}

fn status_marker(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "[+]",
        StageStatus::Partial => "[~]",
        StageStatus::Skipped => "[-]",
        StageStatus::Failed => "[!]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_finished_and_declined_stages() {
        let progress = ProgressManager::hidden();
        progress.start(3);
        progress.stage_started(StageName::Discovery);
        progress.stage_finished(StageName::Discovery, StageStatus::Success);
        progress.stage_declined(StageName::Scanning);
        assert_eq!(progress.handle().position(), 2);
        progress.finish();
    }
}
