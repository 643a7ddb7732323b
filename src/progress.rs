//! Progress bar fed by engine run events

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{RunObserver, RunReport, TaskKey, TaskPhase, TaskReport, TaskStatus};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// One bar for the whole run; failures are printed above it as they happen
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }
}

impl RunObserver for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn on_phase(&mut self, key: &TaskKey, phase: TaskPhase) {
        if phase.is_in_flight() {
            self.bar.set_message(format!("{key}: {phase}"));
        }
    }

    fn on_task_complete(&mut self, report: &TaskReport) {
        self.bar.inc(1);
        match report.status {
            TaskStatus::Failed => {
                let reason = report
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.bar
                    .println(format!("{} {}: {}", "✗".red(), report.key, reason));
            }
            TaskStatus::Created | TaskStatus::Updated => {
                self.bar
                    .println(format!("{} {} {}", "✓".green(), report.key, report.status));
            }
            TaskStatus::Unchanged | TaskStatus::Skipped => {}
        }
    }

    fn on_run_complete(&mut self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}
