use std::time::Duration;

use echelle_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Terminal progress for a reduction session: a spinner for unsized
/// stages, a bar when the number of items is known.
pub struct TerminalReporter {
    pb: ProgressBar,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.pb.reset();
        self.pb.set_draw_target(ProgressDrawTarget::stderr());
        match total_items {
            Some(n) => {
                self.pb.set_length(n as u64);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("{msg:30} [{bar:30}] {pos}/{len}")
                {
                    self.pb.set_style(style.progress_chars("=> "));
                }
            }
            None => {
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
                    self.pb.set_style(style);
                }
                self.pb.enable_steady_tick(Duration::from_millis(100));
            }
        }
        self.pb.set_message(stage.to_string());
    }

    fn advance(&self, items_done: usize) {
        self.pb.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        self.pb.disable_steady_tick();
        self.pb.finish_and_clear();
    }
}
