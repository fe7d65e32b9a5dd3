use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use neural_style::{ProgressUpdate, TransferProgress};

pub struct ProgressWindow {
    pb: ProgressBar,
}

impl ProgressWindow {
    pub fn new(iterations: usize) -> Self {
        // Progress shares stdout with the log lines
        let pb = ProgressBar::with_draw_target(Some(iterations as u64), ProgressDrawTarget::stdout());

        // Plain bar if the template is ever rejected
        let sty = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        pb.set_style(sty);

        Self { pb }
    }
}

impl Drop for ProgressWindow {
    fn drop(&mut self) {
        self.pb.finish();
    }
}

impl TransferProgress for ProgressWindow {
    fn update(&mut self, update: ProgressUpdate) {
        self.pb.set_position(update.iteration as u64 + 1);
        self.pb
            .set_message(format!("best loss {:.4e}", update.best_loss));
    }
}
