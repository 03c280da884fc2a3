use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Progress tracking for the analysis phases
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_analysis() -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Phases").underlined());
        let pb = create_spinner(
            bright_yellow("Phase 1/2: Fetching and analyzing build failures").to_string(),
        );
        Self { pb }
    }

    pub fn finish_analysis_start_cross_reference(self) -> Self {
        self.pb
            .finish_with_message(bright_green("Phase 1/2: Build failures analyzed ✓").to_string());
        let pb = create_spinner(
            bright_yellow("Phase 2/2: Cross-referencing issue tracker").to_string(),
        );
        Self { pb }
    }

    pub fn finish(self) {
        self.pb
            .finish_with_message(bright_green("Phase 2/2: Cross-reference complete ✓").to_string());
        eprintln!("\n");
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
