//! Local display.
//!
//! The scheduler drives a `DisplayPresenter` once per cycle with the freshly
//! published snapshot. `ConsoleDisplay` renders to the terminal: an
//! `indicatif` spinner line on a TTY in pretty mode, plain log lines otherwise.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::state::Snapshot;

/// Local display contract.
pub trait DisplayPresenter: Send {
    /// Bring the display up. Failure here is fatal for the daemon.
    fn init(&mut self) -> Result<()>;

    /// Render the latest snapshot.
    fn present(&mut self, snapshot: &Snapshot) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    Auto,
    Plain,
    Pretty,
}

impl DisplayMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => DisplayMode::Plain,
            Some("pretty") => DisplayMode::Pretty,
            _ => DisplayMode::Auto,
        }
    }
}

/// Text lines for a small display: status, label + confidence, box.
pub fn render_lines(snapshot: &Snapshot) -> Vec<String> {
    let mut lines = vec![snapshot.status.to_string()];
    let r = &snapshot.result;
    if r.valid {
        lines.push(format!("{} {:.0}%", r.label, r.confidence * 100.0));
        if r.bbox.width > 0 && r.bbox.height > 0 {
            lines.push(format!(
                "box {},{} {}x{}",
                r.bbox.x, r.bbox.y, r.bbox.width, r.bbox.height
            ));
        }
    }
    lines
}

pub struct ConsoleDisplay {
    mode: DisplayMode,
    is_tty: bool,
    spinner: Option<ProgressBar>,
    last_text: Option<String>,
}

impl ConsoleDisplay {
    pub fn new(mode: DisplayMode, is_tty: bool) -> Self {
        Self {
            mode,
            is_tty,
            spinner: None,
            last_text: None,
        }
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                DisplayMode::Pretty | DisplayMode::Auto => true,
                DisplayMode::Plain => false,
            }
    }
}

impl DisplayPresenter for ConsoleDisplay {
    fn init(&mut self) -> Result<()> {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message("Initializing");
            self.spinner = Some(spinner);
        }
        Ok(())
    }

    fn present(&mut self, snapshot: &Snapshot) -> Result<()> {
        let text = render_lines(snapshot).join(" | ");
        if self.last_text.as_deref() == Some(text.as_str()) {
            return Ok(());
        }
        match &self.spinner {
            Some(spinner) => spinner.set_message(text.clone()),
            None => log::info!("display: {}", text),
        }
        self.last_text = Some(text);
        Ok(())
    }
}

impl Drop for ConsoleDisplay {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectionResult};
    use crate::status::SystemStatus;

    #[test]
    fn renders_detection_with_box() {
        let snapshot = Snapshot {
            result: DetectionResult::detected(
                "plug",
                0.914,
                BoundingBox {
                    x: 8,
                    y: 16,
                    width: 24,
                    height: 32,
                },
                0,
            ),
            status: SystemStatus::Detection("plug".into()),
            ..Snapshot::default()
        };
        assert_eq!(
            render_lines(&snapshot),
            vec!["Detection: plug", "plug 91%", "box 8,16 24x32"]
        );
    }

    #[test]
    fn renders_status_only_when_invalid() {
        let snapshot = Snapshot {
            status: SystemStatus::Scanning,
            ..Snapshot::default()
        };
        assert_eq!(render_lines(&snapshot), vec!["Scanning..."]);
    }

    #[test]
    fn plain_mode_never_spins() -> Result<()> {
        let mut display = ConsoleDisplay::new(DisplayMode::Plain, true);
        display.init()?;
        assert!(display.spinner.is_none());
        display.present(&Snapshot::default())?;
        assert_eq!(display.last_text.as_deref(), Some("Initializing"));
        Ok(())
    }
}
