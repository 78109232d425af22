//! UI utilities for RelayDrop CLI.

use std::io::{self, Write};

use relaydrop_core::session::{SessionPhase, SessionSnapshot};
use tokio::sync::watch;

const BOX_WIDTH: usize = 33;
const BAR_WIDTH: usize = 24;

/// A formatted box for displaying room codes.
pub struct CodeBox<'a> {
    code: &'a str,
    link: Option<&'a str>,
}

impl<'a> CodeBox<'a> {
    /// Create a new code box.
    #[must_use]
    pub const fn new(code: &'a str) -> Self {
        Self { code, link: None }
    }

    /// Show the share link under the box.
    #[must_use]
    pub const fn with_link(mut self, link: &'a str) -> Self {
        self.link = Some(link);
        self
    }

    /// Display the code box to stdout.
    pub fn display(&self) {
        let spaced_code = format_code_spaced(self.code);
        let code_line = format!("Code:  {}", spaced_code);

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));

        if let Some(link) = self.link {
            println!();
            println!("  {}", link);
        }
    }
}

fn format_code_spaced(code: &str) -> String {
    code.chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Render a progress fraction as `[#####-----]  42.0%`.
pub fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>5.1}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        fraction * 100.0
    )
}

/// Follow a session and redraw its progress line on stderr.
///
/// Runs until the session ends or the sender of the channel goes away.
pub async fn display_progress(mut rx: watch::Receiver<SessionSnapshot>, verb: &'static str) {
    let mut last_phase = rx.borrow().phase;

    loop {
        if rx.changed().await.is_err() {
            break;
        }

        let snapshot = rx.borrow().clone();

        if snapshot.phase != last_phase {
            last_phase = snapshot.phase;
            if snapshot.phase.is_terminal() {
                break;
            }
            if snapshot.phase == SessionPhase::Transferring {
                eprintln!(
                    "  {} {}...",
                    verb,
                    snapshot.payload_name.as_deref().unwrap_or("payload")
                );
            }
        }

        if snapshot.phase == SessionPhase::Transferring {
            eprint!("\r  {}    ", progress_bar(snapshot.progress));
            let _ = io::stderr().flush();
        }
    }

    eprintln!();
}
