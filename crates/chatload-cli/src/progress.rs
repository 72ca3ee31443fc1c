//! Console progress rendering.

use std::io::{self, Write};

use chatload_core::{SessionState, SessionUpdate};
use chatload_session::SessionHandle;
use crossterm::style::Stylize;
use futures::StreamExt;
use tokio::task::JoinHandle;

/// Longest content shown per line.
const PREVIEW_CHARS: usize = 96;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
        format!("{cut}…")
    }
}

/// Render one update, or `None` for updates that are not shown.
pub fn render(update: &SessionUpdate, max_messages: u32) -> Option<String> {
    let line = match update {
        SessionUpdate::PromptSent { event, stats } => format!(
            "{} {} {}",
            format!("[{}/{max_messages}]", stats.messages_sent).dim(),
            "→".cyan(),
            preview(&event.content)
        ),
        SessionUpdate::ResponseReceived { event, .. } => {
            format!("         {} {}", "←".green(), preview(&event.content))
        }
        SessionUpdate::Error { message, stats } => format!(
            "{} {} (errors: {})",
            "!".red().bold(),
            message.as_str().red(),
            stats.error_count
        ),
        SessionUpdate::StateChanged(SessionState::Reconnecting) => {
            format!("{} reconnecting…", "~".yellow())
        }
        SessionUpdate::StateChanged(SessionState::Stopping) => {
            format!("{} stopping, saving log…", "■".yellow())
        }
        SessionUpdate::PauseChanged(true) => {
            format!("{} paused (press p to resume)", "‖".yellow())
        }
        SessionUpdate::PauseChanged(false) => format!("{} resumed", "▶".green()),
        SessionUpdate::StateChanged(_) => return None,
    };
    Some(line)
}

/// Print updates until the session stops.
///
/// Replays what already happened before following live updates, so the
/// printer may be spawned after the session started. `raw` terminals need
/// explicit carriage returns.
pub fn spawn(handle: &SessionHandle, max_messages: u32, raw: bool) -> JoinHandle<()> {
    let mut updates = handle.recorder().updates();
    let eol = if raw { "\r\n" } else { "\n" };

    tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            if let Some(line) = render(&update, max_messages) {
                let mut out = io::stdout().lock();
                let _ = write!(out, "{line}{eol}");
                let _ = out.flush();
            }
            if update == SessionUpdate::StateChanged(SessionState::Stopped) {
                break;
            }
        }
    })
}
