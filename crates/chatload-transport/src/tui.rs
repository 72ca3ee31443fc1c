//! Terminal key controls for a running session.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;

/// How often the key thread checks for shutdown.
const KEY_POLL: Duration = Duration::from_millis(200);

/// Operator command from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Flip the pause flag.
    TogglePause,
    /// Request a graceful stop.
    Stop,
}

/// Map a key press to a control command.
#[must_use]
pub fn key_to_command(key: &KeyEvent) -> Option<ControlCommand> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ControlCommand::Stop)
        }
        KeyCode::Char('p' | 'P' | ' ') => Some(ControlCommand::TogglePause),
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => Some(ControlCommand::Stop),
        _ => None,
    }
}

/// Raw mode for the lifetime of the guard.
///
/// In raw mode `Ctrl+C` arrives as a key, not a signal.
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Enable raw mode.
    ///
    /// # Errors
    /// Returns error if the terminal refuses raw mode.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::warn!("Failed to restore terminal mode: {e}");
        }
    }
}

/// Background keyboard reader forwarding control commands.
pub struct KeyListener {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl KeyListener {
    /// Start reading keys on a dedicated thread.
    ///
    /// Returns the listener and the command receiver.
    #[must_use]
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<ControlCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                match event::poll(KEY_POLL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!("Key polling failed: {e}");
                        break;
                    }
                }
                let Ok(Event::Key(key)) = event::read() else {
                    continue;
                };
                if let Some(command) = key_to_command(&key) {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
            }
        });

        (
            Self {
                stop,
                thread: Some(thread),
            },
            rx,
        )
    }

    /// Stop the reader thread and wait for it.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_pause_keys() {
        for code in [KeyCode::Char('p'), KeyCode::Char('P'), KeyCode::Char(' ')] {
            assert_eq!(
                key_to_command(&key(code, KeyModifiers::NONE)),
                Some(ControlCommand::TogglePause)
            );
        }
    }

    #[test]
    fn test_stop_keys() {
        assert_eq!(
            key_to_command(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ControlCommand::Stop)
        );
        assert_eq!(
            key_to_command(&key(KeyCode::Esc, KeyModifiers::NONE)),
            Some(ControlCommand::Stop)
        );
        assert_eq!(
            key_to_command(&key(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(ControlCommand::Stop)
        );
    }

    #[test]
    fn test_plain_c_and_releases_ignored() {
        assert_eq!(key_to_command(&key(KeyCode::Char('c'), KeyModifiers::NONE)), None);

        let mut release = key(KeyCode::Char('p'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(key_to_command(&release), None);
    }
}
