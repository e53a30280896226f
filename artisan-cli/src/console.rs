use std::fs;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artisan_render::{export_zip_bytes, DEFAULT_ARCHIVE_NAME};
use artisan_tty::{draw_console, EventMapper, UiEvent};
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::server::AppState;

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

/// Keyboard front end for a running server. Blocks until the user quits, then
/// asks the server to shut down.
pub fn run_console(state: Arc<AppState>, shutdown: Arc<Notify>) -> Result<()> {
    let result = console_loop(&state);
    shutdown.notify_one();
    result
}

fn console_loop(state: &AppState) -> Result<()> {
    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let mut mapper = EventMapper::new();
    let mut message = String::new();
    let mut drawn: Option<u64> = None;

    loop {
        let version = state.version();
        if drawn != Some(version) {
            redraw(&mut stdout, state, mapper.pending_input().as_deref(), &message)?;
            drawn = Some(version);
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match mapper.map_event(event::read()?) {
            UiEvent::Command(command) => {
                message = match state.apply(command) {
                    Ok(()) => String::new(),
                    Err(err) => format!("{err:#}"),
                };
            }
            UiEvent::Reload => {
                message = match state.reload_project() {
                    Ok(true) => "project reloaded".to_owned(),
                    Ok(false) => "project unchanged".to_owned(),
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "reload from console failed");
                        format!("reload failed: {err:#}")
                    }
                };
            }
            UiEvent::Export => {
                message = match export_archive(state) {
                    Ok(path) => format!("exported {}", path.display()),
                    Err(err) => format!("export failed: {err:#}"),
                };
            }
            UiEvent::Quit => break,
            UiEvent::None => {}
        }
        drawn = None;
    }

    crossterm::execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    Ok(())
}

fn redraw(
    stdout: &mut Stdout,
    state: &AppState,
    pending: Option<&str>,
    message: &str,
) -> Result<()> {
    let view = state.state_view();
    let mut status = format!(
        "{} ({}/{})  [{}, {}]  {}",
        view.active,
        view.active_index + 1,
        view.pages.len(),
        view.device,
        view.theme,
        state.origin(),
    );
    if let Some(digits) = pending {
        status.push_str(&format!("  :{digits}"));
    }
    if !message.is_empty() {
        status.push_str("  ");
        status.push_str(message);
    }
    draw_console(stdout, &view.pages, view.active_index, &status)
}

fn export_archive(state: &AppState) -> Result<PathBuf> {
    let path = PathBuf::from(DEFAULT_ARCHIVE_NAME);
    let bytes = export_zip_bytes(&state.document())?;
    fs::write(&path, bytes).with_context(|| format!("failed to write {:?}", path))?;
    info!(path = %path.display(), "archive exported from console");
    Ok(path)
}
