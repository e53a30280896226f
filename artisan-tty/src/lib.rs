use std::io::Write;

use anyhow::Result;
use artisan_core::Command;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    Reload,
    Export,
    Quit,
    None,
}

/// Maps key presses to workbench commands. Digits typed before a motion key
/// act as a count, vi style.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event
        else {
            return UiEvent::None;
        };
        if kind == KeyEventKind::Release {
            return UiEvent::None;
        }

        match (code, modifiers) {
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Char('l'), KeyModifiers::NONE)
            | (KeyCode::Down, _)
            | (KeyCode::Right, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Char('h'), KeyModifiers::NONE)
            | (KeyCode::Up, _)
            | (KeyCode::Left, _) => {
                let count = self.take_count();
                UiEvent::Command(Command::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoDefault)
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                let index = match self.pending_count.take() {
                    Some(count) if count > 0 => count - 1,
                    _ => usize::MAX,
                };
                self.pending_digits.clear();
                UiEvent::Command(Command::GotoPage { index })
            }
            (KeyCode::Char('d'), _) => {
                self.reset_count();
                UiEvent::Command(Command::CycleDevice)
            }
            (KeyCode::Char('r'), _) => {
                self.reset_count();
                UiEvent::Reload
            }
            (KeyCode::Char('e'), _) => {
                self.reset_count();
                UiEvent::Export
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }
}

pub const KEY_HELP: &str = "j/k page  g home  G last  d device  r reload  e export  q quit";

/// Redraws the console: a title row, the page list with the active page
/// highlighted, then the key help on the last row.
pub fn draw_console<W: Write>(
    writer: &mut W,
    pages: &[String],
    active: usize,
    status: &str,
) -> Result<()> {
    crossterm::queue!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    crossterm::queue!(writer, Print(status))?;
    for (row, name) in pages.iter().enumerate() {
        let y = u16::try_from(row + 2).unwrap_or(u16::MAX);
        crossterm::queue!(writer, cursor::MoveTo(2, y))?;
        if row == active {
            crossterm::queue!(
                writer,
                SetAttribute(Attribute::Reverse),
                Print(format!("> {name}")),
                SetAttribute(Attribute::Reset)
            )?;
        } else {
            crossterm::queue!(writer, Print(format!("  {name}")))?;
        }
    }
    let help_row = u16::try_from(pages.len() + 3).unwrap_or(u16::MAX);
    crossterm::queue!(writer, cursor::MoveTo(0, help_row), Print(KEY_HELP))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_next_page() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('1'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 12),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_resets_prefix_after_use() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));

        match mapper.map_event(key_event(KeyCode::Char('k'))) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 3),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Up)) {
            UiEvent::Command(Command::PrevPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('d'))),
            UiEvent::Command(Command::CycleDevice)
        ));

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::NextPage { count }) => assert_eq!(count, 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_counted_capital_g_jumps_to_page() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('2')));
        match mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('G'),
            KeyModifiers::SHIFT,
        )) {
            UiEvent::Command(Command::GotoPage { index }) => assert_eq!(index, 1),
            other => panic!("unexpected event: {:?}", other),
        }

        match mapper.map_event(key_event(KeyCode::End)) {
            UiEvent::Command(Command::GotoPage { index }) => assert_eq!(index, usize::MAX),
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::Command(Command::GotoDefault)
        ));
    }

    #[test]
    fn event_mapper_maps_app_actions() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::Reload
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('e'))),
            UiEvent::Export
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::Quit
        ));
        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('c'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Quit
        ));
    }

    #[test]
    fn event_mapper_ignores_key_releases() {
        let mut mapper = EventMapper::new();
        let release = Event::Key(KeyEvent {
            code: KeyCode::Char('j'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        assert!(matches!(mapper.map_event(release), UiEvent::None));
    }

    #[test]
    fn console_marks_active_page() {
        let mut out = Vec::new();
        let pages = vec!["index.html".to_owned(), "about.html".to_owned()];
        draw_console(&mut out, &pages, 1, "index.html [desktop]").unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("> about.html"));
        assert!(text.contains("  index.html"));
        assert!(text.contains(KEY_HELP));
    }
}
