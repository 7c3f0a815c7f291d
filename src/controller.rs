use std::time::{Duration, Instant};
use tracing::trace;

use crate::domain::{DashConfig, DashError, Message};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

/// Interval of the `Tick` message that drives loading and session checks.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

pub struct Controller {
    event_poll_time: u64,
    last_tick: Instant,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
            last_tick: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, model: &Model) -> Result<Option<Message>, DashError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        if self.last_tick.elapsed() >= TICK_INTERVAL {
            self.last_tick = Instant::now();
            return Ok(Some(Message::Tick));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Up | KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down | KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left | KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right | KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Home, _) => Some(Message::MoveBeginning),
            (KeyCode::End, _) => Some(Message::MoveEnd),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('f'), _) => Some(Message::Filter),
            (KeyCode::Char('m'), _) => Some(Message::CycleMatchMode),
            (KeyCode::Char('d'), _) => Some(Message::DateRange),
            (KeyCode::Char('s'), _) => Some(Message::SortAscending),
            (KeyCode::Char('S'), _) => Some(Message::SortDescending),
            (KeyCode::Char('u'), _) => Some(Message::ClearSort),
            (KeyCode::Char('c'), _) => Some(Message::ClearFilters),
            (KeyCode::Char(' '), _) => Some(Message::ToggleSelect),
            (KeyCode::Char('a'), _) => Some(Message::ToggleSelectAll),
            (KeyCode::Char('e'), _) => Some(Message::EditCell),
            (KeyCode::Char('A'), _) => Some(Message::Approve),
            (KeyCode::Char('X'), _) => Some(Message::Reject),
            (KeyCode::Char('n'), _) => Some(Message::PageSize),
            (KeyCode::Char('v'), _) => Some(Message::ToggleColumn),
            (KeyCode::Char('V'), _) => Some(Message::ShowAllColumns),
            (KeyCode::Char('r'), _) => Some(Message::Retry),
            (KeyCode::Char('R'), _) => Some(Message::Refetch),
            (KeyCode::Char('g'), _) => Some(Message::Pages),
            (KeyCode::Char('L'), _) => Some(Message::Logout),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode, modifiers: KeyModifiers) -> Option<Message> {
        Controller::new(&DashConfig::default()).handle_key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn keys_map_to_messages() {
        assert_eq!(map(KeyCode::Char('q'), KeyModifiers::NONE), Some(Message::Quit));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(Message::Quit));
        assert_eq!(map(KeyCode::Char('c'), KeyModifiers::NONE), Some(Message::ClearFilters));
        assert_eq!(map(KeyCode::Char('A'), KeyModifiers::SHIFT), Some(Message::Approve));
        assert_eq!(map(KeyCode::Char('X'), KeyModifiers::SHIFT), Some(Message::Reject));
        assert_eq!(map(KeyCode::Char('j'), KeyModifiers::NONE), Some(Message::MoveDown));
        assert_eq!(map(KeyCode::Esc, KeyModifiers::NONE), Some(Message::Exit));
        assert_eq!(map(KeyCode::Char('z'), KeyModifiers::NONE), None);
    }
}
