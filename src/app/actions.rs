use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Commands available while no row is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    FocusSelected,
    NewTask,
    StartQuery,
    ToggleCompletion,
    Refresh,
}

impl Action {
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Action::Quit),
                KeyCode::Char('r') => Some(Action::Refresh),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Enter | KeyCode::Char('e') => Some(Action::FocusSelected),
            KeyCode::Char('n') => Some(Action::NewTask),
            KeyCode::Char('/') => Some(Action::StartQuery),
            KeyCode::Char('x') | KeyCode::Char(' ') => Some(Action::ToggleCompletion),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_actions() {
        let plain = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(Action::from_key(plain(KeyCode::Char('j'))), Some(Action::SelectNext));
        assert_eq!(Action::from_key(plain(KeyCode::Up)), Some(Action::SelectPrevious));
        assert_eq!(Action::from_key(plain(KeyCode::Enter)), Some(Action::FocusSelected));
        assert_eq!(Action::from_key(plain(KeyCode::Char('z'))), None);
        assert_eq!(
            Action::from_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
    }
}
