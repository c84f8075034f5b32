pub type FocusCallback = Box<dyn FnMut(bool) + Send>;

/// Owns the single "has focus" flag of a task item.
///
/// The flag is the only input deciding action-bar visibility. The parent is
/// told about every transition through the optional callback; repeated calls
/// with the current value are silent.
pub struct FocusController {
    has_focus: bool,
    on_change: Option<FocusCallback>,
}

impl FocusController {
    pub fn new(initial: bool) -> Self {
        Self {
            has_focus: initial,
            on_change: None,
        }
    }

    pub fn with_callback(mut self, callback: FocusCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    /// Returns `true` when the flag actually changed.
    pub fn set_focus(&mut self, focus: bool) -> bool {
        if self.has_focus == focus {
            return false;
        }
        self.has_focus = focus;
        tracing::debug!(focus, "task item focus changed");
        if let Some(callback) = self.on_change.as_mut() {
            callback(focus);
        }
        true
    }

    /// Text widget focus report. Only a gain while unfocused counts; losing
    /// editor focus is left to outside-interaction handling.
    pub fn on_editor_focus_change(&mut self, focused: bool) -> bool {
        if focused && !self.has_focus {
            return self.set_focus(true);
        }
        false
    }
}

impl std::fmt::Debug for FocusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusController")
            .field("has_focus", &self.has_focus)
            .field("has_callback", &self.on_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (FocusCallback, Arc<Mutex<Vec<bool>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: FocusCallback = Box::new(move |focus| sink.lock().unwrap().push(focus));
        (callback, seen)
    }

    #[test]
    fn last_call_wins() {
        let sequences: [&[bool]; 4] = [
            &[true],
            &[true, false, true],
            &[false, false, true, true, false],
            &[true, true, true],
        ];
        for calls in sequences {
            for initial in [false, true] {
                let mut focus = FocusController::new(initial);
                for value in calls {
                    focus.set_focus(*value);
                }
                assert_eq!(focus.has_focus(), *calls.last().unwrap());
            }
        }
    }

    #[test]
    fn callback_fires_only_on_transitions() {
        let (callback, seen) = recorder();
        let mut focus = FocusController::new(false).with_callback(callback);
        assert!(!focus.set_focus(false));
        assert!(focus.set_focus(true));
        assert!(!focus.set_focus(true));
        assert!(focus.set_focus(false));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn editor_focus_gain_is_ignored_when_already_focused() {
        let (callback, seen) = recorder();
        let mut focus = FocusController::new(true).with_callback(callback);
        assert!(!focus.on_editor_focus_change(true));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn editor_focus_loss_does_not_collapse() {
        let mut focus = FocusController::new(true);
        assert!(!focus.on_editor_focus_change(false));
        assert!(focus.has_focus());

        let mut focus = FocusController::new(false);
        assert!(focus.on_editor_focus_change(true));
        assert!(focus.has_focus());
    }
}
