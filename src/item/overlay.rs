use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::dispatch::{EditDispatcher, EditIntent};
use crate::model::{DateField, TaskId};

/// Whether opening one date overlay closes the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPolicy {
    /// Slots are independent; several overlays may be open at once.
    Independent,
    /// Opening a slot closes every other open slot first.
    Exclusive,
}

impl Default for OverlayPolicy {
    fn default() -> Self {
        OverlayPolicy::Independent
    }
}

/// Coarse visibility command for an overlay widget. The widget keeps its own
/// animation and internal state; it only obeys these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayCommand {
    Open,
    Close,
}

/// Receiving end handed to an overlay widget instance.
#[derive(Debug)]
pub struct OverlayPort {
    field: DateField,
    commands: Receiver<OverlayCommand>,
}

impl OverlayPort {
    pub fn field(&self) -> DateField {
        self.field
    }

    /// Latest pending command, collapsing any backlog.
    pub fn take_command(&self) -> Option<OverlayCommand> {
        self.commands.try_iter().last()
    }
}

#[derive(Debug, Default)]
struct OverlaySlot {
    open: bool,
    port: Option<Sender<OverlayCommand>>,
}

impl OverlaySlot {
    fn send(&mut self, command: OverlayCommand) {
        let detached = match &self.port {
            Some(port) => port.send(command).is_err(),
            None => false,
        };
        if detached {
            self.port = None;
        }
    }
}

#[derive(Debug, Default)]
pub struct OverlayCoordinator {
    policy: OverlayPolicy,
    slots: [OverlaySlot; 3],
}

impl OverlayCoordinator {
    pub fn new(policy: OverlayPolicy) -> Self {
        Self {
            policy,
            slots: Default::default(),
        }
    }

    /// Connects an overlay widget to `field`, replacing any earlier widget.
    pub fn attach(&mut self, field: DateField) -> OverlayPort {
        let (tx, rx) = unbounded();
        let slot = self.slot_mut(field);
        slot.port = Some(tx);
        if slot.open {
            slot.send(OverlayCommand::Open);
        }
        OverlayPort {
            field,
            commands: rx,
        }
    }

    pub fn is_open(&self, field: DateField) -> bool {
        self.slots[field.index()].open
    }

    pub fn open_fields(&self) -> Vec<DateField> {
        DateField::ALL
            .into_iter()
            .filter(|field| self.is_open(*field))
            .collect()
    }

    pub fn open(&mut self, field: DateField) {
        if self.policy == OverlayPolicy::Exclusive {
            for other in DateField::ALL {
                if other != field && self.is_open(other) {
                    self.close(other);
                }
            }
        }
        let slot = self.slot_mut(field);
        slot.open = true;
        slot.send(OverlayCommand::Open);
        tracing::debug!(%field, "overlay opened");
    }

    pub fn close(&mut self, field: DateField) {
        let slot = self.slot_mut(field);
        slot.open = false;
        slot.send(OverlayCommand::Close);
        tracing::debug!(%field, "overlay closed");
    }

    /// The overlay closed itself; record it without echoing a command back.
    pub fn on_closed(&mut self, field: DateField) {
        self.slot_mut(field).open = false;
    }

    /// Forwards the overlay's value verbatim to the dispatcher, then closes it.
    pub fn commit(
        &mut self,
        field: DateField,
        value: Option<OffsetDateTime>,
        dispatcher: &EditDispatcher,
        id: &TaskId,
    ) {
        dispatcher.dispatch(id, EditIntent::Date(field, value));
        self.close(field);
    }

    fn slot_mut(&mut self, field: DateField) -> &mut OverlaySlot {
        &mut self.slots[field.index()]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use time::macros::datetime;

    use super::*;
    use crate::item::dispatch::recording::RecordingClient;
    use crate::model::TaskPatch;

    #[test]
    fn independent_slots_can_be_open_together() {
        let mut overlays = OverlayCoordinator::new(OverlayPolicy::Independent);
        overlays.open(DateField::Start);
        overlays.open(DateField::Due);
        assert_eq!(overlays.open_fields(), vec![DateField::Start, DateField::Due]);
        overlays.close(DateField::Start);
        assert_eq!(overlays.open_fields(), vec![DateField::Due]);
    }

    #[test]
    fn exclusive_policy_closes_other_slots() {
        let mut overlays = OverlayCoordinator::new(OverlayPolicy::Exclusive);
        let start = overlays.attach(DateField::Start);
        overlays.open(DateField::Start);
        overlays.open(DateField::Schedule);
        assert_eq!(overlays.open_fields(), vec![DateField::Schedule]);
        assert_matches!(start.take_command(), Some(OverlayCommand::Close));
    }

    #[test]
    fn attached_port_receives_forced_visibility() {
        let mut overlays = OverlayCoordinator::default();
        let port = overlays.attach(DateField::Due);
        assert_eq!(port.field(), DateField::Due);
        assert_eq!(port.take_command(), None);
        overlays.open(DateField::Due);
        assert_eq!(port.take_command(), Some(OverlayCommand::Open));
        overlays.close(DateField::Due);
        overlays.open(DateField::Due);
        assert_eq!(port.take_command(), Some(OverlayCommand::Open));
    }

    #[test]
    fn overlay_originated_close_is_not_echoed() {
        let mut overlays = OverlayCoordinator::default();
        let port = overlays.attach(DateField::Schedule);
        overlays.open(DateField::Schedule);
        port.take_command();
        overlays.on_closed(DateField::Schedule);
        assert!(!overlays.is_open(DateField::Schedule));
        assert_eq!(port.take_command(), None);
    }

    #[test]
    fn late_attach_syncs_with_open_slot() {
        let mut overlays = OverlayCoordinator::default();
        overlays.open(DateField::Start);
        let port = overlays.attach(DateField::Start);
        assert_eq!(port.take_command(), Some(OverlayCommand::Open));
    }

    #[test]
    fn dropped_port_is_detached_quietly() {
        let mut overlays = OverlayCoordinator::default();
        drop(overlays.attach(DateField::Due));
        overlays.open(DateField::Due);
        assert!(overlays.is_open(DateField::Due));
    }

    #[test]
    fn commit_dispatches_then_closes() {
        let client = Arc::new(RecordingClient::default());
        let dispatcher = EditDispatcher::new(client.clone());
        let mut overlays = OverlayCoordinator::default();
        let port = overlays.attach(DateField::Due);
        overlays.open(DateField::Due);

        let at = datetime!(2024-01-01 00:00 UTC);
        overlays.commit(DateField::Due, Some(at), &dispatcher, &"t1".into());

        assert!(!overlays.is_open(DateField::Due));
        assert_eq!(port.take_command(), Some(OverlayCommand::Close));
        assert_eq!(
            client.edits(),
            vec![TaskPatch {
                due: Some(Some(at)),
                ..TaskPatch::default()
            }]
        );
    }
}
