//! The client's mirror of the session.
//!
//! One emulator per pane id the daemon has announced, the locally tracked
//! active pane, and the last status text. Every client applies the same
//! broadcast sequence, so they all converge on the same view.
//!
//! The protocol never announces a removal, so a killed pane's grid stays
//! until the client disconnects. It is never active again: ids are not
//! reused and the daemon only switches to live panes.

use std::collections::HashMap;

use loom_proto::{parse_pane_id, split_pane_output, DecodeError, Message, MessageKind, PaneId};
use loom_vt::Emulator;

use crate::config::EmulatorBackend;

/// Whether a message changed what is on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repaint {
    Skip,
    Screen,
}

pub struct ClientState {
    grids: HashMap<PaneId, Box<dyn Emulator>>,
    active: Option<PaneId>,
    status: String,
    cols: u16,
    rows: u16,
    backend: EmulatorBackend,
}

impl ClientState {
    /// `rows` is the pane area, i.e. the terminal height minus the status row.
    pub fn new(backend: EmulatorBackend, cols: u16, rows: u16) -> Self {
        Self {
            grids: HashMap::new(),
            active: None,
            status: String::new(),
            cols,
            rows,
            backend,
        }
    }

    pub fn handle(&mut self, message: &Message) -> Result<Repaint, DecodeError> {
        match message.kind {
            MessageKind::NewPaneNotify => {
                let id = parse_pane_id(&message.payload)?;
                let (backend, cols, rows) = (self.backend, self.cols, self.rows);
                self.grids
                    .entry(id)
                    .or_insert_with(|| backend.build(cols, rows));
                self.active = Some(id);
                Ok(Repaint::Screen)
            }
            MessageKind::SwitchPaneNotify => {
                self.active = Some(parse_pane_id(&message.payload)?);
                Ok(Repaint::Screen)
            }
            MessageKind::Data => {
                let (id, data) = split_pane_output(&message.payload)?;
                match self.grids.get_mut(&id) {
                    Some(grid) => {
                        grid.write(data);
                        if self.active == Some(id) {
                            Ok(Repaint::Screen)
                        } else {
                            Ok(Repaint::Skip)
                        }
                    }
                    None => {
                        log::trace!("output for unknown pane {id} dropped");
                        Ok(Repaint::Skip)
                    }
                }
            }
            MessageKind::Redraw => {
                self.status = String::from_utf8_lossy(&message.payload).into_owned();
                Ok(Repaint::Screen)
            }
            _ => Ok(Repaint::Skip),
        }
    }

    /// Resize every grid to a new pane area. Grids come back blank.
    pub fn set_viewport(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        for grid in self.grids.values_mut() {
            grid.resize(cols, rows);
        }
    }

    pub fn viewport(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn active(&self) -> Option<PaneId> {
        self.active
    }

    pub fn active_grid(&self) -> Option<&dyn Emulator> {
        self.active.and_then(|id| self.grid(id))
    }

    pub fn grid(&self, id: PaneId) -> Option<&dyn Emulator> {
        self.grids.get(&id).map(|grid| grid.as_ref())
    }

    pub fn pane_count(&self) -> usize {
        self.grids.len()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Multi-line status text is shown as an overlay instead of a status bar.
    pub fn is_overlay(&self) -> bool {
        self.status.contains('\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn state() -> ClientState {
        ClientState::new(EmulatorBackend::Grid, 20, 4)
    }

    #[test]
    fn test_grids_created_only_on_notify() {
        let mut state = state();
        assert_eq!(
            state.handle(&Message::pane_output(0, b"early")).unwrap(),
            Repaint::Skip
        );
        assert_eq!(state.pane_count(), 0);

        state.handle(&Message::new_pane_notify(0)).unwrap();
        assert_eq!(state.pane_count(), 1);
        assert_eq!(state.active(), Some(0));
        assert_eq!(state.grid(0).unwrap().row_text(0).trim_end(), "");
    }

    #[test]
    fn test_switch_does_not_create_grid() {
        let mut state = state();
        state.handle(&Message::switch_pane_notify(3)).unwrap();
        assert_eq!(state.active(), Some(3));
        assert_eq!(state.pane_count(), 0);
        assert!(state.active_grid().is_none());
    }

    #[test]
    fn test_data_repaints_only_active_pane() {
        let mut state = state();
        state.handle(&Message::new_pane_notify(0)).unwrap();
        state.handle(&Message::new_pane_notify(1)).unwrap();

        assert_eq!(
            state.handle(&Message::pane_output(0, b"zero")).unwrap(),
            Repaint::Skip
        );
        assert_eq!(
            state.handle(&Message::pane_output(1, b"one")).unwrap(),
            Repaint::Screen
        );
        assert_eq!(state.grid(0).unwrap().row_text(0).trim_end(), "zero");
        assert_eq!(state.active_grid().unwrap().row_text(0).trim_end(), "one");

        state.handle(&Message::switch_pane_notify(0)).unwrap();
        assert_eq!(state.active_grid().unwrap().row_text(0).trim_end(), "zero");
    }

    #[test]
    fn test_redraw_replaces_status_verbatim() {
        let mut state = state();
        state.handle(&Message::redraw("[main] pane 0 (1/1)")).unwrap();
        assert_eq!(state.status(), "[main] pane 0 (1/1)");
        assert!(!state.is_overlay());

        state.handle(&Message::redraw("Commands:\n  Ctrl+a d: Detach")).unwrap();
        assert!(state.is_overlay());

        state.handle(&Message::new_pane_notify(1)).unwrap();
        assert_eq!(state.status(), "Commands:\n  Ctrl+a d: Detach");
    }

    #[test]
    fn test_malformed_payloads_are_errors() {
        let mut state = state();
        let bad_notify = Message::new(MessageKind::NewPaneNotify, Bytes::from_static(b"x"));
        assert!(state.handle(&bad_notify).is_err());
        let short_data = Message::new(MessageKind::Data, Bytes::from_static(b"\x00"));
        assert!(state.handle(&short_data).is_err());
        assert_eq!(state.pane_count(), 0);
    }

    #[test]
    fn test_two_clients_converge() {
        let script = vec![
            Message::redraw("[main] pane 1 (2/2)"),
            Message::new_pane_notify(0),
            Message::new_pane_notify(1),
            Message::switch_pane_notify(1),
            Message::pane_output(1, b"$ ls\r\n"),
            Message::pane_output(0, b"hidden"),
            Message::redraw("[main] pane 1 (2/2)"),
        ];
        let mut a = state();
        let mut b = ClientState::new(EmulatorBackend::Alacritty, 20, 4);
        for message in &script {
            a.handle(message).unwrap();
            b.handle(message).unwrap();
        }
        assert_eq!(a.active(), b.active());
        assert_eq!(a.status(), b.status());
        for row in 0..4 {
            assert_eq!(
                a.active_grid().unwrap().row_text(row),
                b.active_grid().unwrap().row_text(row)
            );
        }
    }

    #[test]
    fn test_removed_pane_grid_stays_inactive() {
        let mut state = state();
        state.handle(&Message::new_pane_notify(0)).unwrap();
        state.handle(&Message::new_pane_notify(1)).unwrap();
        state.handle(&Message::pane_output(1, b"doomed")).unwrap();

        // Daemon side: pane 1 is killed and pane 0 becomes active.
        state.handle(&Message::switch_pane_notify(0)).unwrap();
        state.handle(&Message::redraw("[main] pane 0 (1/1)")).unwrap();
        state.handle(&Message::pane_output(0, b"alive")).unwrap();

        assert_eq!(state.pane_count(), 2);
        assert_eq!(state.active(), Some(0));
        assert_eq!(state.active_grid().unwrap().row_text(0).trim_end(), "alive");

        // The next pane gets a fresh id and a fresh grid.
        state.handle(&Message::new_pane_notify(2)).unwrap();
        assert_eq!(state.active_grid().unwrap().row_text(0).trim_end(), "");
        assert_eq!(state.pane_count(), 3);
    }

    #[test]
    fn test_set_viewport_resizes_grids() {
        let mut state = state();
        state.handle(&Message::new_pane_notify(0)).unwrap();
        state.handle(&Message::pane_output(0, b"text")).unwrap();
        state.set_viewport(30, 10);
        let grid = state.active_grid().unwrap();
        assert_eq!((grid.cols(), grid.rows()), (30, 10));
        assert_eq!(grid.row_text(0).trim_end(), "");
        assert_eq!(state.viewport(), (30, 10));
    }
}
