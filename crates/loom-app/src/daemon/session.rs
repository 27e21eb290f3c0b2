//! The shared session: panes, active pane, and attached clients.
//!
//! All structural state lives behind one mutex. Every public operation takes
//! it exactly once and only calls the `*_locked` helpers below, which never
//! lock, so no operation can deadlock against itself. Structural broadcasts
//! are queued before the lock is released, which keeps every client's view
//! of pane ids and the active pane in the same order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use loom_proto::{Message, PaneId, PaneSize};
use loom_pty::{Pane, PaneCommand, PaneSet, PtyError};
use tokio::task::JoinHandle;

use super::clients::{Broadcaster, ClientId, FrameSender};
use super::events::{SessionEvent, SessionObserver};
use super::pump::start_output_pump;
use crate::config::Config;

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub name: String,
    pub command: PaneCommand,
    /// Size of panes created before any client reports its viewport.
    pub pane_size: PaneSize,
    pub pane_queue: usize,
    /// Chord letter listed in the help overlay.
    pub prefix: char,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.session.name.clone(),
            command: config.pane.command(),
            pane_size: config.session.pane_size(),
            pane_queue: config.session.pane_queue,
            prefix: config.client.prefix,
        }
    }
}

struct SessionState {
    panes: PaneSet,
    size: PaneSize,
    pumps: HashMap<PaneId, JoinHandle<()>>,
    closed: bool,
}

pub struct Session {
    settings: SessionSettings,
    broadcaster: Broadcaster,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an empty session. Must be called within a tokio runtime, since
    /// each pane gets an output pump task.
    pub fn new(settings: SessionSettings, observer: Arc<dyn SessionObserver>) -> Self {
        let size = settings.pane_size;
        Self {
            settings,
            broadcaster: Broadcaster::new(observer),
            state: Mutex::new(SessionState {
                panes: PaneSet::new(),
                size,
                pumps: HashMap::new(),
                closed: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Spawn a shell in a new pane and make it active.
    pub fn create_pane(&self) -> Result<PaneId, PtyError> {
        let mut state = self.lock();
        self.create_pane_locked(&mut state)
    }

    /// Move the active pane by `delta`, wrapping around.
    pub fn switch_active(&self, delta: isize) -> Option<PaneId> {
        let mut state = self.lock();
        let id = state.panes.switch(delta)?;
        self.broadcast(&Message::switch_pane_notify(id));
        self.broadcast_status(&state);
        self.broadcaster.emit(SessionEvent::ActiveChanged { id });
        Some(id)
    }

    /// Kill and remove a pane. Returns `Ok(false)` for an unknown id.
    ///
    /// The session is never left without panes: removing the last one spawns
    /// its replacement first, and a spawn failure leaves the old pane in place.
    pub fn remove_pane(&self, id: PaneId) -> Result<bool, PtyError> {
        let mut state = self.lock();
        self.remove_pane_locked(&mut state, id)
    }

    pub fn kill_active(&self) -> Result<bool, PtyError> {
        let mut state = self.lock();
        match state.panes.active_id() {
            Some(id) => self.remove_pane_locked(&mut state, id),
            None => Ok(false),
        }
    }

    /// Forward input to a pane. Input for an exited or unknown pane is
    /// dropped and `false` returned.
    pub fn write(&self, id: PaneId, data: &[u8]) -> bool {
        let mut state = self.lock();
        self.write_locked(&mut state, Some(id), data)
    }

    pub fn write_active(&self, data: &[u8]) -> bool {
        let mut state = self.lock();
        let id = state.panes.active_id();
        self.write_locked(&mut state, id, data)
    }

    /// Apply a new size to every pane and to panes created later.
    pub fn resize(&self, size: PaneSize) {
        let mut state = self.lock();
        state.size = size;
        for pane in state.panes.iter_mut() {
            if let Err(e) = pane.resize(size) {
                log::warn!("resize of pane {} failed: {e}", pane.id());
            }
        }
        self.broadcaster.emit(SessionEvent::Resized { size });
    }

    /// Register a client.
    ///
    /// Before the client joins the broadcast set it is sent the current
    /// status, a `NewPaneNotify` for every pane, the active pane and the
    /// status again, so it knows every pane id before any data frame.
    /// Returns `None` if the sync does not fit in the client's queue; the
    /// client is then never registered.
    pub fn attach(&self, sender: FrameSender) -> Option<ClientId> {
        let state = self.lock();
        let client = self.broadcaster.clients().allocate_id();

        let status = Message::redraw(&self.status_locked(&state)).to_frame();
        let mut sync = vec![status.clone()];
        sync.extend(
            state
                .panes
                .ids()
                .into_iter()
                .map(|id| Message::new_pane_notify(id).to_frame()),
        );
        if let Some(active) = state.panes.active_id() {
            sync.push(Message::switch_pane_notify(active).to_frame());
        }
        sync.push(status);

        if !sync.into_iter().all(|frame| sender.try_send(frame).is_ok()) {
            log::warn!("client {client} could not take the attach sync");
            self.broadcaster.emit(SessionEvent::ClientDropped { client });
            return None;
        }
        self.broadcaster.clients().insert(client, sender);
        self.broadcaster.emit(SessionEvent::ClientAttached { client });
        Some(client)
    }

    /// Unregister a client. Takes only the client-set lock, so it is safe
    /// while a broadcast to the same client is in flight.
    pub fn detach(&self, client: ClientId) {
        if self.broadcaster.clients().remove(client) {
            self.broadcaster.emit(SessionEvent::ClientDetached { client });
        }
    }

    /// Send the chord overlay to one client.
    pub fn send_help(&self, client: ClientId) -> bool {
        let frame = Message::redraw(&help_text(self.settings.prefix)).to_frame();
        self.broadcaster.clients().send_to(client, frame)
    }

    pub fn status_line(&self) -> String {
        let state = self.lock();
        self.status_locked(&state)
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.lock().panes.ids()
    }

    pub fn active_pane(&self) -> Option<PaneId> {
        self.lock().panes.active_id()
    }

    pub fn client_count(&self) -> usize {
        self.broadcaster.clients().len()
    }

    /// Kill every pane and forget every client. Later `create_pane` calls fail.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        for (_, pump) in state.pumps.drain() {
            pump.abort();
        }
        for mut pane in state.panes.drain() {
            if let Err(e) = pane.kill() {
                log::debug!("kill of pane {} on close failed: {e}", pane.id());
            }
        }
        self.broadcaster.clients().clear();
    }

    fn create_pane_locked(&self, state: &mut SessionState) -> Result<PaneId, PtyError> {
        if state.closed {
            return Err(PtyError::Spawn("session is closed".to_string()));
        }

        let id = state.panes.next_id();
        let mut pane = Pane::spawn(id, &self.settings.command, state.size, self.settings.pane_queue)?;
        let output = pane.take_output();
        state.panes.push(pane);

        self.broadcast(&Message::new_pane_notify(id));
        self.broadcast_status(state);

        if let Some(output) = output {
            let pump = start_output_pump(id, output, self.broadcaster.clone());
            state.pumps.insert(id, pump);
        }

        self.broadcaster.emit(SessionEvent::PaneCreated { id });
        self.broadcaster.emit(SessionEvent::ActiveChanged { id });
        Ok(id)
    }

    fn remove_pane_locked(&self, state: &mut SessionState, id: PaneId) -> Result<bool, PtyError> {
        if state.panes.get_mut(id).is_none() {
            return Ok(false);
        }
        if state.panes.len() == 1 {
            self.create_pane_locked(state)?;
        }

        let active_before = state.panes.active_id();
        if let Some(mut pane) = state.panes.remove(id) {
            if let Err(e) = pane.kill() {
                log::debug!("kill of pane {id} failed: {e}");
            }
        }
        if let Some(pump) = state.pumps.remove(&id) {
            pump.abort();
        }
        self.broadcaster.emit(SessionEvent::PaneRemoved { id });

        let active_after = state.panes.active_id();
        if active_after != active_before {
            if let Some(active) = active_after {
                self.broadcast(&Message::switch_pane_notify(active));
                self.broadcaster.emit(SessionEvent::ActiveChanged { id: active });
            }
        }
        self.broadcast_status(state);
        Ok(true)
    }

    fn write_locked(&self, state: &mut SessionState, id: Option<PaneId>, data: &[u8]) -> bool {
        let written = match id.and_then(|id| state.panes.get_mut(id)) {
            Some(pane) => match pane.write(data) {
                Ok(()) => true,
                Err(e) => {
                    log::trace!("input to pane {} dropped: {e}", pane.id());
                    false
                }
            },
            None => false,
        };
        if !written {
            if let Some(id) = id {
                self.broadcaster.emit(SessionEvent::InputDropped {
                    id,
                    len: data.len(),
                });
            }
        }
        written
    }

    fn status_locked(&self, state: &SessionState) -> String {
        match state.panes.active_id() {
            Some(id) => format!(
                "[{}] pane {id} ({}/{})",
                self.settings.name,
                state.panes.active_index() + 1,
                state.panes.len()
            ),
            None => format!("[{}] no panes", self.settings.name),
        }
    }

    fn broadcast_status(&self, state: &SessionState) {
        self.broadcast(&Message::redraw(&self.status_locked(state)));
    }

    fn broadcast(&self, message: &Message) {
        let frame: Bytes = message.to_frame();
        self.broadcaster.broadcast(&frame);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Multi-line overlay listing the client's prefix chords.
pub fn help_text(prefix: char) -> String {
    let chords = [
        ("d", "Detach"),
        ("c", "New Pane"),
        ("n", "Next Pane"),
        ("p", "Previous Pane"),
        ("&", "Kill Pane"),
        ("\"", "Split (New Pane)"),
        ("o", "Next Pane (same as n)"),
        ("?", "Show Help"),
    ];
    let mut text = String::from("Commands:");
    for (key, action) in chords {
        text.push_str(&format!("\n  Ctrl+{prefix} {key}: {action}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use loom_proto::{decode, parse_pane_id, MessageKind, DEFAULT_MAX_FRAME_LEN};
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout, Instant};

    use super::*;
    use crate::daemon::events::testing::RecordingObserver;

    fn settings() -> SessionSettings {
        SessionSettings {
            name: "test".to_string(),
            command: PaneCommand::shell("/bin/sh"),
            pane_size: PaneSize::new(80, 23),
            pane_queue: 64,
            prefix: 'a',
        }
    }

    fn session_with(panes: usize) -> (Session, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let session = Session::new(settings(), observer.clone());
        for _ in 0..panes {
            session.create_pane().unwrap();
        }
        (session, observer)
    }

    fn attach(session: &Session) -> (ClientId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(4096);
        (session.attach(tx).unwrap(), rx)
    }

    /// Structural (non-data) messages currently queued for a client.
    fn structural(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let (message, used) = decode(&frame, DEFAULT_MAX_FRAME_LEN).unwrap();
            assert_eq!(used, frame.len());
            if message.kind != MessageKind::Data {
                out.push(message);
            }
        }
        out
    }

    fn redraw_text(message: &Message) -> String {
        assert_eq!(message.kind, MessageKind::Redraw);
        String::from_utf8(message.payload.to_vec()).unwrap()
    }

    fn notified_id(message: &Message, kind: MessageKind) -> PaneId {
        assert_eq!(message.kind, kind);
        parse_pane_id(&message.payload).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_pane_notifies_then_redraws() {
        let (session, _) = session_with(1);
        let (_, mut rx) = attach(&session);
        structural(&mut rx);

        let id = session.create_pane().unwrap();
        assert_eq!(id, 1);
        assert_eq!(session.pane_ids(), vec![0, 1]);
        assert_eq!(session.active_pane(), Some(1));

        let messages = structural(&mut rx);
        assert_eq!(messages.len(), 2);
        assert_eq!(notified_id(&messages[0], MessageKind::NewPaneNotify), 1);
        assert_eq!(redraw_text(&messages[1]), "[test] pane 1 (2/2)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_client_sees_structural_broadcasts() {
        let (session, _) = session_with(1);
        let (_, mut a) = attach(&session);
        let (_, mut b) = attach(&session);
        structural(&mut a);
        structural(&mut b);

        session.create_pane().unwrap();
        assert_eq!(structural(&mut a), structural(&mut b));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_join_sync_order() {
        let (session, _) = session_with(2);
        let (_, mut rx) = attach(&session);

        let mut frames = Vec::new();
        for _ in 0..5 {
            let frame = rx.try_recv().unwrap();
            frames.push(decode(&frame, DEFAULT_MAX_FRAME_LEN).unwrap().0);
        }
        assert_eq!(redraw_text(&frames[0]), "[test] pane 1 (2/2)");
        assert_eq!(notified_id(&frames[1], MessageKind::NewPaneNotify), 0);
        assert_eq!(notified_id(&frames[2], MessageKind::NewPaneNotify), 1);
        assert_eq!(notified_id(&frames[3], MessageKind::SwitchPaneNotify), 1);
        assert_eq!(redraw_text(&frames[4]), "[test] pane 1 (2/2)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_switch_wraps_and_broadcasts() {
        let (session, _) = session_with(3);
        let (_, mut rx) = attach(&session);
        structural(&mut rx);

        assert_eq!(session.switch_active(1), Some(0));
        let messages = structural(&mut rx);
        assert_eq!(notified_id(&messages[0], MessageKind::SwitchPaneNotify), 0);
        assert_eq!(redraw_text(&messages[1]), "[test] pane 0 (1/3)");

        assert_eq!(session.switch_active(-1), Some(2));
        assert_eq!(session.status_line(), "[test] pane 2 (3/3)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_removing_sole_pane_leaves_replacement() {
        let (session, _) = session_with(1);
        let (_, mut rx) = attach(&session);
        structural(&mut rx);

        assert!(session.remove_pane(0).unwrap());
        assert_eq!(session.pane_ids(), vec![1]);
        assert_eq!(session.active_pane(), Some(1));

        let messages = structural(&mut rx);
        assert_eq!(notified_id(&messages[0], MessageKind::NewPaneNotify), 1);
        assert_eq!(redraw_text(messages.last().unwrap()), "[test] pane 1 (1/1)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_removing_active_pane_announces_new_active() {
        let (session, observer) = session_with(2);
        let (_, mut rx) = attach(&session);
        structural(&mut rx);

        assert!(session.kill_active().unwrap());
        assert_eq!(session.pane_ids(), vec![0]);

        let messages = structural(&mut rx);
        assert_eq!(messages.len(), 2);
        assert_eq!(notified_id(&messages[0], MessageKind::SwitchPaneNotify), 0);
        assert_eq!(redraw_text(&messages[1]), "[test] pane 0 (1/1)");
        assert!(observer
            .events()
            .contains(&SessionEvent::PaneRemoved { id: 1 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_removing_inactive_pane_keeps_active() {
        let (session, _) = session_with(3);
        let (_, mut rx) = attach(&session);
        structural(&mut rx);

        assert!(session.remove_pane(0).unwrap());
        assert_eq!(session.active_pane(), Some(2));
        let messages = structural(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(redraw_text(&messages[0]), "[test] pane 2 (2/2)");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_unknown_pane_is_noop() {
        let (session, _) = session_with(1);
        assert!(!session.remove_pane(42).unwrap());
        assert_eq!(session.pane_ids(), vec![0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exited_pane_drops_input_and_can_be_killed() {
        let (session, observer) = session_with(1);
        assert!(session.write_active(b"exit\n"));

        let ended = timeout(Duration::from_secs(5), async {
            while !observer
                .events()
                .contains(&SessionEvent::PaneOutputEnded { id: 0 })
            {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(ended.is_ok(), "pane output should end after exit");

        let deadline = Instant::now() + Duration::from_secs(3);
        while session.write(0, b"echo hi\n") && Instant::now() < deadline {
            sleep(Duration::from_millis(20)).await;
        }
        assert!(!session.write(0, b"echo hi\n"));
        assert!(observer
            .events()
            .contains(&SessionEvent::InputDropped { id: 0, len: 8 }));

        assert!(session.kill_active().unwrap());
        assert_eq!(session.pane_ids(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_unknown_pane_is_dropped() {
        let (session, _) = session_with(1);
        assert!(!session.write(9, b"x"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pane_output_reaches_clients() {
        let (session, _) = session_with(1);
        let (_, mut rx) = attach(&session);
        assert!(session.write_active(b"echo loom-$((40+2))\n"));

        let mut seen = Vec::new();
        let found = timeout(Duration::from_secs(5), async {
            while let Some(frame) = rx.recv().await {
                let (message, _) = decode(&frame, DEFAULT_MAX_FRAME_LEN).unwrap();
                if message.kind == MessageKind::Data {
                    let (id, data) = loom_proto::split_pane_output(&message.payload).unwrap();
                    assert_eq!(id, 0);
                    seen.extend_from_slice(data);
                    if String::from_utf8_lossy(&seen).contains("loom-42") {
                        break;
                    }
                }
            }
        })
        .await;
        assert!(found.is_ok(), "expected pane output, saw {:?}", String::from_utf8_lossy(&seen));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resize_applies_to_new_panes() {
        let (session, observer) = session_with(1);
        let size = PaneSize::new(100, 30);
        session.resize(size);
        session.create_pane().unwrap();
        assert!(observer.events().contains(&SessionEvent::Resized { size }));
        let state = session.lock();
        assert_eq!(state.size, size);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_help_goes_to_requesting_client_only() {
        let (session, _) = session_with(1);
        let (a, mut rx_a) = attach(&session);
        let (_, mut rx_b) = attach(&session);
        structural(&mut rx_a);
        structural(&mut rx_b);

        assert!(session.send_help(a));
        let help = structural(&mut rx_a);
        assert_eq!(help.len(), 1);
        let text = redraw_text(&help[0]);
        assert!(text.starts_with("Commands:\n"));
        assert!(text.contains("Ctrl+a d: Detach"));
        assert!(text.contains("Ctrl+a ?: Show Help"));
        assert!(structural(&mut rx_b).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_detach_and_close() {
        let (session, observer) = session_with(1);
        let (a, _rx_a) = attach(&session);
        let (_, _rx_b) = attach(&session);
        assert_eq!(session.client_count(), 2);

        session.detach(a);
        session.detach(a);
        assert_eq!(session.client_count(), 1);
        let detached = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::ClientDetached { .. }))
            .count();
        assert_eq!(detached, 1);

        session.close();
        assert!(session.pane_ids().is_empty());
        assert_eq!(session.client_count(), 0);
        assert!(session.create_pane().is_err());
        assert_eq!(session.status_line(), "[test] no panes");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_attach_refused_when_sync_overflows_queue() {
        let (session, observer) = session_with(2);
        // Two panes need five sync frames.
        let (tx, mut rx) = mpsc::channel(2);
        assert_eq!(session.attach(tx), None);
        assert_eq!(session.client_count(), 0);
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::ClientDropped { .. })));

        // The sender was dropped, so the partial sync ends the queue.
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_help_text_uses_prefix() {
        let text = help_text('b');
        assert_eq!(text.lines().count(), 9);
        assert!(text.contains("Ctrl+b &: Kill Pane"));
    }
}
