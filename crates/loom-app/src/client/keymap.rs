//! Key chords and key-to-byte translation.
//!
//! `Ctrl+<prefix>` arms the chord; the next key picks a command. Everything
//! else is translated to the bytes a terminal would send and forwarded as
//! pane input.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use loom_proto::MessageKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// Raw bytes for the active pane.
    Input(Vec<u8>),
    /// A payload-less command for the daemon.
    Command(MessageKind),
    Detach,
    None,
}

pub struct Keymap {
    prefix: char,
    armed: bool,
}

impl Keymap {
    pub fn new(prefix: char) -> Self {
        Self {
            prefix: prefix.to_ascii_lowercase(),
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        if key.kind == KeyEventKind::Release {
            return KeyAction::None;
        }

        if self.armed {
            self.armed = false;
            return self.chord(key);
        }

        if self.is_prefix(&key) {
            self.armed = true;
            return KeyAction::None;
        }

        let bytes = key_bytes(&key);
        if bytes.is_empty() {
            KeyAction::None
        } else {
            KeyAction::Input(bytes)
        }
    }

    fn chord(&self, key: KeyEvent) -> KeyAction {
        if self.is_prefix(&key) {
            return KeyAction::Input(vec![self.prefix_byte()]);
        }
        match key.code {
            KeyCode::Char('d') => KeyAction::Detach,
            KeyCode::Char('c') => KeyAction::Command(MessageKind::NewPane),
            KeyCode::Char('n') => KeyAction::Command(MessageKind::NextPane),
            KeyCode::Char('p') => KeyAction::Command(MessageKind::PrevPane),
            KeyCode::Char('&') => KeyAction::Command(MessageKind::KillPane),
            KeyCode::Char('"') => KeyAction::Command(MessageKind::Split),
            KeyCode::Char('o') => KeyAction::Command(MessageKind::NextPaneAlt),
            KeyCode::Char('?') => KeyAction::Command(MessageKind::ShowHelp),
            _ => {
                let mut bytes = vec![self.prefix_byte()];
                bytes.extend(key_bytes(&key));
                KeyAction::Input(bytes)
            }
        }
    }

    fn is_prefix(&self, key: &KeyEvent) -> bool {
        key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char(c) if c.to_ascii_lowercase() == self.prefix)
    }

    fn prefix_byte(&self) -> u8 {
        (self.prefix as u8) & 0x1f
    }
}

/// Bytes a VT terminal sends for `key`. Empty for keys with no encoding.
pub fn key_bytes(key: &KeyEvent) -> Vec<u8> {
    let mut bytes = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => match control_byte(c) {
            Some(b) => vec![b],
            None => c.to_string().into_bytes(),
        },
        KeyCode::Char(c) => c.to_string().into_bytes(),
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        _ => Vec::new(),
    };
    if key.modifiers.contains(KeyModifiers::ALT) && !bytes.is_empty() {
        bytes.insert(0, 0x1b);
    }
    bytes
}

fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some((c.to_ascii_lowercase() as u8) & 0x1f),
        ' ' | '@' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' | '/' => Some(0x1f),
        _ => None,
    }
}
