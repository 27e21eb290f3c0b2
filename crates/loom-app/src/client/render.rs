//! Paints the mirrored session onto the real terminal.
//!
//! Row 0 holds the status bar in reverse video and the active pane's grid
//! fills the rows below it. Multi-line status text (help) is drawn as a
//! centered box over the grid instead.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;

use super::state::ClientState;

pub struct Renderer<W: Write> {
    out: W,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Redraw the whole screen for a terminal of `width` x `height`.
    pub fn paint(&mut self, state: &ClientState, width: u16, height: u16) -> io::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        queue!(self.out, Hide, MoveTo(0, 0), Clear(ClearType::All))?;

        if !state.is_overlay() {
            queue!(
                self.out,
                MoveTo(0, 0),
                SetAttribute(Attribute::Reverse),
                Print(fit(state.status(), width as usize)),
                SetAttribute(Attribute::Reset)
            )?;
        }

        if let Some(grid) = state.active_grid() {
            let rows = grid.rows().min(height - 1);
            for row in 0..rows {
                let line: String = grid.row_text(row).chars().take(width as usize).collect();
                queue!(self.out, MoveTo(0, row + 1), Print(line))?;
            }
        }

        if state.is_overlay() {
            self.paint_overlay(state.status(), width, height)?;
        } else if let Some(grid) = state.active_grid() {
            let cursor = grid.cursor();
            if cursor.row + 1 < height && cursor.col < width {
                queue!(self.out, MoveTo(cursor.col, cursor.row + 1), Show)?;
            }
        }

        self.out.flush()
    }

    fn paint_overlay(&mut self, text: &str, width: u16, height: u16) -> io::Result<()> {
        let lines: Vec<&str> = text.lines().collect();
        let inner = lines
            .iter()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0)
            .min((width as usize).saturating_sub(4));
        let box_width = (inner + 4) as u16;
        let box_height = (lines.len() as u16 + 2).min(height);
        let left = width.saturating_sub(box_width) / 2;
        let top = height.saturating_sub(box_height) / 2;

        queue!(self.out, SetAttribute(Attribute::Reverse))?;
        for row in 0..box_height {
            let content = match row.checked_sub(1).and_then(|i| lines.get(i as usize)) {
                Some(line) if row + 1 < box_height => fit(line, inner),
                _ => " ".repeat(inner),
            };
            queue!(
                self.out,
                MoveTo(left, top + row),
                Print(format!("  {content}  "))
            )?;
        }
        queue!(self.out, SetAttribute(Attribute::Reset))
    }
}

/// Truncate or pad `text` to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width - len));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorBackend;
    use loom_proto::Message;

    fn painted(state: &ClientState, width: u16, height: u16) -> String {
        let mut renderer = Renderer::new(Vec::new());
        renderer.paint(state, width, height).unwrap();
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdef", 3), "abc");
    }

    #[test]
    fn test_status_bar_and_grid() {
        let mut state = ClientState::new(EmulatorBackend::Grid, 20, 3);
        state.handle(&Message::redraw("[main] pane 0 (1/1)")).unwrap();
        state.handle(&Message::new_pane_notify(0)).unwrap();
        state.handle(&Message::pane_output(0, b"$ echo hi")).unwrap();

        let out = painted(&state, 20, 4);
        assert!(out.contains("[main] pane 0 (1/1) "));
        assert!(out.contains("$ echo hi"));
        // Cursor sits after the text, one row below the status bar.
        assert!(out.ends_with("\x1b[2;10H\x1b[?25h"));
    }

    #[test]
    fn test_overlay_hides_status_bar() {
        let mut state = ClientState::new(EmulatorBackend::Grid, 40, 9);
        state.handle(&Message::new_pane_notify(0)).unwrap();
        state
            .handle(&Message::redraw("Commands:\n  Ctrl+a d: Detach"))
            .unwrap();

        let out = painted(&state, 40, 10);
        assert!(out.contains("  Commands:"));
        assert!(out.contains("  Ctrl+a d: Detach  "));
        assert!(!out.ends_with("\x1b[?25h"));
    }

    #[test]
    fn test_zero_sized_terminal_is_noop() {
        let state = ClientState::new(EmulatorBackend::Grid, 1, 1);
        assert!(painted(&state, 0, 0).is_empty());
    }
}
