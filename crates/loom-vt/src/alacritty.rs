use alacritty_terminal::event::VoidListener;
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi;

use crate::emulator::{Cursor, Emulator};

/// Dimensions helper for creating the terminal.
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// Full VT/xterm emulation backed by `alacritty_terminal`.
///
/// No scrollback is kept, and resizing rebuilds the terminal blank so both
/// emulators share the same resize contract.
pub struct AlacrittyTerminal {
    term: Term<VoidListener>,
    parser: ansi::Processor,
}

impl AlacrittyTerminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        let config = Config {
            scrolling_history: 0,
            ..Config::default()
        };

        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };

        Self {
            term: Term::new(config, &size, VoidListener),
            parser: ansi::Processor::new(),
        }
    }
}

impl Emulator for AlacrittyTerminal {
    fn write(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.term, bytes);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        *self = Self::new(cols, rows);
    }

    fn cols(&self) -> u16 {
        self.term.columns() as u16
    }

    fn rows(&self) -> u16 {
        self.term.screen_lines() as u16
    }

    fn cell(&self, row: u16, col: u16) -> char {
        if (row as usize) >= self.term.screen_lines() || (col as usize) >= self.term.columns() {
            return ' ';
        }
        self.term.grid()[Line(row as i32)][Column(col as usize)].c
    }

    fn cursor(&self) -> Cursor {
        let point = self.term.renderable_content().cursor.point;
        let max_row = self.rows().saturating_sub(1);
        let max_col = self.cols().saturating_sub(1);
        Cursor {
            row: (point.line.0.max(0) as u16).min(max_row),
            col: (point.column.0 as u16).min(max_col),
        }
    }
}
