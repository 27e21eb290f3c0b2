use std::collections::VecDeque;

use crate::emulator::{Cursor, Emulator};

const BLANK: char = ' ';
const TAB_WIDTH: u16 = 8;
/// CSI parameter bytes kept per sequence; longer sequences are still
/// consumed, only the tail is dropped.
const MAX_CSI_PARAMS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseState {
    Normal,
    /// Saw ESC, waiting for the introducer.
    Escape,
    /// Inside `ESC [`, accumulating parameter bytes until a final byte.
    Csi,
    /// Inside `ESC ]`, discarding until BEL or `ESC \`.
    Osc,
    /// Saw ESC inside an OSC string.
    OscEscape,
}

/// Pending multi-byte UTF-8 character.
#[derive(Clone, Copy, Debug, Default)]
struct Utf8Pending {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Pending {
    fn is_active(&self) -> bool {
        self.need > 0
    }

    fn start(&mut self, lead: u8, need: usize) {
        self.buf[0] = lead;
        self.len = 1;
        self.need = need;
    }

    /// Push a continuation byte; returns the decoded char once complete.
    fn push(&mut self, byte: u8) -> Option<char> {
        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < self.need {
            return None;
        }
        let decoded = std::str::from_utf8(&self.buf[..self.len])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.reset();
        Some(decoded)
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }
}

/// Built-in grid emulator: a byte-at-a-time state machine over a
/// `cols` x `rows` character grid.
///
/// Printing at the last column wraps immediately to the next row, and
/// advancing past the bottom row scrolls the grid up by exactly one row.
#[derive(Clone, Debug)]
pub struct GridTerminal {
    cols: u16,
    rows: u16,
    lines: VecDeque<Vec<char>>,
    cursor: Cursor,
    state: ParseState,
    params: Vec<u8>,
    utf8: Utf8Pending,
}

impl GridTerminal {
    /// Create a blank grid. Dimensions are clamped to at least 1x1.
    pub fn new(cols: u16, rows: u16) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            lines: blank_lines(cols, rows),
            cursor: Cursor::default(),
            state: ParseState::Normal,
            params: Vec::with_capacity(MAX_CSI_PARAMS),
            utf8: Utf8Pending::default(),
        }
    }

    /// Whether the parser is in the middle of an escape sequence.
    pub fn in_escape(&self) -> bool {
        self.state != ParseState::Normal
    }

    fn advance(&mut self, byte: u8) {
        match self.state {
            ParseState::Normal => self.normal(byte),
            ParseState::Escape => {
                self.state = match byte {
                    b'[' => {
                        self.params.clear();
                        ParseState::Csi
                    }
                    b']' => ParseState::Osc,
                    // Two-byte escapes (ESC 7, ESC =, ...) carry nothing we render.
                    _ => ParseState::Normal,
                };
            }
            ParseState::Csi => match byte {
                0x40..=0x7E => {
                    self.execute_csi(byte);
                    self.state = ParseState::Normal;
                }
                0x1B => self.state = ParseState::Escape,
                _ => {
                    if self.params.len() < MAX_CSI_PARAMS {
                        self.params.push(byte);
                    }
                }
            },
            ParseState::Osc => match byte {
                0x07 => self.state = ParseState::Normal,
                0x1B => self.state = ParseState::OscEscape,
                _ => {}
            },
            ParseState::OscEscape => {
                if byte == b'\\' {
                    self.state = ParseState::Normal;
                } else {
                    // Unterminated OSC followed by a new escape sequence.
                    self.state = ParseState::Escape;
                    self.advance(byte);
                }
            }
        }
    }

    fn normal(&mut self, byte: u8) {
        if self.utf8.is_active() {
            if (0x80..=0xBF).contains(&byte) {
                if let Some(c) = self.utf8.push(byte) {
                    self.put_char(c);
                }
                return;
            }
            self.utf8.reset();
            self.put_char(char::REPLACEMENT_CHARACTER);
        }

        match byte {
            0x1B => self.state = ParseState::Escape,
            b'\n' => {
                self.cursor.col = 0;
                self.next_row();
            }
            b'\r' => self.cursor.col = 0,
            0x08 => self.backspace(),
            b'\t' => self.tab(),
            0x20..=0x7E => self.put_char(byte as char),
            0xC2..=0xDF => self.utf8.start(byte, 2),
            0xE0..=0xEF => self.utf8.start(byte, 3),
            0xF0..=0xF4 => self.utf8.start(byte, 4),
            0x80..=0xFF => self.put_char(char::REPLACEMENT_CHARACTER),
            // Remaining C0 controls (BEL, ...) and DEL have no grid effect.
            _ => {}
        }
    }

    fn put_char(&mut self, c: char) {
        let Cursor { row, col } = self.cursor;
        self.lines[row as usize][col as usize] = c;
        if col + 1 >= self.cols {
            self.cursor.col = 0;
            self.next_row();
        } else {
            self.cursor.col = col + 1;
        }
    }

    fn next_row(&mut self) {
        if self.cursor.row + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor.row += 1;
        }
    }

    fn scroll_up(&mut self) {
        self.lines.pop_front();
        self.lines.push_back(vec![BLANK; self.cols as usize]);
    }

    fn backspace(&mut self) {
        if self.cursor.col == 0 {
            return;
        }
        self.cursor.col -= 1;
        let Cursor { row, col } = self.cursor;
        self.lines[row as usize][col as usize] = BLANK;
    }

    fn tab(&mut self) {
        let next = (self.cursor.col / TAB_WIDTH + 1) * TAB_WIDTH;
        self.cursor.col = next.min(self.cols - 1);
    }

    fn execute_csi(&mut self, final_byte: u8) {
        match final_byte {
            b'H' | b'f' => {
                let params: Vec<u16> = self.numeric_params().collect();
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                self.cursor = Cursor::new(
                    row.saturating_sub(1).min(self.rows - 1),
                    col.saturating_sub(1).min(self.cols - 1),
                );
            }
            b'J' => {
                self.lines = blank_lines(self.cols, self.rows);
                self.cursor = Cursor::default();
            }
            // SGR and everything else: accepted, no visible effect.
            _ => {}
        }
    }

    /// Parameters as 1-based numbers; empty or zero fields read as 1.
    fn numeric_params(&self) -> impl Iterator<Item = u16> + '_ {
        self.params.split(|b| *b == b';').map(|field| {
            let value = field
                .iter()
                .filter(|b| b.is_ascii_digit())
                .fold(0u16, |acc, b| acc.saturating_mul(10).saturating_add(u16::from(b - b'0')));
            value.max(1)
        })
    }
}

fn blank_lines(cols: u16, rows: u16) -> VecDeque<Vec<char>> {
    (0..rows).map(|_| vec![BLANK; cols as usize]).collect()
}

impl Emulator for GridTerminal {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.advance(byte);
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols.max(1);
        self.rows = rows.max(1);
        self.lines = blank_lines(self.cols, self.rows);
        self.cursor = Cursor::default();
    }

    fn cols(&self) -> u16 {
        self.cols
    }

    fn rows(&self) -> u16 {
        self.rows
    }

    fn cell(&self, row: u16, col: u16) -> char {
        self.lines
            .get(row as usize)
            .and_then(|line| line.get(col as usize))
            .copied()
            .unwrap_or(BLANK)
    }

    fn cursor(&self) -> Cursor {
        self.cursor
    }
}
