/// Cursor position, zero-based, always inside the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: u16,
    pub col: u16,
}

impl Cursor {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// A terminal emulator fed by one pane's output stream.
///
/// Implementations keep `cursor().row < rows()` and `cursor().col < cols()`
/// after every call, and `resize` leaves a blank grid with the cursor at the
/// origin.
pub trait Emulator: Send {
    /// Feed raw output bytes.
    fn write(&mut self, bytes: &[u8]);

    /// Change the grid size. Existing content is discarded.
    fn resize(&mut self, cols: u16, rows: u16);

    fn cols(&self) -> u16;

    fn rows(&self) -> u16;

    /// Character at the given cell; a blank for coordinates outside the grid.
    fn cell(&self, row: u16, col: u16) -> char;

    fn cursor(&self) -> Cursor;

    /// The full text of one row, including trailing blanks.
    fn row_text(&self, row: u16) -> String {
        (0..self.cols()).map(|col| self.cell(row, col)).collect()
    }
}
