//! Terminal state management
//!
//! This module defines the cell grid, the cursor (which carries the graphic
//! rendition stamped onto newly written cells), terminal modes and the set of
//! rows damaged since the presentation layer last drained it.

use bitflags::bitflags;
use std::collections::HashSet;
use unicode_width::UnicodeWidthChar;

/// Terminal state holding all screen data
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub primary_grid: Grid,
    pub alternate_grid: Grid,
    pub using_alternate: bool,
    pub primary_cursor: Cursor,
    pub alternate_cursor: Cursor,
    pub modes: TerminalModes,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
    pub damage: Damage,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            primary_grid: Grid::new(cols, rows),
            alternate_grid: Grid::new(cols, rows),
            using_alternate: false,
            primary_cursor: Cursor::default(),
            alternate_cursor: Cursor::default(),
            modes: TerminalModes::default(),
            scroll_region: (0, rows - 1),
            damage: Damage::default(),
        }
    }

    pub fn active_grid(&self) -> &Grid {
        if self.using_alternate {
            &self.alternate_grid
        } else {
            &self.primary_grid
        }
    }

    pub fn active_grid_mut(&mut self) -> &mut Grid {
        if self.using_alternate {
            &mut self.alternate_grid
        } else {
            &mut self.primary_grid
        }
    }

    pub fn active_cursor(&self) -> &Cursor {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut Cursor {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Style that will be stamped onto the next written cell
    pub fn style(&self) -> &Style {
        &self.active_cursor().style
    }

    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.active_cursor_mut().style
    }

    fn cursor_pos(&self) -> (usize, usize) {
        let cursor = self.active_cursor();
        (cursor.row as usize, cursor.col as usize)
    }

    /// Resize the terminal. Both dimensions must be non-zero.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        debug_assert!(cols > 0 && rows > 0);
        self.cols = cols;
        self.rows = rows;
        self.primary_grid.resize(cols, rows);
        self.alternate_grid.resize(cols, rows);
        self.scroll_region = (0, rows - 1);

        let max_col = cols - 1;
        let max_row = rows - 1;
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.col = cursor.col.min(max_col);
            cursor.row = cursor.row.min(max_row);
        }

        self.damage.retain_below(rows as usize);
        self.mark_all_damaged();
    }

    pub fn mark_all_damaged(&mut self) {
        self.damage.mark_range(0, self.rows as usize - 1);
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = match ch.width() {
            Some(w) => w as u16,
            None => return,
        };

        if width == 0 {
            // Combining character - append to previous cell
            self.append_to_previous_cell(ch);
            return;
        }

        let cols = self.cols;
        if width > cols {
            return;
        }

        // A wide character that does not fit on this row
        if self.active_cursor().col + width > cols {
            if !self.modes.auto_wrap {
                return;
            }
            self.active_cursor_mut().col = 0;
            self.linefeed();
        }

        if self.modes.insert_mode {
            self.insert_chars(width);
        }

        let (row, col) = self.cursor_pos();
        self.handle_wide_char_overwrite(row, col, width as usize);

        let style = self.style().clone();
        let grid = self.active_grid_mut();
        if width == 2 {
            grid.rows[row].cells[col + 1] = Cell::continuation(&style);
        }
        grid.rows[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            style,
        };
        self.damage.mark(row);

        // Wrapping is eager so the cursor never leaves the grid
        let next = col as u16 + width;
        if next < cols {
            self.active_cursor_mut().col = next;
        } else if self.modes.auto_wrap {
            self.active_cursor_mut().col = 0;
            self.linefeed();
        } else {
            self.active_cursor_mut().col = cols - 1;
        }
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = self.cursor_pos();
        let cols = self.cols as usize;

        let (row, mut col) = if col > 0 {
            (row, col - 1)
        } else if row > 0 {
            (row - 1, cols - 1)
        } else {
            return;
        };

        let grid = self.active_grid_mut();
        if col > 0 && grid.rows[row].cells[col].is_continuation() {
            col -= 1;
        }
        let cell = &mut grid.rows[row].cells[col];
        if !cell.grapheme.is_empty() {
            cell.grapheme.push(ch);
            self.damage.mark(row);
        }
    }

    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize, width: usize) {
        let cols = self.cols as usize;
        let cells = &mut self.active_grid_mut().rows[row].cells;

        // Overwriting the right half of a wide char
        if col > 0 && cells[col].is_continuation() {
            cells[col - 1] = Cell::default();
        }

        // Overwriting the left half of a wide char
        let last = col + width - 1;
        if cells[last].width == 2 && last + 1 < cols {
            cells[last + 1] = Cell::default();
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.active_cursor_mut().col = 0;
    }

    /// Line feed - move cursor down, scroll if needed
    pub fn linefeed(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;
        let rows = self.rows;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row + 1 < rows {
            self.active_cursor_mut().row += 1;
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(1);
    }

    /// Horizontal tab
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        // Tab stops every 8 columns
        cursor.col = ((cursor.col / 8) + 1).saturating_mul(8).min(cols - 1);
    }

    /// Scroll the region up by n lines; the top lines are discarded
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        let n = (n as usize).min(bottom - top + 1);
        if n == 0 {
            return;
        }
        let cols = self.cols;

        let region = &mut self.active_grid_mut().rows[top..=bottom];
        region.rotate_left(n);
        let len = region.len();
        for row in &mut region[len - n..] {
            *row = Row::new(cols);
        }
        self.damage.mark_range(top, bottom);
    }

    /// Scroll the region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        let n = (n as usize).min(bottom - top + 1);
        if n == 0 {
            return;
        }
        let cols = self.cols;

        let region = &mut self.active_grid_mut().rows[top..=bottom];
        region.rotate_right(n);
        for row in &mut region[..n] {
            *row = Row::new(cols);
        }
        self.damage.mark_range(top, bottom);
    }

    /// Cursor up
    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    /// Cursor down
    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_add(n).min(rows - 1);
    }

    /// Cursor forward (right)
    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_add(n).min(cols - 1);
    }

    /// Cursor backward (left)
    pub fn cursor_backward(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor_row(row);
        self.cursor_column(col);
    }

    /// Set cursor column (1-indexed)
    pub fn cursor_column(&mut self, col: u16) {
        let cols = self.cols;
        self.active_cursor_mut().col = col.saturating_sub(1).min(cols - 1);
    }

    /// Set cursor row (1-indexed)
    pub fn cursor_row(&mut self, row: u16) {
        let rows = self.rows;
        self.active_cursor_mut().row = row.saturating_sub(1).min(rows - 1);
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        let (cursor_row, _) = self.cursor_pos();
        let blank = self.style().blank();
        let rows = match mode {
            0 => {
                self.erase_in_line(0);
                cursor_row + 1..self.rows as usize
            }
            1 => {
                self.erase_in_line(1);
                0..cursor_row
            }
            // 3 would also clear scrollback, of which there is none
            2 | 3 => 0..self.rows as usize,
            _ => return,
        };

        let grid = self.active_grid_mut();
        for r in rows.clone() {
            grid.rows[r].clear(&blank);
        }
        if !rows.is_empty() {
            self.damage.mark_range(rows.start, rows.end - 1);
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = self.cursor_pos();
        let cols = self.cols as usize;
        let blank = self.style().blank();

        let range = match mode {
            0 => col..cols,
            1 => 0..col + 1,
            2 => 0..cols,
            _ => return,
        };

        let line = &mut self.active_grid_mut().rows[row];
        for cell in &mut line.cells[range] {
            cell.clear(&blank);
        }
        line.repair_wide_chars(&blank);
        self.damage.mark(row);
    }

    /// Insert blank lines at the cursor row, within the scroll region
    pub fn insert_lines(&mut self, n: u16) {
        let (row, _) = self.cursor_pos();
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        if row < top || row > bottom {
            return;
        }
        let n = (n as usize).min(bottom - row + 1);
        let cols = self.cols;

        let region = &mut self.active_grid_mut().rows[row..=bottom];
        region.rotate_right(n);
        for line in &mut region[..n] {
            *line = Row::new(cols);
        }
        self.damage.mark_range(row, bottom);
        self.active_cursor_mut().col = 0;
    }

    /// Delete lines at the cursor row, within the scroll region
    pub fn delete_lines(&mut self, n: u16) {
        let (row, _) = self.cursor_pos();
        let (top, bottom) = (self.scroll_region.0 as usize, self.scroll_region.1 as usize);
        if row < top || row > bottom {
            return;
        }
        let n = (n as usize).min(bottom - row + 1);
        let cols = self.cols;

        let region = &mut self.active_grid_mut().rows[row..=bottom];
        region.rotate_left(n);
        let len = region.len();
        for line in &mut region[len - n..] {
            *line = Row::new(cols);
        }
        self.damage.mark_range(row, bottom);
        self.active_cursor_mut().col = 0;
    }

    /// Insert blank characters at the cursor, shifting the rest of the row right
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = self.cursor_pos();
        let blank = self.style().blank();
        let cells = &mut self.active_grid_mut().rows[row].cells[col..];
        let n = (n as usize).min(cells.len());

        cells.rotate_right(n);
        for cell in &mut cells[..n] {
            cell.clear(&blank);
        }
        self.active_grid_mut().rows[row].repair_wide_chars(&blank);
        self.damage.mark(row);
    }

    /// Delete characters at the cursor, shifting the rest of the row left
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = self.cursor_pos();
        let blank = self.style().blank();
        let cells = &mut self.active_grid_mut().rows[row].cells[col..];
        let n = (n as usize).min(cells.len());

        cells.rotate_left(n);
        let len = cells.len();
        for cell in &mut cells[len - n..] {
            cell.clear(&blank);
        }
        self.active_grid_mut().rows[row].repair_wide_chars(&blank);
        self.damage.mark(row);
    }

    /// Erase characters from the cursor without shifting
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = self.cursor_pos();
        let blank = self.style().blank();
        let cells = &mut self.active_grid_mut().rows[row].cells[col..];
        let n = (n as usize).min(cells.len());

        for cell in &mut cells[..n] {
            cell.clear(&blank);
        }
        self.active_grid_mut().rows[row].repair_wide_chars(&blank);
        self.damage.mark(row);
    }

    /// Set scroll region (1-indexed, inclusive)
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows - 1);
        let bottom = bottom.saturating_sub(1).min(rows - 1);
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    /// Save cursor position and style
    pub fn save_cursor(&mut self) {
        let cursor = self.active_cursor();
        let saved = SavedCursor {
            col: cursor.col,
            row: cursor.row,
            style: cursor.style.clone(),
        };
        self.active_cursor_mut().saved = Some(saved);
    }

    /// Restore cursor position and style
    pub fn restore_cursor(&mut self) {
        let (max_col, max_row) = (self.cols - 1, self.rows - 1);
        let cursor = self.active_cursor_mut();
        if let Some(saved) = cursor.saved.clone() {
            cursor.col = saved.col.min(max_col);
            cursor.row = saved.row.min(max_row);
            cursor.style = saved.style;
        }
    }

    /// Set private mode
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            7 => self.modes.auto_wrap = enable,
            25 => self.active_cursor_mut().visible = enable,
            47 | 1047 => {
                if enable == self.using_alternate {
                    return;
                }
                if enable {
                    self.alternate_grid = Grid::new(self.cols, self.rows);
                }
                self.using_alternate = enable;
                self.mark_all_damaged();
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable == self.using_alternate {
                    return;
                }
                if enable {
                    self.save_cursor();
                    self.alternate_grid = Grid::new(self.cols, self.rows);
                    self.alternate_cursor = Cursor {
                        style: self.primary_cursor.style.clone(),
                        ..Cursor::default()
                    };
                    self.using_alternate = true;
                } else {
                    self.using_alternate = false;
                    self.restore_cursor();
                }
                self.mark_all_damaged();
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => {
                tracing::debug!("Ignoring private mode {} ({})", mode, enable);
            }
        }
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_top = self.scroll_region.0;

        if cursor_row == scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom
    pub fn index(&mut self) {
        self.linefeed();
    }

    /// Full reset; pending damage is kept and every row is added to it
    pub fn reset(&mut self) {
        let (cols, rows) = (self.cols, self.rows);
        self.primary_grid = Grid::new(cols, rows);
        self.alternate_grid = Grid::new(cols, rows);
        self.using_alternate = false;
        self.primary_cursor = Cursor::default();
        self.alternate_cursor = Cursor::default();
        self.modes = TerminalModes::default();
        self.scroll_region = (0, rows - 1);
        self.mark_all_damaged();
    }
}

/// Rows whose contents changed since the consumer last drained the set
#[derive(Debug, Default, Clone)]
pub struct Damage {
    rows: HashSet<usize>,
}

impl Damage {
    pub fn mark(&mut self, row: usize) {
        self.rows.insert(row);
    }

    /// Mark rows `first..=last`
    pub fn mark_range(&mut self, first: usize, last: usize) {
        self.rows.extend(first..=last);
    }

    pub fn contains(&self, row: usize) -> bool {
        self.rows.contains(&row)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Damaged rows in ascending order
    pub fn rows(&self) -> Vec<usize> {
        let mut rows: Vec<_> = self.rows.iter().copied().collect();
        rows.sort_unstable();
        rows
    }

    /// Drain the set, returning rows in ascending order
    pub fn take(&mut self) -> Vec<usize> {
        let mut rows: Vec<_> = self.rows.drain().collect();
        rows.sort_unstable();
        rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    fn retain_below(&mut self, rows: usize) {
        self.rows.retain(|&r| r < rows);
    }
}

/// Rectangular cell grid; every coordinate in range holds a cell
pub struct Grid {
    pub rows: Vec<Row>,
}

impl Grid {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
        }
    }

    /// Resize keeping overlapping content top-left aligned
    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        self.rows.truncate(new_rows as usize);
        for row in &mut self.rows {
            row.resize(new_cols);
        }
        while self.rows.len() < new_rows as usize {
            self.rows.push(Row::new(new_cols));
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |r| r.cells.len())
    }

    pub fn row(&self, row: usize) -> Option<&Row> {
        self.rows.get(row)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.cells.get(col))
    }
}

/// A single row
#[derive(Clone)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
        // A wide char whose right half was cut off
        if let Some(last) = self.cells.last_mut() {
            if last.width == 2 {
                *last = Cell::default();
            }
        }
    }

    pub fn clear(&mut self, style: &Style) {
        for cell in &mut self.cells {
            cell.clear(style);
        }
    }

    /// Blank wide chars that lost one half to a partial erase or shift
    pub fn repair_wide_chars(&mut self, style: &Style) {
        let len = self.cells.len();
        for col in 0..len {
            let broken = match self.cells[col].width {
                0 => col == 0 || self.cells[col - 1].width != 2,
                2 => col + 1 >= len || !self.cells[col + 1].is_continuation(),
                _ => false,
            };
            if broken {
                self.cells[col].clear(style);
            }
        }
    }

    /// Plain text of the row with trailing blanks trimmed
    pub fn text(&self) -> String {
        let mut text: String = self
            .cells
            .iter()
            .filter(|c| !c.is_continuation())
            .map(Cell::display_char)
            .collect();
        text.truncate(text.trim_end_matches(' ').len());
        text
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            style: Style::default(),
        }
    }
}

impl Cell {
    pub fn clear(&mut self, style: &Style) {
        self.grapheme.clear();
        self.width = 1;
        self.style = style.clone();
    }

    pub fn continuation(style: &Style) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            style: style.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_empty(&self) -> bool {
        self.grapheme.is_empty()
    }

    /// Get the display character (space if empty)
    pub fn display_char(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Graphic rendition of a cell
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl Style {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Style used for erased cells: only the background carries over
    pub fn blank(&self) -> Self {
        Self {
            bg: self.bg,
            ..Self::default()
        }
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Cursor position plus the pending graphic rendition
#[derive(Clone, Debug, PartialEq)]
pub struct Cursor {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub style: Style,
    pub saved: Option<SavedCursor>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            style: Style::default(),
            saved: None,
        }
    }
}

/// Saved cursor state
#[derive(Clone, Debug, PartialEq)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub style: Style,
}

/// Terminal modes
#[derive(Clone, Debug)]
pub struct TerminalModes {
    pub application_cursor: bool,
    pub auto_wrap: bool,
    pub insert_mode: bool,
    pub linefeed_newline: bool,
    pub bracketed_paste: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            application_cursor: false,
            auto_wrap: true,
            insert_mode: false,
            linefeed_newline: false,
            bracketed_paste: false,
        }
    }
}
