// (C) 2025 - Enzo Lombardi

//! Console-wide command-line history ring.
//!
//! Mirrors `struct console`'s `history`/`history_size`/`history_index`/
//! `history_mode` fields in `conhost.c`: one ring shared by the whole
//! console (not per-control, unlike a widget toolkit's history lists),
//! capped at `history_size` entries, with `history_mode` gating duplicate
//! suppression the way `SET_CONSOLE_INPUT_INFO_HISTORY_MODE` describes
//! ("non zero means remove doubled strings").

/// `true` means a newly-added line that duplicates an existing one replaces
/// it (moved to the front) instead of being stored twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryMode(pub bool);

#[derive(Debug, Clone, Default)]
pub struct HistoryRing {
    lines: Vec<String>,
    capacity: usize,
    mode: HistoryMode,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Vec::new(),
            capacity,
            mode: HistoryMode::default(),
        }
    }

    pub fn set_mode(&mut self, mode: HistoryMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Most-recent-first view of the stored lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().rev().map(|s| s.as_str())
    }

    /// Appends a line, honoring `history_mode` dedup and the capacity cap.
    ///
    /// Lines are stored oldest-first internally; `lines()` and `get()`
    /// present them most-recent-first, matching how a console replays
    /// history on the up-arrow.
    pub fn add(&mut self, line: String) {
        if line.is_empty() || self.capacity == 0 {
            return;
        }

        if self.mode.0 {
            if let Some(pos) = self.lines.iter().position(|existing| existing == &line) {
                self.lines.remove(pos);
            }
        }

        self.lines.push(line);
        if self.lines.len() > self.capacity {
            let overflow = self.lines.len() - self.capacity;
            self.lines.drain(0..overflow);
        }
    }

    pub fn get(&self, index_from_most_recent: usize) -> Option<&str> {
        self.lines
            .len()
            .checked_sub(1 + index_from_most_recent)
            .and_then(|idx| self.lines.get(idx))
            .map(|s| s.as_str())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Resizes the ring in place, matching `set_output_info`'s
    /// `SET_CONSOLE_INPUT_INFO_HISTORY_SIZE` handling: the newest
    /// `new_capacity` lines survive, oldest are dropped first.
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity < self.lines.len() {
            let overflow = self.lines.len() - new_capacity;
            self.lines.drain(0..overflow);
        }
        self.capacity = new_capacity;
    }
}
