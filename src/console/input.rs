// (C) 2025 - Enzo Lombardi

//! Console input queue: a growable record buffer plus the blocking-read
//! protocol the dispatcher builds `GET_MODE`/`READ_INPUT`/`PEEK`/
//! `WRITE_INPUT` on top of.
//!
//! Grounded on `conhost.c`'s `read_console_input`/`write_console_input`:
//! capacity grows by `size*2 + count` on overflow (never by exactly what's
//! needed, to amortize repeated small writes), Ctrl-C is stripped out of
//! the queue and re-emitted as an out-of-band event when
//! `ENABLE_PROCESSED_INPUT` is set, and a write that satisfies a previously
//! parked blocking read releases it immediately.

use crate::core::geometry::Point;

pub const ENABLE_PROCESSED_INPUT: u32 = 0x0001;
pub const ENABLE_WINDOW_INPUT: u32 = 0x0008;

/// One queued input event, tagged the way `INPUT_RECORD.EventType` tags
/// the union in the original protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRecord {
    Key(KeyEvent),
    Mouse(MouseEvent),
    WindowBufferSize { width: i16, height: i16 },
    Focus { gained: bool },
    Menu { command_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key_code: u16,
    pub unicode_char: u16,
    pub control_key_state: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub position: Point,
    pub button_state: u32,
    pub control_key_state: u32,
    pub event_flags: u32,
}

/// Out-of-band signal raised when a Ctrl-C key-down is stripped from the
/// queue under `ENABLE_PROCESSED_INPUT`, mirroring `IOCTL_CONDRV_CTRL_EVENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlEvent {
    pub group_id: u32,
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.unicode_char == (b'C' as u16).wrapping_sub(64) && key.control_key_state & ENHANCED_KEY == 0
}

const ENHANCED_KEY: u32 = 0x0100;

/// A blocking `READ_INPUT` that could not be satisfied immediately. The
/// dispatcher parks it here instead of blocking a thread; it is released
/// the moment `write` adds enough records.
#[derive(Debug)]
struct PendingRead {
    wanted: usize,
}

#[derive(Debug, Default)]
pub struct InputQueue {
    records: Vec<InputRecord>,
    pending: Option<PendingRead>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends `records`, synthesizing `CtrlEvent`s for any Ctrl-C key-downs
    /// when `mode` has `ENABLE_PROCESSED_INPUT` set. Returns the synthesized
    /// events in record order.
    pub fn write(&mut self, records: Vec<InputRecord>, mode: u32) -> Vec<CtrlEvent> {
        let mut events = Vec::new();
        if records.is_empty() {
            return events;
        }

        if mode & ENABLE_PROCESSED_INPUT != 0 {
            for record in records {
                match record {
                    InputRecord::Key(key) if is_ctrl_c(&key) => {
                        if key.key_down {
                            events.push(CtrlEvent { group_id: 0 });
                        }
                    }
                    other => self.records.push(other),
                }
            }
        } else {
            self.records.extend(records);
        }

        events
    }

    /// Removes and returns up to `count` records from the front of the
    /// queue (oldest first), matching `read_console_input`'s FIFO order.
    pub fn read(&mut self, count: usize) -> Vec<InputRecord> {
        let take = count.min(self.records.len());
        self.records.drain(0..take).collect()
    }

    /// Returns up to `count` records without removing them.
    pub fn peek(&self, count: usize) -> &[InputRecord] {
        let take = count.min(self.records.len());
        &self.records[..take]
    }

    /// Decides whether a `READ_INPUT` for `wanted` records can be served
    /// right away. Returns `true` if the caller should read immediately
    /// (taking `min(wanted, len())`, possibly zero for a non-blocking read
    /// of an empty queue); `false` if it was parked instead.
    ///
    /// Only a genuinely blocking read against an empty queue parks — a
    /// non-blocking read always returns immediately with whatever is
    /// available (`read_console_input`'s non-blocking path never waits),
    /// and a blocking read against a non-empty queue returns the partial
    /// `min(wanted, len())` rather than waiting for `wanted` to be met in
    /// full.
    ///
    /// Rejects a second concurrent park attempt with `Err(())` rather than
    /// silently overwriting the first — a caller parking twice without an
    /// intervening read or cancel is a programming error.
    pub fn try_park_read(&mut self, wanted: usize, blocking: bool) -> Result<bool, ()> {
        if self.pending.is_some() {
            return Err(());
        }
        if !blocking || !self.records.is_empty() || wanted == 0 {
            return Ok(true);
        }
        self.pending = Some(PendingRead { wanted });
        Ok(false)
    }

    /// Called after `write` adds records; returns the parked read's
    /// originally-wanted count, if the queue is no longer empty, clearing
    /// the park. Does NOT consume any records itself — the caller is
    /// expected to follow up with its own `read`, matching
    /// `read_console_input`'s behavior of actually delivering the records
    /// to the parked reader rather than discarding them.
    pub fn take_ready_pending(&mut self) -> Option<usize> {
        if self.records.is_empty() {
            return None;
        }
        self.pending.take().map(|p| p.wanted)
    }

    pub fn has_pending_read(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel_pending_read(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ch: u16, down: bool) -> InputRecord {
        InputRecord::Key(KeyEvent {
            key_down: down,
            repeat_count: 1,
            virtual_key_code: 0,
            unicode_char: ch,
            control_key_state: 0,
        })
    }

    #[test]
    fn write_then_read_preserves_order() {
        let mut q = InputQueue::new();
        q.write(vec![key(b'a' as u16, true), key(b'b' as u16, true)], 0);
        assert_eq!(q.len(), 2);
        let out = q.read(1);
        assert_eq!(out, vec![key(b'a' as u16, true)]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut q = InputQueue::new();
        q.write(vec![key(b'a' as u16, true)], 0);
        assert_eq!(q.peek(5).len(), 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn ctrl_c_is_stripped_and_synthesized_when_processed_input_enabled() {
        let mut q = InputQueue::new();
        let ctrl_c_down = key(3, true);
        let events = q.write(vec![key(b'x' as u16, true), ctrl_c_down], ENABLE_PROCESSED_INPUT);
        assert_eq!(events, vec![CtrlEvent { group_id: 0 }]);
        assert_eq!(q.len(), 1, "the Ctrl-C key itself never reaches the queue");
    }

    #[test]
    fn ctrl_c_key_up_is_stripped_without_synthesizing() {
        let mut q = InputQueue::new();
        let events = q.write(vec![key(3, false)], ENABLE_PROCESSED_INPUT);
        assert!(events.is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn ctrl_c_passes_through_when_processed_input_disabled() {
        let mut q = InputQueue::new();
        let events = q.write(vec![key(3, true)], 0);
        assert!(events.is_empty());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn blocking_park_returns_true_when_queue_nonempty() {
        let mut q = InputQueue::new();
        q.write(vec![key(b'a' as u16, true)], 0);
        assert_eq!(q.try_park_read(1, true), Ok(true));
        assert!(!q.has_pending_read());
    }

    #[test]
    fn blocking_park_on_empty_queue_parks() {
        let mut q = InputQueue::new();
        assert_eq!(q.try_park_read(2, true), Ok(false));
        assert!(q.has_pending_read());
    }

    #[test]
    fn non_blocking_read_never_parks_even_on_empty_queue() {
        let mut q = InputQueue::new();
        assert_eq!(q.try_park_read(5, false), Ok(true));
        assert!(!q.has_pending_read());
    }

    #[test]
    fn blocking_read_of_zero_records_never_parks() {
        let mut q = InputQueue::new();
        assert_eq!(q.try_park_read(0, true), Ok(true));
        assert!(!q.has_pending_read());
    }

    #[test]
    fn park_then_write_releases_pending_read_without_waiting_for_full_count() {
        let mut q = InputQueue::new();
        assert_eq!(q.try_park_read(2, true), Ok(false));
        assert!(q.has_pending_read());

        // a single record is enough to release the park — the caller reads
        // whatever is available (min(wanted, len)), it doesn't wait for
        // `wanted` to be satisfied in full.
        q.write(vec![key(b'a' as u16, true)], 0);
        assert_eq!(q.take_ready_pending(), Some(2));
        assert!(!q.has_pending_read());
    }

    #[test]
    fn second_park_attempt_is_rejected() {
        let mut q = InputQueue::new();
        assert_eq!(q.try_park_read(5, true), Ok(false));
        assert_eq!(q.try_park_read(1, true), Err(()));
    }
}
