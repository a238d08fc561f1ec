//! Playback ordering and the per-tick sequencing state machine.

use crate::error::PlmError;

/// Mode of the display loop, published to pollers as a raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackMode {
    Idle = 0,
    Playing = 1,
    Continuous = 2,
}

impl PlaybackMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackMode::Playing,
            2 => PlaybackMode::Continuous,
            _ => PlaybackMode::Idle,
        }
    }
}

/// Maps playback positions to frame-store slots.
///
/// Defaults to the identity order. Entries survive sequence restarts;
/// stale entries after a capacity change are folded back into range at
/// resolve time rather than trusted.
#[derive(Debug, Clone)]
pub struct PlaybackOrder {
    entries: Box<[u64]>,
}

impl PlaybackOrder {
    pub fn identity(capacity: usize) -> Self {
        Self {
            entries: (0..capacity as u64).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the leading entries, leaving the tail as it was.
    pub fn set_prefix(&mut self, sequence: &[u64]) -> Result<(), PlmError> {
        if sequence.len() > self.entries.len() {
            return Err(PlmError::SequenceTooLong {
                length: sequence.len(),
                capacity: self.entries.len(),
            });
        }
        self.entries[..sequence.len()].copy_from_slice(sequence);
        Ok(())
    }

    /// Points every position at one slot, so that frame holds on screen.
    pub fn fill(&mut self, slot: u64) {
        self.entries.fill(slot);
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Store slot for `position`, with both the position and the stored
    /// entry folded into range.
    pub fn resolve(&self, position: usize, capacity: usize) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        let entry = self.entries[position % self.entries.len()];
        entry as usize % capacity.max(1)
    }
}

/// What one tick displayed and signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Position in the playback order shown this tick.
    pub position: usize,
    /// Playing began this tick (the start-playing edge).
    pub started: bool,
    /// The sequence returned to Idle this tick.
    pub ended: bool,
}

/// Tick-driven playback state machine.
///
/// A countdown sequence of `n` frames runs through three phases. The
/// first active tick holds the current frame while the countdown starts,
/// so downstream capture hardware can be confirmed on the entry frame.
/// The second tick enters Playing: the index resets to 0, the camera
/// trigger rises, the buffer counter starts at 0 and `t0` is captured.
/// Each Playing tick then displays the current position, increments the
/// buffer counter and advances with the index clamped to the last slot.
/// One tick after the countdown runs out the machine returns to Idle,
/// clears the trigger and resets the buffer counter to -1.
///
/// Continuous mode free-runs over the whole order with the trigger held
/// and the index wrapping, until explicitly stopped.
pub struct PlaybackSequencer {
    capacity: usize,
    mode: PlaybackMode,
    sequence_active: bool,
    first_frame_held: bool,
    frames_in_sequence: i64,
    frames_remaining: i64,
    current_index: usize,
    buffer_index: i64,
    camera_trigger: bool,
    t0_micros: i64,
}

impl PlaybackSequencer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            mode: PlaybackMode::Idle,
            sequence_active: false,
            first_frame_held: false,
            frames_in_sequence: -1,
            frames_remaining: -1,
            current_index: 0,
            buffer_index: -1,
            camera_trigger: false,
            t0_micros: 0,
        }
    }

    /// Arms a countdown of `n` frames. Rejected, with no state change,
    /// when `n` exceeds the store capacity. Restarting an active
    /// sequence re-enters from the held tick.
    pub fn start_sequence(&mut self, n: usize) -> Result<(), PlmError> {
        if n > self.capacity {
            return Err(PlmError::SequenceTooLong {
                length: n,
                capacity: self.capacity,
            });
        }
        self.frames_in_sequence = n as i64;
        self.frames_remaining = n as i64;
        self.sequence_active = true;
        self.first_frame_held = true;
        self.mode = PlaybackMode::Idle;
        self.camera_trigger = false;
        self.buffer_index = -1;
        Ok(())
    }

    /// Free-runs the playback order until `stop` is called.
    pub fn start_continuous(&mut self, now_micros: i64) {
        self.sequence_active = false;
        self.first_frame_held = false;
        self.mode = PlaybackMode::Continuous;
        self.camera_trigger = true;
        self.buffer_index = -1;
        self.t0_micros = now_micros;
    }

    /// Forces the machine back to Idle. Returns whether anything was
    /// actually running.
    pub fn stop(&mut self) -> bool {
        let was_active = self.sequence_active || self.mode != PlaybackMode::Idle;
        self.sequence_active = false;
        self.first_frame_held = false;
        self.mode = PlaybackMode::Idle;
        self.camera_trigger = false;
        self.buffer_index = -1;
        self.frames_remaining = -1;
        was_active
    }

    /// Jumps the current position, used when a single frame is held on
    /// screen. The caller validates the index against capacity.
    pub fn set_current(&mut self, index: usize) {
        self.current_index = index;
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn camera_trigger(&self) -> bool {
        self.camera_trigger
    }

    pub fn buffer_index(&self) -> i64 {
        self.buffer_index
    }

    pub fn frames_in_sequence(&self) -> i64 {
        self.frames_in_sequence
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn t0_micros(&self) -> i64 {
        self.t0_micros
    }

    /// Runs one display tick and reports what it showed.
    pub fn tick(&mut self, now_micros: i64) -> TickReport {
        let mut started = false;
        let mut ended = false;
        let position;

        if self.sequence_active && self.frames_remaining < 0 {
            self.sequence_active = false;
            self.first_frame_held = false;
            self.mode = PlaybackMode::Idle;
            self.camera_trigger = false;
            self.buffer_index = -1;
            ended = true;
            position = self.current_index;
        } else if self.sequence_active && self.mode == PlaybackMode::Idle && self.first_frame_held {
            // Held tick: the countdown runs but the index stays put.
            self.first_frame_held = false;
            self.frames_remaining -= 1;
            position = self.current_index;
        } else if self.sequence_active && self.mode == PlaybackMode::Idle {
            self.mode = PlaybackMode::Playing;
            self.current_index = 0;
            self.camera_trigger = true;
            self.buffer_index = 0;
            self.t0_micros = now_micros;
            started = true;
            position = self.current_index;
            self.advance();
            self.frames_remaining -= 1;
        } else if self.mode == PlaybackMode::Playing {
            self.buffer_index += 1;
            position = self.current_index;
            self.advance();
            self.frames_remaining -= 1;
        } else if self.mode == PlaybackMode::Continuous {
            self.buffer_index += 1;
            position = self.current_index;
            self.current_index = if self.capacity == 0 {
                0
            } else {
                (self.current_index + 1) % self.capacity
            };
        } else {
            position = self.current_index;
        }

        TickReport {
            position,
            started,
            ended,
        }
    }

    fn advance(&mut self) {
        self.current_index = (self.current_index + 1).min(self.capacity.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observables(s: &PlaybackSequencer) -> (PlaybackMode, bool, i64, i64) {
        (
            s.mode(),
            s.camera_trigger(),
            s.buffer_index(),
            s.frames_in_sequence(),
        )
    }

    #[test]
    fn three_frame_sequence_trace() {
        let mut s = PlaybackSequencer::new(48);
        s.start_sequence(3).unwrap();

        // Held tick: entry frame repeats, trigger low, counter parked.
        let r = s.tick(100);
        assert_eq!((r.position, r.started, r.ended), (0, false, false));
        assert!(!s.camera_trigger());
        assert_eq!(s.buffer_index(), -1);

        // Playing begins: trigger rises, counter starts, t0 captured.
        let r = s.tick(200);
        assert_eq!((r.position, r.started, r.ended), (0, true, false));
        assert!(s.camera_trigger());
        assert_eq!(s.buffer_index(), 0);
        assert_eq!(s.t0_micros(), 200);

        let r = s.tick(300);
        assert_eq!((r.position, r.started, r.ended), (1, false, false));
        assert_eq!(s.buffer_index(), 1);

        let r = s.tick(400);
        assert_eq!((r.position, r.started, r.ended), (2, false, false));
        assert_eq!(s.buffer_index(), 2);

        // One further tick returns to Idle.
        let r = s.tick(500);
        assert!(r.ended);
        assert_eq!(s.mode(), PlaybackMode::Idle);
        assert!(!s.camera_trigger());
        assert_eq!(s.buffer_index(), -1);

        // Idle ticks change nothing.
        let r = s.tick(600);
        assert_eq!((r.started, r.ended), (false, false));
        assert_eq!(s.buffer_index(), -1);
    }

    #[test]
    fn oversized_sequence_is_rejected_without_state_change() {
        let mut s = PlaybackSequencer::new(4);
        let before = observables(&s);
        let err = s.start_sequence(5).unwrap_err();
        assert!(matches!(
            err,
            PlmError::SequenceTooLong {
                length: 5,
                capacity: 4
            }
        ));
        assert_eq!(observables(&s), before);
    }

    #[test]
    fn single_frame_sequence() {
        let mut s = PlaybackSequencer::new(8);
        s.start_sequence(1).unwrap();
        let r = s.tick(0);
        assert_eq!((r.position, r.started), (0, false));
        let r = s.tick(0);
        assert_eq!((r.position, r.started), (0, true));
        let r = s.tick(0);
        assert!(r.ended);
    }

    #[test]
    fn empty_sequence_ends_without_raising_the_trigger() {
        let mut s = PlaybackSequencer::new(8);
        s.start_sequence(0).unwrap();
        let r = s.tick(0);
        assert!(!r.started && !r.ended);
        assert!(!s.camera_trigger());
        let r = s.tick(0);
        assert!(r.ended);
        assert!(!s.camera_trigger());
        assert_eq!(s.buffer_index(), -1);
    }

    #[test]
    fn index_clamps_at_the_last_slot() {
        let mut s = PlaybackSequencer::new(3);
        s.start_sequence(3).unwrap();
        let positions: Vec<usize> = (0..4).map(|i| s.tick(i).position).collect();
        assert_eq!(positions, vec![0, 0, 1, 2]);
        // Clamped, not wrapped.
        assert_eq!(s.current_index(), 2);
    }

    #[test]
    fn restart_mid_sequence_re_enters_from_the_held_tick() {
        let mut s = PlaybackSequencer::new(8);
        s.start_sequence(4).unwrap();
        s.tick(0);
        s.tick(0);
        s.tick(0);
        assert_eq!(s.mode(), PlaybackMode::Playing);

        s.start_sequence(2).unwrap();
        assert!(!s.camera_trigger());
        assert_eq!(s.buffer_index(), -1);

        // Held tick shows the position playback had reached.
        let r = s.tick(0);
        assert_eq!((r.position, r.started), (2, false));
        let r = s.tick(0);
        assert_eq!((r.position, r.started), (0, true));
    }

    #[test]
    fn continuous_mode_wraps_and_counts_until_stopped() {
        let mut s = PlaybackSequencer::new(3);
        s.start_continuous(42);
        assert_eq!(s.t0_micros(), 42);
        assert!(s.camera_trigger());

        let positions: Vec<usize> = (0..7).map(|i| s.tick(i).position).collect();
        assert_eq!(positions, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(s.buffer_index(), 6);

        assert!(s.stop());
        assert_eq!(s.mode(), PlaybackMode::Idle);
        assert!(!s.camera_trigger());
        assert_eq!(s.buffer_index(), -1);
        assert!(!s.stop());
    }

    #[test]
    fn prefix_update_keeps_the_tail() {
        let mut order = PlaybackOrder::identity(5);
        order.set_prefix(&[4, 3]).unwrap();
        assert_eq!(order.entries(), &[4, 3, 2, 3, 4]);
        assert!(matches!(
            order.set_prefix(&[0; 6]),
            Err(PlmError::SequenceTooLong {
                length: 6,
                capacity: 5
            })
        ));
        // Rejection left the order untouched.
        assert_eq!(order.entries(), &[4, 3, 2, 3, 4]);
    }

    #[test]
    fn stale_entries_resolve_in_range() {
        let mut order = PlaybackOrder::identity(8);
        order.fill(7);
        // Capacity shrank after the order was built.
        assert_eq!(order.resolve(0, 4), 3);
        assert_eq!(order.resolve(11, 4), 3);
    }

    #[test]
    fn fill_pins_every_position_to_one_slot() {
        let mut order = PlaybackOrder::identity(4);
        order.fill(2);
        for position in 0..8 {
            assert_eq!(order.resolve(position, 4), 2);
        }
    }
}
