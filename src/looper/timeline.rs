// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use midly::num::u7;

/// A single recorded performance action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopEvent {
    /// Position of the event within the loop.
    tick: u32,
    /// The MIDI note.
    note: u7,
    /// The note velocity.
    velocity: u7,
    /// True if this event releases the note.
    is_note_off: bool,
}

impl LoopEvent {
    /// Creates a note on event at the given tick.
    pub fn note_on(tick: u32, note: u7, velocity: u7) -> LoopEvent {
        LoopEvent {
            tick,
            note,
            velocity,
            is_note_off: false,
        }
    }

    /// Creates a note off event at the given tick.
    pub fn note_off(tick: u32, note: u7, velocity: u7) -> LoopEvent {
        LoopEvent {
            tick,
            note,
            velocity,
            is_note_off: true,
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn note(&self) -> u7 {
        self.note
    }

    pub fn velocity(&self) -> u7 {
        self.velocity
    }

    pub fn is_note_off(&self) -> bool {
        self.is_note_off
    }
}

impl fmt::Display for LoopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} note={} vel={}",
            if self.is_note_off { "off" } else { "on" },
            self.tick,
            self.note.as_int(),
            self.velocity.as_int()
        )
    }
}

/// A fixed capacity list of loop events, always sorted by tick. Events that share a
/// tick keep the order in which they were inserted so that chords replay as recorded.
/// Storage is allocated once up front and never grows.
pub struct Timeline {
    events: Vec<LoopEvent>,
    capacity: usize,
}

impl Timeline {
    /// Creates an empty timeline that can hold up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Timeline {
        Timeline {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts the event after every event with an equal or earlier tick. Returns false
    /// and leaves the timeline untouched if it is already full.
    pub fn insert(&mut self, event: LoopEvent) -> bool {
        if self.is_full() {
            return false;
        }

        let position = self
            .events
            .partition_point(|existing| existing.tick <= event.tick);
        self.events.insert(position, event);
        true
    }

    /// Returns the event at the given index, if it's populated.
    pub fn get(&self, index: usize) -> Option<&LoopEvent> {
        self.events.get(index)
    }

    /// The event with the latest tick.
    pub fn last(&self) -> Option<&LoopEvent> {
        self.events.last()
    }

    /// Removes all events. The capacity is retained.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// The valid events in tick order.
    pub fn events(&self) -> &[LoopEvent] {
        &self.events
    }

    /// The number of valid events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod test {
    use midly::num::u7;

    use super::{LoopEvent, Timeline};

    fn on(tick: u32, note: u8) -> LoopEvent {
        LoopEvent::note_on(tick, u7::from(note), u7::from(100))
    }

    #[test]
    fn test_insert_keeps_tick_order() {
        let mut timeline = Timeline::with_capacity(8);
        assert!(timeline.insert(on(40, 1)));
        assert!(timeline.insert(on(10, 2)));
        assert!(timeline.insert(on(95, 3)));
        assert!(timeline.insert(on(0, 4)));

        let ticks: Vec<u32> = timeline.events().iter().map(|e| e.tick()).collect();
        assert_eq!(vec![0, 10, 40, 95], ticks);
    }

    #[test]
    fn test_equal_ticks_keep_insertion_order() {
        let mut timeline = Timeline::with_capacity(8);
        timeline.insert(on(12, 60));
        timeline.insert(on(5, 1));
        timeline.insert(on(12, 64));
        timeline.insert(on(20, 2));
        timeline.insert(on(12, 67));

        let notes: Vec<u8> = timeline
            .events()
            .iter()
            .map(|e| e.note().as_int())
            .collect();
        assert_eq!(vec![1, 60, 64, 67, 2], notes);
    }

    #[test]
    fn test_full_timeline_drops_event() {
        let mut timeline = Timeline::with_capacity(2);
        assert!(timeline.insert(on(3, 1)));
        assert!(timeline.insert(on(7, 2)));
        assert!(timeline.is_full());
        assert!(!timeline.insert(on(0, 3)));

        assert_eq!(2, timeline.len());
        assert_eq!(vec![on(3, 1), on(7, 2)], timeline.events().to_vec());
    }

    #[test]
    fn test_clear() {
        let mut timeline = Timeline::with_capacity(4);
        timeline.insert(on(1, 1));
        timeline.clear();
        assert!(timeline.is_empty());
        assert!(timeline.get(0).is_none());
        assert_eq!(4, timeline.capacity());
    }

    #[test]
    fn test_display() {
        let event = LoopEvent::note_off(20, u7::from(60), u7::from(64));
        assert_eq!("off@20 note=60 vel=64", event.to_string());
    }
}
