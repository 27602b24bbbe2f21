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
use midly::num::u7;

/// The first note of the default pad layout.
pub const DEFAULT_FIRST_PAD_NOTE: u8 = 36;

/// The number of pads in the default layout.
pub const DEFAULT_PAD_COUNT: usize = 16;

/// Maps pad indices to the notes they send. Pad 0 is the first note in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadMap {
    notes: Vec<u7>,
}

impl PadMap {
    pub fn new(notes: Vec<u7>) -> PadMap {
        PadMap { notes }
    }

    /// Returns the pad that sends the given note. When two pads share a note, the lower
    /// index wins.
    pub fn find(&self, note: u7) -> Option<usize> {
        self.notes.iter().position(|pad_note| *pad_note == note)
    }

    /// Returns the note for the given pad.
    pub fn note(&self, pad: usize) -> Option<u7> {
        self.notes.get(pad).copied()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl Default for PadMap {
    /// Sixteen pads starting at C1 (36), the usual layout for a 4x4 pad grid.
    fn default() -> Self {
        PadMap::new(
            (0..DEFAULT_PAD_COUNT)
                .map(|i| u7::from(DEFAULT_FIRST_PAD_NOTE + i as u8))
                .collect(),
        )
    }
}
