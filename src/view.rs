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
//! Layout numbers for the 128x64 timeline screen. Nothing here draws; a renderer turns
//! the view into pixels and the controller logs its one-line form.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::looper::{LoopEvent, Snapshot, TICKS_PER_BEAT};

/// Screen width in pixels.
pub const SCREEN_WIDTH: u32 = 128;

/// Width of one character of status text.
pub const CHAR_WIDTH: u32 = 6;

/// Leftmost x of the timeline area.
pub const TIMELINE_LEFT: u32 = 4;

/// Rightmost x of the timeline area.
pub const TIMELINE_RIGHT: u32 = 124;

const TIMELINE_WIDTH: u32 = TIMELINE_RIGHT - TIMELINE_LEFT;

/// The lowest row a note dot sits on. Higher notes sit above it.
const NOTE_BOTTOM: u32 = 47;

/// Notes fold into three octaves.
const NOTE_RANGE: u32 = 36;

/// How long a freshly recorded note pulses.
pub const RECENT_NOTE_WINDOW: Duration = Duration::from_millis(400);

const REC_BLINK: Duration = Duration::from_millis(250);
const OVERDUB_BLINK: Duration = Duration::from_millis(300);

/// A recorded note-on on the timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteDot {
    pub x: u32,
    pub y: u32,
    /// This is the note that was just recorded.
    pub recent: bool,
    /// Ring radius for the recent note animation, cycling 2..=5 every 50 ms.
    pub pulse: Option<u32>,
}

/// Everything the timeline screen shows for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineView {
    pub status_text: &'static str,
    /// x that centres the status text.
    pub status_x: u32,
    pub total_beats: u32,
    pub current_beat: u32,
    /// x of each beat marker, including both ends of the loop.
    pub beat_markers: Vec<u32>,
    pub notes: Vec<NoteDot>,
    pub note_count: usize,
    pub playhead_x: Option<u32>,
}

impl TimelineView {
    /// Lays out a frame. `uptime` drives the blinking status text and `now` is compared
    /// against the last record time for the recent note pulse.
    pub fn new(
        snapshot: &Snapshot,
        events: &[LoopEvent],
        uptime: Duration,
        now: Instant,
    ) -> TimelineView {
        let status_text = status_text(snapshot, uptime);
        let total_beats = snapshot.loop_length_ticks / TICKS_PER_BEAT;
        let current_beat = snapshot.current_tick / TICKS_PER_BEAT + 1;

        let beat_markers = if total_beats > 0 {
            (0..=total_beats)
                .map(|b| TIMELINE_LEFT + b * TIMELINE_WIDTH / total_beats)
                .collect()
        } else {
            Vec::new()
        };

        // While a free length loop is still open, spread dots over what's been recorded.
        let span = if snapshot.loop_length_ticks > 0 {
            snapshot.loop_length_ticks
        } else {
            snapshot.current_tick.max(1)
        };

        let since_record = snapshot
            .last_record_at
            .map(|at| now.saturating_duration_since(at));
        let flashing = since_record.filter(|since| *since < RECENT_NOTE_WINDOW);

        let notes: Vec<NoteDot> = events
            .iter()
            .filter(|event| !event.is_note_off())
            .map(|event| {
                let note = u32::from(event.note().as_int());
                let recent = flashing.is_some()
                    && event.tick() == snapshot.last_record_tick
                    && Some(event.note()) == snapshot.last_record_note;
                NoteDot {
                    x: timeline_x(event.tick(), span),
                    y: NOTE_BOTTOM - (note % NOTE_RANGE) * 33 / 35,
                    recent,
                    pulse: flashing
                        .filter(|_| recent)
                        .map(|since| 2 + (since.as_millis() / 50 % 4) as u32),
                }
            })
            .collect();

        let running = snapshot.playing || snapshot.recording || snapshot.overdubbing;
        let playhead_x = (snapshot.loop_length_ticks > 0 && running)
            .then(|| timeline_x(snapshot.current_tick, snapshot.loop_length_ticks));

        TimelineView {
            status_text,
            status_x: (SCREEN_WIDTH / 2).saturating_sub(status_text.len() as u32 * CHAR_WIDTH / 2),
            total_beats,
            current_beat,
            beat_markers,
            note_count: notes.len(),
            notes,
            playhead_x,
        }
    }
}

fn status_text(snapshot: &Snapshot, uptime: Duration) -> &'static str {
    let blink_on = |period: Duration| (uptime.as_millis() / period.as_millis()) % 2 == 1;

    if snapshot.recording {
        if blink_on(REC_BLINK) {
            "* REC *"
        } else {
            ""
        }
    } else if snapshot.overdubbing {
        if blink_on(OVERDUB_BLINK) {
            "OVERDUB"
        } else {
            ""
        }
    } else if snapshot.playing {
        "PLAYING"
    } else if snapshot.has_content {
        "STOPPED"
    } else {
        ""
    }
}

fn timeline_x(tick: u32, span: u32) -> u32 {
    let x = u64::from(TIMELINE_LEFT) + u64::from(tick) * u64::from(TIMELINE_WIDTH) / u64::from(span);
    x.clamp(u64::from(TIMELINE_LEFT), u64::from(TIMELINE_RIGHT)) as u32
}

impl fmt::Display for TimelineView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.status_text.is_empty() {
            "-"
        } else {
            self.status_text
        };
        write!(
            f,
            "[{}] beat {}/{}, {} notes",
            status, self.current_beat, self.total_beats, self.note_count
        )?;
        if let Some(x) = self.playhead_x {
            write!(f, ", playhead at {}", x)?;
        }
        Ok(())
    }
}
