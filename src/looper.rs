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
//! The loop engine: records pad notes against a 24 PPQN clock and replays them in
//! lock-step with that clock.

use std::{
    fmt,
    time::{Duration, Instant},
};

use midly::num::{u4, u7};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

mod timeline;

pub use timeline::{LoopEvent, Timeline};

/// Clock pulses per quarter note.
pub const TICKS_PER_BEAT: u32 = 24;

/// Beats per bar. The looper always counts in 4/4.
pub const BEATS_PER_BAR: u32 = 4;

/// Clock pulses per bar.
pub const TICKS_PER_BAR: u32 = TICKS_PER_BEAT * BEATS_PER_BAR;

/// The default number of events a loop can hold.
pub const MAX_LOOP_EVENTS: usize = 256;

/// How long the last played pad stays lit after playback triggers it.
pub const DEFAULT_FEEDBACK_TIMEOUT: Duration = Duration::from_millis(100);

/// The collaborators the looper drives. Implementations are expected to absorb their
/// own failures; the looper never stops playback because of them.
pub trait Host {
    /// Sounds the given note.
    fn trigger_note(&mut self, note: u7, velocity: u7, channel: u4);

    /// Releases the given note. Must be safe to call for notes that aren't sounding.
    fn release_note(&mut self, note: u7, velocity: u7, channel: u4);

    /// Releases every note that might still be sounding.
    fn stop_all_notes(&mut self);

    /// The channel playback goes out on. Queried for every event so that routing
    /// changes take effect mid-loop.
    fn output_channel(&self) -> u4;

    /// The pad that plays the given note, if any.
    fn find_pad_for_note(&self, note: u7) -> Option<usize>;
}

/// The length of a loop.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopLength {
    #[default]
    OneBar,
    TwoBars,
    FourBars,
    /// The length is set by when the first recording pass is stopped.
    Free,
}

impl LoopLength {
    /// The length in ticks, or 0 for free length loops.
    pub fn ticks(&self) -> u32 {
        match self {
            LoopLength::OneBar => TICKS_PER_BAR,
            LoopLength::TwoBars => TICKS_PER_BAR * 2,
            LoopLength::FourBars => TICKS_PER_BAR * 4,
            LoopLength::Free => 0,
        }
    }

    /// The next length when cycling through the options.
    pub fn next(&self) -> LoopLength {
        match self {
            LoopLength::OneBar => LoopLength::TwoBars,
            LoopLength::TwoBars => LoopLength::FourBars,
            LoopLength::FourBars => LoopLength::Free,
            LoopLength::Free => LoopLength::OneBar,
        }
    }
}

impl fmt::Display for LoopLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopLength::OneBar => write!(f, "1 bar"),
            LoopLength::TwoBars => write!(f, "2 bars"),
            LoopLength::FourBars => write!(f, "4 bars"),
            LoopLength::Free => write!(f, "free"),
        }
    }
}

/// What the looper is doing with the clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Stopped,
    Recording,
    Playing,
    /// Recording while playing back.
    Overdubbing,
}

/// The externally visible looper state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Nothing recorded.
    Empty,
    /// The first pass is being recorded.
    Recording,
    Playing,
    Overdubbing,
    /// Content is recorded but the looper isn't running.
    Idle,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Empty => "empty",
            State::Recording => "recording",
            State::Playing => "playing",
            State::Overdubbing => "overdubbing",
            State::Idle => "idle",
        };
        write!(f, "{}", name)
    }
}

/// A read-only copy of the looper fields a renderer or LED driver polls each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub recording: bool,
    pub overdubbing: bool,
    /// Also true while overdubbing, as overdubbing plays back.
    pub playing: bool,
    pub has_content: bool,
    pub loop_length: LoopLength,
    /// The resolved loop length, 0 until known.
    pub loop_length_ticks: u32,
    pub current_tick: u32,
    pub event_count: usize,
    pub capacity: usize,
    pub last_played_pad: Option<usize>,
    pub last_played_at: Option<Instant>,
    pub last_record_tick: u32,
    pub last_record_note: Option<u7>,
    pub last_record_at: Option<Instant>,
}

impl Snapshot {
    /// Derives the looper state from the flags.
    pub fn state(&self) -> State {
        if self.recording {
            State::Recording
        } else if self.overdubbing {
            State::Overdubbing
        } else if self.playing {
            State::Playing
        } else if self.has_content {
            State::Idle
        } else {
            State::Empty
        }
    }
}

/// The loop engine. A single owner drives it with clock ticks, note records and
/// commands; none of its operations block.
pub struct Looper {
    mode: Mode,
    /// Sticky until cleared.
    has_content: bool,
    loop_length: LoopLength,
    loop_length_ticks: u32,
    current_tick: u32,
    /// Index of the next timeline event due to fire.
    playback_cursor: usize,
    /// Set while playback events are being emitted so they aren't recorded again.
    is_replaying: bool,
    timeline: Timeline,
    feedback_timeout: Duration,
    last_played_pad: Option<usize>,
    last_played_at: Option<Instant>,
    last_record_tick: u32,
    last_record_note: Option<u7>,
    last_record_at: Option<Instant>,
}

impl Looper {
    /// Creates an empty looper.
    pub fn new(loop_length: LoopLength, capacity: usize, feedback_timeout: Duration) -> Looper {
        Looper {
            mode: Mode::Stopped,
            has_content: false,
            loop_length,
            loop_length_ticks: 0,
            current_tick: 0,
            playback_cursor: 0,
            is_replaying: false,
            timeline: Timeline::with_capacity(capacity),
            feedback_timeout,
            last_played_pad: None,
            last_played_at: None,
            last_record_tick: 0,
            last_record_note: None,
            last_record_at: None,
        }
    }

    /// Records a note on at the current tick. Returns false if the event was not
    /// recorded, which happens outside of recording and overdubbing, during playback
    /// emission, or when the timeline is full.
    pub fn record_note_on(&mut self, note: u7, velocity: u7, now: Instant) -> bool {
        let recorded = self.record(LoopEvent::note_on(self.current_tick, note, velocity));
        if recorded {
            self.last_record_at = Some(now);
            self.last_record_tick = self.current_tick;
            self.last_record_note = Some(note);
        }
        recorded
    }

    /// Records a note off at the current tick. See [Looper::record_note_on].
    pub fn record_note_off(&mut self, note: u7, velocity: u7) -> bool {
        self.record(LoopEvent::note_off(self.current_tick, note, velocity))
    }

    fn record(&mut self, event: LoopEvent) -> bool {
        if !matches!(self.mode, Mode::Recording | Mode::Overdubbing) {
            return false;
        }
        if self.is_replaying {
            trace!(event = %event, "Ignoring playback event.");
            return false;
        }
        if !self.timeline.insert(event) {
            debug!(
                event = %event,
                capacity = self.timeline.capacity(),
                "Loop is full, dropping event."
            );
            return false;
        }

        trace!(event = %event, count = self.timeline.len(), "Recorded event.");
        true
    }

    /// Advances the looper by one clock pulse, firing any events due at the current
    /// tick first.
    pub fn clock_tick(&mut self, host: &mut dyn Host, now: Instant) {
        if self.mode == Mode::Stopped {
            return;
        }

        if matches!(self.mode, Mode::Playing | Mode::Overdubbing) {
            self.is_replaying = true;
            while let Some(event) = self.timeline.get(self.playback_cursor).copied() {
                if event.tick() != self.current_tick {
                    break;
                }

                let channel = host.output_channel();
                if event.is_note_off() {
                    host.release_note(event.note(), event.velocity(), channel);
                } else {
                    host.trigger_note(event.note(), event.velocity(), channel);
                    self.last_played_pad = host.find_pad_for_note(event.note());
                    self.last_played_at = Some(now);
                }
                self.playback_cursor += 1;
            }
            self.is_replaying = false;
        }

        self.current_tick += 1;

        // A free length loop stays open until the first pass is stopped.
        if self.mode == Mode::Recording && self.loop_length_ticks == 0 {
            return;
        }

        if self.loop_length_ticks > 0 && self.current_tick >= self.loop_length_ticks {
            self.current_tick = 0;
            self.playback_cursor = 0;

            if self.mode == Mode::Recording {
                self.mode = Mode::Overdubbing;
                self.has_content = true;
                info!(
                    ticks = self.loop_length_ticks,
                    events = self.timeline.len(),
                    "First pass complete, overdubbing."
                );
            }
        }
    }

    /// Steps through record, overdub and play. Returns the resulting state.
    pub fn toggle_record(&mut self) -> State {
        match self.mode {
            Mode::Stopped if !self.has_content => {
                self.timeline.clear();
                self.current_tick = 0;
                self.playback_cursor = 0;
                self.loop_length_ticks = self.loop_length.ticks();
                self.mode = Mode::Recording;
            }
            Mode::Recording => self.finish_first_pass(Mode::Playing),
            Mode::Playing => self.mode = Mode::Overdubbing,
            Mode::Overdubbing => self.mode = Mode::Playing,
            Mode::Stopped => self.play_from_start(),
        }

        let state = self.state();
        info!(
            state = %state,
            length = %self.loop_length,
            ticks = self.loop_length_ticks,
            "Looper toggled."
        );
        state
    }

    /// Stops the looper, keeping anything recorded. A first pass in progress is
    /// finished as if toggled. Sounding notes are released.
    pub fn stop(&mut self, host: &mut dyn Host) -> State {
        match self.mode {
            Mode::Stopped => return self.state(),
            Mode::Recording => self.finish_first_pass(Mode::Stopped),
            Mode::Playing | Mode::Overdubbing => {
                self.mode = Mode::Stopped;
                self.current_tick = 0;
                self.playback_cursor = 0;
            }
        }
        host.stop_all_notes();

        let state = self.state();
        info!(state = %state, "Looper stopped.");
        state
    }

    /// Starts playback from the top of the loop. Idle loops resume and running loops
    /// are realigned; empty or recording loops are unaffected.
    pub fn start(&mut self) -> State {
        match self.mode {
            Mode::Stopped if self.has_content => self.play_from_start(),
            Mode::Playing | Mode::Overdubbing => {
                self.current_tick = 0;
                self.playback_cursor = 0;
            }
            _ => {}
        }
        self.state()
    }

    /// Wipes the loop and returns to the empty state, releasing any sounding notes.
    pub fn clear(&mut self, host: &mut dyn Host) {
        self.reset();
        host.stop_all_notes();
        info!("Looper cleared.");
    }

    /// Changes the loop length. The new length applies to the next fresh recording.
    pub fn set_loop_length(&mut self, loop_length: LoopLength) {
        self.loop_length = loop_length;
        info!(length = %loop_length, "Loop length set.");
    }

    /// Idle housekeeping. Clears the last played pad once the feedback timeout passes.
    pub fn update(&mut self, now: Instant) {
        if let (Some(_), Some(played_at)) = (self.last_played_pad, self.last_played_at) {
            if now.saturating_duration_since(played_at) > self.feedback_timeout {
                self.last_played_pad = None;
            }
        }
    }

    fn finish_first_pass(&mut self, next: Mode) {
        if self.timeline.is_empty() {
            self.reset();
            return;
        }

        if self.loop_length_ticks == 0 {
            let closed_at = if self.current_tick > 0 {
                self.current_tick
            } else {
                TICKS_PER_BAR
            };
            // Events recorded after the last pulse sit at the closing tick and must
            // still land inside the loop.
            let last_event = self.timeline.last().map_or(0, |event| event.tick() + 1);
            self.loop_length_ticks = closed_at.max(last_event);
        }
        self.has_content = true;
        self.mode = next;
        self.current_tick = 0;
        self.playback_cursor = 0;
    }

    fn play_from_start(&mut self) {
        self.mode = Mode::Playing;
        self.current_tick = 0;
        self.playback_cursor = 0;
    }

    fn reset(&mut self) {
        self.mode = Mode::Stopped;
        self.has_content = false;
        self.loop_length_ticks = 0;
        self.current_tick = 0;
        self.playback_cursor = 0;
        self.is_replaying = false;
        self.timeline.clear();
        self.last_played_pad = None;
        self.last_played_at = None;
        self.last_record_tick = 0;
        self.last_record_note = None;
        self.last_record_at = None;
    }

    pub fn state(&self) -> State {
        self.snapshot().state()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            recording: self.mode == Mode::Recording,
            overdubbing: self.mode == Mode::Overdubbing,
            playing: matches!(self.mode, Mode::Playing | Mode::Overdubbing),
            has_content: self.has_content,
            loop_length: self.loop_length,
            loop_length_ticks: self.loop_length_ticks,
            current_tick: self.current_tick,
            event_count: self.timeline.len(),
            capacity: self.timeline.capacity(),
            last_played_pad: self.last_played_pad,
            last_played_at: self.last_played_at,
            last_record_tick: self.last_record_tick,
            last_record_note: self.last_record_note,
            last_record_at: self.last_record_at,
        }
    }

    /// The recorded events in playback order.
    pub fn events(&self) -> &[LoopEvent] {
        self.timeline.events()
    }

    pub fn loop_length(&self) -> LoopLength {
        self.loop_length
    }

    pub fn loop_length_ticks(&self) -> u32 {
        self.loop_length_ticks
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    pub fn last_played_pad(&self) -> Option<usize> {
        self.last_played_pad
    }
}

impl Default for Looper {
    fn default() -> Self {
        Looper::new(
            LoopLength::default(),
            MAX_LOOP_EVENTS,
            DEFAULT_FEEDBACK_TIMEOUT,
        )
    }
}
