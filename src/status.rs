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
use std::{fmt, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use tracing::{debug, error, info};

use crate::{looper::State, midi::Device, pads::PadMap};

/// Indicator colours as 0xRRGGBB.
pub const OFF_COLOR: u32 = 0x000000;
pub const RECORDING_COLOR: u32 = 0xFF0000;
pub const PLAYING_COLOR: u32 = 0x00FF00;
pub const OVERDUBBING_COLOR: u32 = 0xFF6600;
pub const IDLE_COLOR: u32 = 0xFF00FF;

/// What the looper status light shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indicator {
    Off,
    Recording,
    Playing,
    Overdubbing,
    Idle,
}

impl Indicator {
    pub fn from_state(state: State) -> Indicator {
        match state {
            State::Empty => Indicator::Off,
            State::Recording => Indicator::Recording,
            State::Playing => Indicator::Playing,
            State::Overdubbing => Indicator::Overdubbing,
            State::Idle => Indicator::Idle,
        }
    }

    pub fn color(&self) -> u32 {
        match self {
            Indicator::Off => OFF_COLOR,
            Indicator::Recording => RECORDING_COLOR,
            Indicator::Playing => PLAYING_COLOR,
            Indicator::Overdubbing => OVERDUBBING_COLOR,
            Indicator::Idle => IDLE_COLOR,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (#{:06X})", self, self.color())
    }
}

/// MIDI events to emit when the indicator changes, e.g. to light a button on the controller.
#[derive(Clone, Debug, Default)]
pub struct StatusEvents {
    pub off: Vec<LiveEvent<'static>>,
    pub recording: Vec<LiveEvent<'static>>,
    pub playing: Vec<LiveEvent<'static>>,
    pub overdubbing: Vec<LiveEvent<'static>>,
    pub idle: Vec<LiveEvent<'static>>,
}

impl StatusEvents {
    pub fn events(&self, indicator: Indicator) -> &[LiveEvent<'static>] {
        match indicator {
            Indicator::Off => &self.off,
            Indicator::Recording => &self.recording,
            Indicator::Playing => &self.playing,
            Indicator::Overdubbing => &self.overdubbing,
            Indicator::Idle => &self.idle,
        }
    }
}

/// Tracks the indicator and emits status events on change.
pub struct StatusLight {
    device: Arc<dyn Device>,
    events: StatusEvents,
    current: Option<Indicator>,
}

impl StatusLight {
    pub fn new(device: Arc<dyn Device>, events: StatusEvents) -> StatusLight {
        StatusLight {
            device,
            events,
            current: None,
        }
    }

    pub fn current(&self) -> Option<Indicator> {
        self.current
    }

    /// Updates the indicator for the given state. Returns true if it changed.
    pub fn update(&mut self, state: State) -> bool {
        let indicator = Indicator::from_state(state);
        if self.current == Some(indicator) {
            return false;
        }

        info!(indicator = %indicator, "Status changed.");
        self.current = Some(indicator);
        for event in self.events.events(indicator) {
            if let Err(e) = self.device.emit(*event) {
                error!(err = %e, "Error emitting status event.");
            }
        }
        true
    }
}

/// How pads are lit when playback triggers them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PadFeedback {
    pub channel: u4,
    pub velocity: u7,
}

/// Lights the pad that playback last triggered and unlights it when the looper lets go.
pub struct PadLight {
    device: Arc<dyn Device>,
    pads: PadMap,
    feedback: PadFeedback,
    lit: Option<usize>,
}

impl PadLight {
    pub fn new(device: Arc<dyn Device>, pads: PadMap, feedback: PadFeedback) -> PadLight {
        PadLight {
            device,
            pads,
            feedback,
            lit: None,
        }
    }

    pub fn lit(&self) -> Option<usize> {
        self.lit
    }

    /// Lights the given pad, or none. Returns true if the lit pad changed.
    pub fn update(&mut self, pad: Option<usize>) -> bool {
        if self.lit == pad {
            return false;
        }

        if let Some(key) = self.lit.and_then(|lit| self.pads.note(lit)) {
            self.emit(MidiMessage::NoteOff {
                key,
                vel: u7::from(0),
            });
        }
        if let Some(key) = pad.and_then(|pad| self.pads.note(pad)) {
            self.emit(MidiMessage::NoteOn {
                key,
                vel: self.feedback.velocity,
            });
        }

        debug!(from = ?self.lit, to = ?pad, "Pad light changed.");
        self.lit = pad;
        true
    }

    fn emit(&self, message: MidiMessage) {
        let event = LiveEvent::Midi {
            channel: self.feedback.channel,
            message,
        };
        if let Err(e) = self.device.emit(event) {
            error!(err = %e, "Error emitting pad feedback.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use midly::{live::LiveEvent, MidiMessage};

    use super::*;
    use crate::midi;

    fn note_on(key: u8) -> LiveEvent<'static> {
        LiveEvent::Midi {
            channel: 15.into(),
            message: MidiMessage::NoteOn {
                key: key.into(),
                vel: 127.into(),
            },
        }
    }

    #[test]
    fn indicator_colors() {
        assert_eq!(Indicator::Off, Indicator::from_state(State::Empty));
        assert_eq!(0xFF0000, Indicator::from_state(State::Recording).color());
        assert_eq!(0x00FF00, Indicator::from_state(State::Playing).color());
        assert_eq!(0xFF6600, Indicator::from_state(State::Overdubbing).color());
        assert_eq!(0xFF00FF, Indicator::from_state(State::Idle).color());
        assert_eq!(0, Indicator::Off.color());
        assert_eq!("Overdubbing (#FF6600)", Indicator::Overdubbing.to_string());
    }

    #[test]
    fn emits_on_change_only() -> Result<(), Box<dyn Error>> {
        let device = midi::get_device("mock-status")?;
        let mock = device.to_mock()?;
        let events = StatusEvents {
            off: vec![note_on(1)],
            recording: vec![note_on(2), note_on(3)],
            playing: vec![note_on(4)],
            overdubbing: vec![],
            idle: vec![note_on(5)],
        };
        let mut light = StatusLight::new(device, events);
        assert_eq!(None, light.current());

        assert!(light.update(State::Empty));
        assert!(!light.update(State::Empty));
        assert!(light.update(State::Recording));
        assert!(!light.update(State::Recording));
        assert!(light.update(State::Overdubbing));
        assert!(light.update(State::Idle));
        assert_eq!(Some(Indicator::Idle), light.current());

        assert_eq!(
            vec![note_on(1), note_on(2), note_on(3), note_on(5)],
            mock.emitted_events()
        );

        Ok(())
    }

    #[test]
    fn pad_light_follows_pad() -> Result<(), Box<dyn Error>> {
        let device = midi::get_device("mock-pad-light")?;
        let mock = device.to_mock()?;
        let feedback = PadFeedback {
            channel: 15.into(),
            velocity: 127.into(),
        };
        let mut light = PadLight::new(device, PadMap::default(), feedback);

        assert!(!light.update(None));
        assert!(light.update(Some(2)));
        assert!(!light.update(Some(2)));
        assert!(light.update(Some(4)));
        assert!(light.update(None));
        assert_eq!(None, light.lit());

        let note_off = |key: u8| LiveEvent::Midi {
            channel: 15.into(),
            message: MidiMessage::NoteOff {
                key: key.into(),
                vel: 0.into(),
            },
        };
        assert_eq!(
            vec![
                note_on(38),
                note_off(38),
                note_on(40),
                note_off(40),
            ],
            mock.emitted_events()
        );

        Ok(())
    }

    #[test]
    fn pad_light_skips_unmapped_pads() -> Result<(), Box<dyn Error>> {
        let device = midi::get_device("mock-pad-light")?;
        let mock = device.to_mock()?;
        let feedback = PadFeedback {
            channel: 0.into(),
            velocity: 100.into(),
        };
        let mut light = PadLight::new(device, PadMap::new(vec![60.into()]), feedback);

        assert!(light.update(Some(3)));
        assert_eq!(Some(3), light.lit());
        assert!(mock.emitted_events().is_empty());

        Ok(())
    }
}
