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
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use midly::{
    live::LiveEvent,
    num::{u4, u7},
};
use serde::Deserialize;

use super::{
    midi::{self, ToMidiEvent},
    ConfigError,
};
use crate::{looper, pads::PadMap, status};

const DEFAULT_OUTPUT_CHANNEL: u8 = 1;
const DEFAULT_FEEDBACK_VELOCITY: u8 = 127;
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(10);

/// Tempos outside this range are almost certainly typos.
const MIN_BPM: f64 = 20.0;
const MAX_BPM: f64 = 300.0;

fn default_output_channel() -> u8 {
    DEFAULT_OUTPUT_CHANNEL
}

fn default_feedback_velocity() -> u8 {
    DEFAULT_FEEDBACK_VELOCITY
}

fn default_max_events() -> usize {
    looper::MAX_LOOP_EVENTS
}

fn default_true() -> bool {
    true
}

/// A YAML representation of the looper configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Looper {
    /// The pad controller. Notes and controls are read from it.
    device: String,

    /// Where notes are played. Defaults to the pad controller.
    output_device: Option<String>,

    /// The channel notes are played on, 1-16.
    #[serde(default = "default_output_channel")]
    output_channel: u8,

    #[serde(default)]
    loop_length: looper::LoopLength,

    /// The most events a loop can hold.
    #[serde(default = "default_max_events")]
    max_events: usize,

    /// How long a pad stays lit after playback triggers it.
    feedback_timeout: Option<String>,

    /// How often idle housekeeping runs.
    update_interval: Option<String>,

    /// Play pads through to the output while they're pressed.
    #[serde(default = "default_true")]
    thru: bool,

    /// Follow MIDI start and stop from the clock source.
    #[serde(default = "default_true")]
    follow_transport: bool,

    /// The note each pad sends, pad 0 first.
    pads: Option<Vec<u8>>,

    #[serde(default)]
    clock: Clock,

    controls: Controls,

    status_events: Option<StatusEvents>,

    /// Lights pads on the controller as playback triggers them.
    pad_feedback: Option<PadFeedback>,
}

impl Looper {
    /// Loads and validates the configuration at the given path.
    pub fn deserialize(path: &Path) -> Result<Looper, ConfigError> {
        let looper: Looper = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        looper.validate()?;
        Ok(looper)
    }

    /// Checks every value that can't be checked by deserialization alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.output_channel()?;
        self.max_events()?;
        self.feedback_timeout()?;
        self.update_interval()?;
        self.pads()?;
        self.clock.validate()?;
        self.controls.toggle_record()?;
        self.controls.clear()?;
        self.controls.cycle_length()?;
        self.controls.stop()?;
        self.status_events()?;
        self.pad_feedback()?;
        Ok(())
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// The output device, which is the pad controller unless configured otherwise.
    pub fn output_device(&self) -> &str {
        self.output_device.as_deref().unwrap_or(&self.device)
    }

    pub fn output_channel(&self) -> Result<u4, ConfigError> {
        midi::parse_channel(self.output_channel)
    }

    pub fn loop_length(&self) -> looper::LoopLength {
        self.loop_length
    }

    pub fn max_events(&self) -> Result<usize, ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::invalid("max_events", "must be at least 1"));
        }
        Ok(self.max_events)
    }

    pub fn feedback_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "feedback_timeout",
            &self.feedback_timeout,
            looper::DEFAULT_FEEDBACK_TIMEOUT,
        )
    }

    pub fn update_interval(&self) -> Result<Duration, ConfigError> {
        let interval = parse_duration(
            "update_interval",
            &self.update_interval,
            DEFAULT_UPDATE_INTERVAL,
        )?;
        if interval.is_zero() {
            return Err(ConfigError::invalid("update_interval", "must be non-zero"));
        }
        Ok(interval)
    }

    pub fn thru(&self) -> bool {
        self.thru
    }

    pub fn follow_transport(&self) -> bool {
        self.follow_transport
    }

    pub fn pads(&self) -> Result<PadMap, ConfigError> {
        match &self.pads {
            Some(pads) => Ok(PadMap::new(
                pads.iter()
                    .map(|note| midi::parse_u7("pads", *note))
                    .collect::<Result<Vec<u7>, ConfigError>>()?,
            )),
            None => Ok(PadMap::default()),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// The status events, empty when none are configured.
    pub fn status_events(&self) -> Result<status::StatusEvents, ConfigError> {
        match &self.status_events {
            Some(status_events) => status_events.to_status_events(),
            None => Ok(status::StatusEvents::default()),
        }
    }

    /// The pad feedback settings, or None if pads shouldn't be lit.
    pub fn pad_feedback(&self) -> Result<Option<status::PadFeedback>, ConfigError> {
        self.pad_feedback
            .as_ref()
            .map(|pad_feedback| pad_feedback.to_pad_feedback())
            .transpose()
    }

    /// Builds the loop engine described by this configuration.
    pub fn to_looper(&self) -> Result<looper::Looper, ConfigError> {
        Ok(looper::Looper::new(
            self.loop_length,
            self.max_events()?,
            self.feedback_timeout()?,
        ))
    }
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::invalid(field, e.to_string()))?
            .into()),
        None => Ok(default),
    }
}

/// Where clock pulses come from.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Clock {
    /// MIDI clock on the input device.
    #[default]
    External,
    /// Pulses generated at a fixed tempo.
    Internal { bpm: f64 },
}

impl Clock {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Clock::External => Ok(()),
            Clock::Internal { bpm } if bpm.is_finite() && (MIN_BPM..=MAX_BPM).contains(bpm) => {
                Ok(())
            }
            Clock::Internal { bpm } => Err(ConfigError::invalid(
                "clock.bpm",
                format!("{} is not in {}-{}", bpm, MIN_BPM, MAX_BPM),
            )),
        }
    }
}

/// The MIDI events that drive the looper.
#[derive(Deserialize, Clone, Debug)]
pub struct Controls {
    toggle_record: midi::Event,
    clear: midi::Event,
    cycle_length: Option<midi::Event>,
    stop: Option<midi::Event>,
}

impl Controls {
    pub fn toggle_record(&self) -> Result<LiveEvent<'static>, ConfigError> {
        self.toggle_record.to_midi_event()
    }

    pub fn clear(&self) -> Result<LiveEvent<'static>, ConfigError> {
        self.clear.to_midi_event()
    }

    pub fn cycle_length(&self) -> Result<Option<LiveEvent<'static>>, ConfigError> {
        self.cycle_length
            .as_ref()
            .map(|event| event.to_midi_event())
            .transpose()
    }

    pub fn stop(&self) -> Result<Option<LiveEvent<'static>>, ConfigError> {
        self.stop
            .as_ref()
            .map(|event| event.to_midi_event())
            .transpose()
    }
}

/// The configuration for emitting status events.
#[derive(Deserialize, Clone, Debug)]
pub struct StatusEvents {
    #[serde(default)]
    off_events: Vec<midi::Event>,
    #[serde(default)]
    recording_events: Vec<midi::Event>,
    #[serde(default)]
    playing_events: Vec<midi::Event>,
    #[serde(default)]
    overdubbing_events: Vec<midi::Event>,
    #[serde(default)]
    idle_events: Vec<midi::Event>,
}

impl StatusEvents {
    fn to_status_events(&self) -> Result<status::StatusEvents, ConfigError> {
        let convert = |events: &[midi::Event]| {
            events
                .iter()
                .map(|event| event.to_midi_event())
                .collect::<Result<Vec<LiveEvent<'static>>, ConfigError>>()
        };

        Ok(status::StatusEvents {
            off: convert(&self.off_events)?,
            recording: convert(&self.recording_events)?,
            playing: convert(&self.playing_events)?,
            overdubbing: convert(&self.overdubbing_events)?,
            idle: convert(&self.idle_events)?,
        })
    }
}

/// The configuration for lighting pads during playback.
#[derive(Deserialize, Clone, Debug)]
pub struct PadFeedback {
    #[serde(default = "default_output_channel")]
    channel: u8,
    #[serde(default = "default_feedback_velocity")]
    velocity: u8,
}

impl PadFeedback {
    fn to_pad_feedback(&self) -> Result<status::PadFeedback, ConfigError> {
        Ok(status::PadFeedback {
            channel: midi::parse_channel(self.channel)?,
            velocity: midi::parse_u7("pad_feedback.velocity", self.velocity)?,
        })
    }
}
