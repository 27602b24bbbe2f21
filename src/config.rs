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
//! YAML configuration for the looper.

mod error;
mod looper;
pub mod midi;

pub use self::error::ConfigError;
pub use self::looper::{Clock, Controls, Looper, PadFeedback, StatusEvents};

#[cfg(test)]
mod test {
    use std::{error::Error, io::Write, time::Duration};

    use config::{Config, File, FileFormat};
    use midly::{
        live::LiveEvent,
        num::{u4, u7},
        MidiMessage,
    };

    use super::{Clock, ConfigError, Looper};
    use crate::looper::LoopLength;

    fn parse(yaml: &str) -> Result<Looper, Box<dyn Error>> {
        let looper: Looper = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        Ok(looper)
    }

    const MINIMAL: &str = r#"
        device: mock-pads
        controls:
          toggle_record:
            type: note_on
            channel: 16
            key: 1
          clear:
            type: control_change
            channel: 16
            controller: 2
            value: 127
    "#;

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let looper = parse(MINIMAL)?;
        looper.validate()?;

        assert_eq!("mock-pads", looper.device());
        assert_eq!("mock-pads", looper.output_device());
        assert_eq!(u4::from(0), looper.output_channel()?);
        assert_eq!(LoopLength::OneBar, looper.loop_length());
        assert_eq!(256, looper.max_events()?);
        assert_eq!(Duration::from_millis(100), looper.feedback_timeout()?);
        assert_eq!(Duration::from_millis(10), looper.update_interval()?);
        assert!(looper.thru());
        assert!(looper.follow_transport());
        assert_eq!(16, looper.pads()?.len());
        assert_eq!(Some(0), looper.pads()?.find(36.into()));
        assert_eq!(&Clock::External, looper.clock());
        assert!(looper.controls().cycle_length()?.is_none());
        assert!(looper.controls().stop()?.is_none());
        assert!(looper.status_events()?.recording.is_empty());
        assert!(looper.pad_feedback()?.is_none());

        assert_eq!(
            LiveEvent::Midi {
                channel: 15.into(),
                message: MidiMessage::NoteOn {
                    key: 1.into(),
                    vel: 0.into()
                }
            },
            looper.controls().toggle_record()?
        );
        assert_eq!(
            LiveEvent::Midi {
                channel: 15.into(),
                message: MidiMessage::Controller {
                    controller: 2.into(),
                    value: 127.into()
                }
            },
            looper.controls().clear()?
        );

        Ok(())
    }

    #[test]
    fn full() -> Result<(), Box<dyn Error>> {
        let looper = parse(
            r#"
            device: mock-pads
            output_device: mock-synth
            output_channel: 10
            loop_length: four_bars
            max_events: 512
            feedback_timeout: 250ms
            update_interval: 5ms
            thru: false
            follow_transport: false
            pads: [60, 62, 64, 65]
            clock:
              source: internal
              bpm: 96
            controls:
              toggle_record:
                type: note_on
                channel: 16
                key: 1
              clear:
                type: note_on
                channel: 16
                key: 2
              cycle_length:
                type: note_on
                channel: 16
                key: 3
              stop:
                type: control_change
                channel: 16
                controller: 4
                value: 127
            status_events:
              off_events:
                - type: note_off
                  channel: 16
                  key: 1
              recording_events:
                - type: note_on
                  channel: 16
                  key: 1
                  velocity: 5
              idle_events:
                - type: note_on
                  channel: 16
                  key: 1
                  velocity: 53
            pad_feedback:
              channel: 11
              velocity: 64
            "#,
        )?;
        looper.validate()?;

        assert_eq!("mock-synth", looper.output_device());
        assert_eq!(u4::from(9), looper.output_channel()?);
        assert_eq!(LoopLength::FourBars, looper.loop_length());
        assert_eq!(512, looper.max_events()?);
        assert_eq!(Duration::from_millis(250), looper.feedback_timeout()?);
        assert_eq!(Duration::from_millis(5), looper.update_interval()?);
        assert!(!looper.thru());
        assert!(!looper.follow_transport());
        assert_eq!(Some(2), looper.pads()?.find(64.into()));
        assert_eq!(&Clock::Internal { bpm: 96.0 }, looper.clock());
        assert!(looper.controls().cycle_length()?.is_some());
        assert!(looper.controls().stop()?.is_some());

        let status_events = looper.status_events()?;
        assert_eq!(1, status_events.off.len());
        assert_eq!(1, status_events.recording.len());
        assert!(status_events.playing.is_empty());
        assert!(status_events.overdubbing.is_empty());
        assert_eq!(1, status_events.idle.len());

        let pad_feedback = looper.pad_feedback()?.ok_or("no pad feedback")?;
        assert_eq!(u4::from(10), pad_feedback.channel);
        assert_eq!(u7::from(64), pad_feedback.velocity);

        let engine = looper.to_looper()?;
        assert_eq!(LoopLength::FourBars, engine.loop_length());
        assert_eq!(512, engine.snapshot().capacity);

        Ok(())
    }

    #[test]
    fn invalid_values() -> Result<(), Box<dyn Error>> {
        let invalid = |extra: &str| -> Result<ConfigError, Box<dyn Error>> {
            let looper = parse(&format!("{}\n        {}", MINIMAL, extra))?;
            match looper.validate() {
                Ok(()) => Err(format!("expected {} to be invalid", extra).into()),
                Err(e) => Ok(e),
            }
        };

        assert!(matches!(
            invalid("output_channel: 0")?,
            ConfigError::Invalid {
                field: "channel",
                ..
            }
        ));
        assert!(matches!(
            invalid("output_channel: 17")?,
            ConfigError::Invalid { .. }
        ));
        assert!(matches!(
            invalid("max_events: 0")?,
            ConfigError::Invalid {
                field: "max_events",
                ..
            }
        ));
        assert!(matches!(
            invalid("feedback_timeout: soon")?,
            ConfigError::Invalid {
                field: "feedback_timeout",
                ..
            }
        ));
        assert!(matches!(
            invalid("update_interval: 0ms")?,
            ConfigError::Invalid {
                field: "update_interval",
                ..
            }
        ));
        assert!(matches!(
            invalid("pads: [36, 200]")?,
            ConfigError::Invalid { field: "pads", .. }
        ));
        assert!(matches!(
            invalid("pad_feedback: {velocity: 128}")?,
            ConfigError::Invalid {
                field: "pad_feedback.velocity",
                ..
            }
        ));
        assert!(matches!(
            invalid("clock: {source: internal, bpm: 0}")?,
            ConfigError::Invalid {
                field: "clock.bpm",
                ..
            }
        ));

        Ok(())
    }

    #[test]
    fn missing_controls() {
        assert!(parse("device: mock-pads").is_err());
    }

    #[test]
    fn deserialize_from_file() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        file.write_all(MINIMAL.as_bytes())?;
        file.flush()?;

        let looper = Looper::deserialize(file.path())?;
        assert_eq!("mock-pads", looper.device());

        Ok(())
    }

    #[test]
    fn deserialize_missing_file() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => panic!("unable to make temp dir: {}", e),
        };
        let result = Looper::deserialize(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
