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
use std::{collections::BTreeSet, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use tracing::{error, trace};

use crate::{looper::Host, midi::Device, pads::PadMap};

/// "All Notes Off" channel mode message.
const ALL_NOTES_OFF: u8 = 123;

/// Drives a MIDI output device on behalf of the looper.
pub struct MidiHost {
    device: Arc<dyn Device>,
    pads: PadMap,
    channel: u4,
    /// (channel, note) pairs triggered and not yet released.
    sounding: BTreeSet<(u8, u8)>,
}

impl MidiHost {
    pub fn new(device: Arc<dyn Device>, pads: PadMap, channel: u4) -> MidiHost {
        MidiHost {
            device,
            pads,
            channel,
            sounding: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    /// Changes the channel used for playback and thru. Takes effect on the next event.
    pub fn set_output_channel(&mut self, channel: u4) {
        self.channel = channel;
    }

    #[cfg(test)]
    /// The number of notes triggered and not yet released.
    pub fn sounding_notes(&self) -> usize {
        self.sounding.len()
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    fn emit(&self, event: LiveEvent<'static>) {
        trace!(device = self.device.name(), event = ?event, "Emitting.");
        if let Err(e) = self.device.emit(event) {
            error!(
                err = %e,
                device = self.device.name(),
                "Error emitting MIDI event."
            );
        }
    }
}

impl Host for MidiHost {
    fn trigger_note(&mut self, note: u7, velocity: u7, channel: u4) {
        self.emit(LiveEvent::Midi {
            channel,
            message: MidiMessage::NoteOn {
                key: note,
                vel: velocity,
            },
        });
        self.sounding.insert((channel.as_int(), note.as_int()));
    }

    fn release_note(&mut self, note: u7, velocity: u7, channel: u4) {
        self.emit(LiveEvent::Midi {
            channel,
            message: MidiMessage::NoteOff {
                key: note,
                vel: velocity,
            },
        });
        self.sounding.remove(&(channel.as_int(), note.as_int()));
    }

    fn stop_all_notes(&mut self) {
        // Explicit note offs first, for receivers that ignore channel mode messages.
        for (channel, note) in std::mem::take(&mut self.sounding) {
            self.emit(LiveEvent::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: note.into(),
                    vel: u7::from(0),
                },
            });
        }

        for channel in 0..16u8 {
            self.emit(LiveEvent::Midi {
                channel: channel.into(),
                message: MidiMessage::Controller {
                    controller: ALL_NOTES_OFF.into(),
                    value: 0.into(),
                },
            });
        }
    }

    fn output_channel(&self) -> u4 {
        self.channel
    }

    fn find_pad_for_note(&self, note: u7) -> Option<usize> {
        self.pads.find(note)
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use midly::{live::LiveEvent, num::u4, MidiMessage};

    use super::MidiHost;
    use crate::{looper::Host, midi, pads::PadMap};

    fn host() -> Result<(MidiHost, Arc<midi::test::Device>), Box<dyn Error>> {
        let device = midi::get_device("mock-host")?;
        let mock = device.to_mock()?;
        Ok((MidiHost::new(device, PadMap::default(), 0.into()), mock))
    }

    #[test]
    fn trigger_and_release() -> Result<(), Box<dyn Error>> {
        let (mut host, mock) = host()?;

        host.trigger_note(60.into(), 100.into(), 2.into());
        assert_eq!(1, host.sounding_notes());
        host.release_note(60.into(), 0.into(), 2.into());
        assert_eq!(0, host.sounding_notes());

        // Releasing something that isn't sounding is harmless.
        host.release_note(61.into(), 0.into(), 2.into());

        let emitted = mock.emitted_events();
        assert_eq!(3, emitted.len());
        assert_eq!(
            LiveEvent::Midi {
                channel: 2.into(),
                message: MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 100.into()
                }
            },
            emitted[0]
        );
        assert_eq!(
            LiveEvent::Midi {
                channel: 2.into(),
                message: MidiMessage::NoteOff {
                    key: 60.into(),
                    vel: 0.into()
                }
            },
            emitted[1]
        );

        Ok(())
    }

    #[test]
    fn stop_all_notes() -> Result<(), Box<dyn Error>> {
        let (mut host, mock) = host()?;

        host.trigger_note(36.into(), 100.into(), 0.into());
        host.trigger_note(40.into(), 90.into(), 3.into());
        mock.reset_emitted_events();

        host.stop_all_notes();
        assert_eq!(0, host.sounding_notes());

        let emitted = mock.emitted_events();
        // Two explicit note offs, then all notes off on every channel.
        assert_eq!(2 + 16, emitted.len());
        assert_eq!(
            LiveEvent::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOff {
                    key: 36.into(),
                    vel: 0.into()
                }
            },
            emitted[0]
        );
        assert_eq!(
            LiveEvent::Midi {
                channel: 3.into(),
                message: MidiMessage::NoteOff {
                    key: 40.into(),
                    vel: 0.into()
                }
            },
            emitted[1]
        );
        for (i, event) in emitted[2..].iter().enumerate() {
            assert_eq!(
                LiveEvent::Midi {
                    channel: u4::from(i as u8),
                    message: MidiMessage::Controller {
                        controller: 123.into(),
                        value: 0.into()
                    }
                },
                *event
            );
        }

        Ok(())
    }

    #[test]
    fn output_channel_and_pads() -> Result<(), Box<dyn Error>> {
        let (mut host, _) = host()?;

        assert_eq!(u4::from(0), host.output_channel());
        host.set_output_channel(9.into());
        assert_eq!(u4::from(9), host.output_channel());

        assert_eq!(Some(2), host.find_pad_for_note(38.into()));
        assert_eq!(None, host.find_pad_for_note(90.into()));

        Ok(())
    }
}
