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
use std::{collections::HashMap, fmt, mem};

use midir::{
    MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use midly::live::LiveEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, span, warn, Level};

use super::Error;

pub struct Device {
    name: String,
    input_port: Option<MidiInputPort>,
    output_port: Option<MidiOutputPort>,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
    /// Opened on first emit and kept, so emitting from the clock path stays cheap.
    output_connection: Mutex<Option<MidiOutputConnection>>,
}

impl Device {
    fn new(name: String) -> Device {
        Device {
            name,
            input_port: None,
            output_port: None,
            event_connection: Mutex::new(None),
            output_connection: Mutex::new(None),
        }
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Error> {
        let span = span!(Level::INFO, "watch events (midir)");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock();
        if event_connection.is_some() {
            return Err(Error::AlreadyWatching);
        }

        let input_port = match self.input_port.as_ref() {
            Some(input_port) => input_port,
            None => {
                warn!(
                    device = self.name,
                    "No MIDI input port, cannot listen for events."
                );
                return Ok(());
            }
        };

        info!(device = self.name, "Watching MIDI events.");

        let mut input = MidiInput::new("padloop input")?;
        // Clock pulses are the whole point, so don't filter realtime messages.
        input.ignore(midir::Ignore::Sysex);
        *event_connection = Some(
            input
                .connect(
                    input_port,
                    "padloop input watcher",
                    move |_, raw_event, _| {
                        if let Err(e) = sender.blocking_send(Vec::from(raw_event)) {
                            error!(err = ?e, "Error sending MIDI event to receiver.");
                        }
                    },
                    (),
                )
                .map_err(|e| Error::Connect(e.to_string()))?,
        );

        Ok(())
    }

    fn stop_watch_events(&self) {
        // Explicitly drop the connection.
        let event_connection = self.event_connection.lock().take();
        mem::drop(event_connection);
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), Error> {
        let output_port = match &self.output_port {
            Some(output_port) => output_port,
            None => return Err(Error::NoOutput(self.name.clone())),
        };

        let buf = super::encode(&event)?;

        let mut output_connection = self.output_connection.lock();
        if output_connection.is_none() {
            debug!(device = self.name, "Opening MIDI output connection.");
            let output = MidiOutput::new("padloop output")?;
            *output_connection = Some(
                output
                    .connect(output_port, "padloop")
                    .map_err(|e| Error::Connect(e.to_string()))?,
            );
        }

        if let Some(connection) = output_connection.as_mut() {
            connection.send(&buf)?;
        }

        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<std::sync::Arc<super::mock::Device>, Error> {
        Err(Error::NotFound(format!("{} is not a mock device", self.name)))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities: Vec<String> = Vec::new();
        if self.input_port.is_some() {
            capabilities.push(String::from("Input"));
        }
        if self.output_port.is_some() {
            capabilities.push(String::from("Output"));
        }

        write!(f, "{} ({})", self.name, capabilities.join("/"))
    }
}

/// Lists midir devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, Error> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir devices, merging input and output ports that share a name.
fn list_midir_devices() -> Result<Vec<Device>, Error> {
    let input = MidiInput::new("padloop input listing")?;
    let output = MidiOutput::new("padloop output listing")?;

    let mut devices: HashMap<String, Device> = HashMap::new();

    for port in input.ports() {
        let name = input.port_name(&port)?;
        devices
            .entry(name.clone())
            .or_insert_with(|| Device::new(name))
            .input_port = Some(port);
    }

    for port in output.ports() {
        let name = output.port_name(&port)?;
        devices
            .entry(name.clone())
            .or_insert_with(|| Device::new(name))
            .output_port = Some(port);
    }

    let mut sorted_devices = devices.into_values().collect::<Vec<Device>>();
    sorted_devices.sort_by_key(|device| device.name.clone());
    Ok(sorted_devices)
}

/// Gets the given midir device. The name may be any unambiguous part of the port name.
pub fn get(name: &str) -> Result<Device, Error> {
    let mut matches = list_midir_devices()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(Error::NotFound(name.to_string()));
    }
    if matches.len() > 1 {
        return Err(Error::Ambiguous(
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        ));
    }

    Ok(matches.swap_remove(0))
}
