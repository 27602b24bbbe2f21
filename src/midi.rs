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

use midly::live::LiveEvent;
use tokio::sync::mpsc::Sender;

mod midir;
mod mock;

/// Errors from MIDI devices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no device found with name {0}")]
    NotFound(String),

    #[error("found too many devices that match ({0}), use a less ambiguous device name")]
    Ambiguous(String),

    #[error("already watching events")]
    AlreadyWatching,

    #[error("device {0} has no output port")]
    NoOutput(String),

    #[error("MIDI initialization error: {0}")]
    Init(#[from] ::midir::InitError),

    #[error("MIDI port error: {0}")]
    PortInfo(#[from] ::midir::PortInfoError),

    #[error("MIDI connection error: {0}")]
    Connect(String),

    #[error("MIDI send error: {0}")]
    Send(#[from] ::midir::SendError),

    #[error("MIDI encoding error: {0}")]
    Encode(#[from] std::io::Error),
}

/// A MIDI device that pads are read from and notes are sent to.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Error>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Emits an event.
    fn emit(&self, event: LiveEvent<'static>) -> Result<(), Error>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Error>;
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Error> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Error> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// Encodes the event into raw MIDI bytes.
pub fn encode(event: &LiveEvent) -> Result<Vec<u8>, Error> {
    // 8 bytes is enough for any channel or realtime message.
    let mut buf: Vec<u8> = Vec::with_capacity(8);
    event.write_std(&mut buf)?;
    Ok(buf)
}
