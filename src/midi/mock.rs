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
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::debug;

use super::Error;

/// A mock device. Remembers everything emitted to it and lets tests inject input.
#[derive(Clone)]
pub struct Device {
    name: String,
    sender: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    emitted: Arc<Mutex<Vec<LiveEvent<'static>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
            emitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[cfg(test)]
    /// Sends the raw event to whoever is watching this device.
    pub async fn mock_event(&self, event: &[u8]) {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            sender
                .send(event.to_vec())
                .await
                .expect("error sending event");
        }
    }

    #[cfg(test)]
    /// Returns true once something is watching this device.
    pub fn is_watched(&self) -> bool {
        self.sender.lock().is_some()
    }

    #[cfg(test)]
    /// Gets every event emitted so far.
    pub fn emitted_events(&self) -> Vec<LiveEvent<'static>> {
        self.emitted.lock().clone()
    }

    #[cfg(test)]
    /// Forgets all emitted events.
    pub fn reset_emitted_events(&self) {
        self.emitted.lock().clear();
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Error> {
        let mut current = self.sender.lock();
        if current.is_some() {
            return Err(Error::AlreadyWatching);
        }
        *current = Some(sender);
        Ok(())
    }

    fn stop_watch_events(&self) {
        self.sender.lock().take();
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), Error> {
        debug!(device = self.name, event = ?event, "Emitting event (mock).");
        self.emitted.lock().push(event);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Error> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
