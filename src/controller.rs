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
//! The controller owns the looper and feeds it clock pulses, pad notes and commands
//! from a single task, so none of them ever interleave.

use std::{
    error::Error,
    sync::Arc,
    time::{Duration, Instant},
};

use midly::{live::LiveEvent, MidiMessage};
use tokio::{
    sync::{
        mpsc::{self, Receiver, UnboundedReceiver},
        Notify,
    },
    task::{JoinError, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, span, trace, Instrument, Level};

use crate::{
    clock::{self, InternalClock},
    config,
    host::MidiHost,
    looper::{Host, Looper, State, TICKS_PER_BEAT},
    midi::Device,
    status::{PadLight, StatusLight},
    view::TimelineView,
};

/// Raw MIDI input waiting for the controller. A full bar of clock fits with room to spare.
const MIDI_QUEUE_SIZE: usize = 512;

/// A command decoded from control input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ToggleRecord,
    Clear,
    CycleLength,
    Stop,
}

/// The MIDI events that trigger commands.
#[derive(Clone, Debug)]
pub struct Controls {
    toggle_record: LiveEvent<'static>,
    clear: LiveEvent<'static>,
    cycle_length: Option<LiveEvent<'static>>,
    stop: Option<LiveEvent<'static>>,
}

impl Controls {
    pub fn new(config: &config::Controls) -> Result<Controls, config::ConfigError> {
        Ok(Controls {
            toggle_record: config.toggle_record()?,
            clear: config.clear()?,
            cycle_length: config.cycle_length()?,
            stop: config.stop()?,
        })
    }

    fn all(&self) -> impl Iterator<Item = (Command, &LiveEvent<'static>)> {
        [
            (Command::ToggleRecord, Some(&self.toggle_record)),
            (Command::Clear, Some(&self.clear)),
            (Command::CycleLength, self.cycle_length.as_ref()),
            (Command::Stop, self.stop.as_ref()),
        ]
        .into_iter()
        .filter_map(|(command, event)| event.map(|event| (command, event)))
    }

    /// The command triggered by the event, if any.
    pub fn command(&self, event: &LiveEvent) -> Option<Command> {
        self.all()
            .find(|(_, control)| triggers(control, event))
            .map(|(command, _)| command)
    }

    /// True if the event releases a note that is mapped to a command.
    pub fn is_release(&self, event: &LiveEvent) -> bool {
        self.all().any(|(_, control)| releases(control, event))
    }
}

/// Note on controls match on channel and key so that velocity sensitive pads work.
fn triggers(control: &LiveEvent, event: &LiveEvent) -> bool {
    match (control, event) {
        (
            LiveEvent::Midi {
                channel: control_channel,
                message: MidiMessage::NoteOn { key: control_key, .. },
            },
            LiveEvent::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            },
        ) => control_channel == channel && control_key == key && vel.as_int() > 0,
        _ => control == event,
    }
}

fn releases(control: &LiveEvent, event: &LiveEvent) -> bool {
    let LiveEvent::Midi {
        channel: control_channel,
        message: MidiMessage::NoteOn { key: control_key, .. },
    } = control
    else {
        return false;
    };

    match event {
        LiveEvent::Midi {
            channel,
            message: MidiMessage::NoteOff { key, .. },
        } => control_channel == channel && control_key == key,
        LiveEvent::Midi {
            channel,
            message: MidiMessage::NoteOn { key, vel },
        } => control_channel == channel && control_key == key && vel.as_int() == 0,
        _ => false,
    }
}

/// Everything the controller task owns.
struct Session {
    looper: Looper,
    host: MidiHost,
    input: Arc<dyn Device>,
    controls: Controls,
    thru: bool,
    follow_transport: bool,
    external_clock: bool,
    status: StatusLight,
    pad_light: Option<PadLight>,
    started: Instant,
}

impl Session {
    fn new(
        config: &config::Looper,
        input: Arc<dyn Device>,
        output: Arc<dyn Device>,
    ) -> Result<Session, Box<dyn Error>> {
        let pad_light = match config.pad_feedback()? {
            Some(feedback) => Some(PadLight::new(input.clone(), config.pads()?, feedback)),
            None => None,
        };
        let mut session = Session {
            looper: config.to_looper()?,
            host: MidiHost::new(output, config.pads()?, config.output_channel()?),
            controls: Controls::new(config.controls())?,
            thru: config.thru(),
            follow_transport: config.follow_transport(),
            external_clock: *config.clock() == config::Clock::External,
            status: StatusLight::new(input.clone(), config.status_events()?),
            pad_light,
            input,
            started: Instant::now(),
        };
        session.refresh_status();
        Ok(session)
    }

    fn handle_raw(&mut self, raw: &[u8], now: Instant) {
        match LiveEvent::parse(raw) {
            Ok(event) => self.handle_event(event, now),
            Err(e) => debug!(err = ?e, raw = ?raw, "Unable to parse MIDI input."),
        }
    }

    fn handle_event(&mut self, event: LiveEvent, now: Instant) {
        if let Some(message) = clock::Message::from_event(&event) {
            self.handle_clock(message, now);
            return;
        }

        if let Some(command) = self.controls.command(&event) {
            self.handle_command(command);
            return;
        }
        if self.controls.is_release(&event) {
            return;
        }

        match event {
            LiveEvent::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } if vel.as_int() > 0 => {
                if self.thru {
                    let channel = self.host.output_channel();
                    self.host.trigger_note(key, vel, channel);
                }
                self.looper.record_note_on(key, vel, now);
            }
            LiveEvent::Midi {
                message: MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel },
                ..
            } => {
                if self.thru {
                    let channel = self.host.output_channel();
                    self.host.release_note(key, vel, channel);
                }
                self.looper.record_note_off(key, vel);
            }
            _ => debug!(event = ?event, "Ignoring MIDI event."),
        }
    }

    fn handle_clock(&mut self, message: clock::Message, now: Instant) {
        match message {
            clock::Message::Tick if self.external_clock => self.tick(now),
            clock::Message::Tick => {}
            clock::Message::Start if self.follow_transport => {
                let state = self.looper.start();
                info!(state = %state, "Transport started.");
            }
            clock::Message::Stop if self.follow_transport => {
                self.looper.stop(&mut self.host);
            }
            message => debug!(message = ?message, "Ignoring transport message."),
        }
        self.refresh_status();
    }

    fn handle_command(&mut self, command: Command) {
        debug!(command = ?command, "Received command.");
        match command {
            Command::ToggleRecord => {
                self.looper.toggle_record();
            }
            Command::Clear => self.looper.clear(&mut self.host),
            Command::CycleLength => {
                let next = self.looper.loop_length().next();
                self.looper.set_loop_length(next);
            }
            Command::Stop => {
                self.looper.stop(&mut self.host);
            }
        }
        self.refresh_status();
    }

    fn tick(&mut self, now: Instant) {
        self.looper.clock_tick(&mut self.host, now);

        if self.looper.current_tick() % TICKS_PER_BEAT == 0 && self.is_running() {
            debug!(view = %self.view(now), "Beat.");
        }
        self.refresh_status();
    }

    fn update(&mut self, now: Instant) {
        self.looper.update(now);
        self.refresh_pad_light();
    }

    fn is_running(&self) -> bool {
        matches!(
            self.looper.state(),
            State::Recording | State::Playing | State::Overdubbing
        )
    }

    fn view(&self, now: Instant) -> TimelineView {
        TimelineView::new(
            &self.looper.snapshot(),
            self.looper.events(),
            now.saturating_duration_since(self.started),
            now,
        )
    }

    fn refresh_status(&mut self) {
        self.status.update(self.looper.state());
        self.refresh_pad_light();
    }

    fn refresh_pad_light(&mut self) {
        if let Some(pad_light) = self.pad_light.as_mut() {
            pad_light.update(self.looper.last_played_pad());
        }
    }

    fn shutdown(&mut self) {
        self.input.stop_watch_events();
        self.host.stop_all_notes();
        if let Some(pad_light) = self.pad_light.as_mut() {
            pad_light.update(None);
        }
    }
}

/// Runs the looper on its own task.
pub struct Controller {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl Controller {
    /// Starts watching the input device and driving the looper. Must be called from
    /// within a tokio runtime.
    pub fn new(
        config: &config::Looper,
        input: Arc<dyn Device>,
        output: Arc<dyn Device>,
    ) -> Result<Controller, Box<dyn Error>> {
        let session = Session::new(config, input.clone(), output)?;
        let update_interval = config.update_interval()?;

        let (midi_tx, midi_rx) = mpsc::channel::<Vec<u8>>(MIDI_QUEUE_SIZE);
        input.watch_events(midi_tx)?;

        let (clock, ticks_rx) = match config.clock() {
            config::Clock::Internal { bpm } => {
                let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
                (Some(InternalClock::start(*bpm, ticks_tx)), Some(ticks_rx))
            }
            config::Clock::External => (None, None),
        };

        info!(
            input = input.name(),
            output = session.host.device().name(),
            length = %config.loop_length(),
            internal_clock = clock.is_some(),
            "Controller started."
        );

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(
            Controller::run(
                session,
                midi_rx,
                ticks_rx,
                clock,
                update_interval,
                shutdown.clone(),
            )
            .instrument(span!(Level::INFO, "controller")),
        );

        Ok(Controller { handle, shutdown })
    }

    /// A handle that stops the controller when notified.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Asks the controller to stop. Sounding notes are released on the way out.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn run(
        mut session: Session,
        mut midi_rx: Receiver<Vec<u8>>,
        mut ticks_rx: Option<UnboundedReceiver<()>>,
        clock: Option<InternalClock>,
        update_interval: Duration,
        shutdown: Arc<Notify>,
    ) {
        let mut update = tokio::time::interval(update_interval);
        update.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    info!("Controller shutting down.");
                    break;
                }
                Some(()) = next_tick(&mut ticks_rx) => session.tick(Instant::now()),
                raw = midi_rx.recv() => match raw {
                    Some(raw) => {
                        trace!(raw = ?raw, "Received MIDI.");
                        session.handle_raw(&raw, Instant::now());
                    }
                    None => {
                        info!("MIDI input closed.");
                        break;
                    }
                },
                _ = update.tick() => session.update(Instant::now()),
            }
        }

        session.shutdown();

        // The clock thread may be mid-sleep, so join it away from the runtime's workers.
        if let Some(clock) = clock {
            clock.cancel();
            if let Err(e) = tokio::task::spawn_blocking(move || drop(clock)).await {
                error!(err = %e, "Error stopping internal clock.");
            }
        }
    }
}

/// Waits for the next internal clock pulse. Never resolves without an internal clock.
async fn next_tick(ticks_rx: &mut Option<UnboundedReceiver<()>>) -> Option<()> {
    match ticks_rx {
        Some(ticks_rx) => ticks_rx.recv().await,
        None => std::future::pending().await,
    }
}
