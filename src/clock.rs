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
//! Clock sources. The looper advances on 24 PPQN pulses, either from MIDI clock on the
//! input device or from an internal clock thread.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use midly::live::{LiveEvent, SystemRealtime};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, span, Level};

use crate::{looper::TICKS_PER_BEAT, thread_priority};

/// A transport message derived from MIDI system realtime input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// One 24 PPQN pulse.
    Tick,
    Start,
    Continue,
    Stop,
}

impl Message {
    /// Classifies a live event. Anything that isn't clock or transport yields None.
    pub fn from_event(event: &LiveEvent) -> Option<Message> {
        match event {
            LiveEvent::Realtime(SystemRealtime::TimingClock) => Some(Message::Tick),
            LiveEvent::Realtime(SystemRealtime::Start) => Some(Message::Start),
            LiveEvent::Realtime(SystemRealtime::Continue) => Some(Message::Continue),
            LiveEvent::Realtime(SystemRealtime::Stop) => Some(Message::Stop),
            _ => None,
        }
    }
}

/// The time between pulses at the given tempo.
pub fn tick_interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / (bpm * f64::from(TICKS_PER_BEAT)))
}

/// Cancels a running clock thread.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// A free-running clock that pulses at a fixed tempo on its own thread.
pub struct InternalClock {
    bpm: f64,
    cancel_handle: CancelHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl InternalClock {
    /// Starts pulsing. Each pulse sends a unit on the given sender; the clock stops on its
    /// own if the receiver goes away.
    pub fn start(bpm: f64, sender: UnboundedSender<()>) -> InternalClock {
        let cancel_handle = CancelHandle::new();
        let interval = tick_interval(bpm);
        let priority = thread_priority::clock_thread_priority();
        let rt_clock = thread_priority::rt_clock_enabled();

        info!(bpm, interval = ?interval, "Starting internal clock.");

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "internal clock");
                let _enter = span.enter();

                thread_priority::configure_clock_thread_priority(priority, rt_clock);

                // Deadlines are absolute so sleep overshoot doesn't accumulate as drift.
                let mut next = Instant::now();
                loop {
                    if cancel_handle.is_cancelled() {
                        debug!("Clock cancelled.");
                        return;
                    }
                    if sender.send(()).is_err() {
                        debug!("Clock receiver closed.");
                        return;
                    }

                    next += interval;
                    spin_sleep::sleep(next.saturating_duration_since(Instant::now()));
                }
            })
        };

        InternalClock {
            bpm,
            cancel_handle,
            join: Some(join),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Tells the clock thread to exit without waiting for it.
    pub fn cancel(&self) {
        self.cancel_handle.cancel();
    }

    /// Stops the clock and waits for its thread to exit.
    pub fn stop(&mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("Clock thread panicked.");
            }
        }
    }
}

impl Drop for InternalClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use midly::{
        live::{LiveEvent, SystemCommon, SystemRealtime},
        MidiMessage,
    };

    use super::*;

    #[test]
    fn classify() {
        assert_eq!(
            Some(Message::Tick),
            Message::from_event(&LiveEvent::Realtime(SystemRealtime::TimingClock))
        );
        assert_eq!(
            Some(Message::Start),
            Message::from_event(&LiveEvent::Realtime(SystemRealtime::Start))
        );
        assert_eq!(
            Some(Message::Continue),
            Message::from_event(&LiveEvent::Realtime(SystemRealtime::Continue))
        );
        assert_eq!(
            Some(Message::Stop),
            Message::from_event(&LiveEvent::Realtime(SystemRealtime::Stop))
        );
        assert_eq!(
            None,
            Message::from_event(&LiveEvent::Realtime(SystemRealtime::ActiveSensing))
        );
        assert_eq!(
            None,
            Message::from_event(&LiveEvent::Common(SystemCommon::TuneRequest))
        );
        assert_eq!(
            None,
            Message::from_event(&LiveEvent::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 100.into()
                }
            })
        );
    }

    #[test]
    fn classify_raw_bytes() {
        let parse = |raw: &[u8]| {
            let event = LiveEvent::parse(raw).expect("valid event");
            Message::from_event(&event)
        };
        assert_eq!(Some(Message::Tick), parse(&[0xF8]));
        assert_eq!(Some(Message::Start), parse(&[0xFA]));
        assert_eq!(Some(Message::Continue), parse(&[0xFB]));
        assert_eq!(Some(Message::Stop), parse(&[0xFC]));
    }

    #[test]
    fn intervals() {
        // 120 bpm is 2 beats a second, 48 pulses a second.
        let interval = tick_interval(120.0);
        assert!(interval > Duration::from_micros(20_830));
        assert!(interval < Duration::from_micros(20_840));

        let interval = tick_interval(60.0);
        assert!(interval > Duration::from_micros(41_660));
        assert!(interval < Duration::from_micros(41_670));
    }

    #[test]
    fn internal_clock_pulses_and_stops() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        // Fast enough to get a handful of pulses quickly.
        let mut clock = InternalClock::start(600.0, sender);
        assert_eq!(600.0, clock.bpm());

        let mut pulses = 0;
        let deadline = Instant::now() + Duration::from_secs(3);
        while pulses < 5 && Instant::now() < deadline {
            if receiver.try_recv().is_ok() {
                pulses += 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        assert_eq!(5, pulses);

        clock.stop();
        // Drain whatever was sent before the thread noticed the cancel.
        while receiver.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn internal_clock_cancel_does_not_wait() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        // 125ms between pulses at the slowest tempo.
        let clock = InternalClock::start(20.0, sender);
        while receiver.try_recv().is_err() {
            thread::sleep(Duration::from_millis(1));
        }

        let cancelled_at = Instant::now();
        clock.cancel();
        assert!(cancelled_at.elapsed() < Duration::from_millis(50));

        // The thread wakes for at most one more pulse and sends nothing further.
        drop(clock);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn internal_clock_stops_without_receiver() {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let clock = InternalClock::start(600.0, sender);
        drop(receiver);
        // Dropping joins the thread, which exits on the closed channel.
        drop(clock);
    }
}
