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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Environment variable holding the clock thread priority (0-99).
pub const PRIORITY_ENV: &str = "PADLOOP_THREAD_PRIORITY";

/// Environment variable that opts out of SCHED_FIFO for the clock thread.
pub const DISABLE_RT_ENV: &str = "PADLOOP_DISABLE_RT_CLOCK";

/// Default priority for the internal clock thread when PADLOOP_THREAD_PRIORITY is unset.
const DEFAULT_CLOCK_THREAD_PRIORITY: u8 = 70;

/// Reads PADLOOP_THREAD_PRIORITY once, before the clock thread starts pulsing.
pub fn clock_thread_priority() -> ThreadPriority {
    std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_CLOCK_THREAD_PRIORITY).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the clock thread.
/// Default: enabled. Opt out with PADLOOP_DISABLE_RT_CLOCK=1.
pub fn rt_clock_enabled() -> bool {
    !env_flag(DISABLE_RT_ENV)
}

/// Raises the priority of the calling thread. Failures are logged and otherwise ignored,
/// the clock still runs at normal priority.
pub fn configure_clock_thread_priority(priority: ThreadPriority, rt_clock: bool) {
    if let Err(e) = set_current_thread_priority(priority) {
        warn!(err = ?e, "Unable to raise clock thread priority");
    }

    #[cfg(unix)]
    if rt_clock {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for clock thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for clock thread"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = rt_clock;
}

#[cfg(test)]
mod test {
    use serial_test::serial;
    use thread_priority::{ThreadPriority, ThreadPriorityValue};

    use super::*;

    fn expected(n: u8) -> ThreadPriority {
        ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(n).expect("valid priority"))
    }

    #[test]
    #[serial]
    fn priority_from_env() {
        std::env::set_var(PRIORITY_ENV, "42");
        assert_eq!(clock_thread_priority(), expected(42));
        std::env::remove_var(PRIORITY_ENV);
    }

    #[test]
    #[serial]
    fn priority_defaults() {
        std::env::remove_var(PRIORITY_ENV);
        assert_eq!(clock_thread_priority(), expected(DEFAULT_CLOCK_THREAD_PRIORITY));

        std::env::set_var(PRIORITY_ENV, "150");
        assert_eq!(clock_thread_priority(), expected(DEFAULT_CLOCK_THREAD_PRIORITY));

        std::env::set_var(PRIORITY_ENV, "loud");
        assert_eq!(clock_thread_priority(), expected(DEFAULT_CLOCK_THREAD_PRIORITY));
        std::env::remove_var(PRIORITY_ENV);
    }

    #[test]
    #[serial]
    fn rt_clock_flag() {
        std::env::remove_var(DISABLE_RT_ENV);
        assert!(rt_clock_enabled());

        for value in ["1", "true", "YES", "On"] {
            std::env::set_var(DISABLE_RT_ENV, value);
            assert!(!rt_clock_enabled(), "{} should disable RT", value);
        }

        std::env::set_var(DISABLE_RT_ENV, "0");
        assert!(rt_clock_enabled());
        std::env::remove_var(DISABLE_RT_ENV);
    }
}
