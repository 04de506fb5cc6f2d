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

const PRIORITY_VAR: &str = "POLYSAMPLER_THREAD_PRIORITY";
const DISABLE_RT_VAR: &str = "POLYSAMPLER_DISABLE_RT_AUDIO";

/// Priority for the audio callback thread when POLYSAMPLER_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Reads POLYSAMPLER_THREAD_PRIORITY (0-99). Read once when the stream is built so the
/// callback never touches the environment.
pub fn callback_thread_priority() -> Option<ThreadPriorityValue> {
    let priority = parse_priority(std::env::var(PRIORITY_VAR).ok().as_deref());
    ThreadPriorityValue::try_from(priority).ok()
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|value| value.trim().parse::<u8>().ok())
        .filter(|priority| *priority < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
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

/// Returns whether SCHED_FIFO should be attempted for the audio callback thread. Set
/// POLYSAMPLER_DISABLE_RT_AUDIO=1 to opt out.
pub fn rt_audio_enabled() -> bool {
    !env_flag(DISABLE_RT_VAR)
}

/// Raises the priority of the calling thread the first time it's called from that thread.
pub fn configure_audio_thread_priority(
    priority: ThreadPriorityValue,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise audio callback thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for audio callback thread"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for audio callback thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}
