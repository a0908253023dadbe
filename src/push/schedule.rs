use time::{OffsetDateTime, UtcOffset};

use crate::types::push::{ScheduleToken, TimeOfDay};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const ACTIVE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const STOP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Longest a delivery may wait in the queue. A later one would outlive the
/// active token it carries.
pub const MAX_DELAY: Duration = ACTIVE_TTL;
/// Deliveries are attempted at most this many times before being dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Mints strictly increasing schedule tokens from the wall clock.
///
/// Tokens are millisecond timestamps, bumped past the previous token when the
/// clock has not advanced (or went backwards) since the last mint.
#[derive(Debug, Default)]
pub struct TokenMinter {
    last: AtomicU64,
}

impl TokenMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, now: OffsetDateTime) -> ScheduleToken {
        let candidate = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        ScheduleToken::new(candidate.max(previous + 1))
    }
}

/// Earliest of: the next occurrence of each fixed wall-clock time (in
/// `offset`) at or after `now`, and `now + cooldown_minutes`.
///
/// Returns `None` only when no candidate is representable.
pub fn next_target(
    now: OffsetDateTime,
    fixed_times: &[TimeOfDay],
    cooldown_minutes: u64,
    offset: UtcOffset,
) -> Option<OffsetDateTime> {
    let local_now = now.to_offset(offset);
    let fixed = fixed_times.iter().filter_map(|time_of_day| {
        let today = local_now.replace_time(time_of_day.time());
        if today < local_now {
            today.checked_add(time::Duration::days(1))
        } else {
            Some(today)
        }
    });
    let cooldown = i64::try_from(cooldown_minutes)
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(|seconds| now.checked_add(time::Duration::seconds(seconds)));

    fixed
        .chain(cooldown)
        .min()
        .map(|target| target.to_offset(now.offset()))
}

/// Queue delay for the next delivery: the wait until `target`, plus the
/// expected interaction time, never negative.
pub fn renewal_delay(
    now: OffsetDateTime,
    target: OffsetDateTime,
    action_time_seconds: i64,
) -> Duration {
    let seconds = (target - now)
        .whole_seconds()
        .saturating_add(action_time_seconds);
    Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
}
