use std::{env, time::Duration};

/// How often the status updater reconciles persisted event statuses with the
/// clock. Staleness of a stored status is bounded by this interval.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// An event without an end time is presumed over this many minutes after it
/// started.
pub const OPEN_ENDED_EVENT_TIMEOUT_MINUTES: i64 = 60;

pub fn jwt_secret() -> String {
    env::var("JWT_SECRET").expect("JWT_SECRET must be set")
}
