use chrono::SubsecRound;

/// Jobs are keyed by a random (v4) UUID generated at creation.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current time truncated to microseconds.
///
/// Postgres `TIMESTAMPTZ` stores microseconds; truncating at the source
/// keeps every store backend round-tripping timestamps exactly.
pub fn now() -> Timestamp {
    chrono::Utc::now().trunc_subsecs(6)
}
