use chrono::DateTime;
use chrono_tz::Tz;

/// Derives backend keys for minute-bucketed snapshots.
///
/// Key layout must stay stable for persisted snapshots to survive a restart:
/// - totals: `<namespace>:total:<YYYYMMDD_HHMM>`
/// - strikes: `<namespace>:strike:<strike>:<YYYYMMDD_HHMM>`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SnapshotKeys {
    namespace: String,
}

impl SnapshotKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn totals(&self, minute: DateTime<Tz>) -> String {
        format!("{}:total:{}", self.namespace, minute_stamp(minute))
    }

    pub fn strike(&self, strike: i64, minute: DateTime<Tz>) -> String {
        format!("{}:strike:{strike}:{}", self.namespace, minute_stamp(minute))
    }
}

fn minute_stamp(minute: DateTime<Tz>) -> String {
    minute.format("%Y%m%d_%H%M").to_string()
}
