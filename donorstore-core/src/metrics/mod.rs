//! Metrics for store activity
//!
//! Counters are recorded through the `metrics` facade; installing an
//! exporter is left to the embedding application.

use metrics::{counter, describe_counter};

pub const ENTRIES_APPENDED: &str = "donorstore_entries_appended";
pub const ENTRIES_MERGED: &str = "donorstore_entries_merged";
pub const ENTRIES_DROPPED: &str = "donorstore_entries_dropped";
pub const ACK_TIMEOUTS: &str = "donorstore_ack_timeouts";

/// Register metric descriptions
pub fn init_metrics() {
    describe_counter!(ENTRIES_APPENDED, "Number of locally authored log entries");
    describe_counter!(ENTRIES_MERGED, "Number of remote log entries admitted by merge");
    describe_counter!(ENTRIES_DROPPED, "Number of remote log entries dropped as malformed or unauthorized");
    describe_counter!(ACK_TIMEOUTS, "Number of write propagations not confirmed in time");
}

/// Record a locally authored entry
pub fn record_appended(store: &str) {
    counter!(ENTRIES_APPENDED, "store" => store.to_string()).increment(1);
}

/// Record entries admitted from peers
pub fn record_merged(store: &str, count: usize) {
    counter!(ENTRIES_MERGED, "store" => store.to_string()).increment(count as u64);
}

/// Record entries dropped during merge or decode
pub fn record_dropped(store: &str, count: usize) {
    if count > 0 {
        counter!(ENTRIES_DROPPED, "store" => store.to_string()).increment(count as u64);
    }
}

pub fn record_ack_timeout(store: &str) {
    counter!(ACK_TIMEOUTS, "store" => store.to_string()).increment(1);
}
