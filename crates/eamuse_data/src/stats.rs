//! Play statistics rollup kept in the series settings blob.

use crate::time::{date_triplet, Clock};
use crate::validated::ValidatedDict;

/// Keys owned by the rollup. Callers cannot overwrite them.
pub const RESERVED_KEYS: [&str; 7] = [
    "total_plays",
    "today_plays",
    "total_days",
    "first_play_timestamp",
    "last_play_timestamp",
    "last_play_date",
    "consecutive_days",
];

/// Folds one play into `stats`.
///
/// Non-reserved keys from `extra` are copied over first. The streak is
/// judged by comparing the stored `last_play_date` against the clock's today
/// and yesterday.
pub fn record_play(stats: &mut ValidatedDict, extra: Option<&ValidatedDict>, clock: &dyn Clock) {
    if let Some(extra) = extra {
        for (key, value) in extra.as_map() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            stats.insert(key.clone(), value.clone());
        }
    }

    let now = clock.now();
    stats.replace_int("total_plays", stats.get_int("total_plays", 0) + 1);
    stats.replace_int("first_play_timestamp", stats.get_int("first_play_timestamp", now));
    stats.replace_int("last_play_timestamp", now);

    let last_play_date = stats.get_int_array("last_play_date", 3);
    let today = date_triplet(clock.today());
    let yesterday = date_triplet(clock.yesterday());

    if last_play_date == today {
        stats.replace_int("today_plays", stats.get_int("today_plays", 0) + 1);
    } else {
        stats.replace_int("total_days", stats.get_int("total_days", 0) + 1);
        stats.replace_int("today_plays", 1);
        if last_play_date == yesterday {
            stats.replace_int("consecutive_days", stats.get_int("consecutive_days", 0) + 1);
        } else {
            stats.replace_int("consecutive_days", 1);
        }
    }
    stats.replace_int_array("last_play_date", 3, &today);
}
