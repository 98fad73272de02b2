// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::job::{JobId, JobIdGenerator};
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;

const JID_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// Mints 20-digit `YYYYMMDDhhmmssffffff` job ids from the wall clock.
///
/// Ids are strictly increasing within one generator: when the clock has not
/// moved past the previous id, the previous id is bumped by one microsecond.
#[derive(Default)]
pub struct TimestampJobIdGenerator {
    last: Mutex<Option<NaiveDateTime>>,
}

impl TimestampJobIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self, now: DateTime<Utc>) -> JobId {
        let mut last = self.last.lock();
        let mut stamp = now.naive_utc();
        if let Some(prev) = *last {
            if stamp <= prev {
                stamp = prev + chrono::Duration::microseconds(1);
            }
        }
        *last = Some(stamp);
        JobId::new(stamp.format(JID_FORMAT).to_string())
    }
}

impl JobIdGenerator for TimestampJobIdGenerator {
    fn next_jid(&self) -> JobId {
        self.mint(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_jid_format() {
        let generator = TimestampJobIdGenerator::new();
        let jid = generator.next_jid();
        assert_eq!(jid.as_str().len(), 20);
        assert!(jid.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_same_instant_is_bumped() {
        let generator = TimestampJobIdGenerator::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let first = generator.mint(now);
        let second = generator.mint(now);
        let third = generator.mint(now - chrono::Duration::seconds(5));
        assert_eq!(first.as_str(), "20260301120000000000");
        assert_eq!(second.as_str(), "20260301120000000001");
        assert_eq!(third.as_str(), "20260301120000000002");
    }
}
