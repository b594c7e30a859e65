//! # trustverify-core
//!
//! The trust seams of the TrustVerify WORM audit trail.
//!
//! This crate provides the two traits the storage service depends on
//! (`ChainStateStore`, `Clock`), the production `SystemClock`, and a
//! `ManualClock` for pinning record timestamps.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trustverify_core::traits::{ChainStateStore, Clock, SystemClock};
//! ```

pub mod traits;

pub use traits::{ChainStateStore, Clock, ManualClock, SystemClock};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{Clock, ManualClock, SystemClock};

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        let after = Utc::now();

        assert!(now >= before && now <= after + Duration::milliseconds(1));
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let shared: Box<dyn Clock> = Box::new(Arc::clone(&clock));

        assert_eq!(shared.now(), start);

        clock.advance(Duration::days(1));
        assert_eq!(shared.now(), start + Duration::days(1));

        clock.set(start);
        assert_eq!(shared.now(), start, "set() rewinds as well as advances");
    }
}
