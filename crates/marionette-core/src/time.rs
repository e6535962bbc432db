//! Time primitives
//!
//! The pipeline stamps every frame with sender-side wall-clock times and the
//! receiver subtracts them from its own clock to derive per-stage latency.
//! Both peers are assumed to share a clock (same host in tests, NTP-close in
//! practice); latency figures are diagnostic, not control inputs.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    pub const ZERO: EpochMillis = EpochMillis(0);

    /// Current wall-clock time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        EpochMillis(millis)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        EpochMillis(millis)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`. Negative if the clocks
    /// disagree; callers decide whether to clamp.
    #[inline]
    pub fn millis_since(self, earlier: EpochMillis) -> i64 {
        self.0 - earlier.0
    }
}

impl fmt::Debug for EpochMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t({}ms)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_since() {
        let t0 = EpochMillis::from_millis(1000);
        let t1 = EpochMillis::from_millis(1020);

        assert_eq!(t1.millis_since(t0), 20);
        assert_eq!(t0.millis_since(t1), -20);
    }

    #[test]
    fn test_now_is_nonzero() {
        assert!(EpochMillis::now().as_millis() > 0);
    }
}
