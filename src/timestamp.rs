use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// An exact time and date used to represent absolute timelocks.
///
/// Both supported ledgers express their HTLC deadlines as seconds since the
/// UNIX epoch, so a `u32` is sufficient and keeps comparisons trivial.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    // This will work for the next 20 years
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        Timestamp(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("SystemTime::duration_since failed")
                .as_secs() as u32,
        )
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u32) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    /// Seconds from `self` until `later`, zero if `later` has already passed.
    pub fn seconds_until(self, later: Timestamp) -> u32 {
        later.0.saturating_sub(self.0)
    }
}

/// The u32 input is the number of seconds since epoch
impl From<u32> for Timestamp {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

/// The u32 returned is the number of seconds since epoch
impl From<Timestamp> for u32 {
    fn from(item: Timestamp) -> Self {
        item.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_saturates_instead_of_overflowing() {
        let ts = Timestamp::from(u32::MAX);
        assert_eq!(ts.plus(10), Timestamp::from(u32::MAX));
    }

    #[test]
    fn seconds_until_is_zero_for_the_past() {
        let now = Timestamp::from(1_000);
        assert_eq!(now.seconds_until(Timestamp::from(500)), 0);
        assert_eq!(now.seconds_until(Timestamp::from(1_360)), 360);
    }
}
