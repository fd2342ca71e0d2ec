//! Paired timelocks for the two legs of a swap.
//!
//! The alpha leg must outlive the beta leg by a safety margin, otherwise the
//! counterparty can be redeemed against on beta and still refund alpha before
//! the initiator gets a chance to claim. The window is validated once, at
//! construction, and is immutable afterwards.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A timelock pair proven safe at construction.
///
/// Invariant: `beta_expiry + margin < alpha_expiry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockWindow {
    alpha_expiry: Timestamp,
    beta_expiry: Timestamp,
    margin_secs: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error(
    "unsafe timelock window: beta expiry {beta_expiry} must precede alpha expiry {alpha_expiry} by more than {margin_secs} seconds"
)]
pub struct InvalidWindow {
    pub alpha_expiry: Timestamp,
    pub beta_expiry: Timestamp,
    pub margin_secs: u32,
}

impl TimelockWindow {
    pub fn new(
        alpha_expiry: Timestamp,
        beta_expiry: Timestamp,
        margin: Duration,
    ) -> Result<Self, InvalidWindow> {
        let margin_secs = margin.as_secs() as u32;

        if u32::from(beta_expiry) >= u32::from(alpha_expiry).saturating_sub(margin_secs) {
            return Err(InvalidWindow {
                alpha_expiry,
                beta_expiry,
                margin_secs,
            });
        }

        Ok(TimelockWindow {
            alpha_expiry,
            beta_expiry,
            margin_secs,
        })
    }

    /// Builds a window relative to `now`, the way new swaps are set up.
    pub fn from_durations(
        now: Timestamp,
        alpha_duration: Duration,
        beta_duration: Duration,
        margin: Duration,
    ) -> Result<Self, InvalidWindow> {
        TimelockWindow::new(
            now.plus(alpha_duration.as_secs() as u32),
            now.plus(beta_duration.as_secs() as u32),
            margin,
        )
    }

    pub fn alpha_expiry(&self) -> Timestamp {
        self.alpha_expiry
    }

    pub fn beta_expiry(&self) -> Timestamp {
        self.beta_expiry
    }

    pub fn margin(&self) -> Duration {
        Duration::from_secs(u64::from(self.margin_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn well_ordered_window_is_accepted() {
        let window = TimelockWindow::new(
            Timestamp::from(86_400),
            Timestamp::from(43_200),
            HOUR,
        )
        .unwrap();

        assert_eq!(window.alpha_expiry(), Timestamp::from(86_400));
        assert_eq!(window.beta_expiry(), Timestamp::from(43_200));
    }

    #[test]
    fn beta_expiry_after_alpha_expiry_is_rejected() {
        let result = TimelockWindow::new(
            Timestamp::from(43_200),
            Timestamp::from(86_400),
            HOUR,
        );

        assert!(result.is_err());
    }

    #[test]
    fn beta_expiry_exactly_at_margin_boundary_is_rejected() {
        // beta == alpha - margin leaves zero reaction time.
        let result = TimelockWindow::new(
            Timestamp::from(86_400),
            Timestamp::from(82_800),
            HOUR,
        );

        assert!(result.is_err());
    }

    #[test]
    fn beta_expiry_one_second_inside_margin_is_accepted() {
        let result = TimelockWindow::new(
            Timestamp::from(86_400),
            Timestamp::from(82_799),
            HOUR,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn from_durations_anchors_on_now() {
        let now = Timestamp::from(1_000_000);
        let window =
            TimelockWindow::from_durations(now, Duration::from_secs(86_400), HOUR * 12, HOUR)
                .unwrap();

        assert_eq!(window.alpha_expiry(), now.plus(86_400));
        assert_eq!(window.beta_expiry(), now.plus(43_200));
    }
}
