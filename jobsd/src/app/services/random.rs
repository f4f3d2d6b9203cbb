// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use rand::Rng;

/// Fixed minimum plus a uniformly random skew in `[0, max_skew]`.
pub fn skewed_delay(min: Duration, max_skew: Duration) -> Duration {
    let skew_ms = max_skew.as_millis() as u64;
    if skew_ms == 0 {
        return min;
    }
    let mut rng = rand::rng();
    min + Duration::from_millis(rng.random_range(0..=skew_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skewed_delay_stays_within_bounds() {
        let min = Duration::from_millis(500);
        let skew = Duration::from_millis(250);
        for _ in 0..100 {
            let delay = skewed_delay(min, skew);
            assert!(delay >= min && delay <= min + skew);
        }
        assert_eq!(skewed_delay(min, Duration::ZERO), min);
    }
}
