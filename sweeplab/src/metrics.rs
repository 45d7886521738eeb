// src/metrics.rs
//
// Small running-statistics helper for report aggregation.
// - RunningMean: arithmetic mean in insertion order, 0 when empty.

/// Arithmetic mean accumulated in insertion order.
///
/// An empty accumulator reports 0.0; the report schema is fixed-width, so a
/// bucket without samples still needs a value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    n: u64,
    sum: f64,
}

impl RunningMean {
    pub fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mean_is_zero() {
        let m = RunningMean::default();
        assert!(m.is_empty());
        assert_eq!(m.mean(), 0.0);
    }

    #[test]
    fn test_mean_matches_sum_over_len() {
        let mut m = RunningMean::default();
        for x in [0.25, 0.5, 0.75] {
            m.add(x);
        }
        assert_eq!(m.n(), 3);
        assert_eq!(m.mean(), (0.25 + 0.5 + 0.75) / 3.0);
    }
}
