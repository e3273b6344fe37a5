// Progress reporting for long sweeps. The reporter is an owned value passed
// into whatever drives the sweep; it keeps its own rate-limit timestamp, so
// there is no process-wide printing state.

use rug::Integer;
use std::io::{self, Write};
use std::time::Instant;

/// Minimum seconds between status lines
const PRINT_INTERVAL_SECS: f64 = 0.1;

pub struct Status {
    enabled: bool,
    precision: usize,
    epsilon: f64,
    percent: f64,
    last_print: Option<Instant>,
    printed: bool,
}

impl Status {
    /// Larger arguments move through their range more slowly, so the
    /// percent precision grows with the magnitude of x (capped at 3).
    pub fn new(x: &Integer, enabled: bool) -> Self {
        let digits = x.to_string_radix(10).trim_start_matches('-').len();
        let precision = if digits <= 10 {
            0
        } else {
            ((digits - 10).div_ceil(6)).min(3)
        };
        Self {
            enabled,
            precision,
            epsilon: 10_f64.powi(-(precision as i32)),
            percent: -1.0,
            last_print: None,
            printed: false,
        }
    }

    pub fn percent(low: u64, limit: u64) -> f64 {
        if limit == 0 {
            return 100.0;
        }
        (low.min(limit) as f64 / limit as f64) * 100.0
    }

    /// Print the sweep position as a percentage, at most once per interval
    /// and only when the value moved by a visible amount. Skipping a print
    /// is always safe.
    pub fn print(&mut self, low: u64, limit: u64) {
        if !self.enabled {
            return;
        }
        if let Some(last) = self.last_print {
            if last.elapsed().as_secs_f64() < PRINT_INTERVAL_SECS {
                return;
            }
        }
        self.last_print = Some(Instant::now());

        let percent = Self::percent(low, limit);
        if (percent - self.percent) < self.epsilon {
            return;
        }
        self.percent = percent;
        self.printed = true;

        print!("\rStatus: {:.*}%", self.precision, percent);
        let _ = io::stdout().flush();
    }

    /// Pin the final 100% line and move off the status line.
    pub fn finish(&mut self) {
        if !self.enabled {
            return;
        }
        println!("\rStatus: {:.*}%", self.precision, 100.0);
        self.printed = false;
    }

    /// Whether a status line is currently pending a newline.
    pub fn dirty(&self) -> bool {
        self.printed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(Status::percent(0, 200), 0.0);
        assert_eq!(Status::percent(50, 200), 25.0);
        assert_eq!(Status::percent(200, 200), 100.0);
        // Positions past the limit never overshoot 100
        assert_eq!(Status::percent(300, 200), 100.0);
        assert_eq!(Status::percent(0, 0), 100.0);
    }

    #[test]
    fn test_precision_grows_with_magnitude() {
        let small = Status::new(&Integer::from(1_000_000), false);
        assert_eq!(small.precision, 0);

        let medium = Status::new(&Integer::from(10_u64.pow(12)), false);
        assert_eq!(medium.precision, 1);

        let large = Status::new(&Integer::from(10_u64.pow(18)), false);
        assert_eq!(large.precision, 2);

        let huge = Status::new(&(Integer::from(10) << 200), false);
        assert_eq!(huge.precision, 3);
    }

    #[test]
    fn test_disabled_status_never_prints() {
        let mut status = Status::new(&Integer::from(1_000), false);
        status.print(10, 100);
        assert!(!status.dirty());
    }
}
