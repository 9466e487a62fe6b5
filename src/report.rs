use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

use crate::engine::Mode;

/// Results and wall-clock cost of one pass over sum, max and sort.
#[derive(Clone, Debug)]
pub struct Round {
    pub mode: Mode,
    pub sum: f32,
    pub max: f32,
    /// Length of the globally merged array.
    pub sorted_len: usize,
    /// Whether the merged array came out non-decreasing by key.
    pub sorted: bool,
    pub sum_time: Duration,
    pub max_time: Duration,
    pub sort_time: Duration,
}

/// Basic versus fast comparison over a whole session.
#[derive(Clone, Debug)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub basic: Round,
    pub fast: Round,
}

impl Report {
    pub fn sum_speedup(&self) -> f64 {
        speedup(self.basic.sum_time, self.fast.sum_time)
    }

    pub fn max_speedup(&self) -> f64 {
        speedup(self.basic.max_time, self.fast.max_time)
    }

    pub fn sort_speedup(&self) -> f64 {
        speedup(self.basic.sort_time, self.fast.sort_time)
    }
}

fn speedup(basic: Duration, fast: Duration) -> f64 {
    let fast = fast.as_secs_f64();
    if fast == 0.0 {
        return f64::INFINITY;
    }
    basic.as_secs_f64() / fast
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.mode {
            Mode::Basic => "Basic",
            Mode::Fast => "Fast",
        };
        writeln!(
            f,
            "[{label}] SUM  Time: {:.3} ms | Result: {}",
            ms(self.sum_time),
            self.sum
        )?;
        writeln!(
            f,
            "[{label}] MAX  Time: {:.3} ms | Result: {}",
            ms(self.max_time),
            self.max
        )?;
        writeln!(
            f,
            "[{label}] SORT Time: {:.3} ms | {} values, sorted: {}",
            ms(self.sort_time),
            self.sorted_len,
            self.sorted
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session started {}", self.started_at.to_rfc3339())?;
        write!(f, "{}", self.basic)?;
        write!(f, "{}", self.fast)?;
        writeln!(f)?;
        writeln!(f, "Task   | Basic (ms) | SpeedUp (ms) | SpeedUp Ratio")?;
        writeln!(f, "-------|------------|--------------|--------------")?;
        let rows = [
            ("SUM", self.basic.sum_time, self.fast.sum_time, self.sum_speedup()),
            ("MAX", self.basic.max_time, self.fast.max_time, self.max_speedup()),
            ("SORT", self.basic.sort_time, self.fast.sort_time, self.sort_speedup()),
        ];
        for (task, basic, fast, ratio) in rows {
            writeln!(
                f,
                "{task:<6} | {:>10.3} | {:>12.3} | {ratio:.2}x",
                ms(basic),
                ms(fast)
            )?;
        }
        Ok(())
    }
}
