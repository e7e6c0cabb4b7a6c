use crate::ingest::sample::CompositeKey;
use crate::persist::{write_point, Consolidation, PersistError, RoundRobinStore, RrdSchema};

const SCHEMA: RrdSchema = RrdSchema {
    data_sources: &["q1", "q2", "q3", "lo", "hi", "total"],
    consolidations: &[Consolidation::Average, Consolidation::Min, Consolidation::Max],
};

/// Distribution summary of one window's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuartilesStats {
    pub q1: i64,
    pub q2: i64,
    pub q3: i64,
    pub lo: i64,
    pub hi: i64,
    pub total: i64,
}

impl QuartilesStats {
    /// Values in data source order.
    pub fn values(&self) -> [i64; 6] {
        [self.q1, self.q2, self.q3, self.lo, self.hi, self.total]
    }
}

/// Quartile writer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Quartiles;

impl Quartiles {
    pub fn name(&self) -> &'static str {
        "quartiles"
    }

    /// Computes quartiles, or `None` for fewer than two samples.
    ///
    /// The sorted samples are split at `n / 2`; `q1` and `q3` are the
    /// truncated means of the lower and upper halves, `q2` the truncated
    /// mean of all samples.
    pub fn compute(samples: &[i64]) -> Option<QuartilesStats> {
        if samples.len() < 2 {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let (lower, upper) = sorted.split_at(n / 2);
        let lower_sum: i128 = lower.iter().map(|&v| i128::from(v)).sum();
        let upper_sum: i128 = upper.iter().map(|&v| i128::from(v)).sum();

        Some(QuartilesStats {
            q1: mean(lower_sum, lower.len()),
            q2: mean(lower_sum + upper_sum, n),
            q3: mean(upper_sum, upper.len()),
            lo: sorted[0],
            hi: sorted[n - 1],
            total: i64::try_from(n).unwrap_or(i64::MAX),
        })
    }

    pub async fn rollup<S: RoundRobinStore>(
        &self,
        store: &S,
        time: i64,
        key: &CompositeKey,
        samples: &[i64],
    ) -> Result<(), PersistError> {
        let Some(stats) = Self::compute(samples) else {
            return Ok(());
        };
        write_point(store, self.name(), &SCHEMA, key, time, &stats.values()).await
    }
}

/// Truncating mean; the result of averaging i64 values always fits in i64.
fn mean(sum: i128, count: usize) -> i64 {
    let avg = sum / count as i128;
    i64::try_from(avg).unwrap_or(if avg < 0 { i64::MIN } else { i64::MAX })
}
