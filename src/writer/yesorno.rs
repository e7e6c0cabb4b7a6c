use crate::ingest::sample::CompositeKey;
use crate::persist::{write_point, Consolidation, PersistError, RoundRobinStore, RrdSchema};

const SCHEMA: RrdSchema = RrdSchema {
    data_sources: &["ok", "fail"],
    consolidations: &[Consolidation::Average],
};

/// Success and failure counts of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YesOrNoStats {
    pub ok: i64,
    pub fail: i64,
}

/// Success-ratio writer: positive samples count as success, the rest as
/// failure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct YesOrNo;

impl YesOrNo {
    pub fn name(&self) -> &'static str {
        "yesno"
    }

    pub fn compute(samples: &[i64]) -> YesOrNoStats {
        samples.iter().fold(YesOrNoStats::default(), |mut stats, &v| {
            if v > 0 {
                stats.ok += 1;
            } else {
                stats.fail += 1;
            }
            stats
        })
    }

    pub async fn rollup<S: RoundRobinStore>(
        &self,
        store: &S,
        time: i64,
        key: &CompositeKey,
        samples: &[i64],
    ) -> Result<(), PersistError> {
        let stats = Self::compute(samples);
        write_point(store, self.name(), &SCHEMA, key, time, &[stats.ok, stats.fail]).await
    }
}
