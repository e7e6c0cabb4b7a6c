pub mod quartiles;
pub mod yesorno;

use crate::ingest::sample::CompositeKey;
use crate::persist::{PersistError, RoundRobinStore};

pub use self::quartiles::{Quartiles, QuartilesStats};
pub use self::yesorno::{YesOrNo, YesOrNoStats};

/// Rollup writer: turns one series' samples for one window into a
/// persisted statistic.
///
/// Uses enum dispatch over the closed set of strategies, so the rollup
/// loop can stay generic over the persistence backend without boxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Quartiles(Quartiles),
    YesOrNo(YesOrNo),
}

impl Writer {
    /// Every writer, in the order the rollup applies them.
    pub fn defaults() -> Vec<Self> {
        vec![Self::Quartiles(Quartiles), Self::YesOrNo(YesOrNo)]
    }

    /// Returns the writer name, also the statistic's file prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Quartiles(w) => w.name(),
            Self::YesOrNo(w) => w.name(),
        }
    }

    /// Computes and persists the statistic for `samples` at window `time`.
    pub async fn rollup<S: RoundRobinStore>(
        &self,
        store: &S,
        time: i64,
        key: &CompositeKey,
        samples: &[i64],
    ) -> Result<(), PersistError> {
        match self {
            Self::Quartiles(w) => w.rollup(store, time, key, samples).await,
            Self::YesOrNo(w) => w.rollup(store, time, key, samples).await,
        }
    }
}
