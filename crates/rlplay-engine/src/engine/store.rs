use std::sync::Arc;

use rlplay_stats::running::RunningStats;

use crate::core::StepRecord;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("episode index {index} arrived after episode index {last}")]
pub struct OutOfOrderError {
    pub last: u32,
    pub index: u32,
}

/// Ordered, append-only buffer of the active run's records.
///
/// Index `i` in the store is playback position `i`. Records are shared
/// (`Arc`) so that [`ResultStore::snapshot`] hands out a stable view that a
/// reader can keep while appends continue.
///
/// The only ways to shrink the store are [`ResultStore::clear`] and
/// [`ResultStore::replace_all`].
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: Vec<Arc<StepRecord>>,
    stats: RunningStats,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, returning its index.
    ///
    /// Fails without modifying the store if `episode_index` would decrease.
    pub fn append(&mut self, record: StepRecord) -> Result<usize, OutOfOrderError> {
        if let Some(last) = self.records.last()
            && record.episode_index < last.episode_index
        {
            return Err(OutOfOrderError {
                last: last.episode_index,
                index: record.episode_index,
            });
        }
        self.stats.push(record.reward);
        self.records.push(Arc::new(record));
        Ok(self.records.len() - 1)
    }

    /// Replaces the whole buffer (bulk import).
    ///
    /// The batch is checked first; on error the store is left unchanged.
    pub fn replace_all<I>(&mut self, records: I) -> Result<(), OutOfOrderError>
    where
        I: IntoIterator<Item = StepRecord>,
    {
        let records = records.into_iter().collect::<Vec<_>>();
        for pair in records.windows(2) {
            if pair[1].episode_index < pair[0].episode_index {
                return Err(OutOfOrderError {
                    last: pair[0].episode_index,
                    index: pair[1].episode_index,
                });
            }
        }
        self.clear();
        for record in records {
            self.stats.push(record.reward);
            self.records.push(Arc::new(record));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.stats = RunningStats::new();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StepRecord> {
        self.records.get(index).map(Arc::as_ref)
    }

    #[must_use]
    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last().map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> + '_ {
        self.records.iter().map(Arc::as_ref)
    }

    /// Returns a point-in-time copy of the buffer.
    ///
    /// Later appends are not visible through the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<StepRecord>> {
        self.records.clone()
    }

    /// Running reward aggregates over every appended record.
    #[must_use]
    pub const fn stats(&self) -> &RunningStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::core::AgentState;

    fn record(index: u32, reward: f64) -> StepRecord {
        StepRecord::new(index, reward, AgentState::Arm(0), 0)
    }

    #[test]
    fn test_append_keeps_arrival_order() {
        let mut store = ResultStore::new();
        assert_eq!(store.append(record(0, 1.0)), Ok(0));
        assert_eq!(store.append(record(0, 2.0)), Ok(1));
        assert_eq!(store.append(record(3, -1.0)), Ok(2));
        assert_eq!(store.get(1).map(|r| r.reward), Some(2.0));
        assert_eq!(store.stats().max(), Some(2.0));
        assert_eq!(store.stats().min(), Some(-1.0));
        assert_eq!(store.stats().last(), Some(-1.0));
    }

    #[test]
    fn test_append_rejects_decreasing_index() {
        let mut store = ResultStore::new();
        store.append(record(4, 0.0)).unwrap();
        assert_eq!(
            store.append(record(3, 0.0)),
            Err(OutOfOrderError { last: 4, index: 3 })
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().count(), 1);
    }

    #[test]
    fn test_snapshot_is_not_torn_by_appends() {
        let mut store = ResultStore::new();
        store.append(record(0, 0.0)).unwrap();
        let snapshot = store.snapshot();
        store.append(record(1, 0.0)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replace_all_is_all_or_nothing() {
        let mut store = ResultStore::new();
        store.append(record(0, 5.0)).unwrap();
        assert!(store.replace_all([record(2, 0.0), record(1, 0.0)]).is_err());
        assert_eq!(store.len(), 1);

        store.replace_all([record(0, 1.0), record(1, 3.0)]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().mean(), Some(2.0));
    }

    #[test]
    fn test_clear_resets_aggregates() {
        let mut store = ResultStore::new();
        store.append(record(0, 5.0)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats().mean(), None);
        // a cleared store accepts any starting index again
        store.append(record(0, 0.0)).unwrap();
    }

    proptest! {
        #[test]
        fn prop_stored_indices_never_decrease(indices in prop::collection::vec(0u32..20, 0..64)) {
            let mut store = ResultStore::new();
            for index in indices {
                let _ = store.append(record(index, 0.0));
            }
            let stored = store.iter().map(|r| r.episode_index).collect::<Vec<_>>();
            prop_assert!(stored.is_sorted());
        }
    }
}
