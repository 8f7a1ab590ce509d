//! Group rotation over the instrument universe.
//!
//! The universe is cut into contiguous groups of `group_size`; slot `s` is
//! served by group `s mod total_groups`. With hourly slots derived from epoch
//! time, the rotation carries on across day boundaries without any state.

use klinesync_core::{Instrument, ScheduleConfig, SyncError};

/// One contiguous slice of the instrument universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentGroup {
    /// Position of the group in the rotation.
    pub index: usize,
    /// Members, in universe order.
    pub instruments: Vec<Instrument>,
}

/// Partition `universe` into groups of `group_size`; the last group may be smaller.
///
/// # Errors
/// Returns `SyncError::InvalidArg` when `group_size` is zero.
pub fn groups_of(
    universe: &[Instrument],
    group_size: usize,
) -> Result<Vec<InstrumentGroup>, SyncError> {
    if group_size == 0 {
        return Err(SyncError::InvalidArg("group size must be positive".into()));
    }
    Ok(universe
        .chunks(group_size)
        .enumerate()
        .map(|(index, chunk)| InstrumentGroup {
            index,
            instruments: chunk.to_vec(),
        })
        .collect())
}

/// Group index serving `slot`, or `None` when there are no groups.
#[must_use]
pub fn group_for_slot(slot: u64, total_groups: usize) -> Option<usize> {
    let total = u64::try_from(total_groups).ok().filter(|t| *t > 0)?;
    usize::try_from(slot % total).ok()
}

/// Maps wall-clock slots onto instrument groups.
#[derive(Debug, Clone)]
pub struct GroupScheduler {
    groups: Vec<InstrumentGroup>,
    slot_duration_ms: u64,
}

impl GroupScheduler {
    /// Scheduler over `universe`.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` when the group size or slot duration is zero.
    pub fn new(universe: &[Instrument], config: &ScheduleConfig) -> Result<Self, SyncError> {
        if config.slot_duration_ms == 0 {
            return Err(SyncError::InvalidArg(
                "slot duration must be positive".into(),
            ));
        }
        Ok(Self {
            groups: groups_of(universe, config.group_size)?,
            slot_duration_ms: config.slot_duration_ms,
        })
    }

    /// All groups in rotation order.
    #[must_use]
    pub fn groups(&self) -> &[InstrumentGroup] {
        &self.groups
    }

    /// Number of groups in the rotation.
    #[must_use]
    pub fn total_groups(&self) -> usize {
        self.groups.len()
    }

    /// Group serving `slot`.
    #[must_use]
    pub fn group_at(&self, slot: u64) -> Option<&InstrumentGroup> {
        group_for_slot(slot, self.groups.len()).and_then(|i| self.groups.get(i))
    }

    /// Instruments due in `slot`; empty when the universe is empty.
    #[must_use]
    pub fn instruments_for_slot(&self, slot: u64) -> &[Instrument] {
        self.group_at(slot)
            .map(|g| g.instruments.as_slice())
            .unwrap_or_default()
    }

    /// Slot containing `now_ms`. Times before the epoch fall in slot 0.
    #[must_use]
    pub fn slot_at(&self, now_ms: i64) -> u64 {
        u64::try_from(now_ms).unwrap_or(0) / self.slot_duration_ms
    }
}
