use super::error::{DartError, DartResult};
use super::handle::HandleQueue;
use crate::transport::SegmentId;

use indexmap::IndexMap;

/// Team-local identifier of a collective allocation. `0` designates the private segment.
pub type LogicalSegId = i16;

/// One collective allocation as seen from the local unit.
#[derive(Debug, Clone)]
pub(crate) struct SegmentEntry {
    pub(crate) segid: LogicalSegId,
    pub(crate) size: usize,
    pub(crate) own_segment: SegmentId,
    /// Transport segment id of every team member, indexed by team-relative unit.
    pub(crate) segments: Vec<SegmentId>,
    /// Outstanding transfers towards every team member.
    pub(crate) queues: Vec<HandleQueue>,
}

impl SegmentEntry {
    pub(crate) fn new(
        segid: LogicalSegId,
        size: usize,
        own_segment: SegmentId,
        segments: Vec<SegmentId>,
    ) -> SegmentEntry {
        let queues = vec![HandleQueue::new(); segments.len()];
        SegmentEntry {
            segid,
            size,
            own_segment,
            segments,
            queues,
        }
    }
}

fn unknown(segid: LogicalSegId) -> DartError {
    DartError::InvalidArgument(format!("unknown segment id {}", segid))
}

/// Address translation of every collective segment of a team, in allocation order.
#[derive(Debug, Clone, Default)]
pub(crate) struct TranslationTable {
    rows: IndexMap<LogicalSegId, SegmentEntry>,
}

impl TranslationTable {
    pub(crate) fn new() -> TranslationTable {
        TranslationTable {
            rows: IndexMap::new(),
        }
    }

    pub(crate) fn add(&mut self, entry: SegmentEntry) -> DartResult<()> {
        if self.rows.contains_key(&entry.segid) {
            return Err(DartError::InvalidArgument(format!(
                "segment id {} is already in use",
                entry.segid
            )));
        }
        self.rows.insert(entry.segid, entry);
        Ok(())
    }

    pub(crate) fn remove(&mut self, segid: LogicalSegId) -> DartResult<SegmentEntry> {
        self.rows.shift_remove(&segid).ok_or_else(|| unknown(segid))
    }

    pub(crate) fn get(&self, segid: LogicalSegId) -> DartResult<&SegmentEntry> {
        self.rows.get(&segid).ok_or_else(|| unknown(segid))
    }

    pub(crate) fn get_mut(&mut self, segid: LogicalSegId) -> DartResult<&mut SegmentEntry> {
        self.rows.get_mut(&segid).ok_or_else(|| unknown(segid))
    }

    pub(crate) fn transport_segment(
        &self,
        segid: LogicalSegId,
        rel_unit: usize,
    ) -> DartResult<SegmentId> {
        let entry = self.get(segid)?;
        entry.segments.get(rel_unit).copied().ok_or_else(|| {
            DartError::InvalidArgument(format!(
                "unit {} is not part of segment {}",
                rel_unit, segid
            ))
        })
    }

    pub(crate) fn size(&self, segid: LogicalSegId) -> DartResult<usize> {
        Ok(self.get(segid)?.size)
    }

    pub(crate) fn own_segment(&self, segid: LogicalSegId) -> DartResult<SegmentId> {
        Ok(self.get(segid)?.own_segment)
    }

    pub(crate) fn handle_queue(
        &mut self,
        segid: LogicalSegId,
        rel_unit: usize,
    ) -> DartResult<&mut HandleQueue> {
        let entry = self.rows.get_mut(&segid).ok_or_else(|| unknown(segid))?;
        entry.queues.get_mut(rel_unit).ok_or_else(|| {
            DartError::InvalidArgument(format!(
                "unit {} is not part of segment {}",
                rel_unit, segid
            ))
        })
    }

    /// Logical ids in allocation order.
    pub(crate) fn segids(&self) -> Vec<LogicalSegId> {
        self.rows.keys().copied().collect()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut SegmentEntry> {
        self.rows.values_mut()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        let mut table = TranslationTable::new();
        table.add(SegmentEntry::new(3, 128, 3, vec![3, 5, 4])).unwrap();
        table.add(SegmentEntry::new(1, 64, 2, vec![1, 2, 1])).unwrap();
        assert_eq!(table.transport_segment(3, 1), Ok(5));
        assert_eq!(table.size(1), Ok(64));
        assert_eq!(table.own_segment(1), Ok(2));
        assert_eq!(table.segids(), vec![3, 1]);
        assert!(table.transport_segment(3, 3).is_err());
        assert!(table.size(2).is_err());
        table.handle_queue(3, 2).unwrap();
        assert!(table.handle_queue(3, 7).is_err());
    }

    #[test]
    fn remove_keeps_order() {
        let mut table = TranslationTable::new();
        for id in 1..=4 {
            table
                .add(SegmentEntry::new(id, 8, id as SegmentId, vec![id as SegmentId]))
                .unwrap();
        }
        assert!(table.add(SegmentEntry::new(2, 8, 9, vec![9])).is_err());
        assert_eq!(table.remove(2).unwrap().own_segment, 2);
        assert!(table.remove(2).is_err());
        assert_eq!(table.segids(), vec![1, 3, 4]);
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
    }
}
