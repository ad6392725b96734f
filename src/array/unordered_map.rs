use super::storage::{zeroed, Run, Storage};
use super::Dist;
use crate::dart::{Dart, DartError, DartResult, TeamId};

use std::sync::Arc;
use tracing::debug;

/// A distributed map with a fixed number of slots per unit.
///
/// Every unit inserts into its own slots. [`commit`](UnorderedMap::commit) is collective and
/// publishes the number of entries of every unit; lookups of remote entries see the state of
/// the last commit. Keys are unique within the slots of a unit, not across units: a key
/// inserted on two units is found on the calling unit first, then on the unit with the
/// lowest id.
pub struct UnorderedMap<K: Dist + PartialEq, V: Dist> {
    entries: Storage<(K, V)>,
    counts: Storage<u64>,
    len: usize,
}

impl<K: Dist + PartialEq, V: Dist> UnorderedMap<K, V> {
    /// Collective over `team`: a map holding up to `capacity` entries on every unit.
    pub fn new(dart: Arc<Dart>, team: TeamId, capacity: usize) -> DartResult<Self> {
        let entries = Storage::new(dart.clone(), team, capacity)?;
        let counts = Storage::new(dart, team, 1)?;
        Ok(UnorderedMap {
            entries,
            counts,
            len: 0,
        })
    }

    pub fn team(&self) -> TeamId {
        self.entries.team()
    }

    /// Entries a unit can hold.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Entries inserted by the calling unit, committed or not.
    pub fn local_len(&self) -> usize {
        self.len
    }

    fn local_entries(&self) -> &[(K, V)] {
        // the calling unit is the only writer of its slots
        unsafe { self.entries.local_slice(self.len) }
    }

    /// Insert into the slots of the calling unit, returning the previous value of `key` there.
    pub fn insert(&mut self, key: K, value: V) -> DartResult<Option<V>> {
        let me = self.entries.myid();
        if let Some(pos) = self.local_entries().iter().position(|(k, _)| *k == key) {
            let old = self.local_entries()[pos].1;
            self.entries.write(me, pos, &[(key, value)])?;
            return Ok(Some(old));
        }
        if self.len == self.capacity() {
            return Err(DartError::ResourceExhausted(format!(
                "all {} slots of unit {} are in use",
                self.capacity(),
                me
            )));
        }
        self.entries.write(me, self.len, &[(key, value)])?;
        self.len += 1;
        Ok(None)
    }

    /// Collective: publish the entries of every unit.
    pub fn commit(&mut self) -> DartResult<()> {
        let me = self.counts.myid();
        self.counts.write(me, 0, &[self.len as u64])?;
        debug!("unit {} committed {} map entries", me, self.len);
        self.counts.barrier()
    }

    fn published(&self, unit: usize) -> DartResult<usize> {
        let mut count = [0u64];
        self.counts.read(unit, 0, &mut count)?;
        Ok(count[0] as usize)
    }

    /// Look `key` up on the calling unit, then on the other units in order.
    pub fn find(&self, key: &K) -> DartResult<Option<V>> {
        if let Some((_, v)) = self.local_entries().iter().find(|(k, _)| k == key) {
            return Ok(Some(*v));
        }
        let me = self.entries.myid();
        let nunits = self.entries.dart().team_size(self.team())?;
        for unit in (0..nunits).filter(|u| *u != me) {
            let count = self.published(unit)?;
            if count == 0 {
                continue;
            }
            let mut remote = zeroed::<(K, V)>(count);
            let run = Run {
                pos: 0,
                unit,
                index: 0,
                len: count,
            };
            self.entries.read_runs(&[run], &mut remote)?;
            if let Some((_, v)) = remote.iter().find(|(k, _)| k == key) {
                return Ok(Some(*v));
            }
        }
        Ok(None)
    }

    /// Number of entries of the last commit, over all units.
    pub fn len(&self) -> DartResult<usize> {
        let nunits = self.entries.dart().team_size(self.team())?;
        (0..nunits).map(|u| self.published(u)).sum()
    }

    pub fn is_empty(&self) -> DartResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn barrier(&self) -> DartResult<()> {
        self.entries.barrier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart::{DartErrorCode, TEAM_ALL};
    use crate::env_var::Config;
    use crate::transport::local::launch;

    #[test]
    fn insert_commit_find() {
        let res = launch(3, Config::default(), |dart| {
            let me = dart.my_id() as u64;
            let mut map = UnorderedMap::<u64, f64>::new(dart.clone(), TEAM_ALL, 8).unwrap();
            for k in 0..4 {
                assert_eq!(map.insert(me * 10 + k, k as f64).unwrap(), None);
            }
            assert_eq!(map.insert(me * 10, 0.5).unwrap(), Some(0.0));
            assert_eq!(map.local_len(), 4);
            map.commit().unwrap();
            let len = map.len().unwrap();
            let found = map.find(&21).unwrap();
            let own = map.find(&(me * 10)).unwrap();
            let missing = map.find(&99).unwrap();
            map.barrier().unwrap();
            (len, found, own, missing)
        });
        for (len, found, own, missing) in res {
            assert_eq!(len, 12);
            assert_eq!(found, Some(1.0));
            assert_eq!(own, Some(0.5));
            assert_eq!(missing, None);
        }
    }

    #[test]
    fn uncommitted_entries_are_local() {
        let res = launch(2, Config::default(), |dart| {
            let mut map = UnorderedMap::<u32, u32>::new(dart.clone(), TEAM_ALL, 2).unwrap();
            map.commit().unwrap();
            map.insert(dart.my_id() as u32, 7).unwrap();
            let other = 1 - dart.my_id() as u32;
            let remote = map.find(&other).unwrap();
            let local = map.find(&(dart.my_id() as u32)).unwrap();
            map.insert(5, 5).unwrap();
            let full = map.insert(6, 6).map_err(|e| e.code());
            map.barrier().unwrap();
            (remote, local, full)
        });
        for (remote, local, full) in res {
            assert_eq!(remote, None);
            assert_eq!(local, Some(7));
            assert_eq!(full, Err(DartErrorCode::ResourceExhausted));
        }
    }
}
