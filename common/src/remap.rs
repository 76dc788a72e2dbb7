//! Remap table and the builder that accumulates it from decoded switches

use enum_map::EnumMap;
use std::collections::BTreeMap;

use crate::args::ParseError;
use crate::switch::IdKind;

/// One-to-one mapping of source ids to target ids for either uids or gids.
///
/// Neither side of a mapping is ever 0 and every source id appears at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdMap {
    map: BTreeMap<u32, u32>,
}

impl IdMap {
    /// Target id for `id`, looked up on the original id only (remaps never chain).
    ///
    /// Root (0) is never remapped.
    pub fn get(&self, id: u32) -> Option<u32> {
        if id == 0 {
            return None;
        }
        self.map.get(&id).copied()
    }

    fn contains(&self, from: u32) -> bool {
        self.map.contains_key(&from)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Validated uid and gid remaps
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapTable {
    maps: EnumMap<IdKind, IdMap>,
}

impl RemapTable {
    pub fn map(&self, kind: IdKind) -> &IdMap {
        &self.maps[kind]
    }

    pub fn uid(&self) -> &IdMap {
        self.map(IdKind::Uid)
    }

    pub fn gid(&self) -> &IdMap {
        self.map(IdKind::Gid)
    }

    /// True when there are neither uid nor gid remaps
    pub fn is_empty(&self) -> bool {
        self.maps.values().all(IdMap::is_empty)
    }

    /// Add a remap, rejecting root ids and duplicate source ids. The table is left unchanged
    /// on error.
    pub fn insert(&mut self, kind: IdKind, from: u32, to: u32) -> Result<(), ParseError> {
        if from == 0 || to == 0 {
            return Err(ParseError::RootRemap(kind));
        }
        let map = &mut self.maps[kind];
        if map.contains(from) {
            return Err(ParseError::DuplicateRemap { kind, from });
        }
        map.map.insert(from, to);
        Ok(())
    }
}

/// Mode switches; once set they stay set no matter how many times they appear
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseFlags {
    pub dry_run: bool,
    pub verbose: bool,
}

/// Accumulates remaps and flags for a single parse
#[derive(Debug, Default)]
pub struct RemapTableBuilder {
    table: RemapTable,
    flags: ParseFlags,
}

impl RemapTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remap(&mut self, kind: IdKind, from: u32, to: u32) -> Result<(), ParseError> {
        tracing::trace!("adding {} remap {} -> {}", kind, from, to);
        self.table.insert(kind, from, to)
    }

    pub fn set_dry_run(&mut self) {
        self.flags.dry_run = true;
    }

    pub fn set_verbose(&mut self) {
        self.flags.verbose = true;
    }

    pub fn build(self) -> (RemapTable, ParseFlags) {
        (self.table, self.flags)
    }
}
