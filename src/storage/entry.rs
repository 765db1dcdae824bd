//! Entry: packed records of one type sharing one major key
//!
//! The byte buffer is shared with every outstanding `Handle` through an `Arc`.
//! Appending needs exclusive access to the buffer, so growth is refused while
//! any handle is alive and handles never observe a reallocation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use crate::error::{OsmdbError, Result};
use crate::storage::record::{
    self, IdListView, NodeCoordView, NodeInfoView, RangeView, Record, RecordType,
    RelInfoView, RelMembersView, WayInfoView, LIST_HEADER,
};

/// Location of one record inside the buffer
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: usize,
    len: usize,
}

#[derive(Debug, Default)]
struct Packed {
    bytes: Vec<u8>,
    // minor key -> slot, built on first read
    slots: OnceLock<HashMap<u32, Slot>>,
}

/// Contiguous buffer of records of one type sharing one major key
#[derive(Debug)]
pub struct Entry {
    kind: RecordType,
    major: i64,
    dirty: bool,
    packed: Arc<Packed>,
}

impl Entry {
    /// Create an empty entry
    pub fn new(kind: RecordType, major: i64) -> Self {
        Self {
            kind,
            major,
            dirty: false,
            packed: Arc::new(Packed::default()),
        }
    }

    pub fn kind(&self) -> RecordType {
        self.kind
    }

    pub fn major(&self) -> i64 {
        self.major
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Packed bytes, exactly as persisted
    pub fn bytes(&self) -> &[u8] {
        &self.packed.bytes
    }

    pub fn len(&self) -> usize {
        self.packed.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packed.bytes.is_empty()
    }

    /// Bytes charged against the cache budget
    pub fn cost(&self) -> usize {
        self.packed.bytes.len()
    }

    /// Number of outstanding handles
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.packed) - 1
    }

    fn packed_mut(&mut self) -> Result<&mut Packed> {
        let refs = self.refcount();
        Arc::get_mut(&mut self.packed).ok_or_else(|| {
            OsmdbError::Protocol(format!(
                "cannot grow {} entry {} with {} outstanding handles",
                self.kind.table_name(), self.major, refs
            ))
        })
    }

    /// Append packed records to the tail of the buffer.
    ///
    /// `from_disk` marks a bulk load from the store, which leaves the entry
    /// clean. Fails while handles are outstanding.
    pub fn append(&mut self, bytes: &[u8], from_disk: bool) -> Result<()> {
        let packed = self.packed_mut()?;
        // new records must show up in the sub-index
        packed.slots.take();

        let needed = packed.bytes.len() + bytes.len();
        if needed > packed.bytes.capacity() {
            let target = needed.max(packed.bytes.capacity() * 2);
            packed.bytes.try_reserve_exact(target - packed.bytes.len())?;
        }
        packed.bytes.extend_from_slice(bytes);

        if !from_disk {
            self.dirty = true;
        }
        Ok(())
    }

    /// Append one reference to a tile-refs entry.
    ///
    /// The first reference seeds the header `{id: major, count: 0}`; every
    /// reference increments the header count.
    pub fn append_tile_ref(&mut self, ref_id: i64) -> Result<()> {
        if !self.kind.is_tile_refs() {
            return Err(OsmdbError::Protocol(format!(
                "{} is not a tile-refs type", self.kind.table_name()
            )));
        }
        if self.is_empty() {
            let header = record::tile_refs_header(self.kind, self.major);
            self.append(&header, false)?;
        }
        self.append(&ref_id.to_le_bytes(), false)?;

        let packed = self.packed_mut()?;
        let count = record::read_u32(&packed.bytes, 4) + 1;
        packed.bytes[4..8].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }

    /// Look up a record by minor key.
    ///
    /// Builds the sub-index on first call. A miss is `Ok(None)`; a buffer
    /// that cannot be mapped is a corruption error.
    pub fn get(&self, minor: u32) -> Result<Option<Handle>> {
        let slots = match self.packed.slots.get() {
            Some(slots) => slots,
            None => {
                let built = self.build_slots()?;
                // another reader may have won the race, both maps are equal
                let _ = self.packed.slots.set(built);
                match self.packed.slots.get() {
                    Some(slots) => slots,
                    None => return Ok(None),
                }
            }
        };

        Ok(slots.get(&minor).map(|slot| Handle {
            packed: Arc::clone(&self.packed),
            kind: self.kind,
            major: self.major,
            offset: slot.offset,
            len: slot.len,
        }))
    }

    /// Return a handle obtained from `get`
    pub fn put(handle: Handle) {
        drop(handle);
    }

    /// Scan the buffer and map each record's minor key to its location
    fn build_slots(&self) -> Result<HashMap<u32, Slot>> {
        let bytes = &self.packed.bytes;
        let mut slots = HashMap::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let (kind, len) = record::record_size(&bytes[offset..])?;
            if kind != self.kind {
                return Err(OsmdbError::Corruption(format!(
                    "{} record at offset {} inside {} entry {}",
                    kind.table_name(), offset, self.kind.table_name(), self.major
                )));
            }
            let id = record::record_id(&bytes[offset..]);
            if kind.major_key(id) != self.major {
                return Err(OsmdbError::Corruption(format!(
                    "record {} does not belong to {} entry {}",
                    id, kind.table_name(), self.major
                )));
            }
            // later records supersede earlier ones with the same id
            slots.insert(kind.minor_key(id), Slot { offset, len });
            offset += len;

            if kind.is_tile_refs() {
                break;
            }
        }

        Ok(slots)
    }

    /// Iterate over all records in buffer order
    pub fn records(&self) -> Result<Vec<Record<'_>>> {
        let bytes = self.bytes();
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (kind, len) = record::record_size(&bytes[offset..])?;
            out.push(Record::view(kind, &bytes[offset..offset + len]));
            offset += len;
        }
        Ok(out)
    }
}

/// Co-owned view of one record inside an entry.
///
/// Dropping the handle (or passing it to `Index::put`) releases it.
#[derive(Debug)]
pub struct Handle {
    packed: Arc<Packed>,
    kind: RecordType,
    major: i64,
    offset: usize,
    len: usize,
}

impl Handle {
    pub fn kind(&self) -> RecordType {
        self.kind
    }

    /// Major key of the owning entry
    pub fn major(&self) -> i64 {
        self.major
    }

    /// Raw bytes of the record
    pub fn bytes(&self) -> &[u8] {
        &self.packed.bytes[self.offset..self.offset + self.len]
    }

    pub fn record(&self) -> Record<'_> {
        Record::view(self.kind, self.bytes())
    }

    pub fn node_coord(&self) -> Option<NodeCoordView<'_>> {
        match self.record() {
            Record::NodeCoord(v) => Some(v),
            _ => None,
        }
    }

    pub fn node_info(&self) -> Option<NodeInfoView<'_>> {
        match self.record() {
            Record::NodeInfo(v) => Some(v),
            _ => None,
        }
    }

    pub fn way_info(&self) -> Option<WayInfoView<'_>> {
        match self.record() {
            Record::WayInfo(v) => Some(v),
            _ => None,
        }
    }

    /// WayRange or RelRange
    pub fn range(&self) -> Option<RangeView<'_>> {
        match self.record() {
            Record::WayRange(v) | Record::RelRange(v) => Some(v),
            _ => None,
        }
    }

    /// WayNds or TileRefs
    pub fn id_list(&self) -> Option<IdListView<'_>> {
        match self.record() {
            Record::WayNds(v) | Record::TileRefs(v) => Some(v),
            _ => None,
        }
    }

    pub fn rel_info(&self) -> Option<RelInfoView<'_>> {
        match self.record() {
            Record::RelInfo(v) => Some(v),
            _ => None,
        }
    }

    pub fn rel_members(&self) -> Option<RelMembersView<'_>> {
        match self.record() {
            Record::RelMembers(v) => Some(v),
            _ => None,
        }
    }
}
