//! Packed binary records
//!
//! Every record is a fixed header followed by an optional tail. The header
//! starts with a `u32` type tag, so a buffer of records can be walked without
//! any side table. All integers are little-endian.
//!
//! Owned structs (`NodeCoord`, `WayNds`, ...) are used on the write path;
//! `*View` types borrow a record inside an entry buffer without copying.

use crate::config::ENTRY_SIZE;
use crate::error::{OsmdbError, Result};

/// Тип записи. Значение тега хранится в первых 4 байтах каждой записи.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    NodeCoord = 0,
    NodeInfo = 1,
    WayInfo = 2,
    WayRange = 3,
    WayNds = 4,
    RelInfo = 5,
    RelMembers = 6,
    RelRange = 7,
    NodeTile9 = 8,
    NodeTile12 = 9,
    NodeTile15 = 10,
    WayTile9 = 11,
    WayTile12 = 12,
    WayTile15 = 13,
    RelTile9 = 14,
    RelTile12 = 15,
    RelTile15 = 16,
}

impl RecordType {
    pub const ALL: [RecordType; 17] = [
        RecordType::NodeCoord,
        RecordType::NodeInfo,
        RecordType::WayInfo,
        RecordType::WayRange,
        RecordType::WayNds,
        RecordType::RelInfo,
        RecordType::RelMembers,
        RecordType::RelRange,
        RecordType::NodeTile9,
        RecordType::NodeTile12,
        RecordType::NodeTile15,
        RecordType::WayTile9,
        RecordType::WayTile12,
        RecordType::WayTile15,
        RecordType::RelTile9,
        RecordType::RelTile12,
        RecordType::RelTile15,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Name used in `tbl_<name>`
    pub fn table_name(self) -> &'static str {
        match self {
            RecordType::NodeCoord => "nodeCoord",
            RecordType::NodeInfo => "nodeInfo",
            RecordType::WayInfo => "wayInfo",
            RecordType::WayRange => "wayRange",
            RecordType::WayNds => "wayNds",
            RecordType::RelInfo => "relInfo",
            RecordType::RelMembers => "relMembers",
            RecordType::RelRange => "relRange",
            RecordType::NodeTile9 => "nodeTile9",
            RecordType::NodeTile12 => "nodeTile12",
            RecordType::NodeTile15 => "nodeTile15",
            RecordType::WayTile9 => "wayTile9",
            RecordType::WayTile12 => "wayTile12",
            RecordType::WayTile15 => "wayTile15",
            RecordType::RelTile9 => "relTile9",
            RecordType::RelTile12 => "relTile12",
            RecordType::RelTile15 => "relTile15",
        }
    }

    pub fn is_tile_refs(self) -> bool {
        self.tag() >= RecordType::NodeTile9.tag()
    }

    pub fn node_tile(zoom: i32) -> Option<Self> {
        match zoom {
            9 => Some(RecordType::NodeTile9),
            12 => Some(RecordType::NodeTile12),
            15 => Some(RecordType::NodeTile15),
            _ => None,
        }
    }

    pub fn way_tile(zoom: i32) -> Option<Self> {
        match zoom {
            9 => Some(RecordType::WayTile9),
            12 => Some(RecordType::WayTile12),
            15 => Some(RecordType::WayTile15),
            _ => None,
        }
    }

    pub fn rel_tile(zoom: i32) -> Option<Self> {
        match zoom {
            9 => Some(RecordType::RelTile9),
            12 => Some(RecordType::RelTile12),
            15 => Some(RecordType::RelTile15),
            _ => None,
        }
    }

    /// Major key of the entry holding `id`
    pub fn major_key(self, id: i64) -> i64 {
        if self.is_tile_refs() {
            id
        } else {
            id.div_euclid(ENTRY_SIZE)
        }
    }

    /// Minor key of `id` inside its entry (always 0 for tile refs)
    pub fn minor_key(self, id: i64) -> u32 {
        if self.is_tile_refs() {
            0
        } else {
            id.rem_euclid(ENTRY_SIZE) as u32
        }
    }

    /// Fixed header size of this record type
    pub fn header_size(self) -> usize {
        match self {
            RecordType::NodeCoord => NODE_COORD_SIZE,
            RecordType::NodeInfo => NODE_INFO_HEADER,
            RecordType::WayInfo => WAY_INFO_HEADER,
            RecordType::WayRange | RecordType::RelRange => RANGE_SIZE,
            RecordType::WayNds => LIST_HEADER,
            RecordType::RelInfo => REL_INFO_HEADER,
            RecordType::RelMembers => LIST_HEADER,
            _ => LIST_HEADER,
        }
    }
}

pub const NODE_COORD_SIZE: usize = 32;
pub const NODE_INFO_HEADER: usize = 32;
pub const WAY_INFO_HEADER: usize = 32;
pub const RANGE_SIZE: usize = 48;
pub const REL_INFO_HEADER: usize = 40;
/// Header of WayNds, RelMembers and TileRefs: tag, count, id
pub const LIST_HEADER: usize = 16;
pub const MEMBER_SIZE: usize = 16;

// Helpers: read from potentially unaligned bytes. Callers only pass offsets
// inside a record whose size was checked by `record_size`.
fn bytes_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes_at(bytes, offset))
}

pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(bytes_at(bytes, offset))
}

pub(crate) fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(bytes_at(bytes, offset))
}

pub(crate) fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(bytes_at(bytes, offset))
}

/// Padded length of a name tail: `len + 1` rounded up to 4
pub fn padded_name_len(name: &str) -> usize {
    (name.len() + 1 + 3) & !3
}

/// Append a NUL-terminated name padded to a multiple of 4
pub fn add_name(out: &mut Vec<u8>, name: &str) {
    let padded = padded_name_len(name);
    out.extend_from_slice(name.as_bytes());
    out.resize(out.len() + padded - name.len(), 0);
}

fn name_tail_len(name: Option<&str>) -> usize {
    name.map_or(0, padded_name_len)
}

/// Decode a padded name tail: the bytes up to the first NUL
pub(crate) fn decode_name(tail: &[u8]) -> Result<Option<&str>> {
    if tail.is_empty() {
        return Ok(None);
    }
    if tail.len() % 4 != 0 {
        return Err(OsmdbError::Corruption(format!(
            "name tail of {} bytes is not padded", tail.len()
        )));
    }
    let end = tail.iter().position(|&b| b == 0).ok_or_else(|| {
        OsmdbError::Corruption("name is not NUL-terminated".into())
    })?;
    let name = std::str::from_utf8(&tail[..end])
        .map_err(|e| OsmdbError::Corruption(format!("name is not UTF-8: {}", e)))?;
    Ok(Some(name))
}

fn check_len(bytes: &[u8], need: usize, kind: RecordType) -> Result<()> {
    if bytes.len() < need {
        return Err(OsmdbError::Corruption(format!(
            "{} record needs {} bytes, {} left", kind.table_name(), need, bytes.len()
        )));
    }
    Ok(())
}

/// Determine type and size of the record starting at `bytes[0]`.
///
/// Validates that the header and the whole tail fit in `bytes` and that any
/// name tail is NUL-terminated.
pub fn record_size(bytes: &[u8]) -> Result<(RecordType, usize)> {
    if bytes.len() < 4 {
        return Err(OsmdbError::Corruption("truncated record tag".into()));
    }
    let tag = read_u32(bytes, 0);
    let kind = RecordType::from_tag(tag)
        .ok_or_else(|| OsmdbError::Corruption(format!("unknown record type {}", tag)))?;
    let header = kind.header_size();
    check_len(bytes, header, kind)?;

    let tail = match kind {
        RecordType::NodeCoord | RecordType::WayRange | RecordType::RelRange => 0,
        RecordType::NodeInfo | RecordType::WayInfo | RecordType::RelInfo => {
            read_u32(bytes, 4) as usize
        }
        RecordType::RelMembers => read_u32(bytes, 4) as usize * MEMBER_SIZE,
        // WayNds and every TileRefs type carry an i64 list
        _ => read_u32(bytes, 4) as usize * 8,
    };
    let size = header + tail;
    check_len(bytes, size, kind)?;
    if matches!(kind, RecordType::NodeInfo | RecordType::WayInfo | RecordType::RelInfo) {
        decode_name(&bytes[header..size])?;
    }
    Ok((kind, size))
}

/// Primary id of a record (node/way/rel id, or tile id for tile refs)
pub fn record_id(bytes: &[u8]) -> i64 {
    read_i64(bytes, 8)
}

// ============================================================================
// Owned records (write path)
// ============================================================================

/// Encoding of an owned record into its packed form
pub trait PackedRecord {
    fn kind(&self) -> RecordType;

    /// Primary id (entity id, or tile id for tile refs)
    fn id(&self) -> i64;

    fn packed_size(&self) -> usize;

    fn encode_into(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.packed_size());
        self.encode_into(&mut out);
        out
    }
}

/// Bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lat_t: f64,
    pub lon_l: f64,
    pub lat_b: f64,
    pub lon_r: f64,
}

impl Bounds {
    pub fn new(lat_t: f64, lon_l: f64, lat_b: f64, lon_r: f64) -> Self {
        Self { lat_t, lon_l, lat_b, lon_r }
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            lat_t: self.lat_t.max(other.lat_t),
            lon_l: self.lon_l.min(other.lon_l),
            lat_b: self.lat_b.min(other.lat_b),
            lon_r: self.lon_r.max(other.lon_r),
        }
    }

    /// (lat, lon) of the centre
    pub fn center(&self) -> (f64, f64) {
        ((self.lat_t + self.lat_b) / 2.0, (self.lon_l + self.lon_r) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelType {
    #[default]
    None,
    Boundary,
    Multipolygon,
}

impl RelType {
    pub fn code(self) -> i32 {
        match self {
            RelType::None => 0,
            RelType::Boundary => 1,
            RelType::Multipolygon => 2,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => RelType::Boundary,
            2 => RelType::Multipolygon,
            _ => RelType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeCoord {
    pub nid: i64,
    pub lat: f64,
    pub lon: f64,
}

impl PackedRecord for NodeCoord {
    fn kind(&self) -> RecordType {
        RecordType::NodeCoord
    }

    fn id(&self) -> i64 {
        self.nid
    }

    fn packed_size(&self) -> usize {
        NODE_COORD_SIZE
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.nid.to_le_bytes());
        out.extend_from_slice(&self.lat.to_le_bytes());
        out.extend_from_slice(&self.lon.to_le_bytes());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub nid: i64,
    pub class: i32,
    pub flags: i32,
    pub ele: f64,
    pub name: Option<String>,
}

impl PackedRecord for NodeInfo {
    fn kind(&self) -> RecordType {
        RecordType::NodeInfo
    }

    fn id(&self) -> i64 {
        self.nid
    }

    fn packed_size(&self) -> usize {
        NODE_INFO_HEADER + name_tail_len(self.name.as_deref())
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&(name_tail_len(self.name.as_deref()) as u32).to_le_bytes());
        out.extend_from_slice(&self.nid.to_le_bytes());
        out.extend_from_slice(&self.class.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.ele.to_le_bytes());
        if let Some(ref name) = self.name {
            add_name(out, name);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WayInfo {
    pub wid: i64,
    pub class: i32,
    pub flags: i32,
    pub layer: i32,
    pub name: Option<String>,
}

impl PackedRecord for WayInfo {
    fn kind(&self) -> RecordType {
        RecordType::WayInfo
    }

    fn id(&self) -> i64 {
        self.wid
    }

    fn packed_size(&self) -> usize {
        WAY_INFO_HEADER + name_tail_len(self.name.as_deref())
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&(name_tail_len(self.name.as_deref()) as u32).to_le_bytes());
        out.extend_from_slice(&self.wid.to_le_bytes());
        out.extend_from_slice(&self.class.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.layer.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        if let Some(ref name) = self.name {
            add_name(out, name);
        }
    }
}

fn encode_range(out: &mut Vec<u8>, kind: RecordType, id: i64, b: &Bounds) {
    out.extend_from_slice(&kind.tag().to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&b.lat_t.to_le_bytes());
    out.extend_from_slice(&b.lon_l.to_le_bytes());
    out.extend_from_slice(&b.lat_b.to_le_bytes());
    out.extend_from_slice(&b.lon_r.to_le_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WayRange {
    pub wid: i64,
    pub bounds: Bounds,
}

impl PackedRecord for WayRange {
    fn kind(&self) -> RecordType {
        RecordType::WayRange
    }

    fn id(&self) -> i64 {
        self.wid
    }

    fn packed_size(&self) -> usize {
        RANGE_SIZE
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        encode_range(out, self.kind(), self.wid, &self.bounds);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelRange {
    pub rid: i64,
    pub bounds: Bounds,
}

impl PackedRecord for RelRange {
    fn kind(&self) -> RecordType {
        RecordType::RelRange
    }

    fn id(&self) -> i64 {
        self.rid
    }

    fn packed_size(&self) -> usize {
        RANGE_SIZE
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        encode_range(out, self.kind(), self.rid, &self.bounds);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WayNds {
    pub wid: i64,
    pub nds: Vec<i64>,
}

impl PackedRecord for WayNds {
    fn kind(&self) -> RecordType {
        RecordType::WayNds
    }

    fn id(&self) -> i64 {
        self.wid
    }

    fn packed_size(&self) -> usize {
        LIST_HEADER + 8 * self.nds.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&(self.nds.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.wid.to_le_bytes());
        for nid in &self.nds {
            out.extend_from_slice(&nid.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelInfo {
    pub rid: i64,
    /// 0 when the relation has no centre node
    pub center_nid: i64,
    pub class: i32,
    pub flags: i32,
    pub rel_type: RelType,
    pub name: Option<String>,
}

impl PackedRecord for RelInfo {
    fn kind(&self) -> RecordType {
        RecordType::RelInfo
    }

    fn id(&self) -> i64 {
        self.rid
    }

    fn packed_size(&self) -> usize {
        REL_INFO_HEADER + name_tail_len(self.name.as_deref())
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&(name_tail_len(self.name.as_deref()) as u32).to_le_bytes());
        out.extend_from_slice(&self.rid.to_le_bytes());
        out.extend_from_slice(&self.center_nid.to_le_bytes());
        out.extend_from_slice(&self.class.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.rel_type.code().to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        if let Some(ref name) = self.name {
            add_name(out, name);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub wid: i64,
    pub inner: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelMembers {
    pub rid: i64,
    pub members: Vec<Member>,
}

impl PackedRecord for RelMembers {
    fn kind(&self) -> RecordType {
        RecordType::RelMembers
    }

    fn id(&self) -> i64 {
        self.rid
    }

    fn packed_size(&self) -> usize {
        LIST_HEADER + MEMBER_SIZE * self.members.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind().tag().to_le_bytes());
        out.extend_from_slice(&(self.members.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.rid.to_le_bytes());
        for m in &self.members {
            out.extend_from_slice(&m.wid.to_le_bytes());
            out.extend_from_slice(&(m.inner as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileRefs {
    pub kind: RecordType,
    pub tid: i64,
    pub refs: Vec<i64>,
}

impl PackedRecord for TileRefs {
    fn kind(&self) -> RecordType {
        self.kind
    }

    fn id(&self) -> i64 {
        self.tid
    }

    fn packed_size(&self) -> usize {
        LIST_HEADER + 8 * self.refs.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind.tag().to_le_bytes());
        out.extend_from_slice(&(self.refs.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.tid.to_le_bytes());
        for r in &self.refs {
            out.extend_from_slice(&r.to_le_bytes());
        }
    }
}

/// Header of an empty tile-refs record: `{id: tid, count: 0}`
pub fn tile_refs_header(kind: RecordType, tid: i64) -> [u8; LIST_HEADER] {
    let mut out = [0u8; LIST_HEADER];
    out[0..4].copy_from_slice(&kind.tag().to_le_bytes());
    out[8..16].copy_from_slice(&tid.to_le_bytes());
    out
}

// ============================================================================
// Views (read path)
// ============================================================================

/// Name tail of a record whose size was validated by `record_size`
fn view_name(bytes: &[u8], header: usize) -> Option<&str> {
    decode_name(&bytes[header..]).ok().flatten()
}

#[derive(Debug, Clone, Copy)]
pub struct NodeCoordView<'a> {
    bytes: &'a [u8],
}

impl<'a> NodeCoordView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn nid(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn lat(&self) -> f64 {
        read_f64(self.bytes, 16)
    }

    pub fn lon(&self) -> f64 {
        read_f64(self.bytes, 24)
    }

    pub fn to_record(&self) -> NodeCoord {
        NodeCoord { nid: self.nid(), lat: self.lat(), lon: self.lon() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeInfoView<'a> {
    bytes: &'a [u8],
}

impl<'a> NodeInfoView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn nid(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn class(&self) -> i32 {
        read_i32(self.bytes, 16)
    }

    pub fn flags(&self) -> i32 {
        read_i32(self.bytes, 20)
    }

    pub fn ele(&self) -> f64 {
        read_f64(self.bytes, 24)
    }

    pub fn name(&self) -> Option<&'a str> {
        view_name(self.bytes, NODE_INFO_HEADER)
    }

    pub fn to_record(&self) -> NodeInfo {
        NodeInfo {
            nid: self.nid(),
            class: self.class(),
            flags: self.flags(),
            ele: self.ele(),
            name: self.name().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WayInfoView<'a> {
    bytes: &'a [u8],
}

impl<'a> WayInfoView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn wid(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn class(&self) -> i32 {
        read_i32(self.bytes, 16)
    }

    pub fn flags(&self) -> i32 {
        read_i32(self.bytes, 20)
    }

    pub fn layer(&self) -> i32 {
        read_i32(self.bytes, 24)
    }

    pub fn name(&self) -> Option<&'a str> {
        view_name(self.bytes, WAY_INFO_HEADER)
    }

    pub fn to_record(&self) -> WayInfo {
        WayInfo {
            wid: self.wid(),
            class: self.class(),
            flags: self.flags(),
            layer: self.layer(),
            name: self.name().map(str::to_string),
        }
    }
}

/// WayRange or RelRange
#[derive(Debug, Clone, Copy)]
pub struct RangeView<'a> {
    bytes: &'a [u8],
}

impl<'a> RangeView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn id(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            lat_t: read_f64(self.bytes, 16),
            lon_l: read_f64(self.bytes, 24),
            lat_b: read_f64(self.bytes, 32),
            lon_r: read_f64(self.bytes, 40),
        }
    }
}

/// WayNds or any TileRefs record: id + list of i64
#[derive(Debug, Clone, Copy)]
pub struct IdListView<'a> {
    bytes: &'a [u8],
}

impl<'a> IdListView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn id(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn count(&self) -> usize {
        read_u32(self.bytes, 4) as usize
    }

    pub fn get(&self, idx: usize) -> Option<i64> {
        if idx >= self.count() {
            return None;
        }
        Some(read_i64(self.bytes, LIST_HEADER + idx * 8))
    }

    /// Elements of the list
    pub fn iter(&self) -> impl Iterator<Item = i64> + 'a {
        let bytes = self.bytes;
        (0..self.count()).map(move |i| read_i64(bytes, LIST_HEADER + i * 8))
    }

    pub fn to_vec(&self) -> Vec<i64> {
        self.iter().collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelInfoView<'a> {
    bytes: &'a [u8],
}

impl<'a> RelInfoView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn rid(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn center_nid(&self) -> i64 {
        read_i64(self.bytes, 16)
    }

    pub fn class(&self) -> i32 {
        read_i32(self.bytes, 24)
    }

    pub fn flags(&self) -> i32 {
        read_i32(self.bytes, 28)
    }

    pub fn rel_type(&self) -> RelType {
        RelType::from_code(read_i32(self.bytes, 32))
    }

    pub fn name(&self) -> Option<&'a str> {
        view_name(self.bytes, REL_INFO_HEADER)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelMembersView<'a> {
    bytes: &'a [u8],
}

impl<'a> RelMembersView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn rid(&self) -> i64 {
        read_i64(self.bytes, 8)
    }

    pub fn count(&self) -> usize {
        read_u32(self.bytes, 4) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Member> + 'a {
        let bytes = self.bytes;
        (0..self.count()).map(move |i| {
            let off = LIST_HEADER + i * MEMBER_SIZE;
            Member {
                wid: read_i64(bytes, off),
                inner: read_u32(bytes, off + 8) != 0,
            }
        })
    }
}

/// Typed view of one record
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    NodeCoord(NodeCoordView<'a>),
    NodeInfo(NodeInfoView<'a>),
    WayInfo(WayInfoView<'a>),
    WayRange(RangeView<'a>),
    WayNds(IdListView<'a>),
    RelInfo(RelInfoView<'a>),
    RelMembers(RelMembersView<'a>),
    RelRange(RangeView<'a>),
    TileRefs(IdListView<'a>),
}

impl<'a> Record<'a> {
    /// View a record whose extent was validated by `record_size`
    pub fn view(kind: RecordType, bytes: &'a [u8]) -> Self {
        match kind {
            RecordType::NodeCoord => Record::NodeCoord(NodeCoordView::new(bytes)),
            RecordType::NodeInfo => Record::NodeInfo(NodeInfoView::new(bytes)),
            RecordType::WayInfo => Record::WayInfo(WayInfoView::new(bytes)),
            RecordType::WayRange => Record::WayRange(RangeView::new(bytes)),
            RecordType::WayNds => Record::WayNds(IdListView::new(bytes)),
            RecordType::RelInfo => Record::RelInfo(RelInfoView::new(bytes)),
            RecordType::RelMembers => Record::RelMembers(RelMembersView::new(bytes)),
            RecordType::RelRange => Record::RelRange(RangeView::new(bytes)),
            _ => Record::TileRefs(IdListView::new(bytes)),
        }
    }
}
