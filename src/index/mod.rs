//! Entry cache over the SQLite table set
//!
//! `Index` keeps an LRU of entries keyed by `(record type, major key)`.
//! Missing entries are loaded from the store on demand; under memory
//! pressure the least recently used entries without outstanding handles are
//! evicted, dirty ones written back in a batched transaction first.
//!
//! In read-only mode any number of threads (`nth`) may call `get`
//! concurrently; each passes its own thread id `0..nth`. Create and append
//! modes are single-threaded and take `&mut self` for writes.

mod gate;
mod lru;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use crate::config::{debug_log, IndexConfig, Mode};
use crate::error::{OsmdbError, Result};
use crate::storage::record::{PackedRecord, RecordType};
use crate::storage::{Entry, Handle, Store};
use gate::Gate;
use lru::Lru;

/// Cache key of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub kind: RecordType,
    pub major: i64,
}

impl EntryKey {
    pub fn new(kind: RecordType, major: i64) -> Self {
        Self { kind, major }
    }

    /// Key of the entry holding record `id`
    pub fn of(kind: RecordType, id: i64) -> Self {
        Self::new(kind, kind.major_key(id))
    }
}

/// Counters for monitoring and tests
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    loads: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    saves: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of the index counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Lookups served by a resident entry
    pub hits: u64,
    /// Entries read from the store
    pub loads: u64,
    /// Entries made resident; `inserts - evictions` is the resident count
    pub inserts: u64,
    pub evictions: u64,
    /// Entries written back to the store
    pub saves: u64,
}

struct Cache {
    lru: Lru<EntryKey, Entry>,
    /// Sum of `Entry::cost` over resident entries
    memory: usize,
}

/// LRU cache of entries backed by the record store
pub struct Index {
    config: IndexConfig,
    gate: Gate,
    cache: Mutex<Cache>,
    store: Mutex<Store>,
    counters: Counters,
    closed: bool,
}

impl Index {
    /// Open an index at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(path.as_ref(), config.mode)?;

        tracing::info!(
            "Opened index {:?}: mode={:?} nth={} budget={} bytes",
            path.as_ref(),
            config.mode,
            config.nth,
            config.high_watermark()
        );

        Ok(Self {
            gate: Gate::new(config.nth, config.mode == Mode::ReadOnly),
            config,
            cache: Mutex::new(Cache { lru: Lru::new(), memory: 0 }),
            store: Mutex::new(store),
            counters: Counters::default(),
            closed: false,
        })
    }

    /// Create a new index (single-threaded)
    pub fn create<P: AsRef<Path>>(path: P, smem: f64) -> Result<Self> {
        Self::open(path, IndexConfig::new(Mode::Create, 1, smem))
    }

    /// Open an existing index for appending (single-threaded)
    pub fn append<P: AsRef<Path>>(path: P, smem: f64) -> Result<Self> {
        Self::open(path, IndexConfig::new(Mode::Append, 1, smem))
    }

    /// Open an existing index for `nth` concurrent readers
    pub fn read_only<P: AsRef<Path>>(path: P, nth: usize, smem: f64) -> Result<Self> {
        Self::open(path, IndexConfig::read_only(nth, smem))
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    fn lock_cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_writable(&self) -> Result<()> {
        if !self.config.mode.is_writable() {
            return Err(OsmdbError::Protocol("write to a read-only index".into()));
        }
        Ok(())
    }

    fn check_tid(&self, tid: usize) -> Result<()> {
        if tid >= self.config.nth {
            return Err(OsmdbError::Protocol(format!(
                "thread id {} out of range (nth={})", tid, self.config.nth
            )));
        }
        Ok(())
    }

    /// Fetch a handle on record `id` of type `kind`.
    ///
    /// `Ok(None)` when the record does not exist. The handle keeps its
    /// entry resident until it is dropped or passed to `put`.
    pub fn get(&self, tid: usize, kind: RecordType, id: i64) -> Result<Option<Handle>> {
        self.check_tid(tid)?;
        let key = EntryKey::of(kind, id);
        let minor = kind.minor_key(id);

        self.gate.read_begin();
        match self.lookup(key, minor) {
            Ok(Some(found)) => {
                self.gate.read_end();
                return Ok(found);
            }
            Ok(None) => {}
            Err(e) => {
                self.gate.read_end();
                return Err(e);
            }
        }

        self.gate.load_begin(tid, key);
        // another thread may have loaded it meanwhile
        match self.lookup(key, minor) {
            Ok(Some(found)) => {
                self.gate.load_end(tid);
                self.gate.read_end();
                return Ok(found);
            }
            Ok(None) => {}
            Err(e) => {
                self.gate.load_fail(tid);
                self.gate.read_end();
                return Err(e);
            }
        }

        let entry = match self.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                self.gate.load_fail(tid);
                self.gate.read_end();
                return Err(e);
            }
        };

        self.gate.edit_begin(tid);
        let found = self.insert(key, entry, minor);
        self.gate.edit_end(tid);
        found
    }

    /// Release a handle obtained from `get`
    pub fn put(&self, handle: Handle) {
        self.gate.read_begin();
        Entry::put(handle);
        self.gate.read_end();
    }

    /// Hit path: `Some(result)` when the entry is resident
    fn lookup(&self, key: EntryKey, minor: u32) -> Result<Option<Option<Handle>>> {
        let mut cache = self.lock_cache();
        let handle = match cache.lru.get(&key) {
            Some(entry) => entry.get(minor)?,
            None => return Ok(None),
        };
        cache.lru.touch(&key);
        Counters::bump(&self.counters.hits);
        Ok(Some(handle))
    }

    /// Build an entry from its persisted blob (an absent blob is an empty entry)
    fn load(&self, key: EntryKey) -> Result<Entry> {
        let blob = self.lock_store().load(key.kind, key.major)?;
        Counters::bump(&self.counters.loads);
        debug_log!("load {}:{} ({} bytes)", key.kind.table_name(), key.major,
            blob.as_ref().map_or(0, |b| b.len()));

        let mut entry = Entry::new(key.kind, key.major);
        if let Some(blob) = blob {
            entry.append(&blob, true)?;
        }
        Ok(entry)
    }

    /// Trim, then register a freshly loaded entry at the LRU tail and take
    /// a handle on record `minor` from it. A key that is already resident is
    /// served from the resident entry and the loaded copy is dropped.
    fn insert(&self, key: EntryKey, entry: Entry, minor: u32) -> Result<Option<Handle>> {
        let mut cache = self.lock_cache();
        if cache.lru.touch(&key) {
            debug_log!("{}:{} became resident during load", key.kind.table_name(), key.major);
            Counters::bump(&self.counters.hits);
        } else {
            {
                let mut store = self.lock_store();
                trim(&mut cache, &mut store, &self.config, &self.counters)?;
            }
            cache.memory += entry.cost();
            // key was not resident, push cannot collide
            let _ = cache.lru.push_back(key, entry);
            Counters::bump(&self.counters.inserts);
        }

        match cache.lru.get(&key) {
            Some(resident) => resident.get(minor),
            None => Err(OsmdbError::Protocol(format!(
                "{} entry {} vanished", key.kind.table_name(), key.major
            ))),
        }
    }

    /// Append an encoded entity record (write modes only)
    pub fn add(&mut self, kind: RecordType, id: i64, bytes: &[u8]) -> Result<()> {
        self.require_writable()?;
        if kind.is_tile_refs() {
            return Err(OsmdbError::Protocol(format!(
                "{} refs are added one by one with add_tile", kind.table_name()
            )));
        }
        self.with_entry(EntryKey::of(kind, id), |entry| entry.append(bytes, false))
    }

    /// Encode and append an owned record
    pub fn add_record<R: PackedRecord>(&mut self, record: &R) -> Result<()> {
        self.add(record.kind(), record.id(), &record.encode())
    }

    /// Append reference `ref_id` to tile-refs entry `tile_id`
    pub fn add_tile(&mut self, kind: RecordType, tile_id: i64, ref_id: i64) -> Result<()> {
        self.require_writable()?;
        if !kind.is_tile_refs() {
            return Err(OsmdbError::Protocol(format!(
                "{} is not a tile-refs type", kind.table_name()
            )));
        }
        self.with_entry(EntryKey::new(kind, tile_id), |entry| entry.append_tile_ref(ref_id))
    }

    /// Make `key` resident at the LRU tail, mutate it, then trim
    fn with_entry<F>(&mut self, key: EntryKey, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let cache = self.cache.get_mut().unwrap_or_else(|e| e.into_inner());
        let store = self.store.get_mut().unwrap_or_else(|e| e.into_inner());

        if cache.lru.touch(&key) {
            debug_log!("add to resident {}:{}", key.kind.table_name(), key.major);
        } else {
            let mut entry = Entry::new(key.kind, key.major);
            if let Some(blob) = store.load(key.kind, key.major)? {
                Counters::bump(&self.counters.loads);
                entry.append(&blob, true)?;
            }
            cache.memory += entry.cost();
            // key was not resident, push cannot collide
            let _ = cache.lru.push_back(key, entry);
            Counters::bump(&self.counters.inserts);
        }

        let entry = cache.lru.get_mut(&key).ok_or_else(|| {
            OsmdbError::Protocol(format!("{} entry {} vanished", key.kind.table_name(), key.major))
        })?;
        let before = entry.cost();
        let mutated = mutate(entry);
        let after = entry.cost();
        cache.memory = cache.memory - before + after;
        mutated?;

        trim(cache, store, &self.config, &self.counters)
    }

    /// Dataset version, 0 when unset
    pub fn changeset(&self) -> Result<i64> {
        self.lock_store().changeset()
    }

    pub fn set_changeset(&mut self, changeset: i64) -> Result<()> {
        self.require_writable()?;
        self.store.get_mut().unwrap_or_else(|e| e.into_inner()).set_changeset(changeset)
    }

    /// Write every dirty entry back to the store
    pub fn flush(&mut self) -> Result<()> {
        if !self.config.mode.is_writable() {
            return Ok(());
        }
        let cache = self.cache.get_mut().unwrap_or_else(|e| e.into_inner());
        let store = self.store.get_mut().unwrap_or_else(|e| e.into_inner());

        let mut saved = 0;
        for entry in cache.lru.values_mut() {
            if entry.is_dirty() {
                if saved == 0 {
                    store.begin()?;
                }
                store.save(entry.kind(), entry.major(), entry.bytes())?;
                entry.mark_clean();
                Counters::bump(&self.counters.saves);
                saved += 1;
            }
        }
        store.commit()?;
        tracing::info!("Flushed {} dirty entries to {:?}", saved, store.path());
        Ok(())
    }

    /// Flush and release the index
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }

    /// Bytes currently charged to resident entries
    pub fn memory(&self) -> usize {
        self.lock_cache().memory
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.lock_cache().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entry holding record `id` is resident
    pub fn is_resident(&self, kind: RecordType, id: i64) -> bool {
        self.lock_cache().lru.contains(&EntryKey::of(kind, id))
    }

    /// Resident keys from least to most recently used
    pub fn lru_keys(&self) -> Vec<EntryKey> {
        self.lock_cache().lru.keys()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            saves: self.counters.saves.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                tracing::error!("Flush on drop failed: {}", e);
            }
        }
    }
}

/// Evict least recently used entries under memory pressure.
///
/// Nothing happens while memory is at or below the high watermark; otherwise
/// entries without handles are evicted from the head until memory is at or
/// below the low watermark. Dirty entries are saved in a batch first.
fn trim(cache: &mut Cache, store: &mut Store, config: &IndexConfig, counters: &Counters) -> Result<()> {
    if cache.memory <= config.high_watermark() {
        return Ok(());
    }
    let low = config.low_watermark();
    let mut evicted = 0;
    let mut cur = cache.lru.first();

    while let Some(idx) = cur {
        if cache.memory <= low {
            break;
        }
        cur = cache.lru.next(idx);

        let (dirty, refs) = match cache.lru.at(idx) {
            Some((_, entry)) => (entry.is_dirty(), entry.refcount()),
            None => continue,
        };
        if refs > 0 {
            continue;
        }
        if dirty {
            if !config.mode.is_writable() {
                return Err(OsmdbError::Protocol("dirty entry in a read-only index".into()));
            }
            if let Some((_, entry)) = cache.lru.at(idx) {
                store.begin()?;
                store.save(entry.kind(), entry.major(), entry.bytes())?;
                Counters::bump(&counters.saves);
            }
        }
        if let Some((_, entry)) = cache.lru.remove_at(idx) {
            cache.memory -= entry.cost();
            Counters::bump(&counters.evictions);
            evicted += 1;
        }
    }

    store.commit()?;
    tracing::debug!(
        "Trim evicted {} entries, {} bytes resident ({} entries)",
        evicted, cache.memory, cache.lru.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests;
