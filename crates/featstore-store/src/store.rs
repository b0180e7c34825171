//! Main feature store implementation.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use featstore_types::{
    Bbox, BigId, FeatureKey, StoredFeature, TIMELESS, TimeExtent, check_feature_object,
    format_instant, truncate_to_seconds,
};

use crate::batch::{Batch, BatchState, UpsertRow};
use crate::cache::EntryCache;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::filter::FeatureFilter;
use crate::id::{IdProvider, IdProviderType, SequenceIdProvider, UidHashIdProvider};
use crate::iter::{EntryIter, RawRow};
use crate::kinds::{FeatureKind, GeoJsonFeatures, ProcedureDescriptions, SystemDescriptions};
use crate::pool::ConnectionPool;
use crate::query::QueryBuilder;
use crate::range::{ValidRange, start_seconds};
use crate::schema;

/// Store of generic GeoJSON features.
pub type GeoJsonFeatureStore = FeatureStore<GeoJsonFeatures>;
/// Store of procedure descriptions.
pub type ProcedureStore = FeatureStore<ProcedureDescriptions>;
/// Store of system descriptions.
pub type SystemDescStore = FeatureStore<SystemDescriptions>;

/// Temporally versioned, cached feature store over one SQLite table.
///
/// Every version of a feature is one row keyed by its internal id and the
/// start of its validity. Reads go through an [`EntryCache`]; writes either
/// run immediately or are queued in a shared batch, depending on the
/// configuration.
pub struct FeatureStore<K: FeatureKind> {
    builder: QueryBuilder,
    upsert_sql: String,
    id_scope: u32,
    fetch_size: usize,
    pool: ConnectionPool,
    cache: EntryCache<K::Value>,
    id_provider: Box<dyn IdProvider<K::Value>>,
    batch: Option<Batch>,
    /// Serializes cache-miss loads and the invalidations racing with them.
    load_lock: Mutex<()>,
    /// Held by `add` from the uid lookup to the write.
    add_lock: Mutex<()>,
    closed: AtomicBool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: FeatureKind> FeatureStore<K> {
    /// Open or create a store in the database file named by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = config.path.as_path();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening feature database at {}", path.display());
        let pool = ConnectionPool::open(path, config.pool.max_size, config.pool.acquire_timeout())?;
        Self::init(&config, pool)
    }

    /// Open a store at `path` with default settings.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(StoreConfig::with_path(path.as_ref()))
    }

    /// Open the store at the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    /// Open a store over a private in-memory database. `config.path` is ignored.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::in_memory(config.pool.acquire_timeout())?;
        Self::init(&config, pool)
    }

    fn init(config: &StoreConfig, pool: ConnectionPool) -> Result<Self> {
        let table = config
            .table
            .clone()
            .unwrap_or_else(|| K::DEFAULT_TABLE.to_string());
        let builder = QueryBuilder::new(table);

        let id_provider: Box<dyn IdProvider<K::Value>> = {
            let conn = pool.get()?;
            schema::initialize(&conn, &builder)?;
            match config.id_provider {
                IdProviderType::Sequence => {
                    let last: i64 = conn.query_row(&builder.max_id_sql(), [], |row| row.get(0))?;
                    Box::new(SequenceIdProvider::new(last.max(0) as u64))
                }
                IdProviderType::UidHash => Box::new(UidHashIdProvider),
            }
        };

        let batch = config
            .batch
            .enabled
            .then(|| Batch::new(config.batch.max_size));

        info!(
            "Initialized feature store {} (batching {})",
            builder.table(),
            if batch.is_some() { "on" } else { "off" }
        );

        let upsert_sql = builder.upsert_sql();
        debug!("Upsert statement: {}", upsert_sql);

        Ok(Self {
            upsert_sql,
            builder,
            id_scope: config.id_scope,
            fetch_size: config.fetch_size,
            pool,
            cache: EntryCache::new(config.cache.max_capacity, config.cache.idle_timeout()),
            id_provider,
            batch,
            load_lock: Mutex::new(()),
            add_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            _kind: PhantomData,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    fn big_id(&self, id: i64) -> BigId {
        BigId::new(self.id_scope, id as u64)
    }

    fn key_from_row(&self, id: i64, parent_id: i64, start: OffsetDateTime) -> FeatureKey {
        FeatureKey::new(self.big_id(id), start).with_parent(self.big_id(parent_id))
    }

    // === Writes ===

    /// Add a new feature or a new version of an existing one.
    ///
    /// Versions of one unique identifier share an internal id. The version
    /// starts at the valid time begin, or is timeless when there is none.
    /// A parent other than [`BigId::NONE`] must be stored already. Any
    /// pending batch is committed before returning.
    pub fn add(&self, parent_id: BigId, value: K::Value) -> Result<FeatureKey> {
        self.ensure_open()?;
        check_feature_object(&value)?;

        let _adding = self.add_lock.lock();

        // Queued versions of this uid must be visible to the lookup below.
        self.commit()?;

        if !parent_id.is_none() && !self.contains(parent_id)? {
            return Err(Error::UnknownParent(parent_id));
        }

        let uid = value.unique_identifier();
        let start = value
            .valid_time()
            .and_then(TimeExtent::explicit_begin)
            .map_or(TIMELESS, truncate_to_seconds);
        let start_secs = start_seconds(start);

        let versions: Vec<(i64, i64, i64)> = {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare_cached(&self.builder.select_versions_by_uid_sql())?;
            stmt.query_map([uid], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<_, _>>()?
        };

        let (internal_id, parent_id) = match versions.first() {
            Some(&(id, existing_parent, _)) => {
                if versions.iter().any(|v| v.2 == start_secs) {
                    let valid_start = if start == TIMELESS {
                        String::from("-infinity")
                    } else {
                        format_instant(start).unwrap_or_else(|_| start_secs.to_string())
                    };
                    return Err(Error::DuplicateVersion {
                        uid: uid.to_string(),
                        valid_start,
                    });
                }
                if !parent_id.is_none() && parent_id.as_i64() != existing_parent {
                    return Err(Error::ParentMismatch(uid.to_string()));
                }
                (self.big_id(id), self.big_id(existing_parent))
            }
            None => {
                let id = self.id_provider.new_internal_id(&value);
                let id = BigId::new(self.id_scope, id);
                if self.contains(id)? {
                    return Err(Error::IdCollision {
                        id: id.id(),
                        uid: uid.to_string(),
                    });
                }
                (id, parent_id)
            }
        };

        let key = FeatureKey::new(internal_id, start);
        let key = self.add_or_update(key, parent_id, &value)?;
        self.commit()?;
        debug!("Added feature {} as {}", value.unique_identifier(), key);
        Ok(key)
    }

    /// Insert or replace the version addressed by `key`.
    ///
    /// A parent carried by `key` takes precedence over `parent_id`. With
    /// batching on, the upsert is queued and the batch flushed once full.
    pub fn add_or_update(&self, key: FeatureKey, parent_id: BigId, value: &K::Value) -> Result<FeatureKey> {
        self.ensure_open()?;
        let uid = value.unique_identifier();
        let parent = if key.parent_id().is_none() {
            parent_id
        } else {
            key.parent_id()
        };

        let data = K::write(value).map_err(|e| Error::persistence("serialize", uid, e))?;
        let row = UpsertRow::new(key, parent, value, data);

        match &self.batch {
            Some(batch) => {
                let full = batch.push(row);
                self.invalidate(&key);
                if full {
                    self.commit()?;
                }
            }
            None => {
                let written = self.pool.get().and_then(|conn| {
                    let mut stmt = conn.prepare_cached(&self.upsert_sql)?;
                    Ok(row.execute(&mut stmt)?)
                });
                written.map_err(|e| Error::persistence("update", uid, e))?;
                self.invalidate(&key);
            }
        }

        Ok(key.with_parent(parent))
    }

    /// Unconditionally upsert `value` at `key`, returning it.
    pub fn put(&self, key: FeatureKey, value: K::Value) -> Result<K::Value> {
        self.add_or_update(key, BigId::NONE, &value)?;
        Ok(value)
    }

    /// Delete one version and return it.
    ///
    /// Fails with [`Error::FeatureNotFound`] when the key is not stored.
    pub fn remove(&self, key: &FeatureKey) -> Result<Arc<K::Value>> {
        self.ensure_open()?;
        self.commit()?;

        let value = self.get(key)?;
        let affected = {
            let conn = self.pool.get()?;
            conn.prepare_cached(&self.builder.remove_sql())?.execute(params![
                key.internal_id().as_i64(),
                start_seconds(key.valid_start_time())
            ])?
        };
        self.invalidate(key);

        match value {
            Some(value) if affected > 0 => {
                debug!("Removed feature {} ({})", value.unique_identifier(), key);
                Ok(value)
            }
            _ => Err(Error::FeatureNotFound(*key)),
        }
    }

    /// Delete every version matching `filter`. Returns the number removed.
    pub fn remove_entries(&self, filter: &FeatureFilter<K::Value>) -> Result<usize> {
        self.ensure_open()?;
        self.commit()?;

        let removed = if filter.is_sql_only() && filter.limit.is_none() {
            let (where_clause, params) = self.builder.build_where(filter, self.now());
            let conn = self.pool.get()?;
            conn.execute(
                &self.builder.remove_matching_sql(&where_clause),
                rusqlite::params_from_iter(params.iter()),
            )?
        } else {
            let keys = self
                .select_entries(filter.clone())
                .map(|entry| entry.map(|(key, _)| key))
                .collect::<Result<Vec<_>>>()?;
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare_cached(&self.builder.remove_sql())?;
            let mut removed = 0;
            for key in &keys {
                removed += stmt.execute(params![
                    key.internal_id().as_i64(),
                    start_seconds(key.valid_start_time())
                ])?;
            }
            removed
        };

        if removed > 0 {
            let _guard = self.load_lock.lock();
            self.cache.clear();
        }
        debug!("Removed {} features from {}", removed, self.builder.table());
        Ok(removed)
    }

    /// Execute queued upserts as one transaction.
    ///
    /// No-op when batching is off or nothing is pending. On failure the
    /// transaction is rolled back and the queued upserts are lost.
    pub fn commit(&self) -> Result<()> {
        let Some(batch) = &self.batch else {
            return Ok(());
        };
        self.ensure_open()?;
        let keys = batch.commit(&self.pool, &self.upsert_sql)?;
        if !keys.is_empty() {
            // A load may have cached the pre-commit row meanwhile.
            let _guard = self.load_lock.lock();
            for key in &keys {
                self.cache.invalidate(key);
            }
        }
        Ok(())
    }

    fn invalidate(&self, key: &FeatureKey) {
        let _guard = self.load_lock.lock();
        self.cache.invalidate(key);
    }

    // === Reads ===

    /// Version addressed by `key`, `None` if not stored.
    ///
    /// Returns queued but uncommitted values too.
    pub fn get(&self, key: &FeatureKey) -> Result<Option<Arc<K::Value>>> {
        self.ensure_open()?;
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        let _guard = self.load_lock.lock();
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        if let Some(data) = self.batch.as_ref().and_then(|b| b.pending_data(key)) {
            return Ok(Some(Arc::new(K::read(&data)?)));
        }

        let data: Option<String> = {
            let conn = self.pool.get()?;
            conn.prepare_cached(&self.builder.select_by_key_sql())?
                .query_row(
                    params![
                        key.internal_id().as_i64(),
                        start_seconds(key.valid_start_time())
                    ],
                    |row| row.get(0),
                )
                .optional()?
        };

        let Some(data) = data else {
            return Ok(None);
        };
        let value = Arc::new(K::read(&data)?);
        self.cache.insert(*key, Arc::clone(&value));
        Ok(Some(value))
    }

    /// Whether `key` is stored.
    pub fn contains_key(&self, key: &FeatureKey) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Key of the version of feature `id` valid now.
    pub fn current_version_key(&self, id: BigId) -> Result<Option<FeatureKey>> {
        self.current_key(&self.builder.current_version_by_id_sql(), Value::Integer(id.as_i64()))
    }

    /// Key of the version of the feature with this uid valid now.
    pub fn current_version_key_by_uid(&self, uid: &str) -> Result<Option<FeatureKey>> {
        self.current_key(
            &self.builder.current_version_by_uid_sql(),
            Value::Text(uid.to_string()),
        )
    }

    fn current_key(&self, sql: &str, param: Value) -> Result<Option<FeatureKey>> {
        self.ensure_open()?;
        let now = self.now().unix_timestamp();
        let row: Option<(i64, i64, String)> = {
            let conn = self.pool.get()?;
            conn.prepare_cached(sql)?
                .query_row(params![param, now], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .optional()?
        };
        row.map(|(id, parent_id, valid_time)| -> Result<FeatureKey> {
            let range: ValidRange = valid_time.parse()?;
            Ok(self.key_from_row(id, parent_id, range.begin()))
        })
        .transpose()
    }

    /// Version of feature `id` valid now.
    pub fn current_version(&self, id: BigId) -> Result<Option<Arc<K::Value>>> {
        match self.current_version_key(id)? {
            Some(key) => self.get(&key),
            None => Ok(None),
        }
    }

    /// Version of the feature with this uid valid now.
    pub fn current_version_by_uid(&self, uid: &str) -> Result<Option<Arc<K::Value>>> {
        match self.current_version_key_by_uid(uid)? {
            Some(key) => self.get(&key),
            None => Ok(None),
        }
    }

    /// Parent of the latest version of feature `id`, `None` when the
    /// feature is unknown or top-level.
    pub fn get_parent(&self, id: BigId) -> Result<Option<BigId>> {
        self.ensure_open()?;
        let conn = self.pool.get()?;
        let parent: Option<i64> = conn
            .prepare_cached(&self.builder.parent_sql())?
            .query_row([id.as_i64()], |row| row.get(0))
            .optional()?;
        Ok(parent.map(|p| self.big_id(p)).filter(|p| !p.is_none()))
    }

    /// Whether any version of feature `id` is stored. Never uses the cache.
    pub fn contains(&self, id: BigId) -> Result<bool> {
        self.exists(&self.builder.exists_by_id_sql(), Value::Integer(id.as_i64()))
    }

    /// Whether any version with this uid is stored. Never uses the cache.
    pub fn contains_uid(&self, uid: &str) -> Result<bool> {
        self.exists(&self.builder.exists_by_uid_sql(), Value::Text(uid.to_string()))
    }

    fn exists(&self, sql: &str, param: Value) -> Result<bool> {
        self.ensure_open()?;
        let conn = self.pool.get()?;
        let exists = conn.prepare_cached(sql)?.query_row([param], |row| row.get(0))?;
        Ok(exists)
    }

    /// Number of distinct features.
    pub fn num_features(&self) -> Result<u64> {
        self.count(&self.builder.count_features_sql())
    }

    /// Number of stored versions.
    pub fn num_records(&self) -> Result<u64> {
        self.count(&self.builder.count_records_sql())
    }

    fn count(&self, sql: &str) -> Result<u64> {
        self.ensure_open()?;
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.num_records()? == 0)
    }

    /// Lazily iterate the versions matching `filter`.
    ///
    /// Rows are fetched in pages; an error is yielded once and ends the
    /// iteration.
    pub fn select_entries(&self, filter: FeatureFilter<K::Value>) -> EntryIter<'_, K> {
        let (where_clause, params) = self.builder.build_where(&filter, self.now());
        debug!("Selecting from {} {}", self.builder.table(), where_clause);
        EntryIter::new(self, filter, where_clause, params)
    }

    /// Every entry selected by the variant's entry filter.
    pub fn entries(&self) -> Result<Vec<(FeatureKey, Arc<K::Value>)>> {
        self.select_entries(K::entry_filter()).collect()
    }

    pub fn keys(&self) -> Result<Vec<FeatureKey>> {
        self.select_entries(K::entry_filter())
            .map(|entry| entry.map(|(key, _)| key))
            .collect()
    }

    pub fn values(&self) -> Result<Vec<Arc<K::Value>>> {
        self.select_entries(K::entry_filter())
            .map(|entry| entry.map(|(_, value)| value))
            .collect()
    }

    /// Extent of every stored geometry.
    ///
    /// Fails with [`Error::NoExtent`] when no feature has a geometry.
    pub fn features_bbox(&self) -> Result<Bbox> {
        self.ensure_open()?;
        let conn = self.pool.get()?;
        let corners: [Option<f64>; 4] = conn.query_row(&self.builder.bbox_sql(), [], |row| {
            Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?])
        })?;
        match corners {
            [Some(min_x), Some(min_y), Some(max_x), Some(max_y)] => {
                Ok(Bbox::new(min_x, min_y, max_x, max_y))
            }
            _ => Err(Error::NoExtent),
        }
    }

    /// One page of matching rows after `cursor`.
    pub(crate) fn fetch_page(
        &self,
        where_clause: &str,
        params: &[Value],
        cursor: Option<(i64, i64)>,
    ) -> Result<Vec<RawRow>> {
        self.ensure_open()?;
        let sql = self.builder.select_page_sql(where_clause, cursor.is_some());
        let mut bound: Vec<Value> = params.to_vec();
        if let Some((id, valid_begin)) = cursor {
            bound.extend([
                Value::Integer(id),
                Value::Integer(id),
                Value::Integer(valid_begin),
            ]);
        }
        bound.push(Value::Integer(self.fetch_size as i64));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    valid_begin: row.get(2)?,
                    valid_time: row.get(3)?,
                    data: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Build the key and value of a fetched row.
    pub(crate) fn decode_row(&self, row: RawRow) -> Result<(FeatureKey, Arc<K::Value>)> {
        let range: ValidRange = row.valid_time.parse()?;
        let key = self.key_from_row(row.id, row.parent_id, range.begin());
        let value = match self.cache.get(&key) {
            Some(value) => value,
            None => Arc::new(K::read(&row.data)?),
        };
        Ok((key, value))
    }

    pub(crate) fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn now(&self) -> OffsetDateTime {
        truncate_to_seconds(OffsetDateTime::now_utc())
    }

    // === Maintenance ===

    /// Drop every cached entry. Persisted data is untouched.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Delete every stored version.
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(batch) = &self.batch {
            batch.discard();
        }
        let removed = {
            let conn = self.pool.get()?;
            conn.execute(&self.builder.clear_sql(), [])?
        };
        let _guard = self.load_lock.lock();
        self.cache.clear();
        info!("Cleared {} rows from {}", removed, self.builder.table());
        Ok(())
    }

    /// Drop the feature table. The store is unusable afterwards.
    pub fn drop_table(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(batch) = &self.batch {
            batch.discard();
        }
        {
            let conn = self.pool.get()?;
            conn.execute_batch(&self.builder.drop_table_sql())?;
            schema::forget(&conn, self.builder.table())?;
        }
        let _guard = self.load_lock.lock();
        self.cache.clear();
        info!("Dropped feature table {}", self.builder.table());
        Ok(())
    }

    /// Copy the current rows into the backup table, replacing any previous backup.
    pub fn backup(&self) -> Result<()> {
        self.ensure_open()?;
        self.commit()?;
        let conn = self.pool.get()?;
        conn.execute_batch(&self.builder.backup_sql())?;
        info!("Backed up {} to {}", self.builder.table(), self.builder.backup_table());
        Ok(())
    }

    /// Replace the current rows with the backup table's content.
    pub fn restore(&self) -> Result<()> {
        self.ensure_open()?;
        if let Some(batch) = &self.batch {
            batch.discard();
        }
        {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            tx.execute_batch(&self.builder.restore_sql())?;
            tx.commit()?;
        }
        let _guard = self.load_lock.lock();
        self.cache.clear();
        info!("Restored {} from {}", self.builder.table(), self.builder.backup_table());
        Ok(())
    }

    /// Release the batch and every pooled connection.
    ///
    /// Queued upserts are discarded. Failures are logged, never returned.
    /// Later operations fail with [`Error::StoreClosed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(batch) = &self.batch {
            let discarded = batch.discard();
            if discarded > 0 {
                warn!(
                    "Discarding {} uncommitted features on close of {}",
                    discarded,
                    self.builder.table()
                );
            }
        }
        self.cache.clear();
        self.pool.close();
        info!("Closed feature store {}", self.builder.table());
    }

    // === Introspection ===

    /// Name of the backing table.
    pub fn datastore_name(&self) -> &str {
        self.builder.table()
    }

    pub fn batch_state(&self) -> BatchState {
        self.batch.as_ref().map_or(BatchState::Idle, Batch::state)
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_some()
    }

    pub fn id_scope(&self) -> u32 {
        self.id_scope
    }

    /// Whether `key` currently has a cached value.
    pub fn is_cached(&self, key: &FeatureKey) -> bool {
        self.cache.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::{Feature, Geometry};
    use time::macros::datetime;

    fn store() -> GeoJsonFeatureStore {
        FeatureStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn batched_store(max_size: usize) -> GeoJsonFeatureStore {
        let mut config = StoreConfig::default();
        config.batch.enabled = true;
        config.batch.max_size = max_size;
        FeatureStore::open_in_memory(config).unwrap()
    }

    fn station(uid: &str) -> Feature {
        Feature::new(uid, "Station").with_geometry(Geometry::Point([1.0, 2.0]))
    }

    #[test]
    fn test_add_and_get() {
        let store = store();
        let key = store.add(BigId::NONE, station("urn:x:1")).unwrap();
        assert!(key.is_timeless());
        assert_eq!(key.internal_id(), BigId::new(1, 1));

        let value = store.get(&key).unwrap().unwrap();
        assert_eq!(value.uid, "urn:x:1");
        assert!(store.is_cached(&key));
    }

    #[test]
    fn test_add_rejects_malformed_feature() {
        let store = store();
        let err = store.add(BigId::NONE, Feature::new("", "x")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_versions_share_internal_id() {
        let store = store();
        let v1 = station("urn:x:1")
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-01-01 0:00 UTC)));
        let v2 = station("urn:x:1")
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-06-01 0:00 UTC)));
        let k1 = store.add(BigId::NONE, v1.clone()).unwrap();
        let k2 = store.add(BigId::NONE, v2).unwrap();

        assert_eq!(k1.internal_id(), k2.internal_id());
        assert_ne!(k1, k2);
        assert_eq!(store.num_features().unwrap(), 1);
        assert_eq!(store.num_records().unwrap(), 2);

        let err = store.add(BigId::NONE, v1).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion { .. }));
    }

    #[test]
    fn test_parent_is_kept_across_versions() {
        let store = store();
        let parent = store
            .add(BigId::NONE, Feature::new("urn:net:1", "Network"))
            .unwrap()
            .internal_id();
        let other = store
            .add(BigId::NONE, Feature::new("urn:net:2", "Other network"))
            .unwrap()
            .internal_id();
        let v1 = station("urn:x:1")
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-01-01 0:00 UTC)));
        let k1 = store.add(parent, v1).unwrap();
        assert_eq!(k1.parent_id(), parent);

        let v2 = station("urn:x:1")
            .with_valid_time(TimeExtent::beginning_at(datetime!(2024-02-01 0:00 UTC)));
        let err = store.add(other, v2.clone()).unwrap_err();
        assert!(matches!(err, Error::ParentMismatch(_)));

        let k2 = store.add(BigId::NONE, v2).unwrap();
        assert_eq!(k2.parent_id(), parent);
        assert_eq!(store.get_parent(k2.internal_id()).unwrap(), Some(parent));
    }

    #[test]
    fn test_add_rejects_unknown_parent() {
        let store = store();
        let err = store
            .add(BigId::new(1, 77), station("urn:x:1"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParent(id) if id == BigId::new(1, 77)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_duplicate_version_before_year_zero() {
        let store = store();
        let feature = station("urn:x:bc")
            .with_valid_time(TimeExtent::beginning_at(datetime!(-0100-03-01 0:00 UTC)));
        let key = store.add(BigId::NONE, feature.clone()).unwrap();
        assert_eq!(key.valid_start_time(), datetime!(-0100-03-01 0:00 UTC));

        match store.add(BigId::NONE, feature).unwrap_err() {
            Error::DuplicateVersion { valid_start, .. } => {
                assert_eq!(valid_start, "-0100-03-01T00:00:00Z")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_clear_does_not_block_concurrent_reads() {
        let mut config = StoreConfig::default();
        config.pool.acquire_timeout_ms = 2_000;
        let store = GeoJsonFeatureStore::open_in_memory(config).unwrap();
        let key = store.add(BigId::NONE, station("urn:x:1")).unwrap();
        store.backup().unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        store.clear_cache();
                        store.get(&key).unwrap();
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..20 {
                    store.clear().unwrap();
                    store.restore().unwrap();
                }
            });
        });
        assert_eq!(store.get(&key).unwrap().unwrap().uid, "urn:x:1");
    }

    #[test]
    fn test_current_version() {
        let store = store();
        let old = station("urn:x:1").with_valid_time(TimeExtent::period(
            datetime!(2020-01-01 0:00 UTC),
            datetime!(2020-12-31 0:00 UTC),
        ));
        let current = Feature::new("urn:x:1", "Renamed")
            .with_valid_time(TimeExtent::beginning_at(datetime!(2021-01-01 0:00 UTC)));
        store.add(BigId::NONE, old).unwrap();
        let key = store.add(BigId::NONE, current).unwrap();

        assert_eq!(store.current_version_key_by_uid("urn:x:1").unwrap(), Some(key));
        let value = store.current_version(key.internal_id()).unwrap().unwrap();
        assert_eq!(value.name, "Renamed");
        assert!(store.current_version_key_by_uid("urn:x:2").unwrap().is_none());
    }

    #[test]
    fn test_contains_ignores_cache() {
        let store = store();
        let key = store.add(BigId::NONE, station("urn:x:1")).unwrap();
        store.clear_cache();
        assert!(store.contains(key.internal_id()).unwrap());
        assert!(store.contains_uid("urn:x:1").unwrap());
        assert!(!store.contains_uid("urn:x:2").unwrap());
    }

    #[test]
    fn test_remove_missing_is_error() {
        let store = store();
        let key = FeatureKey::timeless(BigId::new(1, 99));
        assert!(matches!(store.remove(&key), Err(Error::FeatureNotFound(_))));
    }

    #[test]
    fn test_batched_get_sees_pending_write() {
        let store = batched_store(100);
        let key = FeatureKey::timeless(BigId::new(1, 5));
        store.put(key, station("urn:x:5")).unwrap();
        assert_eq!(store.batch_state(), BatchState::Accumulating(1));

        assert_eq!(store.get(&key).unwrap().unwrap().uid, "urn:x:5");
        assert!(!store.is_cached(&key));
        assert_eq!(store.num_records().unwrap(), 0);

        store.commit().unwrap();
        assert_eq!(store.batch_state(), BatchState::Idle);
        assert_eq!(store.num_records().unwrap(), 1);
    }

    #[test]
    fn test_add_flushes_batch() {
        let store = batched_store(100);
        store
            .put(FeatureKey::timeless(BigId::new(1, 50)), station("urn:x:50"))
            .unwrap();
        store.add(BigId::NONE, station("urn:x:1")).unwrap();
        assert_eq!(store.batch_state(), BatchState::Idle);
        assert_eq!(store.num_records().unwrap(), 2);
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = batched_store(100);
        store
            .put(FeatureKey::timeless(BigId::new(1, 1)), station("urn:x:1"))
            .unwrap();
        store.close();
        store.close();
        assert_eq!(store.batch_state(), BatchState::Idle);
        assert!(matches!(store.num_records(), Err(Error::StoreClosed)));
        assert!(matches!(
            store.add(BigId::NONE, station("urn:x:2")),
            Err(Error::StoreClosed)
        ));
    }

    #[test]
    fn test_features_bbox() {
        let store = store();
        assert!(matches!(store.features_bbox(), Err(Error::NoExtent)));

        store.add(BigId::NONE, Feature::new("urn:x:0", "no geometry")).unwrap();
        assert!(matches!(store.features_bbox(), Err(Error::NoExtent)));

        store.add(BigId::NONE, station("urn:x:1")).unwrap();
        store
            .add(
                BigId::NONE,
                Feature::new("urn:x:2", "line")
                    .with_geometry(Geometry::LineString(vec![[-3.0, 0.5], [4.0, 8.0]])),
            )
            .unwrap();
        assert_eq!(store.features_bbox().unwrap(), Bbox::new(-3.0, 0.5, 4.0, 8.0));
    }

    #[test]
    fn test_datastore_name() {
        let config = StoreConfig {
            table: Some("gauges".to_string()),
            ..StoreConfig::default()
        };
        let store = GeoJsonFeatureStore::open_in_memory(config).unwrap();
        assert_eq!(store.datastore_name(), "gauges");
        assert_eq!(
            ProcedureStore::open_in_memory(StoreConfig::default())
                .unwrap()
                .datastore_name(),
            "procedures"
        );
    }
}
