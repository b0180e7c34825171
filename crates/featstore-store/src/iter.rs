//! Lazy, paged iteration over selected entries.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

use rusqlite::types::Value;

use featstore_types::FeatureKey;

use crate::error::Result;
use crate::filter::FeatureFilter;
use crate::kinds::FeatureKind;
use crate::store::FeatureStore;

/// One fetched row, not yet decoded.
#[derive(Debug)]
pub(crate) struct RawRow {
    pub(crate) id: i64,
    pub(crate) parent_id: i64,
    pub(crate) valid_begin: i64,
    pub(crate) valid_time: String,
    pub(crate) data: String,
}

/// Iterator returned by [`FeatureStore::select_entries`].
///
/// Rows are read in `(id, valid_begin)` order, one page at a time, and no
/// connection is held between pages. The value predicate and limit of the
/// filter are applied here.
pub struct EntryIter<'a, K: FeatureKind> {
    store: &'a FeatureStore<K>,
    filter: FeatureFilter<K::Value>,
    where_clause: String,
    params: Vec<Value>,
    page: VecDeque<RawRow>,
    cursor: Option<(i64, i64)>,
    exhausted: bool,
    delivered: usize,
    done: bool,
}

impl<'a, K: FeatureKind> EntryIter<'a, K> {
    pub(crate) fn new(
        store: &'a FeatureStore<K>,
        filter: FeatureFilter<K::Value>,
        where_clause: String,
        params: Vec<Value>,
    ) -> Self {
        let done = filter.limit == Some(0);
        Self {
            store,
            filter,
            where_clause,
            params,
            page: VecDeque::new(),
            cursor: None,
            exhausted: false,
            delivered: 0,
            done,
        }
    }

    fn next_row(&mut self) -> Result<Option<RawRow>> {
        if self.page.is_empty() && !self.exhausted {
            let rows = self
                .store
                .fetch_page(&self.where_clause, &self.params, self.cursor)?;
            self.exhausted = rows.len() < self.store.fetch_size();
            if let Some(last) = rows.last() {
                self.cursor = Some((last.id, last.valid_begin));
            }
            self.page.extend(rows);
        }
        Ok(self.page.pop_front())
    }

    fn advance(&mut self) -> Result<Option<(FeatureKey, Arc<K::Value>)>> {
        while let Some(row) = self.next_row()? {
            let (key, value) = self.store.decode_row(row)?;
            if self.filter.test_value(&value) {
                return Ok(Some((key, value)));
            }
        }
        Ok(None)
    }
}

impl<K: FeatureKind> Iterator for EntryIter<'_, K> {
    type Item = Result<(FeatureKey, Arc<K::Value>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => {
                self.delivered += 1;
                if self.filter.limit.is_some_and(|limit| self.delivered >= limit) {
                    self.done = true;
                }
                Some(Ok(entry))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<K: FeatureKind> FusedIterator for EntryIter<'_, K> {}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::filter::{FeatureFilter, TemporalFilter};
    use crate::store::GeoJsonFeatureStore;
    use featstore_types::{Bbox, BigId, Feature, Geometry, TimeExtent};
    use time::macros::datetime;

    fn store_with(fetch_size: usize, count: u64) -> GeoJsonFeatureStore {
        let config = StoreConfig {
            fetch_size,
            ..StoreConfig::default()
        };
        let store = GeoJsonFeatureStore::open_in_memory(config).unwrap();
        for i in 1..=count {
            let feature = Feature::new(format!("urn:x:{}", i), format!("Station {}", i))
                .with_geometry(Geometry::Point([i as f64, i as f64]));
            store.add(BigId::NONE, feature).unwrap();
        }
        store
    }

    #[test]
    fn test_iterates_across_pages() {
        let store = store_with(3, 10);
        let ids: Vec<u64> = store
            .select_entries(FeatureFilter::new())
            .map(|e| e.unwrap().0.internal_id().id())
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_exact_page_multiple() {
        let store = store_with(5, 10);
        assert_eq!(store.select_entries(FeatureFilter::new()).count(), 10);
    }

    #[test]
    fn test_limit_and_predicate() {
        let store = store_with(2, 10);
        let filter = FeatureFilter::new()
            .matching(|f: &Feature| f.name.ends_with('0') || f.name.ends_with('5'));
        let names: Vec<String> = store
            .select_entries(filter)
            .map(|e| e.unwrap().1.name.clone())
            .collect();
        assert_eq!(names, ["Station 5", "Station 10"]);

        let limited = store.select_entries(FeatureFilter::new().limit(4));
        assert_eq!(limited.count(), 4);
        assert_eq!(store.select_entries(FeatureFilter::new().limit(0)).count(), 0);
    }

    #[test]
    fn test_bbox_filter() {
        let store = store_with(100, 10);
        let filter = FeatureFilter::new().bbox(Bbox::new(2.5, 2.5, 4.5, 4.5));
        let uids: Vec<String> = store
            .select_entries(filter)
            .map(|e| e.unwrap().1.uid.clone())
            .collect();
        assert_eq!(uids, ["urn:x:3", "urn:x:4"]);
    }

    #[test]
    fn test_latest_version_filter() {
        let store = store_with(100, 0);
        for (name, start) in [
            ("first", datetime!(2024-01-01 0:00 UTC)),
            ("second", datetime!(2024-03-01 0:00 UTC)),
        ] {
            let feature = Feature::new("urn:x:1", name).with_valid_time(TimeExtent::beginning_at(start));
            store.add(BigId::NONE, feature).unwrap();
        }

        assert_eq!(store.select_entries(FeatureFilter::new()).count(), 2);
        let latest: Vec<_> = store
            .select_entries(FeatureFilter::new().valid_time(TemporalFilter::LatestVersion))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].1.name, "second");
        assert_eq!(latest[0].0.valid_start_time(), datetime!(2024-03-01 0:00 UTC));
    }

    #[test]
    fn test_error_ends_iteration() {
        let store = store_with(100, 2);
        store.close();
        let mut entries = store.select_entries(FeatureFilter::new());
        assert!(entries.next().unwrap().is_err());
        assert!(entries.next().is_none());
    }
}
