//! SQL generation for one feature table.

use rusqlite::types::Value;
use time::OffsetDateTime;

use featstore_types::TimeExtent;

use crate::filter::{FeatureFilter, TemporalFilter};
use crate::range::{UNBOUNDED_BEGIN, UNBOUNDED_END};

/// Columns written by an upsert, in binding order.
const UPSERT_COLUMNS: [&str; 14] = [
    "id",
    "parent_id",
    "uid",
    "name",
    "description",
    "geometry",
    "min_x",
    "min_y",
    "max_x",
    "max_y",
    "valid_time",
    "valid_begin",
    "valid_end",
    "data",
];

/// Number of parameters bound by [`QueryBuilder::upsert_sql`].
pub const UPSERT_PARAMS: usize = UPSERT_COLUMNS.len() * 2 - 2;

/// Builds parameterized statements for a feature table.
///
/// The table name is interpolated as-is and must be a plain identifier;
/// [`StoreConfig::validate`](crate::StoreConfig::validate) enforces this.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table and index DDL.
    pub fn create_table_sql(&self) -> String {
        let t = &self.table;
        format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER NOT NULL,
                parent_id INTEGER NOT NULL DEFAULT 0,
                uid TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                geometry BLOB,
                min_x REAL,
                min_y REAL,
                max_x REAL,
                max_y REAL,
                valid_time TEXT NOT NULL,
                valid_begin INTEGER NOT NULL,
                valid_end INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (id, valid_begin)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS {t}_uid_idx ON {t}(uid, valid_begin);
            CREATE INDEX IF NOT EXISTS {t}_parent_idx ON {t}(parent_id);
            CREATE INDEX IF NOT EXISTS {t}_time_idx ON {t}(valid_begin, valid_end);
            CREATE INDEX IF NOT EXISTS {t}_bbox_idx ON {t}(min_x, max_x, min_y, max_y);"
        )
    }

    /// Insert-or-update keyed on `(id, valid_begin)`.
    ///
    /// Parameters `?1..?14` are the insert values in column order; `?15..?26`
    /// repeat every column except the two key columns for the update clause.
    pub fn upsert_sql(&self) -> String {
        let columns = UPSERT_COLUMNS.join(", ");
        let values = (1..=UPSERT_COLUMNS.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = UPSERT_COLUMNS
            .iter()
            .filter(|c| **c != "id" && **c != "valid_begin")
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, UPSERT_COLUMNS.len() + 1 + i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id, valid_begin) DO UPDATE SET {}",
            self.table, columns, values, updates
        )
    }

    /// Body and range of one version: `?1` id, `?2` valid begin seconds.
    pub fn select_by_key_sql(&self) -> String {
        format!(
            "SELECT data, valid_time FROM {} WHERE id = ?1 AND valid_begin = ?2",
            self.table
        )
    }

    /// Versions of a uid, latest first.
    pub fn select_versions_by_uid_sql(&self) -> String {
        format!(
            "SELECT id, parent_id, valid_begin FROM {} WHERE uid = ?1 ORDER BY valid_begin DESC",
            self.table
        )
    }

    pub fn exists_by_id_sql(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1) AS \"exists\"",
            self.table
        )
    }

    pub fn exists_by_uid_sql(&self) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE uid = ?1) AS \"exists\"",
            self.table
        )
    }

    /// Number of stored versions.
    pub fn count_records_sql(&self) -> String {
        format!("SELECT COUNT(*) AS recordsCount FROM {}", self.table)
    }

    /// Number of distinct features.
    pub fn count_features_sql(&self) -> String {
        format!("SELECT COUNT(DISTINCT uid) AS featuresCount FROM {}", self.table)
    }

    /// Extent of all geometries; every column is NULL when there is none.
    pub fn bbox_sql(&self) -> String {
        format!(
            "SELECT MIN(min_x), MIN(min_y), MAX(max_x), MAX(max_y) FROM {}",
            self.table
        )
    }

    /// Version valid at `?2` of feature `?1`.
    pub fn current_version_by_id_sql(&self) -> String {
        self.current_version_sql("id")
    }

    /// Version valid at `?2` of the feature with uid `?1`.
    pub fn current_version_by_uid_sql(&self) -> String {
        self.current_version_sql("uid")
    }

    fn current_version_sql(&self, column: &str) -> String {
        format!(
            "SELECT id, parent_id, valid_time FROM {} \
             WHERE {} = ?1 AND valid_begin <= ?2 AND valid_end >= ?2 \
             ORDER BY valid_begin DESC LIMIT 1",
            self.table, column
        )
    }

    /// Parent of the latest version of `?1`.
    pub fn parent_sql(&self) -> String {
        format!(
            "SELECT parent_id FROM {} WHERE id = ?1 ORDER BY valid_begin DESC LIMIT 1",
            self.table
        )
    }

    pub fn max_id_sql(&self) -> String {
        format!("SELECT COALESCE(MAX(id), 0) FROM {}", self.table)
    }

    /// Delete one version: `?1` id, `?2` valid begin seconds.
    pub fn remove_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE id = ?1 AND valid_begin = ?2",
            self.table
        )
    }

    /// Delete every row matching a `WHERE` clause from [`build_where`](Self::build_where).
    pub fn remove_matching_sql(&self, where_clause: &str) -> String {
        format!("DELETE FROM {} {}", self.table, where_clause)
    }

    pub fn clear_sql(&self) -> String {
        format!("DELETE FROM {}", self.table)
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table)
    }

    pub fn backup_table(&self) -> String {
        format!("{}_backup", self.table)
    }

    /// Replace the backup table with a copy of the current rows.
    pub fn backup_sql(&self) -> String {
        let backup = self.backup_table();
        format!(
            "DROP TABLE IF EXISTS {backup}; CREATE TABLE {backup} AS SELECT * FROM {};",
            self.table
        )
    }

    /// Replace the current rows with those of the backup table.
    pub fn restore_sql(&self) -> String {
        format!(
            "DELETE FROM {t}; INSERT INTO {t} SELECT * FROM {};",
            self.backup_table(),
            t = self.table
        )
    }

    /// One page of matching rows in `(id, valid_begin)` order.
    ///
    /// Parameters are those of `where_clause`, then the cursor
    /// `(id, id, valid_begin)` when `after_cursor` is set, then the page size.
    pub fn select_page_sql(&self, where_clause: &str, after_cursor: bool) -> String {
        let mut sql = format!(
            "SELECT id, parent_id, valid_begin, valid_time, data FROM {} {}",
            self.table, where_clause
        );
        if after_cursor {
            sql.push_str(if where_clause.is_empty() { "WHERE " } else { " AND " });
            sql.push_str("(id > ? OR (id = ? AND valid_begin > ?))");
        }
        sql.push_str(" ORDER BY id ASC, valid_begin ASC LIMIT ?");
        sql
    }

    /// Translate a filter into a `WHERE` clause with anonymous `?` parameters.
    ///
    /// The value predicate and the limit are not part of the clause.
    pub fn build_where<V>(&self, filter: &FeatureFilter<V>, now: OffsetDateTime) -> (String, Vec<Value>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if !filter.internal_ids.is_empty() {
            conditions.push(format!("id IN ({})", placeholders(filter.internal_ids.len())));
            params.extend(filter.internal_ids.iter().map(|id| Value::Integer(*id as i64)));
        }

        if !filter.parent_ids.is_empty() {
            conditions.push(format!(
                "parent_id IN ({})",
                placeholders(filter.parent_ids.len())
            ));
            params.extend(filter.parent_ids.iter().map(|id| Value::Integer(*id as i64)));
        }

        if !filter.uids.is_empty() {
            let mut alternatives = Vec::with_capacity(filter.uids.len());
            for uid in &filter.uids {
                match uid.strip_suffix('*') {
                    Some(prefix) => {
                        alternatives.push("uid LIKE ? ESCAPE '\\'");
                        params.push(Value::Text(format!("{}%", escape_like(prefix))));
                    }
                    None => {
                        alternatives.push("uid = ?");
                        params.push(Value::Text(uid.clone()));
                    }
                }
            }
            conditions.push(format!("({})", alternatives.join(" OR ")));
        }

        if let Some(temporal) = &filter.valid_time {
            match temporal {
                TemporalFilter::Intersects(period) => {
                    let (begin, end) = period_seconds(period);
                    conditions.push("valid_begin <= ? AND valid_end >= ?".to_string());
                    params.extend([Value::Integer(end), Value::Integer(begin)]);
                }
                TemporalFilter::Contains(period) => {
                    let (begin, end) = period_seconds(period);
                    conditions.push("valid_begin <= ? AND valid_end >= ?".to_string());
                    params.extend([Value::Integer(begin), Value::Integer(end)]);
                }
                TemporalFilter::Equals(period) => {
                    let (begin, end) = period_seconds(period);
                    conditions.push("valid_begin = ? AND valid_end = ?".to_string());
                    params.extend([Value::Integer(begin), Value::Integer(end)]);
                }
                TemporalFilter::CurrentTime => {
                    let now = now.unix_timestamp();
                    conditions.push("valid_begin <= ? AND valid_end >= ?".to_string());
                    params.extend([Value::Integer(now), Value::Integer(now)]);
                }
                TemporalFilter::LatestVersion => {
                    conditions.push(format!(
                        "valid_begin = (SELECT MAX(latest.valid_begin) FROM {t} AS latest \
                         WHERE latest.id = {t}.id)",
                        t = self.table
                    ));
                }
            }
        }

        if let Some(bbox) = &filter.bbox {
            conditions.push("min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ?".to_string());
            params.extend([
                Value::Real(bbox.max_x),
                Value::Real(bbox.min_x),
                Value::Real(bbox.max_y),
                Value::Real(bbox.min_y),
            ]);
        }

        if !filter.keywords.is_empty() {
            let mut alternatives = Vec::with_capacity(filter.keywords.len());
            for keyword in &filter.keywords {
                alternatives.push(
                    "(uid LIKE ? ESCAPE '\\' OR name LIKE ? ESCAPE '\\' \
                     OR description LIKE ? ESCAPE '\\')",
                );
                let pattern = format!("%{}%", escape_like(keyword));
                params.extend(std::iter::repeat_n(Value::Text(pattern), 3));
            }
            conditions.push(format!("({})", alternatives.join(" OR ")));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn period_seconds(period: &TimeExtent) -> (i64, i64) {
    (
        period.begin.map_or(UNBOUNDED_BEGIN, |t| t.unix_timestamp()),
        period.end.map_or(UNBOUNDED_END, |t| t.unix_timestamp()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::{Bbox, BigId, Feature};
    use rusqlite::Connection;
    use time::macros::datetime;

    fn builder() -> QueryBuilder {
        QueryBuilder::new("features")
    }

    #[test]
    fn test_upsert_binds_twice() {
        let sql = builder().upsert_sql();
        assert!(sql.starts_with("INSERT INTO features (id, parent_id, uid,"));
        assert!(sql.contains("VALUES (?1, ?2,"));
        assert!(sql.contains("ON CONFLICT(id, valid_begin) DO UPDATE SET parent_id = ?15,"));
        assert!(sql.ends_with("data = ?26"));
        assert_eq!(UPSERT_PARAMS, 26);
    }

    #[test]
    fn test_ddl_is_valid_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&builder().create_table_sql()).unwrap();
        conn.execute_batch(&builder().create_table_sql()).unwrap();
        conn.prepare(&builder().upsert_sql()).unwrap();
        conn.prepare(&builder().select_page_sql("", true)).unwrap();
    }

    #[test]
    fn test_empty_filter() {
        let filter = FeatureFilter::<Feature>::new();
        let (clause, params) = builder().build_where(&filter, OffsetDateTime::now_utc());
        assert!(clause.is_empty());
        assert!(params.is_empty());
        assert_eq!(
            builder().select_page_sql(&clause, false),
            "SELECT id, parent_id, valid_begin, valid_time, data FROM features  \
             ORDER BY id ASC, valid_begin ASC LIMIT ?"
        );
    }

    #[test]
    fn test_ids_and_uids() {
        let filter = FeatureFilter::<Feature>::new()
            .internal_ids([BigId::new(1, 3), BigId::new(1, 4)])
            .uid("urn:x:1")
            .uid("urn:osh_sensor:*");
        let (clause, params) = builder().build_where(&filter, OffsetDateTime::now_utc());
        assert_eq!(
            clause,
            "WHERE id IN (?, ?) AND (uid = ? OR uid LIKE ? ESCAPE '\\')"
        );
        assert_eq!(params[3], Value::Text("urn:osh\\_sensor:%".to_string()));
    }

    #[test]
    fn test_temporal_intersects() {
        let period = TimeExtent::period(
            datetime!(2024-01-01 0:00 UTC),
            datetime!(2024-02-01 0:00 UTC),
        );
        let filter = FeatureFilter::<Feature>::new().valid_time(TemporalFilter::Intersects(period));
        let (clause, params) = builder().build_where(&filter, OffsetDateTime::now_utc());
        assert_eq!(clause, "WHERE valid_begin <= ? AND valid_end >= ?");
        assert_eq!(
            params,
            [
                Value::Integer(datetime!(2024-02-01 0:00 UTC).unix_timestamp()),
                Value::Integer(datetime!(2024-01-01 0:00 UTC).unix_timestamp()),
            ]
        );
    }

    #[test]
    fn test_open_period_uses_sentinels() {
        let filter = FeatureFilter::<Feature>::new()
            .valid_time(TemporalFilter::Contains(TimeExtent::unbounded()));
        let (_, params) = builder().build_where(&filter, OffsetDateTime::now_utc());
        assert_eq!(
            params,
            [Value::Integer(UNBOUNDED_BEGIN), Value::Integer(UNBOUNDED_END)]
        );
    }

    #[test]
    fn test_bbox_and_keywords() {
        let filter = FeatureFilter::<Feature>::new()
            .bbox(Bbox::new(0.0, 1.0, 2.0, 3.0))
            .keyword("50%");
        let (clause, params) = builder().build_where(&filter, OffsetDateTime::now_utc());
        assert!(clause.contains("min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ?"));
        assert_eq!(params.len(), 7);
        assert_eq!(params[0], Value::Real(2.0));
        assert_eq!(params[4], Value::Text("%50\\%%".to_string()));
    }

    #[test]
    fn test_latest_version_is_valid_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&builder().create_table_sql()).unwrap();
        let filter = FeatureFilter::<Feature>::new().valid_time(TemporalFilter::LatestVersion);
        let (clause, _) = builder().build_where(&filter, OffsetDateTime::now_utc());
        conn.prepare(&builder().select_page_sql(&clause, true)).unwrap();
        conn.prepare(&builder().remove_matching_sql(&clause)).unwrap();
    }
}
