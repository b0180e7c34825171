//! Command implementations for the CLI.
//!
//! Each command returns its output as a string; `main` decides where it goes.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use featstore_store::{
    FeatureFilter, FeatureKind, FeatureStore, GeoJsonFeatureStore, TemporalFilter,
};
use featstore_types::{
    Bbox, BigId, Feature, FeatureKey, StoredFeature, TimeExtent, format_instant,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::cli::{OutputFormat, SelectArgs};

/// One listed entry in JSON output.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryJson<'a, V> {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<u64>,
    valid_start: Option<String>,
    feature: &'a V,
}

fn valid_start(key: &FeatureKey) -> Result<Option<String>> {
    if key.is_timeless() {
        return Ok(None);
    }
    Ok(Some(format_instant(key.valid_start_time())?))
}

fn entry_json<'a, V>(key: &FeatureKey, value: &'a V) -> Result<EntryJson<'a, V>> {
    let parent = key.parent_id();
    Ok(EntryJson {
        id: key.internal_id().id(),
        parent_id: (!parent.is_none()).then_some(parent.id()),
        valid_start: valid_start(key)?,
        feature: value,
    })
}

fn entry_line<V: StoredFeature>(out: &mut String, key: &FeatureKey, value: &V) -> Result<()> {
    let start = valid_start(key)?.unwrap_or_else(|| "-".to_string());
    writeln!(
        out,
        "{:>6}  {:<24}  {}  {}",
        key.internal_id().id(),
        start,
        value.unique_identifier(),
        value.name()
    )?;
    Ok(())
}

/// Parse a time given as RFC3339, YYYY-MM-DD (midnight UTC) or "now".
pub fn parse_datetime(s: &str) -> Result<OffsetDateTime> {
    if s.eq_ignore_ascii_case("now") {
        return Ok(OffsetDateTime::now_utc());
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt);
    }

    let format = time::format_description::parse("[year]-[month]-[day]")?;
    if let Ok(date) = time::Date::parse(s, &format) {
        return Ok(date.midnight().assume_utc());
    }

    bail!("Invalid date/time format: {}. Use RFC3339, YYYY-MM-DD or now", s)
}

/// Translate selection arguments into a store filter.
pub fn build_filter<V>(select: &SelectArgs) -> Result<FeatureFilter<V>> {
    let mut filter = FeatureFilter::new();
    for uid in &select.uid {
        filter = filter.uid(uid.as_str());
    }
    for keyword in &select.keyword {
        filter = filter.keyword(keyword.as_str());
    }
    if let Some(bbox) = &select.bbox {
        let [min_x, min_y, max_x, max_y] = bbox[..] else {
            bail!("--bbox needs exactly 4 values, got {}", bbox.len());
        };
        let bbox = Bbox::new(min_x, min_y, max_x, max_y);
        if !bbox.is_valid() {
            bail!("Invalid bounding box: min must not exceed max");
        }
        filter = filter.bbox(bbox);
    }
    if select.latest {
        filter = filter.valid_time(TemporalFilter::LatestVersion);
    } else if let Some(at) = &select.at {
        filter = if at.eq_ignore_ascii_case("now") {
            filter.valid_time(TemporalFilter::CurrentTime)
        } else {
            let at = parse_datetime(at)?;
            filter.valid_time(TemporalFilter::Intersects(TimeExtent::instant(at)))
        };
    }
    if let Some(limit) = select.limit {
        filter = filter.limit(limit);
    }
    Ok(filter)
}

/// Read a GeoJSON `Feature` or `FeatureCollection` document.
pub fn parse_features(text: &str) -> Result<Vec<Feature>> {
    let document: Value = serde_json::from_str(text).context("Input is not valid JSON")?;
    match document.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = document
                .get("features")
                .and_then(Value::as_array)
                .context("FeatureCollection has no features array")?;
            features
                .iter()
                .enumerate()
                .map(|(i, feature)| {
                    Feature::deserialize(feature)
                        .with_context(|| format!("Invalid feature at index {}", i))
                })
                .collect()
        }
        Some("Feature") => Ok(vec![Feature::deserialize(&document).context("Invalid feature")?]),
        Some(other) => bail!("Unsupported GeoJSON type '{}'", other),
        None => bail!("Input is not a GeoJSON object"),
    }
}

/// Add every feature in `text`, new versions included.
pub fn cmd_import(store: &GeoJsonFeatureStore, text: &str, parent: Option<u64>) -> Result<String> {
    let features = parse_features(text)?;
    let parent = parent.map_or(BigId::NONE, |id| BigId::new(store.id_scope(), id));
    let total = features.len();

    for feature in features {
        let uid = feature.uid.clone();
        let key = store
            .add(parent, feature)
            .with_context(|| format!("Failed to import {}", uid))?;
        debug!("Imported {} as {}", uid, key);
    }
    store.commit()?;

    info!("Imported {} features into {}", total, store.datastore_name());
    Ok(format!("Imported {} features\n", total))
}

/// Show the current version of one feature.
pub fn cmd_get<K: FeatureKind>(store: &FeatureStore<K>, uid: &str, format: OutputFormat) -> Result<String>
where
    K::Value: Serialize,
{
    let Some(key) = store.current_version_key_by_uid(uid)? else {
        bail!("No current version of {}", uid);
    };
    let Some(value) = store.get(&key)? else {
        bail!("No current version of {}", uid);
    };

    match format {
        OutputFormat::Json => {
            Ok(serde_json::to_string_pretty(&entry_json(&key, value.as_ref())?)? + "\n")
        }
        OutputFormat::Text => {
            let mut out = String::new();
            entry_line(&mut out, &key, value.as_ref())?;
            if let Some(description) = value.description() {
                writeln!(out, "        {}", description)?;
            }
            if let Some(parent) = store.get_parent(key.internal_id())? {
                writeln!(out, "        parent {}", parent)?;
            }
            Ok(out)
        }
    }
}

/// List the entries matching a selection.
pub fn cmd_list<K: FeatureKind>(
    store: &FeatureStore<K>,
    select: &SelectArgs,
    format: OutputFormat,
) -> Result<String>
where
    K::Value: Serialize,
{
    let filter = build_filter(select)?;
    let entries = store
        .select_entries(filter)
        .collect::<featstore_store::Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => {
            let json = entries
                .iter()
                .map(|(key, value)| entry_json(key, value.as_ref()))
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::to_string_pretty(&json)? + "\n")
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                return Ok("No matching entries.\n".to_string());
            }
            let mut out = String::new();
            for (key, value) in &entries {
                entry_line(&mut out, key, value.as_ref())?;
            }
            Ok(out)
        }
    }
}

/// Show the extent of all stored geometries.
pub fn cmd_bbox(store: &GeoJsonFeatureStore, format: OutputFormat) -> Result<String> {
    let bbox = store.features_bbox()?;
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&bbox)? + "\n"),
        OutputFormat::Text => Ok(format!(
            "{} {} {} {}\n",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        )),
    }
}

/// Count features and versions.
pub fn cmd_count<K: FeatureKind>(store: &FeatureStore<K>) -> Result<String> {
    Ok(format!(
        "{}: {} features, {} versions\n",
        store.datastore_name(),
        store.num_features()?,
        store.num_records()?
    ))
}

/// Remove the current version of a feature.
pub fn cmd_remove(store: &GeoJsonFeatureStore, uid: &str) -> Result<String> {
    let Some(key) = store.current_version_key_by_uid(uid)? else {
        bail!("No current version of {}", uid);
    };
    store.remove(&key)?;
    Ok(format!("Removed {} ({})\n", uid, key))
}

/// Remove every version matching a selection.
pub fn cmd_remove_matching(store: &GeoJsonFeatureStore, select: &SelectArgs) -> Result<String> {
    if select.uid.is_empty()
        && select.keyword.is_empty()
        && select.bbox.is_none()
        && select.at.is_none()
        && !select.latest
    {
        bail!("Refusing to remove everything: give at least one selection criterion");
    }
    let removed = store.remove_entries(&build_filter(select)?)?;
    Ok(format!("Removed {} versions\n", removed))
}
