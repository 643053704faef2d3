//! Resolution of the active standards version and per-age lookups.
//!
//! A version only takes effect after an explicit activation. When nothing is
//! active, or the matched row does not parse, every lookup returns `None` and
//! the caller falls back to its built-in constants.

use super::range::parse_range_data;
use crate::connections::{StandardsStorage, Store};
use crate::models::{StandardEntry, StandardKind};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = version.as_bytes();
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == digit {
            end += 1;
        }
        let chunk = &version[start..end];
        out.push(if digit {
            Segment::Number(chunk.trim_start_matches('0'))
        } else {
            Segment::Text(chunk)
        });
        start = end;
    }
    out
}

/// Orders version strings naturally: digit runs compare as numbers, so
/// `2025.10` sorts after `2025.9`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (sa, sb) = (segments(a.trim()), segments(b.trim()));
    for (x, y) in sa.iter().zip(sb.iter()) {
        let ord = match (x, y) {
            (Segment::Number(x), Segment::Number(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
            (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    sa.len().cmp(&sb.len()).then_with(|| a.cmp(b))
}

/// The greatest version among entries with any active row.
pub fn resolve_active_version(entries: &[StandardEntry]) -> Option<String> {
    entries
        .iter()
        .filter(|e| e.is_active && !e.version.trim().is_empty())
        .map(|e| e.version.as_str())
        .max_by(|a, b| compare_versions(a, b))
        .map(str::to_string)
}

/// Sorts by `month_min` (unbounded first), then `month_max`, then id.
pub fn order_entries(entries: &mut [StandardEntry]) {
    entries.sort_by(|a, b| {
        a.month_min
            .cmp(&b.month_min)
            .then_with(|| a.month_max.cmp(&b.month_max))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// First entry whose `[month_min, month_max)` contains the age, else the last
/// entry. `entries` must already be ordered. Negative ages count as zero.
pub fn pick_by_age_range(entries: &[StandardEntry], age_months: f64) -> Option<&StandardEntry> {
    let age = if age_months < 0.0 { 0.0 } else { age_months };
    entries
        .iter()
        .find(|e| {
            let min_ok = e.month_min.map_or(true, |min| age >= f64::from(min));
            let max_ok = e.month_max.map_or(true, |max| age < f64::from(max));
            min_ok && max_ok
        })
        .or_else(|| entries.last())
}

/// Fallback daily weight gain text by age.
pub fn default_weight_gain_text(age_months: f64) -> &'static str {
    if age_months < 3.0 {
        "0.025-0.035kg/天"
    } else if age_months < 6.0 {
        "0.015-0.025kg/天"
    } else {
        "0.01-0.015kg/天"
    }
}

/// Fallback daily height gain text by age.
pub fn default_height_gain_text(age_months: f64) -> &'static str {
    if age_months < 3.0 {
        "8-11mm/天"
    } else if age_months < 6.0 {
        "6-9mm/天"
    } else {
        "4-6mm/天"
    }
}

/// Lookup service over a [`StandardsStorage`] backend. Stateless between calls.
pub struct StandardsLookup<S: ?Sized = dyn Store> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for StandardsLookup<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StandardsStorage + ?Sized> StandardsLookup<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The currently active version, if any.
    pub async fn active_version(&self) -> Option<String> {
        match self.store.active_versions().await {
            Ok(versions) => versions
                .into_iter()
                .filter(|v| !v.trim().is_empty())
                .max_by(|a, b| compare_versions(a, b)),
            Err(e) => {
                debug!(error = %e, "active standards version unavailable");
                None
            }
        }
    }

    /// Active rows of one kind, ordered for age matching. Empty means unresolved.
    pub async fn active_entries(&self, kind: StandardKind) -> Vec<StandardEntry> {
        let Some(version) = self.active_version().await else {
            return Vec::new();
        };
        match self.store.active_entries(&version, kind.as_str()).await {
            Ok(mut entries) => {
                order_entries(&mut entries);
                entries
            }
            Err(e) => {
                debug!(error = %e, kind = kind.as_str(), "standards entries unavailable");
                Vec::new()
            }
        }
    }

    /// `recommended` ml/kg/day of the first milk-by-weight row, when positive.
    pub async fn milk_by_weight_coefficient(&self) -> Option<f64> {
        let entries = self.active_entries(StandardKind::MilkByWeight).await;
        let data = parse_range_data(&entries.first()?.data)?;
        (data.recommended > 0.0).then_some(data.recommended)
    }

    pub async fn milk_by_weight_coefficient_or(&self, fallback: f64) -> f64 {
        self.milk_by_weight_coefficient().await.unwrap_or(fallback)
    }

    /// Formatted range text of the row matching the age.
    pub async fn range_text(&self, kind: StandardKind, age_months: f64) -> Option<String> {
        let entries = self.active_entries(kind).await;
        let hit = pick_by_age_range(&entries, age_months)?;
        parse_range_data(&hit.data).map(|d| d.text())
    }

    pub async fn milk_by_age_text(&self, age_months: f64) -> Option<String> {
        self.range_text(StandardKind::MilkByAge, age_months).await
    }

    pub async fn weight_gain_text(&self, age_months: f64) -> String {
        self.range_text(StandardKind::WeightGain, age_months)
            .await
            .unwrap_or_else(|| default_weight_gain_text(age_months).to_string())
    }

    pub async fn height_gain_text(&self, age_months: f64) -> String {
        self.range_text(StandardKind::HeightGain, age_months)
            .await
            .unwrap_or_else(|| default_height_gain_text(age_months).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn entry(version: &str, kind: &str, min: Option<i32>, max: Option<i32>, active: bool) -> StandardEntry {
        StandardEntry {
            id: 0,
            version: version.to_string(),
            standard_type: kind.to_string(),
            month_min: min,
            month_max: max,
            data: json!({"min": 600, "max": 700, "recommended": 650, "unit": "ml/day"}),
            is_active: active,
        }
    }

    #[test]
    fn test_version_ordering_is_natural() {
        assert_eq!(compare_versions("2025.10", "2025.9"), Ordering::Greater);
        assert_eq!(compare_versions("v2", "v10"), Ordering::Less);
        assert_eq!(compare_versions("2025", "2025.1"), Ordering::Less);
        assert_eq!(compare_versions("2025", "2025"), Ordering::Equal);
    }

    #[test]
    fn test_inactive_versions_never_resolve() {
        let entries = vec![
            entry("2026", "milk_by_age", None, None, false),
            entry("2025", "milk_by_age", None, None, true),
        ];
        assert_eq!(resolve_active_version(&entries).as_deref(), Some("2025"));
        assert_eq!(resolve_active_version(&entries[..1]), None);
    }

    #[test]
    fn test_pick_prefers_first_match_and_extrapolates_last() {
        let mut entries = vec![
            entry("1", "milk_by_age", Some(6), None, true),
            entry("1", "milk_by_age", Some(0), Some(3), true),
            entry("1", "milk_by_age", Some(3), Some(6), true),
        ];
        for (i, e) in entries.iter_mut().enumerate() {
            e.id = i as u64;
        }
        order_entries(&mut entries);
        assert_eq!(pick_by_age_range(&entries, -4.0).unwrap().month_min, Some(0));
        assert_eq!(pick_by_age_range(&entries, 3.0).unwrap().month_min, Some(3));
        assert_eq!(pick_by_age_range(&entries, 40.0).unwrap().month_min, Some(6));
        assert!(pick_by_age_range(&[], 1.0).is_none());
    }

    #[test]
    fn test_unbounded_minimum_sorts_first() {
        let mut entries = vec![
            entry("1", "x", Some(2), Some(4), true),
            entry("1", "x", None, Some(2), true),
        ];
        order_entries(&mut entries);
        assert_eq!(entries[0].month_min, None);
    }

    #[tokio::test]
    async fn test_lookup_without_active_version_is_unresolved() {
        let store = Arc::new(MemoryStore::new());
        store.insert_standard(entry("2025", "milk_by_weight", None, None, true)).await.unwrap();
        let lookup = StandardsLookup::new(Arc::clone(&store));
        assert_eq!(lookup.milk_by_weight_coefficient().await, None);
        assert_eq!(lookup.milk_by_weight_coefficient_or(135.0).await, 135.0);
        assert_eq!(lookup.weight_gain_text(1.0).await, "0.025-0.035kg/天");
        assert_eq!(lookup.height_gain_text(7.0).await, "4-6mm/天");

        store.activate_version("2025").await.unwrap();
        assert_eq!(lookup.milk_by_weight_coefficient().await, Some(650.0));
    }

    #[tokio::test]
    async fn test_lookup_uses_greatest_active_version_and_parses_text() {
        let store = Arc::new(MemoryStore::new());
        let mut old = entry("2024", "milk_by_age", Some(0), None, true);
        old.data = json!({"min": 1, "max": 2, "unit": "ml/day"});
        store.seed_standard(old).await;
        store.seed_standard(entry("2025", "milk_by_age", Some(0), None, true)).await;
        let mut broken = entry("2025", "weight_gain", Some(0), None, true);
        broken.data = json!({"min": "n/a"});
        store.seed_standard(broken).await;

        let lookup = StandardsLookup::new(store);
        assert_eq!(lookup.active_version().await.as_deref(), Some("2025"));
        assert_eq!(lookup.milk_by_age_text(2.0).await.as_deref(), Some("600-700ml/天"));
        // A malformed row falls back instead of reporting partial values.
        assert_eq!(lookup.weight_gain_text(4.0).await, "0.015-0.025kg/天");
    }

    fn arb_entries() -> impl Strategy<Value = Vec<StandardEntry>> {
        prop::collection::vec(
            (0u32..30, any::<bool>(), prop::option::of(0i32..24), 1i32..12),
            0..20,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (v, active, min, width))| StandardEntry {
                    id: i as u64,
                    version: format!("2025.{}", v),
                    standard_type: "milk_by_age".to_string(),
                    month_min: min,
                    month_max: min.map(|m| m + width),
                    data: json!({}),
                    is_active: active,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_active_version_ignores_insertion_order(mut entries in arb_entries(), seed in any::<u64>()) {
            let expected = resolve_active_version(&entries);
            let len = entries.len().max(1);
            entries.rotate_left((seed as usize) % len);
            entries.reverse();
            prop_assert_eq!(resolve_active_version(&entries), expected.clone());
            if let Some(version) = expected {
                for e in entries.iter().filter(|e| e.is_active) {
                    prop_assert_ne!(compare_versions(&e.version, &version), Ordering::Greater);
                }
            } else {
                prop_assert!(entries.iter().all(|e| !e.is_active));
            }
        }

        #[test]
        fn prop_non_empty_entries_always_yield_a_pick(mut entries in arb_entries(), age in 0.0f64..600.0) {
            order_entries(&mut entries);
            let picked = pick_by_age_range(&entries, age);
            prop_assert_eq!(picked.is_some(), !entries.is_empty());
            let beyond = entries.iter().filter_map(|e| e.month_max).max().map(|m| f64::from(m) + 1.0);
            if let (Some(beyond), Some(last)) = (beyond, entries.last()) {
                if entries.iter().all(|e| e.month_max.is_some()) {
                    prop_assert_eq!(pick_by_age_range(&entries, beyond), Some(last));
                }
            }
        }
    }
}
