//! Pagination snapshot returned alongside list responses.

use serde::{Deserialize, Deserializer, Serialize};

/// Page metadata of one fetch response.
///
/// Some backends report `page`, others `current_page`; both are carried. The struct is
/// always replaced as a whole, never merged field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePaginator")]
pub struct Paginator {
    pub page: u64,
    pub current_page: u64,
    pub item_from: u64,
    pub item_to: u64,
    pub limit: u64,
    pub next_page: Option<u64>,
    pub previous_page: Option<u64>,
    pub total_items: u64,
    pub total_pages: u64,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page: 1,
            current_page: 1,
            item_from: 0,
            item_to: 0,
            limit: 30,
            next_page: Some(0),
            previous_page: Some(0),
            total_items: 0,
            total_pages: 0,
        }
    }
}

/// Paginator as sent by backends: any field may be missing, counters may be `null`.
#[derive(Deserialize, Default)]
#[serde(default)]
struct WirePaginator {
    page: Option<u64>,
    current_page: Option<u64>,
    item_from: Option<u64>,
    item_to: Option<u64>,
    limit: Option<u64>,
    #[serde(deserialize_with = "present")]
    next_page: Option<Option<u64>>,
    #[serde(deserialize_with = "present")]
    previous_page: Option<Option<u64>>,
    total_items: Option<u64>,
    total_pages: Option<u64>,
}

// Distinguishes an explicit `null` (Some(None)) from a missing key (None).
fn present<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

impl From<WirePaginator> for Paginator {
    fn from(wire: WirePaginator) -> Self {
        let defaults = Paginator::default();
        Self {
            page: wire.page.unwrap_or(defaults.page),
            current_page: wire.current_page.unwrap_or(defaults.current_page),
            item_from: wire.item_from.unwrap_or(defaults.item_from),
            item_to: wire.item_to.unwrap_or(defaults.item_to),
            limit: wire.limit.unwrap_or(defaults.limit),
            next_page: wire.next_page.unwrap_or(defaults.next_page),
            previous_page: wire.previous_page.unwrap_or(defaults.previous_page),
            total_items: wire.total_items.unwrap_or(defaults.total_items),
            total_pages: wire.total_pages.unwrap_or(defaults.total_pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_paginator() {
        let p = Paginator::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.current_page, 1);
        assert_eq!(p.limit, 30);
        assert_eq!(p.total_items, 0);
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn test_partial_paginator_fills_defaults() {
        let p: Paginator =
            serde_json::from_value(json!({"current_page": 3, "next_page": null})).unwrap();
        assert_eq!(p.current_page, 3);
        assert_eq!(p.page, 1);
        assert_eq!(p.next_page, None);
        assert_eq!(p.limit, 30);
    }

    #[test]
    fn test_null_counters_read_as_defaults() {
        let p: Paginator = serde_json::from_value(json!({
            "page": null,
            "limit": null,
            "item_from": null,
            "item_to": null,
            "total_items": null,
            "total_pages": 4,
            "previous_page": null
        }))
        .unwrap();
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 30);
        assert_eq!(p.item_from, 0);
        assert_eq!(p.item_to, 0);
        assert_eq!(p.total_items, 0);
        assert_eq!(p.total_pages, 4);
        assert_eq!(p.previous_page, None);
        assert_eq!(p.next_page, Some(0));
    }
}
