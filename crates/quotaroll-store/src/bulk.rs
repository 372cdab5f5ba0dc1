//! NDJSON bulk request encoding and response decoding

use quotaroll_core::error::Result;
use quotaroll_core::store::{BulkItem, BulkItemResult, BulkResponse};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Encode items as `index` actions, one action line and one source line each.
///
/// ```
/// use quotaroll_core::store::BulkItem;
/// use quotaroll_store::bulk::encode;
/// use serde_json::{Value, json};
///
/// let body = encode("bills", &[BulkItem { id: "2024-03-a".into(), source: json!({"v": 1}) }]).unwrap();
/// let lines: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
/// assert_eq!(lines[0], json!({"index": {"_index": "bills", "_id": "2024-03-a"}}));
/// assert_eq!(lines[1], json!({"v": 1}));
/// ```
pub fn encode(index: &str, items: &[BulkItem]) -> Result<String> {
    let mut body = String::new();
    for item in items {
        let action = json!({ "index": { "_index": index, "_id": item.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&item.source)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Decode a `_bulk` response into per-item outcomes in request order.
///
/// Requested ids the response does not mention are reported as failed with
/// status 0.
pub fn decode(response: &Value, requested: &[String]) -> Result<BulkResponse> {
    let raw = RawResponse::deserialize(response)?;

    let mut outcomes: HashMap<String, BulkItemResult> = HashMap::new();
    for (position, entry) in raw.items.iter().enumerate() {
        // Each entry is keyed by its action name ("index", "create", ...)
        let Some(item) = entry.values().next() else {
            continue;
        };
        let item = RawItem::deserialize(item)?;
        let id = item
            .id
            .or_else(|| requested.get(position).cloned())
            .unwrap_or_default();
        outcomes.insert(
            id.clone(),
            BulkItemResult {
                id,
                status: item.status,
                error: item.error.as_ref().map(error_reason),
            },
        );
    }

    let items = requested
        .iter()
        .map(|id| {
            outcomes.remove(id).unwrap_or_else(|| BulkItemResult {
                id: id.clone(),
                status: 0,
                error: Some("no result reported for document".to_string()),
            })
        })
        .collect();
    Ok(BulkResponse { items })
}

fn error_reason(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str).unwrap_or("error");
            match obj.get("reason").and_then(Value::as_str) {
                Some(reason) => format!("{kind}: {reason}"),
                None => kind.to_string(),
            }
        }
        other => other.to_string(),
    }
}
