//! Split a query into fixed-size batches, preserving order; record/restore a positional
//! ordering tag for callers that need to reassemble results outside the batch boundary.

use crate::constants::API_MAX_BATCH;
use crate::error::{ExtractError, Result};
use crate::request::QueryItem;
use serde_json::Value;

/// Split `query` into contiguous slices of at most `batch_size` items, preserving order.
/// Fails if `batch_size` is 0 or exceeds the server's hard maximum.
pub fn batches(query: &[QueryItem], batch_size: usize) -> Result<Vec<&[QueryItem]>> {
    if batch_size == 0 {
        return Err(ExtractError::Internal("batch_size must be at least 1".to_string()));
    }
    if batch_size > API_MAX_BATCH {
        return Err(ExtractError::Internal(format!(
            "batch_size {batch_size} exceeds the server's maximum of {API_MAX_BATCH}"
        )));
    }
    Ok(query.chunks(batch_size).collect())
}

/// Attach a stringified positional index as `meta` on each query item, for callers that need
/// to restore submission order from the server's echoed `userQuery` downstream. Fails if any
/// item already carries a `meta` field.
pub fn record_order(query: &[Value]) -> Result<Vec<Value>> {
    query
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut map = item
                .as_object()
                .cloned()
                .ok_or_else(|| ExtractError::Internal("query item must be a JSON object".to_string()))?;
            if map.contains_key("meta") {
                return Err(ExtractError::Internal(
                    "query item already has a `meta` field; record_order would overwrite it".to_string(),
                ));
            }
            map.insert("meta".to_string(), Value::String(idx.to_string()));
            Ok(Value::Object(map))
        })
        .collect()
}

/// Sort per-query results by the integer value of `query.userQuery.meta`, restoring the order
/// `record_order` imposed.
pub fn restore_order(mut results: Vec<Value>) -> Result<Vec<Value>> {
    let key = |value: &Value| -> Result<i64> {
        value
            .pointer("/query/userQuery/meta")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ExtractError::Internal(
                    "result is missing an integer query.userQuery.meta to restore order by".to_string(),
                )
            })
    };
    let mut err = None;
    results.sort_by_key(|v| match key(v) {
        Ok(k) => k,
        Err(e) => {
            err.get_or_insert(e);
            i64::MAX
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(results)
}
