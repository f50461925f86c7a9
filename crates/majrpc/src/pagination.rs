//! Cursor-following game record listing.

use std::collections::HashSet;

use majrpc_client::{Caller, RpcError};
use serde_json::{json, Value};

const RECORDS_METHOD: &str = "fetchCustomizedContestGameRecords";

/// Follows the gateway's `next_index` cursor until it runs out, collecting
/// every game uuid for the contest.
///
/// Pages overlap at their edges, so uuids are deduplicated keeping their
/// first-encounter position. The gateway pages newest-first; the result is
/// reversed so callers iterate oldest-first.
pub(crate) async fn contest_game_ids<C: Caller>(
    caller: &C,
    unique_id: u64,
) -> Result<Vec<String>, RpcError> {
    let mut ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut last_index: Option<u64> = None;

    loop {
        let mut args = json!({ "unique_id": unique_id });
        if let Some(index) = last_index {
            args["last_index"] = json!(index);
        }
        let resp = caller.call(RECORDS_METHOD, args).await?;

        let records = resp
            .get("record_list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for record in &records {
            if let Some(uuid) = record.get("uuid").and_then(Value::as_str) {
                if seen.insert(uuid.to_string()) {
                    ids.push(uuid.to_string());
                }
            }
        }

        match resp.get("next_index").and_then(Value::as_u64) {
            Some(next) if !records.is_empty() => last_index = Some(next),
            _ => break,
        }
    }

    tracing::debug!(unique_id, games = ids.len(), "contest game listing complete");
    ids.reverse();
    Ok(ids)
}
