use serde::Deserialize;
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;

use crate::ElasticErr;
use logrelay_types::{RecordId, StreamRecord, Timestamp};

/// Field added to documents that do not carry a timestamp of their own.
pub const TIMESTAMP_KEY: &str = "@timestamp";
/// Field holding a payload that is not a JSON object.
pub const MESSAGE_KEY: &str = "message";

/// How Elasticsearch answered one item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Written now, or written by an earlier delivery (`409 Conflict` on `create`).
    pub confirmed: Vec<RecordId>,
    pub failed: Vec<ItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<ItemError>,
}

#[derive(Debug, Deserialize)]
struct ItemError {
    #[serde(rename = "type")]
    kind: Option<String>,
    reason: Option<String>,
}

/// Name of the index a record is written to. Index names must be lowercase.
pub fn index_name(
    prefix: &str,
    date_format: Option<&str>,
    timestamp: &Timestamp,
) -> Result<String, ElasticErr> {
    let mut name = prefix.to_owned();
    if let Some(format) = date_format {
        let format = time::format_description::parse(format)
            .map_err(|e| ElasticErr::Config(format!("index date format: {e}")))?;
        name.push_str(&timestamp.format(&format)?);
    }
    Ok(name.to_lowercase())
}

/// The NDJSON body of a `_bulk` request: a `create` action line then the document, per record.
pub fn bulk_body(
    records: &[StreamRecord],
    prefix: &str,
    date_format: Option<&str>,
) -> Result<String, ElasticErr> {
    let mut body = String::new();
    for record in records {
        let action = serde_json::json!({
            "create": {
                "_index": index_name(prefix, date_format, record.timestamp())?,
                "_id": record.id().to_string(),
            }
        });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&document(record)?);
        body.push('\n');
    }
    Ok(body)
}

/// A JSON object payload is sent as is, re-serialized onto one line. Anything else
/// is wrapped into `{"@timestamp": .., "message": ..}`.
fn document(record: &StreamRecord) -> Result<String, ElasticErr> {
    match serde_json::from_str::<serde_json::Value>(record.payload()) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value.to_string()),
        _ => {
            let timestamp = record.timestamp().format(&Rfc3339)?;
            Ok(serde_json::json!({
                TIMESTAMP_KEY: timestamp,
                MESSAGE_KEY: record.payload(),
            })
            .to_string())
        }
    }
}

/// Sort the items of a bulk response into confirmed ids and failures.
pub fn parse_bulk_response(body: &[u8]) -> Result<BulkOutcome, ElasticErr> {
    let response: BulkResponse = serde_json::from_slice(body)?;
    let mut outcome = BulkOutcome {
        confirmed: Vec::new(),
        failed: Vec::new(),
    };
    for item in response.items.into_iter().flat_map(|m| m.into_values()) {
        let id = item.id.unwrap_or_default();
        match item.status {
            200 | 201 | 409 => match id.parse::<RecordId>() {
                Ok(rid) => outcome.confirmed.push(rid),
                Err(_) => log::warn!("Bulk response carries a foreign _id `{id}`"),
            },
            status => {
                let reason = match item.error {
                    Some(ItemError { kind, reason }) => format!(
                        "{}: {}",
                        kind.unwrap_or_default(),
                        reason.unwrap_or_default()
                    ),
                    None => String::new(),
                };
                outcome.failed.push(ItemFailure { id, status, reason });
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod test {
    use super::*;
    use logrelay_types::timestamp_from_millis;

    const DAY: &str = "[year][month][day]";

    fn record(millis: u64, seq: u64, payload: &str) -> StreamRecord {
        StreamRecord::new(
            RecordId::new(millis, seq),
            timestamp_from_millis(millis as i128).unwrap(),
            payload.to_owned(),
        )
    }

    #[test]
    fn test_index_name() {
        // 2023-11-14T22:13:20Z
        let ts = timestamp_from_millis(1_700_000_000_000).unwrap();
        assert_eq!(index_name("Log-", Some(DAY), &ts).unwrap(), "log-20231114");
        assert_eq!(index_name("logs", None, &ts).unwrap(), "logs");
    }

    #[test]
    fn test_bulk_body() {
        let records = [
            record(1_700_000_000_000, 0, "{\n  \"Level\": \"Warning\"\n}"),
            record(1_700_000_000_000, 1, "plain text"),
        ];
        let body = bulk_body(&records, "log-", Some(DAY)).unwrap();
        let lines: Vec<serde_json::Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));

        assert_eq!(lines[0]["create"]["_index"], "log-20231114");
        assert_eq!(lines[0]["create"]["_id"], "1700000000000-0");
        assert_eq!(lines[1]["Level"], "Warning");

        assert_eq!(lines[2]["create"]["_id"], "1700000000000-1");
        assert_eq!(lines[3][MESSAGE_KEY], "plain text");
        assert_eq!(lines[3][TIMESTAMP_KEY], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_parse_bulk_response() {
        let body = br#"{
            "took": 30,
            "errors": true,
            "items": [
                {"create": {"_index": "log-20231114", "_id": "5-0", "status": 201}},
                {"create": {"_index": "log-20231114", "_id": "5-1", "status": 409,
                    "error": {"type": "version_conflict_engine_exception", "reason": "exists"}}},
                {"create": {"_index": "log-20231114", "_id": "5-2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}},
                {"create": {"_index": "log-20231114", "_id": "5-3", "status": 429,
                    "error": {"type": "es_rejected_execution_exception", "reason": "queue full"}}},
                {"index": {"_index": "log-20231114", "_id": "5-4", "status": 200}}
            ]
        }"#;
        let outcome = parse_bulk_response(body).unwrap();
        assert_eq!(
            outcome.confirmed,
            [RecordId::new(5, 0), RecordId::new(5, 1), RecordId::new(5, 4)]
        );
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.failed[0].id, "5-2");
        assert_eq!(outcome.failed[0].status, 400);
        assert_eq!(
            outcome.failed[0].reason,
            "mapper_parsing_exception: failed to parse"
        );
        assert_eq!(outcome.failed[1].status, 429);
    }

    #[test]
    fn test_parse_bad_response() {
        assert!(parse_bulk_response(b"<html>").is_err());
        let outcome = parse_bulk_response(br#"{"took": 1, "errors": false}"#).unwrap();
        assert!(outcome.confirmed.is_empty() && outcome.failed.is_empty());
    }
}
