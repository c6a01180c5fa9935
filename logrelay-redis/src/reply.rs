use std::time::Duration;

use crate::RedisErr;
use logrelay_types::{ConsumerInfo, GroupInfo, PendingEntry, RecordErr, RecordId, StreamRecord};

pub use redis::Value;

#[derive(Debug, Default)]
/// Stream entries of a `XREADGROUP` or `XCLAIM` reply.
pub struct Entries {
    pub records: Vec<StreamRecord>,
    /// Entries that could not be mapped into a record. They are still owned by the reader.
    pub malformed: Vec<(RecordId, RecordErr)>,
}

// bulk(bulk(string-data('"logs"'), bulk(bulk(string-data('"1678280595282-0"'), bulk(field, value, ...)), ...)))
/// Parse the reply of `XREADGROUP .. STREAMS key >`. A nil reply means nothing new.
pub fn parse_read_group_reply(value: Value) -> Result<Entries, RedisErr> {
    let mut entries = Entries::default();
    let streams = match value {
        Value::Nil => return Ok(entries),
        Value::Bulk(streams) => streams,
        other => return Err(unexpected("XREADGROUP", &other)),
    };
    for stream in streams {
        let [_key, values] = pair(stream, "XREADGROUP")?;
        let more = parse_entries(values)?;
        entries.records.extend(more.records);
        entries.malformed.extend(more.malformed);
    }
    Ok(entries)
}

// bulk(bulk(string-data('"1678280595282-0"'), bulk(field, value, ...)), nil, ...)
/// Parse a list of stream entries. Nil entries (deleted while pending) are skipped.
pub fn parse_entries(value: Value) -> Result<Entries, RedisErr> {
    let mut entries = Entries::default();
    let values = match value {
        Value::Nil => return Ok(entries),
        Value::Bulk(values) => values,
        other => return Err(unexpected("entries", &other)),
    };
    for value in values {
        if value == Value::Nil {
            continue;
        }
        let [id, fields] = pair(value, "entry")?;
        let id = parse_record_id(id)?;
        let fields = match fields {
            Value::Bulk(fields) => fields,
            // the entry was deleted, only its id is left in the PEL
            Value::Nil => {
                entries
                    .malformed
                    .push((id, RecordErr::MissingField(logrelay_types::DATA_FIELD)));
                continue;
            }
            other => return Err(unexpected("entry fields", &other)),
        };
        if fields.len() % 2 != 0 {
            return Err(RedisErr::Reply(format!(
                "entry {id} has an odd number of field values"
            )));
        }
        let mut pairs = Vec::with_capacity(fields.len() / 2);
        let mut fields = fields.into_iter();
        while let (Some(field), Some(value)) = (fields.next(), fields.next()) {
            pairs.push((string_from_redis_value(field)?, bytes_from_redis_value(value)?));
        }
        match StreamRecord::from_fields(id, pairs) {
            Ok(record) => entries.records.push(record),
            Err(err) => entries.malformed.push((id, err)),
        }
    }
    Ok(entries)
}

// bulk(bulk(string-data('"1678280595282-0"'), string-data('"consumer"'), int(idle), int(count)), ...)
/// Parse the reply of the extended form of `XPENDING`.
pub fn parse_pending_reply(value: Value) -> Result<Vec<PendingEntry>, RedisErr> {
    let values = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(values) => values,
        other => return Err(unexpected("XPENDING", &other)),
    };
    let mut pending = Vec::with_capacity(values.len());
    for value in values {
        let values = match value {
            Value::Bulk(values) if values.len() == 4 => values,
            other => return Err(unexpected("XPENDING entry", &other)),
        };
        let mut values = values.into_iter();
        let (id, consumer, idle, count) =
            match (values.next(), values.next(), values.next(), values.next()) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => return Err(RedisErr::Reply("XPENDING entry too short".to_owned())),
            };
        pending.push(PendingEntry {
            id: parse_record_id(id)?,
            consumer: string_from_redis_value(consumer)?,
            idle: Duration::from_millis(int_from_redis_value(idle)?.max(0) as u64),
            delivery_count: int_from_redis_value(count)?.max(0) as u64,
        });
    }
    Ok(pending)
}

/// Parse the reply of `XINFO GROUPS`.
pub fn parse_groups_reply(value: Value) -> Result<Vec<GroupInfo>, RedisErr> {
    let mut groups = Vec::new();
    for map in parse_info_maps(value, "XINFO GROUPS")? {
        let mut info = GroupInfo {
            name: String::new(),
            consumers: 0,
            pending: 0,
            last_delivered_id: None,
        };
        for (field, value) in map {
            match field.as_str() {
                "name" => info.name = string_from_redis_value(value)?,
                "consumers" => info.consumers = int_from_redis_value(value)?.max(0) as u64,
                "pending" => info.pending = int_from_redis_value(value)?.max(0) as u64,
                "last-delivered-id" => info.last_delivered_id = Some(parse_record_id(value)?),
                _ => (),
            }
        }
        groups.push(info);
    }
    Ok(groups)
}

/// Parse the reply of `XINFO CONSUMERS`.
pub fn parse_consumers_reply(value: Value) -> Result<Vec<ConsumerInfo>, RedisErr> {
    let mut consumers = Vec::new();
    for map in parse_info_maps(value, "XINFO CONSUMERS")? {
        let mut info = ConsumerInfo {
            name: String::new(),
            pending: 0,
            idle: Duration::ZERO,
        };
        for (field, value) in map {
            match field.as_str() {
                "name" => info.name = string_from_redis_value(value)?,
                "pending" => info.pending = int_from_redis_value(value)?.max(0) as u64,
                "idle" => {
                    info.idle = Duration::from_millis(int_from_redis_value(value)?.max(0) as u64)
                }
                _ => (),
            }
        }
        consumers.push(info);
    }
    Ok(consumers)
}

pub fn parse_record_id(value: Value) -> Result<RecordId, RedisErr> {
    let id = string_from_redis_value(value)?;
    id.parse().map_err(|_| RedisErr::RecordId(id))
}

// bulk(bulk(string-data('"name"'), string-data('"relay"'), string-data('"pending"'), int(2), ...), ...)
fn parse_info_maps(value: Value, what: &str) -> Result<Vec<Vec<(String, Value)>>, RedisErr> {
    let values = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(values) => values,
        other => return Err(unexpected(what, &other)),
    };
    let mut maps = Vec::with_capacity(values.len());
    for value in values {
        let values = match value {
            Value::Bulk(values) if values.len() % 2 == 0 => values,
            other => return Err(unexpected(what, &other)),
        };
        let mut map = Vec::with_capacity(values.len() / 2);
        let mut values = values.into_iter();
        while let (Some(field), Some(value)) = (values.next(), values.next()) {
            map.push((string_from_redis_value(field)?, value));
        }
        maps.push(map);
    }
    Ok(maps)
}

fn pair(value: Value, what: &str) -> Result<[Value; 2], RedisErr> {
    match value {
        Value::Bulk(values) if values.len() == 2 => {
            let mut values = values.into_iter();
            match (values.next(), values.next()) {
                (Some(a), Some(b)) => Ok([a, b]),
                _ => Err(RedisErr::Reply(format!("{what}: expected a pair"))),
            }
        }
        other => Err(unexpected(what, &other)),
    }
}

fn unexpected(what: &str, value: &Value) -> RedisErr {
    RedisErr::Reply(format!("{what}: unexpected {value:?}"))
}

pub(crate) fn string_from_redis_value(v: Value) -> Result<String, RedisErr> {
    match v {
        Value::Data(bytes) => {
            String::from_utf8(bytes).map_err(|e| RedisErr::TypeError(format!("{e}")))
        }
        Value::Okay => Ok("OK".to_owned()),
        Value::Status(val) => Ok(val),
        other => Err(RedisErr::TypeError(format!("Value not String: {other:?}"))),
    }
}

fn bytes_from_redis_value(v: Value) -> Result<Vec<u8>, RedisErr> {
    match v {
        Value::Data(bytes) => Ok(bytes),
        other => Err(RedisErr::TypeError(format!("Value not Data: {other:?}"))),
    }
}

pub(crate) fn int_from_redis_value(v: Value) -> Result<i64, RedisErr> {
    match v {
        Value::Int(i) => Ok(i),
        Value::Data(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RedisErr::TypeError("Value not Int".to_owned())),
        other => Err(RedisErr::TypeError(format!("Value not Int: {other:?}"))),
    }
}
