//! 快照报文解码。
//!
//! 报文为 JSON：记录数组，或以记录 ID 为键的对象（按键排序，与实时库子节点顺序一致）。
//! 单条记录宽松解码：字段类型不对时视为缺失，由解析器拒绝该条记录而不是整批。

use crate::IngestError;
use domain::RawRecord;
use serde_json::Value;

/// 解码整批快照。`null` 视为空快照。
pub fn decode_snapshot(payload: &[u8]) -> Result<Vec<RawRecord>, IngestError> {
    let root: Value =
        serde_json::from_slice(payload).map_err(|err| IngestError::Decode(err.to_string()))?;
    decode_snapshot_value(root)
}

/// 解码已解析的 JSON 快照。
pub fn decode_snapshot_value(root: Value) -> Result<Vec<RawRecord>, IngestError> {
    match root {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.iter().map(decode_record).collect()),
        Value::Object(children) => {
            let mut children: Vec<(String, Value)> = children.into_iter().collect();
            children.sort_by(|(left, _), (right, _)| left.cmp(right));
            Ok(children
                .iter()
                .map(|(_, child)| decode_record(child))
                .collect())
        }
        other => Err(IngestError::Decode(format!(
            "snapshot must be an array or object, got {}",
            type_name(&other)
        ))),
    }
}

/// 解码单条记录（`{ "value": number, "time": string }`）。
pub fn decode_record(item: &Value) -> RawRecord {
    RawRecord {
        value: item.get("value").and_then(Value::as_f64),
        time: item
            .get("time")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
