//! Приведение значений записей к форме для отправки (байты) и к форме
//! для хранения (документ).

use bridge_api::{PluginError, RecordValue, map_to_json};

use crate::outcome::SkipReason;

/// Результат нормализации для отправки в topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Payload(Vec<u8>),
    Skip(SkipReason),
}

/// Значение записи → байты для producer'а.
///
/// - map → UTF-8 JSON (non-ASCII без экранирования, невыразимые листья → текст)
/// - text → UTF-8
/// - bytes → как есть
/// - absent → `Skip(Absent)`
/// - прочее → `Skip(Unsupported)`
pub fn normalize_for_send(value: &RecordValue) -> Normalized {
    match value {
        RecordValue::Map(map) => {
            match serde_json::to_vec(&serde_json::Value::Object(map_to_json(map))) {
                Ok(bytes) => Normalized::Payload(bytes),
                Err(e) => Normalized::Skip(SkipReason::Unencodable(e.to_string())),
            }
        }
        RecordValue::Text(s) => Normalized::Payload(s.as_bytes().to_vec()),
        RecordValue::Bytes(b) => Normalized::Payload(b.clone()),
        RecordValue::Absent => Normalized::Skip(SkipReason::Absent),
        other => Normalized::Skip(SkipReason::Unsupported { kind: other.kind_name() }),
    }
}

/// Байты записи → документ для store.
///
/// Невалидный UTF-8 — ошибка формата (запись пропускается вызывающим).
/// Валидный JSON возвращается как есть, остальной текст оборачивается
/// в `{"message": <text>}`.
pub fn normalize_for_store(bytes: &[u8]) -> Result<serde_json::Value, PluginError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(match serde_json::from_str::<serde_json::Value>(text) {
        Ok(doc) => doc,
        Err(_) => serde_json::json!({ "message": text }),
    })
}
