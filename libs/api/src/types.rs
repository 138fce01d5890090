use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Structured values
// ════════════════════════════════════════════════════════════════

/// Структурированное значение записи: строковые ключи → поля.
pub type StructuredMap = BTreeMap<String, Field>;

/// Поле структурированной записи.
///
/// Помимо обычных JSON-значений допускает листья, которые JSON не
/// выражает напрямую (non-finite float, сырые байты). При кодировании
/// такие листья приводятся к текстовой форме.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Json(serde_json::Value),
    Map(StructuredMap),
    List(Vec<Field>),
    /// Float как есть. NaN / ±inf → текст ("NaN", "inf", "-inf").
    Float(f64),
    /// Сырые байты → текст (lossy UTF-8).
    Bytes(Vec<u8>),
}

impl Field {
    /// Привести поле к JSON, заменяя невыразимые листья их текстом.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Field::Json(v) => v.clone(),
            Field::Map(map) => serde_json::Value::Object(map_to_json(map)),
            Field::List(items) => {
                serde_json::Value::Array(items.iter().map(Field::to_json).collect())
            }
            Field::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            Field::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl From<serde_json::Value> for Field {
    fn from(v: serde_json::Value) -> Self {
        Field::Json(v)
    }
}

/// StructuredMap → JSON object (с приведением листьев).
pub fn map_to_json(map: &StructuredMap) -> serde_json::Map<String, serde_json::Value> {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// Значение записи в том виде, в каком его отдал queue client.
///
/// Kafka-клиент всегда отдаёт `Bytes` (или `Absent` для tombstone);
/// клиенты с десериализатором могут отдавать `Map` / `Text` / `Other`.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordValue {
    Map(StructuredMap),
    Text(String),
    Bytes(Vec<u8>),
    /// Запись без значения (tombstone).
    Absent,
    /// Структура, не являющаяся map (массив, число, bool) — не поддерживается.
    Other(serde_json::Value),
}

impl RecordValue {
    /// Имя варианта для логов.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RecordValue::Map(_) => "map",
            RecordValue::Text(_) => "text",
            RecordValue::Bytes(_) => "bytes",
            RecordValue::Absent => "absent",
            RecordValue::Other(v) => match v {
                serde_json::Value::Null => "null",
                serde_json::Value::Bool(_) => "bool",
                serde_json::Value::Number(_) => "number",
                serde_json::Value::String(_) => "string",
                serde_json::Value::Array(_) => "array",
                serde_json::Value::Object(_) => "object",
            },
        }
    }

    /// Сырые байты значения: только для `Bytes` и `Text`.
    pub fn raw_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            RecordValue::Bytes(b) => Some(Cow::Borrowed(b.as_slice())),
            RecordValue::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
            _ => None,
        }
    }
}

/// Одна запись, прочитанная из topic'а.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Timestamp в миллисекундах (Unix epoch), если клиент его знает.
    pub ts_ms: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub value: RecordValue,
}

impl Record {
    /// Запись без метаданных партиции — удобно для тестов и memory broker'а.
    pub fn new(topic: impl Into<String>, value: RecordValue) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            ts_ms: None,
            key: None,
            value,
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

// ════════════════════════════════════════════════════════════════
//  Store / cluster metadata
// ════════════════════════════════════════════════════════════════

/// Идентификатор вставленного документа (строковое представление).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ответ metadata-запроса к кластеру.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    pub brokers: usize,
    pub topics: Vec<String>,
}
