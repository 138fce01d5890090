// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FileStoreConfig {
    /// Корень: коллекция `db.name` хранится в `{data_dir}/{db}/{name}.jsonl`.
    pub data_dir: String,
}

// ════════════════════════════════════════════════════════════════
//  On-disk document format
// ════════════════════════════════════════════════════════════════

/// Одна строка JSONL файла коллекции.
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct DiskDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub ts_ms: i64,
    pub document: serde_json::Value,
}
