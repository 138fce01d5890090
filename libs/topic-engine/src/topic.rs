use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use bridge_api::{PluginError, Record, RecordValue, now_ms};

/// С какой позиции начинает новая consumer group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffsetReset {
    #[default]
    Earliest,
    Latest,
}

struct StoredRecord {
    ts_ms: i64,
    key: Option<Vec<u8>>,
    value: RecordValue,
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

/// Именованный append-only лог с одной партицией.
///
/// Позиции чтения хранятся per consumer group: consumer'ы одной группы
/// делят записи между собой, разные группы читают лог независимо.
pub struct Topic {
    pub name: String,
    records: Mutex<Vec<StoredRecord>>,
    cursors: Mutex<HashMap<String, usize>>,
    failures: Mutex<VecDeque<PluginError>>,
    len_tx: watch::Sender<usize>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Topic {
    pub fn new(name: String) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            name,
            records: Mutex::new(Vec::new()),
            cursors: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            len_tx,
        }
    }

    /// Дописать запись, вернуть её offset.
    pub fn append(&self, key: Option<Vec<u8>>, value: RecordValue) -> i64 {
        let len = {
            let mut records = locked(&self.records);
            records.push(StoredRecord { ts_ms: now_ms(), key, value });
            records.len()
        };
        self.len_tx.send_replace(len);
        (len - 1) as i64
    }

    pub fn len(&self) -> usize {
        locked(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Снимок всех записей (для диагностики и тестов).
    pub fn snapshot(&self) -> Vec<Record> {
        locked(&self.records)
            .iter()
            .enumerate()
            .map(|(i, r)| self.to_record(i, r))
            .collect()
    }

    /// Подписка на изменение длины лога.
    pub fn watch_len(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }

    /// Зарегистрировать группу (если новая) и вернуть её текущую позицию.
    pub fn join_group(&self, group: &str, reset: OffsetReset) -> usize {
        let len = self.len();
        let mut cursors = locked(&self.cursors);
        *cursors.entry(group.to_string()).or_insert(match reset {
            OffsetReset::Earliest => 0,
            OffsetReset::Latest => len,
        })
    }

    /// Позиция группы (0, если группа ещё не читала).
    pub fn position(&self, group: &str) -> usize {
        locked(&self.cursors).get(group).copied().unwrap_or(0)
    }

    /// Забрать следующую запись для группы и сдвинуть её позицию (auto-commit).
    pub fn next_for(&self, group: &str) -> Option<Record> {
        let records = locked(&self.records);
        let mut cursors = locked(&self.cursors);
        let pos = cursors.entry(group.to_string()).or_insert(0);
        let stored = records.get(*pos)?;
        let record = self.to_record(*pos, stored);
        *pos += 1;
        Some(record)
    }

    /// Следующий poll любого consumer'а этого topic'а вернёт `err`.
    pub fn inject_failure(&self, err: PluginError) {
        locked(&self.failures).push_back(err);
    }

    pub fn take_failure(&self) -> Option<PluginError> {
        locked(&self.failures).pop_front()
    }

    fn to_record(&self, offset: usize, stored: &StoredRecord) -> Record {
        Record {
            topic: self.name.clone(),
            partition: 0,
            offset: offset as i64,
            ts_ms: Some(stored.ts_ms),
            key: stored.key.clone(),
            value: stored.value.clone(),
        }
    }
}
