//! 纠错日志 - 每轮结束后把各题进度写入键值存储，仅用于审计
//!
//! 会话不会从日志恢复。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppResult;
use crate::models::{Outcome, QuestionReport};
use crate::storage::KeyValueStore;

/// 日志记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub assignment_id: String,
    pub round: u32,
    pub outcome: Outcome,
    pub questions: Vec<QuestionReport>,
    pub updated_at: DateTime<Utc>,
}

pub fn journal_key(assignment_id: &str) -> String {
    format!("correction_journal:{}", assignment_id)
}

pub struct CorrectionJournal {
    store: Arc<dyn KeyValueStore>,
}

impl CorrectionJournal {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 写入日志，失败只记警告
    pub async fn record(&self, entry: &JournalEntry) {
        let key = journal_key(&entry.assignment_id);
        let result = match serde_json::to_value(entry) {
            Ok(value) => self.store.set(&key, value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("⚠️ [作业 {}] 写入纠错日志失败: {}", entry.assignment_id, e);
        }
    }

    pub async fn load(&self, assignment_id: &str) -> AppResult<Option<JournalEntry>> {
        match self.store.get(&journal_key(assignment_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
