//! 批量上传去重 - 业务能力层
//!
//! 上传前先批量询问题库哪些题已经有有效答案：
//! - 题库已有答案 + 本地正确 + 非判断题 → 跳过
//! - 题库没有有效答案 → 作为新题上传
//! - 题库有答案但本地判错 → 上传用于重新学习
//!
//! 同一会话中同一道题、同一答案、同一批改结果只上传一次；
//! 纠正后答案变化的题目会在最终上传时再次提交。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::clients::AnswerBackend;
use crate::config::CorrectionConfig;
use crate::error::AppResult;
use crate::models::{
    Correctness, QuestionRecord, QuestionType, UploadItem, UploadPayload, UploadReason,
    UploadReceipt,
};
use crate::utils::retry_with_backoff;

/// 上传来源标识
pub const UPLOAD_SOURCE: &str = "auto_correction";

/// 去重划分结果（只保存题目 ID）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadPlan {
    pub skip: Vec<String>,
    pub upload_new: Vec<String>,
    pub upload_for_recorrection: Vec<String>,
}

impl UploadPlan {
    pub fn upload_count(&self) -> usize {
        self.upload_new.len() + self.upload_for_recorrection.len()
    }
}

/// 根据题库查重结果划分题目
///
/// `existing` 中没有出现的题目视为题库中没有有效答案。
/// 题库有答案、本地尚未批改的题目没有新知识，归入跳过。
pub fn partition(records: &[QuestionRecord], existing: &HashMap<String, bool>) -> UploadPlan {
    let mut plan = UploadPlan::default();
    for record in records {
        let has_valid_answer = existing.get(&record.id).copied().unwrap_or(false);
        let id = record.id.clone();
        match (has_valid_answer, record.correctness) {
            (false, _) => plan.upload_new.push(id),
            (true, Correctness::Wrong) => plan.upload_for_recorrection.push(id),
            (true, Correctness::Correct) if record.question_type == QuestionType::Boolean => {
                plan.upload_new.push(id)
            }
            (true, _) => plan.skip.push(id),
        }
    }
    plan
}

/// 会话内上传记录的键：题目 + 批改结果 + 答案
fn memo_key(record: &QuestionRecord) -> String {
    format!(
        "{}|{:?}|{}",
        record.id,
        record.correctness,
        record.submitted_answer.as_deref().unwrap_or_default().trim()
    )
}

pub struct UploadDeduper {
    backend: Arc<dyn AnswerBackend>,
    platform: String,
    /// 本会话已上传的（题目, 批改结果, 答案）
    uploaded: Mutex<HashSet<String>>,
}

impl UploadDeduper {
    pub fn new(backend: Arc<dyn AnswerBackend>, platform: impl Into<String>) -> Self {
        Self {
            backend,
            platform: platform.into(),
            uploaded: Mutex::new(HashSet::new()),
        }
    }

    /// 清空会话内的上传记录（新会话开始时调用）
    pub fn reset_session(&self) {
        self.uploaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// 批量查重并给出划分
    pub async fn plan(
        &self,
        records: &[QuestionRecord],
        config: &CorrectionConfig,
    ) -> AppResult<UploadPlan> {
        let statuses = retry_with_backoff(
            "批量查重",
            config.call_retries,
            Duration::from_millis(config.call_backoff_ms),
            || self.backend.batch_existence_check(records),
        )
        .await?;

        let existing: HashMap<String, bool> = statuses
            .into_iter()
            .map(|s| (s.question_id, s.has_valid_answer))
            .collect();
        Ok(partition(records, &existing))
    }

    /// 查重后上传新知识
    ///
    /// # 返回
    /// 上传结果；没有需要上传的题目时不发请求，`skipped_count` 仍会填写
    pub async fn dedup_and_upload(
        &self,
        assignment_id: &str,
        records: &[QuestionRecord],
        config: &CorrectionConfig,
    ) -> AppResult<UploadReceipt> {
        let pending: Vec<QuestionRecord> = {
            let uploaded = self.uploaded.lock().unwrap_or_else(|p| p.into_inner());
            records
                .iter()
                .filter(|r| !uploaded.contains(&memo_key(r)))
                .cloned()
                .collect()
        };
        let already = records.len() - pending.len();

        if pending.is_empty() {
            debug!("[作业 {}] 所有题目本会话已上传过", assignment_id);
            return Ok(UploadReceipt {
                skipped_count: already,
                ..Default::default()
            });
        }

        let plan = self.plan(&pending, config).await?;
        info!(
            "📤 [作业 {}] 查重结果: 跳过 {}，新题 {}，重新学习 {}",
            assignment_id,
            plan.skip.len(),
            plan.upload_new.len(),
            plan.upload_for_recorrection.len()
        );

        let skipped_count = plan.skip.len() + already;
        if plan.upload_count() == 0 {
            return Ok(UploadReceipt {
                skipped_count,
                ..Default::default()
            });
        }

        let reasons: HashMap<&str, UploadReason> = plan
            .upload_new
            .iter()
            .map(|id| (id.as_str(), UploadReason::New))
            .chain(
                plan.upload_for_recorrection
                    .iter()
                    .map(|id| (id.as_str(), UploadReason::Recorrection)),
            )
            .collect();

        let items: Vec<UploadItem> = pending
            .iter()
            .filter_map(|r| {
                reasons
                    .get(r.id.as_str())
                    .map(|reason| UploadItem::from_record(r, *reason))
            })
            .collect();

        let payload = UploadPayload {
            assignment_id: assignment_id.to_string(),
            platform: self.platform.clone(),
            source: UPLOAD_SOURCE.to_string(),
            items,
        };

        let mut receipt = retry_with_backoff(
            "上传题库",
            config.call_retries,
            Duration::from_millis(config.call_backoff_ms),
            || self.backend.upload(&payload),
        )
        .await?;
        receipt.skipped_count = skipped_count;

        {
            let mut uploaded = self.uploaded.lock().unwrap_or_else(|p| p.into_inner());
            uploaded.extend(
                pending
                    .iter()
                    .filter(|r| reasons.contains_key(r.id.as_str()))
                    .map(memo_key),
            );
        }

        info!(
            "✅ [作业 {}] 上传完成: 新增 {}，更新 {}",
            assignment_id, receipt.new_count, receipt.updated_count
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, question_type: QuestionType, correctness: Correctness) -> QuestionRecord {
        QuestionRecord::new(id, question_type, "题目", vec![], correctness)
    }

    #[test]
    fn test_partition() {
        let records = vec![
            record("known_correct", QuestionType::Single, Correctness::Correct),
            record("known_wrong", QuestionType::Single, Correctness::Wrong),
            record("unknown_to_backend", QuestionType::Multi, Correctness::Correct),
            record("ungraded_new", QuestionType::Essay, Correctness::Unknown),
            record("boolean_known", QuestionType::Boolean, Correctness::Correct),
            record("ungraded_known", QuestionType::Blank, Correctness::Unknown),
        ];
        let existing: HashMap<String, bool> = [
            ("known_correct", true),
            ("known_wrong", true),
            ("unknown_to_backend", false),
            ("boolean_known", true),
            ("ungraded_known", true),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let plan = partition(&records, &existing);
        assert_eq!(plan.skip, vec!["known_correct", "ungraded_known"]);
        assert_eq!(
            plan.upload_new,
            vec!["unknown_to_backend", "ungraded_new", "boolean_known"]
        );
        assert_eq!(plan.upload_for_recorrection, vec!["known_wrong"]);
        assert_eq!(plan.upload_count(), 4);
    }
}
