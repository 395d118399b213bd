//! 批改结果校验 - 业务能力层
//!
//! 拉取平台批改数据并规范化为 `QuestionRecord` 列表。
//! 某些题目批改尚未完成（缺少 `correct` 字段）时会重试，
//! 重试用尽后这些题目保持 UNKNOWN，绝不当作错题处理。

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::clients::GradingSource;
use crate::config::CorrectionConfig;
use crate::error::{AppResult, GradingError};
use crate::models::{Correctness, QuestionRecord, QuestionType};
use crate::utils::retry_with_backoff;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

pub struct GradingVerifier {
    source: Arc<dyn GradingSource>,
}

impl GradingVerifier {
    pub fn new(source: Arc<dyn GradingSource>) -> Self {
        Self { source }
    }

    /// 获取一份批改快照
    ///
    /// # 返回
    /// - `Ok(Some(records))`: 拿到快照（可能仍有 UNKNOWN 题目）
    /// - `Ok(None)`: 重试后仍拿不到任何可用数据
    /// - `Err(_)`: 仅在配额耗尽时返回
    pub async fn fetch(
        &self,
        assignment_id: &str,
        config: &CorrectionConfig,
    ) -> AppResult<Option<Vec<QuestionRecord>>> {
        let retries = config.verify_retries.max(1);
        let backoff = Duration::from_millis(config.verify_backoff_ms);
        let mut latest: Option<Vec<QuestionRecord>> = None;

        for attempt in 1..=retries {
            let fetched = retry_with_backoff(
                "拉取批改结果",
                config.call_retries,
                Duration::from_millis(config.call_backoff_ms),
                || self.source.fetch_grading_snapshot(assignment_id),
            )
            .await;

            match fetched.and_then(|payload| parse_snapshot(&payload)) {
                Ok(records) => {
                    let unsettled = records
                        .iter()
                        .filter(|r| r.correctness == Correctness::Unknown)
                        .count();
                    latest = Some(records);
                    if unsettled == 0 {
                        return Ok(latest);
                    }
                    info!(
                        "⏳ [作业 {}] {} 道题尚未批改完成（第 {}/{} 次）",
                        assignment_id, unsettled, attempt, retries
                    );
                }
                Err(e) if e.is_quota_exceeded() => return Err(e),
                Err(e) => {
                    warn!(
                        "⚠️ [作业 {}] 获取批改结果失败（第 {}/{} 次）: {}",
                        assignment_id, attempt, retries, e
                    );
                }
            }

            if attempt < retries {
                tokio::time::sleep(backoff * attempt).await;
            }
        }

        if latest.is_none() {
            warn!("❌ [作业 {}] 多次重试后仍无法获取批改结果", assignment_id);
        }
        Ok(latest)
    }
}

/// 把平台的原始批改数据规范化为题目列表
///
/// 数据按题型分组：`{"danxuan": {"lists": [...]}, "duoxuan": ..., ...}`，
/// 缺少 ID 的题目会被丢弃。
pub fn parse_snapshot(payload: &JsonValue) -> AppResult<Vec<QuestionRecord>> {
    if !payload.is_object() {
        return Err(GradingError::MalformedPayload("批改数据不是对象".to_string()).into());
    }

    let mut records = Vec::new();
    for question_type in QuestionType::ALL {
        let key = question_type.section_key();
        let Some(items) = payload
            .get(key)
            .and_then(|section| section.get("lists"))
            .and_then(JsonValue::as_array)
        else {
            debug!("{} 题型不存在或没有lists", key);
            continue;
        };

        for item in items {
            match parse_item(item, question_type) {
                Some(record) => records.push(record),
                None => warn!("⚠️ 跳过缺少 ID 的{}", question_type),
            }
        }
    }
    Ok(records)
}

fn parse_item(item: &JsonValue, question_type: QuestionType) -> Option<QuestionRecord> {
    let id = match item.get("id")? {
        JsonValue::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };

    let content = ["questionContentText", "questionContent"]
        .iter()
        .filter_map(|k| item.get(*k).and_then(JsonValue::as_str))
        .find(|s| !s.trim().is_empty())
        .map(strip_html)
        .unwrap_or_default();

    let options = if question_type.has_options() {
        parse_options(item, &id)
    } else {
        Vec::new()
    };

    let correctness = Correctness::from_flag(item.get("correct").and_then(JsonValue::as_bool));

    let mut record = QuestionRecord::new(id, question_type, content, options, correctness);
    if let Some(answer) = item
        .get("stuAnswer")
        .and_then(JsonValue::as_str)
        .filter(|a| !a.trim().is_empty())
    {
        record = record.with_submitted(answer.trim());
    }
    Some(record)
}

fn option_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(strip_html(s)),
        JsonValue::Object(_) => value
            .get("text")
            .or_else(|| value.get("content"))
            .and_then(JsonValue::as_str)
            .map(strip_html),
        _ => None,
    }
}

fn parse_options(item: &JsonValue, id: &str) -> Vec<String> {
    if let Some(raw) = item.get("options").and_then(JsonValue::as_str) {
        match serde_json::from_str::<Vec<JsonValue>>(raw) {
            Ok(values) => return values.iter().filter_map(option_text).collect(),
            Err(e) => warn!("[题目 {}] 解析选项失败: {}", id, e),
        }
    }
    item.get("questionOptionList")
        .and_then(JsonValue::as_array)
        .map(|list| list.iter().filter_map(option_text).collect())
        .unwrap_or_default()
}

/// 去掉 HTML 标签和常见实体
pub fn strip_html(html: &str) -> String {
    HTML_TAG
        .replace_all(html, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
