//! 题库后端的请求/响应结构

use serde::{Deserialize, Serialize};

use crate::models::{Correctness, QuestionRecord, QuestionType};

/// 按题目 ID/内容搜索答案的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub found: bool,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// AI 生成答案的请求
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub question_content: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    /// 已确认错误的答案，作为反例
    pub attempted_answers: Vec<String>,
}

impl GenerationRequest {
    pub fn for_question(question: &QuestionRecord, excluded: Vec<String>) -> Self {
        Self {
            question_content: question.content.clone(),
            question_type: question.question_type,
            options: question.options.clone(),
            attempted_answers: excluded,
        }
    }
}

/// AI 生成的答案
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
}

/// 后端是否已有该题的有效答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceStatus {
    pub question_id: String,
    pub has_valid_answer: bool,
}

/// 上传原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    /// 后端还没有有效答案
    New,
    /// 后端的答案已被证明错误，需要重新学习
    Recorrection,
}

/// 上传条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub question_id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question_content: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub correctness: Correctness,
    pub reason: UploadReason,
}

impl UploadItem {
    pub fn from_record(record: &QuestionRecord, reason: UploadReason) -> Self {
        Self {
            question_id: record.id.clone(),
            question_type: record.question_type,
            question_content: record.content.clone(),
            options: record.options.clone(),
            answer: record.submitted_answer.clone(),
            correctness: record.correctness,
            reason,
        }
    }
}

/// 上传请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub assignment_id: String,
    pub platform: String,
    pub source: String,
    pub items: Vec<UploadItem>,
}

/// 上传结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    #[serde(default)]
    pub new_count: usize,
    #[serde(default)]
    pub updated_count: usize,
    #[serde(default)]
    pub new_question_ids: Vec<String>,
    /// 因后端已有正确答案而跳过的数量（本地统计）
    #[serde(default)]
    pub skipped_count: usize,
}
