use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{GradingStats, QuestionType, UploadReceipt};

/// 纠错结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pending,
    Success,
    Exhausted,
    Aborted,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

/// 会话中止原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    QuotaExceeded(String),
}

/// 单题纠错会话（只存在于一次纠错过程中）
#[derive(Debug, Clone)]
pub struct CorrectionSession {
    pub question_id: String,
    pub question_type: QuestionType,
    pub attempts_this_session: u32,
    pub max_attempts: u32,
    pub outcome: Outcome,
    /// 本次会话中填充过的答案（按顺序）
    pub answers_tried: Vec<String>,
    /// 最近一次出错的原因
    pub last_error: Option<String>,
}

impl CorrectionSession {
    pub fn new(question_id: impl Into<String>, question_type: QuestionType, max_attempts: u32) -> Self {
        Self {
            question_id: question_id.into(),
            question_type,
            attempts_this_session: 0,
            max_attempts,
            outcome: Outcome::Pending,
            answers_tried: Vec::new(),
            last_error: None,
        }
    }

    pub fn budget_left(&self) -> bool {
        self.attempts_this_session < self.max_attempts
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }

    pub fn record_attempt(&mut self, answer: impl Into<String>) {
        self.attempts_this_session += 1;
        self.answers_tried.push(answer.into());
    }

    pub fn to_report(&self) -> QuestionReport {
        QuestionReport {
            question_id: self.question_id.clone(),
            question_type: self.question_type,
            outcome: self.outcome,
            attempts: self.attempts_this_session,
            answers_tried: self.answers_tried.clone(),
            final_answer: match self.outcome {
                Outcome::Success => self.answers_tried.last().cloned(),
                _ => None,
            },
            last_error: self.last_error.clone(),
        }
    }
}

/// 单题结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionReport {
    pub question_id: String,
    pub question_type: QuestionType,
    pub outcome: Outcome,
    pub attempts: u32,
    pub answers_tried: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// 一次纠错的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    pub assignment_id: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    pub rounds: u32,
    pub questions: Vec<QuestionReport>,
    /// 批改结果始终未确定的题目
    pub unknown: Vec<String>,
    pub initial_stats: GradingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_stats: Option<GradingStats>,
    /// 各次上传的结果
    pub uploads: Vec<UploadReceipt>,
    /// 上传失败的原因（不影响纠错结果）
    #[serde(default)]
    pub upload_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CorrectionSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.questions.iter().filter(|q| q.outcome == outcome).count()
    }

    pub fn report(&self, question_id: &str) -> Option<&QuestionReport> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }
}
