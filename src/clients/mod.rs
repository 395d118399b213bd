//! 外部协作方
//!
//! 纠错引擎只通过下面几个 trait 与外部交互：
//! - `AnswerBackend`: 共享题库（搜索、批量查重、上传）
//! - `AnswerGenerator`: AI 生成答案（后端代理或直连 LLM）
//! - `GradingSource`: 拉取平台批改结果的原始数据
//! - `AnswerApplier`: 把答案填回页面（由上层 UI 实现）

pub mod backend_client;
pub mod llm_client;
pub mod platform_client;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::models::{
    ExistenceStatus, GeneratedAnswer, GenerationRequest, QuestionRecord, QuestionType,
    SearchResult, UploadPayload, UploadReceipt,
};

pub use backend_client::BackendClient;
pub use llm_client::LlmClient;
pub use platform_client::PlatformClient;

/// 共享题库
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// 按题目 ID / 内容搜索已知答案
    async fn search(&self, question: &QuestionRecord) -> AppResult<SearchResult>;

    /// 批量查询后端是否已有有效答案
    async fn batch_existence_check(
        &self,
        questions: &[QuestionRecord],
    ) -> AppResult<Vec<ExistenceStatus>>;

    /// 上传批改结果
    async fn upload(&self, payload: &UploadPayload) -> AppResult<UploadReceipt>;
}

/// AI 答案生成
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedAnswer>;
}

/// 批改结果来源
#[async_trait]
pub trait GradingSource: Send + Sync {
    /// 返回平台原始的批改数据（按题型分组的 JSON）
    async fn fetch_grading_snapshot(&self, assignment_id: &str) -> AppResult<JsonValue>;
}

/// 答案回填
#[async_trait]
pub trait AnswerApplier: Send + Sync {
    /// 返回 `false` 表示页面上没能填入（找不到题目、控件不可用等）
    async fn apply_answer(
        &self,
        assignment_id: &str,
        question_id: &str,
        answer: &str,
        question_type: QuestionType,
    ) -> AppResult<bool>;
}
