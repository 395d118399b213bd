//! # Question Correction
//!
//! 在线作业错题自动纠正引擎
//!
//! 给定一份已批改的作业，为错题生成新的候选答案、避免重复已知错误答案、
//! 通过平台批改结果校验，直到全部纠正或尝试次数用完；
//! 同时把新学到的答案去重后上传到共享题库。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 外部协作方（Clients / Storage）
//! - `clients/` - 题库后端、平台批改、LLM、答案填充的 trait 与 HTTP 实现
//! - `storage/` - 键值存储（内存 / JSON 文件）
//!
//! ### ② 业务能力层（Services）
//! - `AttemptCache` - 已尝试答案缓存（TTL + 写入防抖）
//! - `select_strategy` - 策略选择（直接查询 / 排除法 / AI 排除 / 翻转）
//! - `CandidateService` - 生成不重复的候选答案
//! - `GradingVerifier` - 拉取并规范化批改结果
//! - `UploadDeduper` - 上传前批量查重
//!
//! ### ③ 流程层（Workflow）
//! - `QuestionCtx` - 上下文封装（作业 + 轮次 + 题目）
//! - `QuestionFlow` - 单题流程（生成 → 填充 → 记录）
//!
//! ### ④ 编排层（Orchestration）
//! - `CorrectionOrchestrator` - 多轮纠错（填充 → 等待 → 校验 → 重试）
//!
//! ## 使用示例
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use question_correction::{Config, CorrectionOrchestrator};
//! # use question_correction::clients::AnswerApplier;
//! # async fn example(applier: Arc<dyn AnswerApplier>) -> question_correction::AppResult<()> {
//! let config = Config::from_env();
//! let orchestrator = CorrectionOrchestrator::build_from_config(&config, applier).await?;
//! let summary = orchestrator.run_correction("busywork-id", &config.correction).await?;
//! println!("{:?}: 纠正 {} 题", summary.outcome, summary.count(question_correction::Outcome::Success));
//! # Ok(())
//! # }
//! ```

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, CorrectionConfig};
pub use error::{AppError, AppResult};
pub use models::{
    normalize_answer, CorrectionSummary, Correctness, Fingerprint, Outcome, QuestionRecord,
    QuestionType,
};
pub use orchestrator::{Collaborators, CorrectionOrchestrator};
pub use services::{select_strategy, AttemptCache, Strategy};
