//! 单题纠错流程 - 流程层
//!
//! 核心职责：定义"一道错题在一轮中"的处理流程
//!
//! 流程顺序：
//! 1. 生成候选答案（策略 + 缓存过滤）
//! 2. 填充答案（外部调用）
//! 3. 填充成功后立即写入缓存，中途崩溃也不会丢失进度
//!
//! 批改校验由编排层在整批填充完成后统一进行。

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clients::AnswerApplier;
use crate::config::CorrectionConfig;
use crate::error::AppResult;
use crate::models::QuestionRecord;
use crate::services::candidate_service::{option_count, to_fingerprint};
use crate::services::{AttemptCache, Candidate, CandidateOutcome, CandidateService};
use crate::utils::retry_with_backoff;
use crate::workflow::question_ctx::QuestionCtx;

/// 生成阶段的结果
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    /// 得到一个新候选答案，等待填充
    Ready(Candidate),
    /// 所有答案都试过了
    Exhausted,
    /// 本轮跳过（原因）
    Skipped(String),
}

/// 单题纠错流程
///
/// - 不关心其他题目
/// - 不做批改校验
/// - 只依赖业务能力（services）
pub struct QuestionFlow {
    candidates: CandidateService,
    applier: Arc<dyn AnswerApplier>,
    cache: Arc<AttemptCache>,
}

impl QuestionFlow {
    pub fn new(
        candidates: CandidateService,
        applier: Arc<dyn AnswerApplier>,
        cache: Arc<AttemptCache>,
    ) -> Self {
        Self {
            candidates,
            applier,
            cache,
        }
    }

    /// 把学生当前提交的（错误）答案记入缓存，不占用尝试次数
    ///
    /// # 返回
    /// 是否新记录了一个指纹
    pub fn seed_submitted(&self, question: &QuestionRecord) -> bool {
        let Some(submitted) = question.submitted_answer.as_deref() else {
            return false;
        };
        match to_fingerprint(question, option_count(question), submitted) {
            Ok(fp) => self.cache.add_attempt(&question.id, fp),
            Err(e) => {
                warn!("[题目 {}] 已提交答案无法识别，跳过: {}", question.id, e);
                false
            }
        }
    }

    /// 生成候选答案
    ///
    /// 配额耗尽时返回 `Err`，由编排层中止整个会话
    pub async fn prepare(
        &self,
        ctx: &QuestionCtx,
        question: &QuestionRecord,
        config: &CorrectionConfig,
    ) -> AppResult<FlowResult> {
        match self.candidates.next_candidate(question, config).await? {
            CandidateOutcome::Ready(candidate) => {
                info!(
                    "{} 💡 候选答案: {}（{}）",
                    ctx, candidate.answer, candidate.strategy
                );
                Ok(FlowResult::Ready(candidate))
            }
            CandidateOutcome::Exhausted => {
                info!("{} ❌ 所有答案均已尝试", ctx);
                Ok(FlowResult::Exhausted)
            }
            CandidateOutcome::Unavailable(reason) => {
                warn!("{} ⚠️ 本轮未得到新答案: {}", ctx, reason);
                Ok(FlowResult::Skipped(reason))
            }
        }
    }

    /// 填充候选答案
    ///
    /// # 返回
    /// 是否填充成功；成功时已记入缓存
    pub async fn apply(
        &self,
        ctx: &QuestionCtx,
        candidate: &Candidate,
        config: &CorrectionConfig,
    ) -> AppResult<bool> {
        let result = retry_with_backoff(
            "填充答案",
            config.call_retries,
            Duration::from_millis(config.call_backoff_ms),
            || {
                self.applier.apply_answer(
                    &ctx.assignment_id,
                    &ctx.question_id,
                    &candidate.answer,
                    ctx.question_type,
                )
            },
        )
        .await;

        match result {
            Ok(true) => {
                self.cache
                    .add_attempt(&ctx.question_id, candidate.fingerprint.clone());
                info!("{} ✓ 已填充: {}", ctx, candidate.answer);
                Ok(true)
            }
            Ok(false) => {
                warn!("{} ⚠️ 填充失败", ctx);
                Ok(false)
            }
            Err(e) if e.is_quota_exceeded() => Err(e),
            Err(e) => {
                warn!("{} ⚠️ 填充出错: {}", ctx, e);
                Ok(false)
            }
        }
    }
}
