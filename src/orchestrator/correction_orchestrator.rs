//! 纠错编排器 - 编排层
//!
//! ## 职责
//!
//! 驱动一次完整的多轮纠错：
//!
//! 1. **初始快照**：拉取批改结果，查重后上传新知识
//! 2. **预置缓存**：把错题当前提交的答案记为已尝试
//! 3. **多轮纠错**：每轮依次生成候选 → 并发填充 → 等待 → 统一校验
//! 4. **收尾**：最终上传、写纠错日志、输出统计
//!
//! ## 终止条件
//!
//! - 所有错题都已纠正
//! - 达到最大轮数（剩余错题记为穷尽）
//! - 配额耗尽（整个会话中止，当前轮已填充的答案仍会校验）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use crate::clients::{
    AnswerApplier, AnswerBackend, AnswerGenerator, BackendClient, GradingSource, LlmClient,
    PlatformClient,
};
use crate::config::{CacheConfig, Config, CorrectionConfig};
use crate::error::{AppError, AppResult, GradingError};
use crate::models::{
    AbortReason, Correctness, CorrectionSession, CorrectionSummary, GradingStats, Outcome,
    QuestionRecord,
};
use crate::services::{
    AttemptCache, CandidateService, CorrectionJournal, GradingVerifier, JournalEntry,
    UploadDeduper,
};
use crate::storage::{JsonFileStore, KeyValueStore};
use crate::utils::logging;
use crate::workflow::{FlowResult, QuestionCtx, QuestionFlow};

/// 编排器依赖的外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn AnswerBackend>,
    pub generator: Arc<dyn AnswerGenerator>,
    pub grading: Arc<dyn GradingSource>,
    pub applier: Arc<dyn AnswerApplier>,
    pub store: Arc<dyn KeyValueStore>,
}

/// 运行标记，离开作用域时自动复位
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 纠错编排器
pub struct CorrectionOrchestrator {
    verifier: GradingVerifier,
    flow: QuestionFlow,
    deduper: UploadDeduper,
    journal: CorrectionJournal,
    cache: Arc<AttemptCache>,
    running: AtomicBool,
}

impl CorrectionOrchestrator {
    /// 用给定的协作方创建编排器，并从存储加载答案缓存
    pub async fn new(
        collaborators: Collaborators,
        cache_config: &CacheConfig,
        platform: impl Into<String>,
    ) -> AppResult<Self> {
        let cache = Arc::new(AttemptCache::load(collaborators.store.clone(), cache_config).await?);
        let candidates = CandidateService::new(
            collaborators.backend.clone(),
            collaborators.generator.clone(),
            cache.clone(),
        );

        Ok(Self {
            verifier: GradingVerifier::new(collaborators.grading),
            flow: QuestionFlow::new(candidates, collaborators.applier, cache.clone()),
            deduper: UploadDeduper::new(collaborators.backend, platform),
            journal: CorrectionJournal::new(collaborators.store),
            cache,
            running: AtomicBool::new(false),
        })
    }

    /// 按配置创建 HTTP 客户端和文件存储
    ///
    /// `llm.enabled` 时直连 LLM 生成答案，否则走后端 `/api/ai/answer`。
    /// 答案填充由调用方提供。
    pub async fn build_from_config(config: &Config, applier: Arc<dyn AnswerApplier>) -> AppResult<Self> {
        config.validate()?;

        let backend = Arc::new(BackendClient::new(&config.backend)?);
        let generator: Arc<dyn AnswerGenerator> = if config.llm.enabled {
            info!("🤖 使用 LLM 直连生成答案，模型: {}", config.llm.model_name);
            Arc::new(LlmClient::new(&config.llm))
        } else {
            backend.clone()
        };
        let store = Arc::new(JsonFileStore::open(&config.cache.storage_dir).await?);

        let collaborators = Collaborators {
            backend,
            generator,
            grading: Arc::new(PlatformClient::new(&config.platform)?),
            applier,
            store,
        };
        Self::new(collaborators, &config.cache, config.backend.platform.clone()).await
    }

    pub fn attempt_cache(&self) -> &Arc<AttemptCache> {
        &self.cache
    }

    /// 对一份作业执行自动纠错
    ///
    /// # 返回
    /// - `Ok(summary)`: 包括配额耗尽中止的情况（`outcome == Aborted`）
    /// - `Err(AlreadyRunning)`: 已有纠错在进行
    /// - `Err(Grading(SnapshotUnavailable))`: 拿不到初始批改结果
    pub async fn run_correction(
        &self,
        assignment_id: &str,
        config: &CorrectionConfig,
    ) -> AppResult<CorrectionSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("⚠️ [作业 {}] 已有纠错在进行", assignment_id);
            return Err(AppError::AlreadyRunning {
                assignment_id: assignment_id.to_string(),
            });
        }
        let _guard = RunningGuard(&self.running);

        let started_at = Utc::now();
        logging::log_session_start(assignment_id, config.max_rounds, config.max_attempts_per_question);
        self.deduper.reset_session();

        // ========== 初始快照 ==========
        let initial = self
            .verifier
            .fetch(assignment_id, config)
            .await?
            .ok_or_else(|| GradingError::SnapshotUnavailable {
                assignment_id: assignment_id.to_string(),
            })?;
        let initial_stats = GradingStats::from_snapshot(&initial);
        logging::log_grading_stats(assignment_id, "初始批改", &initial_stats);

        let mut run = SessionRun::new(initial);

        self.upload(assignment_id, &mut run, config, true).await;

        // ========== 预置缓存 ==========
        let wrong: Vec<QuestionRecord> = run.latest.iter().filter(|r| r.is_wrong()).cloned().collect();
        for record in &wrong {
            self.start_session(&mut run, record, config);
        }
        if run.sessions.is_empty() {
            info!("🎉 [作业 {}] 没有错题，无需纠错", assignment_id);
        }

        // ========== 多轮纠错 ==========
        while run.abort.is_none() && run.rounds < config.max_rounds {
            // 上一轮没能校验，先补一次，避免按过期快照覆盖已答对的题
            if run.unverified {
                self.verify(assignment_id, &mut run, config).await;
                if run.abort.is_some() {
                    break;
                }
            }
            run.exhaust_spent();
            let pending = run.correctable();
            if pending.is_empty() {
                break;
            }
            run.rounds += 1;
            if run.rounds > 1 && config.round_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.round_pause_ms)).await;
            }
            logging::log_round_start(run.rounds, config.max_rounds, pending.len());

            self.run_round(assignment_id, &mut run, &pending, config).await;
            self.write_journal(assignment_id, &run, Outcome::Pending).await;
        }

        // ========== 收尾 ==========
        if run.abort.is_none() && run.unverified {
            self.verify(assignment_id, &mut run, config).await;
        }
        if run.abort.is_none() {
            run.exhaust_spent();
            for idx in run.correctable() {
                let session = &mut run.sessions[idx];
                info!("[题目 {}] ❌ 达到最大轮数，放弃", session.question_id);
                session.outcome = Outcome::Exhausted;
            }
            // 快照有变化才需要再上传
            if run.rounds > 0 {
                self.upload(assignment_id, &mut run, config, false).await;
            }
        }

        if let Err(e) = self.cache.flush().await {
            warn!("⚠️ 答案缓存写入失败: {}", e);
        }

        let outcome = run.session_outcome();
        self.write_journal(assignment_id, &run, outcome).await;

        let summary = CorrectionSummary {
            assignment_id: assignment_id.to_string(),
            outcome,
            abort_reason: run.abort.clone(),
            rounds: run.rounds,
            questions: run.sessions.iter().map(CorrectionSession::to_report).collect(),
            unknown: run.unknown_ids(),
            initial_stats,
            final_stats: Some(GradingStats::from_snapshot(&run.latest)),
            uploads: run.uploads,
            upload_errors: run.upload_errors,
            started_at,
            finished_at: Utc::now(),
        };
        logging::log_summary(&summary);
        Ok(summary)
    }

    /// 为一道错题创建会话，并把当前提交的答案记为已尝试
    fn start_session(&self, run: &mut SessionRun, record: &QuestionRecord, config: &CorrectionConfig) {
        if self.flow.seed_submitted(record) {
            info!(
                "[题目 {}] 已记录当前错误答案: {}",
                record.id,
                record.submitted_answer.as_deref().unwrap_or_default()
            );
        }
        run.index.insert(record.id.clone(), run.sessions.len());
        run.sessions.push(CorrectionSession::new(
            record.id.clone(),
            record.question_type,
            config.max_attempts_per_question,
        ));
    }

    /// 一轮：依次生成 → 并发填充 → 等待 → 校验
    async fn run_round(
        &self,
        assignment_id: &str,
        run: &mut SessionRun,
        pending: &[usize],
        config: &CorrectionConfig,
    ) {
        // 同一题每轮只生成一个候选；配额耗尽后不再生成
        let mut prepared = Vec::new();
        for &idx in pending {
            if run.abort.is_some() {
                break;
            }
            let session = &mut run.sessions[idx];
            let Some(record) = run.latest.iter().find(|r| r.id == session.question_id) else {
                continue;
            };
            let ctx = QuestionCtx::new(assignment_id, run.rounds, &record.id, record.question_type);

            match self.flow.prepare(&ctx, record, config).await {
                Ok(FlowResult::Ready(candidate)) => prepared.push((idx, ctx, candidate)),
                Ok(FlowResult::Exhausted) => session.outcome = Outcome::Exhausted,
                Ok(FlowResult::Skipped(reason)) => session.last_error = Some(reason),
                Err(e) => {
                    session.last_error = Some(e.to_string());
                    if e.is_quota_exceeded() {
                        warn!("⛔ [作业 {}] 配额耗尽，停止纠错: {}", assignment_id, e);
                        run.abort = Some(AbortReason::QuotaExceeded(e.to_string()));
                    }
                }
            }
        }

        if prepared.is_empty() {
            return;
        }

        // 不同题目的填充并发进行，全部完成后再校验
        let results = join_all(
            prepared
                .iter()
                .map(|(_, ctx, candidate)| self.flow.apply(ctx, candidate, config)),
        )
        .await;

        let mut applied = Vec::new();
        let mut settle = Duration::ZERO;
        for ((idx, ctx, candidate), result) in prepared.into_iter().zip(results) {
            let session = &mut run.sessions[idx];
            match result {
                Ok(true) => {
                    session.record_attempt(candidate.answer);
                    settle = settle.max(config.settle_delay(ctx.question_type));
                    applied.push(idx);
                }
                Ok(false) => session.last_error = Some("填充失败".to_string()),
                Err(e) => {
                    session.last_error = Some(e.to_string());
                    if e.is_quota_exceeded() && run.abort.is_none() {
                        run.abort = Some(AbortReason::QuotaExceeded(e.to_string()));
                    }
                }
            }
        }

        if applied.is_empty() {
            return;
        }

        info!("⏳ 等待 {} ms 后校验批改结果", settle.as_millis());
        tokio::time::sleep(settle).await;

        self.verify(assignment_id, run, config).await;
    }

    /// 拉取批改结果并更新各题状态
    ///
    /// 拿不到快照时标记为未校验，已填充的题目保持 PENDING
    async fn verify(&self, assignment_id: &str, run: &mut SessionRun, config: &CorrectionConfig) {
        match self.verifier.fetch(assignment_id, config).await {
            Ok(Some(records)) => {
                run.latest = records;
                run.unverified = false;
                self.apply_verification(run, config);
                logging::log_grading_stats(
                    assignment_id,
                    &format!("第 {} 轮校验", run.rounds),
                    &GradingStats::from_snapshot(&run.latest),
                );
            }
            Ok(None) => {
                warn!("⚠️ [作业 {}] 本轮无法校验，已填充的题目留待下一轮", assignment_id);
                run.unverified = true;
            }
            Err(e) => {
                warn!("⛔ [作业 {}] 校验时配额耗尽: {}", assignment_id, e);
                if run.abort.is_none() {
                    run.abort = Some(AbortReason::QuotaExceeded(e.to_string()));
                }
            }
        }
    }

    /// 根据新快照更新已填充过答案的题目状态
    ///
    /// 包括之前某轮没能校验、留到现在的题目
    fn apply_verification(&self, run: &mut SessionRun, config: &CorrectionConfig) {
        let correctness: HashMap<String, Correctness> = run
            .latest
            .iter()
            .map(|r| (r.id.clone(), r.correctness))
            .collect();

        for session in run
            .sessions
            .iter_mut()
            .filter(|s| s.is_pending() && s.attempts_this_session > 0)
        {
            match correctness.get(&session.question_id) {
                Some(Correctness::Correct) => {
                    info!("[题目 {}] ✅ 纠正成功", session.question_id);
                    session.outcome = Outcome::Success;
                    self.cache.clear(&session.question_id);
                }
                Some(Correctness::Wrong) if !session.budget_left() => {
                    info!("[题目 {}] ❌ 尝试次数已用完", session.question_id);
                    session.outcome = Outcome::Exhausted;
                }
                Some(Correctness::Wrong) => {}
                Some(Correctness::Unknown) | None => {
                    info!("[题目 {}] ❓ 批改结果未确定，暂不处理", session.question_id);
                }
            }
        }

        // 之前未批改、现在判错的题目加入纠错
        let newly_wrong: Vec<QuestionRecord> = run
            .latest
            .iter()
            .filter(|r| r.is_wrong() && !run.index.contains_key(&r.id))
            .cloned()
            .collect();
        for record in &newly_wrong {
            info!("[题目 {}] 批改完成且判错，加入纠错", record.id);
            self.start_session(run, record, config);
        }
    }

    /// 查重上传当前快照，失败只记录不中断
    ///
    /// `abort_on_quota` 为真时配额耗尽会中止会话（纠错开始前的上传）
    async fn upload(
        &self,
        assignment_id: &str,
        run: &mut SessionRun,
        config: &CorrectionConfig,
        abort_on_quota: bool,
    ) {
        match self
            .deduper
            .dedup_and_upload(assignment_id, &run.latest, config)
            .await
        {
            Ok(receipt) => run.uploads.push(receipt),
            Err(e) => {
                warn!("⚠️ [作业 {}] 上传题库失败: {}", assignment_id, e);
                if abort_on_quota && e.is_quota_exceeded() && run.abort.is_none() {
                    run.abort = Some(AbortReason::QuotaExceeded(e.to_string()));
                }
                run.upload_errors.push(e.to_string());
            }
        }
    }

    async fn write_journal(&self, assignment_id: &str, run: &SessionRun, outcome: Outcome) {
        let entry = JournalEntry {
            assignment_id: assignment_id.to_string(),
            round: run.rounds,
            outcome,
            questions: run.sessions.iter().map(CorrectionSession::to_report).collect(),
            updated_at: Utc::now(),
        };
        self.journal.record(&entry).await;
    }
}

/// 一次纠错过程中的可变状态
struct SessionRun {
    latest: Vec<QuestionRecord>,
    sessions: Vec<CorrectionSession>,
    /// 题目 ID → sessions 下标
    index: HashMap<String, usize>,
    rounds: u32,
    abort: Option<AbortReason>,
    /// 最近一次填充后没能拿到批改结果
    unverified: bool,
    uploads: Vec<crate::models::UploadReceipt>,
    upload_errors: Vec<String>,
}

impl SessionRun {
    fn new(initial: Vec<QuestionRecord>) -> Self {
        Self {
            latest: initial,
            sessions: Vec::new(),
            index: HashMap::new(),
            rounds: 0,
            abort: None,
            unverified: false,
            uploads: Vec::new(),
            upload_errors: Vec::new(),
        }
    }

    fn correctness_of(&self, question_id: &str) -> Correctness {
        self.latest
            .iter()
            .find(|r| r.id == question_id)
            .map(|r| r.correctness)
            .unwrap_or_default()
    }

    /// 仍在进行、还有尝试次数且当前判错的题目（UNKNOWN 的题目不纠错）
    fn correctable(&self) -> Vec<usize> {
        self.sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.is_pending()
                    && s.budget_left()
                    && self.correctness_of(&s.question_id) == Correctness::Wrong
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// 尝试次数已用完但还没拿到校验结果的题目记为穷尽
    fn exhaust_spent(&mut self) {
        for session in self
            .sessions
            .iter_mut()
            .filter(|s| s.is_pending() && !s.budget_left())
        {
            info!("[题目 {}] ❌ 尝试次数已用完，放弃", session.question_id);
            session.outcome = Outcome::Exhausted;
        }
    }

    fn unknown_ids(&self) -> Vec<String> {
        self.latest
            .iter()
            .filter(|r| r.correctness == Correctness::Unknown)
            .map(|r| r.id.clone())
            .collect()
    }

    fn session_outcome(&self) -> Outcome {
        if self.abort.is_some() {
            Outcome::Aborted
        } else if self.sessions.iter().all(|s| s.outcome == Outcome::Success) {
            Outcome::Success
        } else {
            Outcome::Exhausted
        }
    }
}
