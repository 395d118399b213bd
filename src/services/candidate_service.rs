//! 候选答案生成 - 业务能力层
//!
//! 根据策略为一道错题生成一个**没有试过**的候选答案：
//! - 翻转 / 排除法：本地直接算出，不调用任何服务
//! - 直接查询：先查题库，查不到或答案已试过再交给 AI
//! - AI 排除：把已错答案作为反例交给 AI 重新生成
//!
//! 生成结果无法识别或与已试答案重复时直接丢弃，不占用尝试次数，
//! 但每轮每题最多调用生成 `max_attempts_per_question` 次。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clients::{AnswerBackend, AnswerGenerator};
use crate::config::CorrectionConfig;
use crate::error::{AnswerFormatError, AppResult};
use crate::models::{
    match_option_text, normalize_answer, Fingerprint, GenerationRequest, QuestionRecord,
    QuestionType,
};
use crate::services::attempt_cache::AttemptCache;
use crate::services::strategy::{select_strategy, Strategy};
use crate::utils::{retry_with_backoff, truncate_text};

/// 选择题缺少选项文本时假定的选项数
pub const DEFAULT_OPTION_COUNT: usize = 4;

/// 填充答案只能用 A-Z，超出的选项不参与枚举
pub const MAX_CHOICE_OPTIONS: usize = 26;

/// 多选题超过该选项数时不再判断子集是否穷尽
const MAX_ENUMERABLE_OPTIONS: usize = 12;

/// 一个待填充的候选答案
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub fingerprint: Fingerprint,
    /// 填充到平台的答案文本
    pub answer: String,
    pub strategy: Strategy,
}

/// 候选答案生成结果
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Ready(Candidate),
    /// 所有可能的答案都已试过
    Exhausted,
    /// 本轮没能得到新答案（生成失败或全部重复），下一轮再试
    Unavailable(String),
}

pub struct CandidateService {
    backend: Arc<dyn AnswerBackend>,
    generator: Arc<dyn AnswerGenerator>,
    cache: Arc<AttemptCache>,
}

impl CandidateService {
    pub fn new(
        backend: Arc<dyn AnswerBackend>,
        generator: Arc<dyn AnswerGenerator>,
        cache: Arc<AttemptCache>,
    ) -> Self {
        Self {
            backend,
            generator,
            cache,
        }
    }

    /// 为一道题生成下一个候选答案
    ///
    /// 只有配额耗尽会返回 `Err`，其他失败都体现在 `CandidateOutcome::Unavailable` 中。
    pub async fn next_candidate(
        &self,
        question: &QuestionRecord,
        config: &CorrectionConfig,
    ) -> AppResult<CandidateOutcome> {
        let attempted = self.cache.get_attempted(&question.id);
        let option_count = option_count(question);

        if is_exhausted(question.question_type, option_count, &attempted) {
            return Ok(CandidateOutcome::Exhausted);
        }

        let strategy = select_strategy(question.question_type, option_count, attempted.len());
        debug!(
            "[题目 {}] 策略: {}，已尝试 {} 个答案",
            question.id,
            strategy,
            attempted.len()
        );

        match strategy {
            Strategy::Toggle => Ok(ready_or_exhausted(
                question.question_type,
                next_boolean(&attempted),
                Strategy::Toggle,
            )),
            Strategy::Elimination => Ok(ready_or_exhausted(
                question.question_type,
                next_untried_option(option_count, &attempted),
                Strategy::Elimination,
            )),
            Strategy::DirectLookup => {
                if let Some(candidate) = self.lookup(question, option_count, &attempted, config).await? {
                    return Ok(CandidateOutcome::Ready(candidate));
                }
                self.generate(question, option_count, &attempted, config).await
            }
            Strategy::AiExclusion => self.generate(question, option_count, &attempted, config).await,
        }
    }

    /// 在题库中查找答案，找不到或答案已试过时返回 `None`
    async fn lookup(
        &self,
        question: &QuestionRecord,
        option_count: usize,
        attempted: &BTreeSet<Fingerprint>,
        config: &CorrectionConfig,
    ) -> AppResult<Option<Candidate>> {
        let result = retry_with_backoff(
            "题库搜索",
            config.call_retries,
            Duration::from_millis(config.call_backoff_ms),
            || self.backend.search(question),
        )
        .await;

        let found = match result {
            Ok(found) => found,
            Err(e) if e.is_quota_exceeded() => return Err(e),
            Err(e) => {
                warn!("⚠️ [题目 {}] 题库搜索失败，改用 AI: {}", question.id, e);
                return Ok(None);
            }
        };

        let Some(answer) = found.answer.filter(|_| found.found) else {
            debug!("[题目 {}] 题库中没有答案", question.id);
            return Ok(None);
        };

        match to_fingerprint(question, option_count, &answer) {
            Ok(fp) if !attempted.contains(&fp) => {
                info!("🔍 [题目 {}] 题库答案: {}", question.id, answer);
                Ok(Some(candidate(question.question_type, fp, Strategy::DirectLookup)))
            }
            Ok(_) => {
                debug!("[题目 {}] 题库答案 {} 已试过", question.id, answer);
                Ok(None)
            }
            Err(e) => {
                debug!("[题目 {}] 题库答案无法识别: {}", question.id, e);
                Ok(None)
            }
        }
    }

    /// 让 AI 生成一个新答案，已错答案作为反例
    async fn generate(
        &self,
        question: &QuestionRecord,
        option_count: usize,
        attempted: &BTreeSet<Fingerprint>,
        config: &CorrectionConfig,
    ) -> AppResult<CandidateOutcome> {
        let excluded: Vec<String> = attempted
            .iter()
            .map(|fp| fp.to_answer(question.question_type))
            .collect();
        let request = GenerationRequest::for_question(question, excluded);

        let mut reason = String::from("AI 未给出新答案");
        for call in 1..=config.max_attempts_per_question.max(1) {
            let generated = retry_with_backoff(
                "AI 生成答案",
                config.call_retries,
                Duration::from_millis(config.call_backoff_ms),
                || self.generator.generate(&request),
            )
            .await;

            let generated = match generated {
                Ok(generated) => generated,
                Err(e) if e.is_quota_exceeded() => return Err(e),
                Err(e) => {
                    warn!("⚠️ [题目 {}] AI 生成失败: {}", question.id, e);
                    reason = e.to_string();
                    break;
                }
            };

            match to_fingerprint(question, option_count, &generated.answer) {
                Ok(fp) if attempted.contains(&fp) => {
                    debug!(
                        "[题目 {}] 第 {} 次生成的答案 {} 已试过，丢弃",
                        question.id, call, fp
                    );
                    reason = format!("AI 重复给出已错答案 {}", fp);
                }
                Ok(fp) => {
                    info!(
                        "🤖 [题目 {}] AI 答案: {}",
                        question.id,
                        truncate_text(&generated.answer, 40)
                    );
                    return Ok(CandidateOutcome::Ready(candidate(
                        question.question_type,
                        fp,
                        Strategy::AiExclusion,
                    )));
                }
                Err(e) => {
                    debug!(
                        "[题目 {}] 第 {} 次生成的答案无法识别，丢弃: {}",
                        question.id, call, e
                    );
                    reason = format!("AI 答案无法识别: {}", e);
                }
            }
        }

        // 单选题退回排除法
        if question.question_type == QuestionType::Single {
            debug!("[题目 {}] AI 无新答案，退回排除法", question.id);
            return Ok(ready_or_exhausted(
                QuestionType::Single,
                next_untried_option(option_count, attempted),
                Strategy::Elimination,
            ));
        }

        Ok(CandidateOutcome::Unavailable(reason))
    }
}

fn candidate(question_type: QuestionType, fingerprint: Fingerprint, strategy: Strategy) -> Candidate {
    Candidate {
        answer: fingerprint.to_answer(question_type),
        fingerprint,
        strategy,
    }
}

fn ready_or_exhausted(
    question_type: QuestionType,
    fingerprint: Option<Fingerprint>,
    strategy: Strategy,
) -> CandidateOutcome {
    match fingerprint {
        Some(fp) => CandidateOutcome::Ready(candidate(question_type, fp, strategy)),
        None => CandidateOutcome::Exhausted,
    }
}

/// 选择题的有效选项数
pub fn option_count(question: &QuestionRecord) -> usize {
    match question.question_type {
        QuestionType::Single | QuestionType::Multi if question.options.is_empty() => {
            DEFAULT_OPTION_COUNT
        }
        QuestionType::Single | QuestionType::Multi => {
            question.options.len().min(MAX_CHOICE_OPTIONS)
        }
        QuestionType::Boolean => 2,
        QuestionType::Blank | QuestionType::Essay => 0,
    }
}

/// 任意写法的答案 → 指纹（先匹配选项原文，再检查越界）
pub fn to_fingerprint(
    question: &QuestionRecord,
    option_count: usize,
    raw: &str,
) -> Result<Fingerprint, AnswerFormatError> {
    let raw = match match_option_text(raw, &question.options) {
        Some(letter) if question.question_type.has_options() => letter.to_string(),
        _ => raw.to_string(),
    };
    let fingerprint = normalize_answer(&raw, question.question_type)?;
    fingerprint.check_bounds(question.question_type, option_count)?;
    Ok(fingerprint)
}

fn next_boolean(attempted: &BTreeSet<Fingerprint>) -> Option<Fingerprint> {
    [true, false]
        .into_iter()
        .map(Fingerprint::for_boolean)
        .find(|fp| !attempted.contains(fp))
}

fn next_untried_option(option_count: usize, attempted: &BTreeSet<Fingerprint>) -> Option<Fingerprint> {
    (0..option_count)
        .map(Fingerprint::for_option)
        .find(|fp| !attempted.contains(fp))
}

/// 是否所有可能的答案都已试过（填空/简答永远不会穷尽）
pub fn is_exhausted(
    question_type: QuestionType,
    option_count: usize,
    attempted: &BTreeSet<Fingerprint>,
) -> bool {
    match question_type {
        QuestionType::Boolean => next_boolean(attempted).is_none(),
        QuestionType::Single => next_untried_option(option_count, attempted).is_none(),
        QuestionType::Multi if option_count == 0 || option_count > MAX_ENUMERABLE_OPTIONS => false,
        QuestionType::Multi => {
            let total_subsets = (1usize << option_count) - 1;
            let tried = attempted
                .iter()
                .filter(|fp| {
                    let indices = fp.option_indices();
                    !indices.is_empty() && indices.iter().all(|&i| i < option_count)
                })
                .count();
            tried >= total_subsets
        }
        QuestionType::Blank | QuestionType::Essay => false,
    }
}
