//! 集成测试用的内存实现
//!
//! - `FakePlatform`: 同时实现批改来源和答案填充，按标准答案现场批改
//! - `FakeBackend`: 题库，可配置查重结果和搜索答案，记录上传内容
//! - `FakeGenerator`: 按脚本依次返回 AI 答案，可在第 N 次调用时报配额耗尽

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Mutex;

use question_correction::clients::{AnswerApplier, AnswerBackend, AnswerGenerator, GradingSource};
use question_correction::config::CacheConfig;
use question_correction::error::{BackendError, GradingError, LlmError};
use question_correction::models::{
    ExistenceStatus, GeneratedAnswer, GenerationRequest, SearchResult, UploadPayload,
    UploadReceipt,
};
use question_correction::storage::MemoryStore;
use question_correction::{
    AppResult, Collaborators, CorrectionConfig, CorrectionOrchestrator, CorrectionSummary,
    QuestionType,
};

// ========== 平台 ==========

/// 平台上的一道题
#[derive(Debug, Clone)]
pub struct FakeQuestion {
    pub id: String,
    pub question_type: QuestionType,
    pub options: Vec<String>,
    /// 标准答案（与填充文本同样写法，如 `"B"`、`"A,C"`、`"错"`）
    pub correct_answer: String,
    /// 当前提交的答案
    pub current: Option<String>,
    /// 接下来多少次拉取仍返回未批改
    pub unsettled_polls: usize,
    /// 永远不出批改结果
    pub never_graded: bool,
}

impl FakeQuestion {
    pub fn new(id: &str, question_type: QuestionType, correct_answer: &str) -> Self {
        let options = match question_type {
            QuestionType::Single | QuestionType::Multi => {
                (0..4).map(|i| format!("选项{}", i)).collect()
            }
            _ => Vec::new(),
        };
        Self {
            id: id.to_string(),
            question_type,
            options,
            correct_answer: correct_answer.to_string(),
            current: None,
            unsettled_polls: 0,
            never_graded: false,
        }
    }

    /// 设置选项数量（单选/多选）
    pub fn with_options(mut self, count: usize) -> Self {
        self.options = (0..count).map(|i| format!("选项{}", i)).collect();
        self
    }

    pub fn answered(mut self, answer: &str) -> Self {
        self.current = Some(answer.to_string());
        self
    }

    pub fn unsettled_for(mut self, polls: usize) -> Self {
        self.unsettled_polls = polls;
        self
    }

    pub fn never_graded(mut self) -> Self {
        self.never_graded = true;
        self
    }

    fn is_correct(&self) -> bool {
        self.current.as_deref().map(str::trim) == Some(self.correct_answer.trim())
    }
}

pub struct FakePlatform {
    questions: Mutex<Vec<FakeQuestion>>,
    /// 按顺序记录的 (题目 ID, 填充答案)
    applied: Mutex<Vec<(String, String)>>,
    fetches: AtomicUsize,
    fetch_delay: Duration,
    /// 第几次拉取（从 1 开始）直接失败
    failing_fetches: HashSet<usize>,
}

impl FakePlatform {
    pub fn new(questions: Vec<FakeQuestion>) -> Self {
        Self {
            questions: Mutex::new(questions),
            applied: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fetch_delay: Duration::ZERO,
            failing_fetches: HashSet::new(),
        }
    }

    /// 指定的拉取次数（从 1 开始）返回不可重试的错误
    pub fn with_failing_fetches(mut self, fetches: impl IntoIterator<Item = usize>) -> Self {
        self.failing_fetches.extend(fetches);
        self
    }

    /// 每次拉取批改结果前等待一段时间
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub async fn applied(&self) -> Vec<(String, String)> {
        self.applied.lock().await.clone()
    }

    /// 某道题依次填充过的答案
    pub async fn applied_to(&self, question_id: &str) -> Vec<String> {
        self.applied
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id == question_id)
            .map(|(_, answer)| answer.clone())
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn grading_item(question: &mut FakeQuestion) -> JsonValue {
    let correct = if question.never_graded {
        JsonValue::Null
    } else if question.unsettled_polls > 0 {
        question.unsettled_polls -= 1;
        JsonValue::Null
    } else {
        JsonValue::Bool(question.is_correct())
    };

    let mut item = json!({
        "id": question.id,
        "questionContent": format!("<p>题目 {}</p>", question.id),
        "correct": correct,
        "stuAnswer": question.current.clone().unwrap_or_default(),
    });
    if !question.options.is_empty() {
        item["options"] = JsonValue::String(
            serde_json::to_string(&question.options).unwrap_or_else(|_| "[]".to_string()),
        );
    }
    item
}

#[async_trait]
impl GradingSource for FakePlatform {
    async fn fetch_grading_snapshot(&self, assignment_id: &str) -> AppResult<JsonValue> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if self.failing_fetches.contains(&fetch) {
            return Err(GradingError::FetchFailed {
                assignment_id: assignment_id.to_string(),
                message: format!("第 {} 次拉取失败", fetch),
                transient: false,
            }
            .into());
        }

        let mut questions = self.questions.lock().await;
        let mut payload = json!({});
        for question_type in QuestionType::ALL {
            let lists: Vec<JsonValue> = questions
                .iter_mut()
                .filter(|q| q.question_type == question_type)
                .map(grading_item)
                .collect();
            if !lists.is_empty() {
                payload[question_type.section_key()] = json!({ "lists": lists });
            }
        }
        Ok(payload)
    }
}

#[async_trait]
impl AnswerApplier for FakePlatform {
    async fn apply_answer(
        &self,
        _assignment_id: &str,
        question_id: &str,
        answer: &str,
        _question_type: QuestionType,
    ) -> AppResult<bool> {
        let mut questions = self.questions.lock().await;
        let Some(question) = questions.iter_mut().find(|q| q.id == question_id) else {
            return Ok(false);
        };
        question.current = Some(answer.to_string());
        self.applied
            .lock()
            .await
            .push((question_id.to_string(), answer.to_string()));
        Ok(true)
    }
}

// ========== 题库 ==========

#[derive(Default)]
pub struct FakeBackend {
    /// 题目 ID → 是否已有有效答案
    existing: HashMap<String, bool>,
    /// 题目 ID → 题库答案
    search_answers: HashMap<String, String>,
    upload_quota_exceeded: bool,
    uploads: Mutex<Vec<UploadPayload>>,
    existence_checks: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(mut self, question_id: &str, has_valid_answer: bool) -> Self {
        self.existing.insert(question_id.to_string(), has_valid_answer);
        self
    }

    pub fn with_search_answer(mut self, question_id: &str, answer: &str) -> Self {
        self.search_answers
            .insert(question_id.to_string(), answer.to_string());
        self
    }

    pub fn with_upload_quota_exceeded(mut self) -> Self {
        self.upload_quota_exceeded = true;
        self
    }

    pub async fn uploads(&self) -> Vec<UploadPayload> {
        self.uploads.lock().await.clone()
    }

    /// 所有上传中出现过的题目 ID
    pub async fn uploaded_ids(&self) -> Vec<String> {
        self.uploads
            .lock()
            .await
            .iter()
            .flat_map(|p| p.items.iter().map(|i| i.question_id.clone()))
            .collect()
    }

    pub fn existence_checks(&self) -> usize {
        self.existence_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerBackend for FakeBackend {
    async fn search(
        &self,
        question: &question_correction::QuestionRecord,
    ) -> AppResult<SearchResult> {
        Ok(match self.search_answers.get(&question.id) {
            Some(answer) => SearchResult {
                found: true,
                answer: Some(answer.clone()),
                source: Some("fake".to_string()),
            },
            None => SearchResult::default(),
        })
    }

    async fn batch_existence_check(
        &self,
        questions: &[question_correction::QuestionRecord],
    ) -> AppResult<Vec<ExistenceStatus>> {
        self.existence_checks.fetch_add(1, Ordering::SeqCst);
        Ok(questions
            .iter()
            .map(|q| ExistenceStatus {
                question_id: q.id.clone(),
                has_valid_answer: self.existing.get(&q.id).copied().unwrap_or(false),
            })
            .collect())
    }

    async fn upload(&self, payload: &UploadPayload) -> AppResult<UploadReceipt> {
        if self.upload_quota_exceeded {
            return Err(BackendError::QuotaExceeded {
                endpoint: "/api/upload".to_string(),
                message: "upload quota exceeded".to_string(),
            }
            .into());
        }
        self.uploads.lock().await.push(payload.clone());
        Ok(UploadReceipt {
            new_count: payload.items.len(),
            new_question_ids: payload.items.iter().map(|i| i.question_id.clone()).collect(),
            ..Default::default()
        })
    }
}

// ========== AI ==========

#[derive(Default)]
pub struct FakeGenerator {
    script: Mutex<VecDeque<String>>,
    /// 第几次调用（从 1 开始）返回配额耗尽
    quota_on_call: Option<usize>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(answers: &[&str]) -> Self {
        Self {
            script: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_quota_on_call(mut self, call: usize) -> Self {
        self.quota_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl AnswerGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedAnswer> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(request.clone());

        if self.quota_on_call == Some(call) {
            return Err(LlmError::QuotaExceeded {
                model: "fake".to_string(),
                message: "insufficient_quota".to_string(),
            }
            .into());
        }
        match self.script.lock().await.pop_front() {
            Some(answer) => Ok(GeneratedAnswer { answer }),
            None => Err(LlmError::EmptyContent {
                model: "fake".to_string(),
            }
            .into()),
        }
    }
}

// ========== 组装 ==========

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub backend: Arc<FakeBackend>,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<MemoryStore>,
    pub orchestrator: CorrectionOrchestrator,
}

impl Harness {
    pub async fn new(platform: FakePlatform, backend: FakeBackend, generator: FakeGenerator) -> Self {
        Self::with_store(platform, backend, generator, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(
        platform: FakePlatform,
        backend: FakeBackend,
        generator: FakeGenerator,
        store: Arc<MemoryStore>,
    ) -> Self {
        let platform = Arc::new(platform);
        let backend = Arc::new(backend);
        let generator = Arc::new(generator);

        let collaborators = Collaborators {
            backend: backend.clone(),
            generator: generator.clone(),
            grading: platform.clone(),
            applier: platform.clone(),
            store: store.clone(),
        };
        let orchestrator = CorrectionOrchestrator::new(collaborators, &cache_config(), "czbk")
            .await
            .expect("创建编排器失败");

        Self {
            platform,
            backend,
            generator,
            store,
            orchestrator,
        }
    }

    pub async fn run(&self, assignment_id: &str) -> AppResult<CorrectionSummary> {
        self.run_with(assignment_id, &CorrectionConfig::immediate()).await
    }

    pub async fn run_with(
        &self,
        assignment_id: &str,
        config: &CorrectionConfig,
    ) -> AppResult<CorrectionSummary> {
        self.orchestrator.run_correction(assignment_id, config).await
    }
}

pub fn cache_config() -> CacheConfig {
    CacheConfig {
        persist_debounce_ms: 0,
        ..CacheConfig::default()
    }
}
