use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::models::QuestionType;

/// 程序配置
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub correction: CorrectionConfig,
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    pub platform: PlatformConfig,
    pub llm: LlmConfig,
}

/// 纠错流程配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// 每道题最多尝试次数
    pub max_attempts_per_question: u32,
    /// 最多纠错轮数
    pub max_rounds: u32,
    /// 单选/判断/填空填充后的等待时间（毫秒）
    pub settle_delay_short_ms: u64,
    /// 多选/简答填充后的等待时间（毫秒）
    pub settle_delay_long_ms: u64,
    /// 两轮之间的间隔（毫秒）
    pub round_pause_ms: u64,
    /// 批改结果不完整时的重试次数
    pub verify_retries: u32,
    /// 批改结果重试的退避基数（毫秒，线性递增）
    pub verify_backoff_ms: u64,
    /// 瞬时网络错误的重试次数
    pub call_retries: u32,
    /// 瞬时网络错误的退避基数（毫秒，指数递增）
    pub call_backoff_ms: u64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_question: 3,
            max_rounds: 3,
            settle_delay_short_ms: 3000,
            settle_delay_long_ms: 5000,
            round_pause_ms: 500,
            verify_retries: 3,
            verify_backoff_ms: 800,
            call_retries: 3,
            call_backoff_ms: 500,
        }
    }
}

impl CorrectionConfig {
    /// 填充答案后等待平台保存的时间，多选和简答处理更慢
    pub fn settle_delay(&self, question_type: QuestionType) -> Duration {
        match question_type {
            QuestionType::Multi | QuestionType::Essay => {
                Duration::from_millis(self.settle_delay_long_ms)
            }
            QuestionType::Single | QuestionType::Boolean | QuestionType::Blank => {
                Duration::from_millis(self.settle_delay_short_ms)
            }
        }
    }

    /// 不等待、不退避的配置，用于测试
    pub fn immediate() -> Self {
        Self {
            settle_delay_short_ms: 0,
            settle_delay_long_ms: 0,
            round_pause_ms: 0,
            verify_backoff_ms: 0,
            call_backoff_ms: 0,
            ..Self::default()
        }
    }
}

/// 已尝试答案缓存配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存有效期（秒），超过后整体清空
    pub ttl_secs: u64,
    /// 写入合并窗口（毫秒）
    pub persist_debounce_ms: u64,
    /// 文件存储目录
    pub storage_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            persist_debounce_ms: 1000,
            storage_dir: "correction_data".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// 题库后端配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_base_url: String,
    pub api_key: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 上报给后端的平台标识
    pub platform: String,
    /// 后端 AI 答题使用的模型
    pub ai_model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            api_key: String::new(),
            timeout_secs: 90,
            platform: "czbk".to_string(),
            ai_model: "deepseek-chat".to_string(),
        }
    }
}

/// 答题平台配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    /// 登录态 Cookie
    pub cookie: String,
    /// 作业是否已提交（决定调用哪个批改接口）
    pub submitted: bool,
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://stu.ityxb.com".to_string(),
            cookie: String::new(),
            submitted: false,
            timeout_secs: 30,
        }
    }
}

/// LLM 直连配置（启用后替代后端 AI 答题）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_base_url: "https://api.deepseek.com/v1".to_string(),
            model_name: "deepseek-chat".to_string(),
            temperature: 0.3,
        }
    }
}

impl Config {
    /// 从环境变量加载，未设置的项使用默认值
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// 从 TOML 文件加载，再用环境变量覆盖
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        let c = &mut self.correction;
        c.max_attempts_per_question = env_parse("MAX_ATTEMPTS_PER_QUESTION", c.max_attempts_per_question);
        c.max_rounds = env_parse("MAX_ROUNDS", c.max_rounds);
        c.settle_delay_short_ms = env_parse("SETTLE_DELAY_SHORT_MS", c.settle_delay_short_ms);
        c.settle_delay_long_ms = env_parse("SETTLE_DELAY_LONG_MS", c.settle_delay_long_ms);
        c.verify_retries = env_parse("VERIFY_RETRIES", c.verify_retries);
        c.call_retries = env_parse("CALL_RETRIES", c.call_retries);

        let cache = &mut self.cache;
        cache.ttl_secs = env_parse("ATTEMPT_CACHE_TTL_SECS", cache.ttl_secs);
        cache.persist_debounce_ms = env_parse("ATTEMPT_CACHE_DEBOUNCE_MS", cache.persist_debounce_ms);
        env_string("STORAGE_DIR", &mut cache.storage_dir);

        let b = &mut self.backend;
        env_string("BACKEND_API_BASE_URL", &mut b.api_base_url);
        env_string("BACKEND_API_KEY", &mut b.api_key);
        b.timeout_secs = env_parse("BACKEND_TIMEOUT_SECS", b.timeout_secs);

        let p = &mut self.platform;
        env_string("PLATFORM_BASE_URL", &mut p.base_url);
        env_string("PLATFORM_COOKIE", &mut p.cookie);
        p.submitted = env_parse("PLATFORM_SUBMITTED", p.submitted);

        let l = &mut self.llm;
        l.enabled = env_parse("LLM_ENABLED", l.enabled);
        env_string("LLM_API_KEY", &mut l.api_key);
        env_string("LLM_API_BASE_URL", &mut l.api_base_url);
        env_string("LLM_MODEL_NAME", &mut l.model_name);
    }

    /// 校验配置
    pub fn validate(&self) -> AppResult<()> {
        if self.correction.max_attempts_per_question == 0 {
            return Err(invalid("correction.max_attempts_per_question", "必须大于 0"));
        }
        if self.correction.max_rounds == 0 {
            return Err(invalid("correction.max_rounds", "必须大于 0"));
        }
        if self.backend.api_base_url.trim().is_empty() {
            return Err(invalid("backend.api_base_url", "不能为空"));
        }
        if self.platform.base_url.trim().is_empty() {
            return Err(invalid("platform.base_url", "不能为空"));
        }
        if self.llm.enabled && self.llm.api_key.trim().is_empty() {
            return Err(invalid("llm.api_key", "启用 LLM 直连时不能为空"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::AppError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}
