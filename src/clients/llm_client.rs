//! 直连 LLM 的答案生成器
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（DeepSeek、Azure 等）
//!
//! 与后端 `/api/ai/answer` 等价，但把已错答案写进提示词，避免模型重复给出。

use std::sync::LazyLock;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::clients::AnswerGenerator;
use crate::config::LlmConfig;
use crate::error::{AppResult, LlmError};
use crate::models::{index_to_letter, GeneratedAnswer, GenerationRequest, QuestionType};

static ANSWER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:答案|answer)\s*[:：]\s*").expect("Invalid regex")
});
static OPTION_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+").expect("Invalid regex"));

/// 判断题回复中表示"错误"的词，需先于"对"/"正确"检查
const NEGATIVE_TOKENS: &[&str] = &["不正确", "不对", "错误", "错", "×"];

const SYSTEM_PROMPT: &str = "你是一个专业的在线教育答题助手，擅长回答各种类型的题目。\
                             请准确、简洁地回答题目，并提供清晰的解析。";

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
        }
    }

    /// 发送一次聊天请求，返回去掉首尾空白的回复
    async fn send_to_llm(&self, user_message: &str) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let api_failed = |message: String| LlmError::ApiCallFailed {
            model: self.model_name.clone(),
            message,
        };

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(1000u32)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            let message = e.to_string();
            warn!("LLM API 调用失败: {}", message);
            if is_quota_message(&message) {
                LlmError::QuotaExceeded {
                    model: self.model_name.clone(),
                    message,
                }
            } else {
                api_failed(message)
            }
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("429") || lower.contains("rate limit")
        || lower.contains("insufficient balance")
}

/// 构建答题提示词
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "请回答以下{}：\n\n题目：{}\n\n",
        request.question_type.name(),
        request.question_content
    );

    if !request.options.is_empty() {
        prompt.push_str("选项：\n");
        for (i, option) in request.options.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", index_to_letter(i), option));
        }
        prompt.push('\n');
    }

    if !request.attempted_answers.is_empty() {
        prompt.push_str("以下答案已被证明是错误的，请避免重复：\n");
        for answer in &request.attempted_answers {
            prompt.push_str(&format!("- {}\n", answer));
        }
        prompt.push('\n');
    }

    prompt.push_str(match request.question_type {
        QuestionType::Single | QuestionType::Multi => {
            "请直接给出答案选项（如：A、B、AB等），并在答案后提供简要解析。"
        }
        QuestionType::Boolean => "请直接给出答案（正确/错误），并在答案后提供简要解析。",
        QuestionType::Blank => "请直接给出填空答案，并在答案后提供简要解析。",
        QuestionType::Essay => "请直接给出答案，并在答案后提供简要解析。",
    });
    prompt
}

/// 从模型回复中取出答案部分（去掉"答案："前缀和解析）
pub fn extract_answer(reply: &str, question_type: QuestionType) -> String {
    let first_line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let first_line = ANSWER_PREFIX.replace(first_line, "").trim().to_string();

    match question_type {
        QuestionType::Single | QuestionType::Multi => OPTION_LETTERS
            .find(&first_line)
            .or_else(|| OPTION_LETTERS.find(reply))
            .map(|m| m.as_str().to_string())
            .unwrap_or(first_line),
        QuestionType::Boolean => {
            if NEGATIVE_TOKENS.iter().any(|t| first_line.contains(t)) {
                "错误".to_string()
            } else if ["正确", "对", "√"].iter().any(|t| first_line.contains(t)) {
                "正确".to_string()
            } else {
                first_line
            }
        }
        QuestionType::Blank | QuestionType::Essay => first_line,
    }
}

#[async_trait]
impl AnswerGenerator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedAnswer> {
        let prompt = build_prompt(request);
        let reply = self.send_to_llm(&prompt).await?;
        let answer = extract_answer(&reply, request.question_type);
        debug!("LLM 答案: {}", answer);
        Ok(GeneratedAnswer { answer })
    }
}
