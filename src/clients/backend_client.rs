//! 题库后端 HTTP 客户端
//!
//! 所有接口都是 `POST` + JSON，响应统一包一层 `{code, message, data}`，
//! `code == 1` 表示成功。请求头带 `X-API-Key`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::clients::{AnswerBackend, AnswerGenerator};
use crate::config::BackendConfig;
use crate::error::{AppError, AppResult, BackendError};
use crate::models::{
    ExistenceStatus, GeneratedAnswer, GenerationRequest, QuestionRecord, SearchResult,
    UploadItem, UploadPayload, UploadReceipt,
};

const SEARCH_ENDPOINT: &str = "/api/search";
const AI_ANSWER_ENDPOINT: &str = "/api/ai/answer";
const CHECK_ENDPOINT: &str = "/api/questions/check";
const UPLOAD_ENDPOINT: &str = "/api/upload";

const CODE_OK: i64 = 1;
const CODE_NOT_FOUND: i64 = 0;

/// 响应里出现这些词视为配额/频率限制
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "too many requests",
    "配额",
    "额度",
    "次数已用完",
    "调用次数超出限制",
];

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<JsonValue>,
}

pub fn mentions_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|m| lower.contains(m))
}

/// 题库后端客户端
pub struct BackendClient {
    http: Client,
    base_url: String,
    api_key: String,
    platform: String,
    ai_model: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::RequestFailed {
                endpoint: String::new(),
                message: format!("无法创建 HTTP 客户端: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            platform: config.platform.clone(),
            ai_model: config.ai_model.clone(),
        })
    }

    /// 发送请求并拆开响应信封
    ///
    /// # 返回
    /// `(code, data)`；`code` 既不是成功也不是"未找到"时返回 `BadResponse`
    async fn post(&self, endpoint: &str, body: JsonValue) -> AppResult<(i64, Option<JsonValue>)> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BackendError::RequestFailed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        check_status(endpoint, status, &text)?;

        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| BackendError::BadResponse {
                endpoint: endpoint.to_string(),
                code: None,
                message: Some(format!("响应不是合法 JSON: {}", e)),
            })?;

        if envelope.code == CODE_OK || envelope.code == CODE_NOT_FOUND {
            return Ok((envelope.code, envelope.data));
        }

        let message = envelope.message.unwrap_or_default();
        if mentions_quota(&message) {
            warn!("⚠️ 后端配额已用尽: {}", message);
            return Err(BackendError::QuotaExceeded {
                endpoint: endpoint.to_string(),
                message,
            }
            .into());
        }
        Err(BackendError::BadResponse {
            endpoint: endpoint.to_string(),
            code: Some(envelope.code),
            message: Some(message),
        }
        .into())
    }

    async fn post_data<T: DeserializeOwned>(&self, endpoint: &str, body: JsonValue) -> AppResult<T> {
        let (code, data) = self.post(endpoint, body).await?;
        let data = match (code, data) {
            (CODE_OK, Some(data)) => data,
            (code, _) => {
                return Err(BackendError::BadResponse {
                    endpoint: endpoint.to_string(),
                    code: Some(code),
                    message: Some("响应缺少 data".to_string()),
                }
                .into())
            }
        };
        serde_json::from_value(data).map_err(|e| {
            AppError::from(BackendError::BadResponse {
                endpoint: endpoint.to_string(),
                code: Some(code),
                message: Some(e.to_string()),
            })
        })
    }
}

/// HTTP 状态码映射
///
/// - 429 或 403 且提示配额 → `QuotaExceeded`
/// - 5xx → `ServerError`（可重试）
/// - 其他 4xx → `BadResponse`
fn check_status(endpoint: &str, status: StatusCode, body: &str) -> AppResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let endpoint = endpoint.to_string();
    let err = if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && mentions_quota(body))
    {
        BackendError::QuotaExceeded {
            endpoint,
            message: body.to_string(),
        }
    } else if status.is_server_error() {
        BackendError::ServerError {
            endpoint,
            status: status.as_u16(),
        }
    } else {
        BackendError::BadResponse {
            endpoint,
            code: Some(status.as_u16() as i64),
            message: Some(body.to_string()),
        }
    };
    Err(err.into())
}

fn upload_item_json(item: &UploadItem) -> JsonValue {
    let mut value = json!({
        "questionId": item.question_id,
        "type": item.question_type.code(),
        "questionContent": item.question_content,
        "options": item.options,
        "correctness": item.correctness,
        "reason": item.reason,
    });
    if let Some(answer) = &item.answer {
        value["answer"] = json!(answer);
    }
    value
}

#[async_trait]
impl AnswerBackend for BackendClient {
    async fn search(&self, question: &QuestionRecord) -> AppResult<SearchResult> {
        let body = json!({
            "questionId": question.id,
            "questionContent": question.content,
            "type": question.question_type.code(),
            "options": question.options,
            "platform": self.platform,
        });
        let (code, data) = self.post(SEARCH_ENDPOINT, body).await?;
        if code == CODE_NOT_FOUND {
            return Ok(SearchResult::default());
        }
        let mut result: SearchResult = data
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| BackendError::BadResponse {
                endpoint: SEARCH_ENDPOINT.to_string(),
                code: Some(code),
                message: Some(e.to_string()),
            })?
            .unwrap_or_default();
        // 有答案才算找到
        result.found = result.found && result.answer.as_deref().is_some_and(|a| !a.trim().is_empty());
        Ok(result)
    }

    async fn batch_existence_check(
        &self,
        questions: &[QuestionRecord],
    ) -> AppResult<Vec<ExistenceStatus>> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<JsonValue> = questions
            .iter()
            .map(|q| {
                json!({
                    "questionId": q.id,
                    "type": q.question_type.code(),
                    "questionContent": q.content,
                })
            })
            .collect();
        let body = json!({ "platform": self.platform, "questions": items });
        self.post_data(CHECK_ENDPOINT, body).await
    }

    async fn upload(&self, payload: &UploadPayload) -> AppResult<UploadReceipt> {
        let items: Vec<JsonValue> = payload.items.iter().map(upload_item_json).collect();
        let body = json!({
            "assignmentId": payload.assignment_id,
            "platform": payload.platform,
            "source": payload.source,
            "items": items,
        });
        self.post_data(UPLOAD_ENDPOINT, body).await
    }
}

#[async_trait]
impl AnswerGenerator for BackendClient {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedAnswer> {
        let body = json!({
            "questionContent": request.question_content,
            "type": request.question_type.code(),
            "options": request.options,
            "platform": self.platform,
            "model": self.ai_model,
            "excludedAnswers": request.attempted_answers,
        });
        let generated: GeneratedAnswer = self.post_data(AI_ANSWER_ENDPOINT, body).await?;
        if generated.answer.trim().is_empty() {
            return Err(BackendError::BadResponse {
                endpoint: AI_ANSWER_ENDPOINT.to_string(),
                code: Some(CODE_OK),
                message: Some("AI 返回空答案".to_string()),
            }
            .into());
        }
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Correctness, QuestionType, UploadReason};

    #[test]
    fn test_status_mapping() {
        let quota = check_status("/api/search", StatusCode::TOO_MANY_REQUESTS, "").unwrap_err();
        assert!(quota.is_quota_exceeded());

        let forbidden_quota =
            check_status("/api/search", StatusCode::FORBIDDEN, "daily quota reached").unwrap_err();
        assert!(forbidden_quota.is_quota_exceeded());

        let forbidden = check_status("/api/search", StatusCode::FORBIDDEN, "API Key未激活").unwrap_err();
        assert!(!forbidden.is_quota_exceeded());
        assert!(!forbidden.is_transient());

        let server = check_status("/api/upload", StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(server.is_transient());

        assert!(check_status("/api/upload", StatusCode::OK, "").is_ok());
    }

    #[test]
    fn test_mentions_quota() {
        assert!(mentions_quota("Rate LIMIT exceeded"));
        assert!(mentions_quota("今日查询次数已用完"));
        assert!(!mentions_quota("未找到匹配的答案"));
        assert!(!mentions_quota("content length limit exceeded"));
        assert!(!mentions_quota("题目内容超出长度限制"));
    }

    #[test]
    fn test_upload_item_uses_type_code() {
        let record = QuestionRecord::new(
            "q1",
            QuestionType::Multi,
            "以下哪些是 Rust 的特性",
            vec!["所有权".into(), "GC".into()],
            Correctness::Correct,
        )
        .with_submitted("A");
        let value = upload_item_json(&UploadItem::from_record(&record, UploadReason::New));
        assert_eq!(value["type"], "1");
        assert_eq!(value["answer"], "A");
        assert_eq!(value["reason"], "new");
        assert_eq!(value["correctness"], "CORRECT");
    }

    #[test]
    fn test_envelope_defaults() {
        let envelope: Envelope = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert_eq!(envelope.code, CODE_NOT_FOUND);
        assert!(envelope.data.is_none());
    }
}
