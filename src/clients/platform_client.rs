//! 作业平台客户端
//!
//! 已提交的作业用 `findStudentBusywork`（GET），
//! 答题中的作业用 `startBusywork`（POST 表单），两者都返回 `resultObject`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::clients::GradingSource;
use crate::config::PlatformConfig;
use crate::error::{AppResult, GradingError};

const FIND_PATH: &str = "/back/bxg/my/busywork/findStudentBusywork";
const START_PATH: &str = "/back/bxg/my/busywork/startBusywork";

pub struct PlatformClient {
    http: Client,
    base_url: String,
    cookie: String,
    submitted: bool,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GradingError::FetchFailed {
                assignment_id: String::new(),
                message: format!("无法创建 HTTP 客户端: {}", e),
                transient: false,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.cookie.clone(),
            submitted: config.submitted,
        })
    }
}

/// 从平台响应中取出 `resultObject`
pub fn extract_result_object(mut body: JsonValue) -> AppResult<JsonValue> {
    match body.get_mut("resultObject").map(JsonValue::take) {
        Some(obj) if !obj.is_null() => Ok(obj),
        _ => {
            let reason = body
                .get("errorMessage")
                .and_then(JsonValue::as_str)
                .unwrap_or("未找到resultObject")
                .to_string();
            Err(GradingError::MalformedPayload(reason).into())
        }
    }
}

#[async_trait]
impl GradingSource for PlatformClient {
    async fn fetch_grading_snapshot(&self, assignment_id: &str) -> AppResult<JsonValue> {
        let request = if self.submitted {
            info!("[作业 {}] 调用已提交结果接口", assignment_id);
            let t = chrono::Utc::now().timestamp_millis().to_string();
            self.http
                .get(format!("{}{}", self.base_url, FIND_PATH))
                .query(&[("busyworkId", assignment_id), ("t", t.as_str())])
        } else {
            info!("[作业 {}] 调用批改接口", assignment_id);
            self.http
                .post(format!("{}{}", self.base_url, START_PATH))
                .form(&[("busyworkId", assignment_id)])
        };

        let fetch_failed = |message: String, transient: bool| GradingError::FetchFailed {
            assignment_id: assignment_id.to_string(),
            message,
            transient,
        };

        let response = request
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string(), true))?;

        let status = response.status();
        if !status.is_success() {
            warn!("[作业 {}] 批改接口返回错误: {}", assignment_id, status);
            return Err(fetch_failed(
                format!("批改接口返回错误: {}", status),
                status.is_server_error(),
            )
            .into());
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| GradingError::MalformedPayload(e.to_string()))?;
        debug!("[作业 {}] 响应 code: {:?}", assignment_id, body.get("code"));

        extract_result_object(body)
    }
}
