//! 题目处理上下文
//!
//! 封装"我正在纠正哪份作业第几轮的哪道题"这一信息

use std::fmt::Display;

use crate::models::QuestionType;

/// 题目处理上下文
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    /// 作业ID
    pub assignment_id: String,

    /// 当前轮次（从1开始，仅用于日志显示）
    pub round: u32,

    pub question_id: String,

    pub question_type: QuestionType,
}

impl QuestionCtx {
    pub fn new(
        assignment_id: impl Into<String>,
        round: u32,
        question_id: impl Into<String>,
        question_type: QuestionType,
    ) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            round,
            question_id: question_id.into(),
            question_type,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[作业 {} 第{}轮 题目 {}({})]",
            self.assignment_id, self.round, self.question_id, self.question_type
        )
    }
}
