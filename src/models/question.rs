use serde::{Deserialize, Serialize};
use std::fmt;

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    /// 单选题
    Single,
    /// 多选题
    Multi,
    /// 判断题
    Boolean,
    /// 填空题
    Blank,
    /// 简答题
    Essay,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::Single,
        QuestionType::Multi,
        QuestionType::Boolean,
        QuestionType::Blank,
        QuestionType::Essay,
    ];

    /// 平台/题库使用的题型代码
    pub fn code(self) -> &'static str {
        match self {
            QuestionType::Single => "0",
            QuestionType::Multi => "1",
            QuestionType::Boolean => "2",
            QuestionType::Blank => "3",
            QuestionType::Essay => "4",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(QuestionType::Single),
            "1" => Some(QuestionType::Multi),
            "2" => Some(QuestionType::Boolean),
            "3" => Some(QuestionType::Blank),
            "4" => Some(QuestionType::Essay),
            _ => None,
        }
    }

    /// 批改结果中对应的分组字段
    pub fn section_key(self) -> &'static str {
        match self {
            QuestionType::Single => "danxuan",
            QuestionType::Multi => "duoxuan",
            QuestionType::Boolean => "panduan",
            QuestionType::Blank => "tiankong",
            QuestionType::Essay => "jianda",
        }
    }

    /// 是否为固定选项的选择题
    pub fn has_options(self) -> bool {
        matches!(self, QuestionType::Single | QuestionType::Multi)
    }

    pub fn name(self) -> &'static str {
        match self {
            QuestionType::Single => "单选题",
            QuestionType::Multi => "多选题",
            QuestionType::Boolean => "判断题",
            QuestionType::Blank => "填空题",
            QuestionType::Essay => "简答题",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 批改结果（三态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Correctness {
    /// 尚未批改完成
    #[default]
    Unknown,
    Correct,
    Wrong,
}

impl Correctness {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Correctness::Correct,
            Some(false) => Correctness::Wrong,
            None => Correctness::Unknown,
        }
    }
}

/// 一次批改快照中的一道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub content: String,
    /// 选项文本，填空/简答为空
    #[serde(default)]
    pub options: Vec<String>,
    pub correctness: Correctness,
    /// 学生当前提交的答案
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_answer: Option<String>,
}

impl QuestionRecord {
    pub fn new(
        id: impl Into<String>,
        question_type: QuestionType,
        content: impl Into<String>,
        options: Vec<String>,
        correctness: Correctness,
    ) -> Self {
        Self {
            id: id.into(),
            question_type,
            content: content.into(),
            options,
            correctness,
            submitted_answer: None,
        }
    }

    pub fn with_submitted(mut self, answer: impl Into<String>) -> Self {
        self.submitted_answer = Some(answer.into());
        self
    }

    pub fn is_wrong(&self) -> bool {
        self.correctness == Correctness::Wrong
    }
}

/// 批改结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingStats {
    pub total: usize,
    pub correct: usize,
    pub wrong: usize,
    pub unknown: usize,
    /// 正确率（百分比，四舍五入）
    pub accuracy_percent: u32,
}

impl GradingStats {
    pub fn from_snapshot(records: &[QuestionRecord]) -> Self {
        let mut stats = GradingStats {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.correctness {
                Correctness::Correct => stats.correct += 1,
                Correctness::Wrong => stats.wrong += 1,
                Correctness::Unknown => stats.unknown += 1,
            }
        }
        if stats.total > 0 {
            stats.accuracy_percent =
                ((stats.correct as f64 / stats.total as f64) * 100.0).round() as u32;
        }
        stats
    }
}
