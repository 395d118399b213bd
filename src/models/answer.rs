//! 答案指纹
//!
//! 同一个答案可能有多种写法（字母、下标、"对"/"正确"……），
//! 这里统一转换成唯一的指纹字符串，缓存去重和填充答案都只认指纹。
//!
//! 规则：
//! - 单选：0 开始的选项下标，如 `"2"`
//! - 多选：排序去重后的下标，逗号连接，如 `"0,2,3"`
//! - 判断：`"correct"` / `"incorrect"`
//! - 填空/简答：去掉首尾空白的原文

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnswerFormatError;
use crate::models::QuestionType;

pub const BOOLEAN_TRUE: &str = "correct";
pub const BOOLEAN_FALSE: &str = "incorrect";

const TRUE_TOKENS: &[&str] = &[
    "对", "正确", "true", "t", "1", "√", "✓", "✔", "yes", "correct", "是",
];
const FALSE_TOKENS: &[&str] = &[
    "错", "错误", "false", "f", "0", "×", "✗", "✘", "x", "no", "incorrect", "否",
];

const OPTION_SEPARATORS: &[char] = &[',', '，', '、', ';', '；', '|', ' ', '\t', '\n'];

/// 答案指纹
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 直接由存储中的字符串构造（不做校验）
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn for_option(index: usize) -> Self {
        Self(index.to_string())
    }

    pub fn for_options(indices: &[usize]) -> Self {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Self(
            sorted
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    pub fn for_boolean(value: bool) -> Self {
        Self(if value { BOOLEAN_TRUE } else { BOOLEAN_FALSE }.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 选择题指纹对应的选项下标
    pub fn option_indices(&self) -> Vec<usize> {
        self.0
            .split(',')
            .filter_map(|s| s.parse::<usize>().ok())
            .collect()
    }

    /// 检查选项下标是否越界（只对选择题有效）
    pub fn check_bounds(
        &self,
        question_type: QuestionType,
        option_count: usize,
    ) -> Result<(), AnswerFormatError> {
        if !question_type.has_options() || option_count == 0 {
            return Ok(());
        }
        match self.option_indices().into_iter().find(|&i| i >= option_count) {
            Some(index) => Err(AnswerFormatError::OptionOutOfRange {
                index,
                option_count,
            }),
            None => Ok(()),
        }
    }

    /// 转换为填充到平台的答案文本
    pub fn to_answer(&self, question_type: QuestionType) -> String {
        match question_type {
            QuestionType::Single | QuestionType::Multi => self
                .option_indices()
                .into_iter()
                .map(|i| index_to_letter(i).to_string())
                .collect::<Vec<_>>()
                .join(","),
            QuestionType::Boolean => {
                if self.0 == BOOLEAN_TRUE {
                    "对".to_string()
                } else {
                    "错".to_string()
                }
            }
            QuestionType::Blank | QuestionType::Essay => self.0.clone(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 选项下标转字母（0 → A）
pub fn index_to_letter(index: usize) -> char {
    if index < 26 {
        (b'A' + index as u8) as char
    } else {
        '?'
    }
}

/// 把任意写法的答案规范化为指纹
pub fn normalize_answer(
    raw: &str,
    question_type: QuestionType,
) -> Result<Fingerprint, AnswerFormatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AnswerFormatError::Empty);
    }

    match question_type {
        QuestionType::Single => {
            let indices = parse_option_tokens(trimmed)?;
            match indices.as_slice() {
                [index] => Ok(Fingerprint::for_option(*index)),
                _ => Err(AnswerFormatError::UnrecognizedOption(trimmed.to_string())),
            }
        }
        QuestionType::Multi => {
            let indices = parse_option_tokens(trimmed)?;
            Ok(Fingerprint::for_options(&indices))
        }
        QuestionType::Boolean => parse_boolean(trimmed).map(Fingerprint::for_boolean),
        QuestionType::Blank | QuestionType::Essay => Ok(Fingerprint(trimmed.to_string())),
    }
}

/// 如果答案就是某个选项的原文，换成该选项的字母
pub fn match_option_text(raw: &str, options: &[String]) -> Option<char> {
    let target = raw.trim();
    if target.is_empty() {
        return None;
    }
    options
        .iter()
        .position(|opt| opt.trim() == target)
        .map(index_to_letter)
}

fn parse_boolean(token: &str) -> Result<bool, AnswerFormatError> {
    let lowered = token
        .trim_end_matches(['.', '。'])
        .trim()
        .to_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) || lowered == "a" {
        Ok(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) || lowered == "b" {
        Ok(false)
    } else {
        Err(AnswerFormatError::UnrecognizedBoolean(token.to_string()))
    }
}

fn parse_option_tokens(raw: &str) -> Result<Vec<usize>, AnswerFormatError> {
    let mut indices = Vec::new();
    for token in raw.split(OPTION_SEPARATORS) {
        let token = token
            .trim()
            .trim_end_matches(['.', '．', '、', ')', '）'])
            .trim_start_matches(['(', '（']);
        if token.is_empty() {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            let index = token
                .parse::<usize>()
                .map_err(|_| AnswerFormatError::UnrecognizedOption(token.to_string()))?;
            indices.push(index);
        } else if token.chars().all(|c| c.is_ascii_alphabetic()) {
            for c in token.chars() {
                indices.push((c.to_ascii_uppercase() as u8 - b'A') as usize);
            }
        } else {
            return Err(AnswerFormatError::UnrecognizedOption(token.to_string()));
        }
    }
    if indices.is_empty() {
        return Err(AnswerFormatError::Empty);
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}
