//! 答案生成策略选择
//!
//! 纯函数，不做任何 IO：
//!
//! | 题型 | 条件 | 策略 |
//! |---|---|---|
//! | 单选 | 第一次 | 直接查询（题库/AI） |
//! | 单选 | 之后，选项 ≤ 4 | 排除法（按顺序枚举未试过的选项） |
//! | 单选 | 之后，选项 > 4 | AI 排除（把错误选项告诉 AI） |
//! | 判断 | 任意 | 翻转 |
//! | 多选/填空/简答 | 任意 | AI 排除 |

use std::fmt;

use crate::models::QuestionType;

/// 选项数不超过该值时直接枚举，比调用 AI 更便宜
pub const ELIMINATION_MAX_OPTIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectLookup,
    Elimination,
    AiExclusion,
    Toggle,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::DirectLookup => "直接查询",
            Strategy::Elimination => "排除法",
            Strategy::AiExclusion => "AI排除",
            Strategy::Toggle => "翻转",
        };
        f.write_str(name)
    }
}

/// 选择下一次尝试的策略
///
/// # 参数
/// - `question_type`: 题型
/// - `option_count`: 选项数量（填空/简答为 0）
/// - `attempted_count`: 已尝试过的答案数量（包含缓存中的历史记录）
pub fn select_strategy(
    question_type: QuestionType,
    option_count: usize,
    attempted_count: usize,
) -> Strategy {
    match question_type {
        QuestionType::Single if attempted_count == 0 => Strategy::DirectLookup,
        QuestionType::Single if option_count <= ELIMINATION_MAX_OPTIONS => Strategy::Elimination,
        QuestionType::Single => Strategy::AiExclusion,
        QuestionType::Boolean => Strategy::Toggle,
        QuestionType::Multi | QuestionType::Blank | QuestionType::Essay => Strategy::AiExclusion,
    }
}
