//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责多轮纠错的调度，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! correction_orchestrator (处理一份作业，多轮)
//!     ↓
//! workflow::QuestionFlow (处理单道错题的一次尝试)
//!     ↓
//! services (能力层：cache / strategy / candidate / verifier / deduper)
//!     ↓
//! clients + storage (外部协作方)
//! ```
//!
//! ## 设计原则
//!
//! 1. **依赖注入**：所有外部协作方通过 `Collaborators` 传入，便于测试
//! 2. **向下依赖**：编排层 → workflow → services → clients
//! 3. **无业务判断**：只做调度和统计，策略选择和去重都在能力层

pub mod correction_orchestrator;

pub use correction_orchestrator::{Collaborators, CorrectionOrchestrator};
