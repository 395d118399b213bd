//! 业务能力层（Services）
//!
//! 每个服务只描述"我能做什么"，不关心轮次和流程顺序。

pub mod attempt_cache;
pub mod candidate_service;
pub mod correction_journal;
pub mod grading_verifier;
pub mod strategy;
pub mod upload_deduper;

pub use attempt_cache::{AttemptCache, AttemptRecord};
pub use candidate_service::{Candidate, CandidateOutcome, CandidateService};
pub use correction_journal::{CorrectionJournal, JournalEntry};
pub use grading_verifier::{parse_snapshot, GradingVerifier};
pub use strategy::{select_strategy, Strategy};
pub use upload_deduper::{partition, UploadDeduper, UploadPlan};
