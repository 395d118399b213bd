pub mod answer;
pub mod backend;
pub mod question;
pub mod session;

pub use answer::{index_to_letter, match_option_text, normalize_answer, Fingerprint};
pub use backend::{
    ExistenceStatus, GeneratedAnswer, GenerationRequest, SearchResult, UploadItem, UploadPayload,
    UploadReason, UploadReceipt,
};
pub use question::{Correctness, GradingStats, QuestionRecord, QuestionType};
pub use session::{AbortReason, CorrectionSession, CorrectionSummary, Outcome, QuestionReport};
