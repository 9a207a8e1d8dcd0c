pub mod completion;
pub mod course;
pub mod document;
pub mod selectors;

pub use completion::{CompletionChoice, CompletionResponse};
pub use course::{MigrationDescriptor, MigrationProgress, PreAttachment, PublishedQuiz, QuizSummary, WorkflowState};
pub use document::{FolderBatch, SourceDocument};
pub use selectors::OcrSelectors;
