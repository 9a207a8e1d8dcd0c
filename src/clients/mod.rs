pub mod canvas_client;
pub mod llm_client;

pub use canvas_client::{CanvasClient, CourseApi};
pub use llm_client::{CompletionService, OpenAiCompletion};
