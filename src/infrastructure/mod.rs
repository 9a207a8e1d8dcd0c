pub mod js_executor;
pub mod page_controller;

pub use js_executor::JsExecutor;
pub use page_controller::{ChromiumPage, PageController, WaitCondition, WaitOutcome};
