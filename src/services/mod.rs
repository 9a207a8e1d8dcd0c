pub mod archive_merger;
pub mod folder_scanner;
pub mod image_extractor;
pub mod ocr_driver;
pub mod question_generator;
pub mod quiz_packager;
pub mod quiz_publisher;
pub mod warn_writer;

pub use archive_merger::MergeReport;
pub use folder_scanner::scan_folders;
pub use image_extractor::{externalize_images, ImageCounter};
pub use ocr_driver::{DriveOutcome, ExtractionState, OcrDriver};
pub use question_generator::{GenerationOutcome, QuestionGenerator};
pub use quiz_packager::{PackagingOutcome, QuizPackager};
pub use quiz_publisher::{PublicationOutcome, QuizPublisher};
pub use warn_writer::WarnWriter;
