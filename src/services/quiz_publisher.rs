//! 测验发布 - 业务能力层
//!
//! 创建迁移任务 → 上传题目包 → 轮询进度 → 找到新建的测验 → 改名并发布。
//! 改名规则：`<tag> <n>`，`n` 为同前缀测验标题末尾数字的最大值加一。
//! 发布成功后写出 `final.published.json`，再次运行时据此跳过。

use crate::clients::CourseApi;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::{PublishedQuiz, QuizSummary, SourceDocument, WorkflowState};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationOutcome {
    Published {
        quiz_id: u64,
        title: String,
        url: String,
    },
    /// 迁移完成但课程下没有任何测验
    NoQuizCreated,
    /// 发布记录已存在
    AlreadyPublished(PathBuf),
    /// 没有题目包
    MissingPackage,
}

fn write_publication_record(path: &Path, record: &PublishedQuiz) -> AppResult<()> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json).map_err(|e| AppError::file_write_failed(path, e))
}

/// 下一个测验编号：标题以 `tag` 开头的测验中，末尾数字的最大值加一；没有则为 1
pub fn next_quiz_number(quizzes: &[QuizSummary], tag: &str) -> u64 {
    quizzes
        .iter()
        .filter(|q| q.title.starts_with(tag))
        .filter_map(|q| q.title.split_whitespace().last()?.parse::<u64>().ok())
        .max()
        .map(|n| n + 1)
        .unwrap_or(1)
}

/// id 最大的测验视为刚导入的那个
pub fn newest_quiz(quizzes: &[QuizSummary]) -> Option<&QuizSummary> {
    quizzes.iter().max_by_key(|q| q.id)
}

pub struct QuizPublisher<'a> {
    api: &'a dyn CourseApi,
    poll_interval: Duration,
    max_polls: u32,
}

impl<'a> QuizPublisher<'a> {
    pub fn new(api: &'a dyn CourseApi, poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            api,
            poll_interval,
            max_polls,
        }
    }

    /// 发布单个文档的题目包，成功后写出发布记录
    pub async fn publish_document(&self, doc: &SourceDocument) -> AppResult<PublicationOutcome> {
        let package = doc.package_path();
        if !package.is_file() {
            return Ok(PublicationOutcome::MissingPackage);
        }
        let marker = doc.publication_marker_path();
        if marker.exists() {
            debug!("发布记录已存在: {}", marker.display());
            return Ok(PublicationOutcome::AlreadyPublished(marker));
        }

        let outcome = self.publish(&package, &doc.quiz_tag()).await?;
        if let PublicationOutcome::Published {
            quiz_id,
            title,
            url,
        } = &outcome
        {
            let record = PublishedQuiz {
                quiz_id: *quiz_id,
                title: title.clone(),
                url: url.clone(),
            };
            write_publication_record(&marker, &record)?;
        }
        Ok(outcome)
    }

    pub async fn publish(&self, package: &Path, tag: &str) -> AppResult<PublicationOutcome> {
        let package_name = package
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let migration = self.api.create_migration(&package_name).await?;
        self.api
            .upload_package(&migration.pre_attachment, package)
            .await?;
        info!("📤 已上传题目包: {}", package.display());

        self.wait_for_migration(&migration.progress_url).await?;

        let quizzes = self.api.list_quizzes().await?;
        let next = next_quiz_number(&quizzes, tag);
        let Some(quiz) = newest_quiz(&quizzes) else {
            return Ok(PublicationOutcome::NoQuizCreated);
        };

        let title = format!("{} {}", tag, next);
        self.api.rename_quiz(quiz.id, &title).await?;
        info!("已重命名测验 #{}: {}", quiz.id, title);
        self.api.publish_quiz(quiz.id).await?;

        Ok(PublicationOutcome::Published {
            quiz_id: quiz.id,
            title,
            url: self.api.quiz_url(quiz.id),
        })
    }

    /// 轮询直到 completed；failed 或超过轮询上限都视为失败
    async fn wait_for_migration(&self, progress_url: &str) -> AppResult<()> {
        for poll in 1..=self.max_polls {
            let progress = self.api.migration_progress(progress_url).await?;
            debug!(
                "迁移进度 ({}/{}): {:?}% {:?}",
                poll, self.max_polls, progress.completion, progress.workflow_state
            );

            match progress.workflow_state {
                WorkflowState::Completed => {
                    info!("✓ 迁移完成");
                    return Ok(());
                }
                WorkflowState::Failed => {
                    return Err(ApiError::MigrationFailed {
                        progress_url: progress_url.to_string(),
                    }
                    .into())
                }
                _ => {}
            }
            if poll < self.max_polls {
                sleep(self.poll_interval).await;
            }
        }

        Err(ApiError::MigrationTimedOut {
            progress_url: progress_url.to_string(),
            polls: self.max_polls,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MigrationDescriptor, MigrationProgress, PreAttachment};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    struct FakeCourse {
        states: Mutex<Vec<WorkflowState>>,
        quizzes: Vec<QuizSummary>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCourse {
        fn new(states: Vec<WorkflowState>, quizzes: Vec<QuizSummary>) -> Self {
            Self {
                states: Mutex::new(states),
                quizzes,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CourseApi for FakeCourse {
        async fn create_migration(&self, package_name: &str) -> AppResult<MigrationDescriptor> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {}", package_name));
            let mut params = Map::new();
            params.insert("Filename".to_string(), json!(package_name));
            Ok(MigrationDescriptor {
                id: Some(1),
                progress_url: "https://lms.example/api/v1/progress/1".to_string(),
                pre_attachment: PreAttachment {
                    upload_url: "https://files.example/upload".to_string(),
                    upload_params: params,
                },
            })
        }

        async fn upload_package(&self, attachment: &PreAttachment, _package: &Path) -> AppResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload {}", attachment.file_name().unwrap_or("")));
            Ok(())
        }

        async fn migration_progress(&self, _progress_url: &str) -> AppResult<MigrationProgress> {
            let mut states = self.states.lock().unwrap();
            let state = if states.len() > 1 {
                states.remove(0)
            } else {
                states[0]
            };
            Ok(MigrationProgress {
                completion: Some(50.0),
                workflow_state: state,
            })
        }

        async fn list_quizzes(&self) -> AppResult<Vec<QuizSummary>> {
            Ok(self.quizzes.clone())
        }

        async fn rename_quiz(&self, quiz_id: u64, title: &str) -> AppResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("rename {} {}", quiz_id, title));
            Ok(())
        }

        async fn publish_quiz(&self, quiz_id: u64) -> AppResult<()> {
            self.calls.lock().unwrap().push(format!("publish {}", quiz_id));
            Ok(())
        }

        fn quiz_url(&self, quiz_id: u64) -> String {
            format!("https://lms.example/courses/42/quizzes/{}", quiz_id)
        }
    }

    fn quiz(id: u64, title: &str) -> QuizSummary {
        QuizSummary {
            id,
            title: title.to_string(),
        }
    }

    #[test]
    fn test_next_quiz_number() {
        let quizzes = vec![quiz(1, "[F] 1"), quiz(2, "[F] 3"), quiz(3, "[G] 9")];
        assert_eq!(next_quiz_number(&quizzes, "[F]"), 4);
        assert_eq!(next_quiz_number(&quizzes, "[H]"), 1);
        assert_eq!(next_quiz_number(&[quiz(5, "[F] draft")], "[F]"), 1);
        assert_eq!(next_quiz_number(&[], "[F]"), 1);
    }

    #[tokio::test]
    async fn test_publish_renames_newest_quiz() {
        let course = FakeCourse::new(
            vec![WorkflowState::Queued, WorkflowState::Running, WorkflowState::Completed],
            vec![quiz(10, "[F] 1"), quiz(12, "[F] 3"), quiz(15, "Imported Quiz")],
        );
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 10);

        let outcome = publisher
            .publish(Path::new("/tmp/final.text2qti.zip"), "[F]")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PublicationOutcome::Published {
                quiz_id: 15,
                title: "[F] 4".to_string(),
                url: "https://lms.example/courses/42/quizzes/15".to_string(),
            }
        );
        assert_eq!(
            course.calls(),
            vec![
                "create final.text2qti.zip",
                "upload final.text2qti.zip",
                "rename 15 [F] 4",
                "publish 15",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_migration_stops_before_rename() {
        let course = FakeCourse::new(vec![WorkflowState::Failed], vec![quiz(1, "[F] 1")]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 10);

        let err = publisher
            .publish(Path::new("final.text2qti.zip"), "[F]")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Api(ApiError::MigrationFailed { .. })));
        assert!(!course.calls().iter().any(|c| c.starts_with("rename")));
    }

    #[tokio::test]
    async fn test_poll_ceiling() {
        let course = FakeCourse::new(vec![WorkflowState::Running], vec![]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 3);

        let err = publisher
            .publish(Path::new("final.text2qti.zip"), "[F]")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Api(ApiError::MigrationTimedOut { polls: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_no_quiz_after_migration() {
        let course = FakeCourse::new(vec![WorkflowState::Completed], vec![]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 3);

        let outcome = publisher
            .publish(Path::new("final.text2qti.zip"), "[F]")
            .await
            .unwrap();
        assert_eq!(outcome, PublicationOutcome::NoQuizCreated);
    }

    fn packaged_document(root: &Path) -> SourceDocument {
        let folder = root.join("F");
        let doc = SourceDocument::new("F", "De 01.pdf", &folder, folder.join("De 01.pdf"));
        fs::create_dir_all(doc.output_dir()).unwrap();
        fs::write(doc.package_path(), b"PK").unwrap();
        doc
    }

    #[tokio::test]
    async fn test_publish_document_writes_record_once() {
        let root = tempfile::tempdir().unwrap();
        let doc = packaged_document(root.path());
        let course = FakeCourse::new(vec![WorkflowState::Completed], vec![quiz(7, "Imported")]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 3);

        let first = publisher.publish_document(&doc).await.unwrap();
        assert!(matches!(first, PublicationOutcome::Published { quiz_id: 7, .. }));

        let record: PublishedQuiz =
            serde_json::from_str(&fs::read_to_string(doc.publication_marker_path()).unwrap())
                .unwrap();
        assert_eq!(record.quiz_id, 7);
        assert_eq!(record.title, "[F] 1");
        assert_eq!(record.url, "https://lms.example/courses/42/quizzes/7");

        let second = publisher.publish_document(&doc).await.unwrap();
        assert_eq!(
            second,
            PublicationOutcome::AlreadyPublished(doc.publication_marker_path())
        );
        assert_eq!(
            course.calls().iter().filter(|c| c.starts_with("publish")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_publish_document_without_package() {
        let root = tempfile::tempdir().unwrap();
        let doc = SourceDocument::new("F", "a.pdf", root.path(), root.path().join("a.pdf"));
        let course = FakeCourse::new(vec![WorkflowState::Completed], vec![]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 3);

        let outcome = publisher.publish_document(&doc).await.unwrap();
        assert_eq!(outcome, PublicationOutcome::MissingPackage);
        assert!(course.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_record_when_no_quiz_created() {
        let root = tempfile::tempdir().unwrap();
        let doc = packaged_document(root.path());
        let course = FakeCourse::new(vec![WorkflowState::Completed], vec![]);
        let publisher = QuizPublisher::new(&course, Duration::ZERO, 3);

        let outcome = publisher.publish_document(&doc).await.unwrap();
        assert_eq!(outcome, PublicationOutcome::NoQuizCreated);
        assert!(!doc.publication_marker_path().exists());
    }
}
