use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::db::KvStore;
use crate::error::AppError;
use crate::models::{Certificate, ProgressRecord};

pub const PROGRESS_KEY: &str = "course_catalog.progress";
pub const CERTIFICATES_KEY: &str = "course_catalog.certificates";

#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Removes every progress record and certificate for the course.
    /// Idempotent.
    async fn cleanup_course_data(&self, course_id: u64) -> Result<(), AppError>;
}

/// Per-user lesson progress and completion certificates in the local store.
#[derive(Clone, Debug)]
pub struct LocalProgressTracker {
    store: KvStore,
}

impl LocalProgressTracker {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Marks a lesson complete and recomputes the completion percentage.
    /// A certificate is issued the first time the course reaches 100%.
    pub async fn record_lesson(
        &self,
        user_id: &str,
        course_id: u64,
        lesson: &str,
        total_lessons: usize,
    ) -> Result<ProgressRecord, AppError> {
        let mut records = self.progress().await?;
        let position = records
            .iter()
            .position(|r| r.user_id == user_id && r.course_id == course_id);
        let index = match position {
            Some(index) => index,
            None => {
                records.push(ProgressRecord {
                    user_id: user_id.to_string(),
                    course_id,
                    completed_lessons: Vec::new(),
                    percent: 0,
                    updated_at: Utc::now(),
                });
                records.len() - 1
            }
        };

        let record = &mut records[index];
        if !record.completed_lessons.iter().any(|l| l == lesson) {
            record.completed_lessons.push(lesson.to_string());
        }
        record.percent = completion_percent(record.completed_lessons.len(), total_lessons);
        record.updated_at = Utc::now();
        let record = record.clone();

        self.store.set_json(PROGRESS_KEY, &records).await?;

        if record.percent == 100 {
            self.issue_certificate(user_id, course_id).await?;
        }
        Ok(record)
    }

    pub async fn issue_certificate(&self, user_id: &str, course_id: u64) -> Result<Certificate, AppError> {
        let mut certificates = self.certificates().await?;
        if let Some(existing) = certificates
            .iter()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
        {
            return Ok(existing.clone());
        }

        let certificate = Certificate {
            user_id: user_id.to_string(),
            course_id,
            issued_at: Utc::now(),
        };
        certificates.push(certificate.clone());
        self.store.set_json(CERTIFICATES_KEY, &certificates).await?;

        info!("issued certificate for course {} to user {}", course_id, user_id);
        Ok(certificate)
    }

    pub async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>, AppError> {
        let records = self.progress().await?;
        Ok(records.into_iter().filter(|r| r.user_id == user_id).collect())
    }

    pub async fn certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>, AppError> {
        let certificates = self.certificates().await?;
        Ok(certificates.into_iter().filter(|c| c.user_id == user_id).collect())
    }

    async fn progress(&self) -> Result<Vec<ProgressRecord>, AppError> {
        Ok(self
            .store
            .get_json::<Vec<ProgressRecord>>(PROGRESS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn certificates(&self) -> Result<Vec<Certificate>, AppError> {
        Ok(self
            .store
            .get_json::<Vec<Certificate>>(CERTIFICATES_KEY)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProgressTracker for LocalProgressTracker {
    async fn cleanup_course_data(&self, course_id: u64) -> Result<(), AppError> {
        let mut records = self.progress().await?;
        let before = records.len();
        records.retain(|r| r.course_id != course_id);
        if records.len() != before {
            self.store.set_json(PROGRESS_KEY, &records).await?;
        }

        let mut certificates = self.certificates().await?;
        let before_certs = certificates.len();
        certificates.retain(|c| c.course_id != course_id);
        if certificates.len() != before_certs {
            self.store.set_json(CERTIFICATES_KEY, &certificates).await?;
        }

        info!(
            "cleaned up course {}: {} progress records, {} certificates",
            course_id,
            before - records.len(),
            before_certs - certificates.len()
        );
        Ok(())
    }
}

fn completion_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed.min(total) * 100) / total) as u8
}
