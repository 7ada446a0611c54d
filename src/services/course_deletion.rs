use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::UserPatch;
use crate::progress::ProgressTracker;
use crate::repository::CourseRepository;
use crate::users::UserDirectory;

/// Removes a course together with everything that references it.
pub struct CourseDeletionService {
    courses: Arc<CourseRepository>,
    progress: Arc<dyn ProgressTracker>,
    users: Arc<dyn UserDirectory>,
}

/// Outcome of a cascading delete. The course itself is gone whenever a report
/// is returned; `failures` lists the follow-up steps that did not complete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub course_id: u64,
    pub progress_cleaned: bool,
    pub users_updated: usize,
    pub failures: Vec<String>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl CourseDeletionService {
    pub fn new(
        courses: Arc<CourseRepository>,
        progress: Arc<dyn ProgressTracker>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            courses,
            progress,
            users,
        }
    }

    /// `Ok(None)` when the course does not exist; nothing is cascaded then.
    /// Failures after the course is removed do not roll it back.
    pub async fn course_deletion(&self, course_id: u64) -> Result<Option<DeletionReport>, AppError> {
        info!("Step 1: Deleting course {}", course_id);
        if !self.courses.delete_course(course_id).await? {
            return Ok(None);
        }

        let mut report = DeletionReport {
            course_id,
            progress_cleaned: false,
            users_updated: 0,
            failures: Vec::new(),
        };

        info!("Step 2: Cleaning up progress and certificates");
        match self.progress.cleanup_course_data(course_id).await {
            Ok(()) => report.progress_cleaned = true,
            Err(e) => {
                warn!("progress cleanup for course {} failed: {}", course_id, e);
                report.failures.push(format!("progress cleanup: {}", e));
            }
        }

        info!("Step 3: Removing enrollments from students");
        self.unenroll_students(course_id, &mut report).await;

        if report.is_complete() {
            info!("Course {} deleted, {} students updated", course_id, report.users_updated);
        } else {
            warn!("Course {} deleted with {} follow-up failures", course_id, report.failures.len());
        }
        Ok(Some(report))
    }

    async fn unenroll_students(&self, course_id: u64, report: &mut DeletionReport) {
        let users = match self.users.list_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("listing users for course {} cleanup failed: {}", course_id, e);
                report.failures.push(format!("list users: {}", e));
                return;
            }
        };

        for user in users.iter().filter(|u| u.is_student()) {
            if !user.enrolled_courses.contains(&course_id) {
                continue;
            }
            let remaining: Vec<u64> = user
                .enrolled_courses
                .iter()
                .copied()
                .filter(|id| *id != course_id)
                .collect();
            let patch = UserPatch {
                enrolled_courses: Some(remaining),
                ..UserPatch::default()
            };

            match self.users.update_user(user, patch).await {
                Ok(Some(_)) => report.users_updated += 1,
                Ok(None) => {
                    warn!("user {} disappeared during course {} cleanup", user.id, course_id);
                    report.failures.push(format!("update user {}: not found", user.id));
                }
                Err(e) => {
                    warn!("updating user {} failed: {}", user.id, e);
                    report.failures.push(format!("update user {}: {}", user.id, e));
                }
            }
        }
    }
}
