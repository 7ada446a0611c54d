use std::sync::Arc;

use sqlx::SqlitePool;

use crate::repository::CourseRepository;
use crate::services::CourseDeletionService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub courses: Arc<CourseRepository>,
    pub deletion: Arc<CourseDeletionService>,
}
