pub mod local;
pub mod remote;

pub use local::LocalStoreBackend;
pub use remote::{CourseApiConfig, HttpCourseBackend};

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::Course;

/// Storage behind the course repository.
///
/// `save` mirrors the whole catalog; the `*_remote` hooks are the per-record
/// writes a remote API acknowledges before the repository commits locally.
/// Backends that mirror through `save` alone keep the default no-op hooks.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// `Ok(None)` means nothing has ever been persisted.
    async fn load(&self) -> Result<Option<Vec<Course>>, AppError>;

    async fn save(&self, catalog: &[Course]) -> Result<(), AppError>;

    async fn create_remote(&self, _course: &Course) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete_remote(&self, _id: u64) -> Result<(), AppError> {
        Ok(())
    }

    async fn edit_remote(&self, _course: &Course) -> Result<(), AppError> {
        Ok(())
    }

    async fn erase(&self) -> Result<(), AppError>;
}
