use async_trait::async_trait;
use tracing::debug;

use crate::db::KvStore;
use crate::error::AppError;
use crate::models::Course;
use crate::persistence::PersistenceBackend;

pub const CATALOG_KEY: &str = "course_catalog.courses";

/// Keeps the serialized catalog under a single key of the local store.
#[derive(Clone, Debug)]
pub struct LocalStoreBackend {
    store: KvStore,
}

impl LocalStoreBackend {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistenceBackend for LocalStoreBackend {
    async fn load(&self) -> Result<Option<Vec<Course>>, AppError> {
        self.store.get_json::<Vec<Course>>(CATALOG_KEY).await
    }

    async fn save(&self, catalog: &[Course]) -> Result<(), AppError> {
        self.store.set_json(CATALOG_KEY, catalog).await?;
        debug!("saved {} courses to local store", catalog.len());
        Ok(())
    }

    async fn erase(&self) -> Result<(), AppError> {
        self.store.remove(CATALOG_KEY).await?;
        Ok(())
    }
}
