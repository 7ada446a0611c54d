use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{Analytics, Course, Enrollment, NewCourseRequest, UpdateCourseRequest};
use crate::persistence::PersistenceBackend;

const TOP_N: usize = 3;

/// How the catalog got into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loaded,
    /// Nothing was persisted, so the built-in examples were stored.
    Seeded,
    /// The backend failed; the catalog started empty.
    Degraded(String),
}

#[derive(Debug)]
struct Catalog {
    courses: Vec<Course>,
    highest_issued: u64,
    state: LoadState,
}

impl Catalog {
    fn next_id(&self) -> u64 {
        let max_existing = self.courses.iter().map(|c| c.id).max().unwrap_or(0);
        max_existing.max(self.highest_issued) + 1
    }

    fn find(&self, id: u64) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    fn replace(&mut self, course: Course) {
        if let Some(slot) = self.courses.iter_mut().find(|c| c.id == course.id) {
            *slot = course;
        }
    }
}

/// Owns the course catalog and writes every change through to its backend.
///
/// Mutations are serialized by `writer`, which is held across backend awaits.
/// The catalog lock itself is only taken for short synchronous sections, so
/// `get_course` never waits on the network.
pub struct CourseRepository {
    backend: Arc<dyn PersistenceBackend>,
    catalog: RwLock<Catalog>,
    writer: Mutex<()>,
}

impl CourseRepository {
    /// Lazy constructor: nothing is loaded until the first operation needs it.
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            backend,
            catalog: RwLock::new(Catalog {
                courses: Vec::new(),
                highest_issued: 0,
                state: LoadState::NotLoaded,
            }),
            writer: Mutex::new(()),
        }
    }

    /// Constructs the repository and performs the initial load.
    pub async fn open(backend: Arc<dyn PersistenceBackend>) -> Self {
        let repo = Self::new(backend);
        {
            let _gate = repo.writer.lock().await;
            repo.ensure_loaded().await;
        }
        repo
    }

    pub fn load_state(&self) -> LoadState {
        self.read().state.clone()
    }

    pub async fn list_courses(&self) -> Vec<Course> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;
        self.read().courses.clone()
    }

    /// Lookup in the in-memory catalog only. Before the first load this
    /// misses courses that exist in the backend.
    pub fn get_course(&self, id: u64) -> Option<Course> {
        self.read().find(id).cloned()
    }

    pub async fn create_course(&self, req: NewCourseRequest) -> Result<Option<Course>, AppError> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;

        let id = self.read().next_id();
        let Some(course) = req.into_course(id) else {
            warn!("rejected course without a title or with an invalid price");
            return Ok(None);
        };

        self.backend.create_remote(&course).await?;

        {
            let mut catalog = self.write();
            catalog.highest_issued = catalog.highest_issued.max(id);
            catalog.courses.push(course.clone());
        }
        self.write_through("create").await;

        info!("created course {} ({})", course.id, course.title);
        Ok(Some(course))
    }

    pub async fn edit_course(
        &self,
        id: u64,
        patch: UpdateCourseRequest,
    ) -> Result<Option<Course>, AppError> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;

        let Some(mut course) = self.read().find(id).cloned() else {
            return Ok(None);
        };
        if !patch.is_valid() {
            warn!("rejected edit of course {}: blank title or invalid price", id);
            return Ok(None);
        }
        course.apply_patch(patch);

        self.sync_edit(&course).await?;
        self.write().replace(course.clone());
        self.write_through("edit").await;

        info!("edited course {}", id);
        Ok(Some(course))
    }

    pub async fn delete_course(&self, id: u64) -> Result<bool, AppError> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;

        if self.read().find(id).is_none() {
            return Ok(false);
        }

        self.backend.delete_remote(id).await?;
        self.write().courses.retain(|c| c.id != id);
        self.write_through("delete").await;

        info!("deleted course {}", id);
        Ok(true)
    }

    pub fn search_courses_by_category(&self, category: &str) -> Vec<Course> {
        if category.is_empty() {
            return Vec::new();
        }
        self.read()
            .courses
            .iter()
            .filter(|c| c.has_category(category))
            .cloned()
            .collect()
    }

    pub async fn increment_visits(&self, id: u64) -> Result<Option<u64>, AppError> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;

        let Some(mut course) = self.read().find(id).cloned() else {
            return Ok(None);
        };
        course.visits += 1;
        let visits = course.visits;

        self.sync_edit(&course).await?;
        self.write().replace(course);
        self.write_through("visit").await;

        Ok(Some(visits))
    }

    /// The user id is taken as given; it is not checked against a directory.
    pub async fn enroll_user(&self, user_id: &str, course_id: u64) -> Result<bool, AppError> {
        let _gate = self.writer.lock().await;
        self.ensure_loaded().await;

        let Some(mut course) = self.read().find(course_id).cloned() else {
            return Ok(false);
        };
        if course.is_enrolled(user_id) {
            return Ok(false);
        }
        course.students.push(Enrollment {
            user_id: user_id.to_string(),
            enrolled_at: Utc::now(),
        });

        self.sync_edit(&course).await?;
        self.write().replace(course);
        self.write_through("enroll").await;

        info!("enrolled user {} in course {}", user_id, course_id);
        Ok(true)
    }

    pub fn get_analytics(&self) -> Analytics {
        let catalog = self.read();
        let courses = &catalog.courses;

        Analytics {
            total_courses: courses.len(),
            total_enrollments: courses.iter().map(|c| c.students.len()).sum(),
            top_courses: top_by(courses, |c| c.students.len() as u64),
            top_visited: top_by(courses, |c| c.visits),
        }
    }

    /// Clears the catalog and erases the persisted copy. The catalog is not
    /// re-seeded and id numbering restarts at 1. If the backend fails to
    /// erase, the in-memory catalog is left as it was.
    pub async fn reset_all_courses(&self) -> Result<(), AppError> {
        let _gate = self.writer.lock().await;

        match self.backend.erase().await {
            Ok(()) => {}
            Err(AppError::Unsupported(op)) => {
                warn!("backend does not support {}; only the local catalog was cleared", op);
            }
            Err(e) => return Err(e),
        }

        {
            let mut catalog = self.write();
            catalog.courses.clear();
            catalog.highest_issued = 0;
            catalog.state = LoadState::Loaded;
        }

        info!("reset course catalog");
        Ok(())
    }

    /// Writes the current catalog through one last time.
    pub async fn flush(&self) -> Result<(), AppError> {
        let _gate = self.writer.lock().await;
        if self.read().state == LoadState::NotLoaded {
            return Ok(());
        }
        let snapshot = self.read().courses.clone();
        self.backend.save(&snapshot).await
    }

    // Callers must hold `writer`.
    async fn ensure_loaded(&self) {
        if self.read().state != LoadState::NotLoaded {
            return;
        }

        let (courses, state) = match self.backend.load().await {
            Ok(Some(courses)) => (courses, LoadState::Loaded),
            Ok(None) => {
                let seed = seed_courses();
                if let Err(e) = self.backend.save(&seed).await {
                    warn!("failed to persist seed catalog: {}", e);
                }
                (seed, LoadState::Seeded)
            }
            Err(e) => {
                warn!("failed to load course catalog, starting empty: {}", e);
                (Vec::new(), LoadState::Degraded(e.to_string()))
            }
        };

        info!("course catalog ready with {} courses ({:?})", courses.len(), state);
        let mut catalog = self.write();
        let max_loaded = courses.iter().map(|c| c.id).max().unwrap_or(0);
        catalog.highest_issued = catalog.highest_issued.max(max_loaded);
        catalog.courses = courses;
        catalog.state = state;
    }

    async fn sync_edit(&self, course: &Course) -> Result<(), AppError> {
        match self.backend.edit_remote(course).await {
            Ok(()) => Ok(()),
            Err(AppError::Unsupported(op)) => {
                warn!(
                    "backend does not support {}; course {} changed in the local cache only",
                    op, course.id
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn write_through(&self, op: &str) {
        let snapshot = self.read().courses.clone();
        if let Err(e) = self.backend.save(&snapshot).await {
            warn!("failed to persist catalog after {}: {}", op, e);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Highest `key` first; `sort_by` is stable so ties keep catalog order.
fn top_by(courses: &[Course], key: impl Fn(&Course) -> u64) -> Vec<Course> {
    let mut ranked = courses.to_vec();
    ranked.sort_by(|a, b| key(b).cmp(&key(a)));
    ranked.truncate(TOP_N);
    ranked
}

fn seed_courses() -> Vec<Course> {
    vec![
        Course {
            id: 1,
            title: "Introduction to Web Development".to_string(),
            description: "HTML, CSS and JavaScript from the ground up.".to_string(),
            instructor: "Jane Smith".to_string(),
            duration: "8 weeks".to_string(),
            students: Vec::new(),
            categories: vec!["web".to_string(), "beginner".to_string()],
            visits: 0,
            price: 0.0,
        },
        Course {
            id: 2,
            title: "Data Science Fundamentals".to_string(),
            description: "Statistics, data wrangling and visualisation with Python.".to_string(),
            instructor: "John Doe".to_string(),
            duration: "10 weeks".to_string(),
            students: Vec::new(),
            categories: vec!["data".to_string(), "python".to_string()],
            visits: 0,
            price: 49.99,
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::{KvStore, open_pool};
    use crate::persistence::LocalStoreBackend;
    use crate::persistence::local::CATALOG_KEY;

    async fn setup_local() -> (CourseRepository, KvStore) {
        let pool = open_pool("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        let store = KvStore::new(pool);
        let repo = CourseRepository::new(Arc::new(LocalStoreBackend::new(store.clone())));
        (repo, store)
    }

    /// Remote-style backend whose writes can be made to fail.
    #[derive(Default)]
    struct FlakyBackend {
        loads: AtomicUsize,
        fail_load: bool,
        fail_writes: bool,
        fail_save: bool,
        fail_erase: bool,
    }

    #[async_trait]
    impl PersistenceBackend for FlakyBackend {
        async fn load(&self) -> Result<Option<Vec<Course>>, AppError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(AppError::Remote { status: 503, body: "down".to_string() });
            }
            Ok(Some(vec![NewCourseRequest::titled("Remote").into_course(10).unwrap()]))
        }

        async fn save(&self, _catalog: &[Course]) -> Result<(), AppError> {
            if self.fail_save {
                return Err(AppError::InternalServerError);
            }
            Ok(())
        }

        async fn create_remote(&self, _course: &Course) -> Result<(), AppError> {
            if self.fail_writes {
                return Err(AppError::Remote { status: 500, body: "nope".to_string() });
            }
            Ok(())
        }

        async fn delete_remote(&self, _id: u64) -> Result<(), AppError> {
            if self.fail_writes {
                return Err(AppError::Remote { status: 500, body: "nope".to_string() });
            }
            Ok(())
        }

        async fn edit_remote(&self, _course: &Course) -> Result<(), AppError> {
            Err(AppError::Unsupported("edit"))
        }

        async fn erase(&self) -> Result<(), AppError> {
            if self.fail_erase {
                return Err(AppError::InternalServerError);
            }
            Err(AppError::Unsupported("reset"))
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_seeded_once() {
        let (repo, _) = setup_local().await;

        let courses = repo.list_courses().await;
        assert_eq!(courses.len(), 2);
        assert_eq!(repo.load_state(), LoadState::Seeded);
        assert_eq!(repo.list_courses().await.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_is_persisted_for_next_session() {
        let (repo, store) = setup_local().await;
        let seeded = repo.list_courses().await;

        let reopened = CourseRepository::open(Arc::new(LocalStoreBackend::new(store))).await;
        assert_eq!(reopened.load_state(), LoadState::Loaded);
        assert_eq!(reopened.list_courses().await, seeded);
    }

    #[tokio::test]
    async fn test_list_courses_loads_only_once() {
        let backend = Arc::new(FlakyBackend::default());
        let repo = CourseRepository::new(backend.clone());

        assert_eq!(repo.list_courses().await.len(), 1);
        assert_eq!(repo.list_courses().await.len(), 1);
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_course_does_not_trigger_load() {
        let backend = Arc::new(FlakyBackend::default());
        let repo = CourseRepository::new(backend.clone());

        assert!(repo.get_course(10).is_none());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 0);

        repo.list_courses().await;
        assert!(repo.get_course(10).is_some());
    }

    #[tokio::test]
    async fn test_failed_load_degrades_to_empty_catalog() {
        let backend = Arc::new(FlakyBackend {
            fail_load: true,
            ..FlakyBackend::default()
        });
        let repo = CourseRepository::open(backend.clone()).await;

        assert!(repo.list_courses().await.is_empty());
        assert!(matches!(repo.load_state(), LoadState::Degraded(_)));
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_create_failure_leaves_catalog_untouched() {
        let backend = Arc::new(FlakyBackend {
            fail_writes: true,
            ..FlakyBackend::default()
        });
        let repo = CourseRepository::open(backend).await;

        let result = repo.create_course(NewCourseRequest::titled("Offline")).await;
        assert!(matches!(result, Err(AppError::Remote { status: 500, .. })));
        assert_eq!(repo.list_courses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_delete_failure_keeps_course() {
        let backend = Arc::new(FlakyBackend {
            fail_writes: true,
            ..FlakyBackend::default()
        });
        let repo = CourseRepository::open(backend).await;

        assert!(repo.delete_course(10).await.is_err());
        assert!(repo.get_course(10).is_some());
    }

    #[tokio::test]
    async fn test_unsupported_remote_edit_still_updates_cache() {
        let repo = CourseRepository::open(Arc::new(FlakyBackend::default())).await;

        let patch = UpdateCourseRequest {
            instructor: Some("Dr. Rivera".to_string()),
            ..UpdateCourseRequest::default()
        };
        let edited = repo
            .edit_course(10, patch)
            .await
            .expect("edit should not fail")
            .expect("course exists");
        assert_eq!(edited.instructor, "Dr. Rivera");
        assert_eq!(repo.increment_visits(10).await.unwrap(), Some(1));
        assert!(repo.enroll_user("u1", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_deleting_newest() {
        let (repo, _) = setup_local().await;
        repo.reset_all_courses().await.expect("Failed to reset");

        let first = repo.create_course(NewCourseRequest::titled("A")).await.unwrap().unwrap();
        let second = repo.create_course(NewCourseRequest::titled("B")).await.unwrap().unwrap();
        assert!(repo.delete_course(second.id).await.unwrap());

        let third = repo.create_course(NewCourseRequest::titled("C")).await.unwrap().unwrap();
        assert_eq!(first.id, 1);
        assert!(third.id > second.id);
    }

    #[tokio::test]
    async fn test_edit_rejects_blank_title() {
        let (repo, _) = setup_local().await;
        repo.list_courses().await;

        let patch = UpdateCourseRequest {
            title: Some(" ".to_string()),
            ..UpdateCourseRequest::default()
        };
        assert!(repo.edit_course(1, patch).await.unwrap().is_none());
        assert_eq!(repo.get_course(1).unwrap().title, "Introduction to Web Development");
    }

    #[tokio::test]
    async fn test_reset_does_not_reseed() {
        let (repo, store) = setup_local().await;
        repo.list_courses().await;

        repo.reset_all_courses().await.expect("Failed to reset");
        assert!(repo.list_courses().await.is_empty());
        assert_eq!(store.get(CATALOG_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_on_remote_backend_clears_local_cache() {
        let repo = CourseRepository::open(Arc::new(FlakyBackend::default())).await;

        repo.reset_all_courses().await.expect("unsupported erase is not an error");
        assert!(repo.list_courses().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_restarts_id_numbering() {
        let (repo, _) = setup_local().await;
        assert_eq!(repo.list_courses().await.len(), 2);

        repo.reset_all_courses().await.expect("Failed to reset");
        let fresh = repo
            .create_course(NewCourseRequest::titled("Fresh"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fresh.id, 1);
    }

    #[tokio::test]
    async fn test_failed_erase_keeps_catalog() {
        let backend = Arc::new(FlakyBackend {
            fail_erase: true,
            ..FlakyBackend::default()
        });
        let repo = CourseRepository::open(backend).await;

        let result = repo.reset_all_courses().await;
        assert!(matches!(result, Err(AppError::InternalServerError)));
        assert_eq!(repo.list_courses().await.len(), 1);
        assert!(repo.get_course(10).is_some());
    }

    #[tokio::test]
    async fn test_save_failures_do_not_fail_mutations() {
        let backend = Arc::new(FlakyBackend {
            fail_save: true,
            ..FlakyBackend::default()
        });
        let repo = CourseRepository::open(backend).await;

        let created = repo
            .create_course(NewCourseRequest::titled("Unsaved"))
            .await
            .expect("save failure is not surfaced")
            .expect("course accepted");
        assert_eq!(created.id, 11);

        let patch = UpdateCourseRequest {
            duration: Some("2 weeks".to_string()),
            ..UpdateCourseRequest::default()
        };
        let edited = repo.edit_course(created.id, patch).await.unwrap().unwrap();
        assert_eq!(edited.duration, "2 weeks");

        assert!(repo.enroll_user("u1", created.id).await.unwrap());
        assert!(repo.get_course(created.id).unwrap().is_enrolled("u1"));

        assert!(repo.delete_course(10).await.unwrap());
        let ids: Vec<u64> = repo.list_courses().await.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![created.id]);
    }

    #[tokio::test]
    async fn test_corrupt_store_degrades_without_seeding() {
        let (_, store) = setup_local().await;
        store.set(CATALOG_KEY, "[{").await.expect("Failed to set");

        let repo = CourseRepository::open(Arc::new(LocalStoreBackend::new(store.clone()))).await;

        assert!(matches!(repo.load_state(), LoadState::Degraded(_)));
        assert!(repo.list_courses().await.is_empty());
        assert_eq!(
            store.get(CATALOG_KEY).await.unwrap().as_deref(),
            Some("[{")
        );
    }
}
