use async_trait::async_trait;
use tracing::info;

use crate::db::KvStore;
use crate::error::AppError;
use crate::models::{User, UserPatch};

pub const USERS_KEY: &str = "course_catalog.users";

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    /// Applies `patch` to the stored copy of `user`. `Ok(None)` when the user
    /// is no longer in the directory.
    async fn update_user(&self, user: &User, patch: UserPatch) -> Result<Option<User>, AppError>;
}

/// User directory kept as one JSON document in the local store.
#[derive(Clone, Debug)]
pub struct LocalUserDirectory {
    store: KvStore,
}

impl LocalUserDirectory {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn upsert_user(&self, user: User) -> Result<(), AppError> {
        let mut users = self.load().await?;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        self.store.set_json(USERS_KEY, &users).await
    }

    async fn load(&self) -> Result<Vec<User>, AppError> {
        Ok(self.store.get_json::<Vec<User>>(USERS_KEY).await?.unwrap_or_default())
    }
}

#[async_trait]
impl UserDirectory for LocalUserDirectory {
    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.load().await
    }

    async fn update_user(&self, user: &User, patch: UserPatch) -> Result<Option<User>, AppError> {
        let mut users = self.load().await?;
        let Some(stored) = users.iter_mut().find(|u| u.id == user.id) else {
            return Ok(None);
        };
        stored.apply_patch(patch);
        let updated = stored.clone();

        self.store.set_json(USERS_KEY, &users).await?;
        info!("updated user {}", updated.id);
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_pool;
    use crate::models::Role;

    async fn setup_directory() -> LocalUserDirectory {
        let pool = open_pool("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        LocalUserDirectory::new(KvStore::new(pool))
    }

    fn student(id: &str, courses: Vec<u64>) -> User {
        User {
            id: id.to_string(),
            name: format!("Student {}", id),
            email: format!("{}@example.com", id),
            role: Role::Student,
            enrolled_courses: courses,
        }
    }

    #[tokio::test]
    async fn test_empty_directory_lists_nothing() {
        let directory = setup_directory().await;
        assert!(directory.list_users().await.expect("Failed to list").is_empty());
    }

    #[tokio::test]
    async fn test_update_user_applies_shallow_patch() {
        let directory = setup_directory().await;
        let user = student("u1", vec![1, 2]);
        directory.upsert_user(user.clone()).await.expect("Failed to upsert");

        let patch = UserPatch {
            enrolled_courses: Some(vec![2]),
            ..UserPatch::default()
        };
        let updated = directory
            .update_user(&user, patch)
            .await
            .expect("Failed to update")
            .expect("User not found");

        assert_eq!(updated.enrolled_courses, vec![2]);
        assert_eq!(updated.name, user.name);
        assert_eq!(directory.list_users().await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn test_update_unknown_user_returns_none() {
        let directory = setup_directory().await;
        let ghost = student("ghost", vec![]);

        let result = directory.update_user(&ghost, UserPatch::default()).await.unwrap();
        assert!(result.is_none());
    }
}
