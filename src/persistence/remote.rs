use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::models::Course;
use crate::persistence::PersistenceBackend;

#[derive(Clone, Debug)]
pub struct CourseApiConfig {
    pub base_url: String,
}

impl CourseApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteCourseRequest {
    id: u64,
}

/// Remote course API: `GET /courses`, `POST /courses/add`,
/// `DELETE /courses/delete`. There are no endpoints for edits, enrollments,
/// visit counts or a bulk reset.
pub struct HttpCourseBackend {
    client: Client,
    config: CourseApiConfig,
}

impl HttpCourseBackend {
    pub fn new(config: CourseApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Remote { status, body })
}

#[async_trait]
impl PersistenceBackend for HttpCourseBackend {
    async fn load(&self) -> Result<Option<Vec<Course>>, AppError> {
        let response = self.client.get(self.url("/courses")).send().await?;
        let response = ensure_success(response).await?;

        let courses = response.json::<Vec<Course>>().await?;
        info!("fetched {} courses from course API", courses.len());
        Ok(Some(courses))
    }

    async fn save(&self, _catalog: &[Course]) -> Result<(), AppError> {
        // The API only accepts per-record writes.
        Ok(())
    }

    async fn create_remote(&self, course: &Course) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.url("/courses/add"))
            .json(course)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_remote(&self, id: u64) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.url("/courses/delete"))
            .json(&DeleteCourseRequest { id })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn edit_remote(&self, _course: &Course) -> Result<(), AppError> {
        Err(AppError::Unsupported("edit"))
    }

    async fn erase(&self) -> Result<(), AppError> {
        Err(AppError::Unsupported("reset"))
    }
}
