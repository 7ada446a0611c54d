use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_DESCRIPTION: &str = "No description available";
pub const DEFAULT_INSTRUCTOR: &str = "TBA";
pub const DEFAULT_DURATION: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: u64,
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_instructor")]
    pub instructor: String,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub students: Vec<Enrollment>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub visits: u64,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub user_id: String,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructor: Option<String>,
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_categories")]
    pub categories: Option<Vec<String>>,
    pub price: Option<f64>,
}

/// Shallow patch applied by `edit_course`. Categories are merged, everything
/// else overwrites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructor: Option<String>,
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_categories")]
    pub categories: Option<Vec<String>>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_courses: usize,
    pub total_enrollments: usize,
    pub top_courses: Vec<Course>,
    pub top_visited: Vec<Course>,
}

impl Course {
    pub fn is_enrolled(&self, user_id: &str) -> bool {
        self.students.iter().any(|s| s.user_id == user_id)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Set union into the existing categories, keeping first-seen order.
    pub fn merge_categories(&mut self, incoming: Vec<String>) {
        for category in incoming {
            if !self.has_category(&category) {
                self.categories.push(category);
            }
        }
    }

    pub fn apply_patch(&mut self, patch: UpdateCourseRequest) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(instructor) = patch.instructor {
            self.instructor = instructor;
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(categories) = patch.categories {
            self.merge_categories(categories);
        }
    }
}

impl NewCourseRequest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Builds the stored record, or `None` when the request lacks a usable
    /// title or carries an invalid price.
    pub fn into_course(self, id: u64) -> Option<Course> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let price = self.price.unwrap_or(0.0);
        if !is_valid_price(price) {
            return None;
        }

        let mut course = Course {
            id,
            title,
            description: self.description.unwrap_or_else(default_description),
            instructor: self.instructor.unwrap_or_else(default_instructor),
            duration: self.duration.unwrap_or_else(default_duration),
            students: Vec::new(),
            categories: Vec::new(),
            visits: 0,
            price,
        };
        course.merge_categories(self.categories.unwrap_or_default());
        Some(course)
    }
}

impl UpdateCourseRequest {
    pub fn is_valid(&self) -> bool {
        let title_ok = self.title.as_ref().is_none_or(|t| !t.trim().is_empty());
        let price_ok = self.price.is_none_or(is_valid_price);
        title_ok && price_ok
    }
}

pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_instructor() -> String {
    DEFAULT_INSTRUCTOR.to_string()
}

fn default_duration() -> String {
    DEFAULT_DURATION.to_string()
}

/// Any non-array `categories` value reads as an empty set; non-text entries
/// are dropped.
fn lenient_categories<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let categories = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(Some(categories))
}
