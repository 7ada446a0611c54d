pub mod course_deletion;

pub use course_deletion::{CourseDeletionService, DeletionReport};
