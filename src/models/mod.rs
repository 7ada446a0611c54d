pub mod course;
pub mod progress;
pub mod user;

pub use course::{Analytics, Course, Enrollment, NewCourseRequest, UpdateCourseRequest};
pub use progress::{Certificate, ProgressRecord};
pub use user::{Role, User, UserPatch};
