use serde::{Deserialize, Serialize};
use validator::Validate;

/// Push-style mirror of the roster service's view of one course.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CourseSyncRequest {
    #[validate(length(min = 1, message = "id must not be empty"))]
    pub(crate) id: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(alias = "instructorId")]
    #[validate(length(min = 1, message = "instructor_id must not be empty"))]
    pub(crate) instructor_id: String,
    #[serde(default)]
    #[serde(alias = "studentIds")]
    pub(crate) student_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CourseSyncResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) instructor_id: String,
    pub(crate) enrolled_count: i64,
}
