use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, ExamStatus, QuestionKind};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Course {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) instructor_id: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) instructor_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) open_at: PrimitiveDateTime,
    pub(crate) close_at: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) show_answers: bool,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) passing_score: f64,
    pub(crate) total_weight: f64,
    pub(crate) status: ExamStatus,
    pub(crate) graded_attempts: i64,
    pub(crate) average_percentage: f64,
    pub(crate) passed_count: i64,
    pub(crate) failed_count: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

/// One selectable option of a multiple-choice question, stored inline on the
/// question row. At most one option carries `is_correct`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Json<Vec<QuestionOption>>,
    pub(crate) correct_value: Option<String>,
    pub(crate) weight: f64,
    pub(crate) display_order: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Per-question grading record embedded in the attempt row. `correct` stays
/// `None` for short-answer/essay questions until an instructor grades them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerRecord {
    pub(crate) question_id: String,
    pub(crate) value: Option<String>,
    pub(crate) correct: Option<bool>,
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

impl AnswerRecord {
    pub(crate) fn empty(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            value: None,
            correct: None,
            score: 0.0,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) answers: Json<Vec<AnswerRecord>>,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) elapsed_minutes: Option<i32>,
    pub(crate) feedback: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
