use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::types::{ExamStatus, QuestionKind};
use crate::services::availability::AvailabilitySummary;

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuestionOptionCreate {
    #[validate(length(min = 1, message = "option text must not be empty"))]
    pub(crate) text: String,
    #[serde(default)]
    #[serde(alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    pub(crate) kind: QuestionKind,
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub(crate) prompt: String,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Vec<QuestionOptionCreate>,
    #[serde(default)]
    #[serde(alias = "correctValue")]
    pub(crate) correct_value: Option<String>,
    #[validate(range(min = 0.0, message = "weight must be non-negative"))]
    pub(crate) weight: f64,
    #[serde(default)]
    #[serde(alias = "displayOrder")]
    pub(crate) display_order: Option<i32>,
}

/// Exam configuration block; serialized back out verbatim on responses.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct ExamConfig {
    #[serde(default = "default_duration_minutes")]
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default = "default_max_attempts")]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: i32,
    #[serde(default = "default_true")]
    #[serde(alias = "showAnswers")]
    pub(crate) show_answers: bool,
    #[serde(default)]
    #[serde(alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: bool,
    #[serde(default)]
    #[serde(alias = "shuffleOptions")]
    pub(crate) shuffle_options: bool,
    #[serde(default = "default_passing_score")]
    #[serde(alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be within 0..=100"))]
    pub(crate) passing_score: f64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_duration_minutes(),
            max_attempts: default_max_attempts(),
            show_answers: true,
            shuffle_questions: false,
            shuffle_options: false,
            passing_score: default_passing_score(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(alias = "courseId")]
    #[validate(length(min = 1, message = "course_id must not be empty"))]
    pub(crate) course_id: String,
    #[serde(alias = "openAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) open_at: OffsetDateTime,
    #[serde(alias = "closeAt", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) close_at: OffsetDateTime,
    #[serde(default)]
    #[serde(alias = "configuration")]
    #[validate(nested)]
    pub(crate) config: ExamConfig,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(
        default,
        alias = "openAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) open_at: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "closeAt",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) close_at: Option<OffsetDateTime>,
    #[serde(default)]
    #[serde(alias = "configuration")]
    pub(crate) config: Option<ExamConfig>,
    #[serde(default)]
    pub(crate) questions: Option<Vec<QuestionCreate>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionOptionResponse {
    pub(crate) id: String,
    pub(crate) text: String,
    /// Omitted entirely for students who may not see the answer key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Vec<QuestionOptionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_value: Option<String>,
    pub(crate) weight: f64,
    pub(crate) display_order: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamStatisticsBlock {
    pub(crate) graded_attempts: i64,
    pub(crate) average_percentage: f64,
    pub(crate) passed_count: i64,
    pub(crate) failed_count: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) instructor_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) open_at: String,
    pub(crate) close_at: String,
    pub(crate) configuration: ExamConfig,
    pub(crate) total_weight: f64,
    pub(crate) status: ExamStatus,
    pub(crate) effective_status: ExamStatus,
    pub(crate) availability: AvailabilitySummary,
    pub(crate) statistics: ExamStatisticsBlock,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    pub(crate) questions: Vec<QuestionResponse>,
    /// Present on student reads only: the caller's own attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) my_attempts: Option<Vec<crate::schemas::attempt::AttemptResponse>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) open_at: String,
    pub(crate) close_at: String,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) total_weight: f64,
    pub(crate) status: ExamStatus,
    pub(crate) effective_status: ExamStatus,
    pub(crate) availability: AvailabilitySummary,
    pub(crate) question_count: i64,
    pub(crate) pending_review_count: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradedAttemptDetail {
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) raw_score: f64,
    pub(crate) percentage: f64,
    pub(crate) submitted_at: Option<String>,
    pub(crate) elapsed_minutes: Option<i32>,
    /// The student's best graded attempt (highest percentage, earliest
    /// attempt number on ties).
    pub(crate) best: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamStatisticsResponse {
    pub(crate) exam_id: String,
    pub(crate) status: ExamStatus,
    pub(crate) effective_status: ExamStatus,
    pub(crate) availability: AvailabilitySummary,
    pub(crate) total_attempts: i64,
    pub(crate) in_progress_count: i64,
    pub(crate) pending_review_count: i64,
    pub(crate) graded_attempts: i64,
    pub(crate) average_percentage: f64,
    pub(crate) passed_count: i64,
    pub(crate) failed_count: i64,
    pub(crate) best_percentage: f64,
    pub(crate) worst_percentage: f64,
    pub(crate) attempts: Vec<GradedAttemptDetail>,
}

fn default_duration_minutes() -> i32 {
    60
}

fn default_max_attempts() -> i32 {
    1
}

fn default_passing_score() -> f64 {
    60.0
}

fn default_true() -> bool {
    true
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // Frontend's datetime-local often sends without timezone.
    if raw.len() == 16 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}:00Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if raw.len() == 19 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flexible_parser_accepts_common_shapes() {
        for raw in [
            "2025-06-01T10:00:00Z",
            "2025-06-01T10:00:00+03:00",
            "2025-06-01T10:00",
            "2025-06-01T10:00:00",
        ] {
            assert!(parse_offset_datetime_flexible(raw).is_some(), "should parse {raw}");
        }
        assert!(parse_offset_datetime_flexible("June 1st").is_none());
    }

    #[test]
    fn exam_create_accepts_camel_case_aliases_and_defaults() {
        let payload = serde_json::json!({
            "title": "Algebra final",
            "courseId": "course-1",
            "openAt": "2025-06-01T10:00",
            "closeAt": "2025-06-01T12:00",
            "configuration": {"maxAttempts": 2, "passingScore": 70}
        });

        let parsed: ExamCreate = serde_json::from_value(payload).expect("parse");
        assert_eq!(parsed.course_id, "course-1");
        assert_eq!(parsed.config.max_attempts, 2);
        assert_eq!(parsed.config.passing_score, 70.0);
        // Unstated fields fall back to defaults.
        assert_eq!(parsed.config.duration_minutes, 60);
        assert!(parsed.config.show_answers);
        assert!(parsed.questions.is_empty());
    }
}
