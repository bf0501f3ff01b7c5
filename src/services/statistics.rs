use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::services::grading::round_two;

/// Aggregate block stored on the exam row. Always produced by a full
/// recompute over the current attempt collection so the counters cannot
/// drift from their source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExamStatistics {
    pub(crate) graded_attempts: i64,
    pub(crate) average_percentage: f64,
    pub(crate) passed_count: i64,
    pub(crate) failed_count: i64,
}

pub(crate) fn recompute(attempts: &[Attempt], passing_score: f64) -> ExamStatistics {
    let graded: Vec<&Attempt> =
        attempts.iter().filter(|attempt| attempt.status == AttemptStatus::Graded).collect();

    if graded.is_empty() {
        return ExamStatistics {
            graded_attempts: 0,
            average_percentage: 0.0,
            passed_count: 0,
            failed_count: 0,
        };
    }

    let sum: f64 = graded.iter().map(|attempt| attempt.percentage).sum();
    let passed =
        graded.iter().filter(|attempt| attempt.percentage >= passing_score).count() as i64;

    ExamStatistics {
        graded_attempts: graded.len() as i64,
        average_percentage: round_two(sum / graded.len() as f64),
        passed_count: passed,
        failed_count: graded.len() as i64 - passed,
    }
}

/// A student's best graded attempt: highest percentage, ties broken by the
/// earliest attempt number. Pure read-side selection, never stored.
pub(crate) fn best_attempt(attempts: &[Attempt]) -> Option<&Attempt> {
    attempts
        .iter()
        .filter(|attempt| attempt.status == AttemptStatus::Graded)
        .fold(None, |best: Option<&Attempt>, candidate| match best {
            None => Some(candidate),
            Some(current) => {
                let better = candidate.percentage > current.percentage
                    || (candidate.percentage == current.percentage
                        && candidate.attempt_number < current.attempt_number);
                if better {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::{Date, PrimitiveDateTime, Time};

    fn now() -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::April, 1).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(9, 0, 0).unwrap())
    }

    fn attempt(number: i32, status: AttemptStatus, percentage: f64) -> Attempt {
        Attempt {
            id: format!("attempt-{number}-{percentage}"),
            exam_id: "exam-1".to_string(),
            student_id: "student-1".to_string(),
            attempt_number: number,
            answers: Json(Vec::new()),
            raw_score: 0.0,
            percentage,
            status,
            started_at: now(),
            submitted_at: Some(now()),
            elapsed_minutes: Some(30),
            feedback: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn recompute_counts_only_graded_attempts() {
        let attempts = vec![
            attempt(1, AttemptStatus::Graded, 80.0),
            attempt(2, AttemptStatus::Graded, 40.0),
            attempt(3, AttemptStatus::Completed, 90.0),
            attempt(4, AttemptStatus::InProgress, 0.0),
        ];

        let stats = recompute(&attempts, 60.0);
        assert_eq!(stats.graded_attempts, 2);
        assert_eq!(stats.average_percentage, 60.0);
        assert_eq!(stats.passed_count, 1);
        assert_eq!(stats.failed_count, 1);
    }

    #[test]
    fn recompute_rounds_the_average() {
        let attempts = vec![
            attempt(1, AttemptStatus::Graded, 33.33),
            attempt(2, AttemptStatus::Graded, 33.33),
            attempt(3, AttemptStatus::Graded, 50.0),
        ];

        let stats = recompute(&attempts, 60.0);
        assert_eq!(stats.average_percentage, 38.89);
    }

    #[test]
    fn recompute_with_no_graded_attempts_is_all_zero() {
        let attempts = vec![attempt(1, AttemptStatus::InProgress, 0.0)];
        let stats = recompute(&attempts, 60.0);
        assert_eq!(
            stats,
            ExamStatistics {
                graded_attempts: 0,
                average_percentage: 0.0,
                passed_count: 0,
                failed_count: 0,
            }
        );
    }

    #[test]
    fn passing_boundary_is_inclusive() {
        let attempts = vec![attempt(1, AttemptStatus::Graded, 60.0)];
        let stats = recompute(&attempts, 60.0);
        assert_eq!(stats.passed_count, 1);
        assert_eq!(stats.failed_count, 0);
    }

    #[test]
    fn best_attempt_prefers_highest_percentage() {
        let attempts = vec![
            attempt(1, AttemptStatus::Graded, 60.0),
            attempt(2, AttemptStatus::Graded, 85.0),
        ];
        assert_eq!(best_attempt(&attempts).map(|a| a.attempt_number), Some(2));
    }

    #[test]
    fn best_attempt_breaks_ties_with_the_earliest_number() {
        let attempts = vec![
            attempt(2, AttemptStatus::Graded, 85.0),
            attempt(1, AttemptStatus::Graded, 85.0),
            attempt(3, AttemptStatus::Graded, 70.0),
        ];
        assert_eq!(best_attempt(&attempts).map(|a| a.attempt_number), Some(1));
    }

    #[test]
    fn best_attempt_ignores_ungraded_attempts() {
        let attempts = vec![
            attempt(1, AttemptStatus::Graded, 60.0),
            attempt(2, AttemptStatus::Completed, 99.0),
        ];
        assert_eq!(best_attempt(&attempts).map(|a| a.attempt_number), Some(1));

        let none = vec![attempt(1, AttemptStatus::InProgress, 0.0)];
        assert!(best_attempt(&none).is_none());
    }
}
