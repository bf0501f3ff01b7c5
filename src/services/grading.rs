use crate::db::models::{AnswerRecord, Question};
use crate::db::types::QuestionKind;
use crate::services::EngineError;

/// Result of grading a single answer. `correct: None` means the question
/// awaits manual review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) correct: Option<bool>,
    pub(crate) score: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct SubmittedAnswer {
    pub(crate) question_id: String,
    pub(crate) value: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ManualScore {
    pub(crate) question_id: String,
    pub(crate) score: f64,
    pub(crate) comment: Option<String>,
}

/// Grade one submitted value against its question. All-or-nothing: the
/// answer earns the full weight or zero. Short-answer and essay questions
/// always defer to manual review.
pub(crate) fn grade_answer(question: &Question, submitted: Option<&str>) -> GradeOutcome {
    match question.kind {
        QuestionKind::MultipleChoice => {
            let correct_id =
                question.options.iter().find(|option| option.is_correct).map(|o| o.id.as_str());
            let correct = matches!((submitted, correct_id), (Some(value), Some(id)) if value == id);
            GradeOutcome {
                correct: Some(correct),
                score: if correct { question.weight } else { 0.0 },
            }
        }
        QuestionKind::TrueFalse => {
            let correct = matches!(
                (submitted, question.correct_value.as_deref()),
                (Some(value), Some(expected)) if value.eq_ignore_ascii_case(expected)
            );
            GradeOutcome {
                correct: Some(correct),
                score: if correct { question.weight } else { 0.0 },
            }
        }
        QuestionKind::ShortAnswer | QuestionKind::Essay => {
            GradeOutcome { correct: None, score: 0.0 }
        }
    }
}

/// One empty record per question, in question order.
pub(crate) fn seed_records(questions: &[Question]) -> Vec<AnswerRecord> {
    questions.iter().map(|question| AnswerRecord::empty(&question.id)).collect()
}

/// The automatic grading pass: folds the submitted values into the attempt's
/// answer records and re-grades every record. Values for unknown question
/// ids are ignored; unanswered auto-gradable questions grade as incorrect.
/// Returns the raw score.
pub(crate) fn apply_submission(
    questions: &[Question],
    submitted: &[SubmittedAnswer],
    records: &mut Vec<AnswerRecord>,
) -> f64 {
    for answer in submitted {
        if let Some(record) =
            records.iter_mut().find(|record| record.question_id == answer.question_id)
        {
            record.value = answer.value.clone();
        }
    }

    for record in records.iter_mut() {
        let Some(question) = questions.iter().find(|question| question.id == record.question_id)
        else {
            continue;
        };
        let outcome = grade_answer(question, record.value.as_deref());
        record.correct = outcome.correct;
        record.score = outcome.score;
    }

    raw_total(records)
}

/// The manual grading pass: overwrites the targeted records with
/// instructor-awarded scores, marking them correct when any credit was
/// given. Composes with [`apply_submission`] over the same record list.
/// Returns the recomputed raw score across all records.
pub(crate) fn apply_manual_scores(
    questions: &[Question],
    records: &mut Vec<AnswerRecord>,
    grades: &[ManualScore],
) -> Result<f64, EngineError> {
    for grade in grades {
        if !questions.iter().any(|question| question.id == grade.question_id) {
            return Err(EngineError::Validation(format!(
                "question {} does not belong to this exam",
                grade.question_id
            )));
        }
        if grade.score < 0.0 {
            return Err(EngineError::Validation(format!(
                "awarded score for question {} must be non-negative",
                grade.question_id
            )));
        }

        match records.iter_mut().find(|record| record.question_id == grade.question_id) {
            Some(record) => {
                record.score = grade.score;
                record.correct = Some(grade.score > 0.0);
                record.comment = grade.comment.clone();
            }
            None => {
                let mut record = AnswerRecord::empty(&grade.question_id);
                record.score = grade.score;
                record.correct = Some(grade.score > 0.0);
                record.comment = grade.comment.clone();
                records.push(record);
            }
        }
    }

    Ok(raw_total(records))
}

pub(crate) fn raw_total(records: &[AnswerRecord]) -> f64 {
    records.iter().map(|record| record.score).sum()
}

/// Percentage score rounded to two decimals; a weightless exam scores 0
/// rather than dividing by zero.
pub(crate) fn percentage(raw_score: f64, total_weight: f64) -> f64 {
    if total_weight <= 0.0 {
        return 0.0;
    }
    round_two(raw_score / total_weight * 100.0)
}

pub(crate) fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// True when any question in the exam needs an instructor to grade it.
pub(crate) fn requires_manual_review(questions: &[Question]) -> bool {
    questions.iter().any(|question| !question.kind.is_auto_gradable())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::QuestionOption;
    use sqlx::types::Json;
    use time::{Date, PrimitiveDateTime, Time};

    fn created_at() -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::April, 1).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(9, 0, 0).unwrap())
    }

    fn question(id: &str, kind: QuestionKind, weight: f64) -> Question {
        Question {
            id: id.to_string(),
            exam_id: "exam-1".to_string(),
            kind,
            prompt: format!("prompt {id}"),
            options: Json(Vec::new()),
            correct_value: None,
            weight,
            display_order: 0,
            created_at: created_at(),
        }
    }

    fn choice_question(id: &str, weight: f64, correct_option: &str) -> Question {
        let mut q = question(id, QuestionKind::MultipleChoice, weight);
        q.options = Json(vec![
            QuestionOption { id: "A".to_string(), text: "first".to_string(), is_correct: false },
            QuestionOption {
                id: "B".to_string(),
                text: "second".to_string(),
                is_correct: correct_option == "B",
            },
            QuestionOption {
                id: "C".to_string(),
                text: "third".to_string(),
                is_correct: correct_option == "C",
            },
        ]);
        q
    }

    fn true_false_question(id: &str, weight: f64, expected: &str) -> Question {
        let mut q = question(id, QuestionKind::TrueFalse, weight);
        q.correct_value = Some(expected.to_string());
        q
    }

    fn answer(question_id: &str, value: &str) -> SubmittedAnswer {
        SubmittedAnswer { question_id: question_id.to_string(), value: Some(value.to_string()) }
    }

    #[test]
    fn multiple_choice_is_all_or_nothing_against_the_flagged_option() {
        let q = choice_question("q1", 2.0, "B");

        let right = grade_answer(&q, Some("B"));
        assert_eq!(right, GradeOutcome { correct: Some(true), score: 2.0 });

        let wrong = grade_answer(&q, Some("A"));
        assert_eq!(wrong, GradeOutcome { correct: Some(false), score: 0.0 });
    }

    #[test]
    fn true_false_compares_case_insensitively() {
        let q = true_false_question("q1", 1.0, "true");
        assert_eq!(grade_answer(&q, Some("TRUE")).correct, Some(true));
        assert_eq!(grade_answer(&q, Some("True")).score, 1.0);
        assert_eq!(grade_answer(&q, Some("false")).score, 0.0);
    }

    #[test]
    fn essay_and_short_answer_defer_to_manual_review() {
        for kind in [QuestionKind::Essay, QuestionKind::ShortAnswer] {
            let q = question("q1", kind, 4.0);
            let outcome = grade_answer(&q, Some("a thoughtful answer"));
            assert_eq!(outcome, GradeOutcome { correct: None, score: 0.0 });
        }
    }

    #[test]
    fn unanswered_auto_gradable_questions_grade_as_incorrect() {
        let questions = vec![choice_question("q1", 2.0, "B")];
        let mut records = seed_records(&questions);

        let raw = apply_submission(&questions, &[], &mut records);
        assert_eq!(raw, 0.0);
        assert_eq!(records[0].correct, Some(false));
    }

    #[test]
    fn mixed_submission_leaves_manual_questions_pending() {
        // One auto-gradable true/false (weight 1) and one essay (weight 4):
        // the true/false item scores, the essay stays undetermined.
        let questions =
            vec![true_false_question("q1", 1.0, "true"), question("q2", QuestionKind::Essay, 4.0)];
        let mut records = seed_records(&questions);

        let raw = apply_submission(
            &questions,
            &[answer("q1", "true"), answer("q2", "my essay text")],
            &mut records,
        );

        assert_eq!(raw, 1.0);
        assert_eq!(records[0].correct, Some(true));
        assert_eq!(records[0].score, 1.0);
        assert_eq!(records[1].correct, None);
        assert_eq!(records[1].score, 0.0);
        assert_eq!(records[1].value.as_deref(), Some("my essay text"));
        assert!(requires_manual_review(&questions));
        assert_eq!(percentage(raw, 5.0), 20.0);
    }

    #[test]
    fn manual_merge_recomputes_the_full_raw_score() {
        let questions =
            vec![true_false_question("q1", 1.0, "true"), question("q2", QuestionKind::Essay, 4.0)];
        let mut records = seed_records(&questions);
        apply_submission(&questions, &[answer("q1", "true")], &mut records);

        let raw = apply_manual_scores(
            &questions,
            &mut records,
            &[ManualScore {
                question_id: "q2".to_string(),
                score: 3.0,
                comment: Some("solid argument, weak conclusion".to_string()),
            }],
        )
        .expect("merge");

        assert_eq!(raw, 4.0);
        assert_eq!(percentage(raw, 5.0), 80.0);
        assert_eq!(records[1].correct, Some(true));
        assert_eq!(records[1].comment.as_deref(), Some("solid argument, weak conclusion"));
    }

    #[test]
    fn manual_merge_marks_zero_awards_incorrect() {
        let questions = vec![question("q1", QuestionKind::ShortAnswer, 2.0)];
        let mut records = seed_records(&questions);

        apply_manual_scores(
            &questions,
            &mut records,
            &[ManualScore { question_id: "q1".to_string(), score: 0.0, comment: None }],
        )
        .expect("merge");

        assert_eq!(records[0].correct, Some(false));
    }

    #[test]
    fn manual_merge_rejects_foreign_questions_and_negative_scores() {
        let questions = vec![question("q1", QuestionKind::Essay, 4.0)];
        let mut records = seed_records(&questions);

        let foreign = apply_manual_scores(
            &questions,
            &mut records,
            &[ManualScore { question_id: "other".to_string(), score: 1.0, comment: None }],
        );
        assert!(matches!(foreign, Err(EngineError::Validation(_))));

        let negative = apply_manual_scores(
            &questions,
            &mut records,
            &[ManualScore { question_id: "q1".to_string(), score: -1.0, comment: None }],
        );
        assert!(matches!(negative, Err(EngineError::Validation(_))));
    }

    #[test]
    fn percentage_rounds_to_two_decimals_and_survives_zero_weight() {
        assert_eq!(percentage(1.0, 3.0), 33.33);
        assert_eq!(percentage(2.0, 3.0), 66.67);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(0.0, 10.0), 0.0);
    }
}
