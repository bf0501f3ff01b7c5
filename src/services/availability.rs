use serde::Serialize;
use time::PrimitiveDateTime;

use crate::db::types::ExamStatus;

/// Effective lifecycle state of an exam at `now`.
///
/// The stored column is only guaranteed fresh up to the last reconciliation
/// run, so every read path derives the current state from here instead of
/// trusting the column. A draft never advances on its own; publication is a
/// deliberate human act.
pub(crate) fn resolve(
    stored: ExamStatus,
    close_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> ExamStatus {
    match stored {
        ExamStatus::Draft => ExamStatus::Draft,
        ExamStatus::Published if now > close_at => ExamStatus::Closed,
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AvailabilityPhase {
    Draft,
    NotYetOpen,
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AvailabilitySummary {
    pub(crate) available: bool,
    pub(crate) phase: AvailabilityPhase,
    pub(crate) detail: String,
}

/// Human-readable availability for display, derived from the same inputs as
/// [`resolve`].
pub(crate) fn summarize(
    stored: ExamStatus,
    open_at: PrimitiveDateTime,
    close_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> AvailabilitySummary {
    match resolve(stored, close_at, now) {
        ExamStatus::Draft => AvailabilitySummary {
            available: false,
            phase: AvailabilityPhase::Draft,
            detail: "exam has not been published".to_string(),
        },
        ExamStatus::Closed => AvailabilitySummary {
            available: false,
            phase: AvailabilityPhase::Closed,
            detail: "exam has closed".to_string(),
        },
        ExamStatus::Published => {
            if now < open_at {
                AvailabilitySummary {
                    available: false,
                    phase: AvailabilityPhase::NotYetOpen,
                    detail: format!("opens in {}", humanize_until(open_at, now, true)),
                }
            } else {
                AvailabilitySummary {
                    available: true,
                    phase: AvailabilityPhase::Open,
                    detail: format!("closes in {}", humanize_until(close_at, now, false)),
                }
            }
        }
    }
}

const HOUR_SECONDS: i64 = 3600;
const DAY_SECONDS: i64 = 24 * HOUR_SECONDS;

// Rounds up for "opens in" (never promise an exam earlier than it opens)
// and down for "closes in" (never promise time that is not there).
fn humanize_until(target: PrimitiveDateTime, now: PrimitiveDateTime, round_up: bool) -> String {
    let seconds = (target.assume_utc() - now.assume_utc()).whole_seconds().max(0);

    if round_up {
        let days = (seconds + DAY_SECONDS - 1) / DAY_SECONDS;
        if days > 1 {
            return format!("{days} days");
        }
        let hours = ((seconds + HOUR_SECONDS - 1) / HOUR_SECONDS).max(1);
        return plural(hours, "hour");
    }

    let days = seconds / DAY_SECONDS;
    let hours = (seconds % DAY_SECONDS) / HOUR_SECONDS;
    if days > 0 {
        format!("{} and {}", plural(days, "day"), plural(hours, "hour"))
    } else {
        plural(hours, "hour")
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Duration, Time};

    fn base_now() -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::May, 5).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(12, 0, 0).unwrap())
    }

    #[test]
    fn draft_never_auto_advances() {
        let now = base_now();
        let close = now - Duration::days(3);
        assert_eq!(resolve(ExamStatus::Draft, close, now), ExamStatus::Draft);
    }

    #[test]
    fn published_past_close_reads_as_closed() {
        let now = base_now();
        assert_eq!(
            resolve(ExamStatus::Published, now - Duration::minutes(1), now),
            ExamStatus::Closed
        );
    }

    #[test]
    fn published_inside_window_stays_published() {
        let now = base_now();
        assert_eq!(
            resolve(ExamStatus::Published, now + Duration::hours(1), now),
            ExamStatus::Published
        );
        // Exactly at the close instant the exam is still open.
        assert_eq!(resolve(ExamStatus::Published, now, now), ExamStatus::Published);
    }

    #[test]
    fn resolve_is_pure() {
        let now = base_now();
        let close = now + Duration::hours(2);
        let first = resolve(ExamStatus::Published, close, now);
        let second = resolve(ExamStatus::Published, close, now);
        assert_eq!(first, second);
    }

    #[test]
    fn published_before_open_resolves_published_but_is_not_available() {
        // Published one hour before its window: effective state keeps the
        // stored value while the summary flags it as not yet open.
        let now = base_now();
        let open = now + Duration::hours(1);
        let close = now + Duration::hours(2);

        assert_eq!(resolve(ExamStatus::Published, close, now), ExamStatus::Published);

        let summary = summarize(ExamStatus::Published, open, close, now);
        assert!(!summary.available);
        assert_eq!(summary.phase, AvailabilityPhase::NotYetOpen);
        assert_eq!(summary.detail, "opens in 1 hour");
    }

    #[test]
    fn open_exam_reports_remaining_time() {
        let now = base_now();
        let open = now - Duration::hours(1);
        let close = now + Duration::days(2) + Duration::hours(3);

        let summary = summarize(ExamStatus::Published, open, close, now);
        assert!(summary.available);
        assert_eq!(summary.phase, AvailabilityPhase::Open);
        assert_eq!(summary.detail, "closes in 2 days and 3 hours");
    }

    #[test]
    fn closed_and_draft_summaries() {
        let now = base_now();
        let open = now - Duration::days(2);
        let close = now - Duration::days(1);

        let closed = summarize(ExamStatus::Published, open, close, now);
        assert_eq!(closed.phase, AvailabilityPhase::Closed);
        assert!(!closed.available);

        let draft = summarize(ExamStatus::Draft, open, close, now);
        assert_eq!(draft.phase, AvailabilityPhase::Draft);
        assert!(!draft.available);
    }

    #[test]
    fn opens_in_rounds_up_to_days_past_one_day() {
        let now = base_now();
        let open = now + Duration::hours(25);
        let close = now + Duration::days(10);

        let summary = summarize(ExamStatus::Published, open, close, now);
        assert_eq!(summary.detail, "opens in 2 days");
    }
}
