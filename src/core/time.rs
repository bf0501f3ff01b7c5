use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Whole minutes between two instants, rounded to the nearest minute.
pub(crate) fn elapsed_minutes(start: PrimitiveDateTime, end: PrimitiveDateTime) -> i32 {
    let seconds = (end.assume_utc() - start.assume_utc()).whole_seconds();
    ((seconds as f64) / 60.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Duration, Time};

    fn instant(hour: u8, minute: u8, second: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::March, 10).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(instant(10, 20, 30)), "2025-03-10T10:20:30Z");
    }

    #[test]
    fn to_primitive_utc_normalizes_offsets() {
        let offset = UtcOffset::from_hms(3, 0, 0).unwrap();
        let shifted = instant(13, 20, 30).assume_utc().to_offset(offset);
        assert_eq!(to_primitive_utc(shifted), instant(13, 20, 30));
    }

    #[test]
    fn elapsed_minutes_rounds_to_nearest() {
        let start = instant(10, 0, 0);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(29)), 0);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(30)), 1);
        assert_eq!(elapsed_minutes(start, start + Duration::minutes(42)), 42);
        assert_eq!(
            elapsed_minutes(start, start + Duration::minutes(42) + Duration::seconds(31)),
            43
        );
    }
}
