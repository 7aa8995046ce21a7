use std::fmt::{Debug, Formatter};

use thiserror::Error;


pub const MINUTES_PER_DAY: u16 = 1440;

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Error texts double as the human-readable reason in error replies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Bad time slot")]
    BadSlot,
    #[error("Cross-day shift not supported")]
    CrossDay,
    #[error("Bad day: {0}")]
    BadDay(String),
    #[error("Bad HH:MM")]
    BadHourMinute,
}


/// A half-open interval `[start_min, end_min)` of minutes on one day of the week
///  (0=Mon .. 6=Sun). Slots never cross midnight; `end_min == 1440` marks the end of the day.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Slot {
    pub day: u8,
    pub start_min: u16,
    pub end_min: u16,
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}-{}]",
            idx_to_day(self.day),
            min_to_hm(self.start_min),
            min_to_hm(self.end_min)
        )
    }
}

impl Slot {
    pub fn new(day: u8, start_min: u16, end_min: u16) -> Result<Slot, TimeError> {
        if day > 6
            || start_min >= MINUTES_PER_DAY
            || end_min == 0
            || end_min > MINUTES_PER_DAY
            || start_min >= end_min
        {
            return Err(TimeError::BadSlot);
        }
        Ok(Slot {
            day,
            start_min,
            end_min,
        })
    }

    /// Checked construction from raw wire integers (which can hold anything).
    pub fn from_wire(day: i32, start_min: i32, end_min: i32) -> Result<Slot, TimeError> {
        if !(0..7).contains(&day) || !(0..1440).contains(&start_min) || !(1..=1440).contains(&end_min) {
            return Err(TimeError::BadSlot);
        }
        Slot::new(day as u8, start_min as u16, end_min as u16)
    }

    pub fn duration_min(&self) -> u16 {
        self.end_min - self.start_min
    }

    /// The slot moved by `delta` minutes (negative = earlier), wrapping across day boundaries
    ///  with the day index carried modulo 7. A result that would straddle two days is not
    ///  representable and fails with [TimeError::CrossDay].
    pub fn shift_minutes(&self, delta: i32) -> Result<Slot, TimeError> {
        let mut start = self.start_min as i32 + delta;
        let mut end = self.end_min as i32 + delta;
        let mut day = self.day;

        while start < 0 {
            start += MINUTES_PER_DAY as i32;
            end += MINUTES_PER_DAY as i32;
            day = (day + 6) % 7;
        }
        while end > MINUTES_PER_DAY as i32 {
            start -= MINUTES_PER_DAY as i32;
            end -= MINUTES_PER_DAY as i32;
            day = (day + 1) % 7;
        }
        if start < 0 || end > MINUTES_PER_DAY as i32 {
            return Err(TimeError::CrossDay);
        }
        Slot::new(day, start as u16, end as u16)
    }
}


/// Case-insensitive three-letter day prefix ("mon", "Tuesday", "WED") to day index.
pub fn day_to_idx(s: &str) -> Result<u8, TimeError> {
    let normalized = s.trim().to_ascii_lowercase();
    let prefix = match normalized.get(..3) {
        Some(p) => p,
        None => return Err(TimeError::BadDay(s.trim().to_string())),
    };
    match prefix {
        "mon" => Ok(0),
        "tue" => Ok(1),
        "wed" => Ok(2),
        "thu" => Ok(3),
        "fri" => Ok(4),
        "sat" => Ok(5),
        "sun" => Ok(6),
        _ => Err(TimeError::BadDay(s.trim().to_string())),
    }
}

pub fn idx_to_day(day: u8) -> &'static str {
    DAY_NAMES[day as usize % 7]
}

/// Zero-padded 24h rendering; minute 1440 renders as "24:00", which is legal as an end boundary.
pub fn min_to_hm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// "HH:MM" to minute of day, for interactive slot entry.
pub fn parse_hm(s: &str) -> Result<u16, TimeError> {
    let (h, m) = s.trim().split_once(':').ok_or(TimeError::BadHourMinute)?;
    let h: u16 = h.parse().map_err(|_| TimeError::BadHourMinute)?;
    let m: u16 = m.parse().map_err(|_| TimeError::BadHourMinute)?;
    if h >= 24 || m >= 60 {
        return Err(TimeError::BadHourMinute);
    }
    Ok(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::regular(0, 540, 630, true)]
    #[case::start_of_day(0, 0, 60, true)]
    #[case::end_of_day(6, 1380, 1440, true)]
    #[case::full_day(3, 0, 1440, true)]
    #[case::empty(0, 540, 540, false)]
    #[case::inverted(0, 630, 540, false)]
    #[case::day_out_of_range(7, 540, 630, false)]
    #[case::start_too_late(0, 1440, 1441, false)]
    #[case::end_zero(0, 0, 0, false)]
    fn test_slot_new(#[case] day: u8, #[case] start: u16, #[case] end: u16, #[case] ok: bool) {
        assert_eq!(Slot::new(day, start, end).is_ok(), ok);
    }

    #[rstest]
    #[case::negative_day(-1, 540, 630)]
    #[case::negative_start(0, -1, 630)]
    #[case::huge_end(0, 540, 100_000)]
    fn test_slot_from_wire_rejects(#[case] day: i32, #[case] start: i32, #[case] end: i32) {
        assert_eq!(Slot::from_wire(day, start, end), Err(TimeError::BadSlot));
    }

    #[rstest]
    #[case::same_day(Slot::new(2, 480, 540).unwrap(), 60, Ok(Slot::new(2, 540, 600).unwrap()))]
    #[case::backward_same_day(Slot::new(2, 480, 540).unwrap(), -60, Ok(Slot::new(2, 420, 480).unwrap()))]
    #[case::wrap_to_previous_day(Slot::new(2, 480, 540).unwrap(), -600, Ok(Slot::new(1, 1320, 1380).unwrap()))]
    #[case::wrap_monday_to_sunday(Slot::new(0, 480, 540).unwrap(), -600, Ok(Slot::new(6, 1320, 1380).unwrap()))]
    #[case::wrap_to_next_day(Slot::new(2, 1380, 1440).unwrap(), 120, Ok(Slot::new(3, 60, 120).unwrap()))]
    #[case::wrap_sunday_to_monday(Slot::new(6, 1380, 1440).unwrap(), 1440, Ok(Slot::new(0, 1380, 1440).unwrap()))]
    #[case::straddles_midnight(Slot::new(2, 1380, 1440).unwrap(), 30, Err(TimeError::CrossDay))]
    #[case::straddles_midnight_backward(Slot::new(2, 0, 60).unwrap(), -30, Err(TimeError::CrossDay))]
    #[case::zero(Slot::new(4, 0, 1440).unwrap(), 0, Ok(Slot::new(4, 0, 1440).unwrap()))]
    fn test_shift_minutes(#[case] slot: Slot, #[case] delta: i32, #[case] expected: Result<Slot, TimeError>) {
        assert_eq!(slot.shift_minutes(delta), expected);
    }

    #[rstest]
    #[case::short("Mon", Ok(0))]
    #[case::lowercase("tue", Ok(1))]
    #[case::full_name("Wednesday", Ok(2))]
    #[case::uppercase("THU", Ok(3))]
    #[case::padded(" fri ", Ok(4))]
    #[case::saturday("sat", Ok(5))]
    #[case::sunday("Sun", Ok(6))]
    #[case::unknown("xyz", Err(TimeError::BadDay("xyz".to_string())))]
    #[case::too_short("mo", Err(TimeError::BadDay("mo".to_string())))]
    #[case::empty("", Err(TimeError::BadDay("".to_string())))]
    fn test_day_to_idx(#[case] s: &str, #[case] expected: Result<u8, TimeError>) {
        assert_eq!(day_to_idx(s), expected);
    }

    #[rstest]
    #[case::midnight(0, "00:00")]
    #[case::morning(540, "09:00")]
    #[case::padded(65, "01:05")]
    #[case::end_boundary(1440, "24:00")]
    fn test_min_to_hm(#[case] minutes: u16, #[case] expected: &str) {
        assert_eq!(min_to_hm(minutes), expected);
    }

    #[rstest]
    #[case::morning("09:00", Ok(540))]
    #[case::padded(" 23:59 ", Ok(1439))]
    #[case::midnight("00:00", Ok(0))]
    #[case::hour_out_of_range("24:00", Err(TimeError::BadHourMinute))]
    #[case::minute_out_of_range("12:60", Err(TimeError::BadHourMinute))]
    #[case::no_colon("1200", Err(TimeError::BadHourMinute))]
    #[case::garbage("ab:cd", Err(TimeError::BadHourMinute))]
    fn test_parse_hm(#[case] s: &str, #[case] expected: Result<u16, TimeError>) {
        assert_eq!(parse_hm(s), expected);
    }
}
