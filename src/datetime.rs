//! Date/time span extraction from free text.
//!
//! The extractor finds the first date phrase and the first time phrase in
//! reading order and combines them into a [`CandidateSpan`]. Output depends
//! only on the input text and the reference instant.

use std::sync::OnceLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Weekday,
};
use log::trace;
use regex::{Captures, Regex};

/// Default event length when the text names no end time.
pub const DEFAULT_EVENT_DURATION_MINUTES: i64 = 60;

/// The first calendar-relevant span found in a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSpan {
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
}

impl CandidateSpan {
    /// `end`, or one hour after `start` when no end was detected
    pub fn end_or_default(&self) -> DateTime<FixedOffset> {
        self.end
            .unwrap_or_else(|| self.start + Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES))
    }
}

struct DateMatch {
    pos: usize,
    date: NaiveDate,
    implied_time: Option<NaiveTime>,
}

struct TimeMatch {
    pos: usize,
    start: NaiveTime,
    end: Option<NaiveTime>,
}

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

fn compiled(cell: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&pattern()).expect("date/time patterns are valid"))
}

fn relative_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b(day after tomorrow|today|tonight|tomorrow)\b".to_string())
}

fn weekday_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || {
        r"\b(?:(next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b"
            .to_string()
    })
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b".to_string())
}

fn slash_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b".to_string())
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || {
        format!(r"\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?")
    })
}

fn day_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || {
        format!(r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b(?:,?\s+(\d{{4}})\b)?")
    })
}

fn time_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || {
        r"\b(?:from\s+)?(\d{1,2})(?::([0-5]\d))?\s*(am|pm)?\s*(?:-|–|to|until|till)\s*(\d{1,2})(?::([0-5]\d))?\s*(am|pm)?\b"
            .to_string()
    })
}

fn meridiem_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b(\d{1,2})(?::([0-5]\d))?\s*(am|pm)\b".to_string())
}

fn clock_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b([01]?\d|2[0-3]):([0-5]\d)\b".to_string())
}

fn named_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, || r"\b(noon|midday|midnight)\b".to_string())
}

/// Extracts the first date/time span from `text`, resolving relative
/// phrases against `reference`.
pub fn extract_span(text: &str, reference: DateTime<FixedOffset>) -> Option<CandidateSpan> {
    let lower = text.to_lowercase();
    let today = reference.date_naive();

    let date = find_date(&lower, today);
    let time = find_time(&lower);

    let (day, start_time, end_time) = match (&date, &time) {
        (None, None) => return None,
        (Some(d), Some(t)) => (d.date, t.start, t.end),
        (Some(d), None) => (d.date, d.implied_time.unwrap_or_else(noon), None),
        (None, Some(t)) => (today, t.start, t.end),
    };

    let offset = reference.timezone();
    let start = offset.from_local_datetime(&day.and_time(start_time)).single()?;
    let end = match end_time {
        Some(t) => {
            let mut end = offset.from_local_datetime(&day.and_time(t)).single()?;
            if end <= start {
                end += Duration::days(1);
            }
            Some(end)
        }
        None => None,
    };

    trace!("Extracted span {:?} - {:?} from '{}'", start, end, text);
    Some(CandidateSpan { start, end })
}

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn earliest<T>(candidates: Vec<Option<T>>, pos: impl Fn(&T) -> usize) -> Option<T> {
    // ties keep the earlier finder
    candidates
        .into_iter()
        .flatten()
        .fold(None, |best: Option<T>, next| match best {
            Some(b) if pos(&b) <= pos(&next) => Some(b),
            _ => Some(next),
        })
}

fn find_date(text: &str, today: NaiveDate) -> Option<DateMatch> {
    earliest(
        vec![
            relative_day(text, today),
            weekday(text, today),
            iso_date(text),
            slash_date(text, today),
            month_day(text, today),
            day_month(text, today),
        ],
        |m| m.pos,
    )
}

fn find_time(text: &str) -> Option<TimeMatch> {
    earliest(
        vec![time_range(text), meridiem_time(text), clock_time(text), named_time(text)],
        |m| m.pos,
    )
}

fn relative_day(text: &str, today: NaiveDate) -> Option<DateMatch> {
    let caps = relative_day_re().captures(text)?;
    let whole = caps.get(0)?;
    let (offset_days, implied_time) = match &caps[1] {
        "day after tomorrow" => (2, None),
        "tomorrow" => (1, None),
        "tonight" => (0, NaiveTime::from_hms_opt(20, 0, 0)),
        _ => (0, None),
    };
    Some(DateMatch {
        pos: whole.start(),
        date: today + Duration::days(offset_days),
        implied_time,
    })
}

fn weekday(text: &str, today: NaiveDate) -> Option<DateMatch> {
    let caps = weekday_re().captures(text)?;
    let target = parse_weekday(&caps[2])?;
    let current = today.weekday().num_days_from_monday() as i64;
    let mut delta = (target.num_days_from_monday() as i64 - current + 7) % 7;
    if delta == 0 && caps.get(1).is_some_and(|m| m.as_str() == "next") {
        delta = 7;
    }
    Some(DateMatch {
        pos: caps.get(0)?.start(),
        date: today + Duration::days(delta),
        implied_time: None,
    })
}

fn iso_date(text: &str) -> Option<DateMatch> {
    iso_date_re().captures_iter(text).find_map(|caps| {
        let date = NaiveDate::from_ymd_opt(
            number(&caps, 1)? as i32,
            number(&caps, 2)?,
            number(&caps, 3)?,
        )?;
        Some(DateMatch {
            pos: caps.get(0)?.start(),
            date,
            implied_time: None,
        })
    })
}

fn slash_date(text: &str, today: NaiveDate) -> Option<DateMatch> {
    slash_date_re().captures_iter(text).find_map(|caps| {
        let month = number(&caps, 1)?;
        let day = number(&caps, 2)?;
        let date = match caps.get(3) {
            Some(year) => NaiveDate::from_ymd_opt(expand_year(year.as_str())?, month, day)?,
            None => upcoming_month_day(today, month, day)?,
        };
        Some(DateMatch {
            pos: caps.get(0)?.start(),
            date,
            implied_time: None,
        })
    })
}

fn month_day(text: &str, today: NaiveDate) -> Option<DateMatch> {
    month_day_re().captures_iter(text).find_map(|caps| {
        let month = parse_month(&caps[1])?;
        let day = number(&caps, 2)?;
        named_month_date(&caps, 3, today, month, day)
    })
}

fn day_month(text: &str, today: NaiveDate) -> Option<DateMatch> {
    day_month_re().captures_iter(text).find_map(|caps| {
        let day = number(&caps, 1)?;
        let month = parse_month(&caps[2])?;
        named_month_date(&caps, 3, today, month, day)
    })
}

fn named_month_date(
    caps: &Captures<'_>,
    year_group: usize,
    today: NaiveDate,
    month: u32,
    day: u32,
) -> Option<DateMatch> {
    let date = match caps.get(year_group) {
        Some(year) => NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day)?,
        None => upcoming_month_day(today, month, day)?,
    };
    Some(DateMatch {
        pos: caps.get(0)?.start(),
        date,
        implied_time: None,
    })
}

fn time_range(text: &str) -> Option<TimeMatch> {
    time_range_re().captures_iter(text).find_map(|caps| {
        let start_meridiem = caps.get(3).map(|m| m.as_str());
        let end_meridiem = caps.get(6).map(|m| m.as_str());
        let has_minutes = caps.get(2).is_some() && caps.get(5).is_some();
        if start_meridiem.is_none() && end_meridiem.is_none() && !has_minutes {
            return None;
        }

        let start_hour = number(&caps, 1)?;
        let start_minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let end_hour = number(&caps, 4)?;
        let end_minute = caps.get(5).map_or(Some(0), |m| m.as_str().parse().ok())?;

        let end = to_time(end_hour, end_minute, end_meridiem)?;
        let start = match (start_meridiem, end_meridiem) {
            (Some(m), _) => to_time(start_hour, start_minute, Some(m))?,
            (None, Some(m)) => {
                // "11-1pm" means 11am, "3-4pm" means 3pm
                let inherited = to_time(start_hour, start_minute, Some(m))?;
                if inherited >= end {
                    to_time(start_hour, start_minute, Some("am"))?
                } else {
                    inherited
                }
            }
            (None, None) => to_time(start_hour, start_minute, None)?,
        };

        Some(TimeMatch {
            pos: caps.get(0)?.start(),
            start,
            end: Some(end),
        })
    })
}

fn meridiem_time(text: &str) -> Option<TimeMatch> {
    meridiem_time_re().captures_iter(text).find_map(|caps| {
        let minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        Some(TimeMatch {
            pos: caps.get(0)?.start(),
            start: to_time(number(&caps, 1)?, minute, Some(&caps[3]))?,
            end: None,
        })
    })
}

fn clock_time(text: &str) -> Option<TimeMatch> {
    clock_time_re().captures_iter(text).find_map(|caps| {
        Some(TimeMatch {
            pos: caps.get(0)?.start(),
            start: NaiveTime::from_hms_opt(number(&caps, 1)?, number(&caps, 2)?, 0)?,
            end: None,
        })
    })
}

fn named_time(text: &str) -> Option<TimeMatch> {
    let caps = named_time_re().captures(text)?;
    let start = match &caps[1] {
        "midnight" => NaiveTime::MIN,
        _ => noon(),
    };
    Some(TimeMatch {
        pos: caps.get(0)?.start(),
        start,
        end: None,
    })
}

fn to_time(hour: u32, minute: u32, meridiem: Option<&str>) -> Option<NaiveTime> {
    let hour = match meridiem {
        Some(m) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (m, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// Month/day in the reference year, or next year if that date has passed
fn upcoming_month_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    name.parse().ok()
}

fn parse_month(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
