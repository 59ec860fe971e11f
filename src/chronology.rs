// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for calendar arithmetic
use chrono::{Datelike, Duration, NaiveDate};

// used when exposing partial dates in the JSON interface
use serde::{Deserialize, Serialize};

// used to print out readable forms of dates and durations
use std::fmt;

use std::cmp::Ordering;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{LifespanError, Result};

lazy_static! {
    static ref PARTIAL_DATE: Regex = Regex::new(r"^(\d{1,4})(?:-(\d{1,2})(?:-(\d{1,2}))?)?$").unwrap();
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

// A date as users record them: sometimes just a year, sometimes a year and
// month, sometimes the full day. Calculations that need an exact day fall
// back on earliest().
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartialDate {
    Year(i32),
    YearMonth(i32, u32),
    Day(NaiveDate),
}

impl PartialDate {
    pub fn parse(text: &str) -> Result<PartialDate> {
        let bad = || LifespanError::Parse {
            message: format!("'{}' is not a date of the form YYYY, YYYY-MM or YYYY-MM-DD", text),
        };
        let captures = PARTIAL_DATE.captures(text).ok_or_else(bad)?;
        let year = captures[1].parse::<i32>().map_err(|_| bad())?;
        let month = match captures.get(2) {
            Some(m) => Some(m.as_str().parse::<u32>().map_err(|_| bad())?),
            None => None,
        };
        let day = match captures.get(3) {
            Some(d) => Some(d.as_str().parse::<u32>().map_err(|_| bad())?),
            None => None,
        };
        match (month, day) {
            (None, _) => Ok(PartialDate::Year(year)),
            (Some(m), None) => {
                if (1..=12).contains(&m) {
                    Ok(PartialDate::YearMonth(year, m))
                } else {
                    Err(bad())
                }
            }
            (Some(m), Some(d)) => NaiveDate::from_ymd_opt(year, m, d)
                .map(PartialDate::Day)
                .ok_or_else(bad),
        }
    }

    // the first day the partial date could refer to
    pub fn earliest(&self) -> NaiveDate {
        match self {
            PartialDate::Year(y) => NaiveDate::from_ymd_opt(*y, 1, 1),
            PartialDate::YearMonth(y, m) => NaiveDate::from_ymd_opt(*y, *m, 1),
            PartialDate::Day(d) => Some(*d),
        }
        .unwrap_or(NaiveDate::MIN)
    }

    // the last day the partial date could refer to
    pub fn latest(&self) -> NaiveDate {
        match self {
            PartialDate::Year(y) => NaiveDate::from_ymd_opt(*y, 12, 31),
            PartialDate::YearMonth(y, m) => NaiveDate::from_ymd_opt(*y, *m, days_in_month(*y, *m)),
            PartialDate::Day(d) => Some(*d),
        }
        .unwrap_or(NaiveDate::MAX)
    }

    pub fn year(&self) -> i32 {
        match self {
            PartialDate::Year(y) => *y,
            PartialDate::YearMonth(y, _) => *y,
            PartialDate::Day(d) => d.year(),
        }
    }

    pub fn elapsed_until(&self, other: &PartialDate) -> Elapsed {
        elapsed_between(self.earliest(), other.earliest())
    }

    pub fn elapsed_as_of(&self, today: NaiveDate) -> Elapsed {
        elapsed_between(self.earliest(), today)
    }

    // how the date reads in a sentence, such as "15 June 1950" or "June 1950"
    pub fn readable(&self) -> String {
        match self {
            PartialDate::Year(y) => format!("{}", y),
            PartialDate::YearMonth(y, m) => match MONTH_NAMES.get((*m as usize).wrapping_sub(1)) {
                Some(name) => format!("{} {}", name, y),
                None => format!("? {}", y),
            },
            PartialDate::Day(d) => d.format("%-d %B %Y").to_string(),
        }
    }

    // the readable form with its preposition: "on 15 June 1950", "in June 1950"
    pub fn phrase(&self) -> String {
        match self {
            PartialDate::Day(_) => format!("on {}", self.readable()),
            _ => format!("in {}", self.readable()),
        }
    }

    fn granularity(&self) -> u8 {
        match self {
            PartialDate::Year(_) => 0,
            PartialDate::YearMonth(_, _) => 1,
            PartialDate::Day(_) => 2,
        }
    }
}

// Chronological order, with a coarser date sorting before a finer one that
// starts on the same day (1950 before June 1950 before 1 June 1950).
impl Ord for PartialDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.earliest()
            .cmp(&other.earliest())
            .then_with(|| self.granularity().cmp(&other.granularity()))
    }
}
impl PartialOrd for PartialDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PartialDate::Year(y) => {
                write!(f, "{:04}", y)
            }
            PartialDate::YearMonth(y, m) => {
                write!(f, "{:04}-{:02}", y, m)
            }
            PartialDate::Day(d) => {
                write!(f, "{}", d)
            }
        }
    }
}
impl FromStr for PartialDate {
    type Err = LifespanError;
    fn from_str(s: &str) -> Result<Self> {
        PartialDate::parse(s)
    }
}
impl TryFrom<String> for PartialDate {
    type Error = LifespanError;
    fn try_from(s: String) -> Result<Self> {
        PartialDate::parse(&s)
    }
}
impl From<PartialDate> for String {
    fn from(d: PartialDate) -> String {
        d.to_string()
    }
}
impl ToSql for PartialDate {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}
impl FromSql for PartialDate {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        PartialDate::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// A calendar-aware duration: whole years, then whole months, then days.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Elapsed {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl Elapsed {
    pub fn new(years: u32, months: u32, days: u32) -> Self {
        Self { years, months, days }
    }
    pub fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.days == 0
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = Vec::new();
        if self.years > 0 {
            parts.push(format!("{} year{}", self.years, if self.years == 1 { "" } else { "s" }));
        }
        if self.months > 0 {
            parts.push(format!("{} month{}", self.months, if self.months == 1 { "" } else { "s" }));
        }
        if self.days > 0 {
            parts.push(format!("{} day{}", self.days, if self.days == 1 { "" } else { "s" }));
        }
        match parts.len() {
            0 => write!(f, "0 days"),
            1 => write!(f, "{}", parts[0]),
            n => write!(f, "{} and {}", parts[..n - 1].join(", "), parts[n - 1]),
        }
    }
}

// Shift a date by whole months, clamping the day to the length of the
// landing month (31 January plus one month is 28 or 29 February).
fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let zero_based = date.year() * 12 + date.month() as i32 - 1 + months;
    let year = zero_based.div_euclid(12);
    let month = (zero_based.rem_euclid(12) + 1) as u32;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

// The elapsed time between two days: as many whole months as fit without
// overshooting, then the days that remain. Counting this way makes
// add_elapsed(first, elapsed_between(first, second)) land on second exactly.
pub fn elapsed_between(first: NaiveDate, second: NaiveDate) -> Elapsed {
    if second < first {
        return elapsed_between(second, first);
    }
    let mut months =
        (second.year() - first.year()) * 12 + second.month() as i32 - first.month() as i32;
    if add_months(first, months) > second {
        months -= 1;
    }
    let anchor = add_months(first, months);
    let days = second.signed_duration_since(anchor).num_days() as u32;
    Elapsed {
        years: (months / 12) as u32,
        months: (months % 12) as u32,
        days,
    }
}

pub fn add_elapsed(date: NaiveDate, elapsed: Elapsed) -> NaiveDate {
    let shifted = add_months(date, (elapsed.years * 12 + elapsed.months) as i32);
    shifted + Duration::days(elapsed.days as i64)
}
