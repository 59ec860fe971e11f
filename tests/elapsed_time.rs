use chrono::NaiveDate;
use lifespan::chronology::{add_elapsed, elapsed_between, Elapsed, PartialDate};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn elapsed_counts_years_then_months_then_days() {
    let elapsed = elapsed_between(day(1950, 6, 15), day(1990, 1, 1));
    assert_eq!(elapsed, Elapsed::new(39, 6, 17));
    assert_eq!(elapsed.to_string(), "39 years, 6 months and 17 days");
}

#[test]
fn adding_the_elapsed_back_lands_on_the_later_date() {
    // Covers leap days, short months and month-length borrows
    let pairs = [
        (day(1950, 6, 15), day(1990, 1, 1)),
        (day(2020, 2, 29), day(2021, 2, 28)),
        (day(2020, 2, 29), day(2024, 2, 29)),
        (day(1999, 1, 31), day(1999, 3, 1)),
        (day(2019, 1, 31), day(2019, 3, 30)),
        (day(1960, 2, 29), day(1961, 3, 1)),
        (day(1999, 12, 31), day(2000, 1, 1)),
    ];
    for (from, until) in pairs {
        let elapsed = elapsed_between(from, until);
        assert_eq!(
            add_elapsed(from, elapsed),
            until,
            "round trip failed for {from} -> {until} ({elapsed})"
        );
    }
}

#[test]
fn elapsed_is_direction_agnostic() {
    let forward = elapsed_between(day(1950, 6, 15), day(1990, 1, 1));
    let backward = elapsed_between(day(1990, 1, 1), day(1950, 6, 15));
    assert_eq!(forward, backward);
}

#[test]
fn elapsed_between_equal_dates_is_zero() {
    let elapsed = elapsed_between(day(2000, 1, 1), day(2000, 1, 1));
    assert!(elapsed.is_zero());
    assert_eq!(elapsed.to_string(), "0 days");
}

#[test]
fn elapsed_reads_with_singulars_and_omissions() {
    assert_eq!(
        elapsed_between(day(2000, 1, 1), day(2001, 2, 2)).to_string(),
        "1 year, 1 month and 1 day"
    );
    assert_eq!(Elapsed::new(0, 0, 5).to_string(), "5 days");
    assert_eq!(Elapsed::new(2, 0, 3).to_string(), "2 years and 3 days");
    assert_eq!(Elapsed::new(40, 0, 0).to_string(), "40 years");
}

#[test]
fn age_as_of_a_day_uses_the_earliest_reading() {
    let born: PartialDate = "1950-06-15".parse().expect("date");
    assert_eq!(born.elapsed_as_of(day(2012, 6, 1)), Elapsed::new(61, 11, 17));
}

#[test]
fn partial_dates_parse_at_three_precisions() {
    for text in ["1969", "1969-07", "1969-07-20"] {
        let date: PartialDate = text.parse().expect("date");
        assert_eq!(date.to_string(), text, "display should round trip");
    }
    let year: PartialDate = "1969".parse().expect("date");
    assert_eq!(year.earliest(), day(1969, 1, 1));
    assert_eq!(year.latest(), day(1969, 12, 31));
    // month precision knows its month length, leap years included
    let february: PartialDate = "2020-02".parse().expect("date");
    assert_eq!(february.latest(), day(2020, 2, 29));
}

#[test]
fn malformed_dates_are_refused() {
    for text in ["", "freeform", "1969-13", "1969-02-30", "20-07-1969"] {
        assert!(
            PartialDate::parse(text).is_err(),
            "'{text}' should not parse"
        );
    }
}

#[test]
fn partial_dates_order_by_day_then_precision() {
    let year: PartialDate = "1969".parse().expect("date");
    let month: PartialDate = "1969-07".parse().expect("date");
    let moment: PartialDate = "1969-07-20".parse().expect("date");
    let new_year: PartialDate = "1969-01-01".parse().expect("date");
    assert!(year < month);
    assert!(month < moment);
    // same first day, the vaguer reading sorts first
    assert!(year < new_year);
}

#[test]
fn partial_dates_read_aloud() {
    let moment: PartialDate = "1969-07-20".parse().expect("date");
    assert_eq!(moment.readable(), "20 July 1969");
    assert_eq!(moment.phrase(), "on 20 July 1969");
    let month: PartialDate = "1969-07".parse().expect("date");
    assert_eq!(month.readable(), "July 1969");
    assert_eq!(month.phrase(), "in July 1969");
    let year: PartialDate = "1969".parse().expect("date");
    assert_eq!(year.phrase(), "in 1969");
}

#[test]
fn partial_dates_serialize_as_their_text_form() {
    let month: PartialDate = "1969-07".parse().expect("date");
    let json = serde_json::to_string(&month).expect("serialize");
    assert_eq!(json, "\"1969-07\"");
    let back: PartialDate = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, month);
    // malformed text is refused on the way in as well
    assert!(serde_json::from_str::<PartialDate>("\"last summer\"").is_err());
}
