use chrono::NaiveDate;
use lifespan::chronology::Elapsed;
use lifespan::error::LifespanError;
use lifespan::persist::PersistenceMode;
use lifespan::story::{reflect, story};
use lifespan::timeline::{AccessLevel, Database, SpanState, SpanType};

fn setup() -> Database {
    Database::new(PersistenceMode::InMemory).expect("db")
}

fn span(db: &Database, name: &str, span_type: SpanType, start: &str, end: Option<&str>) -> u64 {
    db.create_span(
        name.to_owned(),
        span_type,
        Some(start.parse().expect("date")),
        end.map(|e| e.parse().expect("date")),
        SpanState::Complete,
        AccessLevel::Public,
    )
    .expect("span")
    .id()
}

#[test]
fn a_life_reads_in_chronological_order() {
    let db = setup();
    let alice = span(&db, "Alice Example", SpanType::Person, "1950-06-15", Some("2012-06-01"));
    let acme = span(&db, "Acme", SpanType::Organisation, "1932", None);
    db.create_connection(
        "employment",
        alice,
        acme,
        Some("1972".parse().expect("date")),
        Some("1980".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("employment");
    let told = story(&db, alice, None).expect("story");
    assert_eq!(
        told.sentences,
        vec![
            "Alice Example was born on 15 June 1950.",
            "Alice Example worked for Acme from 1972 until 1980.",
            "Alice Example died on 1 June 2012, aged 61.",
        ]
    );
}

#[test]
fn the_other_side_tells_the_inverse_predicate() {
    let db = setup();
    let alice = span(&db, "Alice Example", SpanType::Person, "1950-06-15", None);
    let acme = span(&db, "Acme", SpanType::Organisation, "1932", None);
    db.create_connection(
        "employment",
        alice,
        acme,
        Some("1972".parse().expect("date")),
        Some("1980".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("employment");
    let told = story(&db, acme, None).expect("story");
    assert_eq!(
        told.sentences,
        vec![
            "Acme was founded in 1932.",
            "Acme employed Alice Example from 1972 until 1980.",
        ]
    );
}

#[test]
fn a_cutoff_hides_the_future_and_leaves_extents_open() {
    let db = setup();
    let alice = span(&db, "Alice Example", SpanType::Person, "1950-06-15", Some("2012-06-01"));
    let acme = span(&db, "Acme", SpanType::Organisation, "1932", None);
    db.create_connection(
        "employment",
        alice,
        acme,
        Some("1972".parse().expect("date")),
        Some("1980".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("employment");
    let cutoff = NaiveDate::from_ymd_opt(1975, 12, 31).expect("date");
    let told = story(&db, alice, Some(cutoff)).expect("story");
    // the death is yet to come, and the job has not ended by the cutoff
    assert_eq!(
        told.sentences,
        vec![
            "Alice Example was born on 15 June 1950.",
            "Alice Example worked for Acme from 1972 onward.",
        ]
    );
}

#[test]
fn repeat_stays_in_the_same_place_collapse_to_the_earliest() {
    let db = setup();
    let bob = span(&db, "Bob Builder", SpanType::Person, "1940", None);
    let springfield = span(&db, "Springfield", SpanType::Place, "1850", None);
    db.create_connection(
        "residence",
        bob,
        springfield,
        Some("1950".parse().expect("date")),
        Some("1960".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("first stay");
    db.create_connection(
        "residence",
        bob,
        springfield,
        Some("1980".parse().expect("date")),
        Some("1985".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("second stay");
    let told = story(&db, bob, None).expect("story");
    assert_eq!(
        told.sentences,
        vec![
            "Bob Builder was born in 1940.",
            "Bob Builder lived in Springfield from 1950 until 1960.",
        ]
    );
    // the place itself still recounts every stay
    let told = story(&db, springfield, None).expect("story");
    assert_eq!(
        told.sentences,
        vec![
            "Springfield was established in 1850.",
            "Springfield was home to Bob Builder from 1950 until 1960.",
            "Springfield was home to Bob Builder from 1980 until 1985.",
        ]
    );
}

#[test]
fn undated_connections_are_not_narrated() {
    let db = setup();
    let bob = span(&db, "Bob Builder", SpanType::Person, "1940", None);
    let carol = span(&db, "Carol Example", SpanType::Person, "1975-03-02", None);
    let woodstock = span(&db, "Woodstock", SpanType::Event, "1969-08", None);
    db.create_connection("friend", bob, carol, None, None, SpanState::Complete)
        .expect("friendship");
    db.create_connection(
        "participation",
        bob,
        woodstock,
        Some("1969-08".parse().expect("date")),
        Some("1969-08".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("participation");
    let told = story(&db, bob, None).expect("story");
    assert_eq!(
        told.sentences,
        vec![
            "Bob Builder was born in 1940.",
            "Bob Builder participated in Woodstock in August 1969.",
        ]
    );
}

#[test]
fn a_reflection_aligns_two_lifetimes() {
    let db = setup();
    let grandmother = span(&db, "Edith Example", SpanType::Person, "1950-06-15", None);
    let grandchild = span(&db, "Noah Example", SpanType::Person, "1990-01-01", None);
    let acme = span(&db, "Acme", SpanType::Organisation, "1932", None);
    let globex = span(&db, "Globex", SpanType::Organisation, "1985", None);
    db.create_connection(
        "employment",
        grandmother,
        acme,
        Some("1972".parse().expect("date")),
        Some("1980".parse().expect("date")),
        SpanState::Complete,
    )
    .expect("early job");
    db.create_connection(
        "employment",
        grandmother,
        globex,
        Some("1992".parse().expect("date")),
        None,
        SpanState::Complete,
    )
    .expect("later job");
    let today = NaiveDate::from_ymd_opt(2030, 1, 1).expect("date");
    let reflection = reflect(&db, grandmother, grandchild, today).expect("reflection");
    // the grandchild is exactly forty today, so the story stops at the
    // day the grandmother turned forty
    assert_eq!(reflection.age, Elapsed::new(40, 0, 0));
    assert_eq!(reflection.as_of, NaiveDate::from_ymd_opt(1990, 6, 15).expect("date"));
    assert_eq!(
        reflection.story.sentences,
        vec![
            "Edith Example was born on 15 June 1950.",
            "Edith Example worked for Acme from 1972 until 1980.",
        ]
    );
}

#[test]
fn reflections_insist_on_persons_with_birth_dates() {
    let db = setup();
    let edith = span(&db, "Edith Example", SpanType::Person, "1950-06-15", None);
    let acme = span(&db, "Acme", SpanType::Organisation, "1932", None);
    let unborn = db
        .create_placeholder("Nameless Ancestor".to_owned(), SpanType::Person)
        .expect("placeholder");
    let today = NaiveDate::from_ymd_opt(2030, 1, 1).expect("date");
    let err = reflect(&db, acme, edith, today).expect_err("organisations have no age");
    // a refusal the client caused, not an engine failure
    assert!(matches!(err, LifespanError::Validation(_)), "got: {err}");
    assert!(
        err.to_string()
            .contains("Reflections compare persons, but Acme is an organisation"),
        "got: {err}"
    );
    let err = reflect(&db, edith, unborn.id(), today).expect_err("no birth date");
    assert!(matches!(err, LifespanError::Validation(_)), "got: {err}");
    assert!(
        err.to_string()
            .contains("Reflections need a birth date for Nameless Ancestor"),
        "got: {err}"
    );
}
