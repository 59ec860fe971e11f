use std::sync::Arc;

use lifespan::batch::{JobId, JobKind, JobRunner};
use lifespan::persist::PersistenceMode;
use lifespan::timeline::{AccessLevel, Database, SpanEdit, SpanState, SpanType};

fn setup() -> (Arc<Database>, JobRunner) {
    let db = Arc::new(Database::new(PersistenceMode::InMemory).expect("db"));
    let runner = JobRunner::new(Arc::clone(&db));
    (db, runner)
}

// promoted placeholders keep their missing slug, which is what the
// repair job is for
fn promoted(db: &Database, name: &str) -> u64 {
    let id = db
        .create_placeholder(name.to_owned(), SpanType::Person)
        .expect("placeholder")
        .id();
    let span = db
        .update_span(
            id,
            SpanEdit {
                state: Some(SpanState::Draft),
                ..Default::default()
            },
        )
        .expect("promotion");
    assert!(span.slug().is_none());
    id
}

#[test]
fn slug_repair_walks_the_targets_in_batches() {
    let (db, runner) = setup();
    promoted(&db, "Amy Aardvark");
    promoted(&db, "Beth Badger");
    promoted(&db, "Cara Cat");
    // already slugged and still-placeholder spans are not targets
    db.create_span(
        "Already Slugged".to_owned(),
        SpanType::Person,
        None,
        None,
        SpanState::Draft,
        AccessLevel::Public,
    )
    .expect("slugged span");
    db.create_placeholder("Still Pending".to_owned(), SpanType::Person)
        .expect("placeholder");
    let job = runner.start(JobKind::RepairSlugs);
    let report = runner.status(job).expect("status");
    assert_eq!(report.total, 3);
    assert_eq!(report.processed, 0);
    assert!(!report.done);
    let report = runner.process(job, 2).expect("first batch");
    assert_eq!(report.processed, 2);
    assert_eq!(report.changed, 2);
    assert_eq!(report.remaining, 1);
    assert!(!report.done);
    let report = runner.process(job, 2).expect("second batch");
    assert_eq!(report.processed, 3);
    assert_eq!(report.changed, 3);
    assert!(report.done);
    assert!(db.span_by_slug("amy-aardvark").is_ok());
    assert!(db.span_by_slug("beth-badger").is_ok());
    assert!(db.span_by_slug("cara-cat").is_ok());
    // a finished job takes no further work
    let report = runner.process(job, 2).expect("idle batch");
    assert_eq!(report.processed, 3);
    assert_eq!(report.changed, 3);
    assert!(report.done);
}

#[test]
fn colliding_names_get_numbered_slugs() {
    let (db, runner) = setup();
    promoted(&db, "Same Name");
    promoted(&db, "Same Name");
    let job = runner.start(JobKind::RepairSlugs);
    let report = runner.process(job, 10).expect("batch");
    assert_eq!(report.changed, 2);
    assert!(report.done);
    let first = db.span_by_slug("same-name").expect("first slug");
    let second = db.span_by_slug("same-name-2").expect("second slug");
    assert_ne!(first.id(), second.id());
}

#[test]
fn unknown_jobs_are_refused() {
    let (_db, runner) = setup();
    assert!(runner.status(JobId(99)).is_err());
    assert!(runner.process(JobId(99), 5).is_err());
    assert!(!runner.cancel(JobId(99)));
}

#[test]
fn cancellation_stops_further_work() {
    let (db, runner) = setup();
    promoted(&db, "Amy Aardvark");
    promoted(&db, "Beth Badger");
    promoted(&db, "Cara Cat");
    let job = runner.start(JobKind::RepairSlugs);
    let report = runner.process(job, 1).expect("first batch");
    assert_eq!(report.processed, 1);
    assert!(runner.cancel(job));
    let report = runner.status(job).expect("status");
    assert!(report.done, "a cancelled job reports itself done");
    let report = runner.process(job, 5).expect("batch after cancel");
    assert_eq!(report.processed, 1, "no further targets were visited");
    assert_eq!(report.changed, 1);
    assert!(report.done);
}

#[test]
fn access_repair_realigns_connection_spans() {
    let (db, runner) = setup();
    let alice = db
        .create_span(
            "Alice Example".to_owned(),
            SpanType::Person,
            Some("1950-06-15".parse().expect("date")),
            None,
            SpanState::Complete,
            AccessLevel::Private,
        )
        .expect("person")
        .id();
    let acme = db
        .create_span(
            "Acme".to_owned(),
            SpanType::Organisation,
            Some("1932".parse().expect("date")),
            None,
            SpanState::Complete,
            AccessLevel::Public,
        )
        .expect("organisation")
        .id();
    let connection = db
        .create_connection(
            "employment",
            alice,
            acme,
            Some("1972".parse().expect("date")),
            None,
            SpanState::Draft,
        )
        .expect("connection");
    let extent_id = connection.connection_span();
    assert_eq!(db.get_span(extent_id).expect("extent").access(), AccessLevel::Private);
    // opening up the person leaves the connection span behind
    db.update_span(
        alice,
        SpanEdit {
            access: Some(AccessLevel::Public),
            ..Default::default()
        },
    )
    .expect("access change");
    assert_eq!(db.get_span(extent_id).expect("extent").access(), AccessLevel::Private);
    let job = runner.start(JobKind::RepairAccess);
    let report = runner.process(job, 10).expect("batch");
    assert_eq!(report.total, 1);
    assert_eq!(report.changed, 1);
    assert!(report.done);
    assert_eq!(db.get_span(extent_id).expect("extent").access(), AccessLevel::Public);
    // a second pass finds nothing to do
    let job = runner.start(JobKind::RepairAccess);
    let report = runner.process(job, 10).expect("idle batch");
    assert_eq!(report.changed, 0);
    assert!(report.done);
}
