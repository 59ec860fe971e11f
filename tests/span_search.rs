use lifespan::persist::PersistenceMode;
use lifespan::search::{search, SearchQuery};
use lifespan::timeline::{AccessLevel, Database, SpanState, SpanType};
use lifespan::validity::Direction;

fn setup() -> Database {
    Database::new(PersistenceMode::InMemory).expect("db")
}

fn named(db: &Database, name: &str, span_type: SpanType, access: AccessLevel) -> u64 {
    db.create_span(
        name.to_owned(),
        span_type,
        None,
        None,
        SpanState::Draft,
        access,
    )
    .expect("span")
    .id()
}

fn names_of(db: &Database, query: &SearchQuery) -> Vec<String> {
    search(db, query)
        .expect("search")
        .spans
        .iter()
        .map(|span| span.name().to_owned())
        .collect()
}

#[test]
fn matches_are_case_insensitive_and_prefix_ranked() {
    let db = setup();
    named(&db, "Salvador", SpanType::Person, AccessLevel::Public);
    named(&db, "Alice Example", SpanType::Person, AccessLevel::Public);
    named(&db, "Alan Parsons", SpanType::Person, AccessLevel::Public);
    let query = SearchQuery {
        text: "AL".to_owned(),
        ..Default::default()
    };
    // prefix matches come first, alphabetically, then the rest
    assert_eq!(
        names_of(&db, &query),
        vec!["Alan Parsons", "Alice Example", "Salvador"]
    );
}

#[test]
fn type_filters_union_across_the_given_types() {
    let db = setup();
    named(&db, "Acme", SpanType::Organisation, AccessLevel::Public);
    named(&db, "Avalon", SpanType::Place, AccessLevel::Public);
    named(&db, "Arthur", SpanType::Person, AccessLevel::Public);
    let query = SearchQuery {
        text: "a".to_owned(),
        types: vec![SpanType::Organisation, SpanType::Place],
        ..Default::default()
    };
    assert_eq!(names_of(&db, &query), vec!["Acme", "Avalon"]);
}

#[test]
fn a_connection_type_narrows_to_its_vocabulary() {
    let db = setup();
    named(&db, "Alice Example", SpanType::Person, AccessLevel::Public);
    named(&db, "Acme", SpanType::Organisation, AccessLevel::Public);
    // picking the object of an employment connection: organisations only
    let query = SearchQuery {
        text: "a".to_owned(),
        connection_type: Some("employment".to_owned()),
        direction: Direction::Forward,
        ..Default::default()
    };
    assert_eq!(names_of(&db, &query), vec!["Acme"]);
    // picking the subject: persons only
    let query = SearchQuery {
        text: "a".to_owned(),
        connection_type: Some("employment".to_owned()),
        direction: Direction::Inverse,
        ..Default::default()
    };
    assert_eq!(names_of(&db, &query), vec!["Alice Example"]);
}

#[test]
fn impossible_narrowing_returns_nothing() {
    let db = setup();
    named(&db, "Alice Example", SpanType::Person, AccessLevel::Public);
    // employment objects are organisations; asking for persons leaves nothing
    let query = SearchQuery {
        types: vec![SpanType::Person],
        connection_type: Some("employment".to_owned()),
        direction: Direction::Forward,
        ..Default::default()
    };
    let outcome = search(&db, &query).expect("search");
    assert!(outcome.spans.is_empty());
    assert!(!outcome.limited);
    // an unknown connection type is an error, not an empty result
    let query = SearchQuery {
        connection_type: Some("apprenticeship".to_owned()),
        ..Default::default()
    };
    assert!(search(&db, &query).is_err());
}

#[test]
fn private_spans_are_hidden_unless_asked_for() {
    let db = setup();
    named(&db, "Private Pete", SpanType::Person, AccessLevel::Private);
    named(&db, "Shared Sam", SpanType::Person, AccessLevel::Shared);
    named(&db, "Public Paul", SpanType::Person, AccessLevel::Public);
    let query = SearchQuery::default();
    assert_eq!(names_of(&db, &query), vec!["Public Paul", "Shared Sam"]);
    let query = SearchQuery {
        include_private: true,
        ..Default::default()
    };
    assert_eq!(
        names_of(&db, &query),
        vec!["Private Pete", "Public Paul", "Shared Sam"]
    );
}

#[test]
fn placeholders_can_be_left_out() {
    let db = setup();
    db.create_placeholder("Maybe Margaret".to_owned(), SpanType::Person)
        .expect("placeholder");
    named(&db, "Definite Dan", SpanType::Person, AccessLevel::Public);
    let query = SearchQuery {
        include_private: true,
        ..Default::default()
    };
    assert_eq!(
        names_of(&db, &query),
        vec!["Definite Dan", "Maybe Margaret"]
    );
    let query = SearchQuery {
        include_private: true,
        include_placeholders: false,
        ..Default::default()
    };
    assert_eq!(names_of(&db, &query), vec!["Definite Dan"]);
}

#[test]
fn the_limit_caps_results_and_says_so() {
    let db = setup();
    for name in ["Person One", "Person Two", "Person Three", "Person Four", "Person Five"] {
        named(&db, name, SpanType::Person, AccessLevel::Public);
    }
    let query = SearchQuery {
        text: "person".to_owned(),
        limit: 2,
        ..Default::default()
    };
    let outcome = search(&db, &query).expect("search");
    assert_eq!(outcome.spans.len(), 2);
    assert!(outcome.limited);
    let query = SearchQuery {
        text: "person".to_owned(),
        ..Default::default()
    };
    let outcome = search(&db, &query).expect("search");
    assert_eq!(outcome.spans.len(), 5);
    assert!(!outcome.limited);
}

#[test]
fn connection_spans_never_surface() {
    let db = setup();
    let alice = db
        .create_span(
            "Alice Example".to_owned(),
            SpanType::Person,
            Some("1950-06-15".parse().expect("date")),
            None,
            SpanState::Complete,
            AccessLevel::Public,
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
    db.create_connection(
        "employment",
        alice,
        acme,
        Some("1972".parse().expect("date")),
        None,
        SpanState::Draft,
    )
    .expect("connection");
    // the connection span is named "Alice Example worked for Acme"
    let query = SearchQuery {
        text: "worked".to_owned(),
        include_private: true,
        ..Default::default()
    };
    let outcome = search(&db, &query).expect("search");
    assert!(outcome.spans.is_empty());
}
