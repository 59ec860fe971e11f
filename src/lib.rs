//! Lifespan – a timeline engine for recording lives and how they touched.
//!
//! Lifespan centers on the *span* concept: anything with an extent in time,
//! where:
//! * A [`timeline::Span`] is a named, dated extent (a person, organisation,
//!   place, event or thing) with a visibility level and an editorial state.
//! * A [`chronology::PartialDate`] is a date known to a year, a month or a
//!   day, ordered and compared at the precision it actually has.
//! * A [`timeline::Connection`] joins a subject span to an object span
//!   through a [`timeline::ConnectionType`] (employment, residence,
//!   membership, …) and carries its own dated extent as a span.
//!
//! These core constructs are owned and deduplicated by "keeper" structures
//! (see the `timeline` module) enabling canonical sharing through `Arc`
//! while providing efficient lookup indexes for search and storytelling.
//!
//! ## Modules
//! * [`timeline`] – Spans, connections, connection types and their keepers.
//! * [`chronology`] – Partial dates and exact calendar arithmetic.
//! * [`validity`] – Connection rules: who may connect to whom, and when.
//! * [`search`] – Name search narrowed by type, vocabulary and visibility.
//! * [`story`] – Biography sentences and lifetime-aligned reflections.
//! * [`persist`] – SQLite persistence, restoration and the edit ledger.
//! * [`batch`] – Polled repair jobs that walk the timeline in batches.
//! * [`server`] – The JSON HTTP interface.
//!
//! ## Dates
//! Every date in the system may be partial: `1969`, `1969-07` and
//! `1969-07-20` are all valid and keep their precision. Durations between
//! dates are calendar-exact (years, then months, then days), so adding the
//! elapsed time back onto the earlier date always lands on the later one.
//!
//! ## Persistence
//! The [`persist::Persistor`] encapsulates SQLite schema creation and
//! durable storage for spans, connections and the vocabulary, along with a
//! hash-chained ledger of every edit. The [`timeline::Database`] wires a
//! persistor together with in-memory keepers and restores prior state on
//! startup.
//!
//! ## Quick Start
//! ```
//! use lifespan::persist::PersistenceMode;
//! use lifespan::timeline::{AccessLevel, Database, SpanState, SpanType};
//!
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let person = db.create_span(
//!     "Alice Example".to_owned(),
//!     SpanType::Person,
//!     Some("1950-06-15".parse().unwrap()),
//!     None,
//!     SpanState::Complete,
//!     AccessLevel::Public,
//! ).unwrap();
//! let employer = db.create_span(
//!     "Acme".to_owned(),
//!     SpanType::Organisation,
//!     Some("1932".parse().unwrap()),
//!     None,
//!     SpanState::Complete,
//!     AccessLevel::Public,
//! ).unwrap();
//! let job = db.create_connection(
//!     "employment",
//!     person.id(),
//!     employer.id(),
//!     Some("1972".parse().unwrap()),
//!     None,
//!     SpanState::Complete,
//! ).unwrap();
//! assert_eq!(job.connection_type().forward_predicate(), "worked for");
//! ```
//!
//! ## Status & Roadmap
//! The engine and its HTTP surface are stable enough to build on; the
//! storytelling side (sentence templates, reflection pairing) is still
//! evolving. Expect additions to the reserved vocabulary while the public
//! surface is being refined.
//!
//! ## License
//! Dual licensed under Apache-2.0 and MIT.

pub mod batch;
pub mod chronology;
pub mod error;
pub mod persist;
pub mod search;
pub mod server;
pub mod settings;
pub mod story;
pub mod timeline;
pub mod validity;
