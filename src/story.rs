//! Turning the recorded facts about a span into readable sentences: an
//! origin sentence, one sentence per dated connection, and an end sentence
//! with the age reached. Stories can be cut off at a date, which is also
//! how reflections show what a life looked like at somebody else's age.
use chrono::NaiveDate;

use std::collections::HashMap;
use std::sync::Arc;

use crate::chronology::{add_elapsed, elapsed_between, Elapsed, PartialDate};
use crate::error::{LifespanError, Result};
use crate::timeline::{Connection, ConnectionId, Database, Span, SpanId, SpanType};
use crate::validity::Violation;

#[derive(Debug)]
pub struct Story {
    pub span: SpanId,
    pub sentences: Vec<String>,
}

#[derive(Debug)]
pub struct Reflection {
    pub subject: SpanId,
    pub counterpart: SpanId,
    pub as_of: NaiveDate,
    pub age: Elapsed,
    pub story: Story,
}

// a sentence waiting for its place in the story
struct Episode {
    date: PartialDate,
    rank: u8,
    connection: ConnectionId,
    text: String,
}

/// The story of a span up to `as_of` (or all of it when `None`), told in
/// chronological order. Only dated connections are narrated, and repeat
/// connections of the same type to the same place, organisation or band
/// collapse into their earliest occurrence.
pub fn story(db: &Database, span_id: SpanId, as_of: Option<NaiveDate>) -> Result<Story> {
    let span = db.get_span(span_id)?;
    let mut episodes: Vec<Episode> = Vec::new();
    if let Some(start) = span.start() {
        if within(start, as_of) {
            episodes.push(Episode {
                date: start,
                rank: 0,
                connection: 0,
                text: format!(
                    "{} {} {}.",
                    span.name(),
                    origin_verb(span.span_type()),
                    start.phrase()
                ),
            });
        }
    }
    // earliest mention wins for container spans, everything else is kept
    type Mention = (PartialDate, Option<PartialDate>, Arc<Connection>, Arc<Span>);
    let mut containers: HashMap<(String, SpanId), Mention> = HashMap::new();
    let mut loose: Vec<Mention> = Vec::new();
    for connection in db.connections_for(span_id) {
        let (start, end) = db.connection_extent(&connection)?;
        let Some(start) = start else {
            continue;
        };
        if !within(start, as_of) {
            continue;
        }
        let other_id = if connection.subject() == span_id {
            connection.object()
        } else {
            connection.subject()
        };
        let other = db.get_span(other_id)?;
        if other.span_type().is_container() {
            let key = (connection.connection_type().name().to_owned(), other_id);
            let replace = match containers.get(&key) {
                Some((kept_start, _, kept_connection, _)) => {
                    (start.earliest(), connection.id())
                        < (kept_start.earliest(), kept_connection.id())
                }
                None => true,
            };
            if replace {
                containers.insert(key, (start, end, connection, other));
            }
        } else {
            loose.push((start, end, connection, other));
        }
    }
    for (start, end, connection, other) in containers.into_values().chain(loose) {
        let predicate = if connection.subject() == span_id {
            connection.connection_type().forward_predicate().to_owned()
        } else {
            connection.connection_type().inverse_predicate().to_owned()
        };
        episodes.push(Episode {
            date: start,
            rank: 1,
            connection: connection.id(),
            text: format!(
                "{} {} {} {}.",
                span.name(),
                predicate,
                other.name(),
                extent_phrase(start, end, as_of)
            ),
        });
    }
    if let Some(end) = span.end() {
        if within(end, as_of) {
            let mut text = format!("{} {} {}", span.name(), end_verb(span.span_type()), end.phrase());
            if let Some(start) = span.start() {
                let age = elapsed_between(start.earliest(), end.earliest());
                text.push_str(&format!(", aged {}", age.years));
            }
            text.push('.');
            episodes.push(Episode {
                date: end,
                rank: 2,
                connection: 0,
                text,
            });
        }
    }
    episodes.sort_by_key(|episode| (episode.date.earliest(), episode.rank, episode.connection));
    Ok(Story {
        span: span_id,
        sentences: episodes.into_iter().map(|episode| episode.text).collect(),
    })
}

/// The subject's story cut off at the date when the subject was exactly as
/// old as the counterpart is today. Two people born a lifetime apart can be
/// read side by side this way.
pub fn reflect(
    db: &Database,
    subject_id: SpanId,
    counterpart_id: SpanId,
    today: NaiveDate,
) -> Result<Reflection> {
    let subject = db.get_span(subject_id)?;
    let counterpart = db.get_span(counterpart_id)?;
    let subject_birth = birth_of(&subject)?;
    let counterpart_birth = birth_of(&counterpart)?;
    let age = elapsed_between(counterpart_birth, today);
    let as_of = add_elapsed(subject_birth, age);
    let story = story(db, subject_id, Some(as_of))?;
    Ok(Reflection {
        subject: subject_id,
        counterpart: counterpart_id,
        as_of,
        age,
        story,
    })
}

fn birth_of(span: &Span) -> Result<NaiveDate> {
    if span.span_type() != SpanType::Person {
        return Err(LifespanError::Validation(vec![
            Violation::ReflectionRequiresPerson {
                name: span.name().to_owned(),
                span_type: span.span_type(),
            },
        ]));
    }
    span.start().map(|date| date.earliest()).ok_or_else(|| {
        LifespanError::Validation(vec![Violation::ReflectionRequiresBirthDate {
            name: span.name().to_owned(),
        }])
    })
}

fn within(date: PartialDate, as_of: Option<NaiveDate>) -> bool {
    match as_of {
        Some(cutoff) => date.earliest() <= cutoff,
        None => true,
    }
}

// "in 1975" for a single moment, "from 1968 until 1970" for a closed
// extent, "from 1980 onward" when open-ended or still running at the
// cutoff the story is told up to.
fn extent_phrase(start: PartialDate, end: Option<PartialDate>, as_of: Option<NaiveDate>) -> String {
    let closed = match (end, as_of) {
        (Some(end), Some(cutoff)) if end.earliest() > cutoff => None,
        (end, _) => end,
    };
    match closed {
        Some(end) if end == start => format!("in {}", start.readable()),
        Some(end) => format!("from {} until {}", start.readable(), end.readable()),
        None => format!("from {} onward", start.readable()),
    }
}

fn origin_verb(span_type: SpanType) -> &'static str {
    match span_type {
        SpanType::Person => "was born",
        SpanType::Organisation => "was founded",
        SpanType::Band => "was formed",
        SpanType::Place => "was established",
        _ => "began",
    }
}

fn end_verb(span_type: SpanType) -> &'static str {
    match span_type {
        SpanType::Person => "died",
        SpanType::Organisation => "was dissolved",
        SpanType::Band => "broke up",
        _ => "ended",
    }
}
