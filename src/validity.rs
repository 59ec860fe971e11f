//! The rules requests are checked against, each violation worded so it
//! can be shown as-is. Connection checking is driven entirely by the
//! connection type: which span types may take part, whether dates are
//! required, and whether the claimed extent can fall within the lifespans
//! of both endpoints. An empty violation list means the draft may be kept.
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::chronology::PartialDate;
use crate::timeline::{ConnectionType, Span, SpanState, SpanType, TemporalConstraint};

/// The side of a connection a span plays: `Forward` looks from the subject
/// towards the object, `Inverse` the other way around.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Inverse,
}

/// The span types a connection type accepts on the far side of the given
/// direction: `Forward` resolves the allowed object types, `Inverse` the
/// allowed subject types.
pub fn allowed_span_types(connection_type: &ConnectionType, direction: Direction) -> &[SpanType] {
    match direction {
        Direction::Forward => connection_type.allowed_object_types(),
        Direction::Inverse => connection_type.allowed_subject_types(),
    }
}

/// One broken rule, worded so it can be shown to the person making the
/// request as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    SubjectTypeNotAllowed {
        connection_type: String,
        span_type: SpanType,
    },
    ObjectTypeNotAllowed {
        connection_type: String,
        span_type: SpanType,
    },
    StartYearRequired {
        connection_type: String,
    },
    EndBeforeStart,
    SelfConnection,
    OutsideLifespan {
        name: String,
    },
    CompletionRequiresStart {
        name: String,
    },
    SubjectTypesRequired {
        connection_type: String,
    },
    ObjectTypesRequired {
        connection_type: String,
    },
    ExtentEditedDirectly {
        name: String,
    },
    ReflectionRequiresPerson {
        name: String,
        span_type: SpanType,
    },
    ReflectionRequiresBirthDate {
        name: String,
    },
}

// picks the article: "an employment connection" but "a residence connection"
pub(crate) fn an(noun: &str) -> String {
    match noun.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => format!("an {}", noun),
        _ => format!("a {}", noun),
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Violation::SubjectTypeNotAllowed {
                connection_type,
                span_type,
            } => write!(
                f,
                "The subject of {} connection cannot be {}",
                an(connection_type),
                an(span_type.name())
            ),
            Violation::ObjectTypeNotAllowed {
                connection_type,
                span_type,
            } => write!(
                f,
                "The object of {} connection cannot be {}",
                an(connection_type),
                an(span_type.name())
            ),
            Violation::StartYearRequired { connection_type } => write!(
                f,
                "A start year is required for {} connection",
                an(connection_type)
            ),
            Violation::EndBeforeStart => {
                write!(f, "The end date cannot come before the start date")
            }
            Violation::SelfConnection => write!(f, "A span cannot be connected to itself"),
            Violation::OutsideLifespan { name } => write!(
                f,
                "The connection dates fall outside the lifespan of {}",
                name
            ),
            Violation::CompletionRequiresStart { name } => write!(
                f,
                "A start date is required before {} can be marked complete",
                name
            ),
            Violation::SubjectTypesRequired { connection_type } => write!(
                f,
                "At least one subject type is required for {} connection",
                an(connection_type)
            ),
            Violation::ObjectTypesRequired { connection_type } => write!(
                f,
                "At least one object type is required for {} connection",
                an(connection_type)
            ),
            Violation::ExtentEditedDirectly { name } => write!(
                f,
                "The dates of {} can only be changed through its connection",
                name
            ),
            Violation::ReflectionRequiresPerson { name, span_type } => write!(
                f,
                "Reflections compare persons, but {} is {}",
                name,
                an(span_type.name())
            ),
            Violation::ReflectionRequiresBirthDate { name } => write!(
                f,
                "Reflections need a birth date for {}",
                name
            ),
        }
    }
}

/// A connection as proposed, before anything has been kept or persisted.
pub struct ConnectionDraft<'a> {
    pub connection_type: &'a ConnectionType,
    pub subject: &'a Span,
    pub object: &'a Span,
    pub start: Option<PartialDate>,
    pub end: Option<PartialDate>,
    pub state: SpanState,
}

/// Check a draft against every rule and collect what is broken. The checks
/// are deliberately forgiving about precision: a year-precision lifespan
/// admits any day within its boundary years, and only extents that cannot
/// possibly fit are flagged.
pub fn check(draft: &ConnectionDraft) -> Vec<Violation> {
    let mut violations = Vec::new();
    let connection_type = draft.connection_type;
    if draft.subject.id() == draft.object.id() {
        violations.push(Violation::SelfConnection);
    }
    if !connection_type
        .allowed_subject_types()
        .contains(&draft.subject.span_type())
    {
        violations.push(Violation::SubjectTypeNotAllowed {
            connection_type: connection_type.name().to_owned(),
            span_type: draft.subject.span_type(),
        });
    }
    if !connection_type
        .allowed_object_types()
        .contains(&draft.object.span_type())
    {
        violations.push(Violation::ObjectTypeNotAllowed {
            connection_type: connection_type.name().to_owned(),
            span_type: draft.object.span_type(),
        });
    }
    if connection_type.constraint() == TemporalConstraint::Dated
        && draft.state != SpanState::Placeholder
        && draft.start.is_none()
    {
        violations.push(Violation::StartYearRequired {
            connection_type: connection_type.name().to_owned(),
        });
    }
    if let (Some(start), Some(end)) = (draft.start, draft.end) {
        if end < start {
            violations.push(Violation::EndBeforeStart);
        }
    }
    if connection_type.constraint() == TemporalConstraint::Dated {
        for endpoint in [draft.subject, draft.object] {
            if !extent_fits(draft.start, draft.end, endpoint) {
                violations.push(Violation::OutsideLifespan {
                    name: endpoint.name().to_owned(),
                });
            }
        }
    }
    violations
}

// Whether the claimed extent could fall within the endpoint's own lifespan.
// Comparisons give the benefit of the doubt at both ends: the extent start
// is only too early when even its latest reading precedes the endpoint's
// earliest possible start, and the extent close (its start when open-ended)
// is only too late when even its earliest reading follows the endpoint's
// latest possible end.
fn extent_fits(start: Option<PartialDate>, end: Option<PartialDate>, endpoint: &Span) -> bool {
    if let (Some(start), Some(lower)) = (start, endpoint.start()) {
        if start.latest() < lower.earliest() {
            return false;
        }
    }
    let close = end.or(start);
    if let (Some(close), Some(upper)) = (close, endpoint.end()) {
        if close.earliest() > upper.latest() {
            return false;
        }
    }
    true
}
