//! Finding spans by name. Candidate sets are combined as bitsets over the
//! span identities, with small results kept out of the bitset entirely,
//! and the survivors are ranked so that prefix matches come before plain
//! substring matches.
use roaring::RoaringTreemap;

use std::sync::Arc;

use crate::error::Result;
use crate::timeline::{AccessLevel, Database, Span, SpanId, SpanState, SpanType};
use crate::validity::{allowed_span_types, Direction};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// A set of span identities in one of three shapes: no identity, exactly
/// one identity, or a bitset of many. Single results stay cheap and the
/// shape collapses back down as intersections shrink the set.
#[derive(Debug)]
pub enum ResultSet {
    Empty,
    One(SpanId),
    Many(RoaringTreemap),
}

impl ResultSet {
    pub fn new() -> Self {
        ResultSet::Empty
    }
    pub fn insert(&mut self, id: SpanId) {
        match self {
            ResultSet::Empty => {
                *self = ResultSet::One(id);
            }
            ResultSet::One(existing) => {
                let existing = *existing;
                if existing != id {
                    let mut many = RoaringTreemap::new();
                    many.insert(existing);
                    many.insert(id);
                    *self = ResultSet::Many(many);
                }
            }
            ResultSet::Many(many) => {
                many.insert(id);
            }
        }
    }
    pub fn intersect_with(&mut self, other: &ResultSet) {
        let replacement = match (&mut *self, other) {
            (ResultSet::Empty, _) => None,
            (_, ResultSet::Empty) => Some(ResultSet::Empty),
            (ResultSet::One(mine), ResultSet::One(theirs)) => {
                if *mine != *theirs {
                    Some(ResultSet::Empty)
                } else {
                    None
                }
            }
            (ResultSet::One(mine), ResultSet::Many(theirs)) => {
                if !theirs.contains(*mine) {
                    Some(ResultSet::Empty)
                } else {
                    None
                }
            }
            (ResultSet::Many(mine), ResultSet::One(theirs)) => {
                if mine.contains(*theirs) {
                    Some(ResultSet::One(*theirs))
                } else {
                    Some(ResultSet::Empty)
                }
            }
            (ResultSet::Many(mine), ResultSet::Many(theirs)) => {
                *mine &= theirs;
                match mine.len() {
                    0 => Some(ResultSet::Empty),
                    1 => mine.min().map(ResultSet::One),
                    _ => None,
                }
            }
        };
        if let Some(replacement) = replacement {
            *self = replacement;
        }
    }
    pub fn contains(&self, id: SpanId) -> bool {
        match self {
            ResultSet::Empty => false,
            ResultSet::One(existing) => *existing == id,
            ResultSet::Many(many) => many.contains(id),
        }
    }
    pub fn len(&self) -> u64 {
        match self {
            ResultSet::Empty => 0,
            ResultSet::One(_) => 1,
            ResultSet::Many(many) => many.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultSet::Empty)
    }
    pub fn iter(&self) -> Box<dyn Iterator<Item = SpanId> + '_> {
        match self {
            ResultSet::Empty => Box::new(std::iter::empty()),
            ResultSet::One(id) => Box::new(std::iter::once(*id)),
            ResultSet::Many(many) => Box::new(many.iter()),
        }
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new()
    }
}

/// What to look for. The type filters are unioned, and giving a connection
/// type narrows the types further to the vocabulary that type accepts in
/// the given direction, which is how pickers offer only sensible choices.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub types: Vec<SpanType>,
    pub connection_type: Option<String>,
    pub direction: Direction,
    pub include_placeholders: bool,
    pub include_private: bool,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            types: Vec::new(),
            connection_type: None,
            direction: Direction::Forward,
            include_placeholders: true,
            include_private: false,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub spans: Vec<Arc<Span>>,
    pub limited: bool,
}

/// Case-insensitive substring search over span names, narrowed by type and
/// visibility, ranked prefix-first and truncated to the query limit. The
/// `limited` flag tells the caller that more matches exist than were
/// returned.
pub fn search(db: &Database, query: &SearchQuery) -> Result<SearchOutcome> {
    let mut types = query.types.clone();
    if let Some(name) = &query.connection_type {
        let connection_type = db.connection_type(name)?;
        let allowed = allowed_span_types(&connection_type, query.direction);
        if types.is_empty() {
            types = allowed.to_vec();
        } else {
            types.retain(|t| allowed.contains(t));
            if types.is_empty() {
                return Ok(SearchOutcome {
                    spans: Vec::new(),
                    limited: false,
                });
            }
        }
    }
    let mut candidates = ResultSet::new();
    if types.is_empty() {
        // connection spans are bookkeeping, not something anyone looks up
        let keeper = db.span_keeper.lock().unwrap();
        for span in keeper.iter() {
            if span.span_type() != SpanType::Connection {
                candidates.insert(span.id());
            }
        }
    } else {
        let lookup = db.type_to_span_lookup.lock().unwrap();
        for span_type in &types {
            for id in lookup.lookup(span_type) {
                candidates.insert(*id);
            }
        }
    }
    let needle = query.text.trim().to_lowercase();
    if !needle.is_empty() {
        let mut named = ResultSet::new();
        let keeper = db.span_keeper.lock().unwrap();
        for span in keeper.iter() {
            if span.name().to_lowercase().contains(&needle) {
                named.insert(span.id());
            }
        }
        candidates.intersect_with(&named);
    }
    let mut matches: Vec<Arc<Span>> = Vec::new();
    {
        let keeper = db.span_keeper.lock().unwrap();
        for id in candidates.iter() {
            let Some(span) = keeper.get(&id) else {
                continue;
            };
            if span.state() == SpanState::Placeholder && !query.include_placeholders {
                continue;
            }
            if span.access() == AccessLevel::Private && !query.include_private {
                continue;
            }
            matches.push(span);
        }
    }
    matches.sort_by_key(|span| {
        let name = span.name().to_lowercase();
        (!name.starts_with(&needle), name, span.id())
    });
    let limited = matches.len() > query.limit;
    matches.truncate(query.limit);
    Ok(SearchOutcome {
        spans: matches,
        limited,
    })
}
