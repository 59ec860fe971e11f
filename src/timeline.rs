use std::sync::{Arc, Mutex};

// used to keep the one-to-one mapping between slugs and span identities
use bimap::BiMap;

// keepers use HashMap or HashSet with a fast non-cryptographic hasher
use core::hash::{BuildHasher, BuildHasherDefault, Hasher};
use seahash::SeaHasher;
use std::collections::hash_map::{Entry, RandomState};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

// custom made ordering for connection types
use std::cmp::Ordering;

// used to print out readable forms of spans and connections
use std::fmt;
use std::str::FromStr;

// span types, states and access levels travel through the JSON api
use serde::{Deserialize, Serialize};

// our own stuff that we need
use crate::chronology::PartialDate;
use crate::error::{LifespanError, Result};
use crate::persist::{PersistenceMode, Persistor};
use crate::validity::{check, ConnectionDraft, Violation};

// ------------- Identities -------------
pub type SpanId = u64;
pub type ConnectionId = u64;

pub type IdHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: SpanId = 0;

/// Hands out identities for spans and connections from one shared sequence.
/// Identities may only be implicitly created, but restoring a persisted
/// timeline retains the identities it reads back, and deleting releases an
/// identity for reuse.
#[derive(Debug)]
pub struct IdGenerator {
    lower_bound: u64,
    retained: HashSet<u64, IdHasher>,
    released: Vec<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::<u64, IdHasher>::default(),
            released: Vec::new(),
        }
    }
    pub fn retain(&mut self, id: u64) {
        self.retained.insert(id);
        if id > self.lower_bound {
            self.lower_bound = id;
        }
    }
    pub fn release(&mut self, id: u64) {
        if self.retained.remove(&id) {
            self.released.push(id);
        }
    }
    pub fn generate(&mut self) -> u64 {
        self.released.pop().unwrap_or_else(|| {
            self.lower_bound += 1;
            self.retained.insert(self.lower_bound);
            self.lower_bound
        })
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Vocabulary -------------
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanType {
    Person,
    Organisation,
    Place,
    Event,
    Thing,
    Band,
    Role,
    Connection,
}

impl SpanType {
    pub fn name(&self) -> &'static str {
        match self {
            SpanType::Person => "person",
            SpanType::Organisation => "organisation",
            SpanType::Place => "place",
            SpanType::Event => "event",
            SpanType::Thing => "thing",
            SpanType::Band => "band",
            SpanType::Role => "role",
            SpanType::Connection => "connection",
        }
    }
    // containers soak up repeat visits when a story is told
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SpanType::Place | SpanType::Organisation | SpanType::Band
        )
    }
}
impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for SpanType {
    type Err = LifespanError;
    fn from_str(text: &str) -> Result<Self> {
        match text {
            "person" => Ok(SpanType::Person),
            "organisation" => Ok(SpanType::Organisation),
            "place" => Ok(SpanType::Place),
            "event" => Ok(SpanType::Event),
            "thing" => Ok(SpanType::Thing),
            "band" => Ok(SpanType::Band),
            "role" => Ok(SpanType::Role),
            "connection" => Ok(SpanType::Connection),
            _ => Err(LifespanError::Parse {
                message: format!("'{}' is not a span type", text),
            }),
        }
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanState {
    Placeholder,
    Draft,
    Complete,
}

impl SpanState {
    pub fn name(&self) -> &'static str {
        match self {
            SpanState::Placeholder => "placeholder",
            SpanState::Draft => "draft",
            SpanState::Complete => "complete",
        }
    }
}
impl fmt::Display for SpanState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for SpanState {
    type Err = LifespanError;
    fn from_str(text: &str) -> Result<Self> {
        match text {
            "placeholder" => Ok(SpanState::Placeholder),
            "draft" => Ok(SpanState::Draft),
            "complete" => Ok(SpanState::Complete),
            _ => Err(LifespanError::Parse {
                message: format!("'{}' is not a span state", text),
            }),
        }
    }
}

/// Access levels order by openness, so the more restrictive of two levels
/// is simply their minimum.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Private,
    Shared,
    Public,
}

impl AccessLevel {
    pub fn name(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Shared => "shared",
            AccessLevel::Public => "public",
        }
    }
    pub fn more_restrictive(self, other: AccessLevel) -> AccessLevel {
        self.min(other)
    }
}
impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for AccessLevel {
    type Err = LifespanError;
    fn from_str(text: &str) -> Result<Self> {
        match text {
            "private" => Ok(AccessLevel::Private),
            "shared" => Ok(AccessLevel::Shared),
            "public" => Ok(AccessLevel::Public),
            _ => Err(LifespanError::Parse {
                message: format!("'{}' is not an access level", text),
            }),
        }
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalConstraint {
    Timeless,
    Dated,
}

impl TemporalConstraint {
    pub fn name(&self) -> &'static str {
        match self {
            TemporalConstraint::Timeless => "timeless",
            TemporalConstraint::Dated => "dated",
        }
    }
}
impl fmt::Display for TemporalConstraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for TemporalConstraint {
    type Err = LifespanError;
    fn from_str(text: &str) -> Result<Self> {
        match text {
            "timeless" => Ok(TemporalConstraint::Timeless),
            "dated" => Ok(TemporalConstraint::Dated),
            _ => Err(LifespanError::Parse {
                message: format!("'{}' is not a temporal constraint", text),
            }),
        }
    }
}

// ------------- Span -------------
/// Something that existed for a stretch of time: a person, an organisation,
/// a place, an event, a thing, a band, a role, or the extent of a
/// connection. Spans are immutable once created; an edit produces a
/// successor value under the same identity with a bumped version.
#[derive(Debug)]
pub struct Span {
    id: SpanId,
    name: String,
    slug: Option<String>,
    span_type: SpanType,
    start: Option<PartialDate>,
    end: Option<PartialDate>,
    state: SpanState,
    access: AccessLevel,
    version: u64,
}

impl Span {
    pub fn new(
        id: SpanId,
        name: String,
        slug: Option<String>,
        span_type: SpanType,
        start: Option<PartialDate>,
        end: Option<PartialDate>,
        state: SpanState,
        access: AccessLevel,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            slug,
            span_type,
            start,
            end,
            state,
            access,
            version,
        }
    }
    // It's intentional to encapsulate the fields of the struct and only
    // expose them using "getters", because this yields true immutability
    // for spans after creation.
    pub fn id(&self) -> SpanId {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }
    pub fn span_type(&self) -> SpanType {
        self.span_type
    }
    pub fn start(&self) -> Option<PartialDate> {
        self.start
    }
    pub fn end(&self) -> Option<PartialDate> {
        self.end
    }
    pub fn state(&self) -> SpanState {
        self.state
    }
    pub fn access(&self) -> AccessLevel {
        self.access
    }
    pub fn version(&self) -> u64 {
        self.version
    }
}
impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let start = self
            .start
            .map(|d| d.to_string())
            .unwrap_or_else(|| String::from("?"));
        let end = self
            .end
            .map(|d| d.to_string())
            .unwrap_or_else(|| String::from("?"));
        write!(
            f,
            "{} \"{}\" [{}] {}..{} {}/{} v{}",
            self.id, self.name, self.span_type, start, end, self.state, self.access, self.version
        )
    }
}

/// The changes an edit asks for. Fields left as `None` keep their current
/// value, and `expected_version` (when given) must match the version being
/// replaced or the edit is refused.
#[derive(Debug, Default, Deserialize)]
pub struct SpanEdit {
    pub name: Option<String>,
    pub start: Option<PartialDate>,
    pub end: Option<PartialDate>,
    pub state: Option<SpanState>,
    pub access: Option<AccessLevel>,
    pub expected_version: Option<u64>,
}

#[derive(Debug)]
pub struct SpanKeeper {
    kept: HashMap<SpanId, Arc<Span>, IdHasher>,
    slugs: BiMap<String, SpanId>,
}
impl SpanKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            slugs: BiMap::new(),
        }
    }
    // Keeping a span under an identity that is already kept replaces the
    // kept value, which is how versioned successors take effect.
    pub fn keep(&mut self, span: Span) -> Arc<Span> {
        let keepsake = Arc::new(span);
        self.slugs.remove_by_right(&keepsake.id());
        if let Some(slug) = keepsake.slug() {
            self.slugs.insert(slug.to_owned(), keepsake.id());
        }
        self.kept.insert(keepsake.id(), Arc::clone(&keepsake));
        keepsake
    }
    pub fn get(&self, id: &SpanId) -> Option<Arc<Span>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn by_slug(&self, slug: &str) -> Option<SpanId> {
        self.slugs.get_by_left(slug).copied()
    }
    pub fn remove(&mut self, id: &SpanId) -> Option<Arc<Span>> {
        self.slugs.remove_by_right(id);
        self.kept.remove(id)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Span>> {
        self.kept.values()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
impl Default for SpanKeeper {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- ConnectionType -------------
/// One entry in the constrained vocabulary of ways spans relate, such as
/// "employment" or "residence". The reserved entries ship with every
/// timeline; further ones can be defined at runtime.
#[derive(Eq, Debug)]
pub struct ConnectionType {
    name: String,
    forward_predicate: String,
    inverse_predicate: String,
    constraint: TemporalConstraint,
    allowed_subject_types: Vec<SpanType>,
    allowed_object_types: Vec<SpanType>,
    reserved: bool,
}

impl ConnectionType {
    pub fn new(
        name: String,
        forward_predicate: String,
        inverse_predicate: String,
        constraint: TemporalConstraint,
        allowed_subject_types: Vec<SpanType>,
        allowed_object_types: Vec<SpanType>,
        reserved: bool,
    ) -> Self {
        Self {
            name,
            forward_predicate,
            inverse_predicate,
            constraint,
            allowed_subject_types,
            allowed_object_types,
            reserved,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn forward_predicate(&self) -> &str {
        &self.forward_predicate
    }
    pub fn inverse_predicate(&self) -> &str {
        &self.inverse_predicate
    }
    pub fn constraint(&self) -> TemporalConstraint {
        self.constraint
    }
    pub fn allowed_subject_types(&self) -> &[SpanType] {
        &self.allowed_subject_types
    }
    pub fn allowed_object_types(&self) -> &[SpanType] {
        &self.allowed_object_types
    }
    pub fn reserved(&self) -> bool {
        self.reserved
    }
}
impl Ord for ConnectionType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
impl PartialOrd for ConnectionType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for ConnectionType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Hash for ConnectionType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let subjects: Vec<&str> = self.allowed_subject_types.iter().map(|t| t.name()).collect();
        let objects: Vec<&str> = self.allowed_object_types.iter().map(|t| t.name()).collect();
        write!(
            f,
            "{} ({}) [{}] -> [{}]",
            self.name,
            self.constraint,
            subjects.join(","),
            objects.join(",")
        )
    }
}

#[derive(Debug)]
pub struct ConnectionTypeKeeper {
    kept: HashMap<String, Arc<ConnectionType>, OtherHasher>,
}
impl ConnectionTypeKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
        }
    }
    pub fn keep(&mut self, connection_type: ConnectionType) -> (Arc<ConnectionType>, bool) {
        let keepsake = connection_type.name().to_owned();
        match self.kept.entry(keepsake) {
            Entry::Vacant(e) => {
                let kept = Arc::new(connection_type);
                e.insert(Arc::clone(&kept));
                (kept, false)
            }
            Entry::Occupied(e) => (Arc::clone(e.get()), true),
        }
    }
    pub fn get(&self, name: &str) -> Option<Arc<ConnectionType>> {
        self.kept.get(name).map(Arc::clone)
    }
    pub fn all(&self) -> Vec<Arc<ConnectionType>> {
        let mut types: Vec<Arc<ConnectionType>> = self.kept.values().map(Arc::clone).collect();
        types.sort();
        types
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
impl Default for ConnectionTypeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

// The vocabulary every fresh timeline starts out with.
fn reserved_connection_types() -> Vec<ConnectionType> {
    use SpanType::*;
    use TemporalConstraint::*;
    let entry = |name: &str,
                 forward: &str,
                 inverse: &str,
                 constraint: TemporalConstraint,
                 subjects: Vec<SpanType>,
                 objects: Vec<SpanType>| {
        ConnectionType::new(
            name.to_owned(),
            forward.to_owned(),
            inverse.to_owned(),
            constraint,
            subjects,
            objects,
            true,
        )
    };
    vec![
        entry("family", "is parent of", "is child of", Timeless, vec![Person], vec![Person]),
        entry("friend", "is friend of", "is friend of", Timeless, vec![Person], vec![Person]),
        entry("relationship", "has relationship with", "has relationship with", Dated, vec![Person], vec![Person]),
        entry("residence", "lived in", "was home to", Dated, vec![Person], vec![Place]),
        entry("employment", "worked for", "employed", Dated, vec![Person], vec![Organisation]),
        entry("education", "studied at", "educated", Dated, vec![Person], vec![Organisation]),
        entry("membership", "was member of", "had member", Dated, vec![Person], vec![Organisation, Band]),
        entry("travel", "travelled to", "was visited by", Dated, vec![Person], vec![Place]),
        entry("participation", "participated in", "had participant", Dated, vec![Person], vec![Event]),
        entry("ownership", "owned", "was owned by", Dated, vec![Person], vec![Thing, Place, Organisation]),
        entry("created", "created", "was created by", Dated, vec![Person, Band, Organisation], vec![Thing, Band, Organisation]),
        entry("contains", "contains", "is contained within", Timeless, vec![Place], vec![Place]),
        entry("has_role", "has role", "is role of", Dated, vec![Person], vec![Role]),
    ]
}

// ------------- Connection -------------
/// A typed, directed edge between two spans. The temporal extent of the
/// connection lives on a span of its own, owned by the connection, so that
/// extents are versioned and dated exactly like everything else.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    connection_type: Arc<ConnectionType>,
    subject: SpanId,
    object: SpanId,
    connection_span: SpanId,
    state: SpanState,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        connection_type: Arc<ConnectionType>,
        subject: SpanId,
        object: SpanId,
        connection_span: SpanId,
        state: SpanState,
    ) -> Self {
        Self {
            id,
            connection_type,
            subject,
            object,
            connection_span,
            state,
        }
    }
    pub fn id(&self) -> ConnectionId {
        self.id
    }
    pub fn connection_type(&self) -> Arc<ConnectionType> {
        Arc::clone(&self.connection_type)
    }
    pub fn subject(&self) -> SpanId {
        self.subject
    }
    pub fn object(&self) -> SpanId {
        self.object
    }
    pub fn connection_span(&self) -> SpanId {
        self.connection_span
    }
    pub fn state(&self) -> SpanState {
        self.state
    }
}
impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} -> {} via {} {}",
            self.id,
            self.connection_type.name(),
            self.subject,
            self.object,
            self.connection_span,
            self.state
        )
    }
}

/// The changes an edit asks for on a connection: its extent and its state.
/// Endpoints and type are fixed for the life of the connection.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionEdit {
    pub start: Option<PartialDate>,
    pub end: Option<PartialDate>,
    pub state: Option<SpanState>,
}

#[derive(Debug)]
pub struct ConnectionKeeper {
    kept: HashMap<ConnectionId, Arc<Connection>, IdHasher>,
}
impl ConnectionKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
        }
    }
    pub fn keep(&mut self, connection: Connection) -> Arc<Connection> {
        let keepsake = Arc::new(connection);
        self.kept.insert(keepsake.id(), Arc::clone(&keepsake));
        keepsake
    }
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.kept.get(id).map(Arc::clone)
    }
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.kept.remove(id)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.kept.values()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
impl Default for ConnectionKeeper {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, HashSet<V>, H>,
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, HashSet<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        let map = self.index.entry(key).or_default();
        map.insert(value);
    }
    pub fn lookup(&self, key: &K) -> impl Iterator<Item = &V> {
        self.index.get(key).into_iter().flatten()
    }
    pub fn remove(&mut self, key: &K, value: &V) {
        if let Some(map) = self.index.get_mut(key) {
            map.remove(value);
            if map.is_empty() {
                self.index.remove(key);
            }
        }
    }
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Database -------------
// This sets up the timeline engine with the necessary structures
pub struct Database {
    // owns an identity generator shared by spans and connections
    pub id_generator: Arc<Mutex<IdGenerator>>,
    // owns keepers for the available constructs
    pub span_keeper: Arc<Mutex<SpanKeeper>>,
    pub connection_keeper: Arc<Mutex<ConnectionKeeper>>,
    pub connection_type_keeper: Arc<Mutex<ConnectionTypeKeeper>>,
    // owns lookups between constructs (similar to database indexes)
    pub subject_to_connection_lookup: Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>>,
    pub object_to_connection_lookup: Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>>,
    pub connection_span_to_connection_lookup: Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>>,
    pub type_to_span_lookup: Arc<Mutex<Lookup<SpanType, SpanId, OtherHasher>>>,
    // responsible for the persistence layer
    pub persistor: Arc<Mutex<Persistor>>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        let persistor = Persistor::new(&mode)?;

        // Create the database so that we can prime it before returning it
        let database = Database {
            id_generator: Arc::new(Mutex::new(IdGenerator::new())),
            span_keeper: Arc::new(Mutex::new(SpanKeeper::new())),
            connection_keeper: Arc::new(Mutex::new(ConnectionKeeper::new())),
            connection_type_keeper: Arc::new(Mutex::new(ConnectionTypeKeeper::new())),
            subject_to_connection_lookup: Arc::new(Mutex::new(Lookup::new())),
            object_to_connection_lookup: Arc::new(Mutex::new(Lookup::new())),
            connection_span_to_connection_lookup: Arc::new(Mutex::new(Lookup::new())),
            type_to_span_lookup: Arc::new(Mutex::new(Lookup::new())),
            persistor: Arc::new(Mutex::new(persistor)),
        };

        // Restore the existing timeline
        database
            .persistor
            .lock()
            .unwrap()
            .restore_connection_types(&database)?;
        database.persistor.lock().unwrap().restore_spans(&database)?;
        database
            .persistor
            .lock()
            .unwrap()
            .restore_connections(&database)?;

        // Reserve the connection type vocabulary that ships with every
        // timeline. Restored entries are simply kept again, so this only
        // writes on a fresh database.
        for connection_type in reserved_connection_types() {
            database.create_connection_type(connection_type)?;
        }

        Ok(database)
    }
    // functions to access the owned generator and keepers
    pub fn id_generator(&self) -> Arc<Mutex<IdGenerator>> {
        Arc::clone(&self.id_generator)
    }
    pub fn span_keeper(&self) -> Arc<Mutex<SpanKeeper>> {
        Arc::clone(&self.span_keeper)
    }
    pub fn connection_keeper(&self) -> Arc<Mutex<ConnectionKeeper>> {
        Arc::clone(&self.connection_keeper)
    }
    pub fn connection_type_keeper(&self) -> Arc<Mutex<ConnectionTypeKeeper>> {
        Arc::clone(&self.connection_type_keeper)
    }
    pub fn subject_to_connection_lookup(
        &self,
    ) -> Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>> {
        Arc::clone(&self.subject_to_connection_lookup)
    }
    pub fn object_to_connection_lookup(
        &self,
    ) -> Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>> {
        Arc::clone(&self.object_to_connection_lookup)
    }
    pub fn connection_span_to_connection_lookup(
        &self,
    ) -> Arc<Mutex<Lookup<SpanId, ConnectionId, IdHasher>>> {
        Arc::clone(&self.connection_span_to_connection_lookup)
    }
    pub fn type_to_span_lookup(&self) -> Arc<Mutex<Lookup<SpanType, SpanId, OtherHasher>>> {
        Arc::clone(&self.type_to_span_lookup)
    }
    pub fn persistor(&self) -> Arc<Mutex<Persistor>> {
        Arc::clone(&self.persistor)
    }

    // ------------- Spans -------------
    pub fn create_span(
        &self,
        name: String,
        span_type: SpanType,
        start: Option<PartialDate>,
        end: Option<PartialDate>,
        state: SpanState,
        access: AccessLevel,
    ) -> Result<Arc<Span>> {
        let violations = span_rules(&name, span_type, start, end, state);
        if !violations.is_empty() {
            return Err(LifespanError::Validation(violations));
        }
        let slug = if state == SpanState::Placeholder || span_type == SpanType::Connection {
            None
        } else {
            self.unique_slug(&name)
        };
        let id = self.id_generator.lock().unwrap().generate();
        let span = Span::new(id, name, slug, span_type, start, end, state, access, 1);
        // nothing is kept until the persistor has accepted the row
        if let Err(error) = self.persistor.lock().unwrap().persist_span(&span) {
            self.id_generator.lock().unwrap().release(id);
            return Err(error);
        }
        let span = self.span_keeper.lock().unwrap().keep(span);
        self.type_to_span_lookup
            .lock()
            .unwrap()
            .insert(span_type, id);
        Ok(span)
    }
    /// The least that can be said about something: a name and a type. Used
    /// when a span is mentioned before anyone sits down to describe it.
    pub fn create_placeholder(&self, name: String, span_type: SpanType) -> Result<Arc<Span>> {
        self.create_span(
            name,
            span_type,
            None,
            None,
            SpanState::Placeholder,
            AccessLevel::Private,
        )
    }
    pub fn get_span(&self, id: SpanId) -> Result<Arc<Span>> {
        self.span_keeper
            .lock()
            .unwrap()
            .get(&id)
            .ok_or(LifespanError::NotFound {
                kind: "span",
                id: id.to_string(),
            })
    }
    pub fn span_by_slug(&self, slug: &str) -> Result<Arc<Span>> {
        let id = self
            .span_keeper
            .lock()
            .unwrap()
            .by_slug(slug)
            .ok_or(LifespanError::NotFound {
                kind: "span",
                id: slug.to_owned(),
            })?;
        self.get_span(id)
    }
    pub fn update_span(&self, id: SpanId, edit: SpanEdit) -> Result<Arc<Span>> {
        let current = self.get_span(id)?;
        // the dates on a connection span belong to its connection, whose
        // update path re-checks them against both endpoints
        if current.span_type() == SpanType::Connection
            && (edit.start.is_some() || edit.end.is_some())
        {
            return Err(LifespanError::Validation(vec![
                Violation::ExtentEditedDirectly {
                    name: current.name().to_owned(),
                },
            ]));
        }
        if let Some(expected) = edit.expected_version {
            if expected != current.version() {
                return Err(LifespanError::VersionConflict {
                    expected,
                    actual: current.version(),
                });
            }
        }
        let name = edit.name.unwrap_or_else(|| current.name().to_owned());
        let start = edit.start.or(current.start());
        let end = edit.end.or(current.end());
        let state = edit.state.unwrap_or(current.state());
        let access = edit.access.unwrap_or(current.access());
        let violations = span_rules(&name, current.span_type(), start, end, state);
        if !violations.is_empty() {
            return Err(LifespanError::Validation(violations));
        }
        // slugs survive renames, so links to the span keep working
        let successor = self.span_keeper.lock().unwrap().keep(Span::new(
            id,
            name,
            current.slug().map(|s| s.to_owned()),
            current.span_type(),
            start,
            end,
            state,
            access,
            current.version() + 1,
        ));
        self.persistor.lock().unwrap().persist_span(&successor)?;
        Ok(successor)
    }
    /// Removes a span together with every connection that touches it,
    /// including each removed connection's own connection span. Deleting a
    /// connection span directly removes the connection that owns it.
    pub fn delete_span(&self, id: SpanId) -> Result<()> {
        self.get_span(id)?;
        let mut touching: Vec<ConnectionId> = Vec::new();
        {
            let lookup = self.subject_to_connection_lookup.lock().unwrap();
            touching.extend(lookup.lookup(&id).copied());
        }
        {
            let lookup = self.object_to_connection_lookup.lock().unwrap();
            touching.extend(lookup.lookup(&id).copied());
        }
        {
            let lookup = self.connection_span_to_connection_lookup.lock().unwrap();
            touching.extend(lookup.lookup(&id).copied());
        }
        touching.sort_unstable();
        touching.dedup();
        for connection_id in touching {
            if self
                .connection_keeper
                .lock()
                .unwrap()
                .get(&connection_id)
                .is_some()
            {
                self.delete_connection(connection_id)?;
            }
        }
        // when the span was a connection span the cascade has already
        // removed it
        if self.span_keeper.lock().unwrap().get(&id).is_some() {
            self.remove_span_record(id)?;
        }
        Ok(())
    }

    // ------------- Connections -------------
    pub fn create_connection(
        &self,
        type_name: &str,
        subject_id: SpanId,
        object_id: SpanId,
        start: Option<PartialDate>,
        end: Option<PartialDate>,
        state: SpanState,
    ) -> Result<Arc<Connection>> {
        let connection_type = self.connection_type(type_name)?;
        let subject = self.get_span(subject_id)?;
        let object = self.get_span(object_id)?;
        let violations = check(&ConnectionDraft {
            connection_type: &connection_type,
            subject: &subject,
            object: &object,
            start,
            end,
            state,
        });
        if !violations.is_empty() {
            return Err(LifespanError::Validation(violations));
        }
        // the connection span inherits the more restrictive access level
        // of its endpoints and reads as a sentence fragment
        let access = subject.access().more_restrictive(object.access());
        let name = format!(
            "{} {} {}",
            subject.name(),
            connection_type.forward_predicate(),
            object.name()
        );
        let connection_span_id = self.id_generator.lock().unwrap().generate();
        let connection_span = Span::new(
            connection_span_id,
            name,
            None,
            SpanType::Connection,
            start,
            end,
            state,
            access,
            1,
        );
        // nothing is kept until the persistor has accepted the rows
        if let Err(error) = self.persistor.lock().unwrap().persist_span(&connection_span) {
            self.id_generator.lock().unwrap().release(connection_span_id);
            return Err(error);
        }
        self.span_keeper.lock().unwrap().keep(connection_span);
        self.type_to_span_lookup
            .lock()
            .unwrap()
            .insert(SpanType::Connection, connection_span_id);
        let connection_id = self.id_generator.lock().unwrap().generate();
        let connection = Connection::new(
            connection_id,
            connection_type,
            subject_id,
            object_id,
            connection_span_id,
            state,
        );
        if let Err(error) = self
            .persistor
            .lock()
            .unwrap()
            .persist_connection(&connection)
        {
            self.id_generator.lock().unwrap().release(connection_id);
            return Err(error);
        }
        let connection = self.connection_keeper.lock().unwrap().keep(connection);
        self.subject_to_connection_lookup
            .lock()
            .unwrap()
            .insert(subject_id, connection_id);
        self.object_to_connection_lookup
            .lock()
            .unwrap()
            .insert(object_id, connection_id);
        self.connection_span_to_connection_lookup
            .lock()
            .unwrap()
            .insert(connection_span_id, connection_id);
        Ok(connection)
    }
    pub fn get_connection(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.connection_keeper
            .lock()
            .unwrap()
            .get(&id)
            .ok_or(LifespanError::NotFound {
                kind: "connection",
                id: id.to_string(),
            })
    }
    pub fn update_connection(
        &self,
        id: ConnectionId,
        edit: ConnectionEdit,
    ) -> Result<Arc<Connection>> {
        let current = self.get_connection(id)?;
        let connection_type = current.connection_type();
        let extent = self.get_span(current.connection_span())?;
        let subject = self.get_span(current.subject())?;
        let object = self.get_span(current.object())?;
        let start = edit.start.or(extent.start());
        let end = edit.end.or(extent.end());
        let state = edit.state.unwrap_or(current.state());
        let violations = check(&ConnectionDraft {
            connection_type: &connection_type,
            subject: &subject,
            object: &object,
            start,
            end,
            state,
        });
        if !violations.is_empty() {
            return Err(LifespanError::Validation(violations));
        }
        let access = subject.access().more_restrictive(object.access());
        let successor_span = self.span_keeper.lock().unwrap().keep(Span::new(
            extent.id(),
            extent.name().to_owned(),
            None,
            SpanType::Connection,
            start,
            end,
            state,
            access,
            extent.version() + 1,
        ));
        self.persistor
            .lock()
            .unwrap()
            .persist_span(&successor_span)?;
        let successor = self.connection_keeper.lock().unwrap().keep(Connection::new(
            id,
            connection_type,
            current.subject(),
            current.object(),
            current.connection_span(),
            state,
        ));
        self.persistor
            .lock()
            .unwrap()
            .persist_connection(&successor)?;
        Ok(successor)
    }
    pub fn delete_connection(&self, id: ConnectionId) -> Result<()> {
        let connection = self.get_connection(id)?;
        self.connection_keeper.lock().unwrap().remove(&id);
        self.subject_to_connection_lookup
            .lock()
            .unwrap()
            .remove(&connection.subject(), &id);
        self.object_to_connection_lookup
            .lock()
            .unwrap()
            .remove(&connection.object(), &id);
        self.connection_span_to_connection_lookup
            .lock()
            .unwrap()
            .remove(&connection.connection_span(), &id);
        self.persistor
            .lock()
            .unwrap()
            .forget_connection(&connection)?;
        self.id_generator.lock().unwrap().release(id);
        self.remove_span_record(connection.connection_span())?;
        Ok(())
    }
    /// Every connection the span takes part in, as subject or object,
    /// ordered by connection identity.
    pub fn connections_for(&self, id: SpanId) -> Vec<Arc<Connection>> {
        let mut ids: Vec<ConnectionId> = Vec::new();
        {
            let lookup = self.subject_to_connection_lookup.lock().unwrap();
            ids.extend(lookup.lookup(&id).copied());
        }
        {
            let lookup = self.object_to_connection_lookup.lock().unwrap();
            ids.extend(lookup.lookup(&id).copied());
        }
        ids.sort_unstable();
        ids.dedup();
        let keeper = self.connection_keeper.lock().unwrap();
        ids.iter().filter_map(|id| keeper.get(id)).collect()
    }
    /// The extent of a connection as recorded on its connection span.
    pub fn connection_extent(
        &self,
        connection: &Connection,
    ) -> Result<(Option<PartialDate>, Option<PartialDate>)> {
        let extent = self.get_span(connection.connection_span())?;
        Ok((extent.start(), extent.end()))
    }

    // ------------- Connection types -------------
    pub fn connection_type(&self, name: &str) -> Result<Arc<ConnectionType>> {
        self.connection_type_keeper
            .lock()
            .unwrap()
            .get(name)
            .ok_or_else(|| LifespanError::NotFound {
                kind: "connection type",
                id: name.to_owned(),
            })
    }
    pub fn connection_types(&self) -> Vec<Arc<ConnectionType>> {
        self.connection_type_keeper.lock().unwrap().all()
    }
    pub fn create_connection_type(
        &self,
        connection_type: ConnectionType,
    ) -> Result<(Arc<ConnectionType>, bool)> {
        let mut violations = Vec::new();
        if connection_type.allowed_subject_types().is_empty() {
            violations.push(Violation::SubjectTypesRequired {
                connection_type: connection_type.name().to_owned(),
            });
        }
        if connection_type.allowed_object_types().is_empty() {
            violations.push(Violation::ObjectTypesRequired {
                connection_type: connection_type.name().to_owned(),
            });
        }
        if !violations.is_empty() {
            return Err(LifespanError::Validation(violations));
        }
        let (kept, previously_kept) = self
            .connection_type_keeper
            .lock()
            .unwrap()
            .keep(connection_type);
        if !previously_kept {
            self.persistor
                .lock()
                .unwrap()
                .persist_connection_type(&kept)?;
        }
        Ok((kept, previously_kept))
    }

    // ------------- Repairs -------------
    /// Gives a span the slug it should have had: non-placeholder spans with
    /// a name deserve one. The span may have been deleted since the repair
    /// was planned, in which case there is nothing to do. Returns whether
    /// anything changed.
    pub fn assign_missing_slug(&self, id: SpanId) -> Result<bool> {
        let span = match self.span_keeper.lock().unwrap().get(&id) {
            Some(span) => span,
            None => return Ok(false),
        };
        if span.slug().is_some()
            || span.state() == SpanState::Placeholder
            || span.span_type() == SpanType::Connection
        {
            return Ok(false);
        }
        let slug = match self.unique_slug(span.name()) {
            Some(slug) => slug,
            None => return Ok(false),
        };
        let successor = self.span_keeper.lock().unwrap().keep(Span::new(
            span.id(),
            span.name().to_owned(),
            Some(slug),
            span.span_type(),
            span.start(),
            span.end(),
            span.state(),
            span.access(),
            span.version() + 1,
        ));
        self.persistor.lock().unwrap().persist_span(&successor)?;
        Ok(true)
    }
    /// Realigns a connection span's access level with the more restrictive
    /// of its endpoints, for connections recorded before an endpoint was
    /// locked down (or opened up). Returns whether anything changed.
    pub fn align_connection_access(&self, id: ConnectionId) -> Result<bool> {
        let connection = match self.connection_keeper.lock().unwrap().get(&id) {
            Some(connection) => connection,
            None => return Ok(false),
        };
        let subject = self.get_span(connection.subject())?;
        let object = self.get_span(connection.object())?;
        let extent = self.get_span(connection.connection_span())?;
        let access = subject.access().more_restrictive(object.access());
        if extent.access() == access {
            return Ok(false);
        }
        let successor = self.span_keeper.lock().unwrap().keep(Span::new(
            extent.id(),
            extent.name().to_owned(),
            None,
            SpanType::Connection,
            extent.start(),
            extent.end(),
            extent.state(),
            access,
            extent.version() + 1,
        ));
        self.persistor.lock().unwrap().persist_span(&successor)?;
        Ok(true)
    }

    // ------------- Internals -------------
    fn remove_span_record(&self, id: SpanId) -> Result<()> {
        let removed = self.span_keeper.lock().unwrap().remove(&id);
        if let Some(span) = removed {
            self.type_to_span_lookup
                .lock()
                .unwrap()
                .remove(&span.span_type(), &id);
            self.persistor.lock().unwrap().forget_span(&span)?;
            self.id_generator.lock().unwrap().release(id);
        }
        Ok(())
    }
    // A free slug derived from the name, with a numeric suffix when the
    // name is already taken.
    fn unique_slug(&self, name: &str) -> Option<String> {
        let base = slugify(name)?;
        let keeper = self.span_keeper.lock().unwrap();
        if keeper.by_slug(&base).is_none() {
            return Some(base);
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if keeper.by_slug(&candidate).is_none() {
                return Some(candidate);
            }
            suffix += 1;
        }
    }
}

// the rules a span must satisfy regardless of how it came about
fn span_rules(
    name: &str,
    span_type: SpanType,
    start: Option<PartialDate>,
    end: Option<PartialDate>,
    state: SpanState,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            violations.push(Violation::EndBeforeStart);
        }
    }
    if state == SpanState::Complete && start.is_none() && span_type != SpanType::Connection {
        violations.push(Violation::CompletionRequiresStart {
            name: name.to_owned(),
        });
    }
    violations
}

// lowercased alphanumeric runs joined by dashes: "Alice Babs" -> "alice-babs"
fn slugify(name: &str) -> Option<String> {
    let mut slug = String::new();
    let mut gap = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.extend(c.to_lowercase());
        } else {
            gap = true;
        }
    }
    if slug.is_empty() { None } else { Some(slug) }
}
