//! Persistence for the timeline in a single SQLite database, together
//! with an append-only ledger of everything that happened to it. Each
//! ledger entry chains a blake3 hash of its details onto the previous
//! entry's superhash, so the head of the chain fingerprints the entire
//! history of the store.
// used for persistence
use rusqlite::{params, Connection as SqliteConnection, Error};

// used for timestamps in the ledger
use chrono::Utc;

use std::str::FromStr;
use std::sync::Arc;

use crate::chronology::PartialDate;
use crate::error::{LifespanError, Result};
use crate::timeline::{
    Connection, ConnectionType, Database, Span, SpanType, TemporalConstraint, GENESIS,
};

/// Where the timeline lives between runs. In-memory timelines perform no
/// persistence at all and therefore carry no ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

pub struct Persistor {
    connection: Option<SqliteConnection>,
    superhash: Option<blake3::Hash>,
}

impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Persistor> {
        let connection = match mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => {
                let connection = SqliteConnection::open(path)?;
                connection.execute_batch(
                    "
                create table if not exists Span (
                    Span_Identity integer not null,
                    Name text not null,
                    Slug text null,
                    Span_Type text not null,
                    Start_Date text null,
                    End_Date text null,
                    State text not null,
                    Access text not null,
                    Version integer not null,
                    constraint referenceable_Span_Identity primary key (
                        Span_Identity
                    ),
                    constraint unique_Slug unique (
                        Slug
                    )
                );
                create table if not exists ConnectionType (
                    ConnectionType text not null,
                    Forward_Predicate text not null,
                    Inverse_Predicate text not null,
                    Temporal_Constraint text not null,
                    Allowed_Subject_Types text not null,
                    Allowed_Object_Types text not null,
                    Reserved integer not null,
                    constraint referenceable_ConnectionType primary key (
                        ConnectionType
                    )
                );
                create table if not exists Connection (
                    Connection_Identity integer not null,
                    ConnectionType text not null,
                    Subject_Identity integer not null,
                    Object_Identity integer not null,
                    Connection_Span_Identity integer not null,
                    State text not null,
                    constraint Connection_is_typed foreign key (
                        ConnectionType
                    ) references ConnectionType(ConnectionType),
                    constraint Subject_is_Span foreign key (
                        Subject_Identity
                    ) references Span(Span_Identity),
                    constraint Object_is_Span foreign key (
                        Object_Identity
                    ) references Span(Span_Identity),
                    constraint Extent_is_Span foreign key (
                        Connection_Span_Identity
                    ) references Span(Span_Identity),
                    constraint referenceable_Connection_Identity primary key (
                        Connection_Identity
                    )
                );
                create table if not exists Ledger (
                    Entry integer primary key autoincrement,
                    Recorded_At text not null,
                    Subject integer not null,
                    Action text not null,
                    Details_Hash text not null,
                    Superhash text not null
                );
                ",
                )?;
                Some(connection)
            }
        };
        let superhash = match &connection {
            Some(connection) => {
                match connection
                    .prepare("select Superhash from Ledger order by Entry desc limit 1")?
                    .query_row([], |row| row.get::<_, String>(0))
                {
                    Ok(head) => Some(blake3::Hash::from_hex(head.as_bytes()).map_err(|_| {
                        LifespanError::DataCorruption {
                            message: format!("'{}' is not a ledger superhash", head),
                        }
                    })?),
                    Err(Error::QueryReturnedNoRows) => None,
                    Err(err) => return Err(err.into()),
                }
            }
            None => None,
        };
        Ok(Persistor {
            connection,
            superhash,
        })
    }

    /// The head of the ledger chain, or `None` when nothing has ever been
    /// persisted (and always `None` for in-memory timelines).
    pub fn current_superhash(&self) -> Option<String> {
        self.superhash.as_ref().map(|hash| hash.to_hex().to_string())
    }

    // Each entry chains onto the one before it, so one hash vouches for
    // the whole history up to that point.
    fn append_ledger(
        connection: &SqliteConnection,
        superhash: &mut Option<blake3::Hash>,
        subject: u64,
        action: &str,
        details: &str,
    ) -> Result<()> {
        let details_hash = blake3::hash(details.as_bytes());
        let mut hasher = blake3::Hasher::new();
        if let Some(previous) = superhash.as_ref() {
            hasher.update(previous.as_bytes());
        }
        hasher.update(details_hash.as_bytes());
        let head = hasher.finalize();
        connection
            .prepare_cached(
                "
            insert into Ledger (
                Recorded_At,
                Subject,
                Action,
                Details_Hash,
                Superhash
            ) values (?, ?, ?, ?, ?)
        ",
            )?
            .execute(params![
                Utc::now(),
                subject,
                action,
                details_hash.to_hex().as_str(),
                head.to_hex().as_str()
            ])?;
        *superhash = Some(head);
        Ok(())
    }

    pub fn persist_span(&mut self, span: &Span) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let action = match connection
            .prepare_cached("select Version from Span where Span_Identity = ?")?
            .query_row::<u64, _, _>(params![span.id()], |row| row.get(0))
        {
            Ok(_) => {
                connection
                    .prepare_cached(
                        "
                    update Span
                       set Name = ?,
                           Slug = ?,
                           Span_Type = ?,
                           Start_Date = ?,
                           End_Date = ?,
                           State = ?,
                           Access = ?,
                           Version = ?
                     where Span_Identity = ?
                ",
                    )?
                    .execute(params![
                        span.name(),
                        span.slug(),
                        span.span_type().name(),
                        span.start(),
                        span.end(),
                        span.state().name(),
                        span.access().name(),
                        span.version(),
                        span.id()
                    ])?;
                "span revised"
            }
            Err(Error::QueryReturnedNoRows) => {
                connection
                    .prepare_cached(
                        "
                    insert into Span (
                        Span_Identity,
                        Name,
                        Slug,
                        Span_Type,
                        Start_Date,
                        End_Date,
                        State,
                        Access,
                        Version
                    ) values (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                    )?
                    .execute(params![
                        span.id(),
                        span.name(),
                        span.slug(),
                        span.span_type().name(),
                        span.start(),
                        span.end(),
                        span.state().name(),
                        span.access().name(),
                        span.version()
                    ])?;
                "span recorded"
            }
            Err(err) => return Err(err.into()),
        };
        Self::append_ledger(
            connection,
            &mut self.superhash,
            span.id(),
            action,
            &span.to_string(),
        )
    }

    pub fn forget_span(&mut self, span: &Span) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        connection
            .prepare_cached("delete from Span where Span_Identity = ?")?
            .execute(params![span.id()])?;
        Self::append_ledger(
            connection,
            &mut self.superhash,
            span.id(),
            "span forgotten",
            &span.to_string(),
        )
    }

    pub fn persist_connection(&mut self, connection_value: &Connection) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let action = match connection
            .prepare_cached("select State from Connection where Connection_Identity = ?")?
            .query_row::<String, _, _>(params![connection_value.id()], |row| row.get(0))
        {
            Ok(_) => {
                connection
                    .prepare_cached(
                        "
                    update Connection
                       set State = ?
                     where Connection_Identity = ?
                ",
                    )?
                    .execute(params![
                        connection_value.state().name(),
                        connection_value.id()
                    ])?;
                "connection revised"
            }
            Err(Error::QueryReturnedNoRows) => {
                connection
                    .prepare_cached(
                        "
                    insert into Connection (
                        Connection_Identity,
                        ConnectionType,
                        Subject_Identity,
                        Object_Identity,
                        Connection_Span_Identity,
                        State
                    ) values (?, ?, ?, ?, ?, ?)
                ",
                    )?
                    .execute(params![
                        connection_value.id(),
                        connection_value.connection_type().name(),
                        connection_value.subject(),
                        connection_value.object(),
                        connection_value.connection_span(),
                        connection_value.state().name()
                    ])?;
                "connection recorded"
            }
            Err(err) => return Err(err.into()),
        };
        Self::append_ledger(
            connection,
            &mut self.superhash,
            connection_value.id(),
            action,
            &connection_value.to_string(),
        )
    }

    pub fn forget_connection(&mut self, connection_value: &Connection) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        connection
            .prepare_cached("delete from Connection where Connection_Identity = ?")?
            .execute(params![connection_value.id()])?;
        Self::append_ledger(
            connection,
            &mut self.superhash,
            connection_value.id(),
            "connection forgotten",
            &connection_value.to_string(),
        )
    }

    pub fn persist_connection_type(&mut self, connection_type: &ConnectionType) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        match connection
            .prepare_cached("select Reserved from ConnectionType where ConnectionType = ?")?
            .query_row::<bool, _, _>(params![connection_type.name()], |row| row.get(0))
        {
            Ok(_) => Ok(()),
            Err(Error::QueryReturnedNoRows) => {
                connection
                    .prepare_cached(
                        "
                    insert into ConnectionType (
                        ConnectionType,
                        Forward_Predicate,
                        Inverse_Predicate,
                        Temporal_Constraint,
                        Allowed_Subject_Types,
                        Allowed_Object_Types,
                        Reserved
                    ) values (?, ?, ?, ?, ?, ?, ?)
                ",
                    )?
                    .execute(params![
                        connection_type.name(),
                        connection_type.forward_predicate(),
                        connection_type.inverse_predicate(),
                        connection_type.constraint().name(),
                        join_types(connection_type.allowed_subject_types()),
                        join_types(connection_type.allowed_object_types()),
                        connection_type.reserved()
                    ])?;
                Self::append_ledger(
                    connection,
                    &mut self.superhash,
                    GENESIS,
                    "connection type recorded",
                    &connection_type.to_string(),
                )
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn restore_connection_types(&mut self, db: &Database) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let mut statement = connection.prepare(
            "
            select ConnectionType,
                   Forward_Predicate,
                   Inverse_Predicate,
                   Temporal_Constraint,
                   Allowed_Subject_Types,
                   Allowed_Object_Types,
                   Reserved
              from ConnectionType
        ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let constraint_text: String = row.get(3)?;
            let subjects_text: String = row.get(4)?;
            let objects_text: String = row.get(5)?;
            let connection_type = ConnectionType::new(
                name,
                row.get(1)?,
                row.get(2)?,
                TemporalConstraint::from_str(&constraint_text)
                    .map_err(|_| corrupt("temporal constraint", &constraint_text))?,
                split_types(&subjects_text)?,
                split_types(&objects_text)?,
                row.get(6)?,
            );
            db.connection_type_keeper()
                .lock()
                .unwrap()
                .keep(connection_type);
        }
        Ok(())
    }

    pub fn restore_spans(&mut self, db: &Database) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let mut statement = connection.prepare(
            "
            select Span_Identity,
                   Name,
                   Slug,
                   Span_Type,
                   Start_Date,
                   End_Date,
                   State,
                   Access,
                   Version
              from Span
        ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let id: u64 = row.get(0)?;
            let type_text: String = row.get(3)?;
            let state_text: String = row.get(6)?;
            let access_text: String = row.get(7)?;
            let span_type =
                SpanType::from_str(&type_text).map_err(|_| corrupt("span type", &type_text))?;
            let start: Option<PartialDate> = row.get(4)?;
            let end: Option<PartialDate> = row.get(5)?;
            let span = Span::new(
                id,
                row.get(1)?,
                row.get(2)?,
                span_type,
                start,
                end,
                state_text
                    .parse()
                    .map_err(|_| corrupt("span state", &state_text))?,
                access_text
                    .parse()
                    .map_err(|_| corrupt("access level", &access_text))?,
                row.get(8)?,
            );
            db.id_generator().lock().unwrap().retain(id);
            db.span_keeper().lock().unwrap().keep(span);
            db.type_to_span_lookup()
                .lock()
                .unwrap()
                .insert(span_type, id);
        }
        Ok(())
    }

    pub fn restore_connections(&mut self, db: &Database) -> Result<()> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        let mut statement = connection.prepare(
            "
            select Connection_Identity,
                   ConnectionType,
                   Subject_Identity,
                   Object_Identity,
                   Connection_Span_Identity,
                   State
              from Connection
        ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let id: u64 = row.get(0)?;
            let type_name: String = row.get(1)?;
            let subject: u64 = row.get(2)?;
            let object: u64 = row.get(3)?;
            let connection_span: u64 = row.get(4)?;
            let state_text: String = row.get(5)?;
            let connection_type: Arc<ConnectionType> = db
                .connection_type_keeper()
                .lock()
                .unwrap()
                .get(&type_name)
                .ok_or_else(|| corrupt("connection type", &type_name))?;
            let restored = Connection::new(
                id,
                connection_type,
                subject,
                object,
                connection_span,
                state_text
                    .parse()
                    .map_err(|_| corrupt("span state", &state_text))?,
            );
            db.id_generator().lock().unwrap().retain(id);
            db.connection_keeper().lock().unwrap().keep(restored);
            db.subject_to_connection_lookup()
                .lock()
                .unwrap()
                .insert(subject, id);
            db.object_to_connection_lookup()
                .lock()
                .unwrap()
                .insert(object, id);
            db.connection_span_to_connection_lookup()
                .lock()
                .unwrap()
                .insert(connection_span, id);
        }
        Ok(())
    }
}

fn corrupt(kind: &str, value: &str) -> LifespanError {
    LifespanError::DataCorruption {
        message: format!("{} '{}' could not be read back", kind, value),
    }
}

fn join_types(types: &[SpanType]) -> String {
    types.iter().map(|t| t.name()).collect::<Vec<_>>().join(",")
}

fn split_types(text: &str) -> Result<Vec<SpanType>> {
    // an empty column means no types, not one unreadable empty name
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|t| SpanType::from_str(t).map_err(|_| corrupt("span type", t)))
        .collect()
}
