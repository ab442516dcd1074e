//! Contact repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide indexed lookups by email, phone, id and group.
//! - Provide the insert/demote/reparent mutations used by reconciliation.
//! - Run one reconciliation pass inside one isolated write transaction.
//!
//! # Invariants
//! - Reads reject invalid persisted rows instead of masking them.
//! - At most one active contact exists per `(email, phone_number)` pair;
//!   a conflicting insert fails with `RepoError::DuplicatePair`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

/// Current time as epoch milliseconds, evaluated by SQLite.
const NOW_MS_SQL: &str = "CAST(ROUND((julianday('now') - 2440587.5) * 86400000.0) AS INTEGER)";

const REQUIRED_COLUMNS: [&str; 8] = [
    "id",
    "email",
    "phone_number",
    "linked_id",
    "link_precedence",
    "created_at",
    "updated_at",
    "deleted_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from contact store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Write payload violates per-record invariants.
    Validation(ContactValidationError),
    /// Target contact does not exist or is soft-deleted.
    NotFound(ContactId),
    /// An active contact already carries the same `(email, phone_number)` pair.
    DuplicatePair,
    /// Demotion target is already secondary of a different primary.
    AlreadySecondary {
        id: ContactId,
        linked_id: ContactId,
    },
    /// Persisted data cannot be converted to a valid contact.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Backend state is unusable (for example a poisoned lock).
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::DuplicatePair => write!(f, "an active contact already has this email/phone pair"),
            Self::AlreadySecondary { id, linked_id } => write!(
                f,
                "contact {id} is already secondary of contact {linked_id}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "contact repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "contact repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "contact repository requires column `{column}` in table `{table}`"
            ),
            Self::Unavailable(message) => write!(f, "contact store unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence operations consumed by reconciliation.
pub trait ContactRepository {
    /// Lists active contacts whose email equals `email` or whose phone
    /// equals `phone_number`, oldest first.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>>;
    /// Loads one active contact by id.
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    /// Inserts one contact and returns the stored row.
    fn insert(&self, contact: &NewContact) -> RepoResult<Contact>;
    /// Turns a primary into a secondary of `new_linked_id`. Idempotent.
    fn demote_to_secondary(&self, id: ContactId, new_linked_id: ContactId) -> RepoResult<()>;
    /// Points every active contact linked to `old_linked_id` at
    /// `new_linked_id`. Returns the number of moved contacts.
    fn reparent(&self, old_linked_id: ContactId, new_linked_id: ContactId) -> RepoResult<usize>;
    /// Lists the primary and its secondaries, oldest first.
    fn find_group(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>>;
    /// Runs `work` as one isolated unit.
    ///
    /// Changes made through the repository inside `work` are committed
    /// when it returns `Ok` and discarded when it returns `Err`. Units of
    /// work must not be nested.
    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed contact repository.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_contact_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND ((?1 IS NOT NULL AND email = ?1)
                 OR (?2 IS NOT NULL AND phone_number = ?2))
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![email, phone_number])?;
        collect_contacts(&mut rows)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?1
               AND deleted_at IS NULL;"
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }
        Ok(None)
    }

    fn insert(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;

        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO contacts (
                    email,
                    phone_number,
                    linked_id,
                    link_precedence,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, {NOW_MS_SQL}, {NOW_MS_SQL});"
            ),
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence.as_str(),
            ],
        );
        if let Err(err) = inserted {
            return Err(map_insert_error(err));
        }

        let id = self.conn.last_insert_rowid();
        self.get_contact(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("inserted contact {id} is not readable")))
    }

    fn demote_to_secondary(&self, id: ContactId, new_linked_id: ContactId) -> RepoResult<()> {
        if id == new_linked_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET link_precedence = 'secondary',
                     linked_id = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE id = ?1
                   AND deleted_at IS NULL
                   AND (link_precedence = 'primary' OR linked_id = ?2);"
            ),
            params![id, new_linked_id],
        )?;
        if changed > 0 {
            return Ok(());
        }

        match self.get_contact(id)? {
            None => Err(RepoError::NotFound(id)),
            Some(existing) => Err(RepoError::AlreadySecondary {
                id,
                linked_id: existing.root_id(),
            }),
        }
    }

    fn reparent(&self, old_linked_id: ContactId, new_linked_id: ContactId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET linked_id = ?2,
                     updated_at = {NOW_MS_SQL}
                 WHERE linked_id = ?1
                   AND id <> ?2
                   AND deleted_at IS NULL;"
            ),
            params![old_linked_id, new_linked_id],
        )?;
        Ok(changed)
    }

    fn find_group(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE (id = ?1 OR linked_id = ?1)
               AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([primary_id])?;
        collect_contacts(&mut rows)
    }

    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        // IMMEDIATE takes the write lock up front, so concurrent
        // identifications with overlapping keys are serialized.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

fn map_insert_error(err: rusqlite::Error) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::DuplicatePair
        }
        _ => err.into(),
    }
}

fn collect_contacts(rows: &mut rusqlite::Rows<'_>) -> RepoResult<Vec<Contact>> {
    let mut contacts = Vec::new();
    while let Some(row) = rows.next()? {
        contacts.push(parse_contact_row(row)?);
    }
    Ok(contacts)
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence"
        ))
    })?;

    let contact = Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate().map_err(|err| {
        RepoError::InvalidData(format!("contact {} is malformed: {err}", contact.id))
    })?;
    Ok(contact)
}

fn ensure_contact_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "contacts")? {
        return Err(RepoError::MissingRequiredTable("contacts"));
    }

    for column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "contacts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "contacts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
