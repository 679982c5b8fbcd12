//! Job status flags.
//!
//! A stored status is always exactly one primitive flag. The named unions
//! (`INCOMPLETE`, `COMPLETED`, `CURRENT`, `ALL`) only exist to build query
//! filters for [`crate::db::JobStore::fetch`].

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use super::JobError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Status: u16 {
        const NEW = 1 << 0;
        const SUBMITTING = 1 << 1;
        const RUNNING = 1 << 2;
        const FINISHED = 1 << 3;
        const FAILED = 1 << 4;
        const CANCELLED = 1 << 5;
        const ARCHIVED = 1 << 6;
        /// Poll-only answer from a connector. Never stored.
        const UNKNOWN = 1 << 7;

        const INCOMPLETE = Self::NEW.bits() | Self::SUBMITTING.bits() | Self::RUNNING.bits();
        const COMPLETED = Self::FINISHED.bits()
            | Self::FAILED.bits()
            | Self::CANCELLED.bits()
            | Self::ARCHIVED.bits();
        const CURRENT = Self::INCOMPLETE.bits() | Self::FINISHED.bits() | Self::FAILED.bits();
        const ALL = Self::INCOMPLETE.bits() | Self::COMPLETED.bits();
    }
}

const PRIMITIVES: &[(Status, &str)] = &[
    (Status::NEW, "new"),
    (Status::SUBMITTING, "submitting"),
    (Status::RUNNING, "running"),
    (Status::FINISHED, "finished"),
    (Status::FAILED, "failed"),
    (Status::CANCELLED, "cancelled"),
    (Status::ARCHIVED, "archived"),
    (Status::UNKNOWN, "unknown"),
];

const UNIONS: &[(Status, &str)] = &[
    (Status::INCOMPLETE, "incomplete"),
    (Status::COMPLETED, "completed"),
    (Status::CURRENT, "current"),
    (Status::ALL, "all"),
];

impl Status {
    /// True when exactly one flag is set.
    pub fn is_primitive(self) -> bool {
        self.bits().count_ones() == 1
    }

    /// Whether this value may be written to the store.
    pub fn is_storable(self) -> bool {
        self.is_primitive() && self != Status::UNKNOWN
    }

    /// Lowercase name of a primitive flag, `None` for unions and the empty set.
    pub fn name(self) -> Option<&'static str> {
        PRIMITIVES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map(|(_, name)| *name)
    }

    /// The primitive flags contained in this set, in declaration order.
    pub fn primitives(self) -> impl Iterator<Item = Status> {
        PRIMITIVES
            .iter()
            .map(|(flag, _)| *flag)
            .filter(move |flag| self.contains(*flag))
    }

    /// Parses a query filter: a primitive name or a union name
    /// (`incomplete`, `completed`, `current`, `all`). Several names may be
    /// joined with `|`.
    pub fn parse_filter(s: &str) -> Result<Status, JobError> {
        let mut mask = Status::empty();
        for part in s.split('|') {
            let part = part.trim().to_ascii_lowercase();
            let flag = PRIMITIVES
                .iter()
                .chain(UNIONS.iter())
                .find(|(_, name)| *name == part)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| JobError::InvalidStatus(s.to_string()))?;
            mask |= flag;
        }
        Ok(mask)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        if let Some((_, name)) = UNIONS.iter().find(|(flag, _)| flag == self) {
            return f.write_str(name);
        }
        let names: Vec<&str> = self.primitives().filter_map(Status::name).collect();
        f.write_str(&names.join("|"))
    }
}

/// Parses a stored status. Only primitive names are accepted.
impl FromStr for Status {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        PRIMITIVES
            .iter()
            .find(|(_, name)| *name == lowered)
            .map(|(flag, _)| *flag)
            .ok_or_else(|| JobError::InvalidStatus(s.to_string()))
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        if !self.is_storable() {
            return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                JobError::UnstorableStatus(*self),
            )));
        }
        let name = self.name().unwrap_or_default();
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(name.as_bytes())))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse::<Status>()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_round_trip_through_names() {
        for (flag, name) in PRIMITIVES {
            assert!(flag.is_primitive());
            assert_eq!(flag.to_string(), *name);
            assert_eq!(name.parse::<Status>().unwrap(), *flag);
        }
    }

    #[test]
    fn test_unions_are_not_primitive() {
        assert!(!Status::INCOMPLETE.is_primitive());
        assert!(!Status::COMPLETED.is_primitive());
        assert!(!Status::empty().is_primitive());
        assert!(Status::INCOMPLETE.contains(Status::NEW));
        assert!(Status::INCOMPLETE.contains(Status::RUNNING));
        assert!(!Status::INCOMPLETE.contains(Status::FINISHED));
    }

    #[test]
    fn test_unknown_is_not_storable() {
        assert!(Status::UNKNOWN.is_primitive());
        assert!(!Status::UNKNOWN.is_storable());
        assert!(!Status::ALL.contains(Status::UNKNOWN));
    }

    #[test]
    fn test_stored_value_rejects_union_name() {
        assert!("incomplete".parse::<Status>().is_err());
        assert!("bogus".parse::<Status>().is_err());
        assert_eq!("RUNNING".parse::<Status>().unwrap(), Status::RUNNING);
    }

    #[test]
    fn test_parse_filter_accepts_unions_and_lists() {
        assert_eq!(Status::parse_filter("completed").unwrap(), Status::COMPLETED);
        assert_eq!(
            Status::parse_filter("new|failed").unwrap(),
            Status::NEW | Status::FAILED
        );
        assert!(Status::parse_filter("new|nope").is_err());
    }

    #[test]
    fn test_display_of_unnamed_union() {
        assert_eq!((Status::NEW | Status::FAILED).to_string(), "new|failed");
        assert_eq!(Status::COMPLETED.to_string(), "completed");
    }

    #[test]
    fn test_to_sql_rejects_union() {
        assert!(Status::INCOMPLETE.to_sql().is_err());
        assert!(Status::UNKNOWN.to_sql().is_err());
        assert!(Status::FAILED.to_sql().is_ok());
    }
}
