//! Composite resource identity
//!
//! Resources addressed by several natural keys get one opaque id made of the
//! keys joined with a reserved separator, e.g. `cls-123#db-1`.

use std::fmt;
use thiserror::Error;

/// Default field separator
pub const DEFAULT_SEPARATOR: char = '#';
/// Separator used by resources whose keys are lists
pub const COMMA_SEPARATOR: char = ',';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("composite id has no fields")]
    Empty,

    #[error("field {index} ({value:?}) contains the reserved separator {separator:?}")]
    ReservedSeparator {
        index: usize,
        value: String,
        separator: char,
    },

    #[error("id {raw:?} has {found} field(s) separated by {separator:?}, expected {expected}")]
    FieldCount {
        raw: String,
        expected: usize,
        found: usize,
        separator: char,
    },
}

/// Ordered natural keys of one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    fields: Vec<String>,
    separator: char,
}

impl CompositeId {
    /// Build from fields with the default separator
    pub fn new<I, S>(fields: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_separator(fields, DEFAULT_SEPARATOR)
    }

    pub fn with_separator<I, S>(fields: I, separator: char) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some((index, value)) = fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.contains(separator))
        {
            return Err(IdentityError::ReservedSeparator {
                index,
                value: value.clone(),
                separator,
            });
        }
        Ok(Self { fields, separator })
    }

    /// Parse an id that must have exactly `expected` fields
    pub fn parse(raw: &str, expected: usize) -> Result<Self, IdentityError> {
        Self::parse_with(raw, expected, DEFAULT_SEPARATOR)
    }

    pub fn parse_with(raw: &str, expected: usize, separator: char) -> Result<Self, IdentityError> {
        let fields: Vec<String> = raw.split(separator).map(str::to_string).collect();
        if fields.len() != expected {
            return Err(IdentityError::FieldCount {
                raw: raw.to_string(),
                expected,
                found: fields.len(),
                separator,
            });
        }
        Ok(Self { fields, separator })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separator)?;
            }
            f.write_str(field)?;
        }
        Ok(())
    }
}

/// Join `fields` with `separator`
pub fn join<S: AsRef<str>>(fields: &[S], separator: char) -> Result<String, IdentityError> {
    CompositeId::with_separator(fields.iter().map(|f| f.as_ref()), separator).map(|id| id.to_string())
}

/// Split `raw` into exactly `expected` fields
pub fn split(raw: &str, expected: usize, separator: char) -> Result<Vec<String>, IdentityError> {
    CompositeId::parse_with(raw, expected, separator).map(CompositeId::into_fields)
}
