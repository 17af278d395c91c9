//! Identity declared inside the transport's own connection handshake.
//!
//! Encoded as `name|stable_id`. The display name may itself contain
//! `|`; the stable id never does, so parsing splits at the last one.

use std::fmt;

use driftmesh_types::{DriftError, Result, StableId};

const SEPARATOR: char = '|';

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeclaredIdentity {
    pub name: String,
    pub stable_id: StableId,
}

impl DeclaredIdentity {
    pub fn new(name: impl Into<String>, stable_id: StableId) -> Self {
        Self {
            name: name.into(),
            stable_id,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{SEPARATOR}{}", self.name, self.stable_id)
    }

    /// # Errors
    ///
    /// [`DriftError::ProtocolError`] if there is no separator or the
    /// stable id part is empty.
    pub fn parse(text: &str) -> Result<Self> {
        let (name, id) = text
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| DriftError::ProtocolError {
                reason: format!("declared identity {text:?} has no separator"),
            })?;
        Ok(Self {
            name: name.to_owned(),
            stable_id: id.parse()?,
        })
    }
}

impl fmt::Display for DeclaredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
