//! Breakpoint set.

use std::collections::BTreeSet;

use crate::codec::RecordType;
use crate::config::validation::ValidationError;

/// Record types that pause the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSet {
    types: BTreeSet<RecordType>,
}

impl BreakpointSet {
    pub fn empty() -> Self {
        Self {
            types: BTreeSet::new(),
        }
    }

    /// Build from configured type bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        let types = bytes
            .iter()
            .map(|&b| RecordType::try_from(b).map_err(ValidationError::UnknownBreakpoint))
            .collect::<Result<_, _>>()?;
        Ok(Self { types })
    }

    /// Flip membership of `record_type`. Returns whether it is now set.
    pub fn toggle(&mut self, record_type: RecordType) -> bool {
        if self.types.remove(&record_type) {
            false
        } else {
            self.types.insert(record_type);
            true
        }
    }

    pub fn contains(&self, record_type: RecordType) -> bool {
        self.types.contains(&record_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.types.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for BreakpointSet {
    fn default() -> Self {
        Self {
            types: BTreeSet::from([RecordType::ApplicationData]),
        }
    }
}
