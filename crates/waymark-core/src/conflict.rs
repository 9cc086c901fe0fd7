//! Two-version conflict protocol
//!
//! Before an edit the engine re-fetches the record; when the server's version
//! differs from the version the edit started from, the user picks one side.
//! There is no field-level merge.

use crate::models::{Objective, PendingStatus};

/// Result of re-fetching a record before editing it
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictCheck {
    /// Server version matches the edit baseline
    Clean,
    /// Server holds a different version; carries the server copy
    Conflict(Objective),
    /// Server could not be reached; editing proceeds on the local copy
    Unverified,
}

impl ConflictCheck {
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// User's choice between the two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Save the in-progress edit as newer than the server copy
    KeepLocal,
    /// Discard the edit and adopt the server copy verbatim
    AcceptServer,
}

/// An edit in progress: the record as opened plus the user's changes
#[derive(Debug, Clone, PartialEq)]
pub struct EditDraft {
    baseline: Option<Objective>,
    pub fields: Objective,
}

impl EditDraft {
    /// Start editing an existing record
    pub fn open(baseline: Objective) -> Self {
        Self {
            fields: baseline.clone(),
            baseline: Some(baseline),
        }
    }

    /// Start a brand-new record
    pub fn create(fields: Objective) -> Self {
        Self {
            baseline: None,
            fields,
        }
    }

    pub const fn baseline(&self) -> Option<&Objective> {
        self.baseline.as_ref()
    }

    /// Version the edit is based on; `None` for new records
    pub fn base_version(&self) -> Option<u64> {
        self.baseline.as_ref().map(|baseline| baseline.version)
    }

    /// Value to save when no conflict is pending
    pub fn into_record(self) -> Objective {
        let mut record = match self.baseline {
            Some(baseline) => {
                let mut record = baseline;
                record.copy_fields_from(&self.fields);
                record.version = record.version.saturating_add(1);
                record
            }
            None => {
                let mut record = self.fields;
                record.id = None;
                record.version = 1;
                record
            }
        };
        record.status = PendingStatus::Synced;
        record
    }

    /// Value to save once the user resolved a conflict against `server`
    pub fn resolve(self, server: &Objective, resolution: Resolution) -> Objective {
        match resolution {
            Resolution::KeepLocal => keep_local(&self.fields, server),
            Resolution::AcceptServer => accept_server(server),
        }
    }
}

/// User's edited fields, versioned just above the server copy
pub fn keep_local(edited: &Objective, server: &Objective) -> Objective {
    let mut record = server.clone();
    record.copy_fields_from(edited);
    record.version = server.version.saturating_add(1);
    record.status = PendingStatus::Synced;
    record
}

/// Server copy verbatim, re-affirmed locally
pub fn accept_server(server: &Objective) -> Objective {
    server.clone()
}

/// Decide whether `server` conflicts with an edit based on `base_version`
pub fn detect(base_version: u64, server: Objective) -> ConflictCheck {
    if server.version == base_version {
        ConflictCheck::Clean
    } else {
        ConflictCheck::Conflict(server)
    }
}
