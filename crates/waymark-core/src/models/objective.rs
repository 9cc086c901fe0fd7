//! Objective model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix carried by every locally-generated identity.
pub const TEMPORARY_ID_PREFIX: &str = "local-";

/// Identity of an objective, either server-assigned or a local placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectiveId(String);

impl ObjectiveId {
    /// Wrap a server-assigned identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique temporary identity for a record created offline
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this identity was generated locally and never confirmed by the server
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectiveId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Locally queued mutation that has not reached the server yet.
///
/// Encoded on the wire and in the local store as its integer code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PendingStatus {
    #[default]
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl PendingStatus {
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Synced)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PendingCreate => "pending-create",
            Self::PendingUpdate => "pending-update",
            Self::PendingDelete => "pending-delete",
        }
    }
}

impl From<PendingStatus> for u8 {
    fn from(status: PendingStatus) -> Self {
        match status {
            PendingStatus::Synced => 0,
            PendingStatus::PendingCreate => 1,
            PendingStatus::PendingUpdate => 2,
            PendingStatus::PendingDelete => 3,
        }
    }
}

impl TryFrom<u8> for PendingStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Synced),
            1 => Ok(Self::PendingCreate),
            2 => Ok(Self::PendingUpdate),
            3 => Ok(Self::PendingDelete),
            other => Err(format!("unknown pending status code {other}")),
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A point of interest shared between users
///
/// Domain fields are opaque to the sync engine: it copies them verbatim and
/// never merges them field by field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    /// Identity; `None` until the record is first saved
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectiveId>,
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub city: String,
    /// Owning user
    #[serde(default)]
    pub user_id: String,
    /// Reference to the attached image
    #[serde(default)]
    pub img_path: String,
    /// Server version, starts at 1 and grows by one per accepted update
    #[serde(default)]
    pub version: u64,
    /// Pending local mutation marker
    #[serde(default)]
    pub status: PendingStatus,
}

impl Objective {
    /// Create a new, not yet saved objective
    #[must_use]
    pub fn new(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: user_id.into(),
            version: 1,
            ..Self::default()
        }
    }

    /// Identity if the server has ever confirmed this record
    pub fn server_id(&self) -> Option<&ObjectiveId> {
        self.id.as_ref().filter(|id| !id.is_temporary())
    }

    /// Copy this record with a different pending status
    #[must_use]
    pub fn with_status(mut self, status: PendingStatus) -> Self {
        self.status = status;
        self
    }

    /// Copy the domain payload of `other` onto this record, keeping identity,
    /// version, and status.
    pub fn copy_fields_from(&mut self, other: &Self) {
        self.name.clone_from(&other.name);
        self.latitude = other.latitude;
        self.longitude = other.longitude;
        self.address.clone_from(&other.address);
        self.neighborhood.clone_from(&other.neighborhood);
        self.city.clone_from(&other.city);
        self.user_id.clone_from(&other.user_id);
        self.img_path.clone_from(&other.img_path);
    }

    /// Whether both records carry the same domain payload
    pub fn same_fields(&self, other: &Self) -> bool {
        let mut probe = other.clone();
        probe.id.clone_from(&self.id);
        probe.version = self.version;
        probe.status = self.status;
        probe == *self
    }
}
