//! Shared sync status reported to clients.

/// Coarse sync status of the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}
