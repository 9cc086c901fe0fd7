use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use waymark_core::config::ClientConfig;
use waymark_core::connectivity::ConnectivityMonitor;
use waymark_core::engine::SyncEngine;
use waymark_core::remote::{HttpObjectiveService, ObjectiveService, RemoteError, RemoteResult};
use waymark_core::session::Session;
use waymark_core::store::{ObjectiveStore, SqliteRecordStore};
use waymark_core::{Objective, ObjectiveId, PendingStatus};

use crate::cli::ObjectiveArgs;
use crate::error::CliError;

/// Everything a command needs to talk to the engine
pub struct Context {
    pub engine: Arc<SyncEngine>,
    pub config: ClientConfig,
    pub server: Option<Arc<HttpObjectiveService>>,
    pub online: bool,
}

impl Context {
    /// Context that never reaches a server
    pub fn offline(store: ObjectiveStore, config: ClientConfig) -> Self {
        let engine = SyncEngine::new(
            store,
            Arc::new(NoServer),
            ConnectivityMonitor::new(false),
            config.session(),
        );
        Self {
            engine: Arc::new(engine),
            config,
            server: None,
            online: false,
        }
    }

    pub fn session(&self) -> Session {
        self.config.session()
    }

    pub fn require_server(&self) -> Result<Arc<HttpObjectiveService>, CliError> {
        self.server.clone().ok_or(CliError::ServerNotConfigured)
    }
}

/// Global flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub store: Option<PathBuf>,
    pub server: Option<String>,
    pub offline: bool,
}

/// Stand-in service when no server URL is configured
struct NoServer;

fn no_server() -> RemoteError {
    RemoteError::Unreachable("no server configured".to_string())
}

#[async_trait]
impl ObjectiveService for NoServer {
    async fn list(&self, _token: &str) -> RemoteResult<Vec<Objective>> {
        Err(no_server())
    }

    async fn get(&self, _token: &str, _id: &ObjectiveId) -> RemoteResult<Objective> {
        Err(no_server())
    }

    async fn create(&self, _token: &str, _objective: &Objective) -> RemoteResult<Objective> {
        Err(no_server())
    }

    async fn update(&self, _token: &str, _objective: &Objective) -> RemoteResult<Objective> {
        Err(no_server())
    }

    async fn delete(&self, _token: &str, _objective: &Objective) -> RemoteResult<()> {
        Err(no_server())
    }
}

/// Load config, open the store and probe the server once
pub async fn open_context(options: &GlobalOptions) -> Result<Context, CliError> {
    let mut config = ClientConfig::load()?;
    if let Some(path) = &options.store {
        config.store_path = Some(path.clone());
    }
    if let Some(url) = &options.server {
        config.server_url = Some(url.clone());
        config.normalize();
        config.validate()?;
    }

    let store_path = config.resolved_store_path()?;
    let store = ObjectiveStore::new(Arc::new(SqliteRecordStore::open(&store_path)?));
    tracing::debug!("Using store at {}", store_path.display());

    let Some(url) = config.server_url.clone() else {
        return Ok(Context::offline(store, config));
    };

    let server = Arc::new(HttpObjectiveService::new(url, config.request_timeout())?);
    let online = !options.offline && server.is_reachable().await;
    if !options.offline && !online {
        tracing::warn!("Server {} unreachable, working offline", server.base_url());
    }

    let engine = SyncEngine::new(
        store,
        server.clone(),
        ConnectivityMonitor::new(online),
        config.session(),
    );
    Ok(Context {
        engine: Arc::new(engine),
        config,
        server: Some(server),
        online,
    })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ObjectiveListItem {
    pub id: String,
    pub name: String,
    pub city: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub version: u64,
    pub status: &'static str,
}

pub fn objective_to_list_item(objective: &Objective) -> ObjectiveListItem {
    ObjectiveListItem {
        id: display_id(objective),
        name: objective.name.clone(),
        city: objective.city.clone(),
        address: objective.address.clone(),
        latitude: objective.latitude,
        longitude: objective.longitude,
        version: objective.version,
        status: objective.status.label(),
    }
}

fn display_id(objective: &Objective) -> String {
    objective
        .id
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

pub fn format_objective_line(objective: &Objective) -> String {
    let mut line = format!(
        "{}  v{}  {}",
        display_id(objective),
        objective.version,
        objective.name
    );
    if !objective.city.is_empty() {
        line.push_str(&format!(" ({})", objective.city));
    }
    if objective.status != PendingStatus::Synced {
        line.push_str(&format!("  [{}]", objective.status));
    }
    line
}

pub fn format_objective_lines(objectives: &[Objective]) -> Vec<String> {
    objectives.iter().map(format_objective_line).collect()
}

pub fn normalize_objective_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyObjectiveId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a stored objective by exact id or unique id prefix
pub fn resolve_objective(query: &str, store: &ObjectiveStore) -> Result<Objective, CliError> {
    let id = ObjectiveId::new(query);
    if let Some(objective) = store.load(&id)? {
        return Ok(objective);
    }

    let matches = store
        .scan()?
        .records
        .into_iter()
        .filter(|objective| {
            objective
                .id
                .as_ref()
                .is_some_and(|id| id.as_str().starts_with(query))
        })
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::ObjectiveNotFound(query.to_string())),
        [only] => Ok(only.clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(display_id)
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousObjectiveId(format!(
                "Objective ID prefix '{query}' is ambiguous. Matches: {options}"
            )))
        }
    }
}

fn normalize_field(value: Option<&String>) -> Option<String> {
    value.map(|value| value.trim().to_string())
}

/// Apply the flags that were passed onto `objective`
pub fn apply_fields(objective: &mut Objective, fields: &ObjectiveArgs) -> Result<(), CliError> {
    if let Some(name) = normalize_field(fields.name.as_ref()) {
        if name.is_empty() {
            return Err(CliError::EmptyName);
        }
        objective.name = name;
    }
    if let Some(city) = normalize_field(fields.city.as_ref()) {
        objective.city = city;
    }
    if let Some(address) = normalize_field(fields.address.as_ref()) {
        objective.address = address;
    }
    if let Some(neighborhood) = normalize_field(fields.neighborhood.as_ref()) {
        objective.neighborhood = neighborhood;
    }
    if let Some(latitude) = fields.latitude {
        objective.latitude = latitude;
    }
    if let Some(longitude) = fields.longitude {
        objective.longitude = longitude;
    }
    if let Some(image) = normalize_field(fields.image.as_ref()) {
        objective.img_path = image;
    }
    Ok(())
}

/// Build a brand-new objective from the `add` flags
pub fn new_objective(fields: &ObjectiveArgs, user_id: &str) -> Result<Objective, CliError> {
    let name = normalize_field(fields.name.as_ref()).unwrap_or_default();
    if name.is_empty() {
        return Err(CliError::EmptyName);
    }
    let mut objective = Objective::new(String::new(), user_id);
    apply_fields(&mut objective, fields)?;
    Ok(objective)
}
