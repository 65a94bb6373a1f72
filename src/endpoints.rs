//! Endpoint list loading.
//!
//! The list is a JSON array of `{name, baseUrl, id, enabled}` objects. Older
//! lists spell the URL `api` and the label `detail`; both are accepted here so
//! the rest of the crate only ever sees [`Endpoint`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ConfigError;

/// Label shown when an endpoint has no id.
pub const NO_ID: &str = "-";

/// One monitored endpoint. Identified by its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
    pub id: String,
    pub disabled: bool,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            id: NO_ID.to_string(),
            disabled: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Identity key used to match history entries.
    pub fn key(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointDef {
    #[serde(default)]
    name: String,
    #[serde(alias = "api")]
    base_url: String,
    #[serde(default, alias = "detail")]
    id: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Read and parse the endpoint list at `path`. Any failure here is fatal.
pub fn load(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let defs: Vec<EndpointDef> =
        serde_json::from_str(&content).map_err(|source| ConfigError::Endpoints {
            path: path.to_path_buf(),
            source,
        })?;
    if defs.is_empty() {
        return Err(ConfigError::NoEndpoints(path.to_path_buf()));
    }

    let endpoints = from_defs(defs)?;
    info!(
        path = %path.display(),
        total = endpoints.len(),
        disabled = endpoints.iter().filter(|e| e.disabled).count(),
        "loaded endpoint list"
    );
    Ok(endpoints)
}

/// Parse an endpoint list from a JSON string.
pub fn parse(json: &str) -> Result<Vec<Endpoint>, ConfigError> {
    let defs: Vec<EndpointDef> =
        serde_json::from_str(json).map_err(|source| ConfigError::Endpoints {
            path: "<inline>".into(),
            source,
        })?;
    from_defs(defs)
}

fn from_defs(defs: Vec<EndpointDef>) -> Result<Vec<Endpoint>, ConfigError> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(defs.len());

    for (index, def) in defs.into_iter().enumerate() {
        let base_url = def.base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidEndpoint {
                index,
                reason: "baseUrl is empty".into(),
            });
        }
        if !seen.insert(base_url.clone()) {
            warn!(index, %base_url, "duplicate endpoint, keeping the first definition");
            continue;
        }

        let id = def
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| NO_ID.to_string());
        let name = if def.name.trim().is_empty() {
            base_url.clone()
        } else {
            def.name
        };

        endpoints.push(Endpoint {
            name,
            base_url,
            id,
            disabled: !def.enabled,
        });
    }

    Ok(endpoints)
}
