use std::{
    collections::HashSet,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::geodesy::GeoPoint;

pub const BUILTIN_PORTS: &str = include_str!("data/ports.json");

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Port {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Port {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PortsFile {
    ports: Vec<Port>,
}

/// Static set of ports routes are drawn between. Identity is the port name.
#[derive(Debug, Clone)]
pub struct PortRegistry {
    ports: Vec<Port>,
}

impl PortRegistry {
    pub fn builtin() -> Arc<Self> {
        let registry =
            PortRegistry::from_json_str(BUILTIN_PORTS).expect("builtin port registry should parse");
        Arc::new(registry)
    }

    pub fn from_ports(ports: Vec<Port>) -> Result<Self, PortRegistryError> {
        let mut seen = HashSet::with_capacity(ports.len());
        for port in &ports {
            let lat_ok = port.latitude.is_finite() && (-90.0..=90.0).contains(&port.latitude);
            let lon_ok = port.longitude.is_finite() && (-180.0..=180.0).contains(&port.longitude);
            if !lat_ok || !lon_ok {
                return Err(PortRegistryError::InvalidCoordinates {
                    name: port.name.clone(),
                    latitude: port.latitude,
                    longitude: port.longitude,
                });
            }
            if !seen.insert(port.name.as_str()) {
                return Err(PortRegistryError::DuplicateName(port.name.clone()));
            }
        }
        if ports.len() < 2 {
            return Err(PortRegistryError::TooFewPorts(ports.len()));
        }
        Ok(Self { ports })
    }

    pub fn from_json_str(json: &str) -> Result<Self, PortRegistryError> {
        let parsed: PortsFile = serde_json::from_str(json)?;
        Self::from_ports(parsed.ports)
    }

    pub fn from_file(path: &Path) -> Result<Self, PortRegistryError> {
        let contents = fs::read_to_string(path).map_err(|source| PortRegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn get(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|port| port.name == name)
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PortRegistryError {
    #[error("failed to parse port registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read port registry from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("port registry needs at least two ports to draw distinct routes, found {0}")]
    TooFewPorts(usize),
    #[error("port {0:?} appears more than once")]
    DuplicateName(String),
    #[error("port {name:?} has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        name: String,
        latitude: f64,
        longitude: f64,
    },
}

/// Loads the registry from `explicit`, then `VOYAGE_PORTS_PATH`, falling back
/// to the builtin list when neither is set or the file cannot be used.
pub fn load_port_registry(explicit: Option<&Path>) -> Arc<PortRegistry> {
    let override_path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var("VOYAGE_PORTS_PATH").ok().map(PathBuf::from));

    if let Some(path) = override_path {
        match PortRegistry::from_file(&path) {
            Ok(registry) => {
                tracing::info!(
                    target: "voyage::ports",
                    path = %path.display(),
                    ports = registry.len(),
                    "port_registry.loaded=file"
                );
                return Arc::new(registry);
            }
            Err(err) => {
                tracing::warn!(
                    target: "voyage::ports",
                    path = %path.display(),
                    error = %err,
                    "port_registry.load_failed"
                );
            }
        }
    }

    let registry = PortRegistry::builtin();
    tracing::info!(
        target: "voyage::ports",
        ports = registry.len(),
        "port_registry.loaded=builtin"
    );
    registry
}
