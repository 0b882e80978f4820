//! Adapter definitions and the registry that maps `(name, direction)` to them.
//!
//! The registry holds plain, immutable [`AdapterDefinition`] values; a single
//! constructor ([`CustomAdapter::new`]) turns one into a working adapter.
//! [`configure_custom_adapters`] fills a registry from configuration and is
//! called explicitly by the host at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::CustomAdapter;
use crate::config::{ConfigSource, parse_bool, split_args};
use crate::error::ConfigError;
use crate::transfer::{AdapterServices, Direction};

/// Default configuration namespace, as in `lfs.customtransfer.<name>.path`.
pub const DEFAULT_NAMESPACE: &str = "lfs";

/// Which directions an adapter definition should be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterDirections {
    Upload,
    Download,
    #[default]
    Both,
}

impl AdapterDirections {
    pub fn directions(self) -> &'static [Direction] {
        match self {
            AdapterDirections::Upload => &[Direction::Upload],
            AdapterDirections::Download => &[Direction::Download],
            AdapterDirections::Both => &[Direction::Upload, Direction::Download],
        }
    }

    /// Parse `upload`, `download` or `both`, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" => Some(AdapterDirections::Upload),
            "download" => Some(AdapterDirections::Download),
            "both" => Some(AdapterDirections::Both),
            _ => None,
        }
    }
}

/// Everything needed to launch one kind of custom transfer agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDefinition {
    name: String,
    path: PathBuf,
    args: String,
    concurrent: bool,
    directions: AdapterDirections,
    read_timeout: Option<Duration>,
}

impl AdapterDefinition {
    /// A definition with no arguments, concurrency allowed, both directions
    /// and no read timeout.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: String::new(),
            concurrent: true,
            directions: AdapterDirections::Both,
            read_timeout: None,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn with_directions(mut self, directions: AdapterDirections) -> Self {
        self.directions = directions;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw argument string as configured.
    pub fn args(&self) -> &str {
        &self.args
    }

    /// The argument string split into individual arguments.
    pub fn argv(&self) -> Vec<String> {
        split_args(&self.args)
    }

    /// Whether more than one agent process may run at once.
    pub fn concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn directions(&self) -> AdapterDirections {
        self.directions
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

/// Registered adapter definitions, keyed by name and direction.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<(String, Direction), Arc<AdapterDefinition>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` for each of its directions.
    ///
    /// Registration is all-or-nothing: if the name is already taken for any
    /// of the directions, nothing is registered and the conflict is returned.
    pub fn register(&mut self, definition: AdapterDefinition) -> Result<(), ConfigError> {
        let directions = definition.directions().directions();
        if let Some(&direction) = directions
            .iter()
            .find(|&&d| self.adapters.contains_key(&(definition.name.clone(), d)))
        {
            return Err(ConfigError::Duplicate {
                name: definition.name.clone(),
                direction,
            });
        }

        let definition = Arc::new(definition);
        for &direction in directions {
            self.adapters
                .insert((definition.name.clone(), direction), Arc::clone(&definition));
        }
        Ok(())
    }

    pub fn get(&self, name: &str, direction: Direction) -> Option<Arc<AdapterDefinition>> {
        self.adapters.get(&(name.to_string(), direction)).cloned()
    }

    /// Names registered for `direction`, sorted.
    pub fn names(&self, direction: Direction) -> Vec<&str> {
        self.adapters
            .keys()
            .filter(|(_, d)| *d == direction)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Build a fresh adapter for one worker-pool session.
    pub fn new_adapter(
        &self,
        name: &str,
        direction: Direction,
        services: AdapterServices,
    ) -> Option<CustomAdapter> {
        self.get(name, direction)
            .map(|definition| CustomAdapter::new(definition, direction, services))
    }

    /// Number of `(name, direction)` registrations.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Outcome of [`configure_custom_adapters`].
#[derive(Debug, Default)]
pub struct ConfigureReport {
    pub registered: Vec<(String, Direction)>,
    pub errors: Vec<ConfigError>,
}

/// Discover `<namespace>.customtransfer.<name>.path` entries in `config` and
/// register an adapter for each.
///
/// A bad entry is reported in [`ConfigureReport::errors`] and skipped; the
/// remaining entries are still registered.
pub fn configure_custom_adapters(
    registry: &mut AdapterRegistry,
    config: &dyn ConfigSource,
    namespace: &str,
) -> ConfigureReport {
    // Keyed by name so a repeated key resolves to its last value.
    let candidates: BTreeMap<String, String> = config
        .entries()
        .filter_map(|(key, value)| {
            adapter_name_from_key(key, namespace).map(|name| (name.to_string(), value.to_string()))
        })
        .collect();

    let mut report = ConfigureReport::default();
    for (name, path) in candidates {
        let registered = definition_from_config(config, namespace, &name, &path).and_then(|def| {
            let directions = def.directions().directions();
            registry.register(def)?;
            Ok(directions)
        });
        match registered {
            Ok(directions) => {
                info!(adapter = %name, path = %path, ?directions, "registered custom transfer adapter");
                report
                    .registered
                    .extend(directions.iter().map(|&d| (name.clone(), d)));
            }
            Err(e) => {
                warn!(adapter = %name, error = %e, "skipping custom transfer adapter");
                report.errors.push(e);
            }
        }
    }
    report
}

/// Extract `<name>` from `<namespace>.customtransfer.<name>.path`.
fn adapter_name_from_key<'a>(key: &'a str, namespace: &str) -> Option<&'a str> {
    let (section, rest) = key.split_once('.')?;
    if !section.eq_ignore_ascii_case(namespace) {
        return None;
    }
    let (subsection, variable) = rest.rsplit_once('.')?;
    if !variable.eq_ignore_ascii_case("path") {
        return None;
    }
    let name = subsection.strip_prefix("customtransfer.")?;
    (!name.is_empty() && !name.contains('.')).then_some(name)
}

fn definition_from_config(
    config: &dyn ConfigSource,
    namespace: &str,
    name: &str,
    path: &str,
) -> Result<AdapterDefinition, ConfigError> {
    if path.trim().is_empty() {
        return Err(ConfigError::EmptyPath {
            name: name.to_string(),
        });
    }
    let key = |variable: &str| format!("{namespace}.customtransfer.{name}.{variable}");

    let args = config.get(&key("args")).unwrap_or_default().to_string();

    let concurrent = match config.get(&key("concurrent")) {
        Some(value) => parse_bool(&key("concurrent"), value)?,
        None => true,
    };

    let directions = match config.get(&key("direction")) {
        Some(value) if !value.trim().is_empty() => {
            AdapterDirections::parse(value).ok_or_else(|| ConfigError::InvalidDirection {
                key: key("direction"),
                value: value.to_string(),
            })?
        }
        _ => AdapterDirections::Both,
    };

    let read_timeout = match config.get(&key("timeout")) {
        Some(value) => {
            let secs: u64 = value.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
                key: key("timeout"),
                value: value.to_string(),
            })?;
            (secs > 0).then(|| Duration::from_secs(secs))
        }
        None => None,
    };

    Ok(AdapterDefinition::new(name, path)
        .with_args(args)
        .with_concurrent(concurrent)
        .with_directions(directions)
        .with_read_timeout(read_timeout))
}
