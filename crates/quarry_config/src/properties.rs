//! Build-properties loading from `quarry.toml`.

use crate::error::ConfigError;
use quarry_model::{BuildPropertiesLoader, HostError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Name of the build configuration file within the root directory.
const CONFIG_FILE: &str = "quarry.toml";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// Loads the `[properties]` table from `<root_dir>/quarry.toml`.
///
/// An absent file or absent table yields an empty map; this is fail-safe
/// because a build without declared properties is valid. A present but
/// unparseable file is an error.
pub fn load_build_properties(root_dir: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let path = root_dir.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(ConfigError::Io { path, source: e }),
    };
    load_build_properties_from_str(&content)
}

/// Parses the `[properties]` table from configuration text.
///
/// Useful for testing without filesystem dependencies.
pub fn load_build_properties_from_str(
    content: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let config: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;
    Ok(config.properties)
}

/// A shared store of build properties visible to value sources.
///
/// The cache engine populates it once before fingerprint checking; the
/// host's value-source machinery reads from it afterwards.
#[derive(Clone, Default)]
pub struct BuildProperties {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl BuildProperties {
    /// Creates an empty property store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a property, if set.
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    /// Sets one property.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().unwrap().insert(name.into(), value.into());
    }

    /// Merges all entries from `properties` into the store.
    pub fn extend(&self, properties: BTreeMap<String, String>) {
        self.inner.lock().unwrap().extend(properties);
    }

    /// Returns the number of stored properties.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Returns `true` if no properties are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

/// [`BuildPropertiesLoader`] collaborator backed by `quarry.toml`.
pub struct TomlPropertiesLoader {
    target: BuildProperties,
}

impl TomlPropertiesLoader {
    /// Creates a loader populating the given property store.
    pub fn new(target: BuildProperties) -> Self {
        Self { target }
    }
}

impl BuildPropertiesLoader for TomlPropertiesLoader {
    fn load_properties_from(&self, root_dir: &Path) -> Result<(), HostError> {
        let properties = load_build_properties(root_dir)?;
        self.target.extend(properties);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_properties_table() {
        let toml = r#"
[properties]
env = "ci"
"org.quarry.parallel" = "true"
"#;
        let props = load_build_properties_from_str(toml).unwrap();
        assert_eq!(props.get("env").map(String::as_str), Some("ci"));
        assert_eq!(
            props.get("org.quarry.parallel").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn missing_table_is_empty() {
        let props = load_build_properties_from_str("").unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let props = load_build_properties(dir.path()).unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn unparseable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "not valid toml [[[").unwrap();
        assert!(load_build_properties(dir.path()).is_err());
    }

    #[test]
    fn loader_populates_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[properties]\nenv = \"ci\"\n",
        )
        .unwrap();

        let store = BuildProperties::new();
        let loader = TomlPropertiesLoader::new(store.clone());
        loader.load_properties_from(dir.path()).unwrap();

        assert_eq!(store.get("env").as_deref(), Some("ci"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_set_and_get() {
        let store = BuildProperties::new();
        assert!(store.is_empty());
        store.set("env", "local");
        assert_eq!(store.get("env").as_deref(), Some("local"));
        assert!(store.get("other").is_none());
    }
}
