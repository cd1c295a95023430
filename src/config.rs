/*!
Centralized configuration storage with user-configurable paths.

Configuration lives as one JSON file per entry, grouped into category
directories under a single base directory. Path resolution layers an
explicitly supplied base directory over environment variables over a
built-in default.

The [`ConfigManager`] is a plain owned value, passed explicitly to
whatever needs it (the format registry, tests construct their own). It
keeps an in-process cache with no locking discipline: concurrent writers,
in-process or out, are not supported.
*/
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::warn;
use serde::Serialize;
use serde_json::Value;

/// Base configuration directory override.
pub const ENV_CONFIG_DIR: &str = "MAGNETDATA_CONFIG_DIR";
/// Per-category directory overrides.
pub const ENV_FORMATS_DIR: &str = "MAGNETDATA_FORMATS_DIR";
pub const ENV_HOUSINGS_DIR: &str = "MAGNETDATA_HOUSINGS_DIR";
pub const ENV_FIELD_DEFS_DIR: &str = "MAGNETDATA_FIELD_DEFS_DIR";

/// The configuration categories the manager knows how to place on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigCategory {
    Format,
    Housing,
    FieldDefinition,
    /// A caller-registered custom directory, addressed by its name
    Custom(String),
}

impl ConfigCategory {
    pub fn key(&self) -> &str {
        match self {
            Self::Format => "format",
            Self::Housing => "housing",
            Self::FieldDefinition => "field_definition",
            Self::Custom(name) => name,
        }
    }
}

/// Where each configuration category lives on disk.
///
/// Every directory derives from `base_dir` unless explicitly overridden.
/// Directories are created on first use and never implicitly deleted.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub base_dir: PathBuf,
    pub formats_dir: PathBuf,
    pub housings_dir: PathBuf,
    pub field_definitions_dir: PathBuf,
    pub custom_dirs: IndexMap<String, PathBuf>,
}

impl ConfigPaths {
    fn default_base_dir() -> PathBuf {
        match env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".magnetdata"),
            None => PathBuf::from("magnetdata-configs"),
        }
    }

    pub fn from_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        let base_dir = base_dir.into();
        Self {
            formats_dir: base_dir.join("formats"),
            housings_dir: base_dir.join("housings"),
            field_definitions_dir: base_dir.join("field_definitions"),
            custom_dirs: IndexMap::new(),
            base_dir,
        }
    }

    /// Resolve paths from the environment, falling back to the built-in
    /// default base directory. Individual category variables override the
    /// derived directories.
    pub fn from_environment() -> Self {
        let base = env::var_os(ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_base_dir);
        let mut paths = Self::from_base_dir(base);
        if let Some(dir) = env::var_os(ENV_FORMATS_DIR) {
            paths.formats_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env::var_os(ENV_HOUSINGS_DIR) {
            paths.housings_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env::var_os(ENV_FIELD_DEFS_DIR) {
            paths.field_definitions_dir = PathBuf::from(dir);
        }
        paths
    }

    pub fn add_custom_dir<P: Into<PathBuf>>(&mut self, name: &str, path: P) {
        self.custom_dirs.insert(name.to_string(), path.into());
    }

    pub fn dir_for(&self, category: &ConfigCategory) -> Option<&Path> {
        match category {
            ConfigCategory::Format => Some(&self.formats_dir),
            ConfigCategory::Housing => Some(&self.housings_dir),
            ConfigCategory::FieldDefinition => Some(&self.field_definitions_dir),
            ConfigCategory::Custom(name) => self.custom_dirs.get(name).map(|p| p.as_path()),
        }
    }

    /// The on-disk file stem for a named configuration. Housing names are
    /// lowercased (`M9` and `m9` are the same housing).
    pub fn storage_stem(category: &ConfigCategory, name: &str) -> String {
        match category {
            ConfigCategory::Housing => name.to_lowercase(),
            _ => name.to_string(),
        }
    }

    /// Full path of a named configuration file.
    pub fn path_for(&self, category: &ConfigCategory, name: &str) -> Option<PathBuf> {
        let dir = self.dir_for(category)?;
        Some(dir.join(format!("{}.json", Self::storage_stem(category, name))))
    }

    pub fn ensure_directories_exist(&self) -> io::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        fs::create_dir_all(&self.formats_dir)?;
        fs::create_dir_all(&self.housings_dir)?;
        fs::create_dir_all(&self.field_definitions_dir)?;
        for dir in self.custom_dirs.values() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// A snapshot of the manager's directory layout and cache state.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigInfo {
    pub base_dir: String,
    pub formats_dir: String,
    pub housings_dir: String,
    pub field_definitions_dir: String,
    pub custom_dirs: IndexMap<String, String>,
    pub directories_exist: IndexMap<String, bool>,
    pub config_counts: IndexMap<String, usize>,
    pub cache_size: usize,
}

/// JSON configuration load/save with an in-process cache.
///
/// Missing or malformed files are a normal bootstrap state: loads log a
/// warning and return `None` instead of failing.
#[derive(Debug)]
pub struct ConfigManager {
    paths: ConfigPaths,
    cache: HashMap<String, Value>,
}

impl ConfigManager {
    pub fn new(paths: ConfigPaths) -> Self {
        if let Err(e) = paths.ensure_directories_exist() {
            warn!(
                "Could not create configuration directories under {:?}: {}",
                paths.base_dir, e
            );
        }
        Self {
            paths,
            cache: HashMap::new(),
        }
    }

    pub fn from_environment() -> Self {
        Self::new(ConfigPaths::from_environment())
    }

    pub fn from_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self::new(ConfigPaths::from_base_dir(base_dir))
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn add_custom_dir<P: Into<PathBuf>>(&mut self, name: &str, path: P) {
        let path = path.into();
        if let Err(e) = fs::create_dir_all(&path) {
            warn!("Could not create custom config directory {:?}: {}", path, e);
        }
        self.paths.add_custom_dir(name, path);
    }

    // Keyed by the on-disk stem, so name spellings that share a file
    // share one cache entry.
    fn cache_key(category: &ConfigCategory, name: &str) -> String {
        format!(
            "{}:{}",
            category.key(),
            ConfigPaths::storage_stem(category, name)
        )
    }

    /// Load a configuration, consulting the cache first when `use_cache`.
    pub fn load_config(
        &mut self,
        category: &ConfigCategory,
        name: &str,
        use_cache: bool,
    ) -> Option<Value> {
        let key = Self::cache_key(category, name);
        if use_cache {
            if let Some(value) = self.cache.get(&key) {
                return Some(value.clone());
            }
        }
        let Some(path) = self.paths.path_for(category, name) else {
            warn!("Unknown config category: {}", category.key());
            return None;
        };
        if !path.exists() {
            return None;
        }
        let value = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Failed to parse config {:?}: {}", path, e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Failed to read config {:?}: {}", path, e);
                return None;
            }
        };
        if use_cache {
            self.cache.insert(key, value.clone());
        }
        Some(value)
    }

    /// Persist a configuration and write it through to the cache. Returns
    /// whether the save succeeded; failures are logged, not raised.
    pub fn save_config(&mut self, category: &ConfigCategory, name: &str, data: &Value) -> bool {
        let Some(path) = self.paths.path_for(category, name) else {
            warn!("Unknown config category: {}", category.key());
            return false;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create config directory {:?}: {}", parent, e);
                return false;
            }
        }
        let text = match serde_json::to_string_pretty(data) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize config '{}': {}", name, e);
                return false;
            }
        };
        if let Err(e) = fs::write(&path, text) {
            warn!("Failed to save config {:?}: {}", path, e);
            return false;
        }
        self.cache.insert(Self::cache_key(category, name), data.clone());
        true
    }

    /// Names (file stems) of the configurations present for a category.
    pub fn list_configs(&self, category: &ConfigCategory) -> Vec<String> {
        let Some(dir) = self.paths.dir_for(category) else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Evict one entry and reload it from disk.
    pub fn reload_config(&mut self, category: &ConfigCategory, name: &str) -> Option<Value> {
        self.cache.remove(&Self::cache_key(category, name));
        self.load_config(category, name, true)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn get_config_info(&self) -> ConfigInfo {
        let paths = &self.paths;
        let mut directories_exist = IndexMap::new();
        directories_exist.insert("base".to_string(), paths.base_dir.exists());
        directories_exist.insert("formats".to_string(), paths.formats_dir.exists());
        directories_exist.insert("housings".to_string(), paths.housings_dir.exists());
        directories_exist.insert(
            "field_definitions".to_string(),
            paths.field_definitions_dir.exists(),
        );
        let mut config_counts = IndexMap::new();
        config_counts.insert(
            "formats".to_string(),
            self.list_configs(&ConfigCategory::Format).len(),
        );
        config_counts.insert(
            "housings".to_string(),
            self.list_configs(&ConfigCategory::Housing).len(),
        );
        config_counts.insert(
            "field_definitions".to_string(),
            self.list_configs(&ConfigCategory::FieldDefinition).len(),
        );
        for name in paths.custom_dirs.keys() {
            let category = ConfigCategory::Custom(name.clone());
            directories_exist.insert(
                format!("custom_{}", name),
                paths.dir_for(&category).is_some_and(|d| d.exists()),
            );
            config_counts.insert(
                format!("custom_{}", name),
                self.list_configs(&category).len(),
            );
        }
        ConfigInfo {
            base_dir: paths.base_dir.display().to_string(),
            formats_dir: paths.formats_dir.display().to_string(),
            housings_dir: paths.housings_dir.display().to_string(),
            field_definitions_dir: paths.field_definitions_dir.display().to_string(),
            custom_dirs: paths
                .custom_dirs
                .iter()
                .map(|(k, v)| (k.clone(), v.display().to_string()))
                .collect(),
            directories_exist,
            config_counts,
            cache_size: self.cache.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::from_base_dir(dir.path());
        (dir, manager)
    }

    #[test]
    fn directories_created_on_construction() {
        let (dir, manager) = manager();
        assert!(dir.path().join("formats").is_dir());
        assert!(dir.path().join("housings").is_dir());
        assert!(dir.path().join("field_definitions").is_dir());
        let info = manager.get_config_info();
        assert!(info.directories_exist["formats"]);
        assert_eq!(info.cache_size, 0);
    }

    #[test]
    fn save_then_load_round_trip() {
        let (_dir, mut manager) = manager();
        let data = json!({"format_name": "demo", "fields": []});
        assert!(manager.save_config(&ConfigCategory::Format, "demo", &data));
        let loaded = manager
            .load_config(&ConfigCategory::Format, "demo", true)
            .unwrap();
        assert_eq!(loaded, data);
        assert_eq!(
            manager.list_configs(&ConfigCategory::Format),
            vec!["demo".to_string()]
        );
    }

    #[test]
    fn missing_config_is_none_not_error() {
        let (_dir, mut manager) = manager();
        assert!(manager
            .load_config(&ConfigCategory::Format, "absent", true)
            .is_none());
    }

    #[test_log::test]
    fn malformed_config_is_none_not_error() {
        let (dir, mut manager) = manager();
        fs::write(dir.path().join("formats/bad.json"), "{not json").unwrap();
        assert!(manager
            .load_config(&ConfigCategory::Format, "bad", true)
            .is_none());
    }

    #[test]
    fn cache_serves_until_reload() {
        let (dir, mut manager) = manager();
        let data = json!({"v": 1});
        manager.save_config(&ConfigCategory::Format, "demo", &data);
        // External edit behind the cache's back
        fs::write(dir.path().join("formats/demo.json"), r#"{"v": 2}"#).unwrap();
        let stale = manager
            .load_config(&ConfigCategory::Format, "demo", true)
            .unwrap();
        assert_eq!(stale["v"], 1);
        let fresh = manager.reload_config(&ConfigCategory::Format, "demo").unwrap();
        assert_eq!(fresh["v"], 2);
        // Bypassing the cache reads disk directly
        manager.save_config(&ConfigCategory::Format, "demo", &data);
        fs::write(dir.path().join("formats/demo.json"), r#"{"v": 3}"#).unwrap();
        let direct = manager
            .load_config(&ConfigCategory::Format, "demo", false)
            .unwrap();
        assert_eq!(direct["v"], 3);
    }

    #[test]
    fn clear_cache_evicts_everything() {
        let (dir, mut manager) = manager();
        manager.save_config(&ConfigCategory::Format, "a", &json!({"v": 1}));
        manager.save_config(&ConfigCategory::Housing, "m9", &json!({"v": 1}));
        assert_eq!(manager.cache_size(), 2);
        manager.clear_cache();
        assert_eq!(manager.cache_size(), 0);
        // Still loadable from disk afterwards
        assert!(manager
            .load_config(&ConfigCategory::Format, "a", true)
            .is_some());
        let _ = dir;
    }

    #[test]
    fn housing_names_are_lowercased_on_disk() {
        let (dir, mut manager) = manager();
        manager.save_config(&ConfigCategory::Housing, "M9", &json!({}));
        assert!(dir.path().join("housings/m9.json").exists());
        assert!(manager
            .load_config(&ConfigCategory::Housing, "m9", false)
            .is_some());
    }

    #[test]
    fn housing_case_variants_share_one_cache_entry() {
        let (_dir, mut manager) = manager();
        manager.save_config(&ConfigCategory::Housing, "M9", &json!({"v": 1}));
        manager.save_config(&ConfigCategory::Housing, "m9", &json!({"v": 2}));
        // One file on disk, so one cache entry, holding the last write
        assert_eq!(manager.cache_size(), 1);
        let cached = manager
            .load_config(&ConfigCategory::Housing, "M9", true)
            .unwrap();
        assert_eq!(cached["v"], 2);
        let reloaded = manager.reload_config(&ConfigCategory::Housing, "M9").unwrap();
        assert_eq!(reloaded["v"], 2);
    }

    #[test]
    fn environment_overrides_resolve_per_category() {
        // Env vars are process-global; set and clear them inside one test
        let base = tempfile::tempdir().unwrap();
        let formats = tempfile::tempdir().unwrap();
        env::set_var(ENV_CONFIG_DIR, base.path());
        env::set_var(ENV_FORMATS_DIR, formats.path());
        env::remove_var(ENV_HOUSINGS_DIR);
        env::remove_var(ENV_FIELD_DEFS_DIR);
        let paths = ConfigPaths::from_environment();
        env::remove_var(ENV_CONFIG_DIR);
        env::remove_var(ENV_FORMATS_DIR);

        assert_eq!(paths.base_dir, base.path());
        // Category override wins over the derived directory
        assert_eq!(paths.formats_dir, formats.path());
        // Unset categories derive from the base
        assert_eq!(paths.housings_dir, base.path().join("housings"));
        assert_eq!(
            paths.field_definitions_dir,
            base.path().join("field_definitions")
        );

        // An explicit base dir bypasses the environment entirely
        let explicit = ConfigPaths::from_base_dir("/tmp/somewhere");
        assert_eq!(explicit.formats_dir, PathBuf::from("/tmp/somewhere/formats"));
    }

    #[test]
    fn custom_category_round_trip() {
        let (dir, mut manager) = manager();
        manager.add_custom_dir("instruments", dir.path().join("instruments"));
        let category = ConfigCategory::Custom("instruments".to_string());
        assert!(manager.save_config(&category, "probe", &json!({"model": "hall"})));
        assert_eq!(manager.list_configs(&category), vec!["probe".to_string()]);
        // Unregistered custom category degrades to nothing
        let unknown = ConfigCategory::Custom("nope".to_string());
        assert!(manager.load_config(&unknown, "x", true).is_none());
        assert!(!manager.save_config(&unknown, "x", &json!({})));
    }
}
