use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::Value;

use super::builtin::{builtin_format, BUILTIN_FORMAT_NAMES};
use super::validate::{
    field_summary, merge_format_definitions, validate_format_definition, FieldSummary,
    ValidationReport,
};
use super::{FormatDefinition, FormatError};
use crate::config::{ConfigCategory, ConfigManager};
use crate::units::UnitRegistry;

/// How a format's raw files are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    /// Whitespace-separated text tables with a header row
    Pupitre,
    /// TDMS binary files organized as groups of channels
    Pigbrother,
    /// Comma-separated field-profile tables
    Bprofile,
}

/// How a format's data is held in memory once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// A single table of equal-length columns
    Tabular,
    /// Named groups of tables, addressed by `group/channel` keys
    Grouped,
}

/// Everything needed to handle one format: its reader, its storage
/// layout, and its field schema.
#[derive(Debug, Clone)]
pub struct ResolvedFormat {
    pub reader: ReaderKind,
    pub storage: StorageKind,
    pub definition: Arc<FormatDefinition>,
}

/**
Resolves format names to definitions, readers, and storage layouts.

Definition lookup walks a three-tier chain: the in-memory cache, the
centralized configuration store, then compiled builtin defaults. A
definition found on disk shadows the builtin of the same name, so sites
can override defaults by dropping a JSON file in the formats directory.

Reader and storage registrations are seeded at construction and only
grow afterwards; resolution never mutates them.
*/
#[derive(Debug)]
pub struct FormatRegistry {
    config: ConfigManager,
    units: Arc<UnitRegistry>,
    readers: IndexMap<String, ReaderKind>,
    handlers: IndexMap<String, StorageKind>,
    cache: IndexMap<String, Arc<FormatDefinition>>,
}

impl FormatRegistry {
    /// Build a registry over the given configuration store, with the
    /// builtin formats' readers and storage layouts pre-registered.
    pub fn new(config: ConfigManager) -> Self {
        let mut registry = Self {
            config,
            units: Arc::new(UnitRegistry::new()),
            readers: IndexMap::new(),
            handlers: IndexMap::new(),
            cache: IndexMap::new(),
        };
        registry.register_reader("pupitre", ReaderKind::Pupitre);
        registry.register_reader("pigbrother", ReaderKind::Pigbrother);
        registry.register_reader("bprofile", ReaderKind::Bprofile);
        registry.register_data_handler("pupitre", StorageKind::Tabular);
        registry.register_data_handler("pigbrother", StorageKind::Grouped);
        registry.register_data_handler("bprofile", StorageKind::Tabular);
        registry
    }

    pub fn from_environment() -> Self {
        Self::new(ConfigManager::from_environment())
    }

    pub fn units(&self) -> &Arc<UnitRegistry> {
        &self.units
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigManager {
        &mut self.config
    }

    pub fn register_reader(&mut self, format_name: &str, reader: ReaderKind) {
        self.readers.insert(format_name.to_string(), reader);
    }

    pub fn register_data_handler(&mut self, format_name: &str, storage: StorageKind) {
        self.handlers.insert(format_name.to_string(), storage);
    }

    /// Register a new format's reader and storage layout in one step.
    pub fn register_format(&mut self, format_name: &str, reader: ReaderKind, storage: StorageKind) {
        self.register_reader(format_name, reader);
        self.register_data_handler(format_name, storage);
    }

    pub fn get_reader(&self, format_name: &str) -> Result<ReaderKind, FormatError> {
        self.readers
            .get(format_name)
            .copied()
            .ok_or_else(|| FormatError::UnknownFormat(format_name.to_string()))
    }

    pub fn get_data_handler(&self, format_name: &str) -> Result<StorageKind, FormatError> {
        self.handlers
            .get(format_name)
            .copied()
            .ok_or_else(|| FormatError::UnknownFormat(format_name.to_string()))
    }

    /// Format names with a registered reader, in registration order.
    pub fn supported_formats(&self) -> Vec<&str> {
        self.readers.keys().map(|k| k.as_str()).collect()
    }

    /// Resolve a definition through the cache, the configuration store,
    /// and finally the compiled builtins. `None` means the name is unknown
    /// at every tier.
    pub fn get_format(&mut self, format_name: &str) -> Option<Arc<FormatDefinition>> {
        if let Some(def) = self.cache.get(format_name) {
            return Some(def.clone());
        }
        if let Some(value) = self
            .config
            .load_config(&ConfigCategory::Format, format_name, true)
        {
            match serde_json::from_value::<FormatDefinition>(value) {
                Ok(def) => {
                    debug!("Loaded format '{}' from config store", format_name);
                    let def = Arc::new(def);
                    self.cache.insert(format_name.to_string(), def.clone());
                    return Some(def);
                }
                Err(e) => {
                    warn!(
                        "Stored format '{}' is not a valid definition ({}); \
                         falling back to builtin",
                        format_name, e
                    );
                }
            }
        }
        if let Some(def) = builtin_format(format_name) {
            debug!("Using builtin defaults for format '{}'", format_name);
            let def = Arc::new(def);
            self.cache.insert(format_name.to_string(), def.clone());
            return Some(def);
        }
        None
    }

    /// Resolve the full handling bundle for a format name.
    pub fn resolve(&mut self, format_name: &str) -> Result<ResolvedFormat, FormatError> {
        let definition = self
            .get_format(format_name)
            .ok_or_else(|| FormatError::UnknownFormat(format_name.to_string()))?;
        Ok(ResolvedFormat {
            reader: self.get_reader(format_name)?,
            storage: self.get_data_handler(format_name)?,
            definition,
        })
    }

    /// Persist a definition to the configuration store and cache it. The
    /// stored copy is stamped with a `saved_at` timestamp. Returns whether
    /// the save succeeded.
    pub fn register_format_definition(&mut self, mut def: FormatDefinition) -> bool {
        def.metadata.insert(
            "saved_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let name = def.format_name.clone();
        let value = match serde_json::to_value(&def) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not serialize format '{}': {}", name, e);
                return false;
            }
        };
        if !self.config.save_config(&ConfigCategory::Format, &name, &value) {
            return false;
        }
        info!("Registered format definition '{}'", name);
        self.cache.insert(name, Arc::new(def));
        true
    }

    /// Cache a definition for this session without persisting it.
    pub fn load_format(&mut self, def: FormatDefinition) -> Arc<FormatDefinition> {
        let def = Arc::new(def);
        self.cache
            .insert(def.format_name.clone(), def.clone());
        def
    }

    /// Persist an already-cached or external definition. Alias for
    /// [`Self::register_format_definition`] kept for symmetry with
    /// [`Self::load_format`].
    pub fn save_format(&mut self, def: FormatDefinition) -> bool {
        self.register_format_definition(def)
    }

    /// Drop both the registry cache and the config manager's cache so the
    /// next lookups re-read disk.
    pub fn reload_formats(&mut self) {
        self.cache.clear();
        self.config.clear_cache();
        debug!("Format caches cleared");
    }

    /// All known format names: builtins, definitions on disk, and
    /// session-cached ones, deduplicated and sorted.
    pub fn list_formats(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_FORMAT_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend(self.config.list_configs(&ConfigCategory::Format));
        names.extend(self.cache.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Write every known definition to `dir` as JSON files. Existing files
    /// are skipped unless `overwrite`. Returns the number written.
    pub fn export_all_formats<P: AsRef<Path>>(
        &mut self,
        dir: P,
        overwrite: bool,
    ) -> Result<usize, FormatError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = 0;
        for name in self.list_formats() {
            let path = dir.join(format!("{}.json", name));
            if path.exists() && !overwrite {
                debug!("Skipping existing export {:?}", path);
                continue;
            }
            let Some(def) = self.get_format(&name) else {
                continue;
            };
            def.save_to_file(&path)?;
            written += 1;
        }
        info!("Exported {} format definitions to {:?}", written, dir);
        Ok(written)
    }

    /// Import every `*.json` definition in `dir` into the configuration
    /// store. Names already known are skipped unless `overwrite`. Returns
    /// the names imported; unreadable files are logged and skipped.
    pub fn import_formats_from_directory<P: AsRef<Path>>(
        &mut self,
        dir: P,
        overwrite: bool,
    ) -> Result<Vec<String>, FormatError> {
        let mut imported = Vec::new();
        let known = self.list_formats();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let def = match FormatDefinition::load_from_file(&path) {
                Ok(def) => def,
                Err(e) => {
                    warn!("Skipping unreadable definition {:?}: {}", path, e);
                    continue;
                }
            };
            if !overwrite && known.contains(&def.format_name) {
                debug!("Skipping already-known format '{}'", def.format_name);
                continue;
            }
            let name = def.format_name.clone();
            if self.register_format_definition(def) {
                imported.push(name);
            }
        }
        imported.sort();
        Ok(imported)
    }

    /// Validate a stored or builtin definition by name.
    pub fn validate_format(&mut self, format_name: &str) -> Result<ValidationReport, FormatError> {
        let def = self
            .get_format(format_name)
            .ok_or_else(|| FormatError::UnknownFormat(format_name.to_string()))?;
        Ok(validate_format_definition(&def, &self.units))
    }

    pub fn format_field_summary(
        &mut self,
        format_name: &str,
    ) -> Result<FieldSummary, FormatError> {
        let def = self
            .get_format(format_name)
            .ok_or_else(|| FormatError::UnknownFormat(format_name.to_string()))?;
        Ok(field_summary(&def))
    }

    /// Merge two known definitions into a new one, overlay fields winning.
    pub fn merge_formats(
        &mut self,
        base_name: &str,
        overlay_name: &str,
    ) -> Result<FormatDefinition, FormatError> {
        let base = self
            .get_format(base_name)
            .ok_or_else(|| FormatError::UnknownFormat(base_name.to_string()))?;
        let overlay = self
            .get_format(overlay_name)
            .ok_or_else(|| FormatError::UnknownFormat(overlay_name.to_string()))?;
        Ok(merge_format_definitions(&base, &overlay))
    }

    /// One-off scalar conversion between unit expressions. `None` when
    /// either side fails to parse or the dimensions differ.
    pub fn convert_between_units(&self, value: f64, from: &str, to: &str) -> Option<f64> {
        let source = self.units.parse_expression(from).ok()?;
        let target = self.units.parse_expression(to).ok()?;
        source.convert(value, &target)
    }

    /// Seed the configuration store with the builtin format definitions
    /// and a skeleton housing entry, so a fresh site has files to edit.
    /// Existing entries are left alone unless `overwrite`. Returns how
    /// many entries were written.
    pub fn create_default_configs(&mut self, overwrite: bool) -> usize {
        let mut written = 0;
        let existing = self.config.list_configs(&ConfigCategory::Format);
        for name in BUILTIN_FORMAT_NAMES {
            if !overwrite && existing.contains(&name.to_string()) {
                continue;
            }
            let def = builtin_format(name).unwrap_or_default();
            if self.register_format_definition(def) {
                written += 1;
            }
        }
        let housings = self.config.list_configs(&ConfigCategory::Housing);
        if overwrite || !housings.contains(&"m9".to_string()) {
            let skeleton = serde_json::json!({
                "metadata": {
                    "description": "Default housing skeleton, edit per site"
                },
                "Insert": {},
                "Bitters": {},
                "Supras": {}
            });
            if self.config.save_config(&ConfigCategory::Housing, "m9", &skeleton) {
                written += 1;
            }
        }
        info!("Wrote {} default configuration entries", written);
        written
    }
}
