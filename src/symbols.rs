//! Per-pipeline global symbol map.
//!
//! Registered during the resolver's pre-pass and read-only from then on.
//! Names are stored fully qualified (`ns.sub.Name`); lookup walks the
//! requesting namespace chain inside-out before falling back to the global
//! scope. Re-registering a `(kind, name)` pair is a duplicate error surfaced
//! to the caller.

use crate::ast::{CustomDef, ImportKind, TemplateDef};
use crate::ast::DefKind;
use serde::Serialize;
use std::collections::HashMap;

/// A named variable group: ordered values plus the bases it inherits from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VarGroup {
    pub values: Vec<(String, String)>,
    pub inherits: Vec<String>,
    pub no_value: Vec<String>,
}

impl VarGroup {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            self.values.push((name.to_string(), value.to_string()));
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NamespaceRecord {
    pub templates: Vec<String>,
    pub customs: Vec<String>,
    pub vars: Vec<String>,
    pub nested: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRecord {
    pub kind: ImportKind,
    pub alias: Option<String>,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigRecord {
    pub entries: HashMap<String, String>,
    pub name_overrides: HashMap<String, Vec<String>>,
    pub origin_aliases: HashMap<String, String>,
}

/// Baseline configuration keys and their defaults.
const CONFIG_DEFAULTS: &[(&str, &str)] = &[
    ("INDEX_INITIAL_COUNT", "0"),
    ("DEBUG_MODE", "false"),
    ("DISABLE_NAME_GROUP", "false"),
    ("DISABLE_CUSTOM_ORIGIN_TYPE", "false"),
];

#[derive(Debug, Default)]
pub struct GlobalMap {
    templates: HashMap<(DefKind, String), TemplateDef>,
    customs: HashMap<(DefKind, String), CustomDef>,
    var_groups: HashMap<String, VarGroup>,
    namespaces: HashMap<String, NamespaceRecord>,
    origins: HashMap<(String, String), String>,
    imports: HashMap<String, ImportRecord>,
    configurations: HashMap<String, ConfigRecord>,
    active_configuration: Option<String>,
}

impl GlobalMap {
    pub fn new() -> Self {
        Self::default()
    }

    // Registration — all duplicate checks are by fully qualified name.

    pub fn register_template(&mut self, full_name: &str, def: TemplateDef) -> Result<(), String> {
        let key = (def.kind, full_name.to_string());
        if self.templates.contains_key(&key) {
            return Err(format!(
                "duplicate template {} {}",
                def.kind.as_str(),
                full_name
            ));
        }
        self.templates.insert(key, def);
        Ok(())
    }

    pub fn register_custom(&mut self, full_name: &str, def: CustomDef) -> Result<(), String> {
        let key = (def.kind, full_name.to_string());
        if self.customs.contains_key(&key) {
            return Err(format!(
                "duplicate custom {} {}",
                def.kind.as_str(),
                full_name
            ));
        }
        self.customs.insert(key, def);
        Ok(())
    }

    pub fn register_var_group(&mut self, full_name: &str, group: VarGroup) -> Result<(), String> {
        if self.var_groups.contains_key(full_name) {
            return Err(format!("duplicate variable group {}", full_name));
        }
        self.var_groups.insert(full_name.to_string(), group);
        Ok(())
    }

    /// Nested namespaces merge into any existing record for the same path.
    pub fn register_namespace(&mut self, path: &str, record: NamespaceRecord) {
        let entry = self.namespaces.entry(path.to_string()).or_default();
        entry.templates.extend(record.templates);
        entry.customs.extend(record.customs);
        entry.vars.extend(record.vars);
        entry.nested.extend(record.nested);
    }

    pub fn register_origin(
        &mut self,
        kind_key: &str,
        name: &str,
        content: String,
    ) -> Result<(), String> {
        let key = (kind_key.to_string(), name.to_string());
        if self.origins.contains_key(&key) {
            return Err(format!("duplicate origin {} {}", kind_key, name));
        }
        self.origins.insert(key, content);
        Ok(())
    }

    pub fn register_import(&mut self, path: &str, record: ImportRecord) -> bool {
        if self.imports.contains_key(path) {
            return false;
        }
        self.imports.insert(path.to_string(), record);
        true
    }

    pub fn register_configuration(&mut self, name: Option<&str>, record: ConfigRecord) {
        let key = name.unwrap_or("").to_string();
        let active = name.is_none();
        self.configurations.insert(key.clone(), record);
        // The unnamed configuration is the active one; a named configuration
        // only becomes active through set_active_configuration.
        if active || self.active_configuration.is_none() {
            self.active_configuration = Some(key);
        }
    }

    pub fn set_active_configuration(&mut self, name: &str) -> bool {
        if self.configurations.contains_key(name) {
            self.active_configuration = Some(name.to_string());
            true
        } else {
            false
        }
    }

    // Lookup

    /// Relative-first name resolution: the requesting namespace chain is
    /// walked inside-out, then the name is tried as written (qualified or
    /// global).
    fn candidates(namespace: &str, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        if !namespace.is_empty() {
            let parts: Vec<&str> = namespace.split('.').collect();
            for i in (1..=parts.len()).rev() {
                out.push(format!("{}.{}", parts[..i].join("."), name));
            }
        }
        out.push(name.to_string());
        out
    }

    pub fn lookup_template(
        &self,
        kind: DefKind,
        name: &str,
        namespace: &str,
    ) -> Option<&TemplateDef> {
        self.lookup_template_entry(kind, name, namespace).map(|(_, d)| d)
    }

    /// Like `lookup_template` but also yields the fully qualified name the
    /// match was registered under.
    pub fn lookup_template_entry(
        &self,
        kind: DefKind,
        name: &str,
        namespace: &str,
    ) -> Option<(&str, &TemplateDef)> {
        for candidate in Self::candidates(namespace, name) {
            if let Some((key, def)) = self.templates.get_key_value(&(kind, candidate)) {
                return Some((key.1.as_str(), def));
            }
        }
        None
    }

    pub fn lookup_custom(&self, kind: DefKind, name: &str, namespace: &str) -> Option<&CustomDef> {
        self.lookup_custom_entry(kind, name, namespace).map(|(_, d)| d)
    }

    pub fn lookup_custom_entry(
        &self,
        kind: DefKind,
        name: &str,
        namespace: &str,
    ) -> Option<(&str, &CustomDef)> {
        for candidate in Self::candidates(namespace, name) {
            if let Some((key, def)) = self.customs.get_key_value(&(kind, candidate)) {
                return Some((key.1.as_str(), def));
            }
        }
        None
    }

    pub fn lookup_var_group(&self, name: &str, namespace: &str) -> Option<&VarGroup> {
        self.lookup_var_group_entry(name, namespace).map(|(_, g)| g)
    }

    pub fn lookup_var_group_entry(
        &self,
        name: &str,
        namespace: &str,
    ) -> Option<(&str, &VarGroup)> {
        for candidate in Self::candidates(namespace, name) {
            if let Some((key, group)) = self.var_groups.get_key_value(&candidate) {
                return Some((key.as_str(), group));
            }
        }
        None
    }

    pub fn lookup_origin(&self, kind_key: &str, name: &str) -> Option<&str> {
        self.origins
            .get(&(kind_key.to_string(), name.to_string()))
            .map(|s| s.as_str())
    }

    pub fn namespace(&self, path: &str) -> Option<&NamespaceRecord> {
        self.namespaces.get(path)
    }

    pub fn import(&self, path: &str) -> Option<&ImportRecord> {
        self.imports.get(path)
    }

    /// Every registered definition as `(kind, full name, body)`, templates
    /// and customs together. Drives the inheritance-cycle check.
    pub fn all_definitions(&self) -> Vec<(DefKind, &str, &[crate::ast::Node])> {
        let mut out: Vec<(DefKind, &str, &[crate::ast::Node])> = Vec::new();
        for ((kind, name), def) in &self.templates {
            out.push((*kind, name.as_str(), def.body.as_slice()));
        }
        for ((kind, name), def) in &self.customs {
            out.push((*kind, name.as_str(), def.body.as_slice()));
        }
        out.sort_by(|a, b| (a.0 as u8, a.1).cmp(&(b.0 as u8, b.1)));
        out
    }

    pub fn template_names(&self, kind: DefKind) -> Vec<&str> {
        self.templates
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.as_str())
            .collect()
    }

    // Configuration access

    pub fn active_configuration(&self) -> Option<&ConfigRecord> {
        self.active_configuration
            .as_ref()
            .and_then(|name| self.configurations.get(name))
    }

    pub fn configuration(&self, name: &str) -> Option<&ConfigRecord> {
        self.configurations.get(name)
    }

    /// Active configuration value with the built-in defaults as fallback.
    pub fn config_value(&self, key: &str) -> Option<String> {
        if let Some(config) = self.active_configuration() {
            if let Some(v) = config.entries.get(key) {
                return Some(v.clone());
            }
        }
        CONFIG_DEFAULTS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }

    /// Maps a custom origin-type alias to its canonical type, when the
    /// active configuration declares one.
    pub fn resolve_origin_alias(&self, alias: &str) -> Option<String> {
        self.active_configuration()
            .and_then(|c| c.origin_aliases.get(alias))
            .cloned()
    }
}

/// Qualify a bare name against the namespace it was declared in.
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}
