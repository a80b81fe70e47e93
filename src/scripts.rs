//! Named actions loaded from a registry file.
//!
//! A registry has up to three sections, searched in priority order:
//! `scripts` (the primary actions), `optional` and `recipes`. Each section
//! maps an action name to a single command or an ordered list of entries.
//! Document order is kept: it defines the default run order and range
//! selection.

use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::Result;
use crate::shell::ScriptEntry;

pub type Script = Vec<ScriptEntry>;

/// An action value: one entry or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ActionDef {
    Entries(Vec<ScriptEntry>),
    Single(ScriptEntry),
}

impl ActionDef {
    fn into_script(self) -> Script {
        match self {
            ActionDef::Entries(entries) => entries,
            ActionDef::Single(entry) => vec![entry],
        }
    }
}

/// Actions of one section, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    actions: Vec<(String, Script)>,
}

impl Section {
    pub fn get(&self, name: &str) -> Option<&Script> {
        self.actions.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<(String, Script)> for Section {
    fn from_iter<I: IntoIterator<Item = (String, Script)>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SectionVisitor;

        impl<'de> Visitor<'de> for SectionVisitor {
            type Value = Section;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of action names to commands")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Section, A::Error> {
                let mut actions: Vec<(String, Script)> = Vec::new();
                while let Some((name, def)) = map.next_entry::<String, ActionDef>()? {
                    let script = def.into_script();
                    match actions.iter_mut().find(|(n, _)| *n == name) {
                        Some(existing) => existing.1 = script,
                        None => actions.push((name, script)),
                    }
                }
                Ok(Section { actions })
            }
        }

        deserializer.deserialize_map(SectionVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Scripts {
    #[serde(default)]
    scripts: Section,
    #[serde(default)]
    optional: Section,
    #[serde(default)]
    recipes: Section,
}

impl Scripts {
    /// A registry with only primary actions.
    pub fn new(scripts: Section) -> Self {
        Self {
            scripts,
            ..Self::default()
        }
    }

    /// Load a registry file, choosing the format by extension.
    ///
    /// `.yaml`/`.yml` and `.toml` are recognized; anything else is JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn primary(&self) -> &Section {
        &self.scripts
    }

    pub fn optional(&self) -> &Section {
        &self.optional
    }

    pub fn recipes(&self) -> &Section {
        &self.recipes
    }

    /// Primary action names in document order.
    pub fn names(&self) -> Vec<String> {
        self.scripts.names().map(str::to_string).collect()
    }

    /// Look `name` up in priority order.
    pub fn lookup(&self, name: &str) -> Option<&Script> {
        self.scripts
            .get(name)
            .or_else(|| self.optional.get(name))
            .or_else(|| self.recipes.get(name))
    }

    /// The script for `name`; an unknown name is run as a literal command.
    pub fn get(&self, name: &str) -> Script {
        self.lookup(name)
            .cloned()
            .unwrap_or_else(|| vec![ScriptEntry::Line(name.to_string())])
    }
}
