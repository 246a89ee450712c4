//! Client-only preferences: recently visited projects, sidebar state and theme.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DashError, Result};
use crate::store::{load_json, namespaced_key, save_json, KvStore};

/// Maximum number of remembered projects.
pub const MAX_RECENT_PROJECTS: usize = 5;

/// Record a visit to `project_id` and return the updated list,
/// most recent first.
pub fn visit_project(store: &dyn KvStore, project_id: &str) -> Result<Vec<String>> {
    let key = namespaced_key(&["recent-projects"]);
    let mut recent: Vec<String> = load_json(store, &key)?.unwrap_or_default();
    recent.retain(|p| p != project_id);
    recent.insert(0, project_id.to_string());
    recent.truncate(MAX_RECENT_PROJECTS);
    save_json(store, &key, &recent)?;
    Ok(recent)
}

pub fn recent_projects(store: &dyn KvStore) -> Result<Vec<String>> {
    let recent: Vec<String> =
        load_json(store, &namespaced_key(&["recent-projects"]))?.unwrap_or_default();
    Ok(recent)
}

pub fn sidebar_collapsed(store: &dyn KvStore) -> Result<bool> {
    Ok(load_json(store, &namespaced_key(&["sidebar-collapsed"]))?.unwrap_or(false))
}

pub fn set_sidebar_collapsed(store: &dyn KvStore, collapsed: bool) -> Result<()> {
    save_json(store, &namespaced_key(&["sidebar-collapsed"]), &collapsed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

impl FromStr for Theme {
    type Err = DashError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            _ => Err(DashError::Other(format!(
                "Unknown theme: '{}'. Supported: light, dark, system",
                s
            ))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn theme(store: &dyn KvStore) -> Result<Theme> {
    Ok(load_json(store, &namespaced_key(&["theme"]))?.unwrap_or_default())
}

pub fn set_theme(store: &dyn KvStore, theme: Theme) -> Result<()> {
    save_json(store, &namespaced_key(&["theme"]), &theme)
}
