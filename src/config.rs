use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub devops: DevOpsConfig,
  /// Area paths whose backlogs are shown as tree roots.
  #[serde(default)]
  pub area_paths: Vec<String>,
  /// Custom fields to fetch and display alongside the standard set.
  #[serde(default)]
  pub custom_fields: Vec<CustomField>,
  /// Optional state name -> indicator glyph/color mapping for the view.
  #[serde(default)]
  pub state_indicators: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevOpsConfig {
  /// Organization URL, e.g. "https://dev.azure.com/contoso".
  pub organization_url: String,
  pub project: String,
  /// Team for membership lookups; defaults to "<project> Team".
  pub team: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomField {
  /// Field reference name, e.g. "Custom.RiskLevel".
  pub reference_name: String,
  /// Label shown in the view.
  pub label: String,
}

impl Config {
  /// Load configuration from an explicit path, or search `./adolens.yaml`
  /// then `$XDG_CONFIG_HOME/adolens/config.yaml`. An explicit path that
  /// does not exist is an error; exhausting the search is too.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    if let Some(path) = explicit_path {
      if !path.exists() {
        return Err(eyre!("Config file not found: {}", path.display()));
      }
      return Self::load_from_path(path);
    }
    Self::search_paths()
      .into_iter()
      .find(|p| p.exists())
      .ok_or_else(|| {
        eyre!("No configuration file found. Create one at ~/.config/adolens/config.yaml")
      })
      .and_then(|p| Self::load_from_path(&p))
  }

  fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("adolens.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("adolens").join("config.yaml"));
    }
    paths
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Get the personal access token from environment variables.
  ///
  /// Checks ADOLENS_PAT first, then AZURE_DEVOPS_PAT as fallback. The token
  /// is never stored in the config file.
  pub fn get_pat() -> Result<String> {
    std::env::var("ADOLENS_PAT")
      .or_else(|_| std::env::var("AZURE_DEVOPS_PAT"))
      .map_err(|_| {
        eyre!("Personal access token not found. Set ADOLENS_PAT or AZURE_DEVOPS_PAT environment variable.")
      })
  }

  /// Team name for membership lookups.
  pub fn team_name(&self) -> String {
    self
      .devops
      .team
      .clone()
      .unwrap_or_else(|| format!("{} Team", self.devops.project))
  }

  /// Reference names of the configured custom fields.
  pub fn custom_field_names(&self) -> Vec<String> {
    self
      .custom_fields
      .iter()
      .map(|f| f.reference_name.clone())
      .collect()
  }
}
