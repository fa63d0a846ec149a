use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project-local configuration file name, looked up at the project root.
pub const CONFIG_FILE: &str = ".impjs.toml";

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directories searched for modules, in priority order.
    #[serde(default = "Config::default_lookup_paths")]
    pub lookup_paths: Vec<String>,
    /// Glob patterns dropped from both indexing and resolution.
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub declaration_keyword: DeclarationKeyword,
    /// Wrap rendered statements longer than this, when set.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text_width: Option<usize>,
    #[serde(default = "Config::default_indent_unit")]
    pub indent_unit: String,
    /// File suffixes eligible for indexing.
    #[serde(default = "Config::default_suffixes")]
    pub suffixes: Vec<String>,
    /// Polling-fallback enumeration interval.
    #[serde(default = "Config::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Identifier -> module overrides; always short-circuit the file search.
    /// Kept last so TOML serialization emits the table after all values.
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasSpec>,
}

impl Config {
    fn default_lookup_paths() -> Vec<String> {
        vec![".".into()]
    }
    fn default_indent_unit() -> String {
        "  ".into()
    }
    fn default_suffixes() -> Vec<String> {
        vec!["js".into(), "jsx".into(), "json".into()]
    }
    fn default_poll_interval_secs() -> u64 {
        30
    }

    /// Load configuration for a project root.
    ///
    /// Priority: `<root>/.impjs.toml` > the user-level config under the
    /// platform config dir > built-in defaults.
    pub fn load(project_root: &Path) -> Result<Config> {
        let local = project_root.join(CONFIG_FILE);
        if local.exists() {
            return Self::read(&local);
        }
        if let Some(global) = global_config_path() {
            if global.exists() {
                return Self::read(&global);
            }
        }
        Ok(Config::default())
    }

    fn read(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Compile the exclude globs once per watcher/resolver construction.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excludes {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid exclude glob '{pattern}'"))?;
            builder.add(glob);
        }
        builder.build().context("Failed to compile exclude globs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookup_paths: Self::default_lookup_paths(),
            excludes: Vec::new(),
            aliases: BTreeMap::new(),
            declaration_keyword: DeclarationKeyword::default(),
            text_width: None,
            indent_unit: Self::default_indent_unit(),
            suffixes: Self::default_suffixes(),
            poll_interval_secs: Self::default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKeyword {
    #[default]
    Const,
    Let,
    Var,
}

impl DeclarationKeyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKeyword::Const => "const",
            DeclarationKeyword::Let => "let",
            DeclarationKeyword::Var => "var",
        }
    }
}

/// Alias target: a bare module string, or a table carrying the destructuring
/// flag (`styles = { path = "stylez", destructured = true }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasSpec {
    Module(String),
    Detailed {
        path: String,
        #[serde(default)]
        destructured: bool,
    },
}

impl AliasSpec {
    pub fn path(&self) -> &str {
        match self {
            AliasSpec::Module(path) => path,
            AliasSpec::Detailed { path, .. } => path,
        }
    }

    pub fn destructured(&self) -> bool {
        match self {
            AliasSpec::Module(_) => false,
            AliasSpec::Detailed { destructured, .. } => *destructured,
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("impjs").join("config.toml"))
}

pub fn show_config(project_root: &Path) -> Result<()> {
    let local = project_root.join(CONFIG_FILE);
    println!("Config: {}", local.display());
    println!();

    let config = Config::load(project_root)?;
    if !local.exists() {
        println!("(defaults, no project config file)");
        println!();
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
