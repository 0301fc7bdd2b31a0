//! The layered configuration store.
//!
//! West configuration lives in INI files at three levels: system (all
//! users), global (one user), and local (one workspace, inside its
//! `.west/` directory). Each level's principal file `F` may be
//! accompanied by a drop-in directory `F.d` whose `*.conf` files are
//! applied after `F` in filename order. Reads see a snapshot merged with
//! precedence local > global > system; writes always target the
//! principal file of one level and are flushed before returning.
//!
//! Keys are addressed as `section.key` strings, with the section being
//! everything before the first dot.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;

use crate::workspace::WEST_MARKER;

/// Which configuration files an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// All applicable levels, merged. Not valid as a write target.
    All,
    /// The file shared by all users of the machine.
    System,
    /// The current user's file.
    Global,
    /// The per-workspace file in `.west/config`.
    Local,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigScope::All => "all",
            ConfigScope::System => "system",
            ConfigScope::Global => "global",
            ConfigScope::Local => "local",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("permission denied writing {path}; retry with elevated permissions")]
    PermissionDenied { path: PathBuf },

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },

    #[error("invalid configuration key \"{key}\": expected section.key")]
    BadKey { key: String },

    #[error("configuration scope \"{scope}\" cannot be written to")]
    UnwritableScope { scope: ConfigScope },

    #[error("no {scope} configuration file location is known")]
    NoLocation { scope: ConfigScope },

    #[error("option \"{key}\" is not set at the {scope} scope")]
    KeyNotFound { key: String, scope: ConfigScope },
}

/// Resolved principal-file locations for the three levels.
///
/// A `None` entry means the level does not exist in this process (for
/// example, local configuration outside any workspace).
#[derive(Debug, Clone, Default)]
pub struct ConfigLocations {
    pub system: Option<PathBuf>,
    pub global: Option<PathBuf>,
    pub local: Option<PathBuf>,
}

impl ConfigLocations {
    /// Platform defaults, overridable through `WEST_CONFIG_SYSTEM`,
    /// `WEST_CONFIG_GLOBAL` and `WEST_CONFIG_LOCAL`.
    pub fn discover(topdir: Option<&Path>) -> Self {
        ConfigLocations {
            system: std::env::var_os("WEST_CONFIG_SYSTEM")
                .map(PathBuf::from)
                .or_else(system_default),
            global: std::env::var_os("WEST_CONFIG_GLOBAL")
                .map(PathBuf::from)
                .or_else(global_default),
            local: std::env::var_os("WEST_CONFIG_LOCAL")
                .map(PathBuf::from)
                .or_else(|| topdir.map(|t| t.join(WEST_MARKER).join("config"))),
        }
    }

    fn path(&self, scope: ConfigScope) -> Option<&Path> {
        match scope {
            ConfigScope::System => self.system.as_deref(),
            ConfigScope::Global => self.global.as_deref(),
            ConfigScope::Local => self.local.as_deref(),
            ConfigScope::All => None,
        }
    }
}

#[cfg(target_os = "macos")]
fn system_default() -> Option<PathBuf> {
    Some(PathBuf::from("/usr/local/etc/westconfig"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn system_default() -> Option<PathBuf> {
    Some(PathBuf::from("/etc/westconfig"))
}

#[cfg(windows)]
fn system_default() -> Option<PathBuf> {
    std::env::var_os("PROGRAMDATA").map(|pd| PathBuf::from(pd).join("west").join("config"))
}

#[cfg(not(windows))]
fn global_default() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("west").join("config"));
    }
    let home = dirs::home_dir()?;
    let xdg_fallback = home.join(".config").join("west").join("config");
    if xdg_fallback.is_file() {
        Some(xdg_fallback)
    } else {
        Some(home.join(".westconfig"))
    }
}

#[cfg(windows)]
fn global_default() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".westconfig"))
}

type SectionMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Default, Clone)]
struct Level {
    values: SectionMap,
    // Every existing file that contributed, in application order.
    files: Vec<PathBuf>,
}

/// A snapshot of the three configuration levels, plus write access to
/// their principal files.
#[derive(Debug, Clone)]
pub struct Config {
    locations: ConfigLocations,
    system: Level,
    global: Level,
    local: Level,
}

impl Config {
    /// Reads all levels for the given workspace (or none).
    pub fn from_workspace(topdir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::with_locations(ConfigLocations::discover(topdir))
    }

    /// Reads all levels from explicit file locations.
    pub fn with_locations(locations: ConfigLocations) -> Result<Self, ConfigError> {
        let mut config = Config {
            locations,
            system: Level::default(),
            global: Level::default(),
            local: Level::default(),
        };
        for scope in [ConfigScope::System, ConfigScope::Global, ConfigScope::Local] {
            config.reload(scope)?;
        }
        Ok(config)
    }

    /// Looks `section.key` up across all levels, local first.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_in(key, ConfigScope::All)
    }

    /// Reads `section.key` as a boolean, accepting the usual INI
    /// spellings (`true`/`false`, `yes`/`no`, `on`/`off`, `1`/`0`).
    /// Unset or unparsable values yield `None`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    /// Looks `section.key` up at one scope (or all).
    pub fn get_in(&self, key: &str, scope: ConfigScope) -> Option<&str> {
        let (section, option) = split_key(key).ok()?;
        match scope {
            ConfigScope::All => lookup(&self.local, section, option)
                .or_else(|| lookup(&self.global, section, option))
                .or_else(|| lookup(&self.system, section, option)),
            ConfigScope::System => lookup(&self.system, section, option),
            ConfigScope::Global => lookup(&self.global, section, option),
            ConfigScope::Local => lookup(&self.local, section, option),
        }
    }

    /// Sets `section.key` in the principal file at `scope`, creating the
    /// file and its parent directories if needed.
    pub fn set(&mut self, key: &str, value: &str, scope: ConfigScope) -> Result<(), ConfigError> {
        let (section, option) = split_key(key)?;
        let path = self.write_path(scope)?.to_path_buf();

        let mut ini = load_principal(&path)?;
        ini.set(section, option, Some(value.to_string()));
        write_principal(&ini, &path)?;
        self.reload(scope)
    }

    /// Appends `suffix` to the current value of `section.key` at `scope`.
    ///
    /// The key must already be present at that scope; an empty value
    /// counts as present.
    pub fn append(&mut self, key: &str, suffix: &str, scope: ConfigScope) -> Result<(), ConfigError> {
        if scope == ConfigScope::All {
            return Err(ConfigError::UnwritableScope { scope });
        }
        let current = self
            .get_in(key, scope)
            .ok_or_else(|| ConfigError::KeyNotFound { key: key.to_string(), scope })?
            .to_string();
        self.set(key, &format!("{current}{suffix}"), scope)
    }

    /// Deletes `section.key`.
    ///
    /// With `Some(scope)` the key is removed at exactly that scope
    /// (every scope for `All`). With `None`, local is tried first, then
    /// global.
    pub fn delete(&mut self, key: &str, scope: Option<ConfigScope>) -> Result<(), ConfigError> {
        let report_scope = scope.unwrap_or(ConfigScope::Local);
        match scope {
            Some(ConfigScope::All) => {
                let mut deleted = false;
                for s in [ConfigScope::System, ConfigScope::Global, ConfigScope::Local] {
                    deleted |= self.delete_at(key, s)?;
                }
                if deleted {
                    Ok(())
                } else {
                    Err(ConfigError::KeyNotFound { key: key.to_string(), scope: ConfigScope::All })
                }
            }
            Some(s) => {
                if self.delete_at(key, s)? {
                    Ok(())
                } else {
                    Err(ConfigError::KeyNotFound { key: key.to_string(), scope: s })
                }
            }
            None => {
                if self.delete_at(key, ConfigScope::Local)?
                    || self.delete_at(key, ConfigScope::Global)?
                {
                    Ok(())
                } else {
                    Err(ConfigError::KeyNotFound { key: key.to_string(), scope: report_scope })
                }
            }
        }
    }

    /// All `(section.key, value)` pairs visible at `scope`.
    pub fn items(&self, scope: ConfigScope) -> Vec<(String, String)> {
        let mut merged: SectionMap = BTreeMap::new();
        let levels: Vec<&Level> = match scope {
            ConfigScope::All => vec![&self.system, &self.global, &self.local],
            ConfigScope::System => vec![&self.system],
            ConfigScope::Global => vec![&self.global],
            ConfigScope::Local => vec![&self.local],
        };
        for level in levels {
            for (section, options) in &level.values {
                let out = merged.entry(section.clone()).or_default();
                for (option, value) in options {
                    out.insert(option.clone(), value.clone());
                }
            }
        }
        merged
            .into_iter()
            .flat_map(|(section, options)| {
                options
                    .into_iter()
                    .map(move |(option, value)| (format!("{section}.{option}"), value))
            })
            .collect()
    }

    /// Every existing file contributing to `scope`, in application order.
    pub fn paths(&self, scope: ConfigScope) -> Vec<PathBuf> {
        match scope {
            ConfigScope::All => {
                let mut all = self.system.files.clone();
                all.extend(self.global.files.iter().cloned());
                all.extend(self.local.files.iter().cloned());
                all
            }
            ConfigScope::System => self.system.files.clone(),
            ConfigScope::Global => self.global.files.clone(),
            ConfigScope::Local => self.local.files.clone(),
        }
    }

    /// The principal file writes at `scope` would go to, if any.
    pub fn write_target(&self, scope: ConfigScope) -> Option<&Path> {
        self.locations.path(scope)
    }

    fn write_path(&self, scope: ConfigScope) -> Result<&Path, ConfigError> {
        if scope == ConfigScope::All {
            return Err(ConfigError::UnwritableScope { scope });
        }
        self.locations
            .path(scope)
            .ok_or(ConfigError::NoLocation { scope })
    }

    fn delete_at(&mut self, key: &str, scope: ConfigScope) -> Result<bool, ConfigError> {
        let (section, option) = split_key(key)?;
        let path = match self.locations.path(scope) {
            Some(p) if p.is_file() => p.to_path_buf(),
            _ => return Ok(false),
        };

        let mut ini = load_principal(&path)?;
        let present = ini
            .get_map_ref()
            .get(section)
            .is_some_and(|options| options.contains_key(option));
        if !present {
            return Ok(false);
        }
        ini.remove_key(section, option);
        if ini.get_map_ref().get(section).is_some_and(|options| options.is_empty()) {
            ini.remove_section(section);
        }
        write_principal(&ini, &path)?;
        self.reload(scope)?;
        Ok(true)
    }

    fn reload(&mut self, scope: ConfigScope) -> Result<(), ConfigError> {
        let level = read_level(self.locations.path(scope))?;
        match scope {
            ConfigScope::System => self.system = level,
            ConfigScope::Global => self.global = level,
            ConfigScope::Local => self.local = level,
            ConfigScope::All => {}
        }
        Ok(())
    }
}

fn lookup<'a>(level: &'a Level, section: &str, option: &str) -> Option<&'a str> {
    level.values.get(section)?.get(option).map(String::as_str)
}

fn split_key(key: &str) -> Result<(&str, &str), ConfigError> {
    match key.split_once('.') {
        Some((section, option)) if !section.is_empty() && !option.is_empty() => {
            Ok((section, option))
        }
        _ => Err(ConfigError::BadKey { key: key.to_string() }),
    }
}

fn dropin_dir(principal: &Path) -> PathBuf {
    let mut os = principal.as_os_str().to_os_string();
    os.push(".d");
    PathBuf::from(os)
}

fn read_level(principal: Option<&Path>) -> Result<Level, ConfigError> {
    let mut level = Level::default();
    let Some(principal) = principal else {
        return Ok(level);
    };

    let mut files = Vec::new();
    if principal.is_file() {
        files.push(principal.to_path_buf());
    }
    let dropins = dropin_dir(principal);
    if dropins.is_dir() {
        let mut conf_files: Vec<PathBuf> = fs::read_dir(&dropins)
            .map_err(|source| ConfigError::Io { path: dropins.clone(), source })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "conf"))
            .collect();
        conf_files.sort();
        files.extend(conf_files);
    }

    for file in files {
        merge_file(&mut level.values, &file)?;
        level.files.push(file);
    }
    Ok(level)
}

fn merge_file(into: &mut SectionMap, file: &Path) -> Result<(), ConfigError> {
    let mut ini = Ini::new_cs();
    let parsed = ini.load(file).map_err(|reason| ConfigError::Malformed {
        path: file.to_path_buf(),
        reason,
    })?;
    for (section, options) in parsed {
        let out = into.entry(section).or_default();
        for (option, value) in options {
            // A key with no value reads as the empty string.
            out.insert(option, value.unwrap_or_default());
        }
    }
    Ok(())
}

fn load_principal(path: &Path) -> Result<Ini, ConfigError> {
    let mut ini = Ini::new_cs();
    if path.is_file() {
        ini.load(path).map_err(|reason| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason,
        })?;
    }
    Ok(ini)
}

fn write_principal(ini: &Ini, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| map_write_err(parent, source))?;
    }
    ini.write(path).map_err(|source| map_write_err(path, source))
}

fn map_write_err(path: &Path, source: io::Error) -> ConfigError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        ConfigError::PermissionDenied { path: path.to_path_buf() }
    } else {
        ConfigError::Io { path: path.to_path_buf(), source }
    }
}
