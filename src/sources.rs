//! Registering configuration sources into a [`ConfigStore`].
//!
//! Each source lands in its own [`Layer`], so the order in which they are
//! registered does not matter for precedence. It does matter for the env
//! lookup: env vars are matched against every key the target declares plus
//! every key the files supplied, so files are read before the environment.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{env_to_entries, env_var_name};
use crate::error::ClapwireError;
use crate::file::load_file;
use crate::paths::{DeploymentProfile, PathResolver, config_file_name};
use crate::store::{ConfigStore, Layer};
use crate::value::Value;
use crate::watch::WatchedFile;

/// A value a command-line flag contributed for a config key.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagValue {
    pub key: String,
    pub value: Value,
    /// Whether the user typed the flag. Defaults sit below every file.
    pub explicit: bool,
}

impl FlagValue {
    /// A flag the user set.
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            explicit: true,
        }
    }

    /// A flag's default, used when nothing else configures the key.
    pub fn defaulted(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            explicit: false,
        }
    }
}

/// What the command line contributed to one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Command names from the root to the invoked leaf: `["app", "serve"]`.
    pub command_path: Vec<String>,
    pub flags: Vec<FlagValue>,
}

impl Invocation {
    pub fn new<I, S>(command_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command_path: command_path.into_iter().map(Into::into).collect(),
            flags: Vec::new(),
        }
    }

    pub fn flag(mut self, flag: FlagValue) -> Self {
        self.flags.push(flag);
        self
    }

    /// The config file base name for this command, `None` for an empty path.
    pub fn base_name(&self) -> Option<String> {
        command_base_name(&self.command_path)
    }
}

/// Hyphen-join a command path, root first: `app serve` → `app-serve`.
pub fn command_base_name<S: AsRef<str>>(path: &[S]) -> Option<String> {
    let parts: Vec<&str> = path
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("-"))
    }
}

/// Environment lookup settings. `vars` is normally `std::env::vars()`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSource {
    pub prefix: String,
    pub vars: Vec<(String, String)>,
}

/// Everything [`register_sources`] needs for one invocation.
#[derive(Debug, Clone)]
pub struct Sources {
    pub org: String,
    pub app: String,
    /// Base name of the searched files, without extension.
    pub config_name: String,
    /// When set, the only file read.
    pub explicit_file: Option<PathBuf>,
    pub flags: Vec<FlagValue>,
    /// `None` disables environment lookups.
    pub env: Option<EnvSource>,
    /// Keys the target declares; env vars are looked up for these.
    pub known_keys: Vec<String>,
    pub resolver: PathResolver,
}

impl Sources {
    pub fn new(org: impl Into<String>, app: impl Into<String>) -> Self {
        let app = app.into();
        Self {
            org: org.into(),
            config_name: app.clone(),
            app,
            explicit_file: None,
            flags: Vec::new(),
            env: None,
            known_keys: Vec::new(),
            resolver: PathResolver::system(),
        }
    }
}

/// Put flags into the store: set flags into [`Layer::Flag`], the rest into
/// [`Layer::FlagDefault`].
pub fn bind_flags(store: &mut ConfigStore, flags: &[FlagValue]) -> Result<(), ClapwireError> {
    for flag in flags {
        check_flag_key(&flag.key)?;
        let layer = if flag.explicit {
            Layer::Flag
        } else {
            Layer::FlagDefault
        };
        store.set(layer, &flag.key, flag.value.clone());
    }
    Ok(())
}

fn check_flag_key(key: &str) -> Result<(), ClapwireError> {
    let reason = if key.trim().is_empty() {
        "empty config key"
    } else if key.chars().any(char::is_whitespace) {
        "config key contains whitespace"
    } else if key.split('.').any(str::is_empty) {
        "config key has an empty segment"
    } else {
        return Ok(());
    };
    Err(ClapwireError::FlagBinding {
        flag: key.to_string(),
        reason: reason.to_string(),
    })
}

/// The files to try, lowest precedence first.
///
/// An explicit file replaces the search. Otherwise the system directory
/// `/etc/{org}/{app}` is tried, then the user directory: the profile's
/// config directory inside a container, `$HOME/.config/{org}/{app}` on a
/// host. Nothing is created.
///
/// Inside a container `$HOME/.config/{org}/{app}` is not searched at all;
/// the mounted config directory (`/config` by default) takes the user slot
/// so that there is one file per layer. Pass an explicit file to read
/// anything else.
pub fn candidate_files(sources: &Sources) -> Result<Vec<WatchedFile>, ClapwireError> {
    if let Some(path) = &sources.explicit_file {
        return Ok(vec![WatchedFile::new(path.clone(), Layer::ExplicitFile)]);
    }
    let resolver = &sources.resolver;
    let file_name = config_file_name(&sources.config_name);

    let system = resolver.system_config_dir(&sources.org, &sources.app)?;
    let user = match resolver.profile() {
        DeploymentProfile::Container { config_dir, .. } => config_dir,
        DeploymentProfile::Host => resolver.user_config_dir(&sources.org, &sources.app)?,
    };

    Ok(vec![
        WatchedFile::new(system.join(&file_name), Layer::SystemFile),
        WatchedFile::new(user.join(&file_name), Layer::UserFile),
    ])
}

/// Fill `store` from flags, files and the environment.
///
/// Returns the files that were actually read, for watching. A missing file
/// is skipped (with a warning if it was named explicitly); any other read
/// or parse failure aborts with the path attached.
pub fn register_sources(store: &mut ConfigStore, sources: &Sources) -> Result<Vec<WatchedFile>, ClapwireError> {
    bind_flags(store, &sources.flags)?;

    let mut read = Vec::new();
    for candidate in candidate_files(sources)? {
        if load_into_layer(store, &candidate.path, candidate.layer)? {
            read.push(candidate);
        }
    }

    if let Some(env) = &sources.env {
        let mut keys: Vec<String> = sources
            .known_keys
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        keys.extend(store.keys());
        let entries = env_to_entries(&env.prefix, keys.iter().map(String::as_str), env.vars.iter().cloned());
        for (key, _) in &entries {
            debug!(key = key.as_str(), var = %env_var_name(&env.prefix, key), "Config key set from environment");
        }
        store.set_layer(Layer::Env, entries);
    }

    Ok(read)
}

fn load_into_layer(store: &mut ConfigStore, path: &Path, layer: Layer) -> Result<bool, ClapwireError> {
    match load_file(path)? {
        Some(loaded) => {
            info!(layer = %layer, keys = loaded.entries.len(), "Loaded config file {}", path.display());
            store.set_layer(layer, loaded.entries);
            Ok(true)
        }
        None if layer == Layer::ExplicitFile => {
            warn!("Config file not found: {}", path.display());
            Ok(false)
        }
        None => {
            debug!("No config file at {}", path.display());
            Ok(false)
        }
    }
}
