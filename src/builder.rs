use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};

use crate::decode::{DecodeHook, HookChain};
use crate::env;
use crate::error::ClapwireError;
use crate::logging::{DEFAULT_LEVEL, LogConfig, configure_logger};
use crate::name::validate_org_and_app_name;
use crate::paths::{DeploymentProfile, PathResolver};
use crate::resolve::{self, known_keys};
use crate::sources::{EnvSource, FlagValue, Invocation, Sources, command_base_name, register_sources};
use crate::store::{ConfigStore, SharedStore};
use crate::value::Value;
use crate::watch::{WatchHandle, watch_files};

/// Settings every application shares, read from the same store as the
/// caller's own config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    pub log: LogConfig,
}

/// The outcome of one load.
///
/// Everything up to and including logging setup succeeded. Whether the
/// caller's struct decoded is in `bind`; use [`into_result`](Self::into_result)
/// to treat a failure there as fatal.
#[derive(Debug)]
pub struct Loaded {
    pub common: CommonConfig,
    pub store: SharedStore,
    /// Present when watching was requested and at least one file was read.
    pub watcher: Option<WatchHandle>,
    pub bind: Result<(), ClapwireError>,
}

impl Loaded {
    pub fn into_result(self) -> Result<Self, ClapwireError> {
        let Loaded {
            common,
            store,
            watcher,
            bind,
        } = self;
        bind?;
        Ok(Loaded {
            common,
            store,
            watcher,
            bind: Ok(()),
        })
    }
}

/// Entry point for building a clapwire configuration load.
pub struct Clapwire;

impl Clapwire {
    pub fn builder(org: impl Into<String>, app: impl Into<String>) -> ClapwireBuilder {
        ClapwireBuilder::new(org.into(), app.into())
    }
}

/// Builder for loading layered configuration into a struct.
///
/// Sources, lowest precedence first: flag defaults, the system file, the
/// user file (or an explicit file instead of both), environment variables,
/// flags the user set.
pub struct ClapwireBuilder {
    org: String,
    app: String,
    config_name: Option<String>,
    command_path: Vec<String>,
    explicit_file: Option<PathBuf>,
    flags: Vec<FlagValue>,
    env_enabled: bool,
    env_prefix: Option<String>,
    env_vars: Option<Vec<(String, String)>>,
    resolver: PathResolver,
    default_log_level: LevelFilter,
    logging: bool,
    watch: bool,
    hooks: HookChain,
}

impl ClapwireBuilder {
    fn new(org: String, app: String) -> Self {
        Self {
            org,
            app,
            config_name: None,
            command_path: Vec::new(),
            explicit_file: None,
            flags: Vec::new(),
            env_enabled: true,
            env_prefix: None,
            env_vars: None,
            resolver: PathResolver::system(),
            default_log_level: DEFAULT_LEVEL,
            logging: true,
            watch: false,
            hooks: HookChain::default(),
        }
    }

    /// Override the searched file base name (default: the command path
    /// joined with `-`, or the app name).
    pub fn config_name(mut self, name: &str) -> Self {
        self.config_name = Some(name.to_string());
        self
    }

    /// Command names from the root to the invoked command.
    pub fn command_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command_path = path.into_iter().map(Into::into).collect();
        self
    }

    /// Take the command path and flags of a parsed command line.
    pub fn invocation(mut self, invocation: Invocation) -> Self {
        self.command_path = invocation.command_path;
        self.flags.extend(invocation.flags);
        self
    }

    /// Read only this file instead of searching the default locations.
    pub fn explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// A flag the user set. Beats every other source.
    pub fn flag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flags.push(FlagValue::set(key, value));
        self
    }

    /// A flag default. Loses to every other source.
    pub fn flag_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flags.push(FlagValue::defaulted(key, value));
        self
    }

    pub fn flags(mut self, flags: impl IntoIterator<Item = FlagValue>) -> Self {
        self.flags.extend(flags);
        self
    }

    /// Override the environment variable prefix (default: the app name
    /// upper-cased, `-` and `.` as `_`).
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env_vars = Some(vars.into_iter().collect());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    pub fn resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Pin the deployment profile instead of detecting it.
    pub fn profile(mut self, profile: DeploymentProfile) -> Self {
        self.resolver = std::mem::take(&mut self.resolver).with_profile(profile);
        self
    }

    /// Use `home` in place of the user's home directory.
    pub fn home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.resolver = std::mem::take(&mut self.resolver).with_home(home);
        self
    }

    /// Use `root` in place of `/etc`.
    pub fn system_config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resolver = std::mem::take(&mut self.resolver).with_system_root(root);
        self
    }

    /// Level used when `log.level` is empty or invalid (default: warn).
    pub fn default_log_level(mut self, level: LevelFilter) -> Self {
        self.default_log_level = level;
        self
    }

    /// Leave the global subscriber alone, for applications that set up
    /// `tracing` themselves.
    pub fn no_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// Refresh the store when a file that was read changes.
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Replace the decode hook chain.
    pub fn decode_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Append a hook to the chain.
    pub fn decode_hook(mut self, hook: DecodeHook) -> Self {
        self.hooks = self.hooks.push(hook);
        self
    }

    fn effective_config_name(&self) -> String {
        if let Some(name) = &self.config_name {
            return name.clone();
        }
        command_base_name(&self.command_path).unwrap_or_else(|| self.app.clone())
    }

    /// `None` when env loading is disabled.
    fn effective_env_prefix(&self) -> Option<String> {
        if !self.env_enabled {
            return None;
        }
        Some(
            self.env_prefix
                .clone()
                .unwrap_or_else(|| env::env_prefix(&self.app)),
        )
    }

    fn build_sources(&self, known_keys: Vec<String>) -> Sources {
        let env = self.effective_env_prefix().map(|prefix| EnvSource {
            prefix,
            vars: self
                .env_vars
                .clone()
                .unwrap_or_else(|| std::env::vars().collect()),
        });
        Sources {
            org: self.org.clone(),
            app: self.app.clone(),
            config_name: self.effective_config_name(),
            explicit_file: self.explicit_file.clone(),
            flags: self.flags.clone(),
            env,
            known_keys,
            resolver: self.resolver.clone(),
        }
    }

    /// Load every source and decode into `target`.
    ///
    /// Name validation, flag binding, file errors other than "not found",
    /// the common section and logging setup all abort. A failure to decode
    /// `target` is reported in [`Loaded::bind`] and leaves `target` as it
    /// was.
    pub fn load_into<T>(self, target: &mut T) -> Result<Loaded, ClapwireError>
    where
        T: Serialize + DeserializeOwned,
    {
        validate_org_and_app_name(&self.org, &self.app)?;

        let mut keys = known_keys(&*target)?;
        keys.extend(known_keys(&CommonConfig::default())?);
        let sources = self.build_sources(keys);

        let mut store = ConfigStore::new();
        let files = register_sources(&mut store, &sources)?;
        debug!(
            config_name = sources.config_name.as_str(),
            files = files.len(),
            keys = store.keys().len(),
            "Config sources registered"
        );

        let mut common: CommonConfig = resolve::resolve(&CommonConfig::default(), &store, &self.hooks)?;
        common.log = common
            .log
            .with_default_level(self.default_log_level.to_string().to_lowercase());
        if self.logging {
            configure_logger(&common.log, self.default_log_level)?;
        }

        let bind = resolve::resolve_into(target, &store, &self.hooks);

        let store = store.into_shared();
        let watcher = if self.watch && !files.is_empty() {
            match watch_files(files, store.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Config files will not be watched");
                    None
                }
            }
        } else {
            None
        };

        Ok(Loaded {
            common,
            store,
            watcher,
            bind,
        })
    }

    /// Load into `T::default()` and return it, failing on any error.
    pub fn load<T>(self) -> Result<T, ClapwireError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut target = T::default();
        self.load_into(&mut target)?.into_result()?;
        Ok(target)
    }
}

/// Load configuration for one command invocation into `target`.
///
/// Searches `/etc/{org}/{app}/{name}.yaml` then
/// `$HOME/.config/{org}/{app}/{name}.yaml`, where `name` is the command
/// path joined with `-`, unless `explicit_file` names the only file to
/// read. Env vars use the app name as prefix.
pub fn init_config<T>(
    org: &str,
    app: &str,
    invocation: Invocation,
    explicit_file: Option<&Path>,
    target: &mut T,
) -> Result<Loaded, ClapwireError>
where
    T: Serialize + DeserializeOwned,
{
    let mut builder = Clapwire::builder(org, app).invocation(invocation);
    if let Some(path) = explicit_file {
        builder = builder.explicit_file(path);
    }
    builder.load_into(target)
}
