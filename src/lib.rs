//! Wire CLI commands to layered YAML configuration, logging, and path
//! conventions. Define a struct, declare a command, and go.
//!
//! ```ignore
//! let serve = new_command(
//!     Command::new("serve"),
//!     |ctx, config: &ServeConfig| run_server(ctx, config),
//!     ServeConfig::default(),
//!     [with_config_flag("")],
//! )?;
//! let root = ConfiguredCommand::group(Command::new("tool"), []).subcommand(serve);
//!
//! let ctx = apply_context(None, [with_org_name("acme"), with_app_name("tool")]);
//! root.execute(&ctx, std::env::args_os())?;
//! ```
//!
//! Running `tool serve` reads `/etc/acme/tool/tool-serve.yaml` and
//! `~/.config/acme/tool/tool-serve.yaml`, overlays `TOOL_*` environment
//! variables and any `--flag` the user typed, sets up logging from the
//! `log` section, decodes a `ServeConfig`, and hands it to the handler.
//!
//! # Why clapwire
//!
//! Command-line tools keep re-solving the same plumbing: where does the
//! config file live, which source wins, how does `"30s"` become a
//! `Duration`, how does `--log-level` reach the logger. Clapwire answers
//! each of those once. The config struct is the schema: its fields name
//! the keys, its `Default` supplies the defaults, and every source (file,
//! env var, flag) is matched against it.
//!
//! # Layer precedence
//!
//! ```text
//! Struct defaults       the value passed in as the target
//!        ↑ overridden by
//! Flag defaults         defaults of generated flags the user did not set
//!        ↑ overridden by
//! System file           /etc/{org}/{app}/{name}.yaml
//!        ↑ overridden by
//! User file             ~/.config/{org}/{app}/{name}.yaml  (/config in a container)
//!        ↑ overridden by
//! Explicit file         --config, replacing both searched files
//!        ↑ overridden by
//! Environment vars      {APP}_{KEY}
//!        ↑ overridden by
//! Flags                 flags the user typed
//! ```
//!
//! Every layer is **sparse** and overrides are flat: a layer that sets
//! `log.level` replaces that key only, never its siblings. Each layer lives
//! separately in a [`ConfigStore`], so [`ConfigStore::settings`] can tell
//! you which source supplied every key.
//!
//! # File names
//!
//! `{name}` is the command path joined with `-`: the root command `tool`
//! reads `tool.yaml`, `tool serve` reads `tool-serve.yaml`. Override it with
//! [`ClapwireBuilder::config_name`]. A missing file is skipped; a file that
//! exists but cannot be read or parsed aborts the load with its path.
//!
//! # Environment variables
//!
//! With app name `my-tool`, the prefix is `MY_TOOL`; keys upper-case and
//! turn `.` and `-` into `_`:
//!
//! | Env var | Config key |
//! |---------|------------|
//! | `MY_TOOL_PORT` | `port` |
//! | `MY_TOOL_LOG_MAX_SIZE` | `log.max-size` |
//!
//! Only keys the target declares (or a file supplied) are looked up, so an
//! unrelated variable can never inject a key.
//!
//! # Decoding
//!
//! Values are decoded weakly: env vars and flags arrive as strings and are
//! coerced into numbers, booleans, and sequences as the target field
//! requires. A [`HookChain`] converts special types before each read:
//!
//! - `Duration` from `"90s"`, `"1h30m"`, `"7d"`, or integer seconds;
//! - [`IpNet`] from `"10.1.2.3/8"`, masked to its network;
//! - `Vec<T>` from `"a,b,c"`;
//! - [`Masked<T>`] for secrets, which never print.
//!
//! Keys no field claims are ignored. A value that cannot be coerced fails
//! with a [`DecodeError`] naming the dotted key.
//!
//! # Logging
//!
//! Every load decodes [`CommonConfig`] from the same store and applies its
//! `log` section through [`configure_logger`]: level, optional rotating log
//! file, size and age limits, compression. The level falls back to the
//! builder's default (warn unless set) when missing or invalid.
//!
//! # Paths
//!
//! [`default_config_path`] and [`default_persistence_path`] give
//! `~/.config/{org}/{app}` on a host (created with mode 0700) and `/config`
//! and `/persist` inside a container. The container check is the
//! `/.dockerenv` marker; [`PathResolver`] lets tests and unusual
//! deployments replace it.
//!
//! # No CLI framework required
//!
//! The loader has no dependency on clap. [`Clapwire::builder`] and
//! [`init_config`] take an [`Invocation`] (command path plus flag values)
//! you can build from any parser. The clap adapter ([`new_command`],
//! [`ConfiguredCommand`]) sits behind the default `clap` feature:
//!
//! ```toml
//! clapwire = { version = "...", default-features = false }
//! ```
//!
//! # Error handling
//!
//! All fallible operations return [`ClapwireError`]. Messages are written
//! for the person running the tool: they carry the file path, the dotted
//! key, or the flag involved.

pub mod context;
pub mod decode;
pub mod error;
pub mod logging;
pub mod paths;
pub mod store;
pub mod types;
pub mod value;

mod builder;
#[cfg(feature = "clap")]
mod cli;
mod env;
mod file;
mod flatten;
pub(crate) mod merge;
mod name;
mod resolve;
mod sources;
mod watch;

#[cfg(test)]
mod fixtures;

pub use builder::{Clapwire, ClapwireBuilder, CommonConfig, Loaded, init_config};
#[cfg(feature = "clap")]
pub use cli::{CONFIG_FLAG, CommandOpt, ConfiguredCommand, new_command, with_config_flag};
pub use context::{
    Context, ContextKey, ContextTransform, app_name_of, apply_context, org_name_of, with_app_name,
    with_org_name,
};
pub use decode::{DecodeError, DecodeHook, HookChain, decode};
pub use env::{env_prefix, env_var_name};
pub use error::{ClapwireError, NameField};
pub use file::{LoadedFile, load_file};
pub use flatten::{FlatEntry, FlattenError};
pub use logging::{
    LogConfig, RotatingFile, configure_logger, global_level, parse_level, resolve_level,
};
pub use name::{InvalidName, NameIssue, validate_name, validate_org_and_app_name};
pub use paths::{
    DeploymentProfile, PathResolver, default_config_file, default_config_path,
    default_persistence_file, default_persistence_path, default_user_config_path,
    is_containerized,
};
pub use resolve::{known_keys, resolve, resolve_into};
pub use sources::{
    EnvSource, FlagValue, Invocation, Sources, command_base_name, register_sources,
};
pub use store::{ConfigStore, Layer, Setting, SharedStore};
pub use types::{IpNet, Masked};
pub use value::Value;
pub use watch::{WatchHandle, WatchedFile, reload_file, watch_files};
