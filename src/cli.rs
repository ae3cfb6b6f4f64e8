//! Clap adapter for clapwire.
//!
//! This module is the **optional integration layer** between clapwire's
//! framework-agnostic loader and the [clap](https://docs.rs/clap) CLI
//! parser. It is compiled only when the `clap` Cargo feature is enabled (on
//! by default).
//!
//! [`new_command`] takes a `clap::Command`, a handler, and the handler's
//! default config, and returns a [`ConfiguredCommand`] that:
//!
//! - carries one long flag per leaf key of the default config
//!   (`log.level` → `--log-level`), with the default value rendered;
//! - on [`execute`](ConfiguredCommand::execute), parses the arguments,
//!   finds the invoked leaf, loads configuration for it (org and app from
//!   the [`Context`], file named after the command path, `--config` if
//!   present) and only then calls the handler.
//!
//! If you use a different CLI parser, skip this module and call
//! [`init_config`](crate::init_config) with an [`Invocation`] you build
//! yourself.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::builder::{Clapwire, ClapwireBuilder};
use crate::context::Context;
use crate::error::ClapwireError;
use crate::flatten::{FlatEntry, flatten};
use crate::sources::{FlagValue, Invocation};
use crate::value::Value;

/// Id and long name of the flag added by [`with_config_flag`].
pub const CONFIG_FLAG: &str = "config";

/// A customization applied to the command before flags are generated.
pub type CommandOpt = Box<dyn FnOnce(Command) -> Command>;

type Handler<T> = Box<dyn Fn(&Context, &T) -> anyhow::Result<()> + Send + Sync>;
type Loader = Arc<dyn Fn(ClapwireBuilder) -> ClapwireBuilder + Send + Sync>;

/// Add `--config`/`-c` naming the config file. An empty default means the
/// usual search runs unless the flag is given.
pub fn with_config_flag(default_config_file: impl Into<String>) -> CommandOpt {
    let default = default_config_file.into();
    Box::new(move |cmd: Command| {
        let mut arg = Arg::new(CONFIG_FLAG)
            .short('c')
            .long(CONFIG_FLAG)
            .value_name("FILE")
            .help("config file")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(String));
        if !default.is_empty() {
            arg = arg.default_value(default);
        }
        cmd.arg(arg)
    })
}

/// A generated flag and the config key it feeds.
#[derive(Debug, Clone, PartialEq)]
struct FlagDef {
    key: String,
    long: String,
    default: Option<String>,
    is_bool: bool,
    sensitive: bool,
}

impl FlagDef {
    fn from_entry(entry: FlatEntry) -> Option<Self> {
        if entry.key.is_empty() || matches!(entry.value, Some(Value::Map(_))) {
            return None;
        }
        let default = entry
            .value
            .as_ref()
            .map(ToString::to_string)
            .filter(|s| !s.is_empty());
        Some(Self {
            long: entry.key.replace('.', "-"),
            is_bool: matches!(entry.value, Some(Value::Bool(_))),
            sensitive: entry.sensitive,
            default,
            key: entry.key,
        })
    }

    fn arg(&self) -> Arg {
        let mut arg = Arg::new(self.key.clone())
            .long(self.long.clone())
            .help(format!("Sets {}", self.key))
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(String));
        if self.is_bool {
            arg = arg
                .num_args(0..=1)
                .value_name("BOOL")
                .default_missing_value("true");
        } else {
            arg = arg.value_name("VALUE");
        }
        if let Some(default) = &self.default {
            arg = arg.default_value(default.clone());
        }
        if self.sensitive {
            arg = arg.hide_default_value(true);
        }
        arg
    }
}

/// Add a flag per definition, skipping any whose id or long name is taken.
/// Returns the definitions that were added.
fn add_flags(mut cmd: Command, defs: Vec<FlagDef>) -> (Command, Vec<FlagDef>) {
    let mut added = Vec::new();
    for def in defs {
        let taken = cmd
            .get_arguments()
            .any(|a| a.get_id().as_str() == def.key || a.get_long() == Some(def.long.as_str()));
        if taken {
            debug!(key = def.key.as_str(), "Flag already defined, not generating it");
            continue;
        }
        cmd = cmd.arg(def.arg());
        added.push(def);
    }
    (cmd, added)
}

fn flag_values(matches: &ArgMatches, defs: &[FlagDef]) -> Result<Vec<FlagValue>, ClapwireError> {
    let mut out = Vec::new();
    for def in defs {
        let value = matches
            .try_get_one::<String>(&def.key)
            .map_err(|e| ClapwireError::FlagBinding {
                flag: def.long.clone(),
                reason: e.to_string(),
            })?;
        let Some(value) = value else {
            continue;
        };
        let explicit = !matches!(
            matches.value_source(&def.key),
            None | Some(ValueSource::DefaultValue)
        );
        out.push(FlagValue {
            key: def.key.clone(),
            value: Value::String(value.clone()),
            explicit,
        });
    }
    Ok(out)
}

fn config_flag(matches: &ArgMatches) -> Option<PathBuf> {
    matches
        .try_get_one::<String>(CONFIG_FLAG)
        .ok()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

trait Runner: Send + Sync {
    fn flags(&self) -> &[FlagDef];

    fn run(&self, ctx: &Context, builder: ClapwireBuilder) -> Result<(), ClapwireError>;
}

struct TypedRunner<T> {
    default: T,
    handler: Handler<T>,
    flags: Vec<FlagDef>,
}

impl<T> Runner for TypedRunner<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn flags(&self) -> &[FlagDef] {
        &self.flags
    }

    fn run(&self, ctx: &Context, builder: ClapwireBuilder) -> Result<(), ClapwireError> {
        let mut config = self.default.clone();
        // Held until the handler returns so a watcher keeps running.
        let _loaded = builder.load_into(&mut config)?.into_result()?;
        (self.handler)(ctx, &config).map_err(ClapwireError::Handler)
    }
}

/// A clap command tree whose leaves load configuration before running.
pub struct ConfiguredCommand {
    command: Command,
    runner: Option<Box<dyn Runner>>,
    subcommands: Vec<ConfiguredCommand>,
    loader: Option<Loader>,
}

/// Wrap `command` so that running it loads a `T` first.
///
/// Flags are generated from `default_config` after `opts` are applied; a
/// key whose flag name is already taken gets no flag.
pub fn new_command<T, F>(
    command: Command,
    handler: F,
    default_config: T,
    opts: impl IntoIterator<Item = CommandOpt>,
) -> Result<ConfiguredCommand, ClapwireError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(&Context, &T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let command = opts.into_iter().fold(command, |cmd, opt| opt(cmd));
    let defs = flatten(&default_config)?
        .into_iter()
        .filter_map(FlagDef::from_entry)
        .collect();
    let (command, flags) = add_flags(command, defs);
    Ok(ConfiguredCommand {
        command,
        runner: Some(Box::new(TypedRunner {
            default: default_config,
            handler: Box::new(handler),
            flags,
        })),
        subcommands: Vec::new(),
        loader: None,
    })
}

impl ConfiguredCommand {
    /// A command with no handler of its own; invoking it prints help.
    pub fn group(command: Command, opts: impl IntoIterator<Item = CommandOpt>) -> Self {
        Self {
            command: opts.into_iter().fold(command, |cmd, opt| opt(cmd)),
            runner: None,
            subcommands: Vec::new(),
            loader: None,
        }
    }

    pub fn subcommand(mut self, sub: ConfiguredCommand) -> Self {
        self.subcommands.push(sub);
        self
    }

    /// Adjust the loader for this command and everything below it, e.g. to
    /// pin paths or turn on watching.
    pub fn configure_loader<F>(mut self, f: F) -> Self
    where
        F: Fn(ClapwireBuilder) -> ClapwireBuilder + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        self.command.get_name()
    }

    /// The full clap command, subcommands included.
    pub fn command(&self) -> Command {
        self.subcommands
            .iter()
            .fold(self.command.clone(), |cmd, sub| cmd.subcommand(sub.command()))
    }

    /// Parse `args` (program name first) and run the invoked command.
    ///
    /// Parse failures, `--help` and `--version` come back as
    /// [`ClapwireError::Cli`]; call `exit()` on the inner error to print
    /// them the way clap does.
    pub fn execute<I, S>(&self, ctx: &Context, args: I) -> Result<(), ClapwireError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;

        let mut node = self;
        let mut node_matches = &matches;
        let mut path = vec![self.name().to_string()];
        let mut explicit_file = config_flag(&matches);
        let mut loader = self.loader.clone();

        while let Some((name, sub_matches)) = node_matches.subcommand() {
            let Some(next) = node.subcommands.iter().find(|c| c.name() == name) else {
                break;
            };
            node = next;
            node_matches = sub_matches;
            path.push(name.to_string());
            if let Some(file) = config_flag(sub_matches) {
                explicit_file = Some(file);
            }
            if next.loader.is_some() {
                loader = next.loader.clone();
            }
        }

        let Some(runner) = &node.runner else {
            let mut help = node.command().bin_name(path.join(" "));
            print!("{}", help.render_help());
            return Ok(());
        };

        let invocation = Invocation {
            command_path: path,
            flags: flag_values(node_matches, runner.flags())?,
        };
        let org = ctx.org_name().unwrap_or_default();
        let app = ctx.app_name().unwrap_or_default();
        let mut builder = Clapwire::builder(org, app).invocation(invocation);
        if let Some(file) = explicit_file {
            builder = builder.explicit_file(file);
        }
        if let Some(loader) = loader {
            builder = loader(builder);
        }
        runner.run(ctx, builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{apply_context, with_app_name, with_org_name};
    use crate::fixtures::test::{ServeConfig, TestConfig};
    use crate::paths::DeploymentProfile;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn ctx() -> Context {
        apply_context(None, [with_org_name("acme"), with_app_name("tool")])
    }

    fn pinned(tmp: &Path) -> impl Fn(ClapwireBuilder) -> ClapwireBuilder + Send + Sync + 'static {
        let tmp = tmp.to_path_buf();
        move |b| {
            b.profile(DeploymentProfile::Host)
                .home_dir(tmp.join("home"))
                .system_config_root(tmp.join("etc"))
                .env_vars(Vec::new())
                .no_logging()
        }
    }

    type Seen<T> = Arc<Mutex<Option<T>>>;

    fn recording<T: Clone + Send + Sync + 'static>()
    -> (Seen<T>, impl Fn(&Context, &T) -> anyhow::Result<()> + Send + Sync + 'static) {
        let seen: Seen<T> = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        (seen, move |_: &Context, config: &T| {
            *sink.lock().unwrap() = Some(config.clone());
            Ok(())
        })
    }

    fn arg<'a>(cmd: &'a Command, id: &str) -> &'a Arg {
        cmd.get_arguments()
            .find(|a| a.get_id().as_str() == id)
            .unwrap_or_else(|| panic!("no arg {id}"))
    }

    fn default_of(arg: &Arg) -> Vec<String> {
        arg.get_default_values()
            .iter()
            .map(|v| v.to_string_lossy().into_owned())
            .collect()
    }

    fn write(path: PathBuf, content: &str) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn config_flag_shape() {
        let cmd = with_config_flag("config.yaml")(Command::new("tool"));
        let config = arg(&cmd, "config");
        assert_eq!(config.get_short(), Some('c'));
        assert_eq!(config.get_long(), Some("config"));
        assert_eq!(default_of(config), vec!["config.yaml"]);
    }

    #[test]
    fn config_flag_without_default() {
        let cmd = with_config_flag("")(Command::new("tool"));
        assert!(arg(&cmd, "config").get_default_values().is_empty());
    }

    #[test]
    fn flags_follow_default_config() {
        let (_, handler) = recording::<ServeConfig>();
        let wrapped = new_command(Command::new("serve"), handler, ServeConfig::default(), []).unwrap();
        let cmd = wrapped.command();

        assert_eq!(arg(&cmd, "log.level").get_long(), Some("log-level"));
        assert_eq!(arg(&cmd, "log.max-size").get_long(), Some("log-max-size"));
        assert_eq!(default_of(arg(&cmd, "log.max-size")), vec!["100"]);
        assert_eq!(default_of(arg(&cmd, "listen-addr")), vec!["127.0.0.1:8080"]);
        assert!(arg(&cmd, "log.level").get_default_values().is_empty());
    }

    #[test]
    fn sensitive_defaults_are_hidden() {
        let (_, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), []).unwrap();
        let cmd = wrapped.command();
        assert!(arg(&cmd, "token").is_hide_default_value_set());
        assert!(!arg(&cmd, "port").is_hide_default_value_set());
    }

    #[test]
    fn existing_flags_are_kept() {
        let (_, handler) = recording::<TestConfig>();
        let cmd = Command::new("tool").arg(Arg::new("port").long("port").help("mine"));
        let wrapped = new_command(cmd, handler, TestConfig::default(), []).unwrap();
        let cmd = wrapped.command();
        let port = arg(&cmd, "port");
        assert_eq!(port.get_help().map(ToString::to_string), Some("mine".to_string()));
        assert_eq!(cmd.get_arguments().filter(|a| a.get_long() == Some("port")).count(), 1);
    }

    #[test]
    fn execute_loads_defaults_and_flags() {
        let tmp = TempDir::new().unwrap();
        let (seen, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), [])
            .unwrap()
            .configure_loader(pinned(tmp.path()));

        wrapped
            .execute(&ctx(), ["tool", "--port", "9000", "--debug"])
            .unwrap();
        let config = seen.lock().unwrap().clone().unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.debug);
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn flag_defaults_lose_to_files_and_set_flags_win() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("home/.config/acme/tool/tool.yaml"), "port: 1\n");
        let (seen, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), [])
            .unwrap()
            .configure_loader(pinned(tmp.path()));

        wrapped.execute(&ctx(), ["tool"]).unwrap();
        assert_eq!(seen.lock().unwrap().as_ref().unwrap().port, 1);

        wrapped.execute(&ctx(), ["tool", "--port", "2"]).unwrap();
        assert_eq!(seen.lock().unwrap().as_ref().unwrap().port, 2);
    }

    #[test]
    fn nested_command_reads_its_own_file() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path().join("home/.config/acme/tool/tool-serve.yaml"),
            "max-connections: 8\n",
        );
        let (seen, handler) = recording::<ServeConfig>();
        let root = ConfiguredCommand::group(Command::new("tool"), [])
            .subcommand(new_command(Command::new("serve"), handler, ServeConfig::default(), []).unwrap())
            .configure_loader(pinned(tmp.path()));

        root.execute(&ctx(), ["tool", "serve"]).unwrap();
        let config = seen.lock().unwrap().clone().unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn nested_command_without_files_gets_defaults() {
        let tmp = TempDir::new().unwrap();
        let (seen, handler) = recording::<ServeConfig>();
        let root = ConfiguredCommand::group(Command::new("tool"), [])
            .subcommand(new_command(Command::new("serve"), handler, ServeConfig::default(), []).unwrap())
            .configure_loader(pinned(tmp.path()));

        root.execute(&ctx(), ["tool", "serve"]).unwrap();
        assert_eq!(seen.lock().unwrap().clone(), Some(ServeConfig::default()));
    }

    #[test]
    fn config_flag_names_the_file() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path().join("home/.config/acme/tool/tool.yaml"), "port: 1\n");
        let custom = write(tmp.path().join("custom.yaml"), "port: 2\n");
        let (seen, handler) = recording::<TestConfig>();
        let wrapped = new_command(
            Command::new("tool"),
            handler,
            TestConfig::default(),
            [with_config_flag("")],
        )
        .unwrap()
        .configure_loader(pinned(tmp.path()));

        let custom = custom.display().to_string();
        wrapped.execute(&ctx(), ["tool", "-c", custom.as_str()]).unwrap();
        assert_eq!(seen.lock().unwrap().as_ref().unwrap().port, 2);
    }

    #[test]
    fn missing_names_abort_before_handler() {
        let tmp = TempDir::new().unwrap();
        let (seen, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), [])
            .unwrap()
            .configure_loader(pinned(tmp.path()));

        let err = wrapped.execute(&Context::new(), ["tool"]).unwrap_err();
        assert!(matches!(err, ClapwireError::InvalidName { .. }));
        assert!(seen.lock().unwrap().is_none());
    }

    #[test]
    fn bad_value_aborts_before_handler() {
        let tmp = TempDir::new().unwrap();
        let (seen, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), [])
            .unwrap()
            .configure_loader(pinned(tmp.path()));

        let err = wrapped.execute(&ctx(), ["tool", "--port", "lots"]).unwrap_err();
        assert!(matches!(err, ClapwireError::Decode(_)));
        assert!(seen.lock().unwrap().is_none());
    }

    #[test]
    fn handler_errors_are_wrapped() {
        let tmp = TempDir::new().unwrap();
        let wrapped = new_command(
            Command::new("tool"),
            |_: &Context, _: &TestConfig| anyhow::bail!("nope"),
            TestConfig::default(),
            [],
        )
        .unwrap()
        .configure_loader(pinned(tmp.path()));

        let err = wrapped.execute(&ctx(), ["tool"]).unwrap_err();
        assert!(matches!(err, ClapwireError::Handler(_)));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn group_without_subcommand_prints_help() {
        let root = ConfiguredCommand::group(Command::new("tool"), []).subcommand(ConfiguredCommand::group(
            Command::new("db"),
            [],
        ));
        assert!(root.execute(&ctx(), ["tool"]).is_ok());
        assert!(root.execute(&ctx(), ["tool", "db"]).is_ok());
    }

    #[test]
    fn unknown_flag_is_cli_error() {
        let (_, handler) = recording::<TestConfig>();
        let wrapped = new_command(Command::new("tool"), handler, TestConfig::default(), []).unwrap();
        let err = wrapped.execute(&ctx(), ["tool", "--nope"]).unwrap_err();
        assert!(matches!(err, ClapwireError::Cli(_)));
    }
}
