//! # clapwire demo application
//!
//! A small CLI that exercises clapwire end to end. It is not a real app;
//! it exists to show the wiring and to check behavior by hand.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example clapwire_demo -- serve
//! cargo run --example clapwire_demo -- paths
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature             | How to exercise it                                                         |
//! |---------------------|----------------------------------------------------------------------------|
//! | Struct defaults     | `cargo run --example clapwire_demo -- serve`                               |
//! | User config file    | Put `clapwire-demo-serve.yaml` under the directory `paths` prints          |
//! | Explicit file       | `cargo run --example clapwire_demo -- serve --config ./demo.yaml`          |
//! | Env var override    | `CLAPWIRE_DEMO_LISTEN_ADDR=0.0.0.0:9 cargo run --example clapwire_demo -- serve` |
//! | Flag override       | `cargo run --example clapwire_demo -- serve --idle-timeout 2m`             |
//! | Sequences from text | `cargo run --example clapwire_demo -- serve --greet ann,bob`               |
//! | Logging section     | `cargo run --example clapwire_demo -- serve --log-level debug`             |
//! | Group help          | `cargo run --example clapwire_demo`                                        |

mod config;

use clap::Command;

use clapwire::{
    ClapwireError, ConfiguredCommand, Context, apply_context, default_config_path,
    default_persistence_path, new_command, with_app_name, with_config_flag, with_org_name,
};

use config::{PathsConfig, ServeConfig};

const ORG: &str = "clapwire";
const APP: &str = "clapwire-demo";

fn run_serve(_ctx: &Context, config: &ServeConfig) -> anyhow::Result<()> {
    tracing::info!(addr = %config.listen_addr, "serving");
    println!("listen-addr:  {}", config.listen_addr);
    println!("idle-timeout: {:?}", config.idle_timeout);
    match &config.allow_from {
        Some(net) => println!("allow-from:   {net}"),
        None => println!("allow-from:   anywhere"),
    }
    println!("token:        {}", config.token);
    for name in &config.greet {
        println!("hello, {name}");
    }
    Ok(())
}

fn run_paths(ctx: &Context, _config: &PathsConfig) -> anyhow::Result<()> {
    let org = ctx.org_name().unwrap_or_default();
    let app = ctx.app_name().unwrap_or_default();
    println!("config:      {}", default_config_path(org, app)?.display());
    println!("persistence: {}", default_persistence_path(org, app)?.display());
    Ok(())
}

fn root() -> Result<ConfiguredCommand, ClapwireError> {
    let serve = new_command(
        Command::new("serve").about("Print the resolved serve configuration"),
        run_serve,
        ServeConfig::default(),
        [with_config_flag("")],
    )?;
    let paths = new_command(
        Command::new("paths").about("Print the config and persistence directories"),
        run_paths,
        PathsConfig::default(),
        [],
    )?;
    Ok(ConfiguredCommand::group(
        Command::new(APP).about("clapwire demo, a sample app wired with clapwire"),
        [],
    )
    .subcommand(serve)
    .subcommand(paths))
}

fn main() {
    let ctx = apply_context(None, [with_org_name(ORG), with_app_name(APP)]);
    let result = root().and_then(|cmd| cmd.execute(&ctx, std::env::args_os()));
    match result {
        Ok(()) => {}
        Err(ClapwireError::Cli(e)) => e.exit(),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
