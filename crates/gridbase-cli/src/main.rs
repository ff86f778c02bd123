// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, bail};
use config::Config;
use env_logger::{Env, Target};
use gridbase_app::{AppState, Screen};
use gridbase_db::Store;
use runtime::DbRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `gridbase --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    init_logging(&config)?;

    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or GRIDBASE_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;

    let mut state = AppState::default();
    if options.demo {
        let base = store.seed_demo_data()?;
        state.screen = Screen::Tables { base };
    }
    if options.check_only {
        log::info!("startup check passed for {}", db_path.display());
        return Ok(());
    }

    log::info!(
        "starting gridbase db={} page_size={}",
        db_path.display(),
        config.grid_options().page_size
    );
    let mut runtime = DbRuntime::new(&store);
    gridbase_tui::run_app(&mut state, &mut runtime, config.grid_options())
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {} -- set [log].file to a writable path", path.display()))?;

    let level = config.log_level();
    if env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format_timestamp_millis()
        .target(Target::Pipe(Box::new(file)))
        .try_init()
        .is_err()
    {
        log::debug!("logger already initialized");
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        ..CliOptions::default()
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let Some(value) = iter.next() else {
                    bail!("--config requires a file path");
                };
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => bail!("unknown argument {unknown:?}; run `gridbase --help` for the supported flags"),
        }
    }

    Ok(options)
}

fn print_help() {
    println!("gridbase");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with a seeded demo base (in-memory)");
    println!("  --check                  Validate config and database, then exit");
    println!("  --help                   Show this help");
}
