use anyhow::{bail, Result};
use binpick::cli::{Args, Command, ConfigKey};
use binpick::config::Config;
use binpick::env::{register_path, PathRegistration};
use binpick::installer::Installer;
use clap::{CommandFactory, Parser, ValueEnum};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(Command::Config { key, value }) = &args.command {
        return config_command(&args.config, *key, value.as_deref());
    }

    let Some(source) = args.source.clone() else {
        Args::command().print_help()?;
        return Ok(());
    };

    let no_path = args.no_path;
    let installer = Installer::new(args)?;
    let output = installer.run().await?;

    if output.is_empty() {
        bail!("Nothing was installed from {}", source);
    }
    println!("{output}");

    if no_path {
        return Ok(());
    }

    let mut registered = Vec::new();
    for (_, item) in output.iter() {
        if registered.contains(&item.bin_dir) {
            continue;
        }
        registered.push(item.bin_dir.clone());
        match register_path(&item.bin_dir) {
            Ok(PathRegistration::AlreadyPresent) => {}
            Ok(PathRegistration::GithubPath(file)) => {
                tracing::info!("{} added to {}", item.bin_dir.display(), file.display())
            }
            Ok(PathRegistration::Hint(hint)) => {
                println!("{} is not on PATH. To use it, run:\n  {}", item.bin_dir.display(), hint)
            }
            Err(e) => tracing::warn!("Failed to register {} on PATH: {}", item.bin_dir.display(), e),
        }
    }

    Ok(())
}

fn config_command(path: &Path, key: Option<ConfigKey>, value: Option<&str>) -> Result<()> {
    let mut config = Config::load(path)?;

    match (key, value) {
        (None, _) => {
            for key in ConfigKey::value_variants() {
                println!("{} = {}", key_name(*key), config.get(*key));
            }
        }
        (Some(key), None) => println!("{}", config.get(key)),
        (Some(key), Some(value)) => {
            config.set(key, value)?;
            config.save(path)?;
            println!("{} set to {}", key_name(key), config.get(key));
            tracing::info!("Configuration saved to {}", path.display());
        }
    }
    Ok(())
}

fn key_name(key: ConfigKey) -> String {
    key.to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_else(|| format!("{key:?}"))
}
