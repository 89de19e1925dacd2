use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Error};
use minijinja::Error as MError;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::exec::ExecCommand;
use crate::output::write_output;
use crate::render::Renderer;

mod args;
mod cli;
mod config;
mod exec;
mod output;
mod render;

#[cfg(feature = "completions")]
fn generate_completions(shell: &str) -> Result<i32, Error> {
    macro_rules! gen {
        ($shell:expr) => {
            clap_complete::generate(
                $shell,
                &mut cli::make_command(),
                "envrender",
                &mut std::io::stdout(),
            )
        };
    }

    match shell {
        "bash" => gen!(clap_complete::Shell::Bash),
        "zsh" => gen!(clap_complete::Shell::Zsh),
        "elvish" => gen!(clap_complete::Shell::Elvish),
        "fish" => gen!(clap_complete::Shell::Fish),
        "powershell" => gen!(clap_complete::Shell::PowerShell),
        _ => unreachable!(),
    };

    Ok(0)
}

fn load_config(matches: &clap::ArgMatches) -> Result<Config, Error> {
    let config_file = matches
        .get_one::<PathBuf>("config-file")
        .cloned()
        .or_else(|| std::env::var_os("ENVRENDER_CONFIG_FILE").map(PathBuf::from));
    let mut config = match config_file {
        Some(path) => Config::load_from_toml(&path)?,
        None => Config::default(),
    };
    config.update_from_env()?;
    config.update_from_matches(matches)?;
    Ok(config)
}

/// An empty path counts as missing.
fn required_path(matches: &clap::ArgMatches, id: &str) -> Result<PathBuf, Error> {
    matches
        .get_one::<OsString>(id)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("--{id} is required"))
}

fn execute() -> Result<i32, Error> {
    let mut cmd = cli::make_command();
    cmd.build();
    let args = args::normalize_args(&cmd, std::env::args_os());
    let matches = cmd.get_matches_from(args);

    #[cfg(feature = "completions")]
    {
        if let Some(shell) = matches.get_one::<String>("generate-completion") {
            return generate_completions(shell);
        }
    }

    let config = load_config(&matches)?;
    if matches.get_flag("print-config") {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(0);
    }

    let template = required_path(&matches, "template")?;
    let out = required_path(&matches, "out")?;
    let mode = config.mode()?;

    let clear_env = matches.get_flag("clear-env");
    let trailing: Vec<OsString> = matches
        .get_many::<OsString>("command")
        .unwrap_or_default()
        .cloned()
        .collect();
    let command = if matches.get_flag("exec") {
        if trailing.is_empty() {
            bail!("--exec is specified but no command was provided");
        }
        Some(trailing)
    } else {
        if !trailing.is_empty() {
            tracing::warn!("ignoring {} trailing argument(s) without --exec", trailing.len());
        }
        None
    };

    let rendered = Renderer::from_process_env(&config).render_file(&template)?;
    if rendered.has_errors() {
        bail!(
            "{} template lookup{} failed, not writing {}",
            rendered.failed_lookups,
            if rendered.failed_lookups == 1 { "" } else { "s" },
            out.display()
        );
    }

    write_output(&out, &rendered.output, mode)?;

    match command {
        Some(argv) => ExecCommand::resolve(argv, clear_env)?.exec(),
        None => {
            tracing::info!(
                "generated file {} from {}",
                out.display(),
                template.display()
            );
            Ok(0)
        }
    }
}

pub fn print_error(err: &Error) {
    for (idx, cause) in err.chain().enumerate() {
        if idx == 0 {
            eprintln!("error: {cause}");
        } else {
            eprintln!();
            eprintln!("caused by: {cause}");
        }
        if let Some(cause) = cause.downcast_ref::<MError>() {
            if cause.name().is_some() {
                eprintln!("{}", cause.display_debug_info());
            }
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("ENVRENDER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();
}

fn main() {
    init_logging();
    match execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}
