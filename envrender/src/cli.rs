/// This module defines the command-line interface for the CLI.
/// It is separated into its own file because it is used both by the main
/// application and by build.rs to generate the man page and shell completions.
use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{arg, command, value_parser, Arg, ArgAction, Command};

const BEHAVIOR: &str = "Template Behavior";
const EXEC: &str = "Process Replacement";

/// Turns a switch into one that also accepts `--flag=true` / `--flag=false`.
///
/// The value must be attached with `=` so that `--exec cmd` never treats the
/// command as the value of the flag.
fn switch(arg: Arg) -> Arg {
    arg.action(ArgAction::Set)
        .num_args(0..=1)
        .require_equals(true)
        .default_value("false")
        .default_missing_value("true")
        .hide_default_value(true)
        .value_name("BOOL")
        .value_parser(BoolishValueParser::new())
}

pub(super) fn make_command() -> Command {
    command!()
        .max_term_width(120)
        .args([
            arg!(--template <PATH> "Path to the template file to render")
                .long_help("\
                    Path to the template file to render.  This flag is required.\n\n\
                    \
                    The template uses MiniJinja (Jinja2) syntax and has access to the lookup \
                    functions env(name), envDefault(name, default), requiredEnv(name) and \
                    readFile(path).  Failed requiredEnv and readFile lookups are reported and \
                    abort the run before anything is written.")
                .value_parser(value_parser!(OsString)),
            arg!(--out <PATH> "Destination path for the rendered template")
                .long_help("\
                    Destination path for the rendered template.  This flag is required.\n\n\
                    \
                    The file is created or truncated and the permissions given with --mode are \
                    applied afterwards, regardless of the permissions of an existing file or the \
                    current umask.")
                .value_parser(value_parser!(OsString)),
            arg!(--mode <OCTAL> "File mode for the rendered template [default: 0600]")
                .long_help("\
                    File mode for the rendered template, as an octal number.\n\n\
                    \
                    [default: 0600]\n\
                    [env var: ENVRENDER_MODE]"),
            arg!(--"config-file" <PATH> "Path to a TOML config file")
                .long_help("\
                    Loads defaults from a TOML config file.  Environment variables and command \
                    line flags take precedence over values from the file.\n\n\
                    \
                    To see the possible config values use --print-config which will print the \
                    current state of the config.\n\n\
                    [env var: ENVRENDER_CONFIG_FILE]")
                .value_parser(value_parser!(PathBuf)),
            switch(arg!(--strict "Disallow undefined variables in templates")
                .long_help("\
                    Disallow undefined variables in templates instead of rendering empty strings.\n\n\
                    \
                    [env var: ENVRENDER_STRICT]")
                .help_heading(BEHAVIOR)),
            switch(arg!(--"trim-blocks" "Enable the trim-blocks flag")
                .long_help("\
                    Enable the trim-blocks flag.  When enabled trailing whitespace including one \
                    newline is removed after a block tag.\n\n\
                    \
                    [env var: ENVRENDER_TRIM_BLOCKS]")
                .help_heading(BEHAVIOR)),
            switch(arg!(--"lstrip-blocks" "Enable the lstrip-blocks flag")
                .long_help("\
                    Enable the lstrip-blocks flag.  When enabled leading whitespace is removed \
                    before a block tag.\n\n\
                    \
                    [env var: ENVRENDER_LSTRIP_BLOCKS]")
                .help_heading(BEHAVIOR)),
            switch(arg!(--env "Pass environment variables as ENV to the template")
                .long_help("\
                    Make all environment variables available under the ENV variable within \
                    the template in addition to the lookup functions.\n\n\
                    \
                    [env var: ENVRENDER_ENV]")
                .help_heading(BEHAVIOR)),
            #[cfg(feature = "contrib")]
            switch(arg!(--"py-compat" "Enables improved Python compatibility")
                .long_help("\
                    Enables Python compatible methods such as dict.items() and str.upper().\n\n\
                    \
                    [env var: ENVRENDER_PY_COMPAT]")
                .help_heading(BEHAVIOR)),
            arg!(--fuel <AMOUNT> "Configures the maximum fuel")
                .long_help("\
                    Sets the maximum fuel a template can consume.  Every instruction consumes \
                    fuel and rendering fails once it runs out.  0 disables the limit.\n\n\
                    \
                    [env var: ENVRENDER_FUEL]")
                .value_parser(value_parser!(u64))
                .help_heading(BEHAVIOR),
            arg!(-s --syntax <PAIR> "Changes a syntax feature (feature=value)")
                .long_help("\
                    Changes a syntax feature.  The flag can be provided multiple times.  The \
                    following features can be changed (with their defaults):\n\n\
                    \
                    block-start={%\n\
                    block-end=%}\n\
                    variable-start={{\n\
                    variable-end=}}\n\
                    comment-start={#\n\
                    comment-end=#}\n\
                    line-statement-prefix=\n\
                    line-comment-prefix=\n\n\
                    \
                    For environment variable usage split multiple pairs with whitespace.\n\n\
                    \
                    [env var: ENVRENDER_SYNTAX]")
                .action(ArgAction::Append)
                .help_heading(BEHAVIOR),
            switch(arg!(--exec "Replace this process with the trailing command after rendering")
                .long_help("\
                    After the output file was written, replace the current process with the \
                    command given as trailing arguments.  Commands that are not absolute paths \
                    are looked up in $PATH.")
                .help_heading(EXEC)),
            switch(arg!(--"clear-env" "Start the command given to --exec with an empty environment")
                .help_heading(EXEC)),
            switch(arg!(--"print-config" "Print out the loaded config")),
            arg!(command: [COMMAND]... "Command and arguments to execute with --exec")
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .value_parser(value_parser!(OsString)),
            #[cfg(feature = "completions")]
            arg!(--"generate-completion" <SH> "Generate a completion script for the given shell")
                .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                .help_heading("Shell Support"),
        ])
        .about("Renders a config file from a template and the environment, then optionally execs a command.")
        .after_help("Flags may be written with one or two leading dashes (-out and --out are the same).")
}
