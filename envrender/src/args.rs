//! Accepts flags spelled with a single leading dash.
//!
//! Entrypoint scripts commonly invoke the tool as `envrender -template x
//! -out y -exec cmd`.  clap only understands long flags with two dashes, so
//! the raw arguments are rewritten before parsing.  The first positional
//! argument ends flag parsing: everything from there on belongs to the
//! command passed to `--exec`.
use std::ffi::OsString;

use clap::{Arg, Command};

const END_OF_FLAGS: &str = "--";

/// Rewrites `args` so clap can parse them with `cmd`.
///
/// `cmd` must be built (see [`Command::build`]) so that the automatically
/// generated help and version flags are known.
pub fn normalize_args<I, T>(cmd: &Command, args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut iter = args.into_iter().map(Into::into);
    let mut rv = Vec::new();
    rv.extend(iter.next());

    while let Some(arg) = iter.next() {
        let s = match arg.to_str() {
            Some(s) => s,
            // flags are always valid unicode, so this starts the command
            None => {
                rv.push(END_OF_FLAGS.into());
                rv.push(arg);
                rv.extend(iter.by_ref());
                break;
            }
        };

        if s == END_OF_FLAGS {
            rv.push(arg);
            rv.extend(iter.by_ref());
            break;
        } else if let Some(long) = s.strip_prefix("--") {
            let consumes_next = !long.contains('=') && long_takes_value(cmd, long) == Some(true);
            rv.push(arg);
            if consumes_next {
                rv.extend(iter.next());
            }
        } else if let Some(flag) = s.strip_prefix('-').filter(|x| !x.is_empty()) {
            let (name, inline_value) = match flag.split_once('=') {
                Some((name, _)) => (name, true),
                None => (flag, false),
            };
            let consumes_next = match long_takes_value(cmd, name) {
                Some(takes_value) => {
                    rv.push(format!("-{}", s).into());
                    takes_value && !inline_value
                }
                None => {
                    let mut chars = flag.chars();
                    let takes_value = match (chars.next(), chars.next()) {
                        (Some(short), None) => short_takes_value(cmd, short) == Some(true),
                        _ => false,
                    };
                    rv.push(arg);
                    takes_value
                }
            };
            if consumes_next {
                rv.extend(iter.next());
            }
        } else {
            rv.push(END_OF_FLAGS.into());
            rv.push(arg);
            rv.extend(iter.by_ref());
            break;
        }
    }

    rv
}

fn long_takes_value(cmd: &Command, name: &str) -> Option<bool> {
    cmd.get_arguments()
        .find(|arg| arg.get_long() == Some(name))
        .map(takes_separate_value)
}

fn short_takes_value(cmd: &Command, name: char) -> Option<bool> {
    cmd.get_arguments()
        .find(|arg| arg.get_short() == Some(name))
        .map(takes_separate_value)
}

/// Switches accept `=true`/`=false` but never swallow the following token.
fn takes_separate_value(arg: &Arg) -> bool {
    arg.get_action().takes_values() && !arg.is_require_equals_set()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::make_command;

    fn normalize(args: &[&str]) -> Vec<String> {
        let mut cmd = make_command();
        cmd.build();
        normalize_args(&cmd, args.iter().copied())
            .into_iter()
            .map(|x| x.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_single_dash_long_flags() {
        assert_eq!(
            normalize(&["envrender", "-template", "a.tmpl", "-out=b.conf", "-mode", "0644"]),
            ["envrender", "--template", "a.tmpl", "--out=b.conf", "--mode", "0644"]
        );
    }

    #[test]
    fn test_double_dash_untouched() {
        assert_eq!(
            normalize(&["envrender", "--template", "-weird-name", "--exec"]),
            ["envrender", "--template", "-weird-name", "--exec"]
        );
    }

    #[test]
    fn test_value_is_never_rewritten() {
        assert_eq!(
            normalize(&["envrender", "-out", "-exec", "-exec"]),
            ["envrender", "--out", "-exec", "--exec"]
        );
    }

    #[test]
    fn test_command_ends_flags() {
        assert_eq!(
            normalize(&[
                "envrender", "-exec", "-clear-env", "nginx", "-g", "daemon off;", "-out"
            ]),
            [
                "envrender",
                "--exec",
                "--clear-env",
                "--",
                "nginx",
                "-g",
                "daemon off;",
                "-out"
            ]
        );
    }

    #[test]
    fn test_explicit_separator() {
        assert_eq!(
            normalize(&["envrender", "-exec", "--", "-dash-command", "-x"]),
            ["envrender", "--exec", "--", "-dash-command", "-x"]
        );
    }

    #[test]
    fn test_short_flags() {
        assert_eq!(
            normalize(&["envrender", "-s", "block-start=<%", "-svariable-end=%>", "-h"]),
            ["envrender", "-s", "block-start=<%", "-svariable-end=%>", "-h"]
        );
        assert_eq!(normalize(&["envrender", "-help"]), ["envrender", "--help"]);
    }

    #[test]
    fn test_switch_values() {
        assert_eq!(
            normalize(&["envrender", "-clear-env=true", "-exec=true", "env", "-i"]),
            ["envrender", "--clear-env=true", "--exec=true", "--", "env", "-i"]
        );
        assert_eq!(
            normalize(&["envrender", "-exec", "true"]),
            ["envrender", "--exec", "--", "true"]
        );
    }

    #[test]
    fn test_switch_values_parse() {
        let mut cmd = make_command();
        cmd.build();
        let args = normalize_args(
            &cmd,
            [
                "envrender",
                "-template=a",
                "-out=b",
                "-exec=true",
                "-clear-env=false",
                "-strict",
                "-env=0",
                "true",
            ],
        );
        let matches = cmd.try_get_matches_from(args).unwrap();
        assert!(matches.get_flag("exec"));
        assert!(!matches.get_flag("clear-env"));
        assert!(matches.get_flag("strict"));
        assert!(!matches.get_flag("env"));
        assert!(!matches.get_flag("trim-blocks"));
        let command: Vec<_> = matches.get_many::<OsString>("command").unwrap().collect();
        assert_eq!(command, ["true"]);
    }

    #[test]
    fn test_unknown_flags_pass_through() {
        assert_eq!(
            normalize(&["envrender", "-bogus", "x"]),
            ["envrender", "-bogus", "--", "x"]
        );
    }
}
