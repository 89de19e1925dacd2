use std::env;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Error};
use clap::parser::ValueSource;
use clap::ArgMatches;
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

use crate::output::FileMode;

/// Overrides specific syntax settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SyntaxElements {
    block_start: String,
    block_end: String,
    variable_start: String,
    variable_end: String,
    comment_start: String,
    comment_end: String,
    line_statement_prefix: String,
    line_comment_prefix: String,
}

impl Default for SyntaxElements {
    fn default() -> Self {
        SyntaxElements {
            block_start: "{%".to_string(),
            block_end: "%}".to_string(),
            variable_start: "{{".to_string(),
            variable_end: "}}".to_string(),
            comment_start: "{#".to_string(),
            comment_end: "#}".to_string(),
            line_statement_prefix: "".to_string(),
            line_comment_prefix: "".to_string(),
        }
    }
}

/// Holds in-memory config state for the execution.
///
/// Values are layered: defaults, then the config file, then `ENVRENDER_*`
/// environment variables and finally command line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    mode: String,
    strict: bool,
    trim_blocks: bool,
    lstrip_blocks: bool,
    env: bool,
    py_compat: bool,
    fuel: u64,
    syntax: SyntaxElements,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: "0600".to_string(),
            strict: false,
            trim_blocks: false,
            lstrip_blocks: false,
            env: false,
            py_compat: false,
            fuel: 0,
            syntax: Default::default(),
        }
    }
}

impl Config {
    pub fn load_from_toml(p: &Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(p)
            .with_context(|| format!("unable to read config file '{}'", p.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("invalid config file '{}'", p.display()))?;
        Ok(cfg)
    }

    pub fn update_from_matches(&mut self, matches: &ArgMatches) -> Result<(), Error> {
        if let Some(mode) = matches.get_one::<String>("mode") {
            self.mode = mode.clone();
        }
        set_from_switch(&mut self.strict, matches, "strict");
        set_from_switch(&mut self.trim_blocks, matches, "trim-blocks");
        set_from_switch(&mut self.lstrip_blocks, matches, "lstrip-blocks");
        set_from_switch(&mut self.env, matches, "env");
        #[cfg(feature = "contrib")]
        {
            set_from_switch(&mut self.py_compat, matches, "py-compat");
        }
        if let Some(fuel) = matches.get_one::<u64>("fuel") {
            self.fuel = *fuel;
        }

        let mut iter = matches.get_many::<String>("syntax");
        if let Some(ref mut iter) = iter {
            self.update_syntax_from_pairs(iter.map(|x| x.as_str()))?;
        }
        Ok(())
    }

    pub fn update_from_env(&mut self) -> Result<(), Error> {
        self.update_from_vars(|key| env::var(key).ok())
    }

    fn update_from_vars<F>(&mut self, var: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = var("ENVRENDER_MODE") {
            self.mode = mode;
        }
        if let Some(strict) = var("ENVRENDER_STRICT") {
            self.strict = parse_env_bool(&strict, "ENVRENDER_STRICT")?;
        }
        if let Some(trim_blocks) = var("ENVRENDER_TRIM_BLOCKS") {
            self.trim_blocks = parse_env_bool(&trim_blocks, "ENVRENDER_TRIM_BLOCKS")?;
        }
        if let Some(lstrip_blocks) = var("ENVRENDER_LSTRIP_BLOCKS") {
            self.lstrip_blocks = parse_env_bool(&lstrip_blocks, "ENVRENDER_LSTRIP_BLOCKS")?;
        }
        if let Some(env_flag) = var("ENVRENDER_ENV") {
            self.env = parse_env_bool(&env_flag, "ENVRENDER_ENV")?;
        }
        if let Some(py_compat) = var("ENVRENDER_PY_COMPAT") {
            self.py_compat = parse_env_bool(&py_compat, "ENVRENDER_PY_COMPAT")?;
        }
        if let Some(fuel) = var("ENVRENDER_FUEL") {
            self.fuel = fuel
                .parse()
                .map_err(|_| anyhow!("Invalid fuel value for ENVRENDER_FUEL: {}", fuel))?;
        }
        if let Some(syntax) = var("ENVRENDER_SYNTAX") {
            self.update_syntax_from_pairs(syntax.split_whitespace())?;
        }
        Ok(())
    }

    pub fn mode(&self) -> Result<FileMode, Error> {
        self.mode
            .parse()
            .with_context(|| format!("couldn't parse --mode '{}'", self.mode))
    }

    pub fn expose_env(&self) -> bool {
        self.env
    }

    pub fn apply_to_env(&self, env: &mut Environment) -> Result<(), Error> {
        env.set_trim_blocks(self.trim_blocks);
        env.set_lstrip_blocks(self.lstrip_blocks);
        if self.fuel > 0 {
            env.set_fuel(Some(self.fuel));
        }

        #[cfg(feature = "contrib")]
        {
            minijinja_contrib::add_to_environment(env);
            if self.py_compat {
                env.set_unknown_method_callback(
                    minijinja_contrib::pycompat::unknown_method_callback,
                );
            }
        }

        // config files are written verbatim, whatever their extension
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });
        env.set_syntax(self.make_syntax()?);
        Ok(())
    }

    fn make_syntax(&self) -> Result<SyntaxConfig, Error> {
        let s = &self.syntax;
        SyntaxConfig::builder()
            .block_delimiters(s.block_start.clone(), s.block_end.clone())
            .variable_delimiters(s.variable_start.clone(), s.variable_end.clone())
            .comment_delimiters(s.comment_start.clone(), s.comment_end.clone())
            .line_statement_prefix(s.line_statement_prefix.clone())
            .line_comment_prefix(s.line_comment_prefix.clone())
            .build()
            .context("could not configure syntax")
    }

    fn update_syntax_from_pairs<'a, I>(&mut self, iter: I) -> Result<(), Error>
    where
        I: Iterator<Item = &'a str>,
    {
        let s = &mut self.syntax;

        for pair in iter {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("syntax feature needs to be a key=value pair"))?;

            *match key {
                "block-start" => &mut s.block_start,
                "block-end" => &mut s.block_end,
                "variable-start" => &mut s.variable_start,
                "variable-end" => &mut s.variable_end,
                "comment-start" => &mut s.comment_start,
                "comment-end" => &mut s.comment_end,
                "line-statement-prefix" => &mut s.line_statement_prefix,
                "line-comment-prefix" => &mut s.line_comment_prefix,
                _ => bail!("unknown syntax feature '{}'", key),
            } = value.to_string();
        }

        Ok(())
    }
}

/// Only switches given on the command line override the config, and they can
/// also turn a setting off (`--strict=false`).
fn set_from_switch(target: &mut bool, matches: &ArgMatches, id: &str) {
    if matches.value_source(id) == Some(ValueSource::CommandLine) {
        *target = matches.get_flag(id);
    }
}

fn parse_env_bool(s: &str, var_name: &str) -> Result<bool, Error> {
    match s.to_lowercase().as_str() {
        "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => bail!("Invalid boolean value for {}: {}", var_name, s),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode().unwrap(), FileMode::from_bits(0o600));
        assert!(!config.expose_env());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .update_from_vars(vars(&[
                ("ENVRENDER_MODE", "0640"),
                ("ENVRENDER_ENV", "yes"),
                ("ENVRENDER_STRICT", "ON"),
                ("ENVRENDER_FUEL", "100"),
                ("ENVRENDER_SYNTAX", "variable-start=${ variable-end=}"),
            ]))
            .unwrap();
        assert_eq!(config.mode().unwrap(), FileMode::from_bits(0o640));
        assert!(config.expose_env());
        assert!(config.strict);
        assert_eq!(config.fuel, 100);
        assert_eq!(config.syntax.variable_start, "${");
        assert_eq!(config.syntax.variable_end, "}");
    }

    #[test]
    fn test_invalid_env_bool() {
        let mut config = Config::default();
        let err = config
            .update_from_vars(vars(&[("ENVRENDER_TRIM_BLOCKS", "maybe")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid boolean value for ENVRENDER_TRIM_BLOCKS: maybe"
        );
    }

    #[test]
    fn test_unknown_syntax_feature() {
        let mut config = Config::default();
        let err = config
            .update_syntax_from_pairs(["bogus=1"].into_iter())
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown syntax feature 'bogus'");
    }

    #[test]
    fn test_toml_roundtrip_keys() {
        let config: Config = toml::from_str(
            r#"
            mode = "0644"
            trim-blocks = true

            [syntax]
            block-start = "<%"
            block-end = "%>"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode().unwrap(), FileMode::from_bits(0o644));
        assert!(config.trim_blocks);
        assert_eq!(config.syntax.block_start, "<%");
        assert_eq!(config.syntax.variable_start, "{{");
    }

    fn matches(args: &[&str]) -> ArgMatches {
        let mut cmd = crate::cli::make_command();
        cmd.build();
        let args = crate::args::normalize_args(&cmd, args.iter().copied());
        cmd.try_get_matches_from(args).unwrap()
    }

    #[test]
    fn test_switches_override_config() {
        let mut config: Config = toml::from_str("strict = true\nenv = true").unwrap();
        config
            .update_from_matches(&matches(&["envrender", "-strict=false", "-trim-blocks"]))
            .unwrap();
        assert!(!config.strict);
        assert!(config.trim_blocks);
        // not given on the command line, so the file value stays
        assert!(config.env);
    }

    #[test]
    fn test_bad_mode() {
        let config: Config = toml::from_str(r#"mode = "rw-r--r--""#).unwrap();
        let err = config.mode().unwrap_err();
        assert_eq!(err.to_string(), "couldn't parse --mode 'rw-r--r--'");
    }
}
