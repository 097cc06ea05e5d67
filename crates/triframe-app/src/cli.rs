// SPDX-License-Identifier: CEPL-1.0
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{ArgAction, Parser};
use thiserror::Error;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "triframe",
    version,
    about = "Clears a window through a triple-buffered Direct3D 12 swap chain",
    disable_help_flag = true,
    args_override_self = true
)]
pub struct Args {
    /// Client width in pixels [default: 1280]
    #[arg(short = 'w', long)]
    pub width: Option<u32>,

    /// Client height in pixels [default: 720]
    #[arg(short = 'h', long)]
    pub height: Option<u32>,

    /// Render on the WARP software adapter
    #[arg(long)]
    pub warp: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidArgument {
    pub token: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{} invalid command line argument(s)", .0.len())]
    InvalidArguments(Vec<InvalidArgument>),

    /// `--help` / `--version`; not a failure.
    #[error("{0}")]
    Display(clap::Error),
}

/// `-warp` is accepted as the long flag; clap would otherwise read it as
/// `-w arp`.
fn normalize(token: String) -> String {
    if token == "-warp" {
        "--warp".to_owned()
    } else {
        token
    }
}

fn context_string(err: &clap::Error, kind: ContextKind) -> Option<String> {
    match err.get(kind) {
        Some(ContextValue::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Whether `arg` is how `token` (as clap names it) appeared on the command
/// line: verbatim, as `--flag=value`, or leading a short cluster like `-abc`.
fn spells(arg: &str, token: &str) -> bool {
    if arg == token {
        return true;
    }
    if let Some(rest) = arg.strip_prefix(token) {
        let short = token.len() == 2 && token.starts_with('-') && !token.starts_with("--");
        return rest.starts_with('=') || (short && !arg.starts_with("--"));
    }
    false
}

/// Parses `argv` (program name first). Every unknown token is collected
/// before failing; a bad value stops collection at that point.
pub fn parse<I, T>(argv: I) -> Result<Args, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut iter = argv.into_iter().map(Into::into);
    let mut argv: Vec<String> = iter.next().into_iter().collect();
    argv.extend(iter.map(normalize));

    let mut invalid = Vec::new();
    loop {
        let err = match Args::try_parse_from(&argv) {
            Ok(args) if invalid.is_empty() => return Ok(args),
            Ok(_) => return Err(CliError::InvalidArguments(invalid)),
            Err(err) => err,
        };
        let reason = err.kind().as_str().unwrap_or("invalid argument").to_owned();

        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                return Err(CliError::Display(err))
            }
            ErrorKind::UnknownArgument => {
                let Some(token) = context_string(&err, ContextKind::InvalidArg) else {
                    invalid.push(InvalidArgument {
                        token: String::from("?"),
                        reason,
                    });
                    return Err(CliError::InvalidArguments(invalid));
                };

                let Some(pos) = argv
                    .iter()
                    .skip(1)
                    .position(|arg| spells(arg, &token))
                    .map(|i| i + 1)
                else {
                    invalid.push(InvalidArgument { token, reason });
                    return Err(CliError::InvalidArguments(invalid));
                };
                // Report the argv entry itself and drop only that one.
                let token = argv.remove(pos);
                invalid.push(InvalidArgument { token, reason });
            }
            _ => {
                let token = context_string(&err, ContextKind::InvalidValue)
                    .or_else(|| context_string(&err, ContextKind::InvalidArg))
                    .unwrap_or_else(|| String::from("?"));
                invalid.push(InvalidArgument { token, reason });
                return Err(CliError::InvalidArguments(invalid));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(tokens: &[&str]) -> Result<Args, CliError> {
        parse(std::iter::once("triframe").chain(tokens.iter().copied()))
    }

    fn invalid_tokens(tokens: &[&str]) -> Vec<String> {
        match parse_args(tokens) {
            Err(CliError::InvalidArguments(list)) => list.into_iter().map(|a| a.token).collect(),
            other => panic!("expected invalid arguments, got {other:?}"),
        }
    }

    #[test]
    fn short_flags_and_warp() {
        let args = parse_args(&["-w", "800", "-h", "600", "--warp"]).unwrap();
        assert_eq!(args.width, Some(800));
        assert_eq!(args.height, Some(600));
        assert!(args.warp);
    }

    #[test]
    fn long_flags_and_single_dash_warp() {
        let args = parse_args(&["--width", "1024", "--height=768", "-warp"]).unwrap();
        assert_eq!(args.width, Some(1024));
        assert_eq!(args.height, Some(768));
        assert!(args.warp);
    }

    #[test]
    fn nothing_given_leaves_defaults_to_config() {
        let args = parse_args(&[]).unwrap();
        assert_eq!(args.width, None);
        assert_eq!(args.height, None);
        assert!(!args.warp);
    }

    #[test]
    fn unknown_flag_is_reported() {
        assert_eq!(invalid_tokens(&["--bogus"]), vec!["--bogus"]);
    }

    #[test]
    fn every_unknown_token_is_listed() {
        assert_eq!(
            invalid_tokens(&["--bogus", "-w", "640", "stray"]),
            vec!["--bogus", "stray"]
        );
    }

    #[test]
    fn repeated_option_keeps_last_value() {
        let args = parse_args(&["-w", "800", "-w", "900", "--warp", "-warp"]).unwrap();
        assert_eq!(args.width, Some(900));
        assert!(args.warp);
    }

    #[test]
    fn short_cluster_is_reported_as_typed() {
        assert_eq!(invalid_tokens(&["-abc"]), vec!["-abc"]);
    }

    #[test]
    fn repeated_unknown_token_is_listed_each_time() {
        assert_eq!(
            invalid_tokens(&["--bogus", "-w", "640", "--bogus", "--bogus=1"]),
            vec!["--bogus", "--bogus", "--bogus=1"]
        );
    }

    #[test]
    fn bad_and_missing_values_are_invalid() {
        assert_eq!(invalid_tokens(&["-w", "wide"]), vec!["wide"]);
        assert_eq!(invalid_tokens(&["-h"]).len(), 1);
    }

    #[test]
    fn help_is_not_an_error_list() {
        assert!(matches!(parse_args(&["--help"]), Err(CliError::Display(_))));
    }
}
