#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually (no external dependencies) to keep the binary lean.
//! Supports environment variable overrides via `TREEWATCH_*` prefix.

use std::env;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
treewatch demo — guarded observation over a live document tree

USAGE:
    treewatch-demo [OPTIONS]

The demo builds a small document, registers a guarded observer on it, runs
a scripted batch of mutations, and then deliberately misuses the observer
surface to show that every bad call degrades to a diagnostic instead of a
raised error.

OPTIONS:
    --jsonl=PATH     Append guard diagnostics as JSONL to PATH
    --strict         Drive the raw subsystem instead of the guard; the
                     first fault aborts with a nonzero exit
    --log=FILTER     Tracing filter directive (default: info)
    --help, -h       Show this help message
    --version, -V    Show version

ENVIRONMENT VARIABLES:
    TREEWATCH_LOG    Override --log
    TREEWATCH_JSONL  Override --jsonl";

/// Parsed command-line options.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Tracing filter directive.
    pub log_filter: String,
    /// JSONL diagnostics path (None = diagnostics via tracing).
    pub jsonl: Option<String>,
    /// Run the misuse script against the raw, unguarded subsystem.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            jsonl: None,
            strict: false,
        }
    }
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are
    /// overridden by explicit command-line flags.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(ParseError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(ParseError::Version) => {
                println!("treewatch-demo {VERSION}");
                process::exit(0);
            }
            Err(ParseError::InvalidValue { flag, value }) => {
                eprintln!("Invalid {flag} value: {value}");
                process::exit(1);
            }
            Err(ParseError::UnknownArg(arg)) => {
                eprintln!("Unknown argument: {arg}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        // Apply environment variable defaults first
        if let Some(val) = get_env("TREEWATCH_LOG")
            && !val.trim().is_empty()
        {
            opts.log_filter = val;
        }
        if let Some(val) = get_env("TREEWATCH_JSONL")
            && !val.trim().is_empty()
        {
            opts.jsonl = Some(val);
        }

        // Parse command-line args (override env vars)
        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => {
                    return Err(ParseError::Help);
                }
                "--version" | "-V" => {
                    return Err(ParseError::Version);
                }
                "--strict" => {
                    opts.strict = true;
                }
                other => {
                    if let Some(val) = other.strip_prefix("--jsonl=") {
                        if val.trim().is_empty() {
                            return Err(ParseError::InvalidValue {
                                flag: "--jsonl",
                                value: val.to_string(),
                            });
                        }
                        opts.jsonl = Some(val.to_string());
                    } else if let Some(val) = other.strip_prefix("--log=") {
                        if val.trim().is_empty() {
                            return Err(ParseError::InvalidValue {
                                flag: "--log",
                                value: val.to_string(),
                            });
                        }
                        opts.log_filter = val.to_string();
                    } else {
                        return Err(ParseError::UnknownArg(other.to_string()));
                    }
                }
            }
        }

        Ok(opts)
    }
}
