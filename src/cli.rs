//! Command-line interface for remote-shell.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Remote host name or address.
    pub host: Option<String>,
    /// Remote SSH port.
    pub port: Option<u16>,
    /// Login user.
    pub user: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Accept any host key.
    pub insecure: bool,
    /// Known-hosts file for strict verification.
    pub known_hosts: Option<PathBuf>,
    /// Run this command once instead of starting an interactive session.
    pub exec: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Drain strategy name (`quiet` or `shortfall`).
    pub drain: Option<String>,
    /// Quiet period in milliseconds.
    pub quiet_ms: Option<u64>,
    /// Read chunk size in bytes.
    pub chunk_size: Option<usize>,
    /// Per-command timeout in seconds.
    pub timeout: Option<u64>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_number(&mut parser, "port")?);
            }
            Short('u') | Long("user") => {
                result.user = Some(parser.value()?.parse()?);
            }
            Short('P') | Long("password") => {
                result.password = Some(parser.value()?.parse()?);
            }
            Long("insecure") => {
                result.insecure = true;
            }
            Long("known-hosts") => {
                result.known_hosts = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("exec") => {
                result.exec = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("drain") => {
                let value: String = parser.value()?.parse()?;
                if !matches!(value.as_str(), "quiet" | "shortfall") {
                    return Err(ArgsError::InvalidValue("drain", value));
                }
                result.drain = Some(value);
            }
            Long("quiet-ms") => {
                result.quiet_ms = Some(parse_number(&mut parser, "quiet-ms")?);
            }
            Long("chunk-size") => {
                let size: usize = parse_number(&mut parser, "chunk-size")?;
                if size == 0 {
                    return Err(ArgsError::InvalidValue("chunk-size", "0".into()));
                }
                result.chunk_size = Some(size);
            }
            Short('t') | Long("timeout") => {
                result.timeout = Some(parse_number(&mut parser, "timeout")?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_number<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"remote-shell {version}
Run commands on a remote host over SSH

USAGE:
    remote-shell -H <HOST> -u <USER> [OPTIONS]

OPTIONS:
    -H, --host <HOST>       Remote host
    -p, --port <PORT>       Remote SSH port [default: 22]
    -u, --user <USER>       Login user
    -P, --password <PASS>   Login password
        --insecure          Accept any host key
        --known-hosts <F>   Known-hosts file for host key verification
    -e, --exec <CMD>        Run one command, wait for it to exit, print its output
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --drain <MODE>      Output completion rule: quiet | shortfall [default: quiet]
        --quiet-ms <MS>     Silence that ends a command's output [default: 250]
        --chunk-size <N>    Read chunk size in bytes [default: 1024]
    -t, --timeout <SECS>    Per-command timeout [default: 300]
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    REMOTE_SHELL_HOST       Remote host (overrides config)
    REMOTE_SHELL_PORT       Remote port (overrides config)
    REMOTE_SHELL_USER       Login user (overrides config)
    REMOTE_SHELL_PASSWORD   Login password
    REMOTE_SHELL_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                Alternative log level setting

INTERACTIVE MODE:
    Without --exec, commands are read line by line from stdin and each
    command's output is printed once it is complete. Type `quit` or send
    EOF to end the session.

EXAMPLES:
    # One-shot
    remote-shell -H build01 -u deploy -e 'uname -a'

    # Interactive session against a host missing from known_hosts
    remote-shell -H 10.0.0.7 -u root --insecure
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("remote-shell {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
