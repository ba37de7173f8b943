//! LumenKV command-line tool
//!
//! Opens a database directory and runs commands against it, either one
//! command given on the command line or a session read from stdin.

use anyhow::{bail, Context};
use lumenkv::{AofFsync, CommandHandler, Config, Database, Persistence};
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// What the arguments asked for.
struct Invocation {
    config: Config,
    /// The command to run once; empty means read commands from stdin.
    command: Vec<String>,
}

/// Takes the value following `flag`.
fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    match args.next() {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", flag),
    }
}

impl Invocation {
    /// Parses command-line arguments on top of `LUMENKV_*` environment
    /// settings. Everything after the first non-flag word is the command.
    fn from_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<Self>> {
        let mut config = Config::from_env().context("invalid LUMENKV_* environment")?;
        let mut args = args.into_iter();
        let mut command = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--url" => {
                    let url = value(&mut args, "--url")?;
                    let parsed = Config::from_connection_string(&url)?;
                    config.data_dir = parsed.data_dir;
                    config.db_name = parsed.db_name;
                }
                "--data-dir" | "-d" => config.data_dir = value(&mut args, "--data-dir")?.into(),
                "--db" | "-n" => config.db_name = value(&mut args, "--db")?,
                "--persistence" => {
                    config.persistence = value(&mut args, "--persistence")?
                        .parse::<Persistence>()
                        .context("--persistence")?;
                }
                "--fsync" => {
                    config.aof_fsync = value(&mut args, "--fsync")?
                        .parse::<AofFsync>()
                        .context("--fsync")?;
                }
                "--no-compression" => config.compression = false,
                "--help" | "-h" => {
                    print_help();
                    return Ok(None);
                }
                "--version" | "-v" => {
                    println!("lumenkv {}", lumenkv::VERSION);
                    return Ok(None);
                }
                flag if flag.starts_with("--") => {
                    print_help();
                    bail!("unknown option '{}'", flag);
                }
                _ => {
                    command.push(arg);
                    command.extend(args.by_ref());
                }
            }
        }

        Ok(Some(Self { config, command }))
    }
}

fn print_help() {
    println!(
        r#"
LumenKV - An Embedded Multi-Type Key-Value Store

USAGE:
    lumenkv [OPTIONS] [COMMAND [ARGS...]]

OPTIONS:
        --url <URL>              lumenkv:///abs/dir/name or lumenkv://rel/dir/name
    -d, --data-dir <DIR>         Data directory (default: ./data)
    -n, --db <NAME>              Database name (default: lumenkv)
        --persistence <MODE>     aof, rdb or mixed (default: mixed)
        --fsync <POLICY>         always, everysec or never (default: always)
        --no-compression         Write uncompressed snapshots
    -v, --version                Print version information
    -h, --help                   Print this help message

Options default to the LUMENKV_* environment variables when set.
Set RUST_LOG (e.g. RUST_LOG=lumenkv=debug) for log output.

EXAMPLES:
    lumenkv --db app SET greeting hello
    lumenkv --db app GET greeting
    lumenkv --db app                       # read commands from stdin
    lumenkv> ZADD board 10 ariz 7 sam
    (integer) 2
    lumenkv> ZRANGE board 0 -1 WITHSCORES
    1) "sam"
    2) "7"
    3) "ariz"
    4) "10"
"#
    );
}

/// Reads commands line by line until EOF, `QUIT` or `EXIT`.
fn session(handler: &CommandHandler) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut stdout = io::stdout().lock();

    let prompt = |out: &mut io::StdoutLock<'_>| -> io::Result<()> {
        if interactive {
            write!(out, "lumenkv> ")?;
            out.flush()?;
        }
        Ok(())
    };

    prompt(&mut stdout)?;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Some(reply) = handler.execute_line(&line) {
            writeln!(stdout, "{}", reply)?;
        }
        prompt(&mut stdout)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let Some(invocation) = Invocation::from_args(std::env::args().skip(1))? else {
        return Ok(());
    };

    let config = invocation.config;
    debug!(db = %config.identity(), "Starting");
    let db = Database::open(config.clone())
        .with_context(|| format!("failed to open {}", config.identity()))?;
    let handler = CommandHandler::new(db.clone());

    let outcome = if invocation.command.is_empty() {
        session(&handler)
    } else {
        let reply = handler.execute(invocation.command);
        println!("{}", reply);
        if reply.is_error() {
            Err(anyhow::anyhow!("command failed"))
        } else {
            Ok(())
        }
    };

    drop(handler);
    if let Err(e) = db.close() {
        error!(error = %e, "Close failed");
        return Err(e).context("failed to close the database");
    }
    outcome
}
