//! Purpose: `shelfkeep` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, reports errors.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All library state lives inside the server; the CLI holds none.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::json;

mod command_dispatch;
mod library_json;
mod serve;

use library_json::{error_json, error_message};
use shelfkeep::api::{DEFAULT_LOAN_DAYS, Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `shelfkeep --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "shelfkeep",
    version,
    about = "Catalog, membership and loan tracking for a small lending library",
    long_about = None,
    after_help = r#"EXAMPLES
  $ shelfkeep serve                                   # seeded library on 127.0.0.1:5000
  $ shelfkeep serve --loan-days 21 --require-known-user
  $ shelfkeep serve check --json

NOTES
  - State lives in memory only and is reset to the seed dataset on every start"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics; `always` also pretty-prints JSON: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the library over HTTP (loopback default)",
        long_about = r#"Serve the library over HTTP.

Routes: /, /libros, /libros/agregar, /usuarios, /usuarios/agregar, /prestamos,
/prestamos/realizar, /prestamos/devolver/<loan_id>, /buscar, /estadisticas, /healthz."#,
        after_help = r#"EXAMPLES
  $ shelfkeep serve
  $ shelfkeep serve --bind 127.0.0.1:8080 --empty
  $ shelfkeep serve --bind 0.0.0.0:5000 --allow-non-loopback check

NOTES
  - Mutating routes answer 303 See Other; the next page view carries the notice
  - --require-known-user rejects loans for ids that are not registered users"#
    )]
    Serve {
        #[command(subcommand)]
        subcommand: Option<ServeSubcommand>,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(about = "Print version info as JSON")]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ shelfkeep completion bash > ~/.local/share/bash-completion/completions/shelfkeep
  $ shelfkeep completion zsh > ~/.zfunc/_shelfkeep"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ServeSubcommand {
    #[command(
        about = "Validate serve config and print effective settings without starting",
        after_help = r#"NOTES
  - Exits non-zero when config is invalid
  - Does not bind sockets"#
    )]
    Check {
        #[arg(long, help = "Emit JSON instead of human-readable output")]
        json: bool,
    },
}

#[derive(Args)]
struct ServeRunArgs {
    #[arg(
        long,
        default_value = "127.0.0.1:5000",
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Permit binding to non-loopback addresses",
        help_heading = "Connection"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = 64 * 1024,
        help = "Maximum request body size in bytes",
        help_heading = "Connection"
    )]
    max_body_bytes: u64,
    #[arg(
        long,
        default_value_t = DEFAULT_LOAN_DAYS,
        help = "Days until a new loan is due",
        help_heading = "Lending"
    )]
    loan_days: u32,
    #[arg(
        long,
        help = "Reject loans for borrowers that are not registered users",
        help_heading = "Lending"
    )]
    require_known_user: bool,
    #[arg(
        long,
        help = "Start with an empty catalog and no users",
        help_heading = "Lending"
    )]
    empty: bool,
}

fn serve_config_from_run_args(run: ServeRunArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:5000.")
    })?;
    let config = serve::ServeConfig {
        bind,
        allow_non_loopback: run.allow_non_loopback,
        loan_days: run.loan_days,
        require_known_user: run.require_known_user,
        seed: !run.empty,
        max_body_bytes: run.max_body_bytes,
    };
    serve::validate_config(&config)?;
    Ok(config)
}

fn emit_serve_check_report(config: &serve::ServeConfig, color_mode: ColorMode, json: bool) {
    if !json {
        for line in build_serve_check_lines(config) {
            println!("{line}");
        }
        return;
    }

    let base_url = format!("http://{}", config.bind);
    emit_json(
        json!({
            "check": {
                "status": "valid",
                "listen": config.bind.to_string(),
                "base_url": base_url,
                "seed": config.seed,
                "lending": {
                    "loan_days": config.loan_days,
                    "require_known_user": config.require_known_user,
                },
                "limits": {
                    "max_body_bytes": config.max_body_bytes,
                }
            }
        }),
        color_mode,
    );
}

fn build_serve_check_lines(config: &serve::ServeConfig) -> Vec<String> {
    let borrowers = if config.require_known_user {
        "registered users only"
    } else {
        "any id"
    };
    let data = if config.seed { "seed dataset" } else { "empty" };
    vec![
        "Configuration valid.".to_string(),
        String::new(),
        format!("  Bind:    {} ({})", config.bind, serve_scope(config)),
        format!("  Lending: {} days, borrowers: {borrowers}", config.loan_days),
        format!("  Start:   {data}, body limit {} bytes", config.max_body_bytes),
        String::new(),
        "Start with: shelfkeep serve".to_string(),
    ]
}

fn serve_scope(config: &serve::ServeConfig) -> &'static str {
    let ip = config.bind.ip();
    if ip.is_loopback() {
        "loopback only"
    } else if ip.is_unspecified() {
        "all interfaces"
    } else {
        "network reachable"
    }
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("shelfkeep {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "shelfkeep",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_completion(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::aot::generate(shell, &mut cmd, "shelfkeep", &mut io::stdout());
}

fn emit_json(value: serde_json::Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
