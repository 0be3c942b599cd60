use std::io::{BufRead, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde_json::{Value, json};

use devsolo::config::LogLevel;
use devsolo::tools::{self, ToolResult, ToolRuntime};

mod cli;

use cli::{Cli, Commands};

/// Resolve the log filter: `DEBUG=1` wins, then `LOG_LEVEL`, then the
/// configured preference.
fn log_filter(configured: LogLevel) -> &'static str {
    if std::env::var("DEBUG").is_ok_and(|v| v == "1") {
        return "debug";
    }
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|raw| raw.parse::<LogLevel>().ok())
        .unwrap_or(configured)
        .filter()
}

fn init_logger(configured: LogLevel) {
    env_logger::Builder::new()
        .parse_filters(log_filter(configured))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("devsolo: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let start_dir = cli
        .directory
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    // `tools` needs no repository; everything else does.
    if matches!(cli.command, Commands::Tools) {
        init_logger(LogLevel::default());
        return list_tools();
    }

    let rt = ToolRuntime::initialize(&start_dir)
        .context("failed to open the repository and workspace")?;
    init_logger(rt.config().preferences.log_level);

    match &cli.command {
        Commands::Serve => serve(&rt),
        Commands::Run { tool, params } => {
            let params = match params {
                Some(raw) => serde_json::from_str(raw).context("invalid --params JSON")?,
                None => Value::Null,
            };
            let result = tools::dispatch(&rt, tool, params);
            print_result(&result)?;
            Ok(result.success)
        }
        Commands::Tools => unreachable!("handled above"),
        command => {
            let (tool, params) = command
                .as_tool_call()
                .expect("every remaining subcommand maps to a tool");
            let result = tools::dispatch(&rt, tool, params);
            print_result(&result)?;
            Ok(result.success)
        }
    }
}

fn list_tools() -> anyhow::Result<bool> {
    let listing: Vec<Value> = tools::registry()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "inputSchema": tool.input_schema(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(true)
}

fn print_result(result: &ToolResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// The line-oriented JSON transport: one request object per stdin line,
/// one ToolResult per stdout line. Malformed requests produce a structured
/// failure, never a crash.
fn serve(rt: &ToolRuntime) -> anyhow::Result<bool> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    log::info!("devsolo transport ready ({} tools)", tools::registry().len());

    for line in stdin.lock().lines() {
        let line = line.context("failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<Value>(&line) {
            Ok(request) => {
                let tool = request
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                if tool.is_empty() {
                    ToolResult::error(
                        tools::ErrorKind::UnknownTool,
                        "request is missing the \"tool\" field",
                    )
                } else {
                    tools::dispatch(rt, &tool, params)
                }
            }
            Err(e) => ToolResult::error(
                tools::ErrorKind::Internal,
                format!("malformed request line: {e}"),
            ),
        };
        serde_json::to_writer(&mut stdout, &result)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }
    Ok(true)
}
