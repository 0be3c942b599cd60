//! Command-line interface definition.
//!
//! Every workflow tool is reachable two ways: a direct subcommand with
//! typed flags, or `devsolo run <tool> --params <json>` with the raw
//! parameter object. `devsolo serve` speaks the line-oriented JSON
//! transport for MCP hosts and editor plugins.

use clap::builder::styling::{AnsiColor, Color, Styles};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use devsolo::config::ConfigScope;

/// Help styles matching the terminal palette.
fn help_styles() -> Styles {
    Styles::styled()
        .header(
            anstyle_new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .usage(
            anstyle_new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .literal(
            anstyle_new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .placeholder(anstyle_new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
}

fn anstyle_new() -> clap::builder::styling::Style {
    clap::builder::styling::Style::new()
}

#[derive(Parser)]
#[command(
    name = "devsolo",
    version,
    about = "Opinionated single-trunk Git workflow automation",
    styles = help_styles()
)]
pub struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', long = "directory", global = true, value_name = "PATH")]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve tools over the line-oriented JSON transport (stdin/stdout)
    Serve,
    /// Invoke a tool by dotted name with a raw JSON parameter object
    Run {
        /// Tool name, e.g. workflow.launch
        tool: String,
        /// JSON object of parameters
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },
    /// List registered tools and their input schemas
    Tools,
    /// Initialize the devsolo workspace
    Init {
        /// Workspace scope
        #[arg(long, value_enum)]
        scope: Option<ConfigScope>,
        /// Re-initialize an existing workspace
        #[arg(long)]
        force: bool,
    },
    /// Start a feature branch and session off trunk
    Launch {
        /// Explicit branch name (derived from the description when absent)
        #[arg(long)]
        branch_name: Option<String>,
        /// What the work is about
        #[arg(long)]
        description: Option<String>,
        /// Proceed despite failed pre-flight checks
        #[arg(long)]
        force: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Commit changes on the session branch
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
        /// Commit only what is already staged
        #[arg(long)]
        staged_only: bool,
        /// Proceed despite failed pre-flight checks
        #[arg(long)]
        force: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Push, open the PR, wait for CI, squash-merge, and clean up
    Ship {
        /// Commit message for a dirty tree (also seeds the PR title)
        #[arg(short, long)]
        message: Option<String>,
        /// Pull request body
        #[arg(long)]
        pr_description: Option<String>,
        /// Commit only what is already staged
        #[arg(long)]
        staged_only: bool,
        /// Skip the push step
        #[arg(long)]
        no_push: bool,
        /// Skip PR creation (implies no merge)
        #[arg(long)]
        no_create_pr: bool,
        /// Stop after PR creation; do not wait for CI or merge
        #[arg(long)]
        no_merge: bool,
        /// Proceed despite failed pre-flight checks
        #[arg(long)]
        force: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Switch to another session's branch
    Swap {
        /// Target branch
        branch_name: String,
        /// Stash a dirty tree on the way out
        #[arg(long)]
        stash: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Abort the session on a branch
    Abort {
        /// Branch whose session to abort (default: current)
        #[arg(long)]
        branch_name: Option<String>,
        /// Also delete the feature branch
        #[arg(long)]
        delete_branch: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Start an expedited hotfix branch off trunk
    Hotfix {
        /// What is broken
        issue: String,
        /// low | medium | high | critical
        #[arg(long, default_value = "medium")]
        severity: String,
        /// Proceed despite failed pre-flight checks
        #[arg(long)]
        force: bool,
        /// Accept recommended options without prompting
        #[arg(long)]
        auto: bool,
    },
    /// Delete finished sessions, orphaned branches, and stale locks
    Cleanup {
        /// Also delete orphaned local branches
        #[arg(long)]
        delete_branches: bool,
        /// Only collect sessions idle at least this many days
        #[arg(long, value_name = "DAYS")]
        older_than: Option<i64>,
        /// Propose only; never delete
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation phase
        #[arg(long)]
        auto: bool,
        /// Confirm a previous proposal
        #[arg(long)]
        confirm: bool,
    },
    /// Show the current (or named, or all) workflow session(s)
    Status {
        /// Branch to report on (default: current)
        #[arg(long)]
        branch_name: Option<String>,
        /// Report every session, including finished ones
        #[arg(long)]
        all: bool,
    },
}

impl Commands {
    /// The dotted tool name and parameter object this subcommand maps to.
    /// `None` for the non-tool commands (serve, tools, run).
    pub fn as_tool_call(&self) -> Option<(&'static str, Value)> {
        match self {
            Commands::Serve | Commands::Run { .. } | Commands::Tools => None,
            Commands::Init { scope, force } => Some((
                "devsolo.init",
                json!({ "scope": scope, "force": force }),
            )),
            Commands::Launch { branch_name, description, force, auto } => Some((
                "workflow.launch",
                json!({
                    "branchName": branch_name,
                    "description": description,
                    "force": force,
                    "auto": auto,
                }),
            )),
            Commands::Commit { message, staged_only, force, auto } => Some((
                "workflow.commit",
                json!({
                    "message": message,
                    "stagedOnly": staged_only,
                    "force": force,
                    "auto": auto,
                }),
            )),
            Commands::Ship {
                message,
                pr_description,
                staged_only,
                no_push,
                no_create_pr,
                no_merge,
                force,
                auto,
            } => Some((
                "workflow.ship",
                json!({
                    "message": message,
                    "prDescription": pr_description,
                    "stagedOnly": staged_only,
                    "push": !no_push,
                    "createPR": !no_create_pr,
                    "merge": !(*no_merge || *no_create_pr),
                    "force": force,
                    "auto": auto,
                }),
            )),
            Commands::Swap { branch_name, stash, auto } => Some((
                "workflow.swap",
                json!({ "branchName": branch_name, "stash": stash, "auto": auto }),
            )),
            Commands::Abort { branch_name, delete_branch, auto } => Some((
                "workflow.abort",
                json!({
                    "branchName": branch_name,
                    "deleteBranch": delete_branch,
                    "auto": auto,
                }),
            )),
            Commands::Hotfix { issue, severity, force, auto } => Some((
                "workflow.hotfix",
                json!({
                    "issue": issue,
                    "severity": severity,
                    "force": force,
                    "auto": auto,
                }),
            )),
            Commands::Cleanup { delete_branches, older_than, dry_run, auto, confirm } => Some((
                "workflow.cleanup",
                json!({
                    "deleteBranches": delete_branches,
                    "olderThan": older_than,
                    "dryRun": dry_run,
                    "auto": auto,
                    "confirm": confirm,
                }),
            )),
            Commands::Status { branch_name, all } => Some((
                "devsolo.status",
                json!({ "branchName": branch_name, "all": all }),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_map_to_tools() {
        let cli = Cli::parse_from(["devsolo", "launch", "--description", "add auth"]);
        let (name, params) = cli.command.as_tool_call().unwrap();
        assert_eq!(name, "workflow.launch");
        assert_eq!(params["description"], "add auth");

        let cli = Cli::parse_from(["devsolo", "ship", "--no-merge"]);
        let (name, params) = cli.command.as_tool_call().unwrap();
        assert_eq!(name, "workflow.ship");
        assert_eq!(params["merge"], false);
        assert_eq!(params["push"], true);

        let cli = Cli::parse_from(["devsolo", "serve"]);
        assert!(cli.command.as_tool_call().is_none());
    }

    #[test]
    fn test_swap_requires_branch() {
        assert!(Cli::try_parse_from(["devsolo", "swap"]).is_err());
        let cli = Cli::parse_from(["devsolo", "swap", "feature/x", "--stash"]);
        let (name, params) = cli.command.as_tool_call().unwrap();
        assert_eq!(name, "workflow.swap");
        assert_eq!(params["branchName"], "feature/x");
        assert_eq!(params["stash"], true);
    }
}
