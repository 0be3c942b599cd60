//! Named auto-stashes tagged by workflow reason.
//!
//! Stash messages follow the literal template
//! `devsolo auto-stash (<reason>) [<branch>] - <ISO-8601>` so devsolo's own
//! stashes can be told apart from the user's. The stash ref recorded on a
//! session is a weak handle: a missing stash is reported, never fatal.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::git::{GitResult, Repository, StashEntry};
use crate::session::StashReason;
use crate::utils;

static STASH_MESSAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"devsolo auto-stash \((swap|launch|abort)\) \[([^\]]*)\] - (\S+)")
        .expect("stash message regex is valid")
});

/// A stash taken on behalf of a workflow, with the ref callers must keep
/// for a later targeted pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashHandle {
    /// Opaque ref of form `stash@{N}`.
    pub stash_ref: String,
    pub message: String,
}

/// A devsolo stash recognized in the stash stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevsoloStash {
    pub stash_ref: String,
    pub reason: StashReason,
    pub branch: String,
}

/// Build the literal auto-stash message.
pub fn stash_message(reason: StashReason, branch: &str, now: DateTime<Utc>) -> String {
    format!(
        "devsolo auto-stash ({reason}) [{branch}] - {}",
        utils::format_iso8601(now)
    )
}

/// Parse a stash message produced by [`stash_message`].
pub fn parse_stash_message(message: &str) -> Option<(StashReason, String)> {
    let captures = STASH_MESSAGE_RE.captures(message)?;
    let reason = captures[1].parse().ok()?;
    Some((reason, captures[2].to_string()))
}

/// Stash operations bound to one repository.
pub struct StashManager<'a> {
    repo: &'a Repository,
}

impl<'a> StashManager<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Whether there is anything to stash.
    pub fn has_uncommitted_changes(&self) -> GitResult<bool> {
        self.repo.has_uncommitted_changes()
    }

    /// Stash the working tree under a reason-tagged message.
    ///
    /// `branch` defaults to the current branch.
    pub fn stash_changes(
        &self,
        reason: StashReason,
        branch: Option<&str>,
    ) -> GitResult<StashHandle> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self
                .repo
                .current_branch()?
                .unwrap_or_else(|| "detached".to_string()),
        };
        let message = stash_message(reason, &branch, utils::now());
        let stash_ref = self.repo.stash_push(&message)?;
        log::debug!("stashed changes as {stash_ref}: {message}");
        Ok(StashHandle { stash_ref, message })
    }

    /// Pop a specific stash entry back onto the working tree.
    pub fn pop_stash(&self, stash_ref: &str) -> GitResult<()> {
        self.repo.stash_pop(stash_ref)
    }

    /// Drop a specific stash entry.
    pub fn delete_stash(&self, stash_ref: &str) -> GitResult<()> {
        self.repo.stash_drop(stash_ref)
    }

    /// All entries in the stash stack.
    pub fn list_stashes(&self) -> GitResult<Vec<StashEntry>> {
        self.repo.stash_list()
    }

    /// Entries whose message matches the devsolo auto-stash template.
    pub fn devsolo_stashes(&self) -> GitResult<Vec<DevsoloStash>> {
        Ok(self
            .list_stashes()?
            .into_iter()
            .filter_map(|entry| {
                parse_stash_message(&entry.message).map(|(reason, branch)| DevsoloStash {
                    stash_ref: entry.stash_ref,
                    reason,
                    branch,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_template_literal_form() {
        let now = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let message = stash_message(StashReason::Swap, "feature/a", now);
        assert_eq!(
            message,
            "devsolo auto-stash (swap) [feature/a] - 2020-09-13T12:26:40Z"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let now = utils::now();
        for reason in [StashReason::Swap, StashReason::Launch, StashReason::Abort] {
            let message = stash_message(reason, "feature/x", now);
            let (parsed_reason, branch) = parse_stash_message(&message).unwrap();
            assert_eq!(parsed_reason, reason);
            assert_eq!(branch, "feature/x");
        }
    }

    #[test]
    fn test_parse_rejects_foreign_messages() {
        assert!(parse_stash_message("WIP on main: 1234abc tweak").is_none());
        assert!(parse_stash_message("devsolo auto-stash (other) [x] - t").is_none());
    }

    #[test]
    fn test_parse_tolerates_git_prefix() {
        // `git stash list` prepends "On <branch>: " to the message
        let message = "On feature/a: devsolo auto-stash (swap) [feature/a] - 2020-09-13T12:26:40Z";
        let (reason, branch) = parse_stash_message(message).unwrap();
        assert_eq!(reason, StashReason::Swap);
        assert_eq!(branch, "feature/a");
    }
}
