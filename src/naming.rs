//! Branch name generation and validation.
//!
//! Branch names follow the convention
//! `<type>/<kebab-case-slug>` where `<type>` is one of the prefixes in
//! [`BranchPrefix`]. The generator derives a conforming name from free text:
//! an explicit name wins, otherwise the description is kebab-cased with a
//! type prefix inferred from its keywords, otherwise the changed files are
//! used, otherwise a timestamp name is produced.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// The branch naming convention enforced across all tools.
pub static BRANCH_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(feature|bugfix|hotfix|release|chore|docs|test|refactor)/[a-z0-9]+(?:-[a-z0-9]+)*$")
        .expect("branch name regex is valid")
});

/// Maximum slug length; longer descriptions are truncated at a word boundary.
const MAX_SLUG_LEN: usize = 48;

/// Branch type prefixes, inferred from description keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BranchPrefix {
    Feature,
    Bugfix,
    Hotfix,
    Release,
    Chore,
    Docs,
    Test,
    Refactor,
}

/// Check a name against the branch naming convention.
pub fn is_valid_branch_name(name: &str) -> bool {
    BRANCH_NAME_RE.is_match(name)
}

/// Lower-case a free-text fragment into a kebab-case slug.
///
/// Runs of non-alphanumeric characters collapse into single dashes; leading
/// and trailing dashes are stripped.
pub fn kebab_case(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    truncate_slug(slug)
}

fn truncate_slug(slug: String) -> String {
    if slug.len() <= MAX_SLUG_LEN {
        return slug;
    }
    // Cut at the last dash before the limit so we never end mid-word.
    match slug[..MAX_SLUG_LEN].rfind('-') {
        Some(idx) if idx > 0 => slug[..idx].to_string(),
        _ => slug[..MAX_SLUG_LEN].to_string(),
    }
}

/// Infer the branch type prefix from description keywords.
///
/// Falls back to `feature` when nothing matches.
pub fn infer_prefix(description: &str) -> BranchPrefix {
    let lower = description.to_ascii_lowercase();
    let has = |words: &[&str]| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|w| words.contains(&w))
    };

    if has(&["hotfix", "urgent", "critical", "emergency"]) {
        BranchPrefix::Hotfix
    } else if has(&["fix", "fixes", "bug", "bugfix", "broken", "repair", "crash", "regression"]) {
        BranchPrefix::Bugfix
    } else if has(&["release", "version"]) {
        BranchPrefix::Release
    } else if has(&["doc", "docs", "readme", "documentation", "changelog"]) {
        BranchPrefix::Docs
    } else if has(&["test", "tests", "testing", "coverage"]) {
        BranchPrefix::Test
    } else if has(&["refactor", "refactoring", "restructure", "rework", "simplify"]) {
        BranchPrefix::Refactor
    } else if has(&["chore", "bump", "upgrade", "update", "deps", "dependencies", "ci"]) {
        BranchPrefix::Chore
    } else {
        BranchPrefix::Feature
    }
}

/// Derive a branch name from the available context.
///
/// Priority: description → changed files → timestamp. The result always
/// matches [`BRANCH_NAME_RE`].
pub fn generate_branch_name(
    description: Option<&str>,
    changed_files: &[String],
    now: DateTime<Utc>,
) -> String {
    if let Some(desc) = description {
        let slug = kebab_case(desc);
        if !slug.is_empty() {
            return format!("{}/{}", infer_prefix(desc), slug);
        }
    }

    if let Some(slug) = slug_from_files(changed_files) {
        return format!("feature/{slug}");
    }

    format!("feature/{}", now.format("%Y%m%d-%H%M%S"))
}

/// Build a slug from the first changed file's stem, e.g.
/// `src/auth/login.rs` → `update-login`.
fn slug_from_files(files: &[String]) -> Option<String> {
    let first = files.first()?;
    let stem = std::path::Path::new(first).file_stem()?.to_str()?;
    let slug = kebab_case(stem);
    if slug.is_empty() {
        return None;
    }
    Some(format!("update-{slug}"))
}

/// Replacement names offered when a branch name is burned.
///
/// Burned names are permanently retired; these are the three suggested
/// successors, in recommendation order.
pub fn burned_name_suggestions(name: &str, today: &str) -> [String; 3] {
    [
        format!("{name}-v2"),
        format!("{name}-{today}"),
        format!("{name}-continued"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("feature/add-user-auth", true)]
    #[case("bugfix/login-crash", true)]
    #[case("hotfix/db-pool-leak", true)]
    #[case("chore/bump-deps", true)]
    #[case("feature/x", true)]
    #[case("feature/", false)]
    #[case("feature/Add-Auth", false)]
    #[case("feature/add--auth", false)]
    #[case("feature/-add", false)]
    #[case("wip/add-auth", false)]
    #[case("add-user-auth", false)]
    #[case("feature/add_user", false)]
    fn test_branch_name_regex(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_valid_branch_name(name), valid, "name: {name}");
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("Add User Auth"), "add-user-auth");
        assert_eq!(kebab_case("fix: login crash!!"), "fix-login-crash");
        assert_eq!(kebab_case("  spaces  "), "spaces");
        assert_eq!(kebab_case("___"), "");
        assert_eq!(kebab_case("CamelCase123"), "camelcase123");
    }

    #[test]
    fn test_kebab_case_truncates_at_word_boundary() {
        let long = "this is a very long description that keeps going and going and going";
        let slug = kebab_case(long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("this-is-a-very-long"));
    }

    #[rstest]
    #[case("add user auth", BranchPrefix::Feature)]
    #[case("fix the login crash", BranchPrefix::Bugfix)]
    #[case("urgent: db pool leak", BranchPrefix::Hotfix)]
    #[case("bump deps", BranchPrefix::Chore)]
    #[case("update readme", BranchPrefix::Docs)]
    #[case("add tests for parser", BranchPrefix::Test)]
    #[case("refactor session store", BranchPrefix::Refactor)]
    #[case("release version 2.0", BranchPrefix::Release)]
    fn test_infer_prefix(#[case] desc: &str, #[case] expected: BranchPrefix) {
        assert_eq!(infer_prefix(desc), expected);
    }

    #[test]
    fn test_generate_from_description() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let name = generate_branch_name(Some("add user auth"), &[], now);
        assert_eq!(name, "feature/add-user-auth");
        assert!(is_valid_branch_name(&name));
    }

    #[test]
    fn test_generate_from_files() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let files = vec!["src/auth/login.rs".to_string()];
        let name = generate_branch_name(None, &files, now);
        assert_eq!(name, "feature/update-login");
        assert!(is_valid_branch_name(&name));
    }

    #[test]
    fn test_generate_timestamp_fallback() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let name = generate_branch_name(None, &[], now);
        assert!(is_valid_branch_name(&name), "name: {name}");
        assert!(name.starts_with("feature/2023"));
    }

    #[test]
    fn test_generate_always_valid() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        for desc in ["!!!", "fix IT now", "a", "Добавить auth"] {
            let name = generate_branch_name(Some(desc), &[], now);
            assert!(is_valid_branch_name(&name), "desc: {desc} -> {name}");
        }
    }

    #[test]
    fn test_burned_suggestions() {
        let s = burned_name_suggestions("feature/add-user-auth", "2026-08-01");
        assert_eq!(s[0], "feature/add-user-auth-v2");
        assert_eq!(s[1], "feature/add-user-auth-2026-08-01");
        assert_eq!(s[2], "feature/add-user-auth-continued");
    }
}
