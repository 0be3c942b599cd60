//! Remote URL decoding for the platform client.
//!
//! The platform client needs `host`/`owner`/`repo` out of whatever remote
//! the repository carries. Parsing happens in two steps: the transport
//! wrapper (scheme, user info, scp-style `git@host:` form, `gh:` shorthand)
//! is peeled off into an authority and a path, then the path is required to
//! be exactly `owner/repo` with an optional `.git` suffix.

/// Parsed git remote with host, owner, and repository components.
///
/// Accepted remote forms:
///
/// | form | example |
/// |---|---|
/// | HTTPS / HTTP | `https://github.com/acme/widgets.git` |
/// | scp-style SSH | `git@github.com:acme/widgets.git` |
/// | SSH URL | `ssh://git@github.com/acme/widgets` |
/// | platform CLI | `gh:acme/widgets` |
///
/// Remotes with ports, nested paths, or other schemes are rejected.
///
/// # Example
///
/// ```
/// use devsolo::git::GitRemoteUrl;
///
/// let remote = GitRemoteUrl::parse("gh:acme/widgets").unwrap();
/// assert_eq!(remote.host(), "github.com");
/// assert_eq!(remote.full_name(), "acme/widgets");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemoteUrl {
    host: String,
    owner: String,
    repo: String,
}

impl GitRemoteUrl {
    /// Parse a remote into structured components.
    ///
    /// Returns `None` for anything that does not name exactly one
    /// repository on one host.
    pub fn parse(remote: &str) -> Option<Self> {
        let (host, path) = split_authority(remote.trim())?;

        // A colon left in the authority is a port, which does not fit the
        // host/owner/repo model.
        if host.is_empty() || host.contains(':') {
            return None;
        }

        let (owner, repo_segment) = path.trim_matches('/').split_once('/')?;
        let repo = repo_segment
            .strip_suffix(".git")
            .unwrap_or(repo_segment);
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// The hostname, e.g. "github.com" or a GitHub Enterprise host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The repository owner or organization.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name without the `.git` suffix.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo`, as platform API paths spell it.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Peel the transport wrapper off a remote, yielding `(host, path)`.
///
/// Handles URL schemes (with optional `user@` info), the scp-style
/// `git@host:path` form, and the `gh:owner/repo` CLI shorthand.
fn split_authority(remote: &str) -> Option<(&str, &str)> {
    for scheme in ["https://", "http://", "ssh://"] {
        if let Some(rest) = remote.strip_prefix(scheme) {
            let (authority, path) = rest.split_once('/')?;
            let host = match authority.rsplit_once('@') {
                Some((_, host)) => host,
                None => authority,
            };
            return Some((host, path));
        }
    }
    if let Some(path) = remote.strip_prefix("gh:") {
        return Some(("github.com", path));
    }
    if let Some(rest) = remote.strip_prefix("git@") {
        return rest.split_once(':');
    }
    None
}

/// Convenience for callers that only care about `(owner, repo)`.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let parsed = GitRemoteUrl::parse(url)?;
    Some((parsed.owner.clone(), parsed.repo.clone()))
}
