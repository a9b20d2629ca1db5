//! Web URLs for git remotes.
//!
//! Only GitHub remotes are recognised, in SSH (`git@github.com:owner/repo.git`)
//! and HTTPS (`https://github.com/owner/repo.git`) form. Anything else yields
//! `None`, which callers treat as "no compare link for this remote".

/// Hosting services whose remotes map to a web URL.
const KNOWN_HOSTS: &[&str] = &["github.com"];

/// Derive the repository's web URL from a remote URL.
///
/// The result is itself a valid HTTPS remote, so feeding it back in returns
/// it unchanged.
pub fn derive_compare_url(remote: &str) -> Option<String> {
    let remote = remote.trim();

    let (host, path) = if let Some(rest) = remote.strip_prefix("https://") {
        rest.split_once('/')?
    } else {
        let (user, rest) = remote.split_once('@')?;
        if user.is_empty() || user.contains(['/', ':']) {
            return None;
        }
        rest.split_once(':')?
    };

    if !KNOWN_HOSTS.contains(&host) {
        return None;
    }
    let (owner, repo) = owner_and_repo(path)?;
    Some(format!("https://{host}/{owner}/{repo}"))
}

/// Compare page for `branch` under a web URL from [`derive_compare_url`].
pub fn branch_compare_url(web_url: &str, branch: &str) -> String {
    format!("{}/compare/{branch}", web_url.trim_end_matches('/'))
}

/// Split `owner/repo[.git]` into its two non-empty segments.
fn owner_and_repo(path: &str) -> Option<(&str, &str)> {
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}
