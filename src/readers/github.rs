// ABOUTME: Reader for github-shaped references, fetched via raw.githubusercontent.com.
//! Reader for `github[.com][/:]<user>/<repo>/<path>[@<ref>]` references,
//! fetched over HTTP(S) from `raw.githubusercontent.com`.

use std::time::Duration;

use crate::config::NetConfig;
use crate::error::ReaderError;
use crate::readers::http;
use crate::readers::{ParsedPath, Reader};

pub struct GithubReader {
    net: NetConfig,
    timeout: Duration,
}

struct GithubRef {
    user: String,
    repo: String,
    path: String,
    git_ref: String,
}

fn is_slug(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn strip_github_prefix(reference: &str) -> Option<&str> {
    let lower = reference.to_ascii_lowercase();
    for prefix in ["github.com/", "github.com:", "github/", "github:"] {
        if lower.starts_with(prefix) {
            return Some(&reference[prefix.len()..]);
        }
    }
    None
}

fn parse_reference(reference: &str) -> Option<GithubRef> {
    let rest = strip_github_prefix(reference)?;
    let (body, git_ref) = match rest.rsplit_once('@') {
        Some((b, r)) if !r.contains('/') && !r.is_empty() => (b, r.to_string()),
        _ => (rest, "main".to_string()),
    };
    let mut parts = body.splitn(3, '/');
    let user = parts.next()?;
    let repo = parts.next()?;
    let path = parts.next()?;
    if !is_slug(user) || !is_slug(repo) || path.is_empty() {
        return None;
    }
    Some(GithubRef {
        user: user.to_string(),
        repo: repo.to_string(),
        path: path.to_string(),
        git_ref,
    })
}

impl GithubReader {
    pub fn new(net: NetConfig, timeout: Duration) -> Self {
        GithubReader { net, timeout }
    }

    pub fn matches(reference: &str) -> bool {
        parse_reference(reference).is_some()
    }
}

impl Reader for GithubReader {
    fn name(&self) -> &'static str {
        "github"
    }

    fn supports(&self, reference: &str) -> bool {
        Self::matches(reference)
    }

    fn read(&self, reference: &str) -> Result<String, ReaderError> {
        let parsed = parse_reference(reference)
            .ok_or_else(|| ReaderError::Unsupported(reference.to_string()))?;
        if !self.net.enabled {
            return Err(ReaderError::NetworkDisabled);
        }
        let host = "raw.githubusercontent.com";
        if !self.net.is_allowed(host) {
            return Err(ReaderError::AddressNotAllowed(host.to_string()));
        }
        let url = format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            parsed.user, parsed.repo, parsed.git_ref, parsed.path
        );
        http::fetch(&url, self.timeout)
    }

    fn parse_path(&self, reference: &str) -> ParsedPath {
        let parsed = match parse_reference(reference) {
            Some(p) => p,
            None => {
                return ParsedPath {
                    file: reference.to_string(),
                    path: String::new(),
                }
            }
        };
        let file = parsed.path.rsplit('/').next().unwrap_or(&parsed.path).to_string();
        let dir = parsed.path.rsplitn(2, '/').nth(1).unwrap_or("").to_string();
        ParsedPath {
            file,
            path: format!("github:{}/{}/{}", parsed.user, parsed.repo, dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_repo_path_and_defaults_ref_to_main() {
        let r = parse_reference("github.com/rust-lang/rust/README.md").unwrap();
        assert_eq!(r.user, "rust-lang");
        assert_eq!(r.repo, "rust");
        assert_eq!(r.path, "README.md");
        assert_eq!(r.git_ref, "main");
    }

    #[test]
    fn explicit_ref_after_at_is_honored() {
        let r = parse_reference("github:rust-lang/rust/README.md@stable").unwrap();
        assert_eq!(r.git_ref, "stable");
    }

    #[test]
    fn non_github_reference_does_not_match() {
        assert!(parse_reference("plain/file.txt").is_none());
        assert!(!GithubReader::matches("https://example.com/a.txt"));
    }

    #[test]
    fn parse_path_produces_the_documented_shape() {
        let reader = GithubReader::new(NetConfig::default(), Duration::from_secs(1));
        let parsed = reader.parse_path("github.com/acme/widgets/src/main.rs");
        assert_eq!(parsed.file, "main.rs");
        assert_eq!(parsed.path, "github:acme/widgets/src");
    }
}
