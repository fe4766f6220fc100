// ABOUTME: HTTP(S) reader performing a blocking GET behind a timeout and a host allowlist.
//! HTTP(S) reader: a blocking GET behind a timeout and a host allowlist.

use std::time::Duration;

use crate::config::NetConfig;
use crate::error::ReaderError;
use crate::readers::{ParsedPath, Reader};

pub struct HttpReader {
    net: NetConfig,
    timeout: Duration,
}

impl HttpReader {
    pub fn new(net: NetConfig, timeout: Duration) -> Self {
        HttpReader { net, timeout }
    }

    fn host_of(url: &str) -> String {
        url.split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or(url)
            .to_string()
    }
}

/// Shared by [`super::github::GithubReader`], which resolves its own
/// references to a `raw.githubusercontent.com` URL and fetches the same way.
pub(crate) fn fetch(url: &str, timeout: Duration) -> Result<String, ReaderError> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    match agent.get(url).call() {
        Ok(response) => response.into_string().map_err(|e| ReaderError::Io(e.to_string())),
        Err(ureq::Error::Status(status, _)) => Err(ReaderError::BadStatus {
            url: url.to_string(),
            status,
        }),
        Err(ureq::Error::Transport(t)) => {
            let msg = t.to_string();
            if msg.contains("timed out") {
                Err(ReaderError::Timeout {
                    url: url.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            } else {
                Err(ReaderError::Io(msg))
            }
        }
    }
}

impl Reader for HttpReader {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, reference: &str) -> bool {
        reference.starts_with("http://") || reference.starts_with("https://")
    }

    fn read(&self, reference: &str) -> Result<String, ReaderError> {
        if !self.net.enabled {
            return Err(ReaderError::NetworkDisabled);
        }
        let host = Self::host_of(reference);
        if !self.net.is_allowed(&host) {
            return Err(ReaderError::AddressNotAllowed(host));
        }
        fetch(reference, self.timeout)
    }

    fn parse_path(&self, reference: &str) -> ParsedPath {
        let tail = reference.split("://").nth(1).unwrap_or(reference);
        let path = tail.splitn(2, '/').nth(1).unwrap_or("");
        let file = path.rsplit('/').next().unwrap_or(path).to_string();
        let dir = path.rsplitn(2, '/').nth(1).unwrap_or("").to_string();
        ParsedPath { file, path: dir }
    }
}
