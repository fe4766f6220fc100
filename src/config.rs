// ABOUTME: Runtime configuration for a Builder instance.
//! Runtime configuration for a [`crate::engine::Builder`].

use std::path::PathBuf;
use std::time::Duration;

/// Network access policy for the HTTP(S) and GitHub readers.
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub enabled: bool,
    /// Substrings matched against a request's host. Empty means "allow any
    /// host", since `enabled` already gates network access on its own.
    pub allowed_addresses: Vec<String>,
}

impl NetConfig {
    pub fn is_allowed(&self, address: &str) -> bool {
        self.allowed_addresses.is_empty()
            || self.allowed_addresses.iter().any(|a| address.contains(a.as_str()))
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            enabled: false,
            allowed_addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub search_roots: Vec<PathBuf>,
    pub net: NetConfig,
    pub cache_db_path: Option<PathBuf>,
    pub generate_line_control_statements: bool,
    pub max_execution_depth: usize,
    pub request_timeout: Duration,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            search_roots: vec![PathBuf::from(".")],
            net: NetConfig::default(),
            cache_db_path: None,
            generate_line_control_statements: false,
            max_execution_depth: 256,
            request_timeout: Duration::from_secs(30),
        }
    }
}
