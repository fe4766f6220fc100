//! Pluggable source readers: local filesystem, HTTP(S), and GitHub-hosted
//! files, tried in that order by the first one that claims a reference.

pub mod github;
pub mod http;
pub mod local;

use crate::error::ReaderError;

/// The `(file, path)` pair a resolved reference decomposes into, used to
/// seed `__FILE__`/`__PATH__` for the included content's execution frame.
pub struct ParsedPath {
    pub file: String,
    pub path: String,
}

pub trait Reader {
    fn name(&self) -> &'static str;
    fn supports(&self, reference: &str) -> bool;
    fn read(&self, reference: &str) -> Result<String, ReaderError>;
    fn parse_path(&self, reference: &str) -> ParsedPath;
}

#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn Reader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry { readers: Vec::new() }
    }

    pub fn register(&mut self, reader: Box<dyn Reader>) {
        self.readers.push(reader);
    }

    pub fn get(&self, reference: &str) -> Result<&dyn Reader, ReaderError> {
        self.readers
            .iter()
            .find(|r| r.supports(reference))
            .map(|r| r.as_ref())
            .ok_or_else(|| ReaderError::Unsupported(reference.to_string()))
    }
}
