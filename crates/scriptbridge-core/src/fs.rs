//! The guest's virtual filesystem.
//!
//! Hosts read and write files the guest sees through [`FsCommand`]s, and can
//! seed files before the first run with [`FileToLoad`]. Interpreters that
//! have no filesystem simply do not expose one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filesystem error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("File exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("writeFile needs content")]
    MissingContent,
    #[error("interpreter has no filesystem")]
    Unsupported,
}

/// A filesystem the guest can see.
pub trait GuestFs: Send {
    /// # Errors
    /// Returns error if `path` is missing or is a directory.
    fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Write `content`, creating missing parent directories.
    ///
    /// # Errors
    /// Returns error if `path` is a directory or a parent is a file.
    fn write_file(&mut self, path: &str, content: &str) -> Result<(), FsError>;

    /// Create one directory. The parent must exist.
    ///
    /// # Errors
    /// Returns error if `path` exists or its parent is missing.
    fn mkdir(&mut self, path: &str) -> Result<(), FsError>;

    fn exists(&self, path: &str) -> bool;

    /// Names of the direct children of a directory, sorted.
    ///
    /// # Errors
    /// Returns error if `path` is missing or not a directory.
    fn listdir(&self, path: &str) -> Result<Vec<String>, FsError>;
}

/// Host-side filesystem operation names, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsOp {
    ReadFile,
    WriteFile,
    Mkdir,
    Exists,
    Listdir,
}

/// One filesystem operation requested by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsCommand {
    pub operation: FsOp,
    pub path: String,
    /// File content for `writeFile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FsCommand {
    #[must_use]
    pub fn new(operation: FsOp, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Apply this command to `fs`.
    ///
    /// # Errors
    /// Returns the filesystem's error, or [`FsError::MissingContent`] for a
    /// `writeFile` without content.
    pub fn apply(&self, fs: &mut dyn GuestFs) -> Result<FsOutput, FsError> {
        let path = self.path.as_str();
        Ok(match self.operation {
            FsOp::ReadFile => FsOutput::Content {
                content: fs.read_file(path)?,
            },
            FsOp::WriteFile => {
                let content = self.content.as_deref().ok_or(FsError::MissingContent)?;
                fs.write_file(path, content)?;
                FsOutput::Success { success: true }
            }
            FsOp::Mkdir => {
                fs.mkdir(path)?;
                FsOutput::Success { success: true }
            }
            FsOp::Exists => FsOutput::Exists {
                exists: fs.exists(path),
            },
            FsOp::Listdir => FsOutput::Files {
                files: fs.listdir(path)?,
            },
        })
    }
}

/// Result of a successful [`FsCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FsOutput {
    Content { content: String },
    Exists { exists: bool },
    Files { files: Vec<String> },
    Success { success: bool },
}

/// A file placed in the guest filesystem before the first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToLoad {
    pub path: String,
    pub content: String,
}

/// Write every file in order, stopping at the first failure.
///
/// # Errors
/// Returns the error of the first file that could not be written.
pub fn load_files(fs: &mut dyn GuestFs, files: &[FileToLoad]) -> Result<(), FsError> {
    for file in files {
        fs.write_file(&file.path, &file.content)?;
        tracing::debug!(path = %file.path, bytes = file.content.len(), "file loaded");
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
}

static ROOT: Node = Node::Dir;

/// In-memory [`GuestFs`] rooted at `/`.
///
/// Relative paths resolve against the root. `.` and `..` segments are
/// resolved; `..` above the root is an invalid path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    nodes: BTreeMap<String, Node>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, key: &str) -> Option<&Node> {
        if key == "/" {
            return Some(&ROOT);
        }
        self.nodes.get(key)
    }

    fn ensure_dir(&mut self, key: &str, shown: &str) -> Result<(), FsError> {
        match self.node(key) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(FsError::NotADirectory(shown.to_string())),
            None => {
                self.nodes.insert(key.to_string(), Node::Dir);
                Ok(())
            }
        }
    }
}

fn normalize(path: &str) -> Result<String, FsError> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts
                    .pop()
                    .ok_or_else(|| FsError::InvalidPath(path.to_string()))?;
            }
            name => parts.push(name),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

fn parent(key: &str) -> &str {
    match key.rfind('/') {
        Some(0) | None => "/",
        Some(at) => &key[..at],
    }
}

impl GuestFs for MemoryFs {
    fn read_file(&self, path: &str) -> Result<String, FsError> {
        match self.node(&normalize(path)?) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(FsError::IsADirectory(path.to_string())),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn write_file(&mut self, path: &str, content: &str) -> Result<(), FsError> {
        let key = normalize(path)?;
        if matches!(self.node(&key), Some(Node::Dir)) {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        let mut ancestor = String::new();
        for segment in parent(&key).split('/').filter(|s| !s.is_empty()) {
            ancestor.push('/');
            ancestor.push_str(segment);
            self.ensure_dir(&ancestor, path)?;
        }
        self.nodes.insert(key, Node::File(content.to_string()));
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let key = normalize(path)?;
        if self.node(&key).is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        match self.node(parent(&key)) {
            Some(Node::Dir) => {
                self.nodes.insert(key, Node::Dir);
                Ok(())
            }
            Some(Node::File(_)) => Err(FsError::NotADirectory(path.to_string())),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn exists(&self, path: &str) -> bool {
        normalize(path).is_ok_and(|key| self.node(&key).is_some())
    }

    fn listdir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let key = normalize(path)?;
        match self.node(&key) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(FsError::NotADirectory(path.to_string())),
            None => return Err(FsError::NotFound(path.to_string())),
        }
        let prefix = if key == "/" { key } else { format!("{key}/") };
        Ok(self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let name = &k[prefix.len()..];
                (!name.contains('/')).then(|| name.to_string())
            })
            .collect())
    }
}
