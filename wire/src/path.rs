//! Contains the path model shared by the naming service and the storage
//! nodes.

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    #[error("path can not be empty")]
    Empty,

    #[error("path must begin with a forward slash")]
    NotAbsolute,

    #[error("path must not contain a colon")]
    Colon,
}

/// An absolute path in the coordinator namespace.
///
/// Always delimited with forward slashes and platform-independent, which
/// distinguishes it from the ones provided in the standard library. Parsing
/// drops empty components, so `//a///b` and `/a/b` are the same path. The
/// root is the path with no components.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct DfsPath {
    components: Vec<String>,
}

impl DfsPath {
    /// The root path, `/`.
    pub fn root() -> Self {
        DfsPath { components: vec![] }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Returns the final component, if there is one.
    pub fn basename(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Returns the parent path. The root has no parent.
    pub fn parent(&self) -> Option<DfsPath> {
        if self.is_root() {
            return None;
        }
        Some(DfsPath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Produces the proper prefixes of this path in root-to-parent order,
    /// starting with the root itself. The root path yields nothing.
    pub fn ancestors(&self) -> impl Iterator<Item = DfsPath> + '_ {
        (0..self.components.len()).map(|n| DfsPath {
            components: self.components[..n].to_vec(),
        })
    }

    pub fn join(&self, name: &str) -> DfsPath {
        let mut components = self.components.clone();
        components.push(name.to_owned());
        DfsPath { components }
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// True when `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &DfsPath) -> bool {
        self.components.len() >= other.components.len()
            && self.components[..other.components.len()] == other.components[..]
    }
}

impl FromStr for DfsPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if !s.starts_with('/') {
            return Err(PathError::NotAbsolute);
        }
        if s.contains(':') {
            return Err(PathError::Colon);
        }

        Ok(DfsPath {
            components: s
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
        })
    }
}

impl Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}
