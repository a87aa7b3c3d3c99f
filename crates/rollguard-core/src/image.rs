//! Container image reference parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A container image reference: `[registry/]repository[:tag][@digest]`.
///
/// Parsing only validates the shape; whether the image exists is the
/// orchestrator's business (and is exactly what a rollout finds out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image reference is empty")]
    Empty,
    #[error("invalid image reference: {0}")]
    Invalid(String),
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageError::Empty);
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(ImageError::Invalid(reference.to_string()));
        }

        let (rest, digest) = match reference.split_once('@') {
            Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
            Some(_) => return Err(ImageError::Invalid(reference.to_string())),
            None => (reference, None),
        };

        // A colon after the last slash is a tag; before it, a registry port.
        let (path, tag) = match rest.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => {
                if tag.is_empty() {
                    return Err(ImageError::Invalid(reference.to_string()));
                }
                (path, Some(tag.to_string()))
            }
            _ => (rest, None),
        };

        // First path component is a registry when it looks like a host.
        let (registry, repository) = match path.split_once('/') {
            Some((host, repo))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (Some(host.to_string()), repo)
            }
            _ => (None, path),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(ImageError::Invalid(reference.to_string()));
        }

        Ok(ImageRef {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Tag used when none is given.
    pub fn effective_tag(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
