//! Bundle descriptors and executable path resolution.
//!
//! A bundle is a plugin's on-disk package. The host hands the supervisor a
//! [`BundleDescriptor`] naming the plugin, its root directory and the backend
//! executable relative to that root. [`resolve`] turns the descriptor into an
//! absolute path that is guaranteed to stay inside the root, both lexically
//! and after following any symlinks that already exist on disk. The target
//! itself is never required to exist.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// Identity and location of a plugin bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Plugin identity.
    pub id: String,
    /// Bundle root directory; relative roots resolve against the working
    /// directory.
    pub root_dir: Utf8PathBuf,
    /// Backend executable path relative to the root. A leading `/` is still
    /// interpreted relative to the root.
    pub executable: String,
}

impl BundleDescriptor {
    /// Builds a descriptor.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        root_dir: impl Into<Utf8PathBuf>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            root_dir: root_dir.into(),
            executable: executable.into(),
        }
    }
}

/// A descriptor whose executable path has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBundle {
    id: String,
    root_dir: Utf8PathBuf,
    executable: Utf8PathBuf,
}

impl ResolvedBundle {
    /// Plugin identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute bundle root; the plugin's working directory.
    #[must_use]
    pub fn root_dir(&self) -> &Utf8Path {
        &self.root_dir
    }

    /// Absolute executable path inside the root.
    #[must_use]
    pub fn executable(&self) -> &Utf8Path {
        &self.executable
    }
}

/// Resolves and validates the executable path of `descriptor`.
///
/// # Errors
///
/// Returns [`SupervisorError::InvalidBundle`] when the identity is empty or
/// the root cannot be made absolute, and
/// [`SupervisorError::InvalidExecutablePath`] when the executable path is
/// empty or escapes the root through `..` segments or symlinks.
pub fn resolve(descriptor: &BundleDescriptor) -> Result<ResolvedBundle, SupervisorError> {
    if descriptor.id.trim().is_empty() {
        return Err(SupervisorError::InvalidBundle {
            plugin: descriptor.id.clone(),
            message: String::from("plugin identity must not be empty"),
        });
    }

    let root_dir = absolute_root(descriptor)?;
    let relative = normalise_relative(descriptor)?;
    let executable = root_dir.join(&relative);
    ensure_no_symlink_escape(descriptor, &root_dir, &executable)?;

    Ok(ResolvedBundle {
        id: descriptor.id.clone(),
        root_dir,
        executable,
    })
}

fn invalid_path(descriptor: &BundleDescriptor, reason: impl Into<String>) -> SupervisorError {
    SupervisorError::InvalidExecutablePath {
        plugin: descriptor.id.clone(),
        path: descriptor.executable.clone(),
        reason: reason.into(),
    }
}

fn absolute_root(descriptor: &BundleDescriptor) -> Result<Utf8PathBuf, SupervisorError> {
    let joined = if descriptor.root_dir.is_absolute() {
        descriptor.root_dir.clone()
    } else {
        let cwd = std::env::current_dir()
            .map_err(|err| err.to_string())
            .and_then(|dir| Utf8PathBuf::try_from(dir).map_err(|err| err.to_string()))
            .map_err(|message| SupervisorError::InvalidBundle {
                plugin: descriptor.id.clone(),
                message: format!("cannot resolve relative bundle root: {message}"),
            })?;
        cwd.join(&descriptor.root_dir)
    };

    let mut root = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                root.pop();
            }
            other => root.push(other.as_str()),
        }
    }
    Ok(root)
}

/// Lexically normalises the executable path, refusing to climb above the
/// root.
fn normalise_relative(descriptor: &BundleDescriptor) -> Result<Utf8PathBuf, SupervisorError> {
    let mut segments: Vec<&str> = Vec::new();
    for component in Utf8Path::new(&descriptor.executable).components() {
        match component {
            Utf8Component::RootDir | Utf8Component::CurDir => {}
            Utf8Component::Prefix(_) => {
                return Err(invalid_path(
                    descriptor,
                    "windows path prefixes are not allowed",
                ));
            }
            Utf8Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(invalid_path(descriptor, "path escapes the bundle root"));
                }
            }
            Utf8Component::Normal(segment) => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(invalid_path(
            descriptor,
            "path does not name a file inside the bundle root",
        ));
    }
    Ok(segments.iter().collect())
}

/// Follows the symlinks that exist along `executable` and checks the result
/// still lies under the canonical root.
fn ensure_no_symlink_escape(
    descriptor: &BundleDescriptor,
    root_dir: &Utf8Path,
    executable: &Utf8Path,
) -> Result<(), SupervisorError> {
    let Ok(canonical_root) = root_dir.canonicalize_utf8() else {
        // Nothing exists on disk yet, so nothing can be a symlink.
        return Ok(());
    };

    let Some(existing) = executable
        .ancestors()
        .take_while(|ancestor| ancestor.starts_with(root_dir))
        .find(|ancestor| ancestor.symlink_metadata().is_ok())
    else {
        return Ok(());
    };

    let canonical = existing
        .canonicalize_utf8()
        .map_err(|err| invalid_path(descriptor, format!("cannot resolve '{existing}': {err}")))?;
    if canonical.starts_with(&canonical_root) {
        Ok(())
    } else {
        Err(invalid_path(
            descriptor,
            format!("symlink resolves outside the bundle root to '{canonical}'"),
        ))
    }
}
