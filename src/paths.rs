//! Configuration and persistence locations.
//!
//! On a host, both live under the per-user directory
//! `$HOME/.config/{org}/{app}`, created on demand with owner-only
//! permissions. Inside a container they are fixed mount points (`/config`
//! and `/persist`) so orchestration can bind-mount them without knowing the
//! org/app identity.
//!
//! The container check is a [`PathResolver`] detector, so tests and unusual
//! deployments can swap it out. The free functions use
//! [`PathResolver::system`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ClapwireError;
use crate::name::validate_org_and_app_name;

/// Marker file Docker creates at the root of every container.
pub const CONTAINER_MARKER: &str = "/.dockerenv";
pub const CONTAINER_CONFIG_DIR: &str = "/config";
pub const CONTAINER_PERSISTENCE_DIR: &str = "/persist";
/// Root of the system-wide search location, `/etc/{org}/{app}`.
pub const SYSTEM_CONFIG_ROOT: &str = "/etc";
/// Extension of every config and persistence file.
pub const CONFIG_EXTENSION: &str = "yaml";

/// Which named set of directories applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentProfile {
    /// Per-user directories under the home directory.
    Host,
    /// Fixed directories shared by every org/app.
    Container {
        config_dir: PathBuf,
        persistence_dir: PathBuf,
    },
}

impl DeploymentProfile {
    pub fn container() -> Self {
        DeploymentProfile::Container {
            config_dir: PathBuf::from(CONTAINER_CONFIG_DIR),
            persistence_dir: PathBuf::from(CONTAINER_PERSISTENCE_DIR),
        }
    }
}

type Detector = Arc<dyn Fn() -> bool + Send + Sync>;

/// Derives config and persistence paths for an org/app pair.
#[derive(Clone)]
pub struct PathResolver {
    detector: Detector,
    container: DeploymentProfile,
    home_dir: Option<PathBuf>,
    system_root: PathBuf,
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("container", &self.container)
            .field("home_dir", &self.home_dir)
            .field("system_root", &self.system_root)
            .finish()
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::system()
    }
}

impl PathResolver {
    /// Detect containers through [`CONTAINER_MARKER`] and use the real home.
    pub fn system() -> Self {
        Self {
            detector: Arc::new(is_containerized),
            container: DeploymentProfile::container(),
            home_dir: None,
            system_root: PathBuf::from(SYSTEM_CONFIG_ROOT),
        }
    }

    /// Replace the container check.
    pub fn with_detector<F>(mut self, detector: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.detector = Arc::new(detector);
        self
    }

    /// Pin the profile regardless of the environment.
    pub fn with_profile(mut self, profile: DeploymentProfile) -> Self {
        match profile {
            DeploymentProfile::Host => self.detector = Arc::new(|| false),
            container => {
                self.container = container;
                self.detector = Arc::new(|| true);
            }
        }
        self
    }

    /// Use `home` instead of the user's real home directory.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    /// Use `root` instead of `/etc` for the system search location.
    pub fn with_system_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.system_root = root.into();
        self
    }

    /// The profile in effect right now. The detector runs on every call.
    pub fn profile(&self) -> DeploymentProfile {
        if (self.detector)() {
            self.container.clone()
        } else {
            DeploymentProfile::Host
        }
    }

    pub fn home_dir(&self) -> Result<PathBuf, ClapwireError> {
        if let Some(home) = &self.home_dir {
            return Ok(home.clone());
        }
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or(ClapwireError::HomeDirUnavailable)
    }

    /// `$HOME/.config/{org}/{app}` without touching the filesystem.
    pub fn user_config_dir(&self, org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
        validate_org_and_app_name(org, app)?;
        Ok(self.home_dir()?.join(".config").join(org).join(app))
    }

    /// `/etc/{org}/{app}`.
    pub fn system_config_dir(&self, org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
        validate_org_and_app_name(org, app)?;
        Ok(self.system_root.join(org).join(app))
    }

    /// `$HOME/.config/{org}/{app}`, created with owner-only permissions.
    pub fn default_user_config_path(&self, org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
        let dir = self.user_config_dir(org, app)?;
        create_private_dir(&dir)?;
        Ok(dir)
    }

    pub fn default_config_path(&self, org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
        match self.profile() {
            DeploymentProfile::Container { config_dir, .. } => Ok(config_dir),
            DeploymentProfile::Host => self.default_user_config_path(org, app),
        }
    }

    pub fn default_persistence_path(&self, org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
        match self.profile() {
            DeploymentProfile::Container {
                persistence_dir, ..
            } => Ok(persistence_dir),
            DeploymentProfile::Host => self.default_user_config_path(org, app),
        }
    }

    pub fn default_config_file(
        &self,
        org: &str,
        app: &str,
        base_name: &str,
    ) -> Result<PathBuf, ClapwireError> {
        Ok(self
            .default_config_path(org, app)?
            .join(config_file_name(base_name)))
    }

    pub fn default_persistence_file(
        &self,
        org: &str,
        app: &str,
        base_name: &str,
    ) -> Result<PathBuf, ClapwireError> {
        Ok(self
            .default_persistence_path(org, app)?
            .join(config_file_name(base_name)))
    }
}

/// `{base_name}.yaml`
pub fn config_file_name(base_name: &str) -> String {
    format!("{base_name}.{CONFIG_EXTENSION}")
}

fn create_private_dir(dir: &Path) -> Result<(), ClapwireError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|source| ClapwireError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

/// True when [`CONTAINER_MARKER`] exists. Not cached.
pub fn is_containerized() -> bool {
    Path::new(CONTAINER_MARKER).exists()
}

pub fn default_user_config_path(org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
    PathResolver::system().default_user_config_path(org, app)
}

pub fn default_config_path(org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
    PathResolver::system().default_config_path(org, app)
}

pub fn default_persistence_path(org: &str, app: &str) -> Result<PathBuf, ClapwireError> {
    PathResolver::system().default_persistence_path(org, app)
}

pub fn default_config_file(org: &str, app: &str, base_name: &str) -> Result<PathBuf, ClapwireError> {
    PathResolver::system().default_config_file(org, app, base_name)
}

pub fn default_persistence_file(
    org: &str,
    app: &str,
    base_name: &str,
) -> Result<PathBuf, ClapwireError> {
    PathResolver::system().default_persistence_file(org, app, base_name)
}
