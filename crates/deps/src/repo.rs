//! On-disk node repository. Only existence and first-time layout are handled
//! here; everything else in the repo belongs to other subsystems.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

const VERSION_FILE: &str = "version";
const ROLE_FILE: &str = "role";
const KEYSTORE_DIR: &str = "keystore";
const REPO_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoRole {
    Provider,
}

impl RepoRole {
    pub fn as_str(self) -> &'static str {
        match self {
            RepoRole::Provider => "provider",
        }
    }
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repo at {path} is already initialized")]
    AlreadyInitialized { path: PathBuf },
    #[error("repo io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FsRepo {
    path: PathBuf,
}

impl FsRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> Result<bool, RepoError> {
        let marker = self.path.join(VERSION_FILE);
        match fs::metadata(&marker) {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(RepoError::Io {
                path: marker,
                source,
            }),
        }
    }

    pub fn init(&self, role: RepoRole) -> Result<(), RepoError> {
        if self.exists()? {
            return Err(RepoError::AlreadyInitialized {
                path: self.path.clone(),
            });
        }

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RepoError::Io { path, source }
        };

        let keystore = self.path.join(KEYSTORE_DIR);
        fs::create_dir_all(&keystore).map_err(io_err(&keystore))?;
        restrict_permissions(&keystore).map_err(io_err(&keystore))?;

        let role_file = self.path.join(ROLE_FILE);
        fs::write(&role_file, role.as_str()).map_err(io_err(&role_file))?;

        // Written last: its presence marks a complete repo.
        let version_file = self.path.join(VERSION_FILE);
        fs::write(&version_file, REPO_VERSION).map_err(io_err(&version_file))?;
        Ok(())
    }

    pub fn role(&self) -> Result<Option<String>, RepoError> {
        let role_file = self.path.join(ROLE_FILE);
        match fs::read_to_string(&role_file) {
            Ok(role) => Ok(Some(role.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RepoError::Io {
                path: role_file,
                source,
            }),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_provider_repo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsRepo::new(dir.path().join("node"));
        assert!(!repo.exists().expect("exists check"));

        repo.init(RepoRole::Provider).expect("init succeeds");
        assert!(repo.exists().expect("exists check"));
        assert!(repo.path().join("keystore").is_dir());
        assert_eq!(repo.role().expect("role read"), Some("provider".to_string()));
    }

    #[test]
    fn second_init_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsRepo::new(dir.path());
        repo.init(RepoRole::Provider).expect("first init");
        assert!(matches!(
            repo.init(RepoRole::Provider),
            Err(RepoError::AlreadyInitialized { .. })
        ));
    }
}
