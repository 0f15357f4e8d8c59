use std::io;
use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

const WORKDIR_PREFIX: &str = ".artsync-";

/// Hidden per-run directory inside the target directory holding in-flight
/// transfers. Staging next to the destination keeps the final move a rename.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    pub fn create(parent: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(parent)?;
        debug!("staging transfers in {}", dir.path().display());
        Ok(WorkDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory along with anything a failed transfer left in it.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_created_hidden_inside_parent() {
        let target = tempdir().unwrap();
        let parent = target.path().join("not/yet/there");
        let workdir = WorkDir::create(&parent).unwrap();

        assert_eq!(workdir.path().parent(), Some(parent.as_path()));
        let name = workdir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKDIR_PREFIX));
        assert!(workdir.path().is_dir());
    }

    #[test]
    fn test_close_removes_leftovers() {
        let target = tempdir().unwrap();
        let workdir = WorkDir::create(target.path()).unwrap();
        let path = workdir.path().to_path_buf();
        std::fs::write(path.join("partial"), b"abc").unwrap();

        workdir.close().unwrap();

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(target.path()).unwrap().count(), 0);
    }
}
