//! Path Operations Module
//!
//! This module handles path operations for directories and files.

use std::path::PathBuf;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a single path string.
/// It uses the PathBuf type to handle platform-specific separators and conversions.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.to_string_lossy().into_owned()
}

pub mod dir {
    //! Directory Operations Submodule
    //!
    //! This submodule provides functions for directory operations.

    use std::fs;
    use std::io;
    use std::path::Path;

    use super::{TagscopeDir, TagscopeOutput, TagscopePath};
    use crate::module::define;

    /// Create Directory from Path List
    ///
    /// Joins the given components and creates the directory, including parents.
    /// Returns the joined path on success.
    pub fn create_dir_from_path_list(paths: &[&str]) -> io::Result<String> {
        let path = super::join(paths);
        fs::create_dir_all(Path::new(&path))?;
        Ok(path)
    }

    /// Create Subdirectory in Either Directory
    ///
    /// Uses `dir1` as the parent if it exists, otherwise `dir2`.
    pub fn create_subdir_in_either_dir(dir1: &str, dir2: &str, name: &str) -> io::Result<String> {
        let parent: &str = match Path::new(dir1).is_dir() {
            true => dir1,
            false => dir2,
        };
        create_dir_from_path_list(&[parent, name])
    }

    /// Create Application Subdirectory and Paths
    ///
    /// Creates the data directory (under `persistent` if it exists, else
    /// `ephemeral`) with its `log` and `store` children, plus the temporary
    /// directory under `ephemeral` that receives the rendered surfaces.
    pub fn create_app_sub_dir(persistent: &str, ephemeral: &str) -> io::Result<TagscopePath> {
        let data_dir = create_subdir_in_either_dir(persistent, ephemeral, define::system::NAME)?;
        let tmp_dir = create_dir_from_path_list(&[ephemeral, define::system::NAME])?;
        let store_dir = create_dir_from_path_list(&[&data_dir, define::path::STORE_DIR])?;
        let log_dir = create_dir_from_path_list(&[&data_dir, define::path::LOG_DIR])?;
        Ok(TagscopePath {
            dir: TagscopeDir {
                data: data_dir,
                store: store_dir,
                log: log_dir,
            },
            output: TagscopeOutput {
                live: super::join(&[&tmp_dir, define::path::LIVE_IMAGE]),
                saved_image: super::join(&[&tmp_dir, define::path::SAVED_IMAGE]),
                saved_data: super::join(&[&tmp_dir, define::path::SAVED_DATA]),
            },
        })
    }

    /// Create the default application directories.
    pub fn create_default_app_sub_dir() -> io::Result<TagscopePath> {
        create_app_sub_dir(define::path::PERSISTENT_DIR, define::path::EPHEMERAL_DIR)
    }
}

/// Paths of Resources
#[derive(Debug, Clone)]
pub struct TagscopePath {
    /// Directories Paths
    pub dir: TagscopeDir,
    /// Rendered Output Paths
    pub output: TagscopeOutput,
}

/// Paths of Directories
#[derive(Debug, Clone)]
pub struct TagscopeDir {
    /// Data Directory Path
    pub data: String,
    /// Durable Store Directory Path
    pub store: String,
    /// Log Directory Path
    pub log: String,
}

/// Paths of rendered surfaces
#[derive(Debug, Clone)]
pub struct TagscopeOutput {
    /// Live display surface
    pub live: String,
    /// Saved detection viewer surface
    pub saved_image: String,
    /// Saved detection viewer text
    pub saved_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_create_dir_from_path_list() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().to_str().unwrap();
        let res = dir::create_dir_from_path_list(&[root, "a", "b"]).unwrap();

        assert!(Path::new(&res).is_dir());
        assert_eq!(res, join(&[root, "a", "b"]));
    }

    #[test]
    fn test_create_subdir_in_either_dir() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path().to_str().unwrap();
        let missing = join(&[root, "missing"]);
        let res = dir::create_subdir_in_either_dir(&missing, root, "sub").unwrap();

        // Falls back to the second parent when the first does not exist.
        assert_eq!(res, join(&[root, "sub"]));
        assert!(!Path::new(&missing).exists());
    }

    #[test]
    fn test_create_app_sub_dir() {
        let persistent = tempfile::tempdir().unwrap();
        let ephemeral = tempfile::tempdir().unwrap();
        let res = dir::create_app_sub_dir(
            persistent.path().to_str().unwrap(),
            ephemeral.path().to_str().unwrap(),
        )
        .unwrap();

        assert!(Path::new(&res.dir.store).is_dir());
        assert!(Path::new(&res.dir.log).is_dir());
        assert!(res.dir.data.starts_with(persistent.path().to_str().unwrap()));
        assert_eq!(
            res.output.live,
            join(&[ephemeral.path().to_str().unwrap(), "tagscope", "live.png"])
        );
        assert!(res.output.saved_data.ends_with("saved_det.json"));
    }

    #[test]
    fn test_path_join() {
        assert_eq!(join(&["/test/", "test"]), "/test/test");
        assert_eq!(join(&["test", "test", "test"]), "test/test/test");
        assert_eq!(join(&["/test/", "test/"]), "/test/test/");
        assert_eq!(
            join(&["./test/", "test/", "test.txt"]),
            "./test/test/test.txt"
        );
    }
}
