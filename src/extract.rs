//! Unpacking archives onto the filesystem without letting them escape.
//!
//! Entry names come from the archive, which means they come from whoever
//! made it. [`enclosed_name()`] turns one into a relative path that can't
//! leave the directory it's joined to, or says why it can't.
//!
//! [`enclosed_name()`]: fn.enclosed_name.html

use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use log::*;

use crate::read::ZipArchive;
use crate::result::*;

/// Converts an entry name into a relative path with only normal components.
///
/// Both `/` and `\` are treated as separators.
/// `.` components are dropped; names that are empty, contain NUL,
/// start at a root or drive, or climb out with `..` are rejected.
pub fn enclosed_name(name: &str) -> ZipResult<Utf8PathBuf> {
    if name.is_empty() {
        return Err(ZipError::InvalidPath("Empty path".to_owned()));
    }
    if name.contains('\0') {
        return Err(ZipError::InvalidPath(format!(
            "NUL found in path {}",
            name.escape_debug()
        )));
    }
    let normalized = name.replace('\\', "/");
    if has_drive_letter(&normalized) {
        return Err(ZipError::InvalidPath(format!(
            "Drive letter found in path {name}"
        )));
    }

    let mut enclosed = Utf8PathBuf::new();
    for component in Utf8Path::new(&normalized).components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                return Err(ZipError::InvalidPath(format!(
                    "Prefix {prefix} found in path {name}",
                )));
            }
            Utf8Component::RootDir => {
                return Err(ZipError::InvalidPath(format!(
                    "Root directory found in path {name}",
                )));
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                return Err(ZipError::InvalidPath(format!(
                    "Parent dir (..) found in path {name}",
                )));
            }
            Utf8Component::Normal(component) => enclosed.push(component),
        }
    }

    if enclosed.as_str().is_empty() {
        return Err(ZipError::InvalidPath(format!(
            "{name} doesn't name anything"
        )));
    }
    Ok(enclosed)
}

/// `C:`, `c:foo`, and so on. Only Windows parses these as prefixes,
/// but an archive made there could have them anywhere.
fn has_drive_letter(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Where the entry `name` goes when extracting into `root`
pub fn target_path<P: AsRef<Path>>(root: P, name: &str) -> ZipResult<PathBuf> {
    Ok(root.as_ref().join(enclosed_name(name)?))
}

/// An entry to extract, with its destination already vetted
struct Planned {
    name: String,
    target: PathBuf,
    is_dir: bool,
    unix_mode: Option<u32>,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Extracts every entry into `root`, creating it if needed.
    ///
    /// Every name is checked with [`enclosed_name()`](../extract/fn.enclosed_name.html)
    /// before anything is written, so one bad name means nothing gets extracted.
    /// A file whose contents fail their CRC check is removed.
    pub fn extract_all<P: AsRef<Path>>(&mut self, root: P) -> ZipResult<()> {
        let root = root.as_ref();
        let plan = self
            .entries()
            .iter()
            .map(|entry| {
                Ok(Planned {
                    name: entry.name.clone(),
                    target: target_path(root, &entry.name)?,
                    is_dir: entry.is_dir(),
                    unix_mode: entry.unix_mode,
                })
            })
            .collect::<ZipResult<Vec<_>>>()?;

        fs::create_dir_all(root)?;
        for planned in &plan {
            debug!("Extracting {} to {}", planned.name, planned.target.display());
            if planned.is_dir {
                fs::create_dir_all(&planned.target)?;
                continue;
            }
            if let Some(parent) = planned.target.parent() {
                fs::create_dir_all(parent)?;
            }
            self.extract_file(planned)?;
        }

        // Directories go last so a read-only one doesn't lock us out of its contents.
        #[cfg(unix)]
        for planned in plan.iter().rev().filter(|p| p.is_dir) {
            set_unix_mode(&planned.target, planned.unix_mode)?;
        }
        Ok(())
    }

    fn extract_file(&mut self, planned: &Planned) -> ZipResult<()> {
        let mut entry = self.open_entry(&planned.name)?;
        let mut out = File::create(&planned.target)?;
        if let Err(e) = io::copy(&mut entry, &mut out) {
            drop(out);
            if let Err(remove_error) = fs::remove_file(&planned.target) {
                warn!(
                    "Couldn't remove partially-extracted {}: {}",
                    planned.target.display(),
                    remove_error
                );
            }
            return Err(e.into());
        }
        #[cfg(unix)]
        set_unix_mode(&planned.target, planned.unix_mode)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, unix_mode: Option<u32>) -> ZipResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = unix_mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn rejected(name: &str) -> bool {
        matches!(enclosed_name(name), Err(ZipError::InvalidPath(_)))
    }

    #[test]
    fn normal_names() {
        assert_eq!(enclosed_name("a.txt").unwrap(), "a.txt");
        assert_eq!(enclosed_name("dir/b.bin").unwrap(), "dir/b.bin");
        assert_eq!(enclosed_name("dir/").unwrap(), "dir");
        assert_eq!(enclosed_name("./dir/./c").unwrap(), "dir/c");
        assert_eq!(enclosed_name("dir\\d").unwrap(), "dir/d");
        assert_eq!(enclosed_name("..foo/bar..").unwrap(), "..foo/bar..");
    }

    #[test]
    fn traversal() {
        assert!(rejected("../evil"));
        assert!(rejected("dir/../../evil"));
        assert!(rejected("dir/.."));
        assert!(rejected("..\\evil"));
    }

    #[test]
    fn roots_and_drives() {
        assert!(rejected("/etc/passwd"));
        assert!(rejected("\\windows\\system32"));
        assert!(rejected("C:\\windows"));
        assert!(rejected("c:evil"));
        assert!(rejected("//server/share"));
    }

    #[test]
    fn degenerate_names() {
        assert!(rejected(""));
        assert!(rejected("."));
        assert!(rejected("./"));
        assert!(rejected("a\0b"));
    }

    #[test]
    fn targets_stay_under_root() {
        let target = target_path("/tmp/out", "dir/b.bin").unwrap();
        assert_eq!(target, Path::new("/tmp/out/dir/b.bin"));
        assert!(target_path("/tmp/out", "../b.bin").is_err());
    }
}
