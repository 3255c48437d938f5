// src/backup/archive.rs

//! Gzip-compressed tar archives of a directory tree.
//!
//! Entry paths are relative to the archived root. Directories are walked
//! depth-first in the order the filesystem returns them.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

/// Archive everything below `source` into `target`.
///
/// `source` itself is not an entry; its children are stored at the top level.
pub fn create_archive(source: &Path, target: &Path) -> io::Result<()> {
    let file = BufWriter::new(File::create(target)?);
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    append_tree(&mut builder, source, Path::new(""))?;

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    io::Write::flush(&mut writer)?;
    debug!(source = ?source, target = ?target, "archive written");
    Ok(())
}

fn append_tree<W: io::Write>(
    builder: &mut tar::Builder<W>,
    dir: &Path,
    rel: &Path,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = rel.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            builder.append_dir(&name, &path)?;
            append_tree(builder, &path, &name)?;
        } else {
            builder.append_path_with_name(&path, &name)?;
        }
    }
    Ok(())
}

/// Unpack `source` below `dest`, creating `dest` if needed.
///
/// Directories are created as needed; regular files are written byte for
/// byte and get the archived permission bits. Other entry kinds are
/// skipped. An entry that would land outside `dest` (absolute path or a
/// `..` component) fails the whole extraction with `InvalidData`.
pub fn extract_archive(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(source)?));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let rel = checked_relative(&entry.path()?)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&rel);

        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&target)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut file = File::create(&target)?;
                io::copy(&mut entry, &mut file)?;
                set_mode(&target, entry.header().mode()?)?;
            }
            other => debug!(path = ?rel, kind = ?other, "skipping unsupported archive entry"),
        }
    }
    Ok(())
}

fn checked_relative(path: &Path) -> io::Result<PathBuf> {
    let mut rel = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("archive entry escapes the destination: {}", path.display()),
                ));
            }
        }
    }
    Ok(rel)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
