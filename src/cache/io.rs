//! Point cache file I/O.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use pc2::Precision;

use crate::util::{as_array_slice, Error, Result};
use super::VertexCache;

/// Read a cache file, decoding PC16 or PC2 based on the extension.
///
/// Files without a recognised extension are read as PC2.
pub fn read_cache(path: impl AsRef<Path>) -> Result<VertexCache> {
    let path = path.as_ref();
    let precision = Precision::from_path(path).unwrap_or(Precision::F32);
    read_cache_as(path, precision)
}

/// Read a cache file with an explicit body precision.
pub fn read_cache_as(path: impl AsRef<Path>, precision: Precision) -> Result<VertexCache> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let size = file.metadata()?.len();
    if size < pc2::HEADER_SIZE as u64 {
        return Err(pc2::Error::Truncated { expected: pc2::HEADER_SIZE, actual: size as usize }.into());
    }

    // Safety: the file is opened read-only and caches are never rewritten in place
    let mmap = unsafe { Mmap::map(&file) }?;
    let (header, points) = pc2::decode(&mmap, precision)?;
    Ok(VertexCache::from_pc2(&header, points))
}

/// Write a cache as 32-bit PC2, creating parent directories as needed.
///
/// Data goes to a `.part` sibling first and is renamed into place, so an
/// interrupted write never leaves a truncated file under the final name.
pub fn write_cache(path: impl AsRef<Path>, cache: &VertexCache) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let part = part_path(path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part)?;
    let writer = BufWriter::with_capacity(2 * 1024 * 1024, file);

    if let Err(e) = pc2::write_to(writer, &cache.header(), as_array_slice(cache.positions())) {
        let _ = fs::remove_file(&part);
        return Err(e.into());
    }
    fs::rename(&part, path)?;

    tracing::debug!(
        frames = cache.frame_count(),
        vertices = cache.vertex_count(),
        "wrote {}",
        path.display()
    );
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
