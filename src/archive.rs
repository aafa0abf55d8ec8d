//! Zip packaging of backup trees

use crate::error::IndexResult;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Pack a directory tree into one zip file, entries relative to `source`
pub fn zip_directory(source: &Path, destination: &Path) -> IndexResult<usize> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries = add_dir_to_zip(&mut zip, source, "", &options)?;
    zip.finish()?.flush()?;

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        entries,
        "Backup archive written"
    );
    Ok(entries)
}

fn add_dir_to_zip<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir_path: &Path,
    prefix: &str,
    options: &SimpleFileOptions,
) -> IndexResult<usize> {
    let mut entries: Vec<_> = std::fs::read_dir(dir_path)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut count = 0;
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let full_name = if prefix.is_empty() {
            name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", prefix, name.to_string_lossy())
        };

        if entry.file_type()?.is_dir() {
            zip.add_directory(full_name.as_str(), *options)?;
            count += 1 + add_dir_to_zip(zip, &path, &full_name, options)?;
        } else {
            zip.start_file(full_name.as_str(), *options)?;
            let mut file = File::open(&path)?;
            std::io::copy(&mut file, zip)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Unpack a zip file into `destination`. Entries escaping it are rejected.
pub fn unzip(source: &Path, destination: &Path) -> IndexResult<usize> {
    let file = File::open(source)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let entries = archive.len();
    archive.extract(destination)?;

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        entries,
        "Backup archive unpacked"
    );
    Ok(entries)
}
