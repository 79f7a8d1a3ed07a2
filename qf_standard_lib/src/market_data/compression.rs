use crate::errors::EngineError;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Zips a set of named entries into one archive in memory.
pub fn zip_bytes(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, EngineError> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut buffer);
        for (name, bytes) in entries {
            writer
                .start_file(name.clone(), SimpleFileOptions::default())
                .map_err(|e| EngineError::Data(format!("Zip write failed: {}", e)))?;
            writer
                .write_all(bytes)
                .map_err(|e| EngineError::Data(format!("Zip write failed: {}", e)))?;
        }
        writer
            .finish()
            .map_err(|e| EngineError::Data(format!("Zip finish failed: {}", e)))?;
    }
    Ok(buffer.into_inner())
}

/// Recovers every entry of an archive as `(name, bytes)` pairs, in archive
/// order.
pub fn unzip_bytes(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, EngineError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Data(format!("Zip open failed: {}", e)))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| EngineError::Data(format!("Zip entry failed: {}", e)))?;
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|e| EngineError::Data(format!("Zip read failed: {}", e)))?;
        entries.push((entry.name().to_string(), content));
    }
    Ok(entries)
}

/// Reads one entry from a zip file on disk. Internal entry names are
/// arbitrary: pass `None` to read the first entry, which is the convention
/// for single-entry data archives.
pub fn read_zip_entry(path: &Path, entry_name: Option<&str>) -> Result<Vec<u8>, EngineError> {
    let file = File::open(path)
        .map_err(|e| EngineError::Data(format!("Cannot open {}: {}", path.display(), e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| EngineError::Data(format!("Cannot open zip {}: {}", path.display(), e)))?;
    let mut entry = match entry_name {
        Some(name) => archive
            .by_name(name)
            .map_err(|e| EngineError::Data(format!("Missing entry {} in {}: {}", name, path.display(), e)))?,
        None => {
            if archive.len() == 0 {
                return Err(EngineError::Data(format!("Empty zip: {}", path.display())));
            }
            archive
                .by_index(0)
                .map_err(|e| EngineError::Data(format!("Zip entry failed in {}: {}", path.display(), e)))?
        }
    };
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut content)
        .map_err(|e| EngineError::Data(format!("Zip read failed in {}: {}", path.display(), e)))?;
    Ok(content)
}

/// Writes a zip file to disk containing the given entries, creating parent
/// directories as needed.
pub fn write_zip_file(path: &Path, entries: &[(String, Vec<u8>)]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| EngineError::Data(format!("Cannot create {}: {}", parent.display(), e)))?;
    }
    let bytes = zip_bytes(entries)?;
    std::fs::write(path, bytes)
        .map_err(|e| EngineError::Data(format!("Cannot write {}: {}", path.display(), e)))?;
    Ok(())
}
