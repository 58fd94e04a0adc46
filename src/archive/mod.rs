use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::errors::Result;
use crate::safety;
use crate::wire::{GeneratedFile, GeneratedProject};

/// Zip a generated project.
///
/// Every path is validated before the first byte is written, so a rejected
/// project never yields a partial archive. Timestamps and permissions are
/// pinned, which makes the output a pure function of the input.
pub fn pack(project: &GeneratedProject) -> Result<Vec<u8>> {
    safety::validate_project(project)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for file in &project.files {
        writer.start_file(file.path.replace('\\', "/"), options)?;
        writer.write_all(file.content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Read an archive back as (path, content) pairs in stored order.
pub fn unpack(bytes: &[u8]) -> Result<Vec<GeneratedFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let path = entry.name().to_string();
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        out.push(GeneratedFile { path, content });
    }
    Ok(out)
}
