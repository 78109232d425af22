//! Multi-file bundling decision.
//!
//! The wire protocol moves exactly one payload per transfer. A single
//! selected file is sent as-is; two or more are collapsed into one zip
//! archive named `files-<room code>.zip`, so the receiver only ever sees one
//! payload per send.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use crate::code::RoomCode;
use crate::error::{Error, Result};
use crate::payload::{NamedBlob, Payload, PayloadSource};

/// Name given to the archive synthesized for a multi-file send.
#[must_use]
pub fn archive_name(code: &RoomCode) -> String {
    format!("files-{code}.zip")
}

/// Resolve the selected files into the one payload the transfer will send.
///
/// # Errors
///
/// Returns [`Error::NoFiles`] for an empty selection, or an error if a file
/// cannot be read or the archive cannot be written.
pub async fn decide(files: Vec<NamedBlob>, code: &RoomCode) -> Result<Payload> {
    match files.len() {
        0 => Err(Error::NoFiles),
        1 => {
            let file = files.into_iter().next().ok_or(Error::NoFiles)?;
            tracing::debug!("Sending single file {} as-is", file.name);
            Ok(Payload::from(file))
        }
        count => {
            let name = archive_name(code);
            tracing::info!("Bundling {} files into {}", count, name);

            let mut entries = Vec::with_capacity(count);
            for file in files {
                let bytes = file.source.read_all().await?;
                entries.push((file.name, bytes));
            }

            let archive = tokio::task::spawn_blocking(move || build_archive(entries))
                .await
                .map_err(|e| Error::Internal(format!("archive task failed: {e}")))??;

            let byte_length = archive.len() as u64;
            Ok(Payload::new(
                name,
                byte_length,
                PayloadSource::Memory(Arc::from(archive)),
            ))
        }
    }
}

fn build_archive(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut used = HashSet::new();
    for (name, bytes) in entries {
        let entry_name = unique_entry_name(&name, &mut used);
        zip.start_file(entry_name, options)?;
        zip.write_all(&bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Pick an entry name not yet used in this archive.
///
/// Later duplicates become `name (2).ext`, `name (3).ext`, ...
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };

    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// List the entry names of an archive produced by [`decide`].
///
/// # Errors
///
/// Returns an error if the bytes are not a readable zip archive.
pub fn archive_entries(bytes: &[u8]) -> Result<Vec<String>> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    Ok(archive.file_names().map(str::to_string).collect())
}
