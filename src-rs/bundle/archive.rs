use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::{BundleContent, GeneratedBundle, Variant};
use crate::error::Result;

/// A finished archive, ready to be offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedBundle {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// `My Tour!` becomes `My_Tour__extension.zip` (or `_ai_extension.zip`).
pub fn archive_file_name(workflow_name: &str, variant: &Variant) -> String {
    let stem: String = workflow_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    match variant {
        Variant::Basic => format!("{stem}_extension.zip"),
        Variant::Ai(_) => format!("{stem}_ai_extension.zip"),
    }
}

/// Serialize the bundle into a zip held in memory. Either every entry makes
/// it into the archive or an error comes back and nothing is returned.
pub fn package(bundle: &GeneratedBundle) -> Result<PackagedBundle> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, content) in bundle.entries() {
        // Screenshots are already compressed.
        let method = if content.is_binary() {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        // Fixed timestamps keep the archive byte-identical across runs.
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(DateTime::default());
        writer.start_file(name, options)?;
        writer.write_all(content.as_bytes())?;
    }

    let bytes = writer.finish()?.into_inner();
    let file_name = archive_file_name(&bundle.workflow_name, &bundle.variant);
    debug!(file = %file_name, bytes = bytes.len(), "packaged bundle");
    Ok(PackagedBundle { file_name, bytes })
}

/// Write the bundle as a plain directory, the layout Chrome's "Load unpacked"
/// expects. Returns the paths written.
pub fn write_unpacked(bundle: &GeneratedBundle, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(bundle.len());
    for (name, content) in bundle.entries() {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match content {
            BundleContent::Text(text) => std::fs::write(&path, text)?,
            BundleContent::Binary(bytes) => std::fs::write(&path, bytes)?,
        }
        written.push(path);
    }
    Ok(written)
}
