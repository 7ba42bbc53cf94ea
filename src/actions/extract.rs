// src/actions/extract.rs

use crate::constants::keys;
use crate::core::action_runner::{ActionBody, ActionError, ActionResult};
use crate::core::context::ActionContext;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Unpacks a `.tar`, `.tar.gz` or `.tgz` archive into a directory.
#[derive(Debug, Default)]
pub struct ExtractAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Tar,
    TarGz,
}

impl ArchiveFormat {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

impl ActionBody for ExtractAction {
    fn run(&mut self, cx: &ActionContext<'_>) -> ActionResult {
        let archive = cx.require_path(keys::ARCHIVE_PATH)?;
        let output = cx.require_path(keys::OUTPUT_PATH)?;
        let format = ArchiveFormat::detect(&archive).ok_or_else(|| {
            ActionError::Malformed(format!("Unsupported archive format: '{}'", archive.display()))
        })?;

        if cx.dry_run() {
            log::info!("[dry-run] extract '{}' into '{}'", archive.display(), output.display());
            return Ok(());
        }

        log::info!("Extracting '{}' into '{}'", archive.display(), output.display());
        let file = File::open(&archive)
            .map_err(|e| ActionError::io(format!("Opening '{}'", archive.display()), e))?;
        cx.create_dir_all(&output)?;
        match format {
            ArchiveFormat::Tar => unpack(file, &archive, &output),
            ArchiveFormat::TarGz => unpack(GzDecoder::new(file), &archive, &output),
        }
    }
}

fn unpack<R: Read>(reader: R, archive: &Path, output: &Path) -> ActionResult {
    tar::Archive::new(reader)
        .unpack(output)
        .map_err(|e| ActionError::io(format!("Extracting '{}'", archive.display()), e))
}
