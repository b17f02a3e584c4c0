use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{info, warn};

use crate::{parse_file, ParsedFile};

/// File extensions this reader expects (optionally with a trailing `.gz`).
pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["txt", "csv"];

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read and parse a consumer genotype file from disk. Gzipped content is
/// detected from its magic bytes rather than the file name, so both
/// `.txt` and `.txt.gz` inputs go through the same path.
///
/// # Errors
/// - any I/O failure while reading or decompressing;
/// - any [`crate::GenofileError`] raised by [`parse_file`].
pub fn parse_path(path: &Path) -> Result<ParsedFile> {
    check_extension(path);

    let bytes = fs::read(path)
        .with_context(|| format!("While reading genotype file {}", path.display()))?;

    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .with_context(|| format!("While decompressing {}", path.display()))?;
        decoded
    } else {
        String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?
    };

    info!("Parsing genotype file {}", path.display());
    let parsed = parse_file(&text)
        .with_context(|| format!("While parsing genotype file {}", path.display()))?;
    info!("Detected source: {} | build: {} | {} SNPs", parsed.source, parsed.build, parsed.snp_count());
    Ok(parsed)
}

fn check_extension(path: &Path) {
    let stripped = match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => path.with_extension(""),
        _          => path.to_path_buf(),
    };
    let recognised = stripped
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if !recognised {
        warn!("Unexpected file extension for {} (expected .txt or .csv, optionally gzipped)", path.display());
    }
}
