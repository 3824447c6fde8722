//! Archive format classification.
//!
//! Two independent probes live here. [`detect_format`] answers "what does
//! this file look like" and never fails: extension first (cheap, no I/O),
//! magic bytes as a fallback, `Unknown` when neither matches. [`probe_codec`]
//! answers "which codec can open this" for the validity check and the
//! generic extractor: extension-based codec lookup, then header-based
//! lookup, and an error when both miss. The two call sites have different
//! failure semantics and are deliberately not one shared path.
//!
//! Magic sniffing cannot tell `.tar.gz` from `.gz` without decompressing,
//! so extensions always win for the chained format.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::OpError;

/// Closed set of formats this subsystem recognizes.
///
/// `SevenZ` is detectable by name and header but has no codec, so it always
/// fails [`probe_codec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
    Tar,
    TarGz,
    Gzip,
    Unknown,
}

impl ArchiveFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZ => "7z",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Gzip => "gz",
            ArchiveFormat::Unknown => "unknown",
        }
    }
}

/// Classifies by filename suffix, case-insensitively.
///
/// `.tar.gz` and `.tgz` are checked before `.gz` so the chained format wins.
pub fn detect_from_name(name: &str) -> ArchiveFormat {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        ArchiveFormat::TarGz
    } else if lower.ends_with(".gz") {
        ArchiveFormat::Gzip
    } else if lower.ends_with(".zip") {
        ArchiveFormat::Zip
    } else if lower.ends_with(".7z") {
        ArchiveFormat::SevenZ
    } else if lower.ends_with(".tar") {
        ArchiveFormat::Tar
    } else {
        ArchiveFormat::Unknown
    }
}

/// Classifies by the first bytes of a file.
///
/// zip = `50 4B` then `03` or `05`; 7z = `37 7A BC AF`; gzip = `1F 8B`.
pub fn sniff_header(magic: &[u8]) -> ArchiveFormat {
    if magic.len() >= 3 && magic[0] == 0x50 && magic[1] == 0x4B && (magic[2] == 0x03 || magic[2] == 0x05)
    {
        return ArchiveFormat::Zip;
    }
    if magic.len() >= 4 && magic[0] == 0x37 && magic[1] == 0x7A && magic[2] == 0xBC && magic[3] == 0xAF
    {
        return ArchiveFormat::SevenZ;
    }
    if magic.len() >= 2 && magic[0] == 0x1F && magic[1] == 0x8B {
        return ArchiveFormat::Gzip;
    }
    ArchiveFormat::Unknown
}

/// Detects the archive format of a real path, non-destructively.
///
/// Extension first; when the name is unrecognized, the first four bytes are
/// sniffed. A file that cannot be opened for sniffing is `Unknown`.
pub fn detect_format(rpath: &Path) -> ArchiveFormat {
    let by_name = rpath
        .file_name()
        .map(|n| detect_from_name(&n.to_string_lossy()))
        .unwrap_or(ArchiveFormat::Unknown);
    if by_name != ArchiveFormat::Unknown {
        return by_name;
    }

    let Ok(mut file) = File::open(rpath) else {
        return ArchiveFormat::Unknown;
    };
    let mut magic = [0u8; 4];
    let Ok(n) = file.read(&mut magic) else {
        return ArchiveFormat::Unknown;
    };
    sniff_header(&magic[..n])
}

// ustar tag position inside a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// Codec lookup for the validity check and the generic extractor.
///
/// Tries extension-based lookup over the formats that actually have a codec,
/// then header-based lookup (zip and gzip magic, the `ustar` tag at offset
/// 257). Both missing means "not an archive", reported as
/// [`OpError::UnsupportedFormat`], never `Unknown`.
pub fn probe_codec(rpath: &Path) -> Result<ArchiveFormat, OpError> {
    match detect_from_name(&rpath.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    {
        ArchiveFormat::Zip => return Ok(ArchiveFormat::Zip),
        ArchiveFormat::Tar => return Ok(ArchiveFormat::Tar),
        ArchiveFormat::TarGz => return Ok(ArchiveFormat::TarGz),
        ArchiveFormat::Gzip => return Ok(ArchiveFormat::Gzip),
        _ => {}
    }

    let mut file = File::open(rpath).map_err(|e| OpError::io(e, rpath))?;
    let mut header = [0u8; TAR_MAGIC_OFFSET + TAR_MAGIC.len()];
    let mut filled = 0usize;
    loop {
        let n = file.read(&mut header[filled..]).map_err(|e| OpError::io(e, rpath))?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == header.len() {
            break;
        }
    }
    let header = &header[..filled];

    match sniff_header(header) {
        ArchiveFormat::Zip => return Ok(ArchiveFormat::Zip),
        ArchiveFormat::Gzip => return Ok(ArchiveFormat::Gzip),
        _ => {}
    }
    if header.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        return Ok(ArchiveFormat::Tar);
    }

    Err(OpError::UnsupportedFormat(format!(
        "'{}' is not a recognized archive",
        rpath.display()
    )))
}
