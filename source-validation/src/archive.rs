use crate::{errors::ValidationError, files::PathBlob};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// ZIP detection by the 4-byte local-file/empty/spanned signature.
pub fn is_archive(content: &[u8]) -> bool {
    matches!(
        content.get(..4),
        Some([0x50, 0x4b, 0x03 | 0x05 | 0x07, 0x04 | 0x06 | 0x08])
    )
}

/// Replaces every archive blob in the bag with its members, path-preserved.
/// Expansion is single-level: members are not re-scanned for nested archives.
pub fn expand_archives(blobs: Vec<PathBlob>) -> Result<Vec<PathBlob>, ValidationError> {
    let mut expanded = Vec::with_capacity(blobs.len());
    for blob in blobs {
        if !is_archive(&blob.content) {
            expanded.push(blob);
            continue;
        }

        let unreadable = |error: String| ValidationError::ArchiveUnreadable {
            path: blob.path.clone(),
            error,
        };

        let mut archive =
            ZipArchive::new(Cursor::new(&blob.content)).map_err(|e| unreadable(e.to_string()))?;
        for index in 0..archive.len() {
            let mut member = archive
                .by_index(index)
                .map_err(|e| unreadable(e.to_string()))?;
            if !member.is_file() {
                continue;
            }
            let mut content = Vec::with_capacity(member.size() as usize);
            member
                .read_to_end(&mut content)
                .map_err(|e| unreadable(e.to_string()))?;
            expanded.push(PathBlob {
                path: member.name().to_string(),
                content,
            });
        }
    }
    Ok(expanded)
}
