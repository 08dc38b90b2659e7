/// A single input unit: raw bytes plus the path they were loaded from.
/// The path is a diagnostic key only; reconciliation matches by digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBlob {
    pub path: String,
    pub content: Vec<u8>,
}

impl PathBlob {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// UTF-8 view of the blob. Sources must round-trip through UTF-8;
    /// blobs that do not are excluded from hashing and reported as unused.
    pub fn into_text(self) -> Result<PathContent, String> {
        match String::from_utf8(self.content) {
            Ok(content) => Ok(PathContent {
                path: self.path,
                content,
            }),
            Err(_) => Err(self.path),
        }
    }
}

/// A decoded text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContent {
    pub path: String,
    pub content: String,
}

impl PathContent {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}
