use blockscout_display_bytes::Bytes as DisplayBytes;
use sha3::{Digest, Keccak256};

/// keccak256 of a source text, as used for the `sources.*.keccak256` digests
/// of the compiler metadata.
pub fn keccak256(content: &str) -> [u8; 32] {
    Keccak256::digest(content.as_bytes()).into()
}

/// Renders a digest the way metadata manifests carry them:
/// `0x`-prefixed lowercase hex.
pub fn digest_hex(digest: &[u8; 32]) -> String {
    DisplayBytes::from(digest.to_vec()).to_string()
}

type Variator = fn(&str) -> String;

// Line-ending rewrites the source may have gone through in transport.
// `\r?\n -> \r\n` is implemented by normalizing to `\n` first, so a lone
// `\n` and a `\r\n` both end up as `\r\n`.
const CONTENT_VARIATORS: [Variator; 3] = [
    |content| content.to_string(),
    |content| content.replace("\r\n", "\n").replace('\n', "\r\n"),
    |content| content.replace("\r\n", "\n"),
];

const ENDING_VARIATORS: [Variator; 6] = [
    |content| content.to_string(),
    |content| content.trim_end().to_string(),
    |content| format!("{}\n", content.trim_end()),
    |content| format!("{}\r\n", content.trim_end()),
    |content| format!("{content}\n"),
    |content| format!("{content}\r\n"),
];

/// Every semantically equivalent rendition of `content` under line-ending and
/// trailing-whitespace rewrites. The declared digest authenticates the
/// original tree, so reconciliation hashes each variant until one matches.
///
/// Content variators run first, ending variators second; the full product is
/// returned without deduplication (identical variants hash identically and
/// simply overwrite each other in the hash index).
pub fn variations(content: &str) -> Vec<String> {
    CONTENT_VARIATORS
        .iter()
        .flat_map(|content_variator| {
            let varied = content_variator(content);
            ENDING_VARIATORS
                .iter()
                .map(move |ending_variator| ending_variator(&varied))
                .collect::<Vec<_>>()
        })
        .collect()
}
