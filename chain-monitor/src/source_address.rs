use blockscout_display_bytes::Bytes as DisplayBytes;
use minicbor::{data::Type, Decoder};
use thiserror::Error;

// The CBOR trailer length occupies the final two bytes of deployed code,
// big-endian.
const TRAILER_LENGTH_BYTES: usize = 2;

const SWARM_DIGEST_SIZE: usize = 32;

/// A content-addressed reference to the metadata of a deployed contract,
/// decoded from the CBOR trailer the compiler appends to runtime bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceAddress {
    /// IPFS multihash bytes (typically 0x1220 + sha2-256 digest).
    Ipfs(Vec<u8>),
    /// Swarm digest, bzzr revision 0.
    Bzzr0([u8; SWARM_DIGEST_SIZE]),
    /// Swarm digest, bzzr revision 1.
    Bzzr1([u8; SWARM_DIGEST_SIZE]),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bytecode is too short to carry a metadata trailer")]
    TooShort,
    #[error("declared trailer length {length} exceeds bytecode size {size}")]
    LengthOutOfBounds { length: usize, size: usize },
    #[error("trailer is not a valid CBOR map: {0}")]
    Cbor(String),
    #[error("invalid swarm digest size; expected={SWARM_DIGEST_SIZE}, found={0}")]
    InvalidSwarmDigestSize(usize),
    #[error("no recognized metadata pointer in trailer")]
    NoMetadataPointer,
}

impl SourceAddress {
    /// Decodes the metadata pointer out of deployed bytecode: the last two
    /// bytes give the length of the CBOR map that precedes them.
    pub fn from_deployed_code(code: &[u8]) -> Result<Self, DecodeError> {
        if code.len() < TRAILER_LENGTH_BYTES {
            return Err(DecodeError::TooShort);
        }
        let length =
            u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
        let end = code.len() - TRAILER_LENGTH_BYTES;
        if length > end {
            return Err(DecodeError::LengthOutOfBounds {
                length,
                size: code.len(),
            });
        }
        Self::from_cbor(&code[end - length..end])
    }

    /// Decodes a raw CBOR trailer map, returning the first recognized
    /// storage pointer. Unrecognized keys (`solc`, `experimental`, ...) are
    /// skipped.
    pub fn from_cbor(trailer: &[u8]) -> Result<Self, DecodeError> {
        let cbor = |e: minicbor::decode::Error| DecodeError::Cbor(e.to_string());

        let mut d = Decoder::new(trailer);
        let entries = d
            .map()
            .map_err(cbor)?
            .ok_or_else(|| DecodeError::Cbor("indefinite-length map".to_string()))?;

        for _ in 0..entries {
            if d.datatype().map_err(cbor)? != Type::String {
                d.skip().map_err(cbor)?;
                d.skip().map_err(cbor)?;
                continue;
            }
            let key = d.str().map_err(cbor)?.to_string();
            match key.as_str() {
                "ipfs" => return Ok(Self::Ipfs(d.bytes().map_err(cbor)?.to_vec())),
                "bzzr0" => return Ok(Self::Bzzr0(swarm_digest(d.bytes().map_err(cbor)?)?)),
                "bzzr1" => return Ok(Self::Bzzr1(swarm_digest(d.bytes().map_err(cbor)?)?)),
                _ => d.skip().map_err(cbor)?,
            }
        }
        Err(DecodeError::NoMetadataPointer)
    }

    /// The storage-network name, as spelled in the trailer.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Ipfs(_) => "ipfs",
            Self::Bzzr0(_) => "bzzr0",
            Self::Bzzr1(_) => "bzzr1",
        }
    }

    /// The content identifier in the network's native notation: base58 for
    /// IPFS multihashes, unprefixed hex for Swarm digests.
    pub fn location(&self) -> String {
        match self {
            Self::Ipfs(multihash) => bs58::encode(multihash).into_string(),
            Self::Bzzr0(digest) | Self::Bzzr1(digest) => {
                DisplayBytes::from(digest.to_vec())
                    .to_string()
                    .trim_start_matches("0x")
                    .to_string()
            }
        }
    }

    /// Parses the url notations manifests use in `sources.*.urls`.
    pub fn from_url(url: &str) -> Option<Self> {
        if let Some(cid) = url
            .strip_prefix("dweb:/ipfs/")
            .or_else(|| url.strip_prefix("ipfs://"))
        {
            return bs58::decode(cid).into_vec().ok().map(Self::Ipfs);
        }
        if let Some(digest) = url.strip_prefix("bzz-raw://") {
            let bytes = blockscout_display_bytes::decode_hex(digest).ok()?;
            return swarm_digest(&bytes).ok().map(Self::Bzzr1);
        }
        None
    }
}

fn swarm_digest(bytes: &[u8]) -> Result<[u8; SWARM_DIGEST_SIZE], DecodeError> {
    <[u8; SWARM_DIGEST_SIZE]>::try_from(bytes)
        .map_err(|_| DecodeError::InvalidSwarmDigestSize(bytes.len()))
}
