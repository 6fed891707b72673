use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::ModelError;

/// Post-base64 size budget for stored context (etcd object budget minus overhead).
pub const MAX_ENCODED_CONTEXT_BYTES: usize = 1_400_000;

/// Decompression cap to defeat zip bombs on the read path.
pub const MAX_DECOMPRESSED_BYTES: u64 = 10 * 1024 * 1024;

pub const ENCODING_GZIP: &str = "gzip";
pub const ENCODING_NONE: &str = "";

/// Compresses and base64-encodes non-empty context. Returns
/// `(encoded, encoding_tag)`; empty input round-trips to `("", "")`.
/// Rejects input whose encoded form exceeds [`MAX_ENCODED_CONTEXT_BYTES`].
pub fn compress_context(context: &str) -> Result<(String, &'static str), ModelError> {
    if context.is_empty() {
        return Ok((String::new(), ENCODING_NONE));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(context.as_bytes())?;
    let compressed = encoder.finish()?;
    let encoded = BASE64.encode(compressed);
    if encoded.len() > MAX_ENCODED_CONTEXT_BYTES {
        return Err(ModelError::ContextTooLarge {
            actual: encoded.len(),
            limit: MAX_ENCODED_CONTEXT_BYTES,
        });
    }
    Ok((encoded, ENCODING_GZIP))
}

/// Reverses [`compress_context`]. `encoding` must be `"gzip"` or empty.
/// Enforces [`MAX_DECOMPRESSED_BYTES`] while decompressing to defeat zip bombs.
pub fn decompress_context(encoded: &str, encoding: &str) -> Result<String, ModelError> {
    match encoding {
        ENCODING_NONE => {
            if encoded.is_empty() {
                Ok(String::new())
            } else {
                Err(ModelError::InvalidEncoding(encoding.to_string()))
            }
        }
        ENCODING_GZIP => {
            let compressed = BASE64.decode(encoded)?;
            let mut decoder = GzDecoder::new(compressed.as_slice()).take(MAX_DECOMPRESSED_BYTES + 1);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
                return Err(ModelError::DecompressedTooLarge {
                    limit: MAX_DECOMPRESSED_BYTES as usize,
                });
            }
            Ok(String::from_utf8_lossy(&out).into_owned())
        }
        other => Err(ModelError::InvalidEncoding(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_round_trips_to_empty() {
        let (encoded, encoding) = compress_context("").unwrap();
        assert_eq!(encoded, "");
        assert_eq!(encoding, ENCODING_NONE);
        assert_eq!(decompress_context(&encoded, encoding).unwrap(), "");
    }

    #[test]
    fn non_empty_context_round_trips() {
        let original = "please implement the feature described in issue #42".repeat(100);
        let (encoded, encoding) = compress_context(&original).unwrap();
        assert_eq!(encoding, ENCODING_GZIP);
        let decoded = decompress_context(&encoded, encoding).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn oversize_compressed_context_is_rejected() {
        // Random bytes barely compress, so the base64-encoded size stays
        // close to the input size and crosses the budget.
        use rand::Rng;
        let mut rng = rand::rng();
        let original: String = (0..2_000_000).map(|_| rng.random_range(b'a'..=b'z') as char).collect();
        let result = compress_context(&original);
        assert!(matches!(result, Err(ModelError::ContextTooLarge { .. })));
    }

    #[test]
    fn decompression_cap_rejects_zip_bomb() {
        let huge = "a".repeat(20 * 1024 * 1024);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(huge.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        let encoded = BASE64.encode(compressed);
        let result = decompress_context(&encoded, ENCODING_GZIP);
        assert!(matches!(result, Err(ModelError::DecompressedTooLarge { .. })));
    }
}
