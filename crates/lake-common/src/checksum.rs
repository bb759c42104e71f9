//! Content fingerprints in the shape S3 reports them
//!
//! For a single-part upload S3 uses the hex MD5 of the body, wrapped in double
//! quotes, as the object's ETag. Computing the same value locally lets the
//! ingester log what the store will report and lets the in-memory store
//! behave like the real one.

use crate::error::Result;
use std::io::Read;
use std::path::Path;

/// ETag S3 would assign to a single-part upload of `data`
pub fn etag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

/// ETag for any readable source
pub fn reader_etag<R: Read>(reader: &mut R) -> Result<String> {
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("\"{:x}\"", context.compute()))
}

/// ETag for a file on disk
pub fn file_etag(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    reader_etag(&mut file)
}

/// Strip the surrounding quotes some APIs keep and others drop
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Compare two ETags regardless of quoting
pub fn etags_match(a: &str, b: &str) -> bool {
    normalize_etag(a) == normalize_etag(b)
}
