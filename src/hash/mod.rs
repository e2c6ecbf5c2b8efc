//! ETag computation for the bundled object stores

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// ETag for an in-memory object body (hex Blake3, quoted like a service ETag).
pub fn object_etag(body: &[u8]) -> String {
    format!("\"{}\"", blake3::hash(body).to_hex())
}

/// Compute the ETag of a file already on disk
///
/// The file is streamed in 64KB chunks so large objects dropped straight
/// into a store directory never have to be loaded in full.
///
/// # Arguments
/// * `file_path` - Path to the object body
///
/// # Returns
/// * `Ok(String)` - Same value `object_etag` gives for the file's bytes
/// * `Err(io::Error)` - File cannot be read
pub fn file_etag(file_path: &Path) -> io::Result<String> {
    let mut file = File::open(file_path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[0..bytes_read]);
    }

    Ok(format!("\"{}\"", hasher.finalize().to_hex()))
}
