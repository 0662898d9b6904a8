//! Streaming MD5 content digest.
//!
//! Files are read in fixed-size chunks so memory use is independent of file
//! size.
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size per `read` call.
const CHUNK_SIZE: usize = 64 * 1024;

/// Digest every byte `reader` yields and return the lowercase hex string
/// (always 32 characters, leading zeros kept).
pub fn md5_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Open `path` and digest its contents.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    md5_reader(file)
}
