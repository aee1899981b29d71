//! This module contains functions for hashing bundles and checking if they have changed.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct Hasher;

impl Hasher {
    /// Hashes a byte slice and returns the hash as a lowercase hex string.
    pub fn hash_bytes(content: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(content);
        to_hex(&hasher.finalize())
    }

    /// Hashes a file in chunks and returns the hash as a string.
    /// # Arguments
    /// * `path` - The path of the file to hash.
    pub fn hash_file(path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0; CHUNK_SIZE];
        let mut hasher = Sha1::new();
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(to_hex(&hasher.finalize()))
    }

    /// Returns `Some(true)` if the file at `path` differs from `expected`,
    /// `None` if there is no file.
    pub fn is_file_changed(path: &Path, expected: &[u8]) -> io::Result<Option<bool>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Hasher::hash_file(path)? != Hasher::hash_bytes(expected)))
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
