//! Lock-name to directory-name mapping.

use std::path::{Path, PathBuf};

use linklock_core::error::{LockError, LockResult};
use sha2::{Digest, Sha512};

/// Directory names are capped well below common filesystem limits.
const MAX_DIR_NAME_LENGTH: usize = 64;

/// Hash suffix length in Base32 characters (80 bits).
const HASH_SUFFIX_CHARS: usize = 16;

/// Base32 alphabet (RFC 4648).
const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Maps a lock name to its directory under `base`.
///
/// ASCII alphanumerics, `-` and `_` are kept as-is; every other character
/// becomes `_`. A Base32-encoded SHA-512 hash suffix keeps distinct names
/// distinct after sanitization and restores case-sensitivity on
/// case-folding filesystems.
pub(crate) fn lock_directory(base: &Path, name: &str) -> LockResult<PathBuf> {
    if name.is_empty() {
        return Err(LockError::InvalidName(
            "lock name cannot be empty".to_string(),
        ));
    }

    let sanitized = sanitize(name);
    let hash = hash_suffix(name.as_bytes());
    let prefix_len = MAX_DIR_NAME_LENGTH
        .saturating_sub(hash.len() + 1)
        .min(sanitized.len());

    Ok(base.join(format!("{}-{}", &sanitized[..prefix_len], hash)))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn hash_suffix(bytes: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    // 10 bytes = 80 bits = 16 Base32 characters, no padding needed.
    let mut chars = String::with_capacity(HASH_SUFFIX_CHARS);
    let mut bit_buffer = 0u32;
    let mut bits_remaining = 0u32;

    for byte in &digest[..10] {
        bit_buffer |= u32::from(*byte) << bits_remaining;
        bits_remaining += 8;

        while bits_remaining >= 5 {
            let index = (bit_buffer & 0x1f) as usize;
            chars.push(BASE32_ALPHABET[index] as char);
            bit_buffer >>= 5;
            bits_remaining -= 5;
        }
    }

    chars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_maps_to_same_directory() {
        let base = Path::new("/locks");
        assert_eq!(
            lock_directory(base, "my-lock").unwrap(),
            lock_directory(base, "my-lock").unwrap()
        );
    }

    #[test]
    fn sanitize_collisions_stay_distinct() {
        let base = Path::new("/locks");
        let slashed = lock_directory(base, "foo/bar").unwrap();
        let underscored = lock_directory(base, "foo_bar").unwrap();
        assert_ne!(slashed, underscored);
        assert!(slashed.to_string_lossy().contains("foo_bar"));
    }

    #[test]
    fn case_differences_stay_distinct() {
        let base = Path::new("/locks");
        assert_ne!(
            lock_directory(base, "Config").unwrap(),
            lock_directory(base, "config").unwrap()
        );
    }

    #[test]
    fn long_names_are_capped() {
        let base = Path::new("/locks");
        let dir = lock_directory(base, &"a".repeat(1000)).unwrap();
        let file_name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.len() <= MAX_DIR_NAME_LENGTH);
        assert!(file_name.starts_with("aaa"));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(lock_directory(Path::new("/locks"), "").is_err());
    }

    #[test]
    fn hash_suffix_is_stable_base32() {
        let suffix = hash_suffix(b"example");
        assert_eq!(suffix.len(), HASH_SUFFIX_CHARS);
        assert!(suffix.bytes().all(|b| BASE32_ALPHABET.contains(&b)));
        assert_eq!(suffix, hash_suffix(b"example"));
    }
}
