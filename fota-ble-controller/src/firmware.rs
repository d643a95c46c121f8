//! Firmware image loading

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::FotaError;

/// The binary to flash, read once and never modified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FotaError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FotaError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercase hex SHA-256 of the image
    pub fn sha256_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(&Sha256::digest(&self.data))
    }

    /// Number of binary stream writes needed at `fragment_size`
    pub fn fragment_count(&self, fragment_size: usize) -> usize {
        self.data.len().div_ceil(fragment_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_and_fragment_count() {
        let image = FirmwareImage::from_bytes(b"abc".to_vec());
        assert_eq!(
            image.sha256_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(image.fragment_count(128), 1);

        let image = FirmwareImage::from_bytes(vec![0; 300]);
        assert_eq!(image.fragment_count(128), 3);
        let image = FirmwareImage::from_bytes(vec![0; 256]);
        assert_eq!(image.fragment_count(128), 2);
        assert_eq!(FirmwareImage::from_bytes(Vec::new()).fragment_count(128), 0);
    }

    #[test]
    fn unreadable_file() {
        let path = std::env::temp_dir().join("fota-no-such-image.bin");
        match FirmwareImage::load(&path) {
            Err(FotaError::FileUnreadable { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected FileUnreadable, got {other:?}"),
        }
    }

    #[test]
    fn load_reads_the_whole_file() {
        let path = std::env::temp_dir().join(format!("fota-image-{}.bin", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        let image = FirmwareImage::load(&path).unwrap();
        assert_eq!(image.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(image.len(), 4);
        std::fs::remove_file(&path).unwrap();
    }
}
