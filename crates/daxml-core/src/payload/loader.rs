//! DA loader image regions.
//!
//! The loader container format is not parsed here; region offsets, lengths,
//! load addresses and signature lengths come from configuration.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DaError;

/// Where a stage lives inside the loader file and where it runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Byte offset inside the loader file.
    pub offset: u64,
    /// Region length including the signature.
    pub length: u64,
    /// Load/jump address on the device.
    pub address: u32,
    /// Trailing signature length.
    pub signature_len: u32,
}

/// One loader stage cut out of the loader file.
#[derive(Debug, Clone)]
pub struct LoaderRegion {
    pub data: Vec<u8>,
    pub address: u32,
    pub signature_len: u32,
}

impl LoaderRegion {
    pub fn new(data: Vec<u8>, address: u32, signature_len: u32) -> Self {
        Self {
            data,
            address,
            signature_len,
        }
    }

    /// Region bytes without the trailing signature.
    pub fn unsigned_payload(&self) -> &[u8] {
        let sig = (self.signature_len as usize).min(self.data.len());
        &self.data[..self.data.len() - sig]
    }
}

/// Stage 1 and stage 2 of a download agent.
#[derive(Debug, Clone)]
pub struct DaLoader {
    pub stage1: LoaderRegion,
    pub stage2: LoaderRegion,
}

impl DaLoader {
    pub fn from_bytes(file: &[u8], stage1: &RegionSpec, stage2: &RegionSpec) -> Result<Self, DaError> {
        Ok(Self {
            stage1: Self::cut(file, stage1, "stage 1")?,
            stage2: Self::cut(file, stage2, "stage 2")?,
        })
    }

    pub fn load_from_file<P: AsRef<std::path::Path>>(
        path: P,
        stage1: &RegionSpec,
        stage2: &RegionSpec,
    ) -> Result<Self, DaError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading DA loader");
        let file = std::fs::read(path)
            .map_err(|e| DaError::Loader(format!("{}: {}", path.display(), e)))?;
        Self::from_bytes(&file, stage1, stage2)
    }

    fn cut(file: &[u8], spec: &RegionSpec, name: &str) -> Result<LoaderRegion, DaError> {
        let start = spec.offset as usize;
        let end = start
            .checked_add(spec.length as usize)
            .filter(|&end| end <= file.len())
            .ok_or_else(|| {
                DaError::Loader(format!(
                    "{} region 0x{:x}+0x{:x} exceeds loader size 0x{:x}",
                    name,
                    spec.offset,
                    spec.length,
                    file.len()
                ))
            })?;
        if (spec.signature_len as u64) > spec.length {
            return Err(DaError::Loader(format!(
                "{} signature length 0x{:x} exceeds region length 0x{:x}",
                name, spec.signature_len, spec.length
            )));
        }
        Ok(LoaderRegion::new(
            file[start..end].to_vec(),
            spec.address,
            spec.signature_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(offset: u64, length: u64, sig: u32) -> RegionSpec {
        RegionSpec {
            offset,
            length,
            address: 0x200000,
            signature_len: sig,
        }
    }

    #[test]
    fn test_cut_regions() {
        let file: Vec<u8> = (0..=255u8).collect();
        let loader = DaLoader::from_bytes(&file, &spec(0x10, 0x20, 0), &spec(0x40, 0x40, 0x10)).unwrap();
        assert_eq!(loader.stage1.data.len(), 0x20);
        assert_eq!(loader.stage1.data[0], 0x10);
        assert_eq!(loader.stage2.data.len(), 0x40);
        assert_eq!(loader.stage2.unsigned_payload().len(), 0x30);
        assert_eq!(*loader.stage2.unsigned_payload().last().unwrap(), 0x6F);
    }

    #[test]
    fn test_region_out_of_range() {
        let file = vec![0u8; 0x100];
        let err = DaLoader::from_bytes(&file, &spec(0xF0, 0x20, 0), &spec(0, 0x10, 0)).unwrap_err();
        assert!(matches!(err, DaError::Loader(_)));
    }

    #[test]
    fn test_signature_longer_than_region() {
        let file = vec![0u8; 0x100];
        assert!(DaLoader::from_bytes(&file, &spec(0, 0x10, 0), &spec(0, 0x10, 0x20)).is_err());
    }
}
