//! Block level output for [`MdfWriter`](super::MdfWriter).

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::Path,
};

use crate::Result;

/// Buffered output file that keeps 8-byte block alignment and patches
/// fields of blocks written earlier.
#[derive(Debug)]
pub(crate) struct BlockWriter {
    inner: BufWriter<File>,
    offset: u64,
}

impl BlockWriter {
    /// Creates (or truncates) `path` with a 1 MB buffer.
    pub fn create(path: &Path) -> Result<Self> {
        Self::with_capacity(path, 1_048_576)
    }

    pub fn with_capacity(path: &Path, capacity: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: BufWriter::with_capacity(capacity, file),
            offset: 0,
        })
    }

    /// End of the written data; the next block starts here after alignment.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Writes `bytes` at the end of the file, zero padding to 8 bytes first.
    /// Returns the start of the block.
    pub fn write_block(&mut self, bytes: &[u8]) -> Result<u64> {
        let align = (8 - (self.offset % 8)) % 8;
        if align != 0 {
            self.inner.write_all(&[0u8; 8][..align as usize])?;
            self.offset += align;
        }
        let start = self.offset;
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(start)
    }

    /// Writes `bytes` at the end of the file without alignment (MDF3 data).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<u64> {
        let start = self.offset;
        self.inner.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(start)
    }

    /// Overwrites bytes at `position` and returns to the end of the file.
    pub fn update_bytes(&mut self, position: u64, bytes: &[u8]) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.inner.write_all(bytes)?;
        self.inner.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Patches a 64-bit link.
    pub fn update_link(&mut self, position: u64, address: u64) -> Result<()> {
        self.update_bytes(position, &address.to_le_bytes())
    }

    /// Patches a 32-bit MDF3 link.
    pub fn update_link_v3(&mut self, position: u64, address: u64) -> Result<()> {
        let address = u32::try_from(address).map_err(|_| {
            crate::Error::BlockLinkError(format!(
                "address {address:#x} does not fit the 32-bit MDF3 address space"
            ))
        })?;
        self.update_u32(position, address)
    }

    pub fn update_u32(&mut self, position: u64, value: u32) -> Result<()> {
        self.update_bytes(position, &value.to_le_bytes())
    }

    pub fn update_u64(&mut self, position: u64, value: u64) -> Result<()> {
        self.update_bytes(position, &value.to_le_bytes())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_aligned_and_patchable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut out = BlockWriter::create(&path).unwrap();
        assert_eq!(out.write_block(&[1, 2, 3]).unwrap(), 0);
        assert_eq!(out.write_block(&[0u8; 8]).unwrap(), 8);
        out.update_link(8, 0x1122).unwrap();
        out.update_u32(0, 0xAABBCCDD).unwrap();
        assert_eq!(out.write_raw(&[9]).unwrap(), 16);
        out.flush().unwrap();
        drop(out);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[0..4], &0xAABBCCDDu32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x1122u64.to_le_bytes());
        assert_eq!(bytes[16], 9);
    }

    #[test]
    fn mdf3_links_must_fit_32_bits() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = BlockWriter::create(&dir.path().join("v3.bin")).unwrap();
        out.write_block(&[0u8; 8]).unwrap();
        assert!(out.update_link_v3(0, u64::from(u32::MAX) + 1).is_err());
    }
}
