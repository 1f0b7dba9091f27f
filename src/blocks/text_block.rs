use std::io::{Read, Seek};

use crate::{
    Result,
    blocks::common::{BlockCodec, BlockParse, Generation, RawBlock, encode_v3, encode_v4, padding_to_align_8},
};

/// Plain text block (##TX in MDF4, TX in MDF3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub text: String,
}

/// XML metadata block (##MD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    pub xml: String,
}

fn decode_text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// NUL terminated text padded to the 8-byte grid.
fn text_payload(text: &str) -> Vec<u8> {
    let mut data = text.as_bytes().to_vec();
    data.push(0);
    let pad = padding_to_align_8(24 + data.len());
    data.resize(data.len() + pad, 0);
    data
}

impl BlockParse for TextBlock {
    const ID: &'static str = "##TX";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        Ok(Self {
            text: decode_text(&block.data),
        })
    }
}

impl BlockParse for MetadataBlock {
    const ID: &'static str = "##MD";

    fn from_raw(block: &RawBlock) -> Result<Self> {
        Ok(Self {
            xml: decode_text(&block.data),
        })
    }
}

impl TextBlock {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_v4(Self::ID, &[], &text_payload(&self.text))
    }

    /// MDF3 TX block: NUL terminated, no alignment.
    pub fn to_bytes_v3(&self) -> Result<Vec<u8>> {
        let mut data = latin1_bytes(&self.text);
        data.push(0);
        encode_v3("TX", &[], &data)
    }
}

impl MetadataBlock {
    pub fn new(xml: &str) -> Self {
        Self {
            xml: xml.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_v4(Self::ID, &[], &text_payload(&self.xml))
    }
}

/// Encodes MDF3 text, replacing characters outside Latin-1.
pub fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

/// Reads the TX or MD block at `address`; `Ok(None)` for an absent link or a
/// block of any other type.
pub fn read_text_at<R: Read + Seek>(
    codec: &BlockCodec,
    stream: &mut R,
    address: u64,
) -> Result<Option<String>> {
    if address == 0 {
        return Ok(None);
    }
    let raw = codec.decode_block(stream, address)?;
    let text = match (codec.generation(), raw.id()) {
        (Generation::Mdf4, "##TX") | (Generation::Mdf4, "##MD") => decode_text(&raw.data),
        (Generation::Mdf3, "TX") => {
            let end = raw.data.iter().position(|&b| b == 0).unwrap_or(raw.data.len());
            raw.data[..end].iter().map(|&b| b as char).collect()
        }
        _ => return Ok(None),
    };
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn text_blocks_are_aligned_and_nul_terminated() {
        let bytes = TextBlock::new("rpm").to_bytes().unwrap();
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(&bytes[24..28], b"rpm\0");
    }

    #[test]
    fn read_text_handles_both_generations() {
        let mut file = vec![0u8; 8];
        file.extend(MetadataBlock::new("<HDcomment/>").to_bytes().unwrap());
        let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
        let text = read_text_at(&codec, &mut Cursor::new(&file), 8).unwrap();
        assert_eq!(text.as_deref(), Some("<HDcomment/>"));
        assert_eq!(read_text_at(&codec, &mut Cursor::new(&file), 0).unwrap(), None);

        let mut file = vec![0u8; 4];
        file.extend(TextBlock::new("Grüße").to_bytes_v3().unwrap());
        let codec = BlockCodec::new(Generation::Mdf3, file.len() as u64);
        let text = read_text_at(&codec, &mut Cursor::new(&file), 4).unwrap();
        assert_eq!(text.as_deref(), Some("Grüße"));
    }
}
