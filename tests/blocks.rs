use std::io::Cursor;

use mdf_engine::{
    Generation, Result,
    blocks::{BlockCodec, BlockHeader, BlockParse, DataListBlock, IdentificationBlock, TextBlock},
};

#[test]
fn identification_block_round_trip() -> Result<()> {
    for generation in [Generation::Mdf3, Generation::Mdf4] {
        let id = IdentificationBlock::new(generation, "bench");
        let bytes = id.to_bytes()?;
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..8], b"MDF     ");
        let parsed = IdentificationBlock::from_bytes(&bytes)?;
        assert_eq!(parsed.generation()?, generation);
        assert_eq!(parsed.program_id.trim(), "bench");
        assert!(parsed.is_finalized());
    }
    Ok(())
}

#[test]
fn foreign_bytes_are_not_an_identification_block() {
    let mut bytes = b"VERSION \"\"\n\nBU_: ECU\n".to_vec();
    bytes.resize(64, b' ');
    assert!(IdentificationBlock::from_bytes(&bytes).is_err());
}

#[test]
fn block_header_generations() -> Result<()> {
    let v4 = BlockHeader::new("##TX", 32, 0).to_bytes()?;
    assert_eq!(v4.len(), 24);
    assert_eq!(BlockHeader::from_bytes(&v4)?.length, 32);

    let v3 = BlockHeader::new("TX", 12, 0).to_bytes_v3()?;
    assert_eq!(v3, vec![b'T', b'X', 12, 0]);
    assert!(BlockHeader::new("TX", 70_000, 0).to_bytes_v3().is_err());
    Ok(())
}

#[test]
fn data_list_through_the_codec() -> Result<()> {
    let mut file = vec![0u8; 64];
    file.extend(TextBlock::new("padding").to_bytes()?);
    let position = file.len() as u64;
    file.extend(DataListBlock::new(vec![0x100, 0x200, 0x300], &[16, 16, 8]).to_bytes()?);

    let codec = BlockCodec::new(Generation::Mdf4, file.len() as u64);
    let mut stream = Cursor::new(file);
    let list = DataListBlock::read_at(&codec, &mut stream, position)?;
    assert_eq!(list.data_links, vec![0x100, 0x200, 0x300]);
    assert_eq!(list.next, 0);

    // A text block is not a data list.
    assert!(DataListBlock::read_at(&codec, &mut stream, 64).is_err());
    // Absent links are errors, not panics.
    assert!(codec.decode_block(&mut stream, 0).is_err());
    Ok(())
}
