use mdf_rs::blocks::channel_block::{ChannelBlock, ChannelType};
use mdf_rs::blocks::channel_group_block::ChannelGroupBlock;
use mdf_rs::blocks::common::{BlockHeader, BlockParse, DataType};
use mdf_rs::blocks::data_block::{dt_block_bytes, DataBlock};
use mdf_rs::blocks::data_group_block::DataGroupBlock;
use mdf_rs::blocks::data_list_block::DataListBlock;
use mdf_rs::blocks::dz_block::DzCompressionType;
use mdf_rs::blocks::header_block::HeaderBlock;
use mdf_rs::blocks::header_list_block::HeaderListBlock;
use mdf_rs::blocks::identification_block::IdentificationBlock;
use mdf_rs::blocks::metadata_block::MetadataBlock;
use mdf_rs::blocks::registry::{find, Block};
use mdf_rs::blocks::sample_reduction_block::SampleReductionBlock;
use mdf_rs::blocks::signal_data_block::SignalDataBlock;
use mdf_rs::blocks::source_block::SourceBlock;
use mdf_rs::blocks::text_block::TextBlock;
use mdf_rs::error::MdfError;

#[test]
fn block_header_roundtrip() -> Result<(), MdfError> {
    let h = BlockHeader::new("TEST", 64, 2);
    let bytes = h.to_bytes()?;
    let parsed = BlockHeader::from_bytes(&bytes)?;
    assert_eq!(parsed.id, "TEST");
    assert_eq!(parsed.block_len, 64);
    assert_eq!(parsed.links_nr, 2);
    Ok(())
}

#[test]
fn text_block_roundtrip() -> Result<(), MdfError> {
    let tb = TextBlock::new("hello");
    let bytes = tb.to_bytes()?;
    assert_eq!(bytes.len() % 8, 0);
    let parsed = TextBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.text, "hello");
    Ok(())
}

#[test]
fn metadata_block_roundtrip() -> Result<(), MdfError> {
    let md = MetadataBlock::new("<x/>");
    let bytes = md.to_bytes()?;
    let parsed = MetadataBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.xml, "<x/>");
    Ok(())
}

#[test]
fn data_block_parse() -> Result<(), MdfError> {
    let data = vec![1u8, 2, 3, 4];
    let bytes = dt_block_bytes(&data)?;
    let block = DataBlock::from_bytes(&bytes)?;
    assert_eq!(block.data, &data[..]);
    Ok(())
}

#[test]
fn data_list_block_equal_roundtrip() -> Result<(), MdfError> {
    let dl = DataListBlock::new_equal(vec![0x10, 0x20], 8);
    let bytes = dl.to_bytes()?;
    let parsed = DataListBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.data_links, vec![0x10, 0x20]);
    assert_eq!(parsed.equal_length, Some(8));
    assert_eq!(parsed.element_offset(1), 8);
    Ok(())
}

#[test]
fn data_list_block_offsets_roundtrip() -> Result<(), MdfError> {
    let dl = DataListBlock::new_with_offsets(vec![0x100, 0x200], vec![0, 4096]);
    let bytes = dl.to_bytes()?;
    let parsed = DataListBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.offsets, vec![0, 4096]);
    assert_eq!(parsed.equal_length, None);
    Ok(())
}

#[test]
fn data_list_block_rejects_backwards_offsets() -> Result<(), MdfError> {
    let dl = DataListBlock::new_with_offsets(vec![0x100, 0x200], vec![4096, 0]);
    let bytes = dl.to_bytes()?;
    assert!(matches!(
        DataListBlock::from_bytes(&bytes),
        Err(MdfError::LengthMismatch { .. })
    ));
    Ok(())
}

#[test]
fn header_list_block_roundtrip() -> Result<(), MdfError> {
    let mut hl = HeaderListBlock::new(DzCompressionType::Deflate);
    hl.first_dl_addr = 0x400;
    let bytes = hl.to_bytes()?;
    let parsed = HeaderListBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.first_dl_addr, 0x400);
    assert_eq!(parsed.zip_type, DzCompressionType::Deflate);
    Ok(())
}

#[test]
fn signal_data_block_parse() -> Result<(), MdfError> {
    let h = BlockHeader::new("##SD", 32, 0);
    let mut bytes = h.to_bytes()?;
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.push(42);
    bytes.extend_from_slice(&[0u8; 3]);
    let sd = SignalDataBlock::from_bytes(&bytes)?;
    assert_eq!(sd.data[0..4], 1u32.to_le_bytes());
    assert_eq!(sd.value_at(0)?, &[42]);
    Ok(())
}

#[test]
fn source_block_roundtrip() -> Result<(), MdfError> {
    let mut sb = SourceBlock::default();
    sb.name_addr = 1;
    sb.path_addr = 2;
    sb.comment_addr = 3;
    sb.bus_type = 2;
    sb.flags = 3;
    let bytes = sb.to_bytes()?;
    let parsed = SourceBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.name_addr, 1);
    assert_eq!(parsed.path_addr, 2);
    assert_eq!(parsed.comment_addr, 3);
    assert_eq!(parsed.bus_type, 2);
    assert_eq!(parsed.flags, 3);
    Ok(())
}

#[test]
fn sample_reduction_roundtrip() -> Result<(), MdfError> {
    let mut sr = SampleReductionBlock {
        header: BlockHeader::new("##SR", 64, 2),
        next_sr_addr: 0,
        data_addr: 0x800,
        cycles_nr: 500,
        interval: 0.25,
        sync_type: 1,
        flags: 0,
    };
    sr.cycles_nr = 500;
    let bytes = sr.to_bytes()?;
    let parsed = SampleReductionBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.cycles_nr, 500);
    assert_eq!(parsed.interval, 0.25);
    assert_eq!(parsed.data_addr, 0x800);
    Ok(())
}

#[test]
fn identification_block_roundtrip() -> Result<(), MdfError> {
    let ib = IdentificationBlock::default();
    let bytes = ib.to_bytes()?;
    let parsed = IdentificationBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.version_number, ib.version_number);
    assert!(parsed.is_mdf4());
    assert!(parsed.is_finalized());
    Ok(())
}

#[test]
fn identification_block_v3_flavor() -> Result<(), MdfError> {
    let ib = IdentificationBlock::new_v3();
    let bytes = ib.to_bytes()?;
    let parsed = IdentificationBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.version_number, 330);
    assert!(!parsed.is_mdf4());
    Ok(())
}

#[test]
fn identification_block_accepts_unfinished_magic() -> Result<(), MdfError> {
    let mut ib = IdentificationBlock::default();
    ib.file_identifier = String::from("UnFinMF ");
    let bytes = ib.to_bytes()?;
    let parsed = IdentificationBlock::from_bytes(&bytes)?;
    assert!(!parsed.is_finalized());
    Ok(())
}

#[test]
fn header_block_roundtrip() -> Result<(), MdfError> {
    let mut hb = HeaderBlock::default();
    hb.abs_time = 123_456_789;
    hb.set_start_angle(1.5);
    let bytes = hb.to_bytes()?;
    let parsed = HeaderBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.abs_time, 123_456_789);
    assert_eq!(parsed.start_angle(), Some(1.5));
    assert_eq!(parsed.start_distance(), None);
    Ok(())
}

#[test]
fn data_group_block_roundtrip() -> Result<(), MdfError> {
    let dg = DataGroupBlock::default();
    let bytes = dg.to_bytes()?;
    let parsed = DataGroupBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.record_id_len, dg.record_id_len);
    Ok(())
}

#[test]
fn data_group_block_rejects_bad_record_id_size() {
    let mut dg = DataGroupBlock::default();
    dg.record_id_len = 3;
    assert!(dg.to_bytes().is_err());
}

#[test]
fn channel_group_block_roundtrip() -> Result<(), MdfError> {
    let mut cg = ChannelGroupBlock::default();
    cg.samples_byte_nr = 16;
    cg.invalidation_bytes_nr = 2;
    let bytes = cg.to_bytes()?;
    let parsed = ChannelGroupBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.samples_byte_nr, 16);
    assert_eq!(parsed.record_len(), 18);
    Ok(())
}

#[test]
fn channel_block_roundtrip() -> Result<(), MdfError> {
    let mut ch = ChannelBlock::default();
    ch.channel_type = ChannelType::Master;
    ch.data_type = DataType::FloatLE;
    ch.bit_count = 32;
    let bytes = ch.to_bytes()?;
    let parsed = ChannelBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.bit_count, 32);
    assert_eq!(parsed.channel_type, ChannelType::Master);
    assert_eq!(parsed.data_type, DataType::FloatLE);
    Ok(())
}

#[test]
fn registry_dispatch_and_find() -> Result<(), MdfError> {
    // A tiny synthetic tree: HD at 0 linking a DG, then a TX.
    let mut buffer = Vec::new();

    let mut hd = HeaderBlock::default();
    let dg_offset = 104u64;
    hd.first_dg_addr = dg_offset;
    buffer.extend_from_slice(&hd.to_bytes()?);

    let mut dg = DataGroupBlock::default();
    let tx_offset = dg_offset + 64;
    dg.comment_addr = tx_offset;
    buffer.extend_from_slice(&dg.to_bytes()?);

    buffer.extend_from_slice(&TextBlock::new("a comment").to_bytes()?);

    let parsed = Block::parse_at(&buffer, 0)?;
    assert!(matches!(parsed, Block::Header(_)));
    assert_eq!(parsed.child_links(), vec![dg_offset]);

    let found = find(&buffer, 0, tx_offset)?;
    match found {
        Some(Block::Text(tx)) => assert_eq!(tx.text, "a comment"),
        other => panic!("expected text block, found {:?}", other.map(|b| b.header().id)),
    }

    let props = parsed.block_properties();
    assert!(props.iter().any(|p| p.label == "Type" && p.value == "##HD"));
    assert!(parsed.properties_json().contains("##HD"));
    Ok(())
}

#[test]
fn registry_keeps_unknown_tags_opaque() -> Result<(), MdfError> {
    let mut bytes = BlockHeader::new("##ZZ", 32, 0).to_bytes()?;
    bytes.extend_from_slice(&[7u8; 8]);
    let parsed = Block::parse_at(&bytes, 0)?;
    match parsed {
        Block::Opaque { header, payload } => {
            assert_eq!(header.id, "##ZZ");
            assert_eq!(payload, &[7u8; 8]);
        }
        _ => panic!("expected opaque block"),
    }
    Ok(())
}
