use mdf_rs::api::mdf::{MdfFile, MDF};
use mdf_rs::error::MdfError;
use mdf_rs::parsing::decoder::DecodedValue;
use mdf_rs::v3::header_block::Hd3Block;
use mdf_rs::v3::writer::Mdf3Writer;
use mdf_rs::v3::V3Cursor;

fn temp_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

#[test]
fn v3_write_read_roundtrip() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "legacy.mdf");

    let mut writer = Mdf3Writer::new(&path)?;
    let header = Hd3Block {
        author: String::from("test bench"),
        organisation: String::from("lab"),
        project: String::from("rig 4"),
        subject: String::from("engine"),
        abs_time: 1_700_000_000_000_000_000,
        ..Default::default()
    };
    writer.init_file(&header)?;

    let dg = writer.add_data_group()?;
    let cg = writer.add_channel_group(&dg)?;
    writer.add_channel(
        &cg,
        |cn| {
            cn.short_name = String::from("t");
            cn.channel_type = 1; // time master
            cn.signal_type = 3; // double
            cn.nof_bits = 64;
        },
        Some("s"),
        None,
    )?;
    writer.add_channel(
        &cg,
        |cn| {
            cn.short_name = String::from("speed");
            cn.signal_type = 0; // unsigned, default byte order
            cn.nof_bits = 32;
        },
        Some("rpm"),
        Some((0.0, 2.0)),
    )?;

    writer.start_data(&dg)?;
    for i in 0..50u64 {
        writer.write_record(
            &cg,
            &[
                DecodedValue::Float(i as f64 * 0.01),
                DecodedValue::UnsignedInteger(i),
            ],
        )?;
    }
    writer.finalize()?;

    let mdf = MDF::from_file(&path)?;
    assert!(!mdf.file().is_mdf4());
    assert_eq!(mdf.start_time_ns(), Some(1_700_000_000_000_000_000));
    match mdf.file() {
        MdfFile::V3(file) => {
            assert_eq!(file.header.author, "test bench");
            assert_eq!(file.header.project, "rig 4");
        }
        _ => panic!("expected a v3 file"),
    }

    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].cycle_count(), 50);
    let channels = groups[0].channels();
    assert_eq!(channels.len(), 2);

    assert_eq!(channels[0].name()?.as_deref(), Some("t"));
    assert!(channels[0].is_master());
    assert_eq!(channels[0].unit()?.as_deref(), Some("s"));
    assert_eq!(channels[1].name()?.as_deref(), Some("speed"));
    assert_eq!(channels[1].unit()?.as_deref(), Some("rpm"));

    let t_values = channels[0].values()?;
    let raw_speed = channels[1].raw_values()?;
    let eng_speed = channels[1].values()?;
    assert_eq!(t_values.len(), 50);
    for i in 0..50u64 {
        assert_eq!(t_values[i as usize], DecodedValue::Float(i as f64 * 0.01));
        assert_eq!(
            raw_speed[i as usize].value,
            DecodedValue::UnsignedInteger(i)
        );
        // Linear conversion 0 + 2·x applies on demand.
        assert_eq!(
            eng_speed[i as usize],
            DecodedValue::Float(i as f64 * 2.0)
        );
    }
    Ok(())
}

#[test]
fn v3_cursor_honors_byte_order() -> Result<(), MdfError> {
    let bytes = [0x12u8, 0x34, 0x56, 0x78];
    let mut le = V3Cursor::new(&bytes, false);
    assert_eq!(le.u16()?, 0x3412);
    assert_eq!(le.u16()?, 0x7856);

    let mut be = V3Cursor::new(&bytes, true);
    assert_eq!(be.u16()?, 0x1234);
    assert!(be.u32().is_err(), "short read must fail");
    Ok(())
}

#[test]
fn v3_channel_maps_byte_order_dependent_types() {
    use mdf_rs::blocks::common::DataType;
    use mdf_rs::v3::channel_block::Cn3Block;

    let mut cn = Cn3Block::default();
    cn.signal_type = 0;
    cn.nof_bits = 16;
    cn.start_offset = 4;
    cn.byte_offset = 2;

    let le = cn.clone().into_channel_block(&[], false).unwrap();
    assert_eq!(le.data_type, DataType::UnsignedIntegerLE);
    // 2 extra bytes plus 4 bits land at byte 2, bit 4.
    assert_eq!(le.byte_offset, 2);
    assert_eq!(le.bit_offset, 4);

    let be = cn.clone().into_channel_block(&[], true).unwrap();
    assert_eq!(be.data_type, DataType::UnsignedIntegerBE);

    cn.signal_type = 13; // explicit little endian
    let forced = cn.into_channel_block(&[], true).unwrap();
    assert_eq!(forced.data_type, DataType::UnsignedIntegerLE);
}
