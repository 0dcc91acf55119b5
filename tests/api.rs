use mdf_rs::api::mdf::MDF;
use mdf_rs::api::reader::{MdfReader, ReaderState};
use mdf_rs::blocks::channel_block::{ChannelType, SyncType, CN_FLAG_INVAL_BIT_VALID};
use mdf_rs::blocks::common::DataType;
use mdf_rs::error::MdfError;
use mdf_rs::parsing::decoder::DecodedValue;
use mdf_rs::writer::MdfStreamWriter;

fn temp_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

/// One group "G" with a float32 time master "t" and a u64 channel "x";
/// 100 samples x = 0..99 at t = n seconds.
fn write_minimal_file(path: &str) -> Result<(), MdfError> {
    let mut writer = MdfStreamWriter::new(path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "G")?;
    let t = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("t"));
        ch.channel_type = ChannelType::Master;
        ch.sync_type = SyncType::Time;
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 32;
        ch.unit = Some(String::from("s"));
    })?;
    let x = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("x"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 64;
    })?;

    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..100u64 {
        writer.set_channel_value(&cg, &t, &DecodedValue::Float(i as f64), true)?;
        writer.set_channel_value(&cg, &x, &DecodedValue::UnsignedInteger(i), true)?;
        writer.save_sample(&cg, i * 1_000_000_000)?;
    }
    writer.stop_measurement(100 * 1_000_000_000);
    writer.finalize_measurement()
}

#[test]
fn minimal_roundtrip() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "minimal.mf4");
    write_minimal_file(&path)?;

    let mdf = MDF::from_file(&path)?;
    assert!(mdf.file().is_mdf4());
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.name()?.as_deref(), Some("G"));
    assert_eq!(group.cycle_count(), 100);

    let channels = group.channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].name()?.as_deref(), Some("t"));
    assert_eq!(channels[0].unit()?.as_deref(), Some("s"));
    assert!(channels[0].is_master());
    assert_eq!(channels[1].name()?.as_deref(), Some("x"));

    let t_values = channels[0].values()?;
    let x_values = channels[1].values()?;
    assert_eq!(t_values.len(), 100);
    assert_eq!(x_values.len(), 100);
    for i in 0..100u64 {
        assert_eq!(t_values[i as usize], DecodedValue::Float(i as f32 as f64));
        assert_eq!(x_values[i as usize], DecodedValue::UnsignedInteger(i));
    }
    Ok(())
}

#[test]
fn reader_states_and_observers() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "observers.mf4");
    write_minimal_file(&path)?;

    let mut reader = MdfReader::open(&path)?;
    assert_eq!(reader.state(), ReaderState::Open);

    // read_data before FullyRead is a state error.
    assert!(matches!(
        reader.read_data(0),
        Err(MdfError::WrongPhase { .. })
    ));

    reader.read_header()?;
    assert_eq!(reader.state(), ReaderState::HeaderRead);
    reader.read_measurement_info()?;
    reader.read_everything_but_data()?;
    assert_eq!(reader.state(), ReaderState::FullyRead);
    // Transitions are idempotent.
    reader.read_header()?;
    assert_eq!(reader.state(), ReaderState::FullyRead);

    let data = reader.read_data(0)?;
    assert!(data.truncation.is_none());
    assert_eq!(data.groups.len(), 1);
    let group = &data.groups[0];
    assert_eq!(group.records_read, 100);

    let master = group.master().expect("master observer");
    assert_eq!(master.name, "t");
    assert_eq!(master.unit.as_deref(), Some("s"));
    assert_eq!(master.nof_samples(), 100);
    for i in 0..100usize {
        assert_eq!(master.eng_value_f64(i), Some(i as f64));
    }

    let x = group.find("x").expect("x observer");
    for i in 0..100u64 {
        assert_eq!(
            x.channel_value(i as usize),
            Some(&DecodedValue::UnsignedInteger(i))
        );
        assert!(x.is_valid(i as usize));
    }
    Ok(())
}

#[test]
fn invalidation_bits_roundtrip() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "invalidation.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "pair")?;
    let a = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("a"));
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 64;
        ch.flags = CN_FLAG_INVAL_BIT_VALID;
        ch.pos_invalidation_bit = 0;
    })?;
    let b = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("b"));
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 64;
        ch.flags = CN_FLAG_INVAL_BIT_VALID;
        ch.pos_invalidation_bit = 1;
    })?;

    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..100u64 {
        let value = DecodedValue::Float(i as f64 + 0.23);
        let valid = i % 2 == 0;
        writer.set_channel_value(&cg, &a, &value, valid)?;
        writer.set_channel_value(&cg, &b, &value, valid)?;
        writer.save_sample(&cg, i)?;
    }
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()?;

    let mut reader = MdfReader::open(&path)?;
    reader.read_everything_but_data()?;
    let data = reader.read_data(0)?;
    let group = &data.groups[0];
    for name in ["a", "b"] {
        let observer = group.find(name).expect("observer");
        assert_eq!(observer.nof_samples(), 100);
        for i in 0..100usize {
            // The raw value survives regardless of the invalidation bit.
            assert_eq!(observer.channel_value_f64(i), Some(i as f64 + 0.23));
            assert_eq!(observer.is_valid(i), i % 2 == 0, "{} sample {}", name, i);
        }
    }
    Ok(())
}

#[test]
fn finalize_is_idempotent() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "finalize_twice.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "G")?;
    let ch = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("v"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;
    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..10u64 {
        writer.set_channel_value(&cg, &ch, &DecodedValue::UnsignedInteger(i), true)?;
        writer.save_sample(&cg, i)?;
    }
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()?;
    let first = std::fs::read(&path)?;
    writer.finalize_measurement()?;
    let second = std::fs::read(&path)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn low_level_writer_roundtrip() -> Result<(), MdfError> {
    use mdf_rs::blocks::registry::Block;
    use mdf_rs::writer::MdfWriter;

    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "low_level.mf4");

    let mut writer = MdfWriter::new(&path)?;
    writer.init_mdf_file(42)?;
    writer.set_header_properties("bench run", &[("author", "lab"), ("project", "rig 4")])?;
    let cg_id = writer.add_channel_group(None, |_| {})?;
    let cn1 = writer.add_channel(&cg_id, None, |ch| {
        ch.name = Some(String::from("Channel 1"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;
    writer.add_channel(&cg_id, Some(&cn1), |ch| {
        ch.name = Some(String::from("Channel 2"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;

    writer.start_data_block_for_cg(&cg_id, 0)?;
    writer.write_record(
        &cg_id,
        &[
            DecodedValue::UnsignedInteger(1),
            DecodedValue::UnsignedInteger(2),
        ],
    )?;
    writer.finish_data_block(&cg_id)?;
    writer.finalize()?;

    let mdf = MDF::from_file(&path)?;
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].cycle_count(), 1);
    let channels = groups[0].channels();
    assert_eq!(channels[0].name()?.as_deref(), Some("Channel 1"));
    let values = channels[0].values()?;
    assert_eq!(values, vec![DecodedValue::UnsignedInteger(1)]);
    let values = channels[1].values()?;
    assert_eq!(values, vec![DecodedValue::UnsignedInteger(2)]);

    // The header comment carries the common properties.
    let bytes = std::fs::read(&path)?;
    let header = match Block::parse_at(&bytes, 64)? {
        Block::Header(hd) => hd,
        _ => panic!("expected HD at offset 64"),
    };
    let comment = match Block::parse_at(&bytes, header.comment_addr)? {
        Block::Metadata(md) => md,
        _ => panic!("expected MD comment"),
    };
    assert_eq!(comment.comment_text().as_deref(), Some("bench run"));
    assert_eq!(comment.get_string_property("author").as_deref(), Some("lab"));
    assert_eq!(
        comment.get_string_property("project").as_deref(),
        Some("rig 4")
    );
    Ok(())
}

#[test]
fn save_sample_requires_initialized_writer() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "wrong_phase.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "G")?;
    writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("v"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;

    assert!(matches!(
        writer.save_sample(&cg, 0),
        Err(MdfError::WrongPhase { .. })
    ));
    // Structure changes after init are rejected as well.
    writer.init_measurement()?;
    assert!(matches!(
        writer.create_data_group(),
        Err(MdfError::WrongPhase { .. })
    ));
    writer.finalize_measurement()?;
    Ok(())
}
