use std::io::{Read, Seek, SeekFrom, Write};

use mdf_rs::api::mdf::MDF;
use mdf_rs::api::reader::MdfReader;
use mdf_rs::blocks::channel_block::{ChannelType, SyncType};
use mdf_rs::blocks::common::DataType;
use mdf_rs::error::MdfError;
use mdf_rs::parsing::decoder::DecodedValue;
use mdf_rs::writer::MdfStreamWriter;

fn temp_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

fn write_four_float_file(
    path: &str,
    samples: u64,
    compress: bool,
) -> Result<(), MdfError> {
    let mut writer = MdfStreamWriter::new(path)?;
    writer.set_compression(compress);
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "floats")?;
    let mut channels = Vec::new();
    for name in ["c0", "c1", "c2", "c3"] {
        channels.push(writer.create_channel(&cg, |ch| {
            ch.name = Some(String::from(name));
            ch.data_type = DataType::FloatLE;
            ch.bit_count = 64;
        })?);
    }
    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..samples {
        let value = DecodedValue::Float(i as f64 + 0.23);
        for cn in &channels {
            writer.set_channel_value(&cg, cn, &value, true)?;
        }
        writer.save_sample(&cg, i)?;
    }
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()
}

/// Compressed write of a long measurement: values survive, counts match,
/// and the file undercuts the raw record volume.
#[test]
fn compressed_writer_equivalence() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "compressed.mf4");
    const SAMPLES: u64 = 1_000_000;
    write_four_float_file(&path, SAMPLES, true)?;

    let uncompressed_payload = SAMPLES * 32;
    let file_size = std::fs::metadata(&path)?.len();
    assert!(
        file_size < uncompressed_payload,
        "file size {} not below payload volume {}",
        file_size,
        uncompressed_payload
    );

    let mdf = MDF::from_file(&path)?;
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].cycle_count(), SAMPLES);

    let channels = groups[0].channels();
    assert_eq!(channels.len(), 4);
    for channel in &channels {
        let values = channel.values()?;
        assert_eq!(values.len(), SAMPLES as usize);
        for i in 0..1000usize {
            assert_eq!(values[i], DecodedValue::Float(i as f64 + 0.23));
        }
    }
    Ok(())
}

/// Reading with compression on or off yields identical observer sequences.
#[test]
fn compression_transparency() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let plain = temp_path(&dir, "plain.mf4");
    let packed = temp_path(&dir, "packed.mf4");
    const SAMPLES: u64 = 10_000;
    write_four_float_file(&plain, SAMPLES, false)?;
    write_four_float_file(&packed, SAMPLES, true)?;

    let mut plain_reader = MdfReader::open(&plain)?;
    plain_reader.read_everything_but_data()?;
    let plain_data = plain_reader.read_data(0)?;

    let mut packed_reader = MdfReader::open(&packed)?;
    packed_reader.read_everything_but_data()?;
    let packed_data = packed_reader.read_data(0)?;

    for (a, b) in plain_data.groups[0]
        .observers
        .iter()
        .zip(packed_data.groups[0].observers.iter())
    {
        assert_eq!(a.name, b.name);
        assert_eq!(a.nof_samples(), b.nof_samples());
        for i in 0..a.nof_samples() {
            assert_eq!(a.channel_value(i), b.channel_value(i));
        }
    }
    Ok(())
}

/// VLSD strings: exact round-trip, `[len][bytes]` framing, and
/// monotonically non-decreasing stored indices.
#[test]
fn vlsd_strings() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "vlsd.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "strings")?;
    let t = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("t"));
        ch.channel_type = ChannelType::Master;
        ch.sync_type = SyncType::Time;
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 64;
    })?;
    let s = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("s"));
        ch.channel_type = ChannelType::VariableLength;
        ch.data_type = DataType::StringUtf8;
    })?;

    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..1000u64 {
        writer.set_channel_value(&cg, &t, &DecodedValue::Float(i as f64), true)?;
        writer.set_channel_value(&cg, &s, &DecodedValue::String(format!("String {}", i)), true)?;
        writer.save_sample(&cg, i)?;
    }
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()?;

    let mdf = MDF::from_file(&path)?;
    let groups = mdf.channel_groups();
    let channels = groups[0].channels();
    let strings = channels
        .iter()
        .find(|c| c.name().unwrap().as_deref() == Some("s"))
        .expect("string channel");
    let values = strings.values()?;
    assert_eq!(values.len(), 1000);
    for (i, value) in values.iter().enumerate() {
        assert_eq!(*value, DecodedValue::String(format!("String {}", i)));
    }

    // Inspect the raw structures: stored indices must be the byte offsets
    // of `[u32 len][bytes]` records and must never decrease.
    let file = match mdf.file() {
        mdf_rs::api::mdf::MdfFile::V4(f) => f,
        _ => panic!("expected a v4 file"),
    };
    let dg = &file.data_groups[0];
    let cg = &dg.channel_groups[0];
    let s_raw = cg
        .raw_channels
        .iter()
        .find(|ch| ch.block.name.as_deref() == Some("s"))
        .expect("raw channel");
    let stream = s_raw
        .signal_data(&file.mmap)?
        .expect("signal data stream");

    let payload = dg.payload(&file.mmap)?;
    let record_size = dg.record_size_for(cg);
    let slot = s_raw.block.byte_offset as usize;
    let mut previous = 0u64;
    let mut expected_offset = 0u64;
    for i in 0..1000usize {
        let record = &payload[i * record_size..(i + 1) * record_size];
        let index = u64::from_le_bytes(record[slot..slot + 8].try_into().unwrap());
        assert!(index >= previous, "indices must not decrease");
        assert_eq!(index, expected_offset, "index is the SD byte offset");
        previous = index;

        let value = s_raw.vlsd_value(&stream, index)?;
        assert_eq!(value, format!("String {}", i).as_bytes());
        expected_offset += 4 + value.len() as u64;
    }
    Ok(())
}

/// Samples older than the pre-trigger window vanish; the window survives.
#[test]
fn pre_trigger_trimming() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "pretrig.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    writer.set_pre_trig_time(1.0);
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "G")?;
    let v = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("v"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;
    writer.init_measurement()?;

    // Queue eleven seconds of history while still in Init.
    for i in 0..=10u64 {
        writer.set_channel_value(&cg, &v, &DecodedValue::UnsignedInteger(i), true)?;
        writer.save_sample(&cg, i * 1_000_000_000)?;
    }
    // Start at t=10s: only the 9s and 10s samples fit the 1s window.
    writer.start_measurement(10 * 1_000_000_000);
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()?;

    let mdf = MDF::from_file(&path)?;
    let groups = mdf.channel_groups();
    let values = groups[0].channels()[0].values()?;
    assert_eq!(
        values,
        vec![
            DecodedValue::UnsignedInteger(9),
            DecodedValue::UnsignedInteger(10)
        ]
    );
    Ok(())
}

/// Samples stamped after the stop time are dropped by the drain.
#[test]
fn stop_time_filters_late_samples() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "stoptime.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg = writer.create_channel_group(&dg, "G")?;
    let v = writer.create_channel(&cg, |ch| {
        ch.name = Some(String::from("v"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;
    writer.init_measurement()?;
    writer.start_measurement(0);
    writer.stop_measurement(5);
    for i in 0..10u64 {
        writer.set_channel_value(&cg, &v, &DecodedValue::UnsignedInteger(i), true)?;
        writer.save_sample(&cg, i)?;
    }
    writer.finalize_measurement()?;

    let mdf = MDF::from_file(&path)?;
    let values = mdf.channel_groups()[0].channels()[0].values()?;
    assert_eq!(values.len(), 6, "samples 0..=5 survive the stop time");
    Ok(())
}

/// Two channel groups share one data group: records carry ids, the reader
/// demultiplexes them, and an unknown id truncates the scan recoverably.
#[test]
fn multiplexed_groups_and_truncation() -> Result<(), MdfError> {
    let dir = tempfile::tempdir()?;
    let path = temp_path(&dir, "multiplex.mf4");

    let mut writer = MdfStreamWriter::new(&path)?;
    let dg = writer.create_data_group()?;
    let cg_a = writer.create_channel_group(&dg, "A")?;
    let a = writer.create_channel(&cg_a, |ch| {
        ch.name = Some(String::from("a"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })?;
    let cg_b = writer.create_channel_group(&dg, "B")?;
    let b = writer.create_channel(&cg_b, |ch| {
        ch.name = Some(String::from("b"));
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 64;
    })?;

    writer.init_measurement()?;
    writer.start_measurement(0);
    for i in 0..20u64 {
        if i % 2 == 0 {
            writer.set_channel_value(&cg_a, &a, &DecodedValue::UnsignedInteger(i), true)?;
            writer.save_sample(&cg_a, i)?;
        } else {
            writer.set_channel_value(&cg_b, &b, &DecodedValue::Float(i as f64), true)?;
            writer.save_sample(&cg_b, i)?;
        }
    }
    writer.stop_measurement(u64::MAX);
    writer.finalize_measurement()?;

    let mut reader = MdfReader::open(&path)?;
    reader.read_everything_but_data()?;
    let data = reader.read_data(0)?;
    assert!(data.truncation.is_none());
    assert_eq!(data.groups.len(), 2);
    assert_eq!(data.groups[0].records_read, 10);
    assert_eq!(data.groups[1].records_read, 10);

    // Corrupt the record id of the last record in the payload: the scan
    // must stop there and keep everything before the boundary.
    let (payload_start, payload_len, last_record_len) = {
        let file = match reader.file().unwrap() {
            mdf_rs::api::mdf::MdfFile::V4(f) => f,
            _ => unreachable!(),
        };
        let dg = &file.data_groups[0];
        // Record ids are 1 byte here; group B records are 1+8 bytes.
        let payload = dg.payload(&file.mmap)?;
        (
            dg.block.data_block_addr + 24,
            payload.len() as u64,
            1 + 8u64,
        )
    };
    drop(reader);

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(&path)?;
    file.seek(SeekFrom::Start(payload_start + payload_len - last_record_len))?;
    let mut id_byte = [0u8; 1];
    file.read_exact(&mut id_byte)?;
    assert!(id_byte[0] == 1 || id_byte[0] == 2);
    file.seek(SeekFrom::Start(payload_start + payload_len - last_record_len))?;
    file.write_all(&[9])?;
    file.sync_all()?;

    let mut reader = MdfReader::open(&path)?;
    reader.read_everything_but_data()?;
    let data = reader.read_data(0)?;
    assert!(matches!(
        data.truncation,
        Some(MdfError::RecordIdNotFound { record_id: 9 })
    ));
    let total: u64 = data.groups.iter().map(|g| g.records_read).sum();
    assert_eq!(total, 19, "everything before the bad id is kept");
    Ok(())
}
