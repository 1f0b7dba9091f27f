use std::sync::{Arc, Mutex};

use mdf_engine::{
    Channel, DataGroupId, DataType, ErrorKind, LogSink, MdfReader, MdfWriter, ReadState, Result,
    Severity, Value, WriterConfig,
    blocks::{ArrayType, ChannelArrayBlock},
    is_mdf_file,
};
use tempfile::tempdir;

fn write_sample_file(path: &std::path::Path) -> Result<()> {
    let mut writer = MdfWriter::init(path, WriterConfig::default())?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let v = writer.create_channel(cg, Channel::new("V", DataType::UnsignedIntegerLE, 8))?;
    writer.init_measurement()?;
    writer.start_measurement(1_000_000)?;
    for i in 0..5u8 {
        writer.set_channel_value(v, i)?;
        writer.save_sample(cg, 1_000_000 + u64::from(i) * 1_000)?;
    }
    writer.stop_measurement(2_000_000)?;
    writer.finalize_measurement()
}

#[test]
fn detects_mdf_files() -> Result<()> {
    let dir = tempdir()?;
    let mdf = dir.path().join("a.mf4");
    write_sample_file(&mdf)?;
    assert!(is_mdf_file(&mdf));

    let dbc = dir.path().join("vehicle.dbc");
    std::fs::write(&dbc, "VERSION \"\"\n\nNS_ :\n\nBU_: ECU\n")?;
    assert!(!is_mdf_file(&dbc));
    assert!(!is_mdf_file(dir.path().join("missing.mf4")));
    Ok(())
}

#[test]
fn accessors_are_absent_until_structure_read() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("staged.mf4");
    write_sample_file(&path)?;

    let mut reader = MdfReader::new(&path)?;
    assert_eq!(reader.state(), ReadState::Unopened);
    assert!(reader.header().is_none());
    assert!(reader.data_group(DataGroupId(0)).is_none());

    assert!(reader.read_header());
    assert!(reader.header().is_none());
    assert!(reader.read_measurement_info());
    assert!(reader.file().is_none());

    assert!(reader.read_everything_but_data());
    assert_eq!(reader.state(), ReadState::StructureRead);
    assert_eq!(reader.header().map(|h| h.data_groups.len()), Some(1));
    Ok(())
}

#[test]
fn read_data_before_structure_is_invalid_state() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("early.mf4");
    write_sample_file(&path)?;

    let mut reader = MdfReader::new(&path)?;
    assert!(!reader.read_data(DataGroupId(0)));
    assert_eq!(reader.last_error().map(|e| e.kind()), Some(ErrorKind::InvalidState));

    assert!(reader.read_everything_but_data());
    assert!(reader.read_data(DataGroupId(0)));
    let err = reader.try_read_data(DataGroupId(7)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    Ok(())
}

#[test]
fn values_need_loaded_data() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lazy.mf4");
    write_sample_file(&path)?;

    let mut reader = MdfReader::new(&path)?;
    reader.try_read_everything_but_data()?;
    let id = reader.find_channel("V").unwrap();
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    let err = group.channel_value(id.cn, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRead);

    reader.try_read_data(DataGroupId(0))?;
    let observer = reader.create_channel_observer(id)?;
    assert_eq!(observer.nof_samples(), 5);
    let err = observer.channel_value(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);

    reader.release_data(DataGroupId(0));
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    assert!(!group.is_read());
    Ok(())
}

#[test]
fn closed_reader_rejects_calls() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("closed.mf4");
    write_sample_file(&path)?;

    let mut reader = MdfReader::new(&path)?;
    reader.close();
    assert!(!reader.is_open());
    assert!(!reader.read_everything_but_data());
    assert_eq!(reader.last_error().map(|e| e.kind()), Some(ErrorKind::Closed));

    assert!(reader.open());
    assert!(reader.read_everything_but_data());
    Ok(())
}

#[derive(Default)]
struct Collect(Mutex<Vec<(Severity, String)>>);

impl LogSink for Collect {
    fn log(&self, severity: Severity, origin: &str, message: &str) {
        self.0
            .lock()
            .unwrap()
            .push((severity, format!("{origin}: {message}")));
    }
}

#[test]
fn failures_reach_the_log_sink() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("truncated.mf4");
    write_sample_file(&path)?;
    let bytes = std::fs::read(&path)?;
    std::fs::write(&path, &bytes[..100])?;

    let sink = Arc::new(Collect::default());
    let mut reader = MdfReader::new(&path)?;
    reader.set_log_sink(sink.clone());
    assert!(!reader.read_everything_but_data());
    assert!(reader.last_error().is_some());

    let events = sink.0.lock().unwrap();
    assert!(events.iter().any(|(severity, _)| *severity == Severity::Error));
    Ok(())
}

#[test]
fn array_channels_are_decoded() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("array.mf4");
    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "Map")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let mut cells = Vec::new();
    for name in ["Cell", "Cell1", "Cell2", "Cell3"] {
        let cell = Channel::new(name, DataType::UnsignedIntegerLE, 16);
        cells.push(writer.create_channel(cg, cell)?);
    }
    writer.init_measurement()?;
    writer.start_measurement(0)?;
    for (i, &cell) in cells.iter().enumerate() {
        writer.set_channel_value(cell, 10 * (i as u64 + 1))?;
    }
    writer.save_sample(cg, 0)?;
    writer.stop_measurement(1_000)?;
    writer.finalize_measurement()?;

    // Turn "Cell" into a 2x2 array over the four u16 cells.
    let cn_addr = {
        let mut reader = MdfReader::new(&path)?;
        reader.try_read_everything_but_data()?;
        let id = reader.find_channel("Cell").unwrap();
        reader.data_group(DataGroupId(0)).unwrap().channel_groups[0].channels[id.cn].index
    };
    let mut bytes = std::fs::read(&path)?;
    bytes.resize(bytes.len().next_multiple_of(8), 0);
    let ca_addr = bytes.len() as u64;
    bytes.extend(ChannelArrayBlock::new(vec![2, 2], 2).to_bytes()?);
    let component_link = cn_addr as usize + 24 + 8;
    bytes[component_link..component_link + 8].copy_from_slice(&ca_addr.to_le_bytes());
    std::fs::write(&path, &bytes)?;

    let mut reader = MdfReader::new(&path)?;
    reader.try_read_everything_but_data()?;
    reader.try_read_data(DataGroupId(0))?;
    let id = reader.find_channel("Cell").unwrap();
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    let array = group.channels[id.cn].array.as_ref().unwrap();
    assert_eq!(array.dimensions, vec![2, 2]);
    assert_eq!(array.array_type, ArrayType::Array);
    let values: Vec<Option<Value>> =
        (1..=4).map(|i| Some(Value::UnsignedInteger(i * 10))).collect();
    assert_eq!(group.array_values(id.cn, 0)?, values);
    Ok(())
}
