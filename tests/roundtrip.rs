use mdf_engine::{
    Attachment, Channel, ChannelType, Conversion, DataGroupId, DataType, Event, FileHistory,
    ErrorKind, FinalizeStage, FlushPolicy, Generation, MdfReader, MdfWriter, Result, Value,
    WriteState, WriterConfig, blocks::EventType,
};
use tempfile::tempdir;

const START: u64 = 1_700_000_000_000_000_000;
const MS: u64 = 1_000_000;

fn read_all(path: &std::path::Path) -> Result<MdfReader> {
    let mut reader = MdfReader::new(path)?;
    reader.try_read_everything_but_data()?;
    let count = reader.header().map_or(0, |h| h.data_groups.len());
    for dg in 0..count {
        reader.try_read_data(DataGroupId(dg))?;
    }
    Ok(reader)
}

fn has_block(bytes: &[u8], id: &[u8; 4]) -> bool {
    bytes.windows(4).any(|w| w == id)
}

#[test]
fn fifty_samples_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("counter.mf4");

    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("counter")?;
    let cg = writer.create_channel_group(dg, "Counter")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let counter = writer.create_channel(cg, Channel::new("Counter", DataType::UnsignedIntegerLE, 32))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..50u32 {
        writer.set_channel_value(counter, i)?;
        writer.save_sample(cg, START + u64::from(i) * 10 * MS)?;
    }
    writer.stop_measurement(START + 500 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    assert!(reader.is_finalized());
    let dg = reader.data_group(DataGroupId(0)).unwrap();
    let group = &dg.channel_groups[0];
    assert_eq!(group.name, "Counter");
    assert_eq!(group.nof_samples, 50);
    let cn = group.channel("Counter").unwrap();
    assert_eq!(group.channel_value(cn, 10)?, Some(Value::UnsignedInteger(10)));

    let t = group.master().unwrap();
    assert_eq!(group.channel_value(t, 0)?, Some(Value::Float(0.0)));
    let last = group.channel_value(t, 49)?.and_then(|v| v.as_f64()).unwrap();
    assert!((last - 0.49).abs() < 1e-9);
    Ok(())
}

#[test]
fn linear_conversion_and_engineering_values() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("linear.mf4");

    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("engine")?;
    let cg = writer.create_channel_group(dg, "Engine")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let temp = writer.create_channel(
        cg,
        Channel::new("Temperature", DataType::SignedIntegerLE, 16)
            .with_conversion(Conversion::linear(-40.0, 0.5).with_unit("degC")),
    )?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..20 {
        writer.set_channel_eng_value(temp, -40.0 + f64::from(i) * 2.5)?;
        writer.save_sample(cg, START + i as u64 * MS)?;
    }
    writer.stop_measurement(START + 20 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    let id = reader.find_channel("Temperature").unwrap();
    let observer = reader.create_channel_observer(id)?;
    assert_eq!(observer.unit(), "degC");
    assert_eq!(observer.nof_samples(), 20);
    for s in 0..20 {
        let raw = observer.channel_value(s)?.and_then(|v| v.as_f64()).unwrap();
        let eng = observer.engineering_value(s)?.and_then(|v| v.as_f64()).unwrap();
        assert!((eng - (-40.0 + 0.5 * raw)).abs() < 1e-9);
        assert!((eng - (-40.0 + s as f64 * 2.5)).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn mdf3_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("legacy.mdf");
    let config = WriterConfig {
        generation: Generation::Mdf3,
        ..Default::default()
    };

    let mut writer = MdfWriter::init(&path, config)?;
    writer.header_mut()?.author = "bench 3".to_string();
    let dg = writer.create_data_group("legacy")?;
    let cg = writer.create_channel_group(dg, "Legacy")?;
    writer.create_channel(cg, Channel::master_time("time"))?;
    let rpm = writer.create_channel(
        cg,
        Channel::new("EngineSpeedWithAVeryLongNameBeyondThirtyTwo", DataType::UnsignedIntegerLE, 16)
            .with_conversion(Conversion::linear(0.0, 0.25).with_unit("rpm")),
    )?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..10u16 {
        writer.set_channel_value(rpm, i * 4)?;
        writer.save_sample(cg, START + u64::from(i) * MS)?;
    }
    writer.stop_measurement(START + 10 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    assert_eq!(reader.generation(), Generation::Mdf3);
    assert!(reader.version().starts_with('3'));
    assert_eq!(reader.header().unwrap().author, "bench 3");

    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    assert_eq!(group.name, "Legacy");
    assert_eq!(group.nof_samples, 10);
    let cn = group
        .channel("EngineSpeedWithAVeryLongNameBeyondThirtyTwo")
        .unwrap();
    assert_eq!(group.channel_value(cn, 3)?, Some(Value::UnsignedInteger(12)));
    assert_eq!(group.engineering_value(cn, 3)?, Some(Value::Float(3.0)));
    Ok(())
}

#[test]
fn mdf3_rejects_vlsd_groups() -> Result<()> {
    let dir = tempdir()?;
    let config = WriterConfig {
        generation: Generation::Mdf3,
        ..Default::default()
    };
    let mut writer = MdfWriter::init(dir.path().join("vlsd.mdf"), config)?;
    let dg = writer.create_data_group("strings")?;
    let cg = writer.create_channel_group(dg, "Strings")?;
    let text = writer.create_channel(
        cg,
        Channel::new("Text", DataType::StringUtf8, 64).with_type(ChannelType::VariableLength),
    )?;
    assert!(writer.create_vlsd_channel_group(text).is_err());
    Ok(())
}

#[cfg(feature = "compression")]
#[test]
fn compressed_data_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("compressed.mf4");
    let config = WriterConfig {
        compress: true,
        flush_policy: FlushPolicy::EveryNRecords(100),
        ..Default::default()
    };

    let mut writer = MdfWriter::init(&path, config)?;
    let dg = writer.create_data_group("wave")?;
    let cg = writer.create_channel_group(dg, "Wave")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let value = writer.create_channel(cg, Channel::new("Value", DataType::FloatLE, 64))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..1_000u64 {
        writer.set_channel_value(value, (i % 50) as f64)?;
        writer.save_sample(cg, START + i * MS)?;
    }
    writer.stop_measurement(START + 1_000 * MS)?;
    writer.finalize_measurement()?;

    // Ten DZ fragments sit behind a DL, which needs an HL in front.
    let bytes = std::fs::read(&path)?;
    assert!(has_block(&bytes, b"##HL"));
    assert!(has_block(&bytes, b"##DL"));
    assert!(!has_block(&bytes, b"##DT"));

    let reader = read_all(&path)?;
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    assert_eq!(group.nof_samples, 1_000);
    let cn = group.channel("Value").unwrap();
    assert_eq!(group.channel_value(cn, 123)?, Some(Value::Float(23.0)));
    assert_eq!(group.channel_value(cn, 999)?, Some(Value::Float(49.0)));
    Ok(())
}

#[test]
fn variable_length_strings() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("strings.mf4");

    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("log")?;
    let cg = writer.create_channel_group(dg, "Log")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let signal = writer.create_channel(
        cg,
        Channel::new("Message", DataType::StringUtf8, 64).with_type(ChannelType::VariableLength),
    )?;
    let vlsd = writer.create_channel(
        cg,
        Channel::new("Note", DataType::StringUtf8, 64).with_type(ChannelType::VariableLength),
    )?;
    writer.create_vlsd_channel_group(vlsd)?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    let messages = ["boot", "", "engine on", "ämbient ok"];
    for (i, text) in messages.iter().enumerate() {
        writer.set_channel_value(signal, *text)?;
        writer.set_channel_value(vlsd, format!("note {i}"))?;
        writer.save_sample(cg, START + i as u64 * MS)?;
    }
    writer.stop_measurement(START + 10 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    let dg = reader.data_group(DataGroupId(0)).unwrap();
    let group = dg
        .channel_groups
        .iter()
        .find(|cg| cg.name == "Log")
        .unwrap();
    assert_eq!(group.nof_samples, messages.len() as u64);
    let message = group.channel("Message").unwrap();
    let note = group.channel("Note").unwrap();
    for (i, text) in messages.iter().enumerate() {
        let s = i as u64;
        assert_eq!(group.channel_value(message, s)?, Some(Value::String(text.to_string())));
        assert_eq!(group.channel_value(note, s)?, Some(Value::String(format!("note {i}"))));
    }
    Ok(())
}

#[test]
fn invalidation_bits_survive() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("invalid.mf4");

    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("sensors")?;
    let cg = writer.create_channel_group(dg, "Sensors")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let mut pressure = Channel::new("Pressure", DataType::FloatLE, 32);
    pressure.flags |= mdf_engine::blocks::channel_block::cn_flags::INVAL_BIT_VALID;
    let pressure = writer.create_channel(cg, pressure)?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..6u64 {
        if i % 3 == 0 {
            writer.set_channel_invalid(pressure)?;
        } else {
            writer.set_channel_value(pressure, i as f32)?;
        }
        writer.save_sample(cg, START + i * MS)?;
    }
    writer.stop_measurement(START + 6 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    let observer = reader.create_channel_observer(reader.find_channel("Pressure").unwrap())?;
    let validity: Vec<bool> = (0..6).map(|s| observer.is_valid(s)).collect::<Result<_>>()?;
    assert_eq!(validity, vec![false, true, true, false, true, true]);
    assert_eq!(observer.channel_value(0)?, None);
    assert_eq!(observer.channel_value(4)?, Some(Value::Float(4.0)));
    Ok(())
}

#[test]
fn pre_trigger_and_stop_trimming() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("trigger.mf4");
    let config = WriterConfig {
        pre_trigger_time: 0.05,
        ..Default::default()
    };

    let mut writer = MdfWriter::init(&path, config)?;
    let dg = writer.create_data_group("trigger")?;
    let cg = writer.create_channel_group(dg, "Trigger")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let counter = writer.create_channel(cg, Channel::new("Index", DataType::UnsignedIntegerLE, 16))?;
    writer.init_measurement()?;

    // 10 ms spacing: only the last five samples before the start are in the window.
    for i in 0..20u16 {
        writer.set_channel_value(counter, i)?;
        writer.save_sample(cg, START - 200 * MS + u64::from(i) * 10 * MS)?;
    }
    writer.start_measurement(START)?;
    for i in 20..40u16 {
        writer.set_channel_value(counter, i)?;
        writer.save_sample(cg, START + u64::from(i - 20) * 10 * MS)?;
    }
    writer.stop_measurement(START + 95 * MS)?;
    writer.save_sample(cg, START + 300 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    let index = group.channel("Index").unwrap();
    let first = group.channel_value(index, 0)?;
    assert_eq!(first, Some(Value::UnsignedInteger(15)));
    // 5 pre-trigger samples plus 0..=90 ms.
    assert_eq!(group.nof_samples, 15);
    let t = group.master().unwrap();
    let t0 = group.channel_value(t, 0)?.and_then(|v| v.as_f64()).unwrap();
    assert!((t0 + 0.05).abs() < 1e-9);
    Ok(())
}

#[test]
fn history_events_and_attachments() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("meta.mf4");

    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    {
        let header = writer.header_mut()?;
        header.author = "Test Bench".to_string();
        header.project = "Durability".to_string();
        header.description = "overnight run".to_string();
    }
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    writer.create_file_history(FileHistory {
        description: "recorded".to_string(),
        tool_id: "bench".to_string(),
        tool_vendor: "lab".to_string(),
        tool_version: "2.1".to_string(),
        user_name: "operator".to_string(),
        ..Default::default()
    })?;
    writer.create_attachment(Attachment::embedded(
        "setup.json",
        "application/json",
        br#"{"gain": 2}"#.to_vec(),
        false,
    ))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    writer.save_sample(cg, START)?;
    writer.stop_measurement(START + MS)?;
    let mut marker = Event::new("door opened", EventType::Marker);
    marker.sync_base_value = 1;
    marker.sync_factor = 0.5;
    writer.create_event(marker)?;
    writer.finalize_measurement()?;

    let mut reader = MdfReader::new(&path)?;
    assert!(reader.read_everything_but_data());
    let header = reader.header().unwrap();
    assert_eq!(header.author, "Test Bench");
    assert_eq!(header.project, "Durability");
    assert_eq!(header.description, "overnight run");
    assert_eq!(header.file_histories.len(), 1);
    assert_eq!(header.file_histories[0].tool_id, "bench");
    assert_eq!(header.file_histories[0].user_name, "operator");
    assert_eq!(header.events.len(), 1);
    assert_eq!(header.events[0].name, "door opened");
    assert!((header.events[0].sync_value() - 0.5).abs() < 1e-12);
    assert_eq!(header.attachments.len(), 1);
    assert_eq!(header.attachments[0].file_name, "setup.json");
    assert_eq!(reader.read_attachment_data(0)?, br#"{"gain": 2}"#.to_vec());
    Ok(())
}

#[test]
fn writer_state_machine() -> Result<()> {
    let dir = tempdir()?;
    let mut writer = MdfWriter::init(dir.path().join("state.mf4"), WriterConfig::default())?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    let value = writer.create_channel(cg, Channel::new("V", DataType::UnsignedIntegerLE, 8))?;

    assert!(writer.set_channel_value(value, 1u8).is_err());
    assert!(writer.save_sample(cg, START).is_err());
    assert!(writer.start_measurement(START).is_err());

    writer.init_measurement()?;
    let err = writer.create_data_group("late").unwrap_err();
    assert_eq!(err.kind(), mdf_engine::ErrorKind::InvalidState);
    assert!(writer.stop_measurement(START).is_err());

    writer.start_measurement(START)?;
    writer.set_channel_value(value, 7u8)?;
    writer.save_sample(cg, START)?;
    writer.stop_measurement(START + MS)?;
    writer.finalize_measurement()?;
    assert!(writer.finalize_measurement().is_err());
    assert!(writer.file().finalized);
    Ok(())
}

#[test]
fn finalize_without_start_writes_empty_groups() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.mf4");
    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    assert!(reader.is_finalized());
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    assert_eq!(group.nof_samples, 0);
    Ok(())
}

fn record_counter(path: &std::path::Path, config: WriterConfig, finalize: bool) -> Result<()> {
    let mut writer = MdfWriter::init(path, config)?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let value = writer.create_channel(cg, Channel::new("V", DataType::UnsignedIntegerLE, 16))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..10u16 {
        writer.set_channel_value(value, i)?;
        writer.save_sample(cg, START + u64::from(i) * MS)?;
    }
    writer.stop_measurement(START + 10 * MS)?;
    if finalize {
        writer.finalize_measurement()?;
    }
    Ok(())
}

#[test]
fn unfinished_sessions_are_not_finalized() -> Result<()> {
    let dir = tempdir()?;
    for generation in [Generation::Mdf3, Generation::Mdf4] {
        let config = WriterConfig {
            generation,
            ..Default::default()
        };
        let dropped = dir.path().join(format!("dropped_{generation:?}.mdf"));
        record_counter(&dropped, config.clone(), false)?;
        let mut reader = MdfReader::new(&dropped)?;
        assert!(!reader.is_finalized(), "{generation:?}");
        assert!(reader.read_everything_but_data());

        let done = dir.path().join(format!("done_{generation:?}.mdf"));
        record_counter(&done, config, true)?;
        let reader = read_all(&done)?;
        assert!(reader.is_finalized(), "{generation:?}");
        let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
        assert_eq!(group.nof_samples, 10);
    }
    Ok(())
}

#[test]
fn failed_finalize_leaves_the_file_unfinalized() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("broken.mf4");
    let mut writer = MdfWriter::init(&path, WriterConfig::default())?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    writer.save_sample(cg, START)?;
    writer.stop_measurement(START + MS)?;
    // Only the default file history exists, so creator 3 is dangling.
    writer.create_event(Event {
        creator_index: 3,
        ..Event::new("trigger", EventType::Trigger)
    })?;

    match writer.finalize_measurement() {
        Err(mdf_engine::Error::Finalize { stage, .. }) => {
            assert_eq!(stage, FinalizeStage::WriteHistory)
        }
        other => panic!("expected a finalize error, got {other:?}"),
    }
    assert_eq!(writer.state(), WriteState::Stopped);
    assert!(!writer.file().finalized);
    assert_eq!(writer.finalize_measurement().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(writer.flush().unwrap_err().kind(), ErrorKind::Closed);
    drop(writer);

    let mut reader = MdfReader::new(&path)?;
    assert!(!reader.is_finalized());
    assert!(reader.read_everything_but_data());
    Ok(())
}

#[test]
fn samples_reach_disk_while_recording() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("streamed.mf4");
    let config = WriterConfig {
        flush_policy: FlushPolicy::EveryNBytes(1024),
        ..Default::default()
    };
    let mut writer = MdfWriter::init(&path, config)?;
    let dg = writer.create_data_group("d")?;
    let cg = writer.create_channel_group(dg, "G")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let value = writer.create_channel(cg, Channel::new("V", DataType::FloatLE, 64))?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for i in 0..200u64 {
        writer.set_channel_value(value, i as f64)?;
        writer.save_sample(cg, START + i * MS)?;
    }
    // 200 records of 16 bytes pass the 1 KiB threshold three times.
    assert!(has_block(&std::fs::read(&path)?, b"##DT"));
    writer.stop_measurement(START + 200 * MS)?;
    writer.finalize_measurement()?;

    let reader = read_all(&path)?;
    let group = &reader.data_group(DataGroupId(0)).unwrap().channel_groups[0];
    assert_eq!(group.nof_samples, 200);
    let cn = group.channel("V").unwrap();
    assert_eq!(group.channel_value(cn, 199)?, Some(Value::Float(199.0)));
    assert!(WriterConfig::default().flush_policy.is_auto());
    Ok(())
}
