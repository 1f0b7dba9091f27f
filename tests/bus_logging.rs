use mdf_engine::{
    BusLogConfig, BusType, DataGroupId, EthMessage, LinChecksumModel, LinMessage, MdfReader,
    MdfWriter, Result, StorageMode, Value, WriterConfig,
};
use tempfile::tempdir;

const START: u64 = 1_700_000_000_000_000_000;
const MS: u64 = 1_000_000;

fn record(path: &std::path::Path, storage: StorageMode) -> Result<()> {
    let config = WriterConfig {
        bus: BusLogConfig {
            storage,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut writer = MdfWriter::init(path, config)?;
    let eth = writer.create_eth_log_configuration()?;
    let lin = writer.create_lin_log_configuration()?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;

    for i in 0..10u8 {
        let payload = vec![i; 46 + usize::from(i)];
        let mut message = EthMessage::new([2, 0, 0, 0, 0, 1], [0xFF; 6], &payload)
            .with_eth_type(0x86DD)
            .with_bus_channel(1);
        message.tx = i % 2 == 1;
        message.crc = 0xDEAD_0000 | u32::from(i);
        writer.save_eth_message(eth.frame, START + u64::from(i) * MS, &message)?;

        let mut frame = LinMessage::new(0x21, &[i, 0x10, 0x20][..usize::from(i % 4).min(3)])
            .with_checksum(LinChecksumModel::Enhanced, 0x5A);
        frame.baudrate = 19_200.0;
        frame.sof_ns = START + u64::from(i) * MS - 500;
        writer.save_lin_message(lin.frame, START + u64::from(i) * MS, &frame)?;
    }
    let wake_up = LinMessage {
        bus_channel: 2,
        baudrate: 19_200.0,
        ..Default::default()
    };
    writer.save_lin_message(lin.wake_up, START + 20 * MS, &wake_up)?;

    writer.stop_measurement(START + 30 * MS)?;
    writer.finalize_measurement()
}

fn open(path: &std::path::Path) -> Result<MdfReader> {
    let mut reader = MdfReader::new(path)?;
    reader.try_read_everything_but_data()?;
    reader.try_read_data(DataGroupId(0))?;
    reader.try_read_data(DataGroupId(1))?;
    Ok(reader)
}

fn ethernet_frames_round_trip(storage: StorageMode) -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("eth.mf4");
    record(&path, storage)?;

    let reader = open(&path)?;
    let dg = reader.data_group(DataGroupId(0)).unwrap();
    let group = dg.channel_groups.iter().find(|cg| cg.name == "ETH_Frame").unwrap();
    assert_eq!(group.nof_samples, 10);
    assert_eq!(group.source.as_ref().map(|s| s.bus_type), Some(BusType::Ethernet));

    let source = group.channel("ETH_Frame.Source").unwrap();
    assert_eq!(
        group.channel_value(source, 3)?,
        Some(Value::ByteArray(vec![2, 0, 0, 0, 0, 1]))
    );
    let eth_type = group.channel("EthType").unwrap();
    assert_eq!(group.channel_value(eth_type, 0)?, Some(Value::UnsignedInteger(0x86DD)));
    let length = group.channel("DataLength").unwrap();
    assert_eq!(group.channel_value(length, 9)?, Some(Value::UnsignedInteger(55)));
    let bytes = group.channel("DataBytes").unwrap();
    assert_eq!(group.channel_value(bytes, 9)?, Some(Value::ByteArray(vec![9; 55])));
    let crc = group.channel("CRC").unwrap();
    assert_eq!(group.channel_value(crc, 4)?, Some(Value::UnsignedInteger(0xDEAD_0004)));
    let dir = group.channel("Dir").unwrap();
    assert_eq!(group.engineering_value(dir, 1)?, Some(Value::String("Tx".into())));
    Ok(())
}

#[test]
fn ethernet_frames_in_signal_data() -> Result<()> {
    ethernet_frames_round_trip(StorageMode::FixedLength)
}

#[test]
fn ethernet_frames_in_vlsd_groups() -> Result<()> {
    ethernet_frames_round_trip(StorageMode::Vlsd)
}

#[test]
fn lin_frames_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lin.mf4");
    record(&path, StorageMode::FixedLength)?;

    let reader = open(&path)?;
    let dg = reader.data_group(DataGroupId(1)).unwrap();
    let group = dg.channel_groups.iter().find(|cg| cg.name == "LIN_Frame").unwrap();
    assert_eq!(group.nof_samples, 10);

    let id = group.channel("LIN_Frame.ID").unwrap();
    assert_eq!(group.channel_value(id, 0)?, Some(Value::UnsignedInteger(0x21)));
    let model = group.channel("ChecksumModel").unwrap();
    assert_eq!(group.channel_value(model, 0)?, Some(Value::SignedInteger(1)));
    assert_eq!(group.engineering_value(model, 0)?, Some(Value::String("Enhanced".into())));

    // Sample 2 carries two bytes; the padding stays behind DataLength.
    let bytes = group.channel("DataBytes").unwrap();
    assert_eq!(group.channel_value(bytes, 2)?, Some(Value::ByteArray(vec![2, 0x10])));
    assert_eq!(group.channel_value(bytes, 4)?, Some(Value::ByteArray(vec![])));
    let length = group.channel("DataLength").unwrap();
    assert_eq!(group.channel_value(length, 3)?, Some(Value::UnsignedInteger(3)));

    let baud = group.channel("Baudrate").unwrap();
    assert_eq!(group.channel_value(baud, 5)?, Some(Value::Float(19_200.0)));
    let sof = group.channel("SOF").unwrap();
    assert_eq!(
        group.channel_value(sof, 1)?,
        Some(Value::UnsignedInteger(START + MS - 500))
    );

    let wake_up = dg.channel_groups.iter().find(|cg| cg.name == "LIN_WakeUp").unwrap();
    assert_eq!(wake_up.nof_samples, 1);
    let bus = wake_up.channel("BusChannel").unwrap();
    assert_eq!(wake_up.channel_value(bus, 0)?, Some(Value::UnsignedInteger(2)));
    Ok(())
}
