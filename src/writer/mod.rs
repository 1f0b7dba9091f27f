//! Measurement writer.
//!
//! [`MdfWriter`] drives a measurement through its lifecycle:
//!
//! ```text
//! Create ──init_measurement──▶ MeasurementInitialized ──start_measurement──▶ Recording
//!                                                                                │
//!                  Finalized ◀──finalize_measurement── Stopped ◀──stop_measurement
//! ```
//!
//! The channel tree is built in `Create`. `init_measurement` freezes the
//! record layouts and writes the configuration blocks. Saved samples go to a
//! queue: before the start only the pre-trigger window is kept, while
//! recording the flush policy decides when queued records become data
//! blocks. `finalize_measurement` writes the remaining data, signal data,
//! file history, events and attachments and patches counters and links.
//!
//! ```no_run
//! use mdf_engine::{Channel, DataType, MdfWriter, WriterConfig};
//!
//! let mut writer = MdfWriter::init("speed.mf4", WriterConfig::default())?;
//! let dg = writer.create_data_group("engine")?;
//! let cg = writer.create_channel_group(dg, "Engine")?;
//! writer.create_channel(cg, Channel::master_time("t"))?;
//! let speed = writer.create_channel(cg, Channel::new("Speed", DataType::FloatLE, 64))?;
//!
//! writer.init_measurement()?;
//! let start = 1_700_000_000_000_000_000;
//! writer.start_measurement(start)?;
//! for i in 0..100u64 {
//!     writer.set_channel_value(speed, i as f64 * 0.5)?;
//!     writer.save_sample(cg, start + i * 10_000_000)?;
//! }
//! writer.stop_measurement(start + 1_000_000_000)?;
//! writer.finalize_measurement()?;
//! # Ok::<(), mdf_engine::Error>(())
//! ```

mod data;
mod io;
mod queue;
mod streaming;
mod v3;
mod v4;

pub use streaming::{DEFAULT_FLUSH_BYTES, FlushPolicy};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    Error, FinalizeStage, Result,
    blocks::{
        ChannelType, Generation, IdentificationBlock, channel_block::cn_flags,
        channel_group_block::CG_FLAG_VLSD,
    },
    bus::BusLogConfig,
    conversion::Conversion,
    log::{Diagnostics, LogSink},
    model::{
        Attachment, Channel, ChannelGroup, ChannelGroupId, ChannelId, DataGroup, DataGroupId,
        Event, FileHistory, Header, MdfFile, SourceInformation,
    },
    types::Value,
};

use data::{DataGroupOutput, GroupRecord};
use io::BlockWriter;
use queue::{QueuedSample, SampleQueue};
use streaming::FlushCounter;

/// Writer settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WriterConfig {
    pub generation: Generation,
    /// Up to 8 characters stored in the identification block.
    pub program_id: String,
    /// Store sample data in DZ blocks (MDF 4 only).
    pub compress: bool,
    /// Seconds of samples before `start_measurement` that are kept.
    pub pre_trigger_time: f64,
    pub flush_policy: FlushPolicy,
    pub bus: BusLogConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            generation: Generation::Mdf4,
            program_id: "mdfeng".to_string(),
            compress: false,
            pre_trigger_time: 0.0,
            flush_policy: FlushPolicy::default(),
            bus: BusLogConfig::default(),
        }
    }
}

/// Writer lifecycle, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteState {
    Create,
    MeasurementInitialized,
    Recording,
    Stopped,
    Finalized,
}

pub struct MdfWriter {
    config: WriterConfig,
    path: PathBuf,
    file: MdfFile,
    out: Option<BlockWriter>,
    state: WriteState,
    diagnostics: Diagnostics,
    /// Current record of every channel group, built by `init_measurement`.
    records: HashMap<ChannelGroupId, GroupRecord>,
    /// Data output per data group position.
    outputs: Vec<DataGroupOutput>,
    /// Signal data streams of variable-length channels without a VLSD group.
    signal_data: HashMap<ChannelId, Vec<u8>>,
    /// Variable-length channels stored in a VLSD channel group.
    vlsd_targets: HashMap<ChannelId, ChannelGroupId>,
    queue: SampleQueue,
    flush_counter: FlushCounter,
    start_ns: Option<u64>,
    stop_ns: Option<u64>,
}

impl std::fmt::Debug for MdfWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdfWriter")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl MdfWriter {
    /// Creates the output file and an empty measurement tree.
    pub fn init<P: AsRef<Path>>(path: P, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let out = BlockWriter::create(&path)?;
        let mut file = MdfFile::new(config.generation, &config.program_id);
        file.header.start_time_ns = now_ns();
        tracing::debug!(path = %path.display(), generation = ?config.generation, "created MDF writer");
        Ok(Self {
            config,
            path,
            file,
            out: Some(out),
            state: WriteState::Create,
            diagnostics: Diagnostics::default(),
            records: HashMap::new(),
            outputs: Vec::new(),
            signal_data: HashMap::new(),
            vlsd_targets: HashMap::new(),
            queue: SampleQueue::default(),
            flush_counter: FlushCounter::default(),
            start_ns: None,
            stop_ns: None,
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    pub fn file(&self) -> &MdfFile {
        &self.file
    }

    pub fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.diagnostics.set_sink(sink);
    }

    /// Header fields (author, project, start time, ...). The data groups
    /// must be changed through the `create_*` calls.
    pub fn header_mut(&mut self) -> Result<&mut Header> {
        self.require_before(WriteState::Finalized, "header")?;
        Ok(&mut self.file.header)
    }

    fn require_state(&self, state: WriteState, what: &str) -> Result<()> {
        if self.state != state {
            return Err(Error::invalid_state(format!(
                "{what} requires state {state:?}, writer is in {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn require_before(&self, state: WriteState, what: &str) -> Result<()> {
        if self.state >= state {
            return Err(Error::invalid_state(format!(
                "{what} is not possible in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn create_data_group(&mut self, description: &str) -> Result<DataGroupId> {
        self.require_state(WriteState::Create, "create_data_group")?;
        let groups = &mut self.file.header.data_groups;
        groups.push(DataGroup::new(description));
        Ok(DataGroupId(groups.len() - 1))
    }

    pub fn create_channel_group(&mut self, dg: DataGroupId, name: &str) -> Result<ChannelGroupId> {
        self.require_state(WriteState::Create, "create_channel_group")?;
        let count = self.file.header.data_groups.len();
        let group = self
            .file
            .header
            .data_groups
            .get_mut(dg.0)
            .ok_or(Error::OutOfRange {
                index: dg.0 as u64,
                count: count as u64,
            })?;
        let mut cg = ChannelGroup::new(name);
        cg.data_group = dg.0;
        group.channel_groups.push(cg);
        Ok(ChannelGroupId {
            dg: dg.0,
            cg: group.channel_groups.len() - 1,
        })
    }

    /// Adds `channel` to `cg`. Components name an earlier channel of the
    /// same group as `parent`; their byte offset is relative to it.
    pub fn create_channel(&mut self, cg: ChannelGroupId, channel: Channel) -> Result<ChannelId> {
        self.require_state(WriteState::Create, "create_channel")?;
        let group = self.group_mut(cg)?;
        let count = group.channels.len();
        for link in [channel.parent, channel.size_channel].into_iter().flatten() {
            if link >= count {
                return Err(Error::OutOfRange {
                    index: link as u64,
                    count: count as u64,
                });
            }
        }
        group.channels.push(channel);
        Ok(cg.channel(count))
    }

    pub fn create_source_information(
        &mut self,
        cg: ChannelGroupId,
        source: SourceInformation,
    ) -> Result<()> {
        self.require_state(WriteState::Create, "create_source_information")?;
        self.group_mut(cg)?.source = Some(source);
        Ok(())
    }

    pub fn create_conversion(&mut self, channel: ChannelId, conversion: Conversion) -> Result<()> {
        self.require_state(WriteState::Create, "create_conversion")?;
        self.channel_mut(channel)?.conversion = Some(conversion);
        Ok(())
    }

    /// Adds a VLSD channel group to the channel's data group and stores the
    /// values of the variable-length `channel` there instead of in signal
    /// data blocks.
    pub fn create_vlsd_channel_group(&mut self, channel: ChannelId) -> Result<ChannelGroupId> {
        self.require_state(WriteState::Create, "create_vlsd_channel_group")?;
        if self.config.generation == Generation::Mdf3 {
            return Err(Error::invalid_state("MDF 3 has no VLSD channel groups"));
        }
        let ch = self.channel_mut(channel)?;
        if ch.channel_type != ChannelType::VariableLength {
            return Err(Error::invalid_state(format!(
                "channel {:?} is not a variable-length channel",
                ch.name
            )));
        }
        let name = ch.name.clone();
        let id = self.create_channel_group(channel.channel_group().data_group(), &name)?;
        self.group_mut(id)?.flags |= CG_FLAG_VLSD;
        self.vlsd_targets.insert(channel, id);
        Ok(id)
    }

    pub fn create_file_history(&mut self, history: FileHistory) -> Result<()> {
        self.require_before(WriteState::Finalized, "create_file_history")?;
        self.file.header.file_histories.push(history);
        Ok(())
    }

    pub fn create_event(&mut self, event: Event) -> Result<()> {
        self.require_before(WriteState::Finalized, "create_event")?;
        self.file.header.events.push(event);
        Ok(())
    }

    pub fn create_attachment(&mut self, attachment: Attachment) -> Result<()> {
        self.require_before(WriteState::Finalized, "create_attachment")?;
        self.file.header.attachments.push(attachment);
        Ok(())
    }

    pub(crate) fn group_mut(&mut self, id: ChannelGroupId) -> Result<&mut ChannelGroup> {
        self.file
            .channel_group_mut(id)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel group {id:?}")))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel> {
        self.file
            .channel_mut(id)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))
    }

    /// Freezes the record layouts and writes the configuration blocks.
    pub fn init_measurement(&mut self) -> Result<()> {
        self.require_state(WriteState::Create, "init_measurement")?;
        self.prepare_layouts()?;
        let mut out = self.out.take().ok_or(Error::Closed)?;
        let result = match self.config.generation {
            Generation::Mdf4 => self.write_configuration_v4(&mut out),
            Generation::Mdf3 => self.write_configuration_v3(&mut out),
        };
        self.out = Some(out);
        result?;

        self.outputs = vec![DataGroupOutput::default(); self.file.header.data_groups.len()];
        self.records = self
            .file
            .channel_groups()
            .map(|(id, cg)| (id, GroupRecord::new(cg)))
            .collect();
        self.state = WriteState::MeasurementInitialized;
        self.diagnostics.debug(
            "writer",
            &format!("{}: measurement initialized", self.path.display()),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sample values
    // ------------------------------------------------------------------

    fn require_recording_setup(&self, what: &str) -> Result<()> {
        if self.state == WriteState::Create || self.state == WriteState::Finalized {
            return Err(Error::invalid_state(format!(
                "{what} is not possible in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Sets the raw value of a channel for the next saved sample and clears
    /// its invalidation bit.
    pub fn set_channel_value(&mut self, id: ChannelId, value: impl Into<Value>) -> Result<()> {
        self.require_recording_setup("set_channel_value")?;
        let value = value.into();
        let cg = self
            .file
            .channel_group(id.channel_group())
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
        let record = self
            .records
            .get_mut(&id.channel_group())
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
        record.set_value(cg, id.cn, &value)
    }

    /// Sets a channel from its engineering value through the inverse of its
    /// conversion.
    pub fn set_channel_eng_value(&mut self, id: ChannelId, value: impl Into<Value>) -> Result<()> {
        self.require_recording_setup("set_channel_eng_value")?;
        let value = value.into();
        let channel = self
            .file
            .channel(id)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
        let raw = match &channel.conversion {
            None => value,
            Some(conversion) => match &conversion.inverse {
                Some(inverse) => inverse.apply(&value),
                None => conversion.inverted()?.apply(&value),
            },
        };
        self.set_channel_value(id, raw)
    }

    /// Marks the channel invalid in the next saved samples until a value is
    /// set again.
    pub fn set_channel_invalid(&mut self, id: ChannelId) -> Result<()> {
        self.require_recording_setup("set_channel_invalid")?;
        let cg = self
            .file
            .channel_group(id.channel_group())
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
        let record = self
            .records
            .get_mut(&id.channel_group())
            .ok_or_else(|| Error::invalid_state(format!("unknown channel {id:?}")))?;
        record.set_invalid(cg, id.cn)
    }

    // ------------------------------------------------------------------
    // Measurement
    // ------------------------------------------------------------------

    fn pre_trigger_ns(&self) -> u64 {
        (self.config.pre_trigger_time.max(0.0) * 1e9) as u64
    }

    /// Starts recording at `time_ns` (ns since the epoch). Samples saved
    /// earlier stay only when they fall into the pre-trigger window.
    pub fn start_measurement(&mut self, time_ns: u64) -> Result<()> {
        self.require_state(WriteState::MeasurementInitialized, "start_measurement")?;
        let dropped = self
            .queue
            .trim_before(time_ns.saturating_sub(self.pre_trigger_ns()));
        if dropped > 0 {
            self.diagnostics.debug(
                "writer",
                &format!("dropped {dropped} samples before the pre-trigger window"),
            );
        }
        self.start_ns = Some(time_ns);
        self.file.header.start_time_ns = time_ns;
        self.state = WriteState::Recording;
        Ok(())
    }

    /// Stops recording; queued samples later than `time_ns` are dropped.
    pub fn stop_measurement(&mut self, time_ns: u64) -> Result<()> {
        self.require_state(WriteState::Recording, "stop_measurement")?;
        let dropped = self.queue.trim_after(time_ns);
        if dropped > 0 {
            self.diagnostics.debug(
                "writer",
                &format!("dropped {dropped} samples after the stop time"),
            );
        }
        self.stop_ns = Some(time_ns);
        self.state = WriteState::Stopped;
        Ok(())
    }

    /// Queues the current record of `group` stamped with `time_ns`.
    pub fn save_sample(&mut self, group: ChannelGroupId, time_ns: u64) -> Result<()> {
        match self.state {
            WriteState::Create | WriteState::Finalized => {
                return Err(Error::invalid_state(format!(
                    "save_sample is not possible in state {:?}",
                    self.state
                )));
            }
            WriteState::Stopped => {
                self.diagnostics
                    .debug("writer", "sample after stop_measurement dropped");
                return Ok(());
            }
            _ => {}
        }
        let record = self
            .records
            .get(&group)
            .ok_or_else(|| Error::invalid_state(format!("unknown channel group {group:?}")))?;
        let sample = QueuedSample {
            time_ns,
            group,
            record: record.record.clone(),
            variable: {
                let mut variable: Vec<(usize, Vec<u8>)> = record
                    .variable
                    .iter()
                    .map(|(cn, bytes)| (*cn, bytes.clone()))
                    .collect();
                variable.sort_by_key(|(cn, _)| *cn);
                variable
            },
        };
        let size = sample.size();
        self.queue.push(sample);

        if self.state == WriteState::MeasurementInitialized {
            self.queue
                .trim_before(time_ns.saturating_sub(self.pre_trigger_ns()));
            return Ok(());
        }
        self.flush_counter.add(size);
        if self.flush_counter.is_due(&self.config.flush_policy) {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes queued samples of a running measurement to disk.
    pub fn flush(&mut self) -> Result<()> {
        if self.state != WriteState::Recording && self.state != WriteState::Stopped {
            return Ok(());
        }
        let mut out = self.out.take().ok_or(Error::Closed)?;
        let result = self.write_queued(&mut out).and_then(|()| out.flush());
        self.out = Some(out);
        tracing::trace!(
            samples = self.flush_counter.samples,
            bytes = self.flush_counter.bytes,
            flush = self.flush_counter.flushes + 1,
            "flushed sample queue"
        );
        self.flush_counter.reset();
        result
    }

    fn write_queued(&mut self, out: &mut BlockWriter) -> Result<()> {
        for sample in self.queue.drain() {
            self.write_sample(sample)?;
        }
        if self.config.generation == Generation::Mdf4 {
            self.write_pending_blocks(out)?;
        }
        Ok(())
    }

    /// Completes the file. The output is closed afterwards whether or not
    /// a stage fails; a failure names the stage.
    pub fn finalize_measurement(&mut self) -> Result<()> {
        if self.state == WriteState::Finalized {
            return Err(Error::invalid_state("measurement already finalized"));
        }
        if self.state == WriteState::Create {
            self.init_measurement()?;
        }
        let mut out = self.out.take().ok_or(Error::Closed)?;
        let result = self.finalize_stages(&mut out);
        drop(out);
        self.queue.clear();
        match &result {
            Ok(()) => {
                self.state = WriteState::Finalized;
                self.file.finalized = true;
                self.diagnostics
                    .info("writer", &format!("{}: finalized", self.path.display()));
            }
            Err(e) => {
                self.diagnostics
                    .error("writer", &format!("{}: {e}", self.path.display()));
            }
        }
        result
    }

    fn finalize_stages(&mut self, out: &mut BlockWriter) -> Result<()> {
        let generation = self.config.generation;
        stage(FinalizeStage::FlushSamples, || {
            if self.state == WriteState::MeasurementInitialized {
                let dropped = self.queue.drain().len();
                if dropped > 0 {
                    self.diagnostics.debug(
                        "writer",
                        &format!("measurement never started, {dropped} samples dropped"),
                    );
                }
                return Ok(());
            }
            for sample in self.queue.drain() {
                self.write_sample(sample)?;
            }
            Ok(())
        })?;
        stage(FinalizeStage::WriteDataBlocks, || match generation {
            Generation::Mdf4 => self.write_data_blocks_v4(out),
            Generation::Mdf3 => self.write_data_blocks_v3(out),
        })?;
        stage(FinalizeStage::WriteSignalData, || match generation {
            Generation::Mdf4 => self.write_signal_data_v4(out),
            Generation::Mdf3 => Ok(()),
        })?;
        let links = stage(FinalizeStage::WriteHistory, || match generation {
            Generation::Mdf4 => self.write_history_v4(out),
            Generation::Mdf3 => self.write_history_v3(out),
        })?;
        stage(FinalizeStage::UpdateCounters, || match generation {
            Generation::Mdf4 => self.update_counters_v4(out, &links),
            Generation::Mdf3 => self.update_counters_v3(out, &links),
        })?;
        stage(FinalizeStage::WriteIdentification, || {
            let mut id = IdentificationBlock::new(generation, &self.config.program_id);
            id.format_version = self.file.version.clone();
            id.version_number = self.file.version_number;
            out.update_bytes(0, &id.to_bytes()?)?;
            out.flush()
        })
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Assigns record ids, byte offsets and invalidation bits.
    fn prepare_layouts(&mut self) -> Result<()> {
        let generation = self.config.generation;
        for dg in &mut self.file.header.data_groups {
            let groups = dg.channel_groups.len();
            dg.record_id_size = match (groups, generation) {
                (0 | 1, _) => 0,
                (_, Generation::Mdf3) if groups > 255 => {
                    return Err(Error::invalid_state(
                        "MDF 3 data groups hold at most 255 channel groups",
                    ));
                }
                (2..=255, _) => 1,
                _ => 2,
            };
            for (i, cg) in dg.channel_groups.iter_mut().enumerate() {
                cg.record_id = if dg.record_id_size == 0 { 0 } else { i as u64 + 1 };
                if generation == Generation::Mdf3 {
                    check_mdf3_group(cg)?;
                }
                data::assign_layout(cg)?;
            }
        }

        let targets: Vec<(ChannelId, ChannelGroupId)> =
            self.vlsd_targets.iter().map(|(c, g)| (*c, *g)).collect();
        for (channel, group) in targets {
            let record_id = self.group_mut(group)?.record_id;
            self.channel_mut(channel)?.vlsd_record_id = Some(record_id);
        }
        Ok(())
    }
}

fn check_mdf3_group(cg: &ChannelGroup) -> Result<()> {
    if cg.is_vlsd() || cg.is_bus_event() {
        return Err(Error::invalid_state(format!(
            "channel group {:?}: MDF 3 cannot store VLSD or bus event groups",
            cg.name
        )));
    }
    for ch in &cg.channels {
        if ch.is_variable_length() || ch.channel_type == ChannelType::MaxLength {
            return Err(Error::invalid_state(format!(
                "channel {:?}: MDF 3 cannot store variable-length values",
                ch.name
            )));
        }
        if ch.flags & cn_flags::INVAL_BIT_VALID != 0 {
            return Err(Error::invalid_state(format!(
                "channel {:?}: MDF 3 has no invalidation bits",
                ch.name
            )));
        }
    }
    Ok(())
}

/// Runs one finalize stage, tagging its error.
fn stage<T>(stage: FinalizeStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    f().map_err(|e| {
        tracing::error!(%stage, error = %e, "finalize stage failed");
        Error::Finalize {
            stage,
            source: Box::new(e),
        }
    })
}

pub(crate) fn now_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}

/// Links written by the history stage.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HistoryLinks {
    pub file_history: u64,
    pub events: u64,
    pub attachments: u64,
    pub comment: u64,
}
