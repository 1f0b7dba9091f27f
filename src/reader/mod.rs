//! Staged MDF reading.
//!
//! [`MdfReader`] walks a file in the order the format is laid out: the
//! identification block on open, then the header, the measurement info
//! (file history, events, attachments), the channel tree and finally the
//! samples of individual data groups. Later stages run the earlier ones
//! implicitly.
//!
//! The staged calls return `bool` and keep the failure in
//! [`MdfReader::last_error`]; the `try_*` variants return the error
//! directly.
//!
//! ```no_run
//! use mdf_engine::{MdfReader, model::DataGroupId};
//!
//! let mut reader = MdfReader::new("recording.mf4")?;
//! reader.try_read_everything_but_data()?;
//! reader.try_read_data(DataGroupId(0))?;
//! let id = reader.find_channel("EngineSpeed").expect("channel");
//! let observer = reader.create_channel_observer(id)?;
//! for sample in 0..observer.nof_samples() {
//!     println!("{:?}", observer.engineering_value(sample)?);
//! }
//! # Ok::<(), mdf_engine::Error>(())
//! ```

mod data;
mod v3;
mod v4;

use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    Error, Result,
    blocks::{
        AttachmentBlock, BlockCodec, BlockParse, Generation, HeaderBlock, IdentificationBlock,
        text_block::read_text_at, v3::Header3Block,
    },
    conversion::MAX_CONVERSION_DEPTH,
    log::{Diagnostics, LogSink},
    metadata::MetaData,
    model::{ChannelGroupId, ChannelId, DataGroup, DataGroupId, Header, MdfFile},
    observer::ChannelObserver,
};

/// Progress of a reader through the file, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadState {
    Unopened,
    HeaderRead,
    MeasurementInfoRead,
    StructureRead,
    DataRead,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderOptions {
    /// Nesting limit for conversions referenced by other conversions.
    pub max_conversion_depth: usize,
    /// Read files that were never finalized, recovering the sample counts
    /// from the data blocks.
    pub allow_unfinalized: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_conversion_depth: MAX_CONVERSION_DEPTH,
            allow_unfinalized: true,
        }
    }
}

/// True when `path` starts with an MDF identification block.
pub fn is_mdf_file<P: AsRef<Path>>(path: P) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut id = [0u8; 64];
    if file.read_exact(&mut id).is_err() {
        return false;
    }
    IdentificationBlock::from_bytes(&id).is_ok()
}

/// Header block of either generation, kept between the stages.
#[derive(Debug, Clone)]
enum HeaderLinks {
    V4(HeaderBlock),
    V3(Header3Block),
}

pub struct MdfReader {
    path: PathBuf,
    stream: Option<BufReader<File>>,
    codec: BlockCodec,
    id: IdentificationBlock,
    file: MdfFile,
    header_links: Option<HeaderLinks>,
    state: ReadState,
    options: ReaderOptions,
    diagnostics: Diagnostics,
    last_error: Option<Error>,
}

impl std::fmt::Debug for MdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdfReader")
            .field("path", &self.path)
            .field("open", &self.stream.is_some())
            .field("version", &self.id.format_version)
            .field("state", &self.state)
            .finish()
    }
}

impl MdfReader {
    /// Opens `path` and checks its identification block.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, ReaderOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        let mut stream = BufReader::new(file);

        let mut bytes = [0u8; 64];
        stream.read_exact(&mut bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TooShortBuffer {
                actual: file_size as usize,
                expected: 64,
                file: file!(),
                line: line!(),
            },
            _ => Error::IOError(e),
        })?;
        let id = IdentificationBlock::from_bytes(&bytes)?;
        let generation = id.generation()?;
        if generation == Generation::Mdf3 && id.byte_order != 0 {
            return Err(Error::FileVersioningError(format!(
                "{}: big-endian MDF {} files are not supported",
                path.display(),
                id.format_version.trim()
            )));
        }
        if !id.is_finalized() && !options.allow_unfinalized {
            return Err(Error::FileIdentifierError(format!(
                "{}: file is not finalized",
                path.display()
            )));
        }

        let mut file = MdfFile::new(generation, id.program_id.trim());
        file.version = id.format_version.trim().to_string();
        file.version_number = id.version_number;
        file.finalized = id.is_finalized();

        tracing::debug!(path = %path.display(), version = %file.version, "opened MDF file");
        Ok(Self {
            path,
            stream: Some(stream),
            codec: BlockCodec::new(generation, file_size),
            id,
            file,
            header_links: None,
            state: ReadState::Unopened,
            options,
            diagnostics: Diagnostics::default(),
            last_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.codec.generation()
    }

    /// Version string from the identification block, e.g. "4.10".
    pub fn version(&self) -> &str {
        &self.file.version
    }

    pub fn program_id(&self) -> &str {
        &self.file.program_id
    }

    pub fn is_finalized(&self) -> bool {
        self.file.finalized
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Error of the last failed staged call.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn set_log_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.diagnostics.set_sink(sink);
    }

    /// The measurement tree, once the structure has been read.
    pub fn file(&self) -> Option<&MdfFile> {
        (self.state >= ReadState::StructureRead).then_some(&self.file)
    }

    pub fn header(&self) -> Option<&Header> {
        self.file().map(|f| &f.header)
    }

    pub fn data_group(&self, id: DataGroupId) -> Option<&DataGroup> {
        self.file()?.data_group(id)
    }

    pub fn find_channel(&self, name: &str) -> Option<ChannelId> {
        self.file()?.find_channel(name)
    }

    /// Releases the stream; every pipeline call fails with
    /// [`Error::Closed`] until [`open`](Self::open).
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            self.diagnostics
                .debug("reader", &format!("closed {}", self.path.display()));
        }
    }

    pub fn open(&mut self) -> bool {
        let result = self.try_open();
        self.record(result)
    }

    pub fn try_open(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(BufReader::new(File::open(&self.path)?));
        }
        Ok(())
    }

    pub fn read_header(&mut self) -> bool {
        let result = self.try_read_header();
        self.record(result)
    }

    pub fn read_measurement_info(&mut self) -> bool {
        let result = self.try_read_measurement_info();
        self.record(result)
    }

    pub fn read_everything_but_data(&mut self) -> bool {
        let result = self.try_read_everything_but_data();
        self.record(result)
    }

    pub fn read_data(&mut self, data_group: DataGroupId) -> bool {
        let result = self.try_read_data(data_group);
        self.record(result)
    }

    /// Reads the HD block and its comment.
    pub fn try_read_header(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        if self.state >= ReadState::HeaderRead {
            return Ok(());
        }
        let mut tree = TreeReader {
            codec: self.codec,
            stream,
            max_conversion_depth: self.options.max_conversion_depth,
            diagnostics: &self.diagnostics,
        };
        let header = &mut self.file.header;
        let links = match self.codec.generation() {
            Generation::Mdf4 => HeaderLinks::V4(tree.header_v4(header)?),
            Generation::Mdf3 => HeaderLinks::V3(tree.header_v3(header)?),
        };
        self.header_links = Some(links);
        self.state = ReadState::HeaderRead;
        Ok(())
    }

    /// Reads file history, events and attachment descriptions.
    pub fn try_read_measurement_info(&mut self) -> Result<()> {
        self.try_read_header()?;
        if self.state >= ReadState::MeasurementInfoRead {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        if let Some(HeaderLinks::V4(hd)) = &self.header_links {
            let mut tree = TreeReader {
                codec: self.codec,
                stream,
                max_conversion_depth: self.options.max_conversion_depth,
                diagnostics: &self.diagnostics,
            };
            tree.measurement_info_v4(hd, &mut self.file.header)?;
        }
        self.state = ReadState::MeasurementInfoRead;
        Ok(())
    }

    /// Reads the complete channel tree without sample data.
    pub fn try_read_everything_but_data(&mut self) -> Result<()> {
        self.try_read_measurement_info()?;
        if self.state >= ReadState::StructureRead {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        let mut tree = TreeReader {
            codec: self.codec,
            stream,
            max_conversion_depth: self.options.max_conversion_depth,
            diagnostics: &self.diagnostics,
        };
        match &self.header_links {
            Some(HeaderLinks::V4(hd)) => tree.structure_v4(hd, &mut self.file.header)?,
            Some(HeaderLinks::V3(hd)) => tree.structure_v3(hd, &mut self.file.header)?,
            None => return Err(Error::invalid_state("header block not read")),
        }
        let groups = self.file.header.data_groups.len();
        self.diagnostics.debug(
            "reader",
            &format!("{}: read {groups} data groups", self.path.display()),
        );
        self.state = ReadState::StructureRead;
        Ok(())
    }

    /// Loads the samples of one data group. Reading the same group again
    /// replaces its samples.
    pub fn try_read_data(&mut self, data_group: DataGroupId) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        if self.state < ReadState::StructureRead {
            return Err(Error::invalid_state(
                "read_data requires the file structure to be read first",
            ));
        }
        let count = self.file.header.data_groups.len();
        let group = self
            .file
            .header
            .data_groups
            .get_mut(data_group.0)
            .ok_or(Error::OutOfRange {
                index: data_group.0 as u64,
                count: count as u64,
            })?;
        let mut tree = TreeReader {
            codec: self.codec,
            stream,
            max_conversion_depth: self.options.max_conversion_depth,
            diagnostics: &self.diagnostics,
        };
        tree.load_data_group(group, self.file.finalized)?;
        self.state = ReadState::DataRead;
        Ok(())
    }

    /// Drops the loaded samples of a data group.
    pub fn release_data(&mut self, data_group: DataGroupId) {
        if let Some(group) = self.file.header.data_groups.get_mut(data_group.0) {
            group.reset_samples();
        }
    }

    /// Payload of attachment `index`: the embedded bytes (inflated when
    /// compressed) or the content of the referenced file, resolved relative
    /// to the MDF file's directory.
    pub fn read_attachment_data(&mut self, index: usize) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        if self.state < ReadState::MeasurementInfoRead {
            return Err(Error::invalid_state(
                "attachments are known after read_measurement_info",
            ));
        }
        let attachments = &self.file.header.attachments;
        let attachment = attachments.get(index).ok_or(Error::OutOfRange {
            index: index as u64,
            count: attachments.len() as u64,
        })?;
        let block = AttachmentBlock::read_at(&self.codec, stream, attachment.index)?;
        if let Some(payload) = block.payload()? {
            return Ok(payload);
        }
        let external = Path::new(&attachment.file_name);
        let resolved = match self.path.parent() {
            Some(dir) if external.is_relative() => dir.join(external),
            _ => external.to_path_buf(),
        };
        Ok(std::fs::read(resolved)?)
    }

    /// Observer over one channel of a loaded data group.
    pub fn create_channel_observer(&self, id: ChannelId) -> Result<ChannelObserver<'_>> {
        let file = self
            .file()
            .ok_or_else(|| Error::invalid_state("file structure not read"))?;
        let group = file
            .channel_group(id.channel_group())
            .ok_or(Error::OutOfRange {
                index: id.cg as u64,
                count: file.data_group(DataGroupId(id.dg)).map_or(0, |dg| dg.channel_groups.len()) as u64,
            })?;
        ChannelObserver::new(group, id.cn)
    }

    /// Observers for every channel of `group`.
    pub fn create_channel_observers(&self, group: ChannelGroupId) -> Result<Vec<ChannelObserver<'_>>> {
        let file = self
            .file()
            .ok_or_else(|| Error::invalid_state("file structure not read"))?;
        let cg = file.channel_group(group).ok_or(Error::OutOfRange {
            index: group.cg as u64,
            count: file.data_group(group.data_group()).map_or(0, |dg| dg.channel_groups.len()) as u64,
        })?;
        (0..cg.channels.len())
            .map(|cn| ChannelObserver::new(cg, cn))
            .collect()
    }

    fn record(&mut self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics
                    .error("reader", &format!("{}: {e}", self.path.display()));
                self.last_error = Some(e);
                false
            }
        }
    }
}

/// Block tree walker shared by both generations.
pub(crate) struct TreeReader<'a, R> {
    pub codec: BlockCodec,
    pub stream: &'a mut R,
    pub max_conversion_depth: usize,
    pub diagnostics: &'a Diagnostics,
}

impl<R: Read + Seek> TreeReader<'_, R> {
    fn text(&mut self, addr: u64) -> Result<String> {
        Ok(read_text_at(&self.codec, self.stream, addr)?.unwrap_or_default())
    }

    /// Text of a TX block, or the `TX` element of an MD block.
    fn plain_text(&mut self, addr: u64) -> Result<String> {
        let text = self.text(addr)?;
        if text.trim_start().starts_with('<') {
            if let Ok(meta) = MetaData::from_xml(&text) {
                return Ok(meta.text().to_string());
            }
        }
        Ok(text)
    }

    /// Comment link as metadata. Malformed XML is kept as plain text.
    fn comment(&mut self, addr: u64, root: &str) -> Result<Option<MetaData>> {
        if addr == 0 {
            return Ok(None);
        }
        let text = self.text(addr)?;
        match MetaData::from_comment(root, &text) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                self.diagnostics
                    .warning("reader", &format!("comment at {addr:#x}: {e}"));
                let mut meta = MetaData::new(root);
                meta.set_text(&text);
                Ok(Some(meta))
            }
        }
    }

    /// Raw bytes at `addr`, clipped to the end of the file.
    fn raw_bytes(&mut self, addr: u64, len: u64) -> Result<Vec<u8>> {
        let len = len.min(self.codec.file_size().saturating_sub(addr));
        let len = crate::blocks::common::u64_to_usize(len, "data length")?;
        self.stream.seek(SeekFrom::Start(addr))?;
        let mut data = vec![0u8; len];
        self.stream.read_exact(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn state_order() {
        assert!(ReadState::Unopened < ReadState::HeaderRead);
        assert!(ReadState::StructureRead < ReadState::DataRead);
    }

    #[test]
    fn foreign_files_are_not_mdf() {
        let mut text = tempfile::NamedTempFile::new().unwrap();
        writeln!(text, "[Descriptor]\nname=not an mdf file, but long enough to fill 64 bytes").unwrap();
        assert!(!is_mdf_file(text.path()));
        assert!(!is_mdf_file("/nonexistent/file.mf4"));
        assert!(MdfReader::new(text.path()).is_err());
    }

    #[test]
    fn big_endian_mdf3_is_rejected() {
        let mut id = IdentificationBlock::new(Generation::Mdf3, "test");
        id.byte_order = 1;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&id.to_bytes().unwrap()).unwrap();
        let err = MdfReader::new(file.path()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }
}
