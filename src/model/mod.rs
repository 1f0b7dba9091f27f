//! In-memory measurement description.
//!
//! The tree is rooted at [`MdfFile`]. Owned children live in vectors; parent
//! relations are expressed through positions ([`DataGroupId`],
//! [`ChannelGroupId`], [`ChannelId`]) instead of references, so the tree can
//! be cloned and mutated freely.

mod channel;
mod group;
mod header;

pub use channel::{Channel, ChannelArray};
pub(crate) use group::SampleBuffer;
pub use group::{ChannelGroup, DataGroup, SourceInformation};
pub use header::{Attachment, Event, FileHistory, Header};

use crate::blocks::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataGroupId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelGroupId {
    pub dg: usize,
    pub cg: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId {
    pub dg: usize,
    pub cg: usize,
    pub cn: usize,
}

impl ChannelGroupId {
    pub fn data_group(self) -> DataGroupId {
        DataGroupId(self.dg)
    }

    pub fn channel(self, cn: usize) -> ChannelId {
        ChannelId {
            dg: self.dg,
            cg: self.cg,
            cn,
        }
    }
}

impl ChannelId {
    pub fn channel_group(self) -> ChannelGroupId {
        ChannelGroupId {
            dg: self.dg,
            cg: self.cg,
        }
    }
}

/// An MDF file: identification data plus the header tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MdfFile {
    pub generation: Generation,
    /// Version string, e.g. "4.10".
    pub version: String,
    pub version_number: u16,
    pub program_id: String,
    pub finalized: bool,
    pub header: Header,
}

impl MdfFile {
    pub fn new(generation: Generation, program_id: &str) -> Self {
        let (version, version_number) = match generation {
            Generation::Mdf3 => ("3.30", 330),
            Generation::Mdf4 => ("4.10", 410),
        };
        Self {
            generation,
            version: version.to_string(),
            version_number,
            program_id: program_id.to_string(),
            finalized: false,
            header: Header::new(),
        }
    }

    pub fn major_version(&self) -> u16 {
        self.version_number / 100
    }

    pub fn minor_version(&self) -> u16 {
        self.version_number % 100
    }

    pub fn data_groups(&self) -> &[DataGroup] {
        &self.header.data_groups
    }

    pub fn data_group(&self, id: DataGroupId) -> Option<&DataGroup> {
        self.header.data_groups.get(id.0)
    }

    pub fn channel_group(&self, id: ChannelGroupId) -> Option<&ChannelGroup> {
        self.header.data_groups.get(id.dg)?.channel_groups.get(id.cg)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channel_group(id.channel_group())?.channels.get(id.cn)
    }

    pub(crate) fn channel_group_mut(&mut self, id: ChannelGroupId) -> Option<&mut ChannelGroup> {
        self.header
            .data_groups
            .get_mut(id.dg)?
            .channel_groups
            .get_mut(id.cg)
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channel_group_mut(id.channel_group())?
            .channels
            .get_mut(id.cn)
    }

    /// Every channel group with its id, in file order.
    pub fn channel_groups(&self) -> impl Iterator<Item = (ChannelGroupId, &ChannelGroup)> {
        self.header
            .data_groups
            .iter()
            .enumerate()
            .flat_map(|(dg, group)| {
                group
                    .channel_groups
                    .iter()
                    .enumerate()
                    .map(move |(cg, cgroup)| (ChannelGroupId { dg, cg }, cgroup))
            })
    }

    /// First channel whose name or full composite name equals `name`.
    pub fn find_channel(&self, name: &str) -> Option<ChannelId> {
        self.channel_groups()
            .find_map(|(id, cg)| cg.channel(name).map(|cn| id.channel(cn)))
    }

    pub fn find_channel_group(&self, name: &str) -> Option<ChannelGroupId> {
        self.channel_groups()
            .find(|(_, cg)| cg.name == name)
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::DataType;

    #[test]
    fn lookup_by_name_and_id() {
        let mut file = MdfFile::new(Generation::Mdf4, "test");
        let mut dg = DataGroup::new("first");
        let mut cg = ChannelGroup::new("Fast");
        cg.channels.push(Channel::master_time("t"));
        cg.channels.push(Channel::new("Speed", DataType::FloatLE, 64));
        dg.channel_groups.push(cg);
        file.header.data_groups.push(DataGroup::new("empty"));
        file.header.data_groups.push(dg);

        let id = file.find_channel("Speed").unwrap();
        assert_eq!(id, ChannelId { dg: 1, cg: 0, cn: 1 });
        assert_eq!(file.channel(id).unwrap().name, "Speed");
        assert_eq!(file.find_channel_group("Fast"), Some(id.channel_group()));
        assert_eq!(file.major_version(), 4);
        assert_eq!(file.minor_version(), 10);
        assert!(file.find_channel("Missing").is_none());
    }
}
