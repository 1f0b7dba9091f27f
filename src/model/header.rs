use crate::{
    blocks::{EventCause, EventRangeType, EventSyncType, EventType},
    metadata::MetaData,
    model::DataGroup,
};

/// Root of the measurement description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header {
    pub index: u64,
    pub author: String,
    pub department: String,
    pub project: String,
    pub subject: String,
    pub description: String,
    /// Start of the measurement, ns since 1970-01-01 UTC.
    pub start_time_ns: u64,
    /// Time zone offset in minutes.
    pub tz_offset_min: i16,
    /// Daylight saving offset in minutes.
    pub dst_offset_min: i16,
    pub time_flags: u8,
    pub start_angle: Option<f64>,
    pub start_distance: Option<f64>,
    /// HD comment properties beyond the named fields above.
    pub metadata: MetaData,
    pub file_histories: Vec<FileHistory>,
    pub events: Vec<Event>,
    pub attachments: Vec<Attachment>,
    pub data_groups: Vec<DataGroup>,
}

impl Header {
    pub fn new() -> Self {
        Self {
            metadata: MetaData::new("HDcomment"),
            ..Default::default()
        }
    }

    /// HD comment including the author, department, project and subject
    /// properties.
    pub fn comment(&self) -> MetaData {
        let mut meta = self.metadata.clone();
        if meta.root().is_empty() {
            meta = MetaData::new("HDcomment");
        }
        meta.set_text(&self.description);
        for (name, value) in [
            ("author", &self.author),
            ("department", &self.department),
            ("project", &self.project),
            ("subject", &self.subject),
        ] {
            if !value.is_empty() {
                meta.set_property_value(name, value);
            }
        }
        meta
    }

    /// Fills the named fields from a parsed HD comment.
    pub fn apply_comment(&mut self, meta: MetaData) {
        self.description = meta.text().to_string();
        let get = |name: &str| meta.property_value(name).unwrap_or_default().to_string();
        self.author = get("author");
        self.department = get("department");
        self.project = get("project");
        self.subject = get("subject");
        self.metadata = meta;
    }
}

/// Record of a tool that created or modified the file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileHistory {
    pub index: u64,
    pub time_ns: u64,
    pub description: String,
    pub tool_id: String,
    pub tool_vendor: String,
    pub tool_version: String,
    pub user_name: String,
}

impl FileHistory {
    pub fn comment(&self) -> MetaData {
        let mut meta = MetaData::new("FHcomment");
        meta.set_text(&self.description);
        for (name, value) in [
            ("tool_id", &self.tool_id),
            ("tool_vendor", &self.tool_vendor),
            ("tool_version", &self.tool_version),
            ("user_name", &self.user_name),
        ] {
            meta.set_element(name, value);
        }
        meta
    }

    pub fn apply_comment(&mut self, meta: &MetaData) {
        self.description = meta.text().to_string();
        let get = |name: &str| meta.element(name).unwrap_or_default().to_string();
        self.tool_id = get("tool_id");
        self.tool_vendor = get("tool_vendor");
        self.tool_version = get("tool_version");
        self.user_name = get("user_name");
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub index: u64,
    pub name: String,
    pub description: String,
    pub event_type: EventType,
    pub sync_type: EventSyncType,
    pub range_type: EventRangeType,
    pub cause: EventCause,
    pub creator_index: u16,
    pub sync_base_value: i64,
    pub sync_factor: f64,
    /// Seconds before the event that belong to it.
    pub pre_trigger: f64,
    /// Seconds after the event that belong to it.
    pub post_trigger: f64,
}

impl Event {
    pub fn new(name: &str, event_type: EventType) -> Self {
        Self {
            name: name.to_string(),
            event_type,
            sync_factor: 1.0,
            ..Default::default()
        }
    }

    /// Synchronization value in the unit of the sync type (s for time).
    pub fn sync_value(&self) -> f64 {
        self.sync_base_value as f64 * self.sync_factor
    }

    pub fn comment(&self) -> MetaData {
        let mut meta = MetaData::new("EVcomment");
        meta.set_text(&self.description);
        if self.pre_trigger != 0.0 {
            meta.set_element("pre_trigger_interval", &self.pre_trigger.to_string());
        }
        if self.post_trigger != 0.0 {
            meta.set_element("post_trigger_interval", &self.post_trigger.to_string());
        }
        meta
    }

    pub fn apply_comment(&mut self, meta: &MetaData) {
        self.description = meta.text().to_string();
        let interval = |name: &str| {
            meta.element(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0.0)
        };
        self.pre_trigger = interval("pre_trigger_interval");
        self.post_trigger = interval("post_trigger_interval");
    }
}

/// File embedded in or referenced by the measurement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachment {
    pub index: u64,
    pub file_name: String,
    pub mime_type: String,
    pub description: String,
    pub embedded: bool,
    pub compressed: bool,
    pub creator_index: u16,
    pub original_size: u64,
    /// Payload to embed when writing. The reader leaves it empty; use
    /// `MdfReader::read_attachment_data`.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Attachment embedding `data`.
    pub fn embedded(file_name: &str, mime_type: &str, data: Vec<u8>, compressed: bool) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            embedded: true,
            compressed,
            original_size: data.len() as u64,
            data,
            ..Default::default()
        }
    }

    /// Reference to an external file.
    pub fn external(file_name: &str, mime_type: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_comment_carries_named_properties() {
        let mut header = Header::new();
        header.author = "Ingrid".into();
        header.subject = "Road test".into();
        header.description = "cold start".into();
        let meta = header.comment();

        let mut parsed = Header::new();
        parsed.apply_comment(MetaData::from_xml(&meta.to_xml().unwrap()).unwrap());
        assert_eq!(parsed.author, "Ingrid");
        assert_eq!(parsed.subject, "Road test");
        assert_eq!(parsed.description, "cold start");
        assert_eq!(parsed.department, "");
    }

    #[test]
    fn event_trigger_intervals() {
        let mut event = Event::new("Crash", EventType::Trigger);
        event.pre_trigger = 1.5;
        event.post_trigger = 2.0;
        let mut parsed = Event::default();
        parsed.apply_comment(&event.comment());
        assert_eq!(parsed.pre_trigger, 1.5);
        assert_eq!(parsed.post_trigger, 2.0);
    }
}
