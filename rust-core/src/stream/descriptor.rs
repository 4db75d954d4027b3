//! Stream metadata
//!
//! A descriptor is built once when a transform is set up and never changes
//! after the output stream starts emitting.

/// Encoding of each sample on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Float32,
    Float64,
}

impl SampleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::Float32 => "float32",
            SampleFormat::Float64 => "double64",
        }
    }
}

/// Immutable description of a stream: identity, shape, rate and annotations
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    name: String,
    stream_type: String,
    channel_count: usize,
    nominal_srate: f64,
    channel_format: SampleFormat,
    source_id: String,
    annotations: Vec<(String, String)>,
}

impl StreamDescriptor {
    /// Create a descriptor with float32 samples and no annotations
    ///
    /// # Arguments
    /// * `name` - Stream name
    /// * `stream_type` - Semantic type, e.g. "EEG" or "psd"
    /// * `channel_count` - Number of channels per sample
    /// * `nominal_srate` - Sample rate in Hz, 0 for irregular streams
    /// * `source_id` - Opaque source identifier
    pub fn new(
        name: impl Into<String>,
        stream_type: impl Into<String>,
        channel_count: usize,
        nominal_srate: f64,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stream_type: stream_type.into(),
            channel_count,
            nominal_srate,
            channel_format: SampleFormat::Float32,
            source_id: source_id.into(),
            annotations: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.channel_format = format;
        self
    }

    /// Append a key/value annotation, keeping insertion order
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.annotations.push((key.into(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn nominal_srate(&self) -> f64 {
        self.nominal_srate
    }

    /// True when the stream declares no fixed sample rate
    pub fn is_irregular(&self) -> bool {
        self.nominal_srate <= 0.0
    }

    pub fn channel_format(&self) -> SampleFormat {
        self.channel_format
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn annotations(&self) -> &[(String, String)] {
        &self.annotations
    }

    /// Look up the first annotation with the given key
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this stream matches a resolve query on `name`, `type` or `source_id`
    pub fn matches(&self, property: &str, value: &str) -> bool {
        match property {
            "name" => self.name == value,
            "type" => self.stream_type == value,
            "source_id" => self.source_id == value,
            _ => false,
        }
    }
}
