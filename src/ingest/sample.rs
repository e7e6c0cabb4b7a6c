use std::fmt::{self, Write as _};
use std::time::SystemTime;

/// Separator used when rendering a [`CompositeKey`] as a single string.
pub const KEY_SEPARATOR: char = '@';

/// Identity of one time series: the sample source paired with the metric name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    pub metric: String,
    pub host: String,
}

impl CompositeKey {
    pub fn new(host: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            host: host.into(),
        }
    }

    /// Returns a filesystem-safe stem for this key.
    ///
    /// Every byte outside `[A-Za-z0-9.-]` is percent-encoded as `%XX` in both
    /// components. The encoding is one-to-one, the separator never appears
    /// inside either component, and no `/` can reach the file system.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.metric.len() + self.host.len() + 1);
        push_encoded(&mut stem, &self.metric);
        stem.push(KEY_SEPARATOR);
        push_encoded(&mut stem, &self.host);
        stem
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.metric, KEY_SEPARATOR, self.host)
    }
}

fn push_encoded(out: &mut String, component: &str) {
    for &b in component.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-') {
            out.push(char::from(b));
        } else {
            // Writing to a String cannot fail.
            let _ = write!(out, "%{b:02X}");
        }
    }
}

/// A single validated measurement received from the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub source_host: String,
    pub metric_key: String,
    pub value: i64,
    pub received_at: SystemTime,
}

impl Sample {
    pub fn new(
        source_host: impl Into<String>,
        metric_key: impl Into<String>,
        value: i64,
        received_at: SystemTime,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            metric_key: metric_key.into(),
            value,
            received_at,
        }
    }

    /// Returns the series this sample belongs to.
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.source_host.as_str(), self.metric_key.as_str())
    }
}
