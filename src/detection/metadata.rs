use std::fmt;

use serde::Serialize;

/// What a single forward step did to the frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum MetadataEntry {
    None,
    ScaleFactors { sx: f64, sy: f64 },
    Padding {
        top: u32,
        bottom: u32,
        left: u32,
        right: u32,
    },
}

impl MetadataEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataEntry::None => "None",
            MetadataEntry::ScaleFactors { .. } => "ScaleFactors",
            MetadataEntry::Padding { .. } => "Padding",
        }
    }
}

impl fmt::Display for MetadataEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataEntry::None => write!(f, "none"),
            MetadataEntry::ScaleFactors { sx, sy } => write!(f, "scale sx={sx:.6} sy={sy:.6}"),
            MetadataEntry::Padding {
                top,
                bottom,
                left,
                right,
            } => write!(f, "padding top={top} bottom={bottom} left={left} right={right}"),
        }
    }
}

/// One entry per configured step, in forward order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataStack {
    entries: Vec<MetadataEntry>,
}

impl MetadataStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: MetadataEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }
}

impl From<Vec<MetadataEntry>> for MetadataStack {
    fn from(entries: Vec<MetadataEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<MetadataEntry> for MetadataStack {
    fn from_iter<T: IntoIterator<Item = MetadataEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
