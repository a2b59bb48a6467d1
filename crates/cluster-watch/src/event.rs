use std::fmt;

/// Phase tag carried by a watch event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    /// Progress marker without a resource change.
    Bookmark,
    /// Server-reported error inside an otherwise healthy stream.
    Error,
    /// Any tag the server sends that is not one of the above.
    Other(String),
}

impl WatchEventType {
    /// Parses a wire tag. Matching is exact (`ADDED`, `MODIFIED`, ...).
    pub fn parse(tag: &str) -> Self {
        match tag {
            "ADDED" => Self::Added,
            "MODIFIED" => Self::Modified,
            "DELETED" => Self::Deleted,
            "BOOKMARK" => Self::Bookmark,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Bookmark => "BOOKMARK",
            Self::Error => "ERROR",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded line of the watch stream.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchEvent {
    /// Server-defined phase tag, as sent on the wire.
    pub event_type: String,
    /// Primary payload (`object` member of the line, `Null` when absent).
    pub object: serde_json::Value,
    /// The full decoded line.
    pub raw: serde_json::Value,
}

impl WatchEvent {
    /// Returns the typed phase tag.
    pub fn kind(&self) -> WatchEventType {
        WatchEventType::parse(&self.event_type)
    }

    /// Deserializes the payload into a caller type.
    pub fn object_as<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        T::deserialize(&self.object)
    }
}
