//! Remote graph models.
//!
//! These types are the snapshot the rest of the system keeps of a remote
//! node: identifier, display name, size, modification time, kind and the
//! containers it lives under.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Type tag the remote store uses to mark a container.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
/// Prefix shared by every application-specific type the remote store renders
/// itself (documents, spreadsheets, slide decks, drawings, shortcuts...).
const APPLICATION_MIME_PREFIX: &str = "application/vnd.google-apps.";
/// Identifier of the synthetic root container.
pub const ROOT_ID: &str = "root";

/// Whether a remote object can hold children or byte content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Directory-like object that can hold children.
    Container,
    /// File-like object with byte content.
    Leaf,
}

impl ObjectKind {
    /// Decode a remote type tag.
    ///
    /// Returns [`None`] for application-specific types that cannot be
    /// represented as ordinary byte streams; those are filtered out here and
    /// nowhere else.
    ///
    /// ```
    /// use drivefs_graph::ObjectKind;
    ///
    /// assert_eq!(ObjectKind::from_mime_type("application/vnd.google-apps.folder"), Some(ObjectKind::Container));
    /// assert_eq!(ObjectKind::from_mime_type("text/plain"), Some(ObjectKind::Leaf));
    /// assert_eq!(ObjectKind::from_mime_type("application/vnd.google-apps.spreadsheet"), None);
    /// ```
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime_type == FOLDER_MIME_TYPE {
            Some(Self::Container)
        } else if mime_type.starts_with(APPLICATION_MIME_PREFIX) {
            None
        } else {
            Some(Self::Leaf)
        }
    }

    /// Type tag to send when creating an object of this kind. Leaves let the
    /// remote store sniff their type from content.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Container => Some(FOLDER_MIME_TYPE),
            Self::Leaf => None,
        }
    }
}

/// Snapshot of one remote graph node's metadata, as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Opaque identifier assigned by the remote store.
    pub id: String,
    /// Leaf display name (not a full path).
    pub name: String,
    /// Size in bytes; meaningful only for leaves.
    pub size: u64,
    /// Last modification time, [`UNIX_EPOCH`](OffsetDateTime::UNIX_EPOCH) when unknown.
    pub modified: OffsetDateTime,
    pub kind: ObjectKind,
    /// Containers this object lives under. Usually exactly one.
    pub parents: Vec<String>,
}

impl RemoteObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            modified: OffsetDateTime::UNIX_EPOCH,
            kind,
            parents: Vec::new(),
        }
    }

    /// The synthetic container every path walk starts from.
    pub fn root() -> Self {
        Self::new(ROOT_ID, "", ObjectKind::Container)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parents.push(parent_id.into());
        self
    }

    pub fn is_container(&self) -> bool {
        self.kind == ObjectKind::Container
    }

    /// Parse an RFC3339 modification timestamp. Missing or malformed values
    /// become the epoch rather than an error.
    pub fn parse_modified(value: Option<&str>) -> OffsetDateTime {
        value
            .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Metadata changes applied by [`update_metadata`](crate::RemoteGraphClient::update_metadata).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub trashed: Option<bool>,
}

impl MetadataUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), trashed: None }
    }

    pub fn trash() -> Self {
        Self { name: None, trashed: Some(true) }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.trashed.is_none()
    }
}

/// Where an upload's content ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// Create a new leaf named `name` under `parent_id`.
    Create { name: String, parent_id: String },
    /// Replace the content of an existing leaf, keeping its identifier.
    Replace { id: String },
}
