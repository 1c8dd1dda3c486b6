use drivefs_graph::RemoteObject;
use time::OffsetDateTime;

/// Directory bit of [`FileInfo::mode`], as in `st_mode`.
pub const MODE_DIR: u32 = 0o040000;
/// Permission bits reported for everything; the remote store has no notion
/// of POSIX permissions.
pub const MODE_PERM: u32 = 0o666;

/// Metadata reported to the hosting framework for a single object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: OffsetDateTime,
    /// Remote identifier, for logging and diagnostics.
    pub id: String,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.mode & MODE_DIR != 0
    }

    /// `ls -l` style rendering of [`mode`](Self::mode), e.g. `drw-rw-rw-`.
    pub fn permissions(&self) -> String {
        let mut rendered = String::with_capacity(10);
        rendered.push(if self.is_directory() { 'd' } else { '-' });
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            rendered.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            rendered.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            rendered.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        rendered
    }
}

impl From<&RemoteObject> for FileInfo {
    fn from(object: &RemoteObject) -> Self {
        let mode = match object.is_container() {
            true => MODE_PERM | MODE_DIR,
            false => MODE_PERM,
        };
        Self {
            name: object.name.clone(),
            size: object.size,
            mode,
            modified: object.modified,
            id: object.id.clone(),
        }
    }
}
