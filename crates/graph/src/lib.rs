pub mod client;
pub mod error;
mod models;

pub use crate::client::{BoxAsyncRead, ObjectStream, RemoteGraphClient};
pub use crate::models::{FOLDER_MIME_TYPE, MetadataUpdate, ObjectKind, ROOT_ID, RemoteObject, UploadTarget};
use std::sync::Arc;

pub type ClientHandle = Arc<dyn RemoteGraphClient + Send + Sync>;
