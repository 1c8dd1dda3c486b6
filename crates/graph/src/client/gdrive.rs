//! Google Drive remote graph client.
//!
//! This module provides a [`RemoteGraphClient`] over the Google Drive v3 REST
//! API. Drive is the archetypal flat object graph: folders are just objects
//! with a special type tag, any object may have several parents, and names
//! are not unique.
//!
//! # Credentials
//!
//! The client takes an already-exchanged OAuth2 access token. Obtaining and
//! refreshing it is the job of whoever constructs the client.
//!
//! # Retries
//!
//! None. Every failure is reported to the caller immediately.

use crate::{
    RemoteGraphClient,
    client::{BoxAsyncRead, ObjectStream},
    error::{ErrorKind, Result},
    models::{MetadataUpdate, ObjectKind, RemoteObject, UploadTarget},
};
use async_stream::stream;
use async_trait::async_trait;
use drivefs_config::{DriveConfig, MAX_PAGE_SIZE};
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::{ReaderStream, StreamReader};

/// Fields requested for every object, matching [`DriveFile`].
const OBJECT_FIELDS: &str = "id, name, size, modifiedTime, mimeType, parents";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, modifiedTime, mimeType, parents)";
/// Rendered document types that have no byte content to stream. Excluded in
/// the listing query itself so they never cross the wire.
const EXCLUDED_MIME_TYPES: [&str; 4] = [
    "application/vnd.google-apps.document",
    "application/vnd.google-apps.spreadsheet",
    "application/vnd.google-apps.presentation",
    "application/vnd.google-apps.drawing",
];

/// Object metadata as the Drive API returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    /// int64 values are serialized as strings by the Drive API.
    size: Option<String>,
    modified_time: Option<String>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
}

impl DriveFile {
    /// Decode into a [`RemoteObject`], or [`None`] for types that cannot be
    /// represented as byte streams.
    fn into_object(self) -> Option<RemoteObject> {
        let kind = ObjectKind::from_mime_type(&self.mime_type)?;
        Some(RemoteObject {
            size: self.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
            modified: RemoteObject::parse_modified(self.modified_time.as_deref()),
            id: self.id,
            name: self.name,
            kind,
            parents: self.parents,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFile<'a> {
    name: &'a str,
    parents: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
}

#[derive(Debug, Default, Serialize)]
struct FilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trashed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Google Drive remote graph client.
///
/// # Examples
///
/// ```no_run
/// use drivefs_graph::client::GoogleDriveClient;
///
/// # fn example() -> drivefs_graph::error::Result<()> {
/// let client = GoogleDriveClient::new("my-drive", "ya29.access-token")?.with_page_size(500);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GoogleDriveClient {
    name: String,
    http: Client,
    access_token: String,
    api_url: String,
    upload_url: String,
    page_size: u32,
}

impl GoogleDriveClient {
    /// Create a client talking to the public Drive v3 endpoints.
    ///
    /// # Arguments
    /// * `name` - A name for this client (used in logging)
    /// * `access_token` - OAuth2 bearer token with a Drive scope
    pub fn new(name: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        Self::from_config(name, access_token, &DriveConfig::default())
    }

    /// Create a client using the endpoints and page size from `config`.
    pub fn from_config(name: impl Into<String>, access_token: impl Into<String>, config: &DriveConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivefs/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network("could not build HTTP client".to_string()))?;
        let client = Self {
            name: name.into(),
            http,
            access_token: access_token.into(),
            api_url: String::new(),
            upload_url: String::new(),
            page_size: MAX_PAGE_SIZE,
        };
        Ok(client.with_endpoints(config.api_url.as_str(), config.upload_url.as_str()).with_page_size(config.page_size))
    }

    /// Point the client at different API and upload endpoints (proxies,
    /// emulators).
    pub fn with_endpoints(mut self, api_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self.upload_url = upload_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of objects requested per listing page, clamped to what the API
    /// accepts.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Listing query for the plain files and folders directly under a container.
    fn children_query(container_id: &str) -> String {
        let mut query = format!("'{}' in parents", container_id.replace('\'', "\\'"));
        for mime_type in EXCLUDED_MIME_TYPES {
            query.push_str(&format!(" and mimeType != '{mime_type}'"));
        }
        query.push_str(" and trashed = false");
        query
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_url, id)
    }

    /// Pull the human-readable message out of a Drive error body, falling
    /// back to the raw body.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.trim().to_string())
    }

    /// Authenticate and send a request, turning non-success statuses into
    /// errors. `what` names the object for error context.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("request for {what} failed")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            exn::bail!(ErrorKind::NotFound(what.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        exn::bail!(ErrorKind::Api { status: status.as_u16(), message: Self::error_message(&body) })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.send(request, what)
            .await?
            .json::<T>()
            .await
            .or_raise(|| ErrorKind::InvalidResponse(format!("undecodable metadata for {what}")))
    }

    async fn send_object(&self, request: RequestBuilder, what: &str) -> Result<RemoteObject> {
        self.send_json::<DriveFile>(request, what)
            .await?
            .into_object()
            .ok_or_raise(|| ErrorKind::InvalidResponse(format!("{what} is not a plain file or folder")))
    }
}

#[async_trait]
impl RemoteGraphClient for GoogleDriveClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn children_stream<'a>(&'a self, container_id: &'a str) -> ObjectStream<'a> {
        let query = Self::children_query(container_id);
        let page_size = self.page_size.to_string();

        Box::pin(stream! {
            let mut page_token: Option<String> = None;
            loop {
                let mut request = self.http.get(format!("{}/files", self.api_url)).query(&[
                    ("q", query.as_str()),
                    ("pageSize", page_size.as_str()),
                    ("fields", LIST_FIELDS),
                ]);
                if let Some(token) = &page_token {
                    request = request.query(&[("pageToken", token.as_str())]);
                }
                let page = match self.send_json::<FileList>(request, container_id).await {
                    Ok(page) => page,
                    Err(e) => { yield Err(e); break; },
                };
                for file in page.files {
                    let id = file.id.clone();
                    match file.into_object() {
                        Some(object) => yield Ok(object),
                        None => tracing::debug!(%id, "Skipping object without byte content"),
                    }
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        })
    }

    async fn get_object(&self, id: &str) -> Result<RemoteObject> {
        let request = self.http.get(self.file_url(id)).query(&[("fields", OBJECT_FIELDS)]);
        self.send_object(request, id).await
    }

    async fn create_object(&self, name: &str, parent_id: &str, kind: ObjectKind) -> Result<RemoteObject> {
        let body = NewFile { name, parents: [parent_id], mime_type: kind.mime_type() };
        let request = self.http.post(format!("{}/files", self.api_url)).query(&[("fields", OBJECT_FIELDS)]).json(&body);
        self.send_object(request, name).await
    }

    async fn update_metadata(&self, id: &str, update: MetadataUpdate) -> Result<RemoteObject> {
        let body = FilePatch { name: update.name, trashed: update.trashed };
        let request = self.http.patch(self.file_url(id)).query(&[("fields", OBJECT_FIELDS)]).json(&body);
        self.send_object(request, id).await
    }

    async fn reparent(&self, id: &str, remove_parent_id: &str, add_parent_id: &str) -> Result<()> {
        let request = self
            .http
            .patch(self.file_url(id))
            .query(&[("removeParents", remove_parent_id), ("addParents", add_parent_id), ("fields", "id")])
            .json(&FilePatch::default());
        self.send(request, id).await?;
        Ok(())
    }

    async fn open_download(&self, id: &str) -> Result<BoxAsyncRead> {
        let request = self.http.get(self.file_url(id)).query(&[("alt", "media")]);
        let response = self.send(request, id).await?;
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }

    async fn upload(&self, target: UploadTarget, content: BoxAsyncRead) -> Result<RemoteObject> {
        // Resumable sessions carry the metadata in the first request, so the
        // content request can be a bare stream of unknown length.
        let (session, what) = match &target {
            UploadTarget::Create { name, parent_id } => {
                let body = NewFile { name: name.as_str(), parents: [parent_id.as_str()], mime_type: None };
                let request = self
                    .http
                    .post(format!("{}/files", self.upload_url))
                    .query(&[("uploadType", "resumable")])
                    .json(&body);
                (request, name.as_str())
            },
            UploadTarget::Replace { id } => {
                let request = self
                    .http
                    .patch(format!("{}/files/{}", self.upload_url, id))
                    .query(&[("uploadType", "resumable")])
                    .json(&FilePatch::default());
                (request, id.as_str())
            },
        };
        let response = self.send(session, what).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_raise(|| ErrorKind::InvalidResponse(format!("no upload session for {what}")))?
            .to_string();
        tracing::debug!(client = %self.name, %what, "Upload session opened");

        let request = self
            .http
            .put(location)
            .query(&[("fields", OBJECT_FIELDS)])
            .body(Body::wrap_stream(ReaderStream::new(content)));
        self.send_object(request, what).await
    }
}
