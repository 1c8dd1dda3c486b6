//! End-to-end driver sessions against the in-memory graph.
//!
//! File handles block, so content is always pushed and pulled from
//! `spawn_blocking` threads on a multi-threaded runtime, the way a hosting
//! framework's connection threads would use them.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use drivefs_config::DriverConfig;
use drivefs_driver::error::ErrorKind;
use drivefs_driver::{DriveFs, FilesystemDriver, OpenMode};
use drivefs_graph::client::{Call, MockGraph};
use drivefs_graph::{ObjectKind, RemoteGraphClient};

async fn write(fs: &DriveFs, path: &str, data: Vec<u8>) {
    let mut handle = fs.open_file(path, OpenMode::Write).await.unwrap();
    tokio::task::spawn_blocking(move || {
        handle.write_all(&data).unwrap();
        handle.close().unwrap();
    })
    .await
    .unwrap();
}

async fn read(fs: &DriveFs, path: &str) -> Vec<u8> {
    let mut handle = fs.open_file(path, OpenMode::Read).await.unwrap();
    tokio::task::spawn_blocking(move || {
        let mut data = Vec::new();
        handle.read_to_end(&mut data).unwrap();
        handle.close().unwrap();
        data
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_directory_tree_session() {
    let graph = Arc::new(MockGraph::default());
    let fs = DriveFs::new(graph.clone());

    fs.make_directory("/a").await.unwrap();
    fs.make_directory("/a/b").await.unwrap();
    write(&fs, "/a/b/f.txt", b"hello".to_vec()).await;

    let entries = fs.list_files("/a/b").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "f.txt");
    assert_eq!(entries[0].size, 5);
    assert!(!entries[0].is_directory());

    assert_eq!(read(&fs, "/a/b/f.txt").await, b"hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_upload_through_small_conduit() {
    let graph = Arc::new(MockGraph::default());
    let fs = DriveFs::from_config(graph.clone(), &DriverConfig { conduit_capacity: 512 });

    let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i * 31 % 256) as u8).collect();
    write(&fs, "/blob.bin", payload.clone()).await;

    assert_eq!(fs.get_file_info("/blob.bin").await.unwrap().size, payload.len() as u64);
    assert_eq!(read(&fs, "/blob.bin").await, payload);
    assert_eq!(graph.calls(Call::Upload), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overwrite_keeps_identity() {
    let graph = Arc::new(MockGraph::default().with_folder("docs", "docs", "root"));
    let fs = DriveFs::new(graph.clone());

    write(&fs, "/docs/draft.md", b"first".to_vec()).await;
    let first = fs.list_files("/docs").await.unwrap();
    write(&fs, "/docs/draft.md", b"second draft".to_vec()).await;
    let second = fs.list_files("/docs").await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(second[0].size, 12);
    assert_eq!(read(&fs, "/docs/draft.md").await, b"second draft");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_seek_leaves_stream_intact() {
    let graph = Arc::new(MockGraph::default().with_file("f", "f.txt", "root", b"abcdef"));
    let fs = DriveFs::new(graph.clone());

    let mut handle = fs.open_file("/f.txt", OpenMode::Read).await.unwrap();
    let data = tokio::task::spawn_blocking(move || {
        let mut head = [0u8; 2];
        handle.read_exact(&mut head).unwrap();
        let err = handle.seek(SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
        let mut rest = Vec::new();
        handle.read_to_end(&mut rest).unwrap();
        handle.close().unwrap();
        (head, rest)
    })
    .await
    .unwrap();
    assert_eq!(&data.0, b"ab");
    assert_eq!(data.1, b"cdef");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unclosed_write_is_abandoned() {
    let graph = Arc::new(MockGraph::default());
    let fs = DriveFs::new(graph.clone());

    let mut handle = fs.open_file("/partial.txt", OpenMode::Write).await.unwrap();
    tokio::task::spawn_blocking(move || {
        handle.write_all(b"half of it").unwrap();
        drop(handle);
    })
    .await
    .unwrap();

    let names: Vec<String> = graph.list_children("root").await.unwrap().into_iter().map(|o| o.name).collect();
    assert!(!names.contains(&"partial.txt".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sessions() {
    let graph = Arc::new(MockGraph::default().with_folder("shared", "shared", "root"));
    let fs = Arc::new(DriveFs::new(graph.clone()));

    let sessions: Vec<_> = (0..8)
        .map(|i| {
            let fs = fs.clone();
            tokio::spawn(async move {
                let path = format!("/shared/file-{i}.txt");
                write(&fs, &path, format!("session {i}").into_bytes()).await;
                read(&fs, &path).await
            })
        })
        .collect();
    for (i, session) in sessions.into_iter().enumerate() {
        assert_eq!(session.await.unwrap(), format!("session {i}").into_bytes());
    }

    let entries = fs.list_files("/shared").await.unwrap();
    assert_eq!(entries.len(), 8);
    assert!(entries.iter().all(|e| !e.is_directory()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_external_changes_go_unnoticed() {
    let graph = Arc::new(MockGraph::default().with_folder("docs", "docs", "root"));
    let fs = DriveFs::new(graph.clone());
    fs.change_directory("/docs").await.unwrap();

    // Someone else creates a folder with the same name through the remote store.
    let other = graph.create_object("docs", "root", ObjectKind::Container).await.unwrap();
    assert_ne!(other.id, "docs");

    // The cached binding still wins.
    let info = fs.get_file_info("/docs").await.unwrap();
    assert_eq!(info.id, "docs");

    // A fresh listing picks whichever sibling came last.
    fs.list_files("/").await.unwrap();
    assert_eq!(fs.get_file_info("/docs").await.unwrap().id, other.id);

    let err = fs.make_directory("/docs").await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
}
