use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use nodefs::{
    AccessMode, AnyNode, FifoNode, File, Folder, FsError, LiveFile, Node, NodeKind, SymbolicLink,
    TempFile, TempFolder,
};

fn mkfifo(path: &Path) {
    let raw = CString::new(path.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::mkfifo(raw.as_ptr(), 0o644) };
    assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
}

#[tokio::test]
async fn factory_returns_matching_concrete_kind() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("plain.txt");
    tokio::fs::write(&file_path, b"x").await.unwrap();
    let sub_path = dir.path().join("sub");
    tokio::fs::create_dir(&sub_path).await.unwrap();
    let link_path = dir.path().join("link");
    tokio::fs::symlink(&file_path, &link_path).await.unwrap();

    assert!(matches!(
        AnyNode::open(&file_path).await.unwrap(),
        AnyNode::File(_)
    ));
    assert!(matches!(
        AnyNode::open(&sub_path).await.unwrap(),
        AnyNode::Folder(_)
    ));
    assert!(matches!(
        AnyNode::open(&link_path).await.unwrap(),
        AnyNode::Symlink(_)
    ));
}

#[tokio::test]
async fn constructing_the_wrong_kind_is_a_mismatch() {
    let dir = tempfile::tempdir().unwrap();

    let err = File::open(dir.path()).await.unwrap_err();
    match err {
        FsError::KindMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, NodeKind::RegularFile);
            assert_eq!(actual, NodeKind::Directory);
        }
        other => panic!("expected KindMismatch, got {other:?}"),
    }
    // The message names both kinds.
    let msg = File::open_sync(dir.path()).unwrap_err().to_string();
    assert!(msg.contains("regular file"));
    assert!(msg.contains("directory"));
}

#[tokio::test]
async fn write_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    tokio::fs::write(&path, b"").await.unwrap();
    let file = File::open(&path).await.unwrap();

    let large: Vec<u8> = (0..1_500_000u32).map(|i| (i.wrapping_mul(31) % 256) as u8).collect();
    assert!(large.contains(&0), "payload must exercise NUL bytes");

    for payload in [b"".to_vec(), b"short\0with\0nuls".to_vec(), large] {
        file.write_bytes(&payload).await.unwrap();
        assert_eq!(file.read_bytes().await.unwrap(), payload);
        assert_eq!(file.size().await.unwrap(), payload.len() as u64);
    }
}

#[tokio::test]
async fn append_extends_without_truncating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.txt");
    tokio::fs::write(&path, b"").await.unwrap();
    let file = File::open(&path).await.unwrap();

    file.write_text("one\n").await.unwrap();
    file.append_text("two\n").await.unwrap();
    file.append_bytes(b"three\n").await.unwrap();
    assert_eq!(file.read_text().await.unwrap(), "one\ntwo\nthree\n");
}

#[tokio::test]
async fn chunked_read_reconstructs_the_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunky");
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&path, &payload).await.unwrap();
    let file = File::open(&path).await.unwrap();

    let mut reader = file.chunks_with(4096).await.unwrap();
    let mut sizes = Vec::new();
    let mut rebuilt = Vec::new();
    while let Some(chunk) = reader.next_chunk().await.unwrap() {
        sizes.push(chunk.len());
        rebuilt.extend_from_slice(&chunk);
    }
    assert_eq!(sizes, vec![4096, 4096, 1808]);
    assert_eq!(rebuilt, payload);

    // Blocking form agrees.
    let rebuilt_sync: Vec<u8> = file
        .chunks_with_sync(4096)
        .unwrap()
        .map(|c| c.unwrap())
        .flatten()
        .collect();
    assert_eq!(rebuilt_sync, payload);
}

#[tokio::test]
async fn chunked_read_defaults_to_1024_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunky");
    tokio::fs::write(&path, vec![7u8; 1500]).await.unwrap();
    let file = File::open(&path).await.unwrap();

    let mut reader = file.chunks().await.unwrap();
    let mut sizes = Vec::new();
    while let Some(chunk) = reader.next_chunk().await.unwrap() {
        sizes.push(chunk.len());
    }
    assert_eq!(sizes, vec![1024, 476]);

    let sizes_sync: Vec<usize> = file
        .chunks_sync()
        .unwrap()
        .map(|c| c.unwrap().len())
        .collect();
    assert_eq!(sizes_sync, vec![1024, 476]);
}

#[tokio::test]
async fn line_iteration_is_lazy_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lines.txt");
    tokio::fs::write(&path, b"alpha\nbeta\ngamma\n").await.unwrap();
    let file = File::open(&path).await.unwrap();

    let mut lines = file.lines().await.unwrap();
    let mut collected = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        collected.push(line);
    }
    assert_eq!(collected, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn folder_listing_reflects_disk() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("a.txt"), b"a").await.unwrap();
    tokio::fs::write(dir.path().join("b.txt"), b"b").await.unwrap();
    tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

    let folder = Folder::open(dir.path()).await.unwrap();
    let mut names: Vec<String> = folder.list().await.unwrap().iter().map(|n| n.name()).collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

    let dirs = folder.list_kind(NodeKind::Directory).await.unwrap();
    assert_eq!(dirs.len(), 1);
    assert_eq!(dirs[0].name(), "sub");
}

#[tokio::test]
async fn find_distinguishes_absent_from_wrong_kind() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("present"), b"").await.unwrap();
    let folder = Folder::open(dir.path()).await.unwrap();

    assert!(folder.find("present").await.unwrap().is_some());
    assert!(folder.find("absent").await.unwrap().is_none());
    assert!(
        folder
            .find_kind("present", NodeKind::RegularFile)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        folder
            .find_kind("present", NodeKind::Directory)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn symlink_target_resolves_to_the_linked_file() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("target.txt");
    tokio::fs::write(&target_path, b"content").await.unwrap();
    let link_path = dir.path().join("link");
    tokio::fs::symlink("target.txt", &link_path).await.unwrap();

    let link = SymbolicLink::open(&link_path).await.unwrap();
    let target = link.target().await.unwrap();
    let file = target.as_file().expect("target should be a file");
    assert_eq!(file.location(), target_path.as_path());
    assert_eq!(file.read_text().await.unwrap(), "content");
}

#[tokio::test]
async fn retarget_points_the_link_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    tokio::fs::write(&first, b"1").await.unwrap();
    tokio::fs::write(&second, b"2").await.unwrap();
    let link_path = dir.path().join("link");
    tokio::fs::symlink(&first, &link_path).await.unwrap();

    let link = SymbolicLink::open(&link_path).await.unwrap();
    let new_target = File::open(&second).await.unwrap();
    link.retarget(&new_target).await.unwrap();

    let resolved = link.target().await.unwrap();
    assert_eq!(resolved.as_file().unwrap().location(), second.as_path());
}

#[tokio::test]
async fn symlink_copy_recreates_the_link_not_the_content() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("target.txt");
    tokio::fs::write(&target_path, b"content").await.unwrap();
    let link_path = dir.path().join("link");
    tokio::fs::symlink(&target_path, &link_path).await.unwrap();
    let dest_path = dir.path().join("dest");
    tokio::fs::create_dir(&dest_path).await.unwrap();

    let link = SymbolicLink::open(&link_path).await.unwrap();
    let dest = Folder::open(&dest_path).await.unwrap();
    let copy = link.copy_into(&dest).await.unwrap();
    assert_eq!(copy.target_path().await.unwrap(), target_path);
}

#[tokio::test]
async fn fifo_rejects_every_mutation_and_stays_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipe");
    mkfifo(&path);
    let other = Folder::open(dir.path()).await.unwrap();

    let mut fifo = FifoNode::open(&path).await.unwrap();
    assert!(!fifo.is_mutable());

    let err = fifo.delete().await.unwrap_err();
    match err {
        FsError::Unsupported { kind, op, path: p } => {
            assert_eq!(kind, NodeKind::Fifo);
            assert_eq!(op, "delete");
            assert_eq!(p, path);
        }
        other => panic!("expected Unsupported, got {other:?}"),
    }
    assert!(fifo.rename_to("renamed").await.is_err());
    assert!(fifo.move_into(&other).await.is_err());
    assert!(fifo.copy_into(&other).await.is_err());
    assert!(matches!(
        fifo.delete_sync(),
        Err(FsError::Unsupported { .. })
    ));

    // The entry is untouched.
    assert!(fifo.exists().await.unwrap());
    assert_eq!(NodeKind::of_path_sync(&path).unwrap(), NodeKind::Fifo);
}

#[tokio::test]
async fn move_and_rename_update_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wanderer");
    tokio::fs::write(&path, b"x").await.unwrap();
    let dest_path = dir.path().join("dest");
    tokio::fs::create_dir(&dest_path).await.unwrap();
    let dest = Folder::open(&dest_path).await.unwrap();

    let mut file = File::open(&path).await.unwrap();
    file.move_into(&dest).await.unwrap();
    assert_eq!(file.location(), dest_path.join("wanderer").as_path());
    assert!(file.exists().await.unwrap());
    assert!(!path.exists());

    file.rename_to("settled").await.unwrap();
    assert_eq!(file.location(), dest_path.join("settled").as_path());
    assert_eq!(file.name(), "settled");
    assert!(file.exists().await.unwrap());
}

#[tokio::test]
async fn copy_into_leaves_the_source_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.txt");
    tokio::fs::write(&path, b"payload").await.unwrap();
    let dest_path = dir.path().join("dest");
    tokio::fs::create_dir(&dest_path).await.unwrap();
    let dest = Folder::open(&dest_path).await.unwrap();

    let file = File::open(&path).await.unwrap();
    let copy = file.copy_into(&dest).await.unwrap();
    assert_eq!(copy.location(), dest_path.join("source.txt").as_path());
    assert_eq!(copy.read_bytes().await.unwrap(), b"payload");
    assert!(file.exists().await.unwrap());
}

#[tokio::test]
async fn folder_copy_is_deep() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("tree");
    tokio::fs::create_dir_all(tree.join("nested")).await.unwrap();
    tokio::fs::write(tree.join("top.txt"), b"top").await.unwrap();
    tokio::fs::write(tree.join("nested/deep.txt"), b"deep").await.unwrap();
    tokio::fs::symlink("top.txt", tree.join("link")).await.unwrap();
    let dest_path = dir.path().join("dest");
    tokio::fs::create_dir(&dest_path).await.unwrap();

    let folder = Folder::open(&tree).await.unwrap();
    let dest = Folder::open(&dest_path).await.unwrap();
    let copy = folder.copy_into(&dest).await.unwrap();

    let copied = copy.location();
    assert_eq!(
        tokio::fs::read(copied.join("top.txt")).await.unwrap(),
        b"top"
    );
    assert_eq!(
        tokio::fs::read(copied.join("nested/deep.txt")).await.unwrap(),
        b"deep"
    );
    assert_eq!(
        tokio::fs::read_link(copied.join("link")).await.unwrap(),
        Path::new("top.txt")
    );
    // Source intact.
    assert!(folder.exists().await.unwrap());
}

#[tokio::test]
async fn folder_delete_removes_the_whole_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("tree");
    tokio::fs::create_dir_all(tree.join("a/b")).await.unwrap();
    tokio::fs::write(tree.join("a/b/c.txt"), b"x").await.unwrap();

    let mut folder = Folder::open(&tree).await.unwrap();
    folder.delete().await.unwrap();
    assert!(!folder.exists().await.unwrap());
    assert!(!tree.exists());
}

#[tokio::test]
async fn exists_is_kind_aware() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shifty");
    tokio::fs::write(&path, b"x").await.unwrap();

    let file = File::open(&path).await.unwrap();
    assert!(file.exists().await.unwrap());

    // Replace the file with a directory of the same name: for this File
    // instance the path no longer "exists".
    tokio::fs::remove_file(&path).await.unwrap();
    tokio::fs::create_dir(&path).await.unwrap();
    assert!(!file.exists().await.unwrap());
    assert!(Folder::open(&path).await.unwrap().exists().await.unwrap());
}

#[tokio::test]
async fn parent_ancestors_depth_and_join() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("sub");
    tokio::fs::create_dir(&sub).await.unwrap();
    let folder = Folder::open(&sub).await.unwrap();

    assert_eq!(folder.parent().await.unwrap().location(), dir.path());
    assert_eq!(
        folder.join(["a", "b"]),
        sub.join("a").join("b")
    );

    let ancestors = folder.ancestors().await.unwrap();
    assert_eq!(ancestors.first().unwrap().location(), dir.path());
    assert_eq!(ancestors.last().unwrap().location(), Path::new("/"));
    assert_eq!(folder.depth(), ancestors.len());

    let root = Folder::open("/").await.unwrap();
    assert_eq!(root.depth(), 0);
    assert_eq!(root.parent().await.unwrap().location(), Path::new("/"));
}

#[tokio::test]
async fn hundred_temp_files_get_distinct_paths() {
    let mut temps = Vec::new();
    for _ in 0..100 {
        temps.push(TempFile::new().await.unwrap());
    }
    let mut paths: Vec<_> = temps.iter().map(|t| t.path().to_path_buf()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 100);
    for tmp in &temps {
        assert!(tmp.path().exists());
    }
    for mut tmp in temps {
        tmp.close().await.unwrap();
        assert!(!tmp.path().exists());
        // Second disposal is a no-op.
        tmp.close().await.unwrap();
    }
}

#[tokio::test]
async fn temp_folder_disposal_is_recursive_and_idempotent() {
    let mut tmp = TempFolder::new().await.unwrap();
    let inner = tmp.path().join("inner");
    tokio::fs::create_dir(&inner).await.unwrap();
    tokio::fs::write(inner.join("file"), b"x").await.unwrap();

    tmp.close().await.unwrap();
    assert!(!tmp.path().exists());
    tmp.close().await.unwrap();
}

#[tokio::test]
async fn temp_drop_cleans_up() {
    let path = {
        let tmp = TempFile::new().await.unwrap();
        tmp.path().to_path_buf()
    };
    assert!(!path.exists());
}

#[tokio::test]
async fn live_file_reloads_after_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.txt");
    tokio::fs::write(&path, b"first").await.unwrap();

    let live = LiveFile::open_with_period(&path, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(live.content(), b"first");

    tokio::fs::write(&path, b"second, longer").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(live.content(), b"second, longer");

    live.close();
    // After close no further reads happen.
    tokio::fs::write(&path, b"third").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(live.content(), b"second, longer");
}

#[tokio::test]
async fn close_stops_reloads_even_with_a_change_pending() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("racy.txt");

    // A change written right before close must not land in the buffer:
    // once the token fires, no further notification is processed.
    for _ in 0..20 {
        tokio::fs::write(&path, b"first").await.unwrap();
        let live = LiveFile::open_with_period(&path, Duration::from_millis(1))
            .await
            .unwrap();
        tokio::fs::write(&path, b"second, longer").await.unwrap();
        live.close();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            live.content(),
            b"first",
            "reload was processed after close()"
        );
    }
}

#[tokio::test]
async fn live_file_refresh_is_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.txt");
    tokio::fs::write(&path, b"first").await.unwrap();

    // A long period keeps the background task out of the way.
    let live = LiveFile::open_with_period(&path, Duration::from_secs(3600))
        .await
        .unwrap();
    tokio::fs::write(&path, b"second").await.unwrap();
    assert_eq!(live.content(), b"first");
    live.refresh().await.unwrap();
    assert_eq!(live.content(), b"second");
}

#[tokio::test]
async fn wait_until_accessible_wakes_when_the_file_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("later.txt");
    tokio::fs::write(&path, b"").await.unwrap();
    let file = File::open(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    let writer = {
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&path, b"here").await.unwrap();
        })
    };

    let cancel = CancellationToken::new();
    let became = file
        .wait_until_accessible(AccessMode::Read, &cancel)
        .await
        .unwrap();
    assert!(became);
    writer.await.unwrap();
}

#[tokio::test]
async fn failed_rechecks_invoke_the_attempt_callback() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tool.sh");
    tokio::fs::write(&path, b"#!/bin/sh\n").await.unwrap();
    let file = File::open(&path).await.unwrap();

    // Plain 0644: present and readable, but not executable.
    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
        .await
        .unwrap();

    let writer = {
        let path = path.clone();
        tokio::spawn(async move {
            // First change leaves the file non-executable: the re-check
            // fails and the callback must fire.
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&path, b"#!/bin/sh\necho ok\n").await.unwrap();
            // Second change grants access and ends the wait.
            tokio::time::sleep(Duration::from_millis(100)).await;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .await
                .unwrap();
        })
    };

    let attempts = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let counted = Arc::clone(&attempts);
    let became = file
        .wait_until_accessible_with(AccessMode::Execute, &cancel, move |_change| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    assert!(became);
    assert!(attempts.load(Ordering::SeqCst) >= 1);
    writer.await.unwrap();
}

#[tokio::test]
async fn wait_until_accessible_stops_on_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.txt");
    tokio::fs::write(&path, b"").await.unwrap();
    let file = File::open(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }
    let became = file
        .wait_until_accessible(AccessMode::Read, &cancel)
        .await
        .unwrap();
    assert!(!became, "cancellation is a normal end-of-wait");
}

#[tokio::test]
async fn watch_delivers_events_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched.txt");
    tokio::fs::write(&path, b"0").await.unwrap();
    let file = File::open(&path).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let watcher = {
        let file = file.clone();
        let cancel = cancel.clone();
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            file.watch(&cancel, move |_change| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio::fs::write(&path, b"0123456789").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    watcher.await.unwrap();
    assert!(seen.load(Ordering::SeqCst) >= 1);
}
