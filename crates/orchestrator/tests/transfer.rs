#![forbid(unsafe_code)]

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cluster::Workload;
use cluster::fake::{FakeRunner, Reply};
use common::{local_plane, plane};
use config::{MIB, TransferMethod};
use orchestrator::transfer::{
    ArchiveTransfer, ChunkedTransfer, DirectTransfer, READ_FAILED, RemoteFile, UNREADABLE_EXIT,
};
use orchestrator::{Error, Retriever, Target, TransferSession};
use std::sync::Arc;

fn target() -> Target {
    Target {
        workload: Workload::new("ns", "sample-0"),
        container: "app".into(),
    }
}

fn remote() -> RemoteFile {
    RemoteFile::new(target(), "/tmp/dump_1.dmp")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn encoded(bytes: &[u8]) -> Reply {
    Reply::ok(STANDARD.encode(bytes))
}

#[tokio::test]
async fn twenty_five_mib_in_three_reads() {
    let total = 25 * MIB as usize;
    let data = pattern(total);
    let ten = 10 * MIB as usize;

    let runner = Arc::new(FakeRunner::new());
    runner
        .on("stat -c %s", Reply::ok(format!("{total}\n")))
        .on("skip=0 count=1", encoded(&data[..ten]))
        .on("skip=1 count=1", encoded(&data[ten..2 * ten]))
        .on("skip=2 count=1", encoded(&data[2 * ten..]));
    let chunked = ChunkedTransfer::new(plane(&runner), 10 * MIB);

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("latest_dump");
    let size = chunked.probe_size(&remote()).await.unwrap();
    assert_eq!(size, total as u64);

    let mut session = TransferSession::new(remote(), &local, size);
    chunked.transfer(&mut session).await.unwrap();

    let reads = runner.lines_matching("dd if=");
    assert_eq!(reads.len(), 3);
    assert!(reads[0].contains(&format!("head -c {}", 10 * MIB)));
    assert!(reads[1].contains(&format!("head -c {}", 10 * MIB)));
    assert!(reads[2].contains(&format!("head -c {}", 5 * MIB)));
    assert_eq!(session.progress, [40, 80, 100]);
    assert_eq!(session.verify(), Ok(()));
    assert_eq!(std::fs::read(&local).unwrap(), data);
}

#[tokio::test]
async fn truncated_last_read_is_a_mismatch_not_a_failure() {
    let data = pattern(25);
    let runner = Arc::new(FakeRunner::new());
    runner
        .on("skip=0 count=1", encoded(&data[..10]))
        .on("skip=1 count=1", encoded(&data[10..20]))
        .on("skip=2 count=1", encoded(&data[20..23]));
    let chunked = ChunkedTransfer::new(plane(&runner), 10);

    let dir = tempfile::tempdir().unwrap();
    let mut session = TransferSession::new(remote(), dir.path().join("out"), 25);
    chunked.transfer(&mut session).await.unwrap();

    assert_eq!(session.verify(), Err((25, 23)));
    assert_eq!(std::fs::read(&session.local).unwrap(), &data[..23]);
}

#[tokio::test]
async fn failed_chunk_removes_partial_file() {
    let data = pattern(30);
    let runner = Arc::new(FakeRunner::new());
    runner
        .on("skip=0 count=1", encoded(&data[..10]))
        .on("skip=1 count=1", Reply::code(137));
    let chunked = ChunkedTransfer::new(plane(&runner), 10);

    let dir = tempfile::tempdir().unwrap();
    let mut session = TransferSession::new(remote(), dir.path().join("out"), 30);
    let err = chunked.transfer(&mut session).await.unwrap_err();

    assert_eq!(err.exit_code(), 137);
    assert!(matches!(err, Error::Transfer { method: TransferMethod::Chunked, .. }));
    assert!(!session.local.exists());
    assert!(runner.lines_matching("skip=2").is_empty());
}

#[tokio::test]
async fn unparseable_probe_is_reported() {
    let runner = Arc::new(FakeRunner::new());
    runner.on("stat -c %s", Reply::ok("stat: not found\n"));
    let chunked = ChunkedTransfer::new(plane(&runner), 10);

    let err = chunked.probe_size(&remote()).await.unwrap_err();
    assert!(matches!(err, Error::SizeProbe { .. }), "{err}");
}

#[tokio::test]
async fn probe_quotes_the_remote_path() {
    let runner = Arc::new(FakeRunner::new());
    runner.on("stat -c %s", Reply::ok("12"));
    let target = remote().target;
    let odd = RemoteFile::new(target, "/tmp/it's here");

    ChunkedTransfer::new(plane(&runner), 10)
        .probe_size(&odd)
        .await
        .unwrap();
    let line = &runner.lines_matching("stat -c %s")[0];
    assert!(line.contains(r"'/tmp/it'\''s here'"), "{line}");
}

#[tokio::test]
async fn direct_copy_counts_local_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("latest_dump");
    let runner = Arc::new(FakeRunner::new());
    runner.on(
        "cp sample-0:/tmp/dump_1.dmp",
        Reply::ok("").writing(&local, pattern(64)),
    );

    let direct = DirectTransfer::new(plane(&runner));
    let mut session = TransferSession::new(remote(), &local, 64);
    direct.transfer(&mut session).await.unwrap();
    assert_eq!(session.transferred, 64);
    assert_eq!(session.progress, [100]);
}

#[tokio::test]
async fn direct_copy_failure_keeps_client_code() {
    let runner = Arc::new(FakeRunner::new());
    runner.on("cp sample-0", Reply::code(255));
    let dir = tempfile::tempdir().unwrap();

    let mut session = TransferSession::new(remote(), dir.path().join("x"), 10);
    let err = DirectTransfer::new(plane(&runner))
        .transfer(&mut session)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 255);
}

#[tokio::test]
async fn failed_remote_read_is_fatal_even_when_pipeline_exits_zero() {
    let data = pattern(30);
    let runner = Arc::new(FakeRunner::new());
    runner
        .on("skip=0 count=1", encoded(&data[..10]))
        .on(
            "skip=1 count=1",
            Reply {
                stderr: format!("{READ_FAILED}\n"),
                ..Reply::ok("")
            },
        );
    let chunked = ChunkedTransfer::new(plane(&runner), 10);

    let dir = tempfile::tempdir().unwrap();
    let mut session = TransferSession::new(remote(), dir.path().join("out"), 30);
    let err = chunked.transfer(&mut session).await.unwrap_err();

    assert!(matches!(err, Error::Transfer { stage: "reading chunk", .. }), "{err}");
    assert_eq!(err.exit_code(), 1);
    assert!(!session.local.exists());
}

#[tokio::test]
async fn empty_chunk_where_data_was_expected_is_fatal() {
    let runner = Arc::new(FakeRunner::new());
    runner.on("skip=0 count=1", Reply::ok(""));
    let chunked = ChunkedTransfer::new(plane(&runner), 10);

    let dir = tempfile::tempdir().unwrap();
    let mut session = TransferSession::new(remote(), dir.path().join("out"), 10);
    let err = chunked.transfer(&mut session).await.unwrap_err();

    assert!(matches!(err, Error::Transfer { method: TransferMethod::Chunked, .. }), "{err}");
    assert!(!session.local.exists());
}

#[tokio::test]
async fn chunked_read_script_round_trips_a_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("dump_1.dmp");
    let data = pattern(25);
    std::fs::write(&source, &data).unwrap();

    let chunked = ChunkedTransfer::new(local_plane(dir.path()), 10);
    let remote = RemoteFile::new(target(), &source);
    let size = chunked.probe_size(&remote).await.unwrap();
    assert_eq!(size, 25);

    let mut session = TransferSession::new(remote, dir.path().join("latest_dump"), size);
    chunked.transfer(&mut session).await.unwrap();
    assert_eq!(session.progress, [40, 80, 100]);
    assert_eq!(std::fs::read(&session.local).unwrap(), data);
}

#[tokio::test]
async fn chunked_read_of_missing_file_fails_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let chunked = ChunkedTransfer::new(local_plane(dir.path()), 10);
    let remote = RemoteFile::new(target(), dir.path().join("vanished.dmp"));

    let mut session = TransferSession::new(remote, dir.path().join("latest_dump"), 30);
    let err = chunked.transfer(&mut session).await.unwrap_err();

    assert_eq!(err.exit_code(), UNREADABLE_EXIT);
    assert_eq!(session.transferred, 0);
    assert!(!session.local.exists());
}

#[tokio::test]
async fn archive_streams_into_local_tar_and_renames() {
    let dir = tempfile::tempdir().unwrap();
    let remote_dir = dir.path().join("remote");
    let out_dir = dir.path().join("out");
    std::fs::create_dir_all(&remote_dir).unwrap();
    std::fs::create_dir_all(&out_dir).unwrap();
    std::fs::write(remote_dir.join("dump_1.dmp"), pattern(32)).unwrap();
    // An unrelated file sharing the remote name must survive.
    std::fs::write(out_dir.join("dump_1.dmp"), b"operator notes").unwrap();

    let archive = ArchiveTransfer::new(local_plane(dir.path()));
    let remote = RemoteFile::new(target(), remote_dir.join("dump_1.dmp"));
    let local = out_dir.join("latest_dump");
    let mut session = TransferSession::new(remote, &local, 32);
    archive.transfer(&mut session).await.unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), pattern(32));
    assert_eq!(std::fs::read(out_dir.join("dump_1.dmp")).unwrap(), b"operator notes");
    let mut names: Vec<_> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["dump_1.dmp", "latest_dump"]);
    assert_eq!(session.verify(), Ok(()));
}

#[tokio::test]
async fn archive_failure_keeps_remote_code() {
    let runner = Arc::new(FakeRunner::new());
    runner.on("tar cf - -C /tmp dump_1.dmp", Reply::code(2));
    let dir = tempfile::tempdir().unwrap();

    let mut session = TransferSession::new(remote(), dir.path().join("latest_dump"), 32);
    let err = ArchiveTransfer::new(plane(&runner))
        .transfer(&mut session)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    let call = &runner.calls()[0];
    let consumer = call.piped_to.as_ref().unwrap();
    assert_eq!(consumer.args[..2], ["xf", "-"]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
