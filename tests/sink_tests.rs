use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tarpipe::provider::ProviderConfig;
use tarpipe::sink::TarExtractorSink;
use tarpipe::writer::{MemoryBuffer, Writer};
use tempfile::tempdir;

fn fast_config() -> ProviderConfig {
    ProviderConfig {
        underrun_limit: Duration::from_millis(500),
        overflow_limit: Duration::from_millis(500),
        stop_grace_period: Duration::from_millis(200),
        max_buffer_chunks: 16,
        poll_interval: Duration::from_millis(20),
    }
}

/// One directory entry plus files under it, built through the crate's own
/// writer.
fn sample_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let staging = tempdir().unwrap();
    let assets = staging.path().join("assets");
    fs::create_dir(&assets).unwrap();

    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    writer.add_file(&assets).unwrap();
    for (name, content) in entries {
        writer
            .add_string(content, Path::new(name), 0o644)
            .unwrap();
    }
    writer.finish().unwrap();
    let bytes = buffer.lock().unwrap().clone();
    bytes
}

#[test]
fn processed_bytes_track_fed_bytes_even_on_failure() {
    let target = tempdir().unwrap();
    let mut sink = TarExtractorSink::with_config(target.path(), fast_config());
    sink.feed(&[0u8; 100]);
    sink.feed(&[0u8; 50]);
    sink.finalize();
    assert_eq!(sink.processed_byte_amount(), 150);
}

#[test]
fn sink_extracts_archive_into_target_directory() {
    let archive = sample_archive(&[
        ("assets/mods.txt", "fabric-api\nsodium\n"),
        ("manifest.json", "{\"version\": 1}"),
    ]);
    let target = tempdir().unwrap();

    let mut sink = TarExtractorSink::with_config(target.path(), fast_config());
    for chunk in archive.chunks(700) {
        assert!(sink.feed(chunk));
    }
    sink.finalize();

    assert!(!sink.is_in_error_state());
    assert_eq!(sink.processed_byte_amount(), archive.len() as u64);
    assert!(target.path().join("assets").is_dir());
    assert_eq!(
        fs::read_to_string(target.path().join("assets/mods.txt")).unwrap(),
        "fabric-api\nsodium\n"
    );
    assert_eq!(
        fs::read_to_string(target.path().join("manifest.json")).unwrap(),
        "{\"version\": 1}"
    );
}

#[test]
fn finalize_twice_is_harmless() {
    let archive = sample_archive(&[("assets/a.txt", "a")]);
    let target = tempdir().unwrap();

    let mut sink = TarExtractorSink::with_config(target.path(), fast_config());
    for chunk in archive.chunks(512) {
        assert!(sink.feed(chunk));
    }
    sink.finalize();
    sink.finalize();

    assert!(!sink.is_in_error_state());
    assert_eq!(
        fs::read_to_string(target.path().join("assets/a.txt")).unwrap(),
        "a"
    );
}

#[test]
fn sink_failure_latches_and_skips_later_entries() {
    let archive = sample_archive(&[
        ("blocked/trapped.txt", "never lands"),
        ("after.txt", "skipped"),
    ]);
    let target = tempdir().unwrap();
    // A plain file where the archive expects a directory, so the nested
    // create fails and the error state latches.
    File::create(target.path().join("blocked"))
        .unwrap()
        .write_all(b"in the way")
        .unwrap();

    let mut sink = TarExtractorSink::with_config(target.path(), fast_config());
    for chunk in archive.chunks(512) {
        sink.feed(chunk);
    }
    sink.finalize();

    assert!(sink.is_in_error_state());
    assert!(!target.path().join("after.txt").exists());
}

#[test]
fn dropping_an_unfinalized_sink_does_not_hang() {
    let target = tempdir().unwrap();
    let started = Instant::now();
    {
        let mut sink = TarExtractorSink::with_config(target.path(), fast_config());
        sink.feed(b"partial, never completed");
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}
