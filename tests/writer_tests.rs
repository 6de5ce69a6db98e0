use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::{thread_rng, Rng};
use tarpipe::entry::Entry;
use tarpipe::error::ArchiveError;
use tarpipe::provider::StreamingDataProvider;
use tarpipe::reader::{DataReceiver, Reader};
use tarpipe::stop::StopToken;
use tarpipe::writer::{MemoryBuffer, Writer};
use tempfile::tempdir;

/// Collects every decoded entry as (pathname, permissions, content).
#[derive(Clone, Default)]
struct CollectingReceiver {
    entries: Arc<Mutex<Vec<(String, u32, Vec<u8>)>>>,
    completed: Arc<Mutex<bool>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl CollectingReceiver {
    fn entries(&self) -> Vec<(String, u32, Vec<u8>)> {
        self.entries.lock().unwrap().clone()
    }

    fn wait_until_complete(&self, deadline: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if *self.completed.lock().unwrap() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl DataReceiver for CollectingReceiver {
    fn on_new_entry(&mut self, entry: &Entry) {
        self.entries.lock().unwrap().push((
            entry.pathname().to_string_lossy().into_owned(),
            entry.permissions(),
            Vec::new(),
        ));
    }

    fn on_data(&mut self, data: &[u8]) {
        if let Some((_, _, content)) = self.entries.lock().unwrap().last_mut() {
            content.extend_from_slice(data);
        }
    }

    fn on_complete(&mut self) {
        *self.completed.lock().unwrap() = true;
    }

    fn on_error(&mut self, error: &ArchiveError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Push an archive through the streaming pipeline and collect what comes out.
fn decode_archive(bytes: &[u8]) -> CollectingReceiver {
    let token = StopToken::new();
    let provider = Arc::new(StreamingDataProvider::new(token.clone()));
    let receiver = CollectingReceiver::default();
    let mut reader = Reader::new(provider.clone(), Box::new(receiver.clone()));
    reader.read_async(token.clone());

    for chunk in bytes.chunks(1000) {
        assert!(provider.push(chunk.to_vec()));
    }
    assert!(
        receiver.wait_until_complete(Duration::from_secs(10)),
        "decode did not complete; errors: {:?}",
        receiver.errors.lock().unwrap()
    );
    token.signal();
    reader.await_read();
    receiver
}

#[test]
fn add_string_round_trips_through_the_reader() {
    let mut rng = thread_rng();
    let inputs: Vec<(String, u32, String)> = (0..8)
        .map(|i| {
            let len = rng.gen_range(1..2000);
            let content: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
            let perms = [0o600, 0o644, 0o755][i % 3];
            (format!("mods/file{i}.txt"), perms, content)
        })
        .collect();

    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    for (name, perms, content) in &inputs {
        writer.add_string(content, Path::new(name), *perms).unwrap();
    }
    writer.finish().unwrap();
    let bytes = buffer.lock().unwrap().clone();

    let receiver = decode_archive(&bytes);
    let decoded = receiver.entries();
    assert_eq!(decoded.len(), inputs.len());
    for ((name, perms, content), (got_name, got_perms, got_content)) in
        inputs.iter().zip(decoded.iter())
    {
        assert_eq!(got_name, name);
        assert_eq!(*got_perms & 0o7777, *perms);
        assert_eq!(got_content, content.as_bytes());
    }
}

#[test]
fn add_file_round_trips_through_the_reader() {
    let staging = tempdir().unwrap();
    let source = staging.path().join("mod.jar");
    let mut rng = thread_rng();
    let mut content = vec![0u8; 10_000];
    rng.fill(&mut content[..]);
    File::create(&source).unwrap().write_all(&content).unwrap();

    let archive_path = staging.path().join("out.tar");
    let mut writer = Writer::create(&archive_path).unwrap();
    writer.add_file(&source).unwrap();
    writer.finish().unwrap();

    let bytes = std::fs::read(&archive_path).unwrap();
    let receiver = decode_archive(&bytes);
    let decoded = receiver.entries();
    assert_eq!(decoded.len(), 1);
    // The entry is named after the path's final component.
    assert_eq!(decoded[0].0, "mod.jar");
    assert_eq!(decoded[0].2, content);
}

#[test]
fn gzip_filter_round_trips_through_the_reader() {
    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    writer.add_gzip_filter().unwrap();
    writer
        .add_string("compressed payload", Path::new("notes.txt"), 0o644)
        .unwrap();
    writer.finish().unwrap();
    let bytes = buffer.lock().unwrap().clone();
    // Really gzip on the wire.
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let receiver = decode_archive(&bytes);
    let decoded = receiver.entries();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].0, "notes.txt");
    assert_eq!(decoded[0].2, b"compressed payload");
}

#[test]
fn create_fails_on_unwritable_destination() {
    let staging = tempdir().unwrap();
    let path = staging.path().join("missing-dir").join("out.tar");
    assert!(matches!(
        Writer::create(&path),
        Err(ArchiveError::Io(_))
    ));
}

#[test]
fn gzip_filter_is_rejected_after_first_entry() {
    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    writer.add_string("x", Path::new("a.txt"), 0o644).unwrap();
    assert!(matches!(
        writer.add_gzip_filter(),
        Err(ArchiveError::FilterRejected(_))
    ));
}

#[test]
fn gzip_filter_cannot_be_stacked() {
    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    writer.add_gzip_filter().unwrap();
    assert!(matches!(
        writer.add_gzip_filter(),
        Err(ArchiveError::FilterRejected(_))
    ));
}

#[test]
fn add_file_on_missing_path_fails() {
    let staging = tempdir().unwrap();
    let buffer: MemoryBuffer = Arc::new(Mutex::new(Vec::new()));
    let mut writer = Writer::to_memory(Arc::clone(&buffer));
    assert!(matches!(
        writer.add_file(&staging.path().join("gone.txt")),
        Err(ArchiveError::NotFound(_))
    ));
}
