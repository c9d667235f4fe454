//! Archive assembly.
//!
//! [`ArtifactSink`] is an append-only list of named entries that becomes the
//! deployable zip archive. Entries are registered without being read; payloads
//! are only materialized when the sink is finalized.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// The content of an archive entry.
pub enum Payload {
  /// A file on disk, read when the archive is written.
  File(PathBuf),
  /// An in-memory buffer.
  Buffer(Vec<u8>),
  /// A readable stream, drained when the archive is written.
  Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for Payload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Payload::File(path) => f.debug_tuple("File").field(path).finish(),
      Payload::Buffer(bytes) => write!(f, "Buffer({} bytes)", bytes.len()),
      Payload::Stream(_) => f.write_str("Stream"),
    }
  }
}

/// One named member of the archive.
#[derive(Debug)]
pub struct ArtifactEntry {
  pub name: String,
  pub payload: Payload,
  pub compress: bool,
}

/// Accumulates archive entries across build phases.
///
/// Entry names are unique: registering a name twice replaces the earlier
/// payload in place (last write wins) and keeps the original position.
#[derive(Debug, Default)]
pub struct ArtifactSink {
  entries: Vec<ArtifactEntry>,
}

impl ArtifactSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a file on disk. Existence is the caller's responsibility.
  pub fn add_file(&mut self, path: impl Into<PathBuf>, name: impl Into<String>, compress: bool) {
    self.push(ArtifactEntry {
      name: name.into(),
      payload: Payload::File(path.into()),
      compress,
    });
  }

  pub fn add_buffer(&mut self, bytes: impl Into<Vec<u8>>, name: impl Into<String>, compress: bool) {
    self.push(ArtifactEntry {
      name: name.into(),
      payload: Payload::Buffer(bytes.into()),
      compress,
    });
  }

  pub fn add_stream(&mut self, stream: Box<dyn Read + Send>, name: impl Into<String>, compress: bool) {
    self.push(ArtifactEntry {
      name: name.into(),
      payload: Payload::Stream(stream),
      compress,
    });
  }

  /// Register an already built entry.
  pub fn push(&mut self, entry: ArtifactEntry) {
    debug!(name = %entry.name, payload = ?entry.payload, "artifact entry added");

    if let Some(existing) = self.entries.iter_mut().find(|e| e.name == entry.name) {
      warn!(name = %entry.name, "artifact entry registered twice, replacing earlier payload");
      *existing = entry;
    } else {
      self.entries.push(entry);
    }
  }

  pub fn entries(&self) -> &[ArtifactEntry] {
    &self.entries
  }

  pub fn get(&self, name: &str) -> Option<&ArtifactEntry> {
    self.entries.iter().find(|e| e.name == name)
  }

  pub fn names(&self) -> Vec<&str> {
    self.entries.iter().map(|e| e.name.as_str()).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Write every entry, in registration order, as a zip archive into `writer`.
  ///
  /// Compression is chosen per entry. Returns the writer once the archive's
  /// central directory has been written.
  pub fn finalize_into<W: Write + Seek>(self, writer: W) -> ZipResult<W> {
    let mut zip = ZipWriter::new(writer);

    for entry in self.entries {
      let method = if entry.compress {
        CompressionMethod::Deflated
      } else {
        CompressionMethod::Stored
      };
      let options = SimpleFileOptions::default()
        .compression_method(method)
        .unix_permissions(0o644);

      check_entry_name(&entry.name)?;
      zip.start_file(entry.name.as_str(), options)?;

      match entry.payload {
        Payload::File(path) => copy_file(&path, &mut zip)?,
        Payload::Buffer(bytes) => zip.write_all(&bytes)?,
        Payload::Stream(mut reader) => {
          io::copy(&mut reader, &mut zip)?;
        }
      }
    }

    zip.finish()
  }
}

/// Write an entry's payload to `dir/<name>` and return an entry referring to
/// the written file.
///
/// Used in local execution mode, where the build directory itself is the
/// output. A file payload already at its destination is left alone.
pub fn stage_entry(entry: ArtifactEntry, dir: &Path) -> io::Result<ArtifactEntry> {
  check_entry_name(&entry.name)?;
  let dest = dir.join(&entry.name);
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }

  match entry.payload {
    Payload::File(ref src) if *src == dest => {}
    Payload::File(src) => {
      fs::copy(&src, &dest)?;
    }
    Payload::Buffer(bytes) => fs::write(&dest, bytes)?,
    Payload::Stream(mut reader) => {
      let mut file = File::create(&dest)?;
      io::copy(&mut reader, &mut file)?;
    }
  }

  debug!(name = %entry.name, dest = %dest.display(), "artifact entry staged");
  Ok(ArtifactEntry {
    name: entry.name,
    payload: Payload::File(dest),
    compress: entry.compress,
  })
}

/// Reject entry names that would resolve outside the archive root or the
/// build directory.
///
/// A valid name is a non-empty relative path of plain components separated by
/// `/`. Absolute paths, drive prefixes, `.` and `..` components and
/// backslashes are refused with [`io::ErrorKind::InvalidInput`].
pub fn check_entry_name(name: &str) -> io::Result<()> {
  let invalid = |reason: &str| {
    Err(io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("invalid entry name '{}': {}", name, reason),
    ))
  };

  if name.is_empty() {
    return invalid("name is empty");
  }
  if name.contains('\\') {
    return invalid("backslashes are not allowed");
  }
  for component in Path::new(name).components() {
    match component {
      Component::Normal(_) => {}
      Component::ParentDir => return invalid("'..' components are not allowed"),
      Component::CurDir => return invalid("'.' components are not allowed"),
      Component::RootDir | Component::Prefix(_) => return invalid("name must be relative"),
    }
  }
  Ok(())
}

fn copy_file<W: Write>(path: &Path, writer: &mut W) -> io::Result<()> {
  let mut file = File::open(path)
    .map_err(|e| io::Error::new(e.kind(), format!("cannot open '{}': {}", path.display(), e)))?;
  io::copy(&mut file, writer)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use tempfile::TempDir;
  use tracing_test::traced_test;
  use zip::ZipArchive;

  fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut content = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
    content
  }

  #[test]
  fn entries_keep_registration_order() {
    let mut sink = ArtifactSink::new();
    sink.add_buffer("b", "b.js", true);
    sink.add_buffer("a", "a.js", true);
    sink.add_buffer("c", "c.js", false);
    assert_eq!(sink.names(), vec!["b.js", "a.js", "c.js"]);
  }

  #[test]
  #[traced_test]
  fn duplicate_names_replace_in_place() {
    let mut sink = ArtifactSink::new();
    sink.add_buffer("first", "handler.js", true);
    sink.add_buffer("other", "other.js", true);
    sink.add_buffer("second", "handler.js", false);

    assert_eq!(sink.names(), vec!["handler.js", "other.js"]);
    let entry = sink.get("handler.js").unwrap();
    assert!(matches!(&entry.payload, Payload::Buffer(b) if b == b"second"));
    assert!(!entry.compress);
    assert!(logs_contain("artifact entry registered twice"));
  }

  #[test]
  fn add_file_does_not_touch_disk() {
    let mut sink = ArtifactSink::new();
    sink.add_file("/does/not/exist.js", "exist.js", true);
    assert_eq!(sink.len(), 1);
  }

  #[test]
  fn finalize_writes_all_payload_kinds() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("lib.js");
    std::fs::write(&file_path, "from disk").unwrap();

    let mut sink = ArtifactSink::new();
    sink.add_file(&file_path, "lib/lib.js", true);
    sink.add_buffer("module content A", "handler.js", false);
    sink.add_stream(Box::new(Cursor::new(b"streamed".to_vec())), "stream.txt", true);

    let cursor = sink.finalize_into(Cursor::new(Vec::new())).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();

    let names: Vec<_> = archive.file_names().map(str::to_string).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(read_entry(&mut archive, "lib/lib.js"), "from disk");
    assert_eq!(read_entry(&mut archive, "handler.js"), "module content A");
    assert_eq!(read_entry(&mut archive, "stream.txt"), "streamed");
  }

  #[test]
  fn compression_is_entry_scoped() {
    let mut sink = ArtifactSink::new();
    sink.add_buffer("x".repeat(4096), "packed.js", true);
    sink.add_buffer("x".repeat(4096), "stored.js", false);

    let cursor = sink.finalize_into(Cursor::new(Vec::new())).unwrap();
    let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();

    assert_eq!(
      archive.by_name("packed.js").unwrap().compression(),
      CompressionMethod::Deflated
    );
    assert_eq!(
      archive.by_name("stored.js").unwrap().compression(),
      CompressionMethod::Stored
    );
  }

  #[test]
  fn stage_entry_writes_every_payload_kind() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src.js");
    std::fs::write(&src, "file").unwrap();
    let out = temp.path().join("out");

    let entries = vec![
      ArtifactEntry {
        name: "lib/copied.js".to_string(),
        payload: Payload::File(src),
        compress: true,
      },
      ArtifactEntry {
        name: "buffer.js".to_string(),
        payload: Payload::Buffer(b"buffer".to_vec()),
        compress: true,
      },
      ArtifactEntry {
        name: "stream.js".to_string(),
        payload: Payload::Stream(Box::new(Cursor::new(b"stream".to_vec()))),
        compress: false,
      },
    ];

    for entry in entries {
      let staged = stage_entry(entry, &out).unwrap();
      let Payload::File(path) = &staged.payload else {
        panic!("staged entry must refer to a file");
      };
      assert!(path.starts_with(&out));
    }

    assert_eq!(std::fs::read_to_string(out.join("lib/copied.js")).unwrap(), "file");
    assert_eq!(std::fs::read_to_string(out.join("buffer.js")).unwrap(), "buffer");
    assert_eq!(std::fs::read_to_string(out.join("stream.js")).unwrap(), "stream");
  }

  #[test]
  fn stage_entry_leaves_files_already_in_place() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("handler.js");
    std::fs::write(&path, "built").unwrap();

    let entry = ArtifactEntry {
      name: "handler.js".to_string(),
      payload: Payload::File(path.clone()),
      compress: true,
    };
    stage_entry(entry, temp.path()).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "built");
  }

  #[test]
  fn entry_names_must_stay_relative() {
    for name in ["handler.js", "lib/vendor.js", "node_modules/@acme/log/index.js"] {
      assert!(check_entry_name(name).is_ok(), "{name} should be accepted");
    }
    for name in ["", "../escaped.js", "lib/../../escaped.js", "/etc/passwd", "./handler.js", "..\\escaped.js"] {
      let err = check_entry_name(name).unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name} should be refused");
    }
  }

  #[test]
  fn stage_entry_refuses_escaping_names() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out/build");

    let entry = ArtifactEntry {
      name: "../../escaped.js".to_string(),
      payload: Payload::Buffer(b"pwned".to_vec()),
      compress: true,
    };
    assert!(stage_entry(entry, &out).is_err());
    assert!(!temp.path().join("escaped.js").exists());
    assert!(!out.exists());
  }

  #[test]
  fn finalize_refuses_absolute_names() {
    let mut sink = ArtifactSink::new();
    sink.add_buffer("ok", "handler.js", true);
    sink.add_buffer("pwned", "/tmp/escaped.js", true);
    assert!(sink.finalize_into(Cursor::new(Vec::new())).is_err());
  }

  #[test]
  fn missing_file_fails_finalize() {
    let mut sink = ArtifactSink::new();
    sink.add_file("/does/not/exist.js", "exist.js", true);
    assert!(sink.finalize_into(Cursor::new(Vec::new())).is_err());
  }
}
