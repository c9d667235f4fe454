//! Terminal rendering of build progress and build results.
//!
//! Progress goes to stdout, stops and failures to stderr. Colors are only
//! used when the target stream supports them.

use std::path::Path;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use fnpack_lib::build::BuildResult;

/// What a status line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Building,
  Built,
  Stopped,
  Failed,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Building => "→",
      Status::Built => "✓",
      Status::Stopped => "!",
      Status::Failed => "✗",
    }
  }

  fn stream(self) -> Stream {
    match self {
      Status::Building | Status::Built => Stream::Stdout,
      Status::Stopped | Status::Failed => Stream::Stderr,
    }
  }
}

/// Print `message` behind the marker for `status`.
pub fn status(status: Status, message: &str) {
  let marker = status.marker();
  let marker = marker.if_supports_color(status.stream(), |m| match status {
    Status::Building => m.cyan().to_string(),
    Status::Built => m.green().to_string(),
    Status::Stopped => m.yellow().to_string(),
    Status::Failed => m.red().bold().to_string(),
  });

  match status {
    Status::Building | Status::Built => println!("{} {}", marker, message),
    Status::Stopped | Status::Failed => eprintln!("{} {}", marker, message),
  }
}

/// Archive sizes as the deploy tooling reports them, in binary units.
pub fn archive_size(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

  if bytes < 1024 {
    return format!("{} bytes", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// The labelled lines describing `result`. `size` is the archive's size when
/// it could be read.
pub fn result_lines(result: &BuildResult, size: Option<u64>) -> Vec<(&'static str, String)> {
  match result {
    BuildResult::Archive { path } => {
      let mut lines = vec![("Archive", display(path))];
      if let Some(size) = size {
        lines.push(("Size", archive_size(size)));
      }
      lines
    }
    BuildResult::Local { execution_root } => vec![("Execution root", display(execution_root))],
  }
}

pub fn print_result(result: &BuildResult) {
  let size = result
    .archive_path()
    .and_then(|path| std::fs::metadata(path).ok())
    .map(|meta| meta.len());

  for (label, value) in result_lines(result, size) {
    println!("  {}: {}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()), value);
  }
}

/// Pretty-printed JSON on stdout.
pub fn print_document<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to render configuration as JSON")?;
  println!("{}", json);
  Ok(())
}

fn display(path: &Path) -> String {
  path.display().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  #[test]
  fn sizes_use_binary_units() {
    assert_eq!(archive_size(0), "0 bytes");
    assert_eq!(archive_size(1023), "1023 bytes");
    assert_eq!(archive_size(1536), "1.5 KiB");
    assert_eq!(archive_size(5 * 1024 * 1024), "5.0 MiB");
    assert_eq!(archive_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
  }

  #[test]
  fn archive_results_list_path_and_size() {
    let result = BuildResult::Archive {
      path: PathBuf::from("/srv/shop/.fnpack/artifacts/shop-1.zip"),
    };
    assert_eq!(
      result_lines(&result, Some(2048)),
      vec![
        ("Archive", "/srv/shop/.fnpack/artifacts/shop-1.zip".to_string()),
        ("Size", "2.0 KiB".to_string()),
      ]
    );
    assert_eq!(result_lines(&result, None).len(), 1);
  }

  #[test]
  fn local_results_name_the_execution_root() {
    let result = BuildResult::Local {
      execution_root: PathBuf::from("/srv/shop/.fnpack/build"),
    };
    assert_eq!(
      result_lines(&result, Some(10)),
      vec![("Execution root", "/srv/shop/.fnpack/build".to_string())]
    );
  }

  #[test]
  fn stops_and_failures_go_to_stderr() {
    assert!(matches!(Status::Stopped.stream(), Stream::Stderr));
    assert!(matches!(Status::Failed.stream(), Stream::Stderr));
    assert!(matches!(Status::Built.stream(), Stream::Stdout));
  }
}
