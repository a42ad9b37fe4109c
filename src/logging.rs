use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use env_logger::{Builder, Env, Target};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use log::LevelFilter;

/// Default size at which the log file is rotated (10 MiB).
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Default number of rotated files kept next to the live one.
pub const DEFAULT_BACKUPS: usize = 5;

/// Size-based rotation for the log file: `relay.log`, `relay.log.1`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub max_bytes: usize,
    pub backups: usize,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            backups: DEFAULT_BACKUPS,
        }
    }
}

/// Install the global logger.
///
/// `RUST_LOG`, when set, overrides `level`. With a `log_file`, every record is
/// written to stderr and to the rotating file.
pub fn init(level: LevelFilter, log_file: Option<&Path>, rotation: Rotation) -> anyhow::Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format_timestamp_secs();

    if let Some(path) = log_file {
        let file = open_rotating(path, rotation)?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    builder
        .try_init()
        .context("Logger was already initialized")?;
    Ok(())
}

/// Flush buffered records before the process exits.
pub fn flush() {
    log::logger().flush();
}

fn open_rotating(path: &Path, rotation: Rotation) -> anyhow::Result<FileRotate<AppendCount>> {
    // Surface an unwritable location now rather than on the first record
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(FileRotate::new(
        path,
        AppendCount::new(rotation.backups),
        ContentLimit::BytesSurpassed(rotation.max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

/// Copies every write to stderr and to the log file.
struct Tee<W: Write> {
    file: W,
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A broken stderr must not stop file logging
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_tee_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");

        let mut tee = Tee {
            file: open_rotating(&path, Rotation::default()).unwrap(),
        };
        tee.write_all(b"INFO hello\n").unwrap();
        tee.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO hello\n");
    }

    #[test]
    fn test_rotates_past_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        let rotation = Rotation {
            max_bytes: 32,
            backups: 2,
        };

        let mut tee = Tee {
            file: open_rotating(&path, rotation).unwrap(),
        };
        let first = format!("INFO {}\n", "a".repeat(40));
        tee.write_all(first.as_bytes()).unwrap();
        tee.write_all(b"INFO second\n").unwrap();
        tee.flush().unwrap();

        let rotated = dir.path().join("relay.log.1");
        assert!(rotated.exists(), "expected {}", rotated.display());
        assert_eq!(fs::read_to_string(&rotated).unwrap(), first);
        assert_eq!(fs::read_to_string(&path).unwrap(), "INFO second\n");
    }

    #[test]
    fn test_backup_count_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.log");
        let rotation = Rotation {
            max_bytes: 8,
            backups: 2,
        };

        let mut tee = Tee {
            file: open_rotating(&path, rotation).unwrap(),
        };
        for i in 0..6 {
            tee.write_all(format!("record {}\n", i).as_bytes()).unwrap();
        }
        tee.flush().unwrap();

        assert!(dir.path().join("relay.log.1").exists());
        assert!(dir.path().join("relay.log.2").exists());
        assert!(!dir.path().join("relay.log.3").exists());
    }

    #[test]
    fn test_unopenable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("relay.log");
        let err = init(LevelFilter::Info, Some(&path), Rotation::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to open log file"));
    }
}
