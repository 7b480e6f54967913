//! Dump output
//!
//! Stdout or a file, released only by [`DumpOutput::commit`].
//!
//! - A file is written to a temporary sibling and renamed over the target on
//!   commit. A failed dump leaves no new file and an existing one untouched.
//! - Stdout is buffered. Dropping the output without a commit discards the
//!   pending buffer; only buffers that filled up before the error have been
//!   written.
//! - `flush` does nothing, so sinks can flush freely without releasing bytes.

use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

const STDOUT_BUFFER: usize = 1 << 20;

enum Target {
    Stdout(BufWriter<Stdout>),
    File {
        temp: BufWriter<NamedTempFile>,
        path: PathBuf,
    },
}

pub struct DumpOutput {
    target: Option<Target>,
}

impl DumpOutput {
    pub fn stdout() -> Self {
        Self {
            target: Some(Target::Stdout(BufWriter::with_capacity(
                STDOUT_BUFFER,
                io::stdout(),
            ))),
        }
    }

    /// Stage output for `path` in the same directory.
    pub fn file(path: &Path) -> io::Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(dir)?;
        Ok(Self {
            target: Some(Target::File {
                temp: BufWriter::new(temp),
                path: path.to_path_buf(),
            }),
        })
    }

    /// Write out everything pending and, for a file, move it into place.
    pub fn commit(mut self) -> io::Result<()> {
        match self.target.take() {
            Some(Target::Stdout(mut out)) => out.flush(),
            Some(Target::File { temp, path }) => {
                let temp = temp.into_inner().map_err(|e| e.into_error())?;
                temp.persist(&path).map_err(|e| e.error)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Write for DumpOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.target {
            Some(Target::Stdout(out)) => out.write(buf),
            Some(Target::File { temp, .. }) => temp.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DumpOutput {
    fn drop(&mut self) {
        // into_parts hands back the buffer instead of writing it
        let pending = match self.target.take() {
            Some(Target::Stdout(out)) => out.into_parts().1,
            Some(Target::File { temp, .. }) => temp.into_parts().1,
            None => return,
        };
        debug!(
            bytes = pending.map_or(0, |b| b.len()),
            "discarding uncommitted output"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");

        let mut out = DumpOutput::file(&path).unwrap();
        out.write_all(b"line\n").unwrap();
        out.flush().unwrap();
        assert!(!path.exists());

        out.commit().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[test]
    fn test_drop_without_commit_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");

        let mut out = DumpOutput::file(&path).unwrap();
        out.write_all(b"partial\n").unwrap();
        drop(out);

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_dump_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.csv");
        std::fs::write(&path, "previous\n").unwrap();

        let mut out = DumpOutput::file(&path).unwrap();
        out.write_all(b"partial\n").unwrap();
        drop(out);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous\n");
    }
}
