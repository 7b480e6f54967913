//! Local file source: positioned reads on a file opened once.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use tsdump_core::source::check_range;
use tsdump_core::{Error, RangedByteSource, Result};

#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: File,
    len: u64,
}

impl LocalFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io(path.display().to_string(), e))?
            .len();

        debug!(path = %path.display(), len, "opened local file");
        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl RangedByteSource for LocalFile {
    fn len(&self) -> u64 {
        self.len
    }

    fn range(&self, start: u64, end: u64) -> Result<Bytes> {
        check_range(|| self.describe(), start, end, self.len)?;

        let mut buf = vec![0u8; (end - start) as usize];
        self.read_exact_at(&mut buf, start).map_err(|e| {
            Error::io(format!("{} [{}..{})", self.path.display(), start, end), e)
        })?;
        Ok(Bytes::from(buf))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
