use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use hddm_error::{HddmResult, TransportError};
use tracing::debug;

use super::{ByteSource, CancelToken, SourceKind};

/// Источник поверх локального файла. Поддерживает seek.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
    pos: u64,
    cancel: CancelToken,
}

impl FileSource {
    /// Открывает файл на чтение. Любой сбой открытия — `ConnectFailed`.
    pub fn open(
        path: impl AsRef<Path>,
        cancel: CancelToken,
    ) -> HddmResult<Self> {
        let path = path.as_ref().to_path_buf();
        cancel.check("file open")?;

        let file = File::open(&path).map_err(|e| TransportError::ConnectFailed {
            address: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Opened file source");

        Ok(Self {
            path,
            file: Some(file),
            pos: 0,
            cancel,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(
        &self,
        err: std::io::Error,
    ) -> TransportError {
        TransportError::ReadFailed {
            address: self.path.display().to_string(),
            offset: self.pos,
            reason: err.to_string(),
        }
    }
}

impl ByteSource for FileSource {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        self.cancel.check("file read")?;
        let Some(file) = self.file.as_mut() else {
            return Err(TransportError::cancelled("file read").into());
        };

        loop {
            match file.read(buf) {
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.read_error(e).into()),
            }
        }
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(TransportError::cancelled("file seek").into());
        };
        match file.seek(SeekFrom::Start(offset)) {
            Ok(pos) => {
                self.pos = pos;
                Ok(())
            }
            Err(e) => Err(self.read_error(e).into()),
        }
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn close(&mut self) -> HddmResult<()> {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "Closed file source");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }
}
