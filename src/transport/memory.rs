use bytes::Bytes;
use hddm_error::{HddmResult, TransportError};

use super::{ByteSource, SourceKind};

/// Источник поверх буфера в памяти.
///
/// Используется для уже загруженных контейнеров и в тестах.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    pos: usize,
    closed: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        if self.closed {
            return Err(TransportError::cancelled("memory read").into());
        }
        let rest = &self.data[self.pos.min(self.data.len())..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        self.pos = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn close(&mut self) -> HddmResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }
}
