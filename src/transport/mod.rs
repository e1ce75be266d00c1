//! Источники байт и выбор транспорта по локатору.
//!
//! Все транспорты реализуют один блокирующий трейт [`ByteSource`].
//! [`resolve`] выбирает реализацию по схеме локатора ровно один раз; дальше
//! декодер работает с закрытым enum [`AnySource`].

pub mod cancel;
pub mod file;
pub mod http;
pub mod locator;
pub mod memory;
pub mod resolver;
pub mod xrootd;

pub use cancel::CancelToken;
pub use file::FileSource;
use hddm_error::{HddmResult, TransportError};
pub use http::HttpSource;
pub use locator::{ResourceLocator, Scheme};
pub use memory::MemorySource;
pub use resolver::resolve;
pub use xrootd::XrootdSource;

/// Вид транспорта, стоящего за источником.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    Http,
    Https,
    Xrootd,
    Memory,
}

/// Блокирующий источник байт поверх одного физического транспорта.
///
/// Источник принадлежит ровно одному потоку чтения. `close` должен быть
/// идемпотентным; после него `read_into` возвращает ошибку.
pub trait ByteSource: Send {
    /// Читает до `buf.len()` байт. `Ok(0)` означает конец данных.
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize>;

    /// Текущий offset чтения от начала ресурса.
    fn position(&self) -> u64;

    /// Переход к абсолютному offset.
    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        let _ = offset;
        Err(TransportError::Unsupported {
            operation: "seek",
            scheme: self.kind().as_str(),
        }
        .into())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    /// Освобождает ресурс. Повторный вызов ничего не делает.
    fn close(&mut self) -> HddmResult<()>;

    fn is_closed(&self) -> bool;

    fn kind(&self) -> SourceKind;
}

/// Закрытый набор источников, которые умеет строить [`resolve`].
#[derive(Debug)]
pub enum AnySource {
    File(FileSource),
    Http(HttpSource),
    Xrootd(XrootdSource),
    Memory(MemorySource),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Http => "http",
            Self::Https => "https",
            Self::Xrootd => "root",
            Self::Memory => "memory",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $src:ident => $body:expr) => {
        match $self {
            AnySource::File($src) => $body,
            AnySource::Http($src) => $body,
            AnySource::Xrootd($src) => $body,
            AnySource::Memory($src) => $body,
        }
    };
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl ByteSource for AnySource {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        delegate!(self, s => s.read_into(buf))
    }

    fn position(&self) -> u64 {
        delegate!(self, s => s.position())
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        delegate!(self, s => s.seek(offset))
    }

    fn is_seekable(&self) -> bool {
        delegate!(self, s => s.is_seekable())
    }

    fn close(&mut self) -> HddmResult<()> {
        delegate!(self, s => s.close())
    }

    fn is_closed(&self) -> bool {
        delegate!(self, s => s.is_closed())
    }

    fn kind(&self) -> SourceKind {
        delegate!(self, s => s.kind())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        (**self).read_into(buf)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        (**self).seek(offset)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn close(&mut self) -> HddmResult<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn kind(&self) -> SourceKind {
        (**self).kind()
    }
}

impl From<MemorySource> for AnySource {
    fn from(s: MemorySource) -> Self {
        Self::Memory(s)
    }
}

impl From<FileSource> for AnySource {
    fn from(s: FileSource) -> Self {
        Self::File(s)
    }
}
