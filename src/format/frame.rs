//! Чтение фреймов контейнера из [`ByteSource`].
//!
//! Декодер читает заголовок ровно один раз, затем по запросу отдаёт
//! полезную нагрузку очередного фрейма. Конец потока — только маркер
//! [`END_OF_STREAM`]; нехватка байт в любом месте, включая границу фрейма,
//! это [`DecodeError::TruncatedStream`].

use bytes::{Bytes, BytesMut};
use hddm_error::{DecodeError, HddmResult};
use tracing::{debug, trace};

use super::{inflate, ByteOrder, Compression, ContainerHeader, FormatVersion, Integrity, HEADER_LEN};
use crate::{config::DEFAULT_MAX_RECORD_LENGTH, transport::ByteSource};

/// Префикс длины, означающий чистый конец потока.
pub const END_OF_STREAM: u32 = 0xFFFF_FFFF;

/// Ограничения декодера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Верхняя граница длины фрейма и распакованной записи
    pub max_record_length: u32,
}

/// Полезная нагрузка одного фрейма.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Данные записи (после распаковки, если она была)
    pub payload: Bytes,
    /// Offset префикса длины в потоке
    pub offset: u64,
    /// Порядковый номер фрейма, с нуля
    pub index: u64,
    /// Сколько байт фрейм занимает в потоке, включая префикс и CRC
    pub frame_len: u64,
    pub byte_order: ByteOrder,
    pub version: FormatVersion,
    /// Была ли нагрузка распакована
    pub inflated: bool,
}

/// Декодер фреймов поверх источника.
#[derive(Debug)]
pub struct FrameDecoder<S: ByteSource> {
    source: S,
    header: ContainerHeader,
    limits: FrameLimits,
    offset: u64,
    index: u64,
    finished: bool,
}

/// Заголовок фрейма после проверки длины.
struct FrameStart {
    offset: u64,
    len: u32,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<S: ByteSource> FrameDecoder<S> {
    /// Читает и проверяет заголовок контейнера.
    ///
    /// Если заголовок не прочитан, источник закрывается до возврата ошибки.
    pub fn open(
        mut source: S,
        limits: FrameLimits,
    ) -> HddmResult<Self> {
        let header = match read_header(&mut source) {
            Ok(header) => header,
            Err(e) => {
                let _ = source.close();
                return Err(e);
            }
        };
        debug!(
            version = header.version as u8,
            byte_order = ?header.byte_order,
            compression = header.compression.name(),
            integrity = ?header.integrity,
            "Container header"
        );

        Ok(Self {
            source,
            header,
            limits,
            offset: HEADER_LEN as u64,
            index: 0,
            finished: false,
        })
    }

    /// Читает следующий фрейм. `Ok(None)` — встречен маркер конца потока.
    pub fn next_record(&mut self) -> HddmResult<Option<RawRecord>> {
        let Some(start) = self.read_frame_start()? else {
            return Ok(None);
        };

        let mut buf = BytesMut::zeroed(start.len as usize);
        read_exact(
            &mut self.source,
            &mut buf,
            start.offset + 4,
            "frame payload",
        )?;
        let stored = buf.freeze();
        self.check_integrity(&stored, start.offset + 4 + start.len as u64)?;

        let (payload, inflated) = match self.header.compression {
            Compression::None => (stored, false),
            codec => {
                let out = inflate(codec, &stored, self.limits.max_record_length as usize)
                    .map_err(|e| e.rebase(start.offset))?;
                (Bytes::from(out), true)
            }
        };

        let frame_len = 4 + start.len as u64 + self.header.trailer_len() as u64;
        let record = RawRecord {
            payload,
            offset: start.offset,
            index: self.index,
            frame_len,
            byte_order: self.header.byte_order,
            version: self.header.version,
            inflated,
        };
        trace!(
            index = record.index,
            offset = record.offset,
            len = record.payload.len(),
            "frame"
        );

        self.offset += frame_len;
        self.index += 1;
        Ok(Some(record))
    }

    /// Пропускает один фрейм без разбора. Возвращает `false` на маркере
    /// конца потока.
    ///
    /// На seekable источниках нагрузка не читается; целостность при этом не
    /// проверяется.
    pub fn skip_record(&mut self) -> HddmResult<bool> {
        let Some(start) = self.read_frame_start()? else {
            return Ok(false);
        };
        let body = start.len as u64 + self.header.trailer_len() as u64;
        let next = start.offset + 4 + body;

        if self.source.is_seekable() {
            self.source.seek(next)?;
        } else {
            let mut scratch = vec![0u8; body.min(64 * 1024) as usize];
            let mut left = body;
            let mut at = start.offset + 4;
            while left > 0 {
                let n = left.min(scratch.len() as u64) as usize;
                read_exact(&mut self.source, &mut scratch[..n], at, "skipped frame")?;
                left -= n as u64;
                at += n as u64;
            }
        }

        self.offset = next;
        self.index += 1;
        Ok(true)
    }

    /// Переставляет декодер на границу фрейма `offset` с номером `index`.
    pub fn reposition(
        &mut self,
        offset: u64,
        index: u64,
    ) -> HddmResult<()> {
        self.source.seek(offset)?;
        self.offset = offset;
        self.index = index;
        self.finished = false;
        Ok(())
    }

    fn read_frame_start(&mut self) -> HddmResult<Option<FrameStart>> {
        if self.finished {
            return Ok(None);
        }
        let offset = self.offset;

        let mut prefix = [0u8; 4];
        read_exact(&mut self.source, &mut prefix, offset, "frame length prefix")?;
        let len = self.header.byte_order.read_u32(&prefix);

        if len == END_OF_STREAM {
            debug!(offset, frames = self.index, "End-of-stream marker");
            self.finished = true;
            self.offset += 4;
            return Ok(None);
        }
        if len == 0 || len > self.limits.max_record_length {
            return Err(DecodeError::CorruptLength {
                what: "frame".to_string(),
                declared: len as u64,
                available: self.limits.max_record_length as u64,
                offset: Some(offset),
            }
            .into());
        }

        Ok(Some(FrameStart { offset, len }))
    }

    fn check_integrity(
        &mut self,
        stored: &[u8],
        crc_offset: u64,
    ) -> HddmResult<()> {
        if self.header.integrity != Integrity::Crc32 {
            return Ok(());
        }
        let mut crc = [0u8; 4];
        read_exact(&mut self.source, &mut crc, crc_offset, "frame checksum")?;
        let recorded = self.header.byte_order.read_u32(&crc);
        let computed = crc32fast::hash(stored);
        if computed != recorded {
            return Err(DecodeError::IntegrityMismatch {
                computed,
                recorded,
                offset: Some(crc_offset),
            }
            .into());
        }
        Ok(())
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Offset следующего фрейма.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Номер следующего фрейма.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Встречен ли маркер конца потока.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

fn read_header<S: ByteSource>(source: &mut S) -> HddmResult<ContainerHeader> {
    let mut buf = [0u8; HEADER_LEN];
    read_exact(source, &mut buf, 0, "container header")?;
    Ok(ContainerHeader::parse(&buf)?)
}

/// Читает ровно `buf.len()` байт или возвращает `TruncatedStream`.
fn read_exact<S: ByteSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
    offset: u64,
    context: &str,
) -> HddmResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read_into(&mut buf[filled..])?;
        if n == 0 {
            return Err(DecodeError::TruncatedStream {
                context: context.to_string(),
                offset: Some(offset),
                expected: buf.len() as u64,
                got: filled as u64,
            }
            .into());
        }
        filled += n;
    }
    Ok(())
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_record_length: DEFAULT_MAX_RECORD_LENGTH,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
