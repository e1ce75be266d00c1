//! Распаковка полезной нагрузки фреймов.
//!
//! Размер распакованных данных всегда ограничен сверху, чтобы испорченный
//! или враждебный фрейм не мог раздуться до произвольного размера.

use std::io::Read;

use flate2::read::ZlibDecoder;
use hddm_error::DecodeError;

use super::Compression;

/// Распаковывает `data` кодеком `codec`, не более `limit` байт.
///
/// Для [`Compression::None`] возвращает копию входа. Превышение лимита
/// даёт [`DecodeError::CorruptLength`], сбой кодека —
/// [`DecodeError::Decompression`].
pub fn inflate(
    codec: Compression,
    data: &[u8],
    limit: usize,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let bound = limit as u64 + 1;

    let result = match codec {
        Compression::None => {
            out.extend_from_slice(data);
            Ok(data.len())
        }
        Compression::Zlib => ZlibDecoder::new(data).take(bound).read_to_end(&mut out),
        Compression::Zstd => zstd::stream::read::Decoder::new(data)
            .and_then(|decoder| decoder.take(bound).read_to_end(&mut out)),
    };

    result.map_err(|e| DecodeError::Decompression {
        codec: codec.name(),
        reason: e.to_string(),
        offset: None,
    })?;

    if out.len() > limit {
        return Err(DecodeError::CorruptLength {
            what: format!("{} inflated payload", codec.name()),
            declared: out.len() as u64,
            available: limit as u64,
            offset: None,
        });
    }

    Ok(out)
}
