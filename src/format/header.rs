use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use hddm_error::DecodeError;
use num_enum::TryFromPrimitive;

/// «Магическое» начало контейнера: ASCII-буквы «HDDM».
pub const FILE_MAGIC: &[u8; 4] = b"HDDM";

/// Размер заголовка контейнера в байтах.
pub const HEADER_LEN: usize = 8;

/// Маркер big-endian потока.
pub const BOM_BIG_ENDIAN: [u8; 2] = [0xFE, 0xFF];

/// Маркер little-endian потока.
pub const BOM_LITTLE_ENDIAN: [u8; 2] = [0xFF, 0xFE];

/// Поддерживаемые версии формата.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum FormatVersion {
    V1 = 1,
}

/// Порядок байт многобайтовых целых после заголовка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Сжатие полезной нагрузки фреймов (младший полубайт флагов).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
pub enum Compression {
    #[default]
    None = 0,
    Zlib = 1,
    Zstd = 2,
}

/// Контроль целостности фреймов (старший полубайт флагов).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive)]
pub enum Integrity {
    #[default]
    None = 0,
    Crc32 = 1,
}

/// Заголовок контейнера, читается ровно один раз на открытый источник.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: FormatVersion,
    pub byte_order: ByteOrder,
    pub compression: Compression,
    pub integrity: Integrity,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl FormatVersion {
    /// Текущая версия формата.
    pub const fn current() -> Self {
        Self::V1
    }

    /// Все версии, которые умеет читать декодер.
    pub fn supported() -> Vec<u8> {
        vec![Self::V1 as u8]
    }
}

impl ByteOrder {
    /// Определяет порядок байт по маркеру BOM.
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match marker {
            BOM_BIG_ENDIAN => Some(Self::Big),
            BOM_LITTLE_ENDIAN => Some(Self::Little),
            _ => None,
        }
    }

    /// Маркер BOM для данного порядка байт.
    pub fn marker(self) -> [u8; 2] {
        match self {
            Self::Big => BOM_BIG_ENDIAN,
            Self::Little => BOM_LITTLE_ENDIAN,
        }
    }

    // Все read_* ожидают срез нужной длины; длину проверяет вызывающий код.

    pub fn read_u32(
        self,
        buf: &[u8],
    ) -> u32 {
        match self {
            Self::Big => BigEndian::read_u32(buf),
            Self::Little => LittleEndian::read_u32(buf),
        }
    }

    pub fn read_u64(
        self,
        buf: &[u8],
    ) -> u64 {
        match self {
            Self::Big => BigEndian::read_u64(buf),
            Self::Little => LittleEndian::read_u64(buf),
        }
    }

    pub fn read_i32(
        self,
        buf: &[u8],
    ) -> i32 {
        match self {
            Self::Big => BigEndian::read_i32(buf),
            Self::Little => LittleEndian::read_i32(buf),
        }
    }

    pub fn read_i64(
        self,
        buf: &[u8],
    ) -> i64 {
        match self {
            Self::Big => BigEndian::read_i64(buf),
            Self::Little => LittleEndian::read_i64(buf),
        }
    }

    pub fn read_f32(
        self,
        buf: &[u8],
    ) -> f32 {
        match self {
            Self::Big => BigEndian::read_f32(buf),
            Self::Little => LittleEndian::read_f32(buf),
        }
    }

    pub fn read_f64(
        self,
        buf: &[u8],
    ) -> f64 {
        match self {
            Self::Big => BigEndian::read_f64(buf),
            Self::Little => LittleEndian::read_f64(buf),
        }
    }
}

impl ContainerHeader {
    /// Разбирает и валидирует 8 байт заголовка.
    ///
    /// Порядок проверок: magic, версия, BOM, флаги. Неизвестная версия
    /// даёт [`DecodeError::UnsupportedVersion`], всё остальное —
    /// [`DecodeError::InvalidHeader`].
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        if &buf[0..4] != FILE_MAGIC {
            return Err(DecodeError::InvalidHeader {
                reason: format!("bad magic {:02X?}, expected {:02X?}", &buf[0..4], FILE_MAGIC),
            });
        }

        let version =
            FormatVersion::try_from(buf[4]).map_err(|_| DecodeError::UnsupportedVersion {
                found: buf[4],
                supported: FormatVersion::supported(),
            })?;

        let byte_order =
            ByteOrder::from_marker([buf[5], buf[6]]).ok_or_else(|| DecodeError::InvalidHeader {
                reason: format!("bad byte-order marker {:02X} {:02X}", buf[5], buf[6]),
            })?;

        let flags = buf[7];
        let compression =
            Compression::try_from(flags & 0x0F).map_err(|_| DecodeError::InvalidHeader {
                reason: format!("unknown compression flag {}", flags & 0x0F),
            })?;
        let integrity =
            Integrity::try_from(flags >> 4).map_err(|_| DecodeError::InvalidHeader {
                reason: format!("unknown integrity flag {}", flags >> 4),
            })?;

        Ok(Self {
            version,
            byte_order,
            compression,
            integrity,
        })
    }

    /// Байт флагов в том виде, в котором он записан в заголовке.
    pub fn flags(&self) -> u8 {
        ((self.integrity as u8) << 4) | self.compression as u8
    }

    /// Размер хвоста фрейма (CRC), если он есть.
    pub fn trailer_len(&self) -> usize {
        match self.integrity {
            Integrity::None => 0,
            Integrity::Crc32 => 4,
        }
    }
}

impl Compression {
    /// Имя кодека для сообщений об ошибках.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
