//! Теги узлов дерева записи (версия формата 1).
//!
//! Каждый узел помечается однобайтовым тегом. Таблица закрыта: любой
//! другой байт на месте тега означает несовпадение схемы.

use num_enum::TryFromPrimitive;

/// Тег узла дерева записи.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Tag {
    /// Контейнер: тело состоит из дочерних узлов
    Container = 0x01,
    /// Событие: тело состоит из дочерних узлов
    Event = 0x02,
    Int32 = 0x10,
    Int64 = 0x11,
    UInt32 = 0x12,
    UInt64 = 0x13,
    Float32 = 0x14,
    Float64 = 0x15,
    /// Логическое значение, 1 байт
    Bool = 0x16,
    /// Строка UTF-8
    Str = 0x17,
    Int32Array = 0x20,
    Int64Array = 0x21,
    Float32Array = 0x22,
    Float64Array = 0x23,
    /// Непрозрачные байты
    Bytes = 0x24,
}

impl Tag {
    /// Узел с дочерними узлами (контейнер или событие).
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Container | Self::Event)
    }

    /// Размер тела для скалярных листьев.
    pub fn scalar_width(self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            _ => None,
        }
    }

    /// Размер элемента для массивов.
    pub fn element_width(self) -> Option<usize> {
        match self {
            Self::Int32Array | Self::Float32Array => Some(4),
            Self::Int64Array | Self::Float64Array => Some(8),
            _ => None,
        }
    }

    /// Человекочитаемое имя типа.
    pub fn name(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Event => "event",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Str => "string",
            Self::Int32Array => "int32[]",
            Self::Int64Array => "int64[]",
            Self::Float32Array => "float32[]",
            Self::Float64Array => "float64[]",
            Self::Bytes => "bytes",
        }
    }
}
