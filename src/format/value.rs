use std::{fmt, str::Utf8Error};

use bytes::Bytes;

use super::{ByteOrder, Tag};

/// Строка UTF-8, ссылающаяся на буфер записи без копирования.
///
/// Валидность UTF-8 проверяется один раз при создании.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Utf8Bytes(Bytes);

/// Массив фиксированной ширины поверх буфера записи.
///
/// Элементы декодируются по запросу в порядке байт контейнера.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    tag: Tag,
    data: Bytes,
    order: ByteOrder,
}

/// Типизированное значение листа.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Str(Utf8Bytes),
    Array(ArrayValue),
    Bytes(Bytes),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Utf8Bytes {
    /// Проверяет UTF-8 и оборачивает буфер.
    pub fn try_from_bytes(bytes: Bytes) -> Result<Self, Utf8Error> {
        std::str::from_utf8(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl ArrayValue {
    /// `tag` должен быть одним из тегов массивов, а длина `data` кратна
    /// ширине элемента; это проверяет парсер дерева.
    pub(crate) fn new(
        tag: Tag,
        data: Bytes,
        order: ByteOrder,
    ) -> Self {
        Self { tag, data, order }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    fn width(&self) -> usize {
        self.tag.element_width().unwrap_or(1)
    }

    /// Кол-во элементов.
    pub fn len(&self) -> usize {
        self.data.len() / self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Возвращает i-й элемент как скалярное значение.
    pub fn get(
        &self,
        index: usize,
    ) -> Option<Value> {
        let width = self.width();
        let start = index.checked_mul(width)?;
        let end = start.checked_add(width)?;
        let chunk = self.data.get(start..end)?;
        Some(match self.tag {
            Tag::Int32Array => Value::Int32(self.order.read_i32(chunk)),
            Tag::Int64Array => Value::Int64(self.order.read_i64(chunk)),
            Tag::Float32Array => Value::Float32(self.order.read_f32(chunk)),
            Tag::Float64Array => Value::Float64(self.order.read_f64(chunk)),
            _ => return None,
        })
    }

    /// Итератор по элементам.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Элементы как `f64` (целые конвертируются).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.iter().filter_map(|v| v.as_f64()).collect()
    }

    /// Сырые байты массива.
    pub fn raw(&self) -> &Bytes {
        &self.data
    }
}

impl Value {
    /// Имя типа значения для сообщений об ошибках.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int32(_) => Tag::Int32.name(),
            Self::Int64(_) => Tag::Int64.name(),
            Self::UInt32(_) => Tag::UInt32.name(),
            Self::UInt64(_) => Tag::UInt64.name(),
            Self::Float32(_) => Tag::Float32.name(),
            Self::Float64(_) => Tag::Float64.name(),
            Self::Bool(_) => Tag::Bool.name(),
            Self::Str(_) => Tag::Str.name(),
            Self::Array(a) => a.tag().name(),
            Self::Bytes(_) => Tag::Bytes.name(),
        }
    }

    /// Целое значение, если лист целочисленный и влезает в `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int32(v) => Some(v as i64),
            Self::Int64(v) => Some(v),
            Self::UInt32(v) => Some(v as i64),
            Self::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(v as f64),
            Self::Float64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for Utf8Bytes {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Utf8Bytes {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Array(a) => {
                f.write_str("[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет декодирование элементов массива в little-endian.
    #[test]
    fn test_array_little_endian() {
        let mut raw = Vec::new();
        for v in [1i32, -2, 300] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let arr = ArrayValue::new(Tag::Int32Array, Bytes::from(raw), ByteOrder::Little);

        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(1), Some(Value::Int32(-2)));
        assert_eq!(arr.get(3), None);
        assert_eq!(arr.to_f64_vec(), vec![1.0, -2.0, 300.0]);
    }

    /// Тест проверяет целочисленные аксессоры и границу `u64 -> i64`.
    #[test]
    fn test_as_i64() {
        assert_eq!(Value::UInt32(19).as_i64(), Some(19));
        assert_eq!(Value::Int64(-5).as_i64(), Some(-5));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::Float64(1.5).as_i64(), None);
        assert_eq!(Value::Float64(1.5).as_f64(), Some(1.5));
    }

    /// Тест проверяет, что невалидный UTF-8 отклоняется.
    #[test]
    fn test_utf8_bytes() {
        let ok = Utf8Bytes::try_from_bytes(Bytes::from_static(b"runNo")).unwrap();
        assert_eq!(ok.as_str(), "runNo");
        assert!(Utf8Bytes::try_from_bytes(Bytes::from_static(&[0xC3, 0x28])).is_err());
    }

    #[test]
    fn test_display() {
        let s = Value::Str(Utf8Bytes::try_from_bytes(Bytes::from_static(b"x")).unwrap());
        assert_eq!(s.to_string(), "\"x\"");
        assert_eq!(Value::Bytes(Bytes::from_static(&[1, 2])).to_string(), "<2 bytes>");
        assert_eq!(s.type_name(), "string");
    }
}
