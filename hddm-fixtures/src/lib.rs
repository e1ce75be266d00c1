//! Сборка HDDM-контейнеров вручную для тестов, бенчмарков и демо.
//!
//! Крейт не зависит от `hddm-stream`: байты формируются напрямую по
//! описанию формата, поэтому фикстуры проверяют декодер, а не сами себя.
//!
//! ```ignore
//! use hddm_fixtures::{ContainerBuilder, Node};
//!
//! let bytes = ContainerBuilder::new()
//!     .record(Node::container("HDDM", vec![Node::event(1, 19, vec![])]))
//!     .build();
//! ```

use std::io::Write;

use flate2::{write::ZlibEncoder, Compression as ZlibLevel};

pub const TAG_CONTAINER: u8 = 0x01;
pub const TAG_EVENT: u8 = 0x02;
pub const TAG_INT32: u8 = 0x10;
pub const TAG_INT64: u8 = 0x11;
pub const TAG_UINT32: u8 = 0x12;
pub const TAG_UINT64: u8 = 0x13;
pub const TAG_FLOAT32: u8 = 0x14;
pub const TAG_FLOAT64: u8 = 0x15;
pub const TAG_BOOL: u8 = 0x16;
pub const TAG_STRING: u8 = 0x17;
pub const TAG_INT32_ARRAY: u8 = 0x20;
pub const TAG_INT64_ARRAY: u8 = 0x21;
pub const TAG_FLOAT32_ARRAY: u8 = 0x22;
pub const TAG_FLOAT64_ARRAY: u8 = 0x23;
pub const TAG_BYTES: u8 = 0x24;

/// Маркер конца потока.
pub const END_OF_STREAM: u32 = 0xFFFF_FFFF;

/// Порядок байт фикстуры.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Сжатие фреймов фикстуры.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    None,
    Zlib,
    Zstd,
}

/// Тело узла: либо дочерние узлы, либо готовые байты.
#[derive(Debug, Clone, PartialEq)]
enum Body {
    Children(Vec<Node>),
    Scalar(Scalar),
    Raw(Vec<u8>),
}

/// Скаляры кодируются при сборке, когда известен порядок байт.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(u32),
    U64(u64),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Узел дерева записи.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: u8,
    name: Vec<u8>,
    body: Body,
}

/// Сборщик контейнера.
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    endian: Endian,
    codec: Codec,
    crc: bool,
    version: Option<u8>,
    flags: Option<u8>,
    payloads: Vec<Vec<u8>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Node {
    pub fn container(
        name: &str,
        children: Vec<Node>,
    ) -> Self {
        Self::branch(TAG_CONTAINER, name, children)
    }

    /// Событие с листьями `runNo` (int32) и `eventNo` (int64) в начале.
    pub fn event(
        run: i32,
        event: i64,
        extra: Vec<Node>,
    ) -> Self {
        let mut children = vec![Self::i32("runNo", run), Self::i64("eventNo", event)];
        children.extend(extra);
        Self::branch(TAG_EVENT, "physicsEvent", children)
    }

    /// Ветвь с произвольным тегом (в том числе неверным).
    pub fn branch(
        tag: u8,
        name: &str,
        children: Vec<Node>,
    ) -> Self {
        Self {
            tag,
            name: name.as_bytes().to_vec(),
            body: Body::Children(children),
        }
    }

    /// Узел с произвольным тегом, именем и телом.
    pub fn raw(
        tag: u8,
        name: &[u8],
        body: Vec<u8>,
    ) -> Self {
        Self {
            tag,
            name: name.to_vec(),
            body: Body::Raw(body),
        }
    }

    fn scalar(
        tag: u8,
        name: &str,
        scalar: Scalar,
    ) -> Self {
        Self {
            tag,
            name: name.as_bytes().to_vec(),
            body: Body::Scalar(scalar),
        }
    }

    pub fn i32(
        name: &str,
        v: i32,
    ) -> Self {
        Self::scalar(TAG_INT32, name, Scalar::I32(vec![v]))
    }

    pub fn i64(
        name: &str,
        v: i64,
    ) -> Self {
        Self::scalar(TAG_INT64, name, Scalar::I64(vec![v]))
    }

    pub fn u32(
        name: &str,
        v: u32,
    ) -> Self {
        Self::scalar(TAG_UINT32, name, Scalar::U32(v))
    }

    pub fn u64(
        name: &str,
        v: u64,
    ) -> Self {
        Self::scalar(TAG_UINT64, name, Scalar::U64(v))
    }

    pub fn f32(
        name: &str,
        v: f32,
    ) -> Self {
        Self::scalar(TAG_FLOAT32, name, Scalar::F32(vec![v]))
    }

    pub fn f64(
        name: &str,
        v: f64,
    ) -> Self {
        Self::scalar(TAG_FLOAT64, name, Scalar::F64(vec![v]))
    }

    pub fn bool(
        name: &str,
        v: bool,
    ) -> Self {
        Self::raw(TAG_BOOL, name.as_bytes(), vec![v as u8])
    }

    pub fn str(
        name: &str,
        v: &str,
    ) -> Self {
        Self::raw(TAG_STRING, name.as_bytes(), v.as_bytes().to_vec())
    }

    pub fn bytes(
        name: &str,
        v: &[u8],
    ) -> Self {
        Self::raw(TAG_BYTES, name.as_bytes(), v.to_vec())
    }

    pub fn i32_array(
        name: &str,
        v: &[i32],
    ) -> Self {
        Self::scalar(TAG_INT32_ARRAY, name, Scalar::I32(v.to_vec()))
    }

    pub fn i64_array(
        name: &str,
        v: &[i64],
    ) -> Self {
        Self::scalar(TAG_INT64_ARRAY, name, Scalar::I64(v.to_vec()))
    }

    pub fn f32_array(
        name: &str,
        v: &[f32],
    ) -> Self {
        Self::scalar(TAG_FLOAT32_ARRAY, name, Scalar::F32(v.to_vec()))
    }

    pub fn f64_array(
        name: &str,
        v: &[f64],
    ) -> Self {
        Self::scalar(TAG_FLOAT64_ARRAY, name, Scalar::F64(v.to_vec()))
    }

    /// Событие, похожее на реальные данные: два трека с импульсами и
    /// вершина реакции.
    pub fn physics_event(
        run: i32,
        event: i64,
    ) -> Self {
        let track = |charge: i32, px: f64| {
            Self::container(
                "track",
                vec![
                    Self::i32("charge", charge),
                    Self::f64_array("momentum", &[px, 0.25 * px, 4.5]),
                ],
            )
        };
        Self::event(
            run,
            event,
            vec![Self::container(
                "reaction",
                vec![
                    Self::str("type", "gp->pi+pi-p"),
                    Self::f32("weight", 1.0),
                    Self::container("vertex", vec![Self::f64_array("origin", &[0.0, 0.0, 65.0])]),
                    track(1, 0.5 + event as f64 * 0.01),
                    track(-1, -0.75),
                ],
            )],
        )
    }

    /// Сериализует узел в заданном порядке байт.
    pub fn encode(
        &self,
        endian: Endian,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(endian, &mut out);
        out
    }

    fn encode_into(
        &self,
        endian: Endian,
        out: &mut Vec<u8>,
    ) {
        let body = match &self.body {
            Body::Children(children) => {
                let mut buf = Vec::new();
                for child in children {
                    child.encode_into(endian, &mut buf);
                }
                buf
            }
            Body::Scalar(s) => s.encode(endian),
            Body::Raw(raw) => raw.clone(),
        };
        out.push(self.tag);
        out.push(self.name.len() as u8);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&u32_bytes(body.len() as u32, endian));
        out.extend_from_slice(&body);
    }
}

impl Scalar {
    fn encode(
        &self,
        endian: Endian,
    ) -> Vec<u8> {
        macro_rules! pack {
            ($items:expr) => {
                $items
                    .iter()
                    .flat_map(|v| match endian {
                        Endian::Big => v.to_be_bytes().to_vec(),
                        Endian::Little => v.to_le_bytes().to_vec(),
                    })
                    .collect()
            };
        }
        match self {
            Self::I32(v) => pack!(v),
            Self::I64(v) => pack!(v),
            Self::U32(v) => pack!([*v]),
            Self::U64(v) => pack!([*v]),
            Self::F32(v) => pack!(v),
            Self::F64(v) => pack!(v),
        }
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn little_endian(mut self) -> Self {
        self.endian = Endian::Little;
        self
    }

    pub fn endian(
        mut self,
        endian: Endian,
    ) -> Self {
        self.endian = endian;
        self
    }

    pub fn compression(
        mut self,
        codec: Codec,
    ) -> Self {
        self.codec = codec;
        self
    }

    pub fn crc32(mut self) -> Self {
        self.crc = true;
        self
    }

    /// Подменяет байт версии в заголовке.
    pub fn version(
        mut self,
        version: u8,
    ) -> Self {
        self.version = Some(version);
        self
    }

    /// Подменяет байт флагов в заголовке.
    pub fn flags(
        mut self,
        flags: u8,
    ) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Добавляет запись из дерева.
    pub fn record(
        self,
        root: Node,
    ) -> Self {
        let payload = root.encode(self.endian);
        self.raw_frame(payload)
    }

    /// Добавляет запись с произвольной нагрузкой (до сжатия).
    pub fn raw_frame(
        mut self,
        payload: Vec<u8>,
    ) -> Self {
        self.payloads.push(payload);
        self
    }

    /// Только 8 байт заголовка.
    pub fn header_only(&self) -> Vec<u8> {
        let codec = match self.codec {
            Codec::None => 0,
            Codec::Zlib => 1,
            Codec::Zstd => 2,
        };
        let flags = self
            .flags
            .unwrap_or(codec | if self.crc { 0x10 } else { 0 });
        let bom = match self.endian {
            Endian::Big => [0xFE, 0xFF],
            Endian::Little => [0xFF, 0xFE],
        };
        let mut out = b"HDDM".to_vec();
        out.push(self.version.unwrap_or(1));
        out.extend_from_slice(&bom);
        out.push(flags);
        out
    }

    /// Контейнер целиком, с маркером конца потока.
    pub fn build(&self) -> Vec<u8> {
        let mut out = self.build_unterminated();
        out.extend_from_slice(&u32_bytes(END_OF_STREAM, self.endian));
        out
    }

    /// Контейнер без маркера конца потока.
    pub fn build_unterminated(&self) -> Vec<u8> {
        let mut out = self.header_only();
        for payload in &self.payloads {
            let stored = self.compress(payload);
            out.extend_from_slice(&u32_bytes(stored.len() as u32, self.endian));
            out.extend_from_slice(&stored);
            if self.crc {
                out.extend_from_slice(&u32_bytes(crc32fast::hash(&stored), self.endian));
            }
        }
        out
    }

    fn compress(
        &self,
        payload: &[u8],
    ) -> Vec<u8> {
        match self.codec {
            Codec::None => payload.to_vec(),
            Codec::Zlib => {
                let mut enc = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
                // Запись в Vec не может завершиться ошибкой.
                let _ = enc.write_all(payload);
                enc.finish().unwrap_or_default()
            }
            Codec::Zstd => zstd::stream::encode_all(payload, 3).unwrap_or_default(),
        }
    }

    /// Offset начала каждого фрейма в собранном контейнере.
    pub fn frame_offsets(&self) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(self.payloads.len());
        let mut at = 8u64;
        let trailer = if self.crc { 4 } else { 0 };
        for payload in &self.payloads {
            offsets.push(at);
            at += 4 + self.compress(payload).len() as u64 + trailer;
        }
        offsets
    }
}

/// Контейнер из `records` записей по `per_record` событий, с номерами
/// событий подряд начиная с 1.
pub fn sample_run(
    run: i32,
    records: usize,
    per_record: usize,
) -> ContainerBuilder {
    let mut builder = ContainerBuilder::new();
    let mut event = 0i64;
    for _ in 0..records {
        let events = (0..per_record)
            .map(|_| {
                event += 1;
                Node::physics_event(run, event)
            })
            .collect();
        builder = builder.record(Node::container("HDDM", events));
    }
    builder
}

fn u32_bytes(
    v: u32,
    endian: Endian,
) -> [u8; 4] {
    match endian {
        Endian::Big => v.to_be_bytes(),
        Endian::Little => v.to_le_bytes(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
