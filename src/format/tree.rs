//! Дерево записи: арена узлов, построенная за один проход по нагрузке
//! фрейма.
//!
//! Узлы хранятся в `Vec` и адресуются через [`NodeId`]; родитель всегда
//! создаётся раньше детей. Строки и массивы ссылаются на буфер записи.

use std::fmt;

use bytes::Bytes;
use hddm_error::{DecodeError, FieldError, HddmResult};

use super::{ArrayValue, ByteOrder, FormatVersion, RawRecord, Tag, Utf8Bytes, Value};

/// Максимальная глубина вложенности узлов (корень — глубина 1).
pub const MAX_DEPTH: usize = 64;

/// Заголовок узла: тег, длина имени, имя, длина тела.
const NODE_PREFIX_LEN: usize = 2;
const BODY_LEN_SIZE: usize = 4;

/// Индекс узла в арене.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Вид узла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Event,
    Leaf(Tag),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    name: Utf8Bytes,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    value: Option<Value>,
    depth: u16,
}

/// Разобранная запись.
#[derive(Debug, Clone)]
pub struct RecordTree {
    nodes: Vec<Node>,
    index: u64,
    offset: u64,
    byte_order: ByteOrder,
    version: FormatVersion,
}

/// Ссылка на узел внутри дерева.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a RecordTree,
    id: NodeId,
}

/// Открытая ветвь на стеке парсера.
struct OpenBranch {
    id: NodeId,
    end: usize,
    depth: usize,
    in_event: bool,
}

/// Разобранный заголовок узла.
struct NodeHeader {
    tag: Tag,
    name: Utf8Bytes,
    body_start: usize,
    body_end: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl NodeId {
    /// Корень дерева.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl NodeKind {
    pub fn is_event(self) -> bool {
        matches!(self, Self::Event)
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Container => Tag::Container.name(),
            Self::Event => Tag::Event.name(),
            Self::Leaf(tag) => tag.name(),
        }
    }
}

impl RecordTree {
    /// Разбирает нагрузку записи.
    ///
    /// Offset в ошибках абсолютные для несжатых записей и относительные
    /// (внутри распакованной нагрузки) для сжатых.
    pub fn parse(record: RawRecord) -> HddmResult<Self> {
        let base = record.offset + 4;
        let parsed = Parser::new(&record.payload, record.byte_order).run();
        let nodes = match parsed {
            Ok(nodes) => nodes,
            Err(e) if !record.inflated => return Err(e.rebase(base).into()),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            nodes,
            index: record.index,
            offset: record.offset,
            byte_order: record.byte_order,
            version: record.version,
        })
    }

    /// Корневой контейнер.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: NodeId::ROOT,
        }
    }

    pub fn node(
        &self,
        id: NodeId,
    ) -> Option<NodeRef<'_>> {
        (id.index() < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    /// Разрешает путь от корня (см. [`NodeRef::lookup`]).
    pub fn lookup(
        &self,
        path: &str,
    ) -> Result<NodeRef<'_>, FieldError> {
        self.root().lookup(path)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Порядковый номер записи в потоке.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Offset фрейма записи в потоке.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    fn get(
        &self,
        id: NodeId,
    ) -> &Node {
        &self.nodes[id.index()]
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a RecordTree {
        self.tree
    }

    pub fn kind(&self) -> NodeKind {
        self.tree.get(self.id).kind
    }

    pub fn name(&self) -> &'a str {
        self.tree.get(self.id).name.as_str()
    }

    /// Значение листа; у ветвей `None`.
    pub fn value(&self) -> Option<&'a Value> {
        self.tree.get(self.id).value.as_ref()
    }

    /// Глубина узла, у корня 1.
    pub fn depth(&self) -> usize {
        self.tree.get(self.id).depth as usize
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.tree.get(self.id).parent.map(|id| NodeRef {
            tree: self.tree,
            id,
        })
    }

    /// Дочерние узлы в порядке объявления.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        tree.get(self.id)
            .children
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    /// `nth`-й дочерний узел с именем `name`.
    pub fn child(
        &self,
        name: &str,
        nth: usize,
    ) -> Option<NodeRef<'a>> {
        self.children().filter(|c| c.name() == name).nth(nth)
    }

    /// Разрешает путь вида `a/b[1]/c` относительно узла.
    ///
    /// `name[i]` выбирает i-й дочерний узел с таким именем, `name` — первый.
    /// Пустой путь указывает на сам узел.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Result<NodeRef<'a>, FieldError> {
        let mut node = *self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (name, nth) = parse_segment(segment).ok_or_else(|| FieldError::not_present(path))?;
            node = node
                .child(name, nth)
                .ok_or_else(|| FieldError::not_present(path))?;
        }
        Ok(node)
    }

    /// Путь от корня, без имени корня.
    pub fn path(&self) -> String {
        let mut parts = Vec::new();
        let mut cur = *self;
        while let Some(parent) = cur.parent() {
            let nth = parent
                .children()
                .filter(|c| c.name() == cur.name())
                .position(|c| c.id == cur.id)
                .unwrap_or(0);
            if nth == 0 {
                parts.push(cur.name().to_string());
            } else {
                parts.push(format!("{}[{nth}]", cur.name()));
            }
            cur = parent;
        }
        parts.reverse();
        parts.join("/")
    }
}

/// `name` или `name[i]`.
fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    match segment.strip_suffix(']') {
        Some(rest) => {
            let (name, idx) = rest.split_once('[')?;
            Some((name, idx.parse().ok()?))
        }
        None => Some((segment, 0)),
    }
}

/// Однопроходный парсер с явным стеком открытых ветвей.
struct Parser<'a> {
    payload: &'a Bytes,
    order: ByteOrder,
    nodes: Vec<Node>,
}

impl<'a> Parser<'a> {
    fn new(
        payload: &'a Bytes,
        order: ByteOrder,
    ) -> Self {
        Self {
            payload,
            order,
            nodes: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Node>, DecodeError> {
        let total = self.payload.len();
        let root = self.read_header(0, total)?;
        if root.tag != Tag::Container {
            return Err(DecodeError::SchemaMismatch {
                reason: format!("record root must be a container, found {}", root.tag.name()),
                offset: Some(0),
            });
        }
        if root.body_end != total {
            return Err(DecodeError::CorruptLength {
                what: "record (trailing bytes after root)".to_string(),
                declared: root.body_end as u64,
                available: total as u64,
                offset: Some(root.body_end as u64),
            });
        }

        let root_id = self.push(NodeKind::Container, root.name, None, None, 1);
        let mut stack = vec![OpenBranch {
            id: root_id,
            end: root.body_end,
            depth: 1,
            in_event: false,
        }];
        let mut pos = root.body_start;

        while let Some(top) = stack.last() {
            if pos == top.end {
                stack.pop();
                continue;
            }
            let (parent, end, depth, in_event) = (top.id, top.end, top.depth + 1, top.in_event);

            let header = self.read_header(pos, end)?;
            if depth > MAX_DEPTH {
                return Err(DecodeError::SchemaMismatch {
                    reason: format!("nesting deeper than {MAX_DEPTH}"),
                    offset: Some(pos as u64),
                });
            }

            match header.tag {
                Tag::Container | Tag::Event => {
                    let is_event = header.tag == Tag::Event;
                    if is_event && in_event {
                        return Err(DecodeError::SchemaMismatch {
                            reason: format!("event '{}' nested inside an event", header.name.as_str()),
                            offset: Some(pos as u64),
                        });
                    }
                    let kind = if is_event {
                        NodeKind::Event
                    } else {
                        NodeKind::Container
                    };
                    let id = self.push(kind, header.name, Some(parent), None, depth);
                    stack.push(OpenBranch {
                        id,
                        end: header.body_end,
                        depth,
                        in_event: in_event || is_event,
                    });
                    pos = header.body_start;
                }
                tag => {
                    let value = self.leaf_value(tag, header.body_start, header.body_end, pos)?;
                    self.push(NodeKind::Leaf(tag), header.name, Some(parent), Some(value), depth);
                    pos = header.body_end;
                }
            }
        }

        Ok(self.nodes)
    }

    fn push(
        &mut self,
        kind: NodeKind,
        name: Utf8Bytes,
        parent: Option<NodeId>,
        value: Option<Value>,
        depth: usize,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            name,
            parent,
            children: Vec::new(),
            value,
            depth: depth as u16,
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    /// Читает заголовок узла в `[pos, end)`.
    fn read_header(
        &self,
        pos: usize,
        end: usize,
    ) -> Result<NodeHeader, DecodeError> {
        let buf = &self.payload[..end];
        let truncated = |need: usize| DecodeError::TruncatedStream {
            context: "node header".to_string(),
            offset: Some(pos as u64),
            expected: need as u64,
            got: (end - pos) as u64,
        };

        if end - pos < NODE_PREFIX_LEN {
            return Err(truncated(NODE_PREFIX_LEN));
        }
        let tag_byte = buf[pos];
        let name_len = buf[pos + 1] as usize;
        let header_len = NODE_PREFIX_LEN + name_len + BODY_LEN_SIZE;
        if end - pos < header_len {
            return Err(truncated(header_len));
        }

        let tag = Tag::try_from(tag_byte).map_err(|_| DecodeError::SchemaMismatch {
            reason: format!("unknown tag 0x{tag_byte:02X}"),
            offset: Some(pos as u64),
        })?;

        let name_start = pos + NODE_PREFIX_LEN;
        let name_end = name_start + name_len;
        let name = Utf8Bytes::try_from_bytes(self.payload.slice(name_start..name_end)).map_err(|e| {
            DecodeError::SchemaMismatch {
                reason: format!("node name is not valid UTF-8: {e}"),
                offset: Some(name_start as u64),
            }
        })?;

        let body_len = self.order.read_u32(&buf[name_end..name_end + BODY_LEN_SIZE]) as usize;
        let body_start = name_end + BODY_LEN_SIZE;
        let available = end - body_start;
        if body_len > available {
            return Err(DecodeError::CorruptLength {
                what: format!("node '{}' body", name.as_str()),
                declared: body_len as u64,
                available: available as u64,
                offset: Some(pos as u64),
            });
        }

        Ok(NodeHeader {
            tag,
            name,
            body_start,
            body_end: body_start + body_len,
        })
    }

    fn leaf_value(
        &self,
        tag: Tag,
        start: usize,
        end: usize,
        node_offset: usize,
    ) -> Result<Value, DecodeError> {
        let body = &self.payload[start..end];
        let bad_size = |expected: String| DecodeError::CorruptLength {
            what: format!("{} leaf ({expected})", tag.name()),
            declared: body.len() as u64,
            available: body.len() as u64,
            offset: Some(node_offset as u64),
        };

        if let Some(width) = tag.scalar_width() {
            if body.len() != width {
                return Err(bad_size(format!("expected {width} bytes")));
            }
        }
        if let Some(width) = tag.element_width() {
            if body.len() % width != 0 {
                return Err(bad_size(format!("not a multiple of {width}")));
            }
        }

        let order = self.order;
        Ok(match tag {
            Tag::Int32 => Value::Int32(order.read_i32(body)),
            Tag::Int64 => Value::Int64(order.read_i64(body)),
            Tag::UInt32 => Value::UInt32(order.read_u32(body)),
            Tag::UInt64 => Value::UInt64(order.read_u64(body)),
            Tag::Float32 => Value::Float32(order.read_f32(body)),
            Tag::Float64 => Value::Float64(order.read_f64(body)),
            Tag::Bool => Value::Bool(body[0] != 0),
            Tag::Str => {
                let s = Utf8Bytes::try_from_bytes(self.payload.slice(start..end)).map_err(|e| {
                    DecodeError::SchemaMismatch {
                        reason: format!("string leaf is not valid UTF-8: {e}"),
                        offset: Some(start as u64),
                    }
                })?;
                Value::Str(s)
            }
            Tag::Int32Array | Tag::Int64Array | Tag::Float32Array | Tag::Float64Array => {
                Value::Array(ArrayValue::new(tag, self.payload.slice(start..end), order))
            }
            Tag::Bytes => Value::Bytes(self.payload.slice(start..end)),
            Tag::Container | Tag::Event => {
                return Err(DecodeError::SchemaMismatch {
                    reason: format!("{} is not a leaf", tag.name()),
                    offset: Some(node_offset as u64),
                })
            }
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
