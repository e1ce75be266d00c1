//! Извлечение событий из дерева записи.
//!
//! [`Events`] обходит дерево в глубину, дети в порядке объявления, и не
//! заходит внутрь найденных событий. Каждый вызов [`RecordTree::events`]
//! начинает обход заново.

use std::iter::FusedIterator;

use hddm_error::FieldError;
use serde_json::{json, Map, Value as Json};

use super::{NodeId, NodeKind, NodeRef, RecordTree, Value};

/// Имя листа с номером рана.
pub const RUN_NUMBER_FIELD: &str = "runNo";

/// Имя листа с номером события.
pub const EVENT_NUMBER_FIELD: &str = "eventNo";

/// Ленивый обход событий записи.
pub struct Events<'a> {
    tree: &'a RecordTree,
    stack: Vec<NodeId>,
}

/// Представление узла-события с доступом к полям.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsEvent<'a> {
    node: NodeRef<'a>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RecordTree {
    /// Новый обход событий с начала записи.
    pub fn events(&self) -> Events<'_> {
        Events {
            tree: self,
            stack: vec![NodeId::ROOT],
        }
    }

    /// Все события записи.
    pub fn physics_events(&self) -> Vec<PhysicsEvent<'_>> {
        self.events().collect()
    }
}

impl<'a> PhysicsEvent<'a> {
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn name(&self) -> &'a str {
        self.node.name()
    }

    /// Узел события в дереве.
    pub fn as_node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn run_number(&self) -> Result<i64, FieldError> {
        self.integer(RUN_NUMBER_FIELD)
    }

    pub fn event_number(&self) -> Result<i64, FieldError> {
        self.integer(EVENT_NUMBER_FIELD)
    }

    /// Узел по пути относительно события.
    pub fn node(
        &self,
        path: &str,
    ) -> Result<NodeRef<'a>, FieldError> {
        self.node.lookup(path)
    }

    /// Значение листа по пути.
    ///
    /// Путь на контейнер или событие даёт `FieldKindMismatch`.
    pub fn field(
        &self,
        path: &str,
    ) -> Result<&'a Value, FieldError> {
        let node = self.node(path)?;
        node.value().ok_or_else(|| FieldError::FieldKindMismatch {
            path: path.to_string(),
            expected: "leaf",
            found: node.kind().name().to_string(),
        })
    }

    /// Целочисленный лист по пути.
    pub fn integer(
        &self,
        path: &str,
    ) -> Result<i64, FieldError> {
        let value = self.field(path)?;
        value.as_i64().ok_or_else(|| FieldError::FieldKindMismatch {
            path: path.to_string(),
            expected: "integer",
            found: value.type_name().to_string(),
        })
    }

    /// Вещественный (или целый) лист по пути.
    pub fn float(
        &self,
        path: &str,
    ) -> Result<f64, FieldError> {
        let value = self.field(path)?;
        value.as_f64().ok_or_else(|| FieldError::FieldKindMismatch {
            path: path.to_string(),
            expected: "number",
            found: value.type_name().to_string(),
        })
    }

    /// Строковый лист по пути.
    pub fn string(
        &self,
        path: &str,
    ) -> Result<&'a str, FieldError> {
        let value = self.field(path)?;
        value.as_str().ok_or_else(|| FieldError::FieldKindMismatch {
            path: path.to_string(),
            expected: "string",
            found: value.type_name().to_string(),
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.node.children()
    }

    /// Событие как JSON-объект: имена узлов становятся ключами, повторные
    /// имена собираются в массив.
    pub fn to_json(&self) -> Json {
        node_to_json(self.node)
    }
}

fn node_to_json(node: NodeRef<'_>) -> Json {
    if let Some(value) = node.value() {
        return value_to_json(value);
    }
    let mut groups: Vec<(&str, Vec<Json>)> = Vec::new();
    for child in node.children() {
        let v = node_to_json(child);
        match groups.iter_mut().find(|(name, _)| *name == child.name()) {
            Some((_, items)) => items.push(v),
            None => groups.push((child.name(), vec![v])),
        }
    }

    let mut map = Map::new();
    for (name, mut items) in groups {
        let v = match items.len() {
            1 => items.remove(0),
            _ => Json::Array(items),
        };
        map.insert(name.to_string(), v);
    }
    Json::Object(map)
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int32(v) => json!(v),
        Value::Int64(v) => json!(v),
        Value::UInt32(v) => json!(v),
        Value::UInt64(v) => json!(v),
        Value::Float32(v) => json!(v),
        Value::Float64(v) => json!(v),
        Value::Bool(v) => json!(v),
        Value::Str(s) => json!(s.as_str()),
        Value::Array(a) => Json::Array(a.iter().map(|v| value_to_json(&v)).collect()),
        // Непрозрачные данные выводятся целиком, массивом байт.
        Value::Bytes(b) => json!(&b[..]),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<'a> Iterator for Events<'a> {
    type Item = PhysicsEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let node = self.tree.node(id)?;
            match node.kind() {
                NodeKind::Event => return Some(PhysicsEvent { node }),
                NodeKind::Container => self.stack.extend(node.children().rev().map(|c| c.id())),
                NodeKind::Leaf(_) => {}
            }
        }
        None
    }
}

impl FusedIterator for Events<'_> {}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
