//! Декодирование контейнера HDDM.
//!
//! ## Формат
//!
//! ```text
//! +--------+---------+-----+-------+
//! | "HDDM" | version | BOM | flags |   заголовок, 8 байт
//! +--------+---------+-----+-------+
//! | len: u32 | payload | [crc32: u32] |   фрейм, повторяется
//! +----------+---------+--------------+
//! | 0xFFFF_FFFF |                         маркер конца потока
//! +-------------+
//! ```
//!
//! Порядок байт всех многобайтовых целых после заголовка определяется
//! маркером BOM.
//!
//! ## Модули
//!
//! - [`header`] — заголовок контейнера и флаги
//! - [`frame`] — чтение фреймов из [`ByteSource`](crate::transport::ByteSource)
//! - [`compression`] — распаковка полезной нагрузки фрейма
//! - [`tags`] — теги узлов дерева записи
//! - [`value`] — типизированные значения листьев
//! - [`tree`] — дерево записи в арене
//! - [`event`] — обход событий и доступ к полям

pub mod compression;
pub mod event;
pub mod frame;
pub mod header;
pub mod tags;
pub mod tree;
pub mod value;

pub use compression::*;
pub use event::*;
pub use frame::*;
pub use header::*;
pub use tags::*;
pub use tree::*;
pub use value::*;
