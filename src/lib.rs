//! Ленивое чтение HDDM-контейнеров из файла, HTTP(S) и XRootD.
//!
//! ```no_run
//! use hddm_stream::{open, StreamConfig};
//!
//! let stream = open("root://nod25.phys.uconn.edu//Gluex/simulation/sample.hddm", StreamConfig::default())?;
//! for record in stream {
//!     for event in record?.events() {
//!         println!("found run {}, event {}", event.run_number()?, event.event_number()?);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Параметры потока и загрузка настроек из окружения.
pub mod config;
/// Формат контейнера: заголовок, фреймы, дерево записи, события.
pub mod format;
/// Настройка `tracing-subscriber` для бинарников.
pub mod logging;
/// Итератор записей и повторное открытие.
pub mod stream;
/// Источники байт: файл, HTTP(S), XRootD, память.
pub mod transport;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use config::{CredentialProvider, Credentials, StreamConfig, StreamSettings};
pub use format::{
    ContainerHeader, Events, FrameDecoder, FrameLimits, NodeId, NodeKind, NodeRef, PhysicsEvent,
    RawRecord, RecordTree, Tag, Value,
};
pub use hddm_error::{HddmResult, StackError, StatusCode};
pub use stream::{open, open_with_retry, IStream, RetryPolicy, StreamCloser, StreamPosition, StreamState};
pub use transport::{
    AnySource, ByteSource, CancelToken, FileSource, HttpSource, MemorySource, ResourceLocator,
    Scheme, SourceKind, XrootdSource,
};
