//! Итератор записей поверх любого транспорта.
//!
//! [`IStream`] связывает выбор транспорта, декодер фреймов и парсер дерева
//! в явный автомат состояний:
//!
//! ```text
//! Created → Connecting → Streaming → Exhausted
//!                                  ↘ Failed
//!                     (любое) → Closed
//! ```
//!
//! Ошибка транспорта или декодирования возвращается один раз, после чего
//! итератор пуст. Источник освобождается ровно один раз: при исчерпании,
//! ошибке, отмене, `close` или `drop`.

pub mod retry;

use std::{fmt, iter::FusedIterator};

use hddm_error::{bail, HddmResult, LogLevel, ResultExt, StackError, StatusCode, TransportError};
use tracing::{debug, error, info, trace, warn};

pub use retry::{open_with_retry, RetryPolicy};

use crate::{
    config::StreamConfig,
    format::{ContainerHeader, FrameDecoder, RecordTree, HEADER_LEN},
    transport::{resolve, AnySource, ByteSource, CancelToken, ResourceLocator},
};

/// Функция, открывающая источник для локатора.
pub type Connector<S> = fn(&ResourceLocator, &StreamConfig, CancelToken) -> HddmResult<S>;

/// Состояние потока.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Создан, транспорт ещё не открыт
    Created,
    /// Идёт открытие транспорта и чтение заголовка
    Connecting,
    /// Можно читать записи
    Streaming,
    /// Встречен маркер конца потока
    Exhausted,
    /// Ошибка транспорта или декодирования уже отдана вызывающему
    Failed,
    /// Поток закрыт явно или отменён
    Closed,
}

/// Граница фрейма, на которую можно вернуться через
/// [`IStream::set_position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamPosition {
    /// Offset префикса длины следующего фрейма
    pub offset: u64,
    /// Порядковый номер следующего фрейма
    pub record: u64,
}

/// Хэндл отмены, который можно передать в другой поток.
#[derive(Debug, Clone)]
pub struct StreamCloser {
    token: CancelToken,
}

/// Ленивый поток записей.
pub struct IStream<S: ByteSource = AnySource> {
    locator: Option<ResourceLocator>,
    config: StreamConfig,
    connector: Option<Connector<S>>,
    state: StreamState,
    decoder: Option<FrameDecoder<S>>,
    header: Option<ContainerHeader>,
    token: CancelToken,
    records_read: u64,
    bytes_read: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StreamState {
    /// Итератор больше ничего не вернёт.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed | Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl StreamCloser {
    /// Запрашивает отмену. Блокирующее чтение прерывается, текущий или
    /// следующий вызов потока вернёт `Cancelled`. Возвращает `true` только
    /// для первого вызова.
    pub fn close(&self) -> bool {
        self.token.cancel()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl IStream<AnySource> {
    /// Создаёт поток в состоянии `Created`; транспорт выбирается по схеме
    /// локатора при [`connect`](IStream::connect).
    pub fn new(
        locator: ResourceLocator,
        config: StreamConfig,
    ) -> Self {
        Self::with_connector(locator, config, resolve)
    }

    /// Разбирает локатор, открывает транспорт и читает заголовок.
    pub fn open(
        locator: &str,
        config: StreamConfig,
    ) -> HddmResult<Self> {
        let locator = ResourceLocator::parse(locator)?;
        let mut stream = Self::new(locator, config);
        stream.connect()?;
        Ok(stream)
    }
}

impl<S: ByteSource> IStream<S> {
    /// Поток с собственной функцией открытия источника.
    pub fn with_connector(
        locator: ResourceLocator,
        config: StreamConfig,
        connector: Connector<S>,
    ) -> Self {
        Self {
            locator: Some(locator),
            config,
            connector: Some(connector),
            state: StreamState::Created,
            decoder: None,
            header: None,
            token: CancelToken::new(),
            records_read: 0,
            bytes_read: 0,
        }
    }

    /// Поток поверх уже открытого источника. Заголовок читается сразу.
    pub fn from_source(
        mut source: S,
        config: StreamConfig,
    ) -> HddmResult<Self> {
        if let Err(e) = config.validate() {
            let _ = source.close();
            return Err(e);
        }
        let mut stream = Self {
            locator: None,
            config,
            connector: None,
            state: StreamState::Connecting,
            decoder: None,
            header: None,
            token: CancelToken::new(),
            records_read: 0,
            bytes_read: 0,
        };
        match FrameDecoder::open(source, stream.config.frame_limits()) {
            Ok(decoder) => {
                stream.start(decoder);
                Ok(stream)
            }
            Err(e) => Err(stream.fail(e)),
        }
    }

    /// `Created → Connecting → Streaming`.
    ///
    /// В любом другом состоянии, кроме `Streaming`, возвращает ошибку.
    pub fn connect(&mut self) -> HddmResult<()> {
        match self.state {
            StreamState::Created => {}
            StreamState::Streaming => return Ok(()),
            state => bail!(
                StatusCode::Unsupported,
                "cannot connect a stream in state {}",
                state.as_str()
            ),
        }
        if self.token.is_cancelled() {
            self.state = StreamState::Closed;
            return Err(TransportError::cancelled("connect").into());
        }

        self.state = StreamState::Connecting;
        let opened = self.open_decoder();
        match opened {
            Ok(decoder) => {
                self.start(decoder);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn open_decoder(&self) -> HddmResult<FrameDecoder<S>> {
        self.config.validate()?;
        let (Some(locator), Some(connector)) = (self.locator.as_ref(), self.connector) else {
            bail!(StatusCode::Internal, "stream has no locator");
        };
        debug!(locator = %locator, "Opening stream");

        let source = connector(locator, &self.config, self.token.clone())
            .with_context(|| format!("opening {locator}"))?;
        FrameDecoder::open(source, self.config.frame_limits())
            .with_context(|| format!("reading container header of {locator}"))
    }

    fn start(
        &mut self,
        decoder: FrameDecoder<S>,
    ) {
        self.header = Some(*decoder.header());
        self.bytes_read = decoder.offset();
        self.decoder = Some(decoder);
        self.state = StreamState::Streaming;
        debug!(kind = self.source_kind(), "Stream is streaming");
    }

    fn source_kind(&self) -> &'static str {
        self.decoder
            .as_ref()
            .map(|d| d.source().kind().as_str())
            .unwrap_or("none")
    }

    /// Хэндл отмены для другого потока.
    pub fn closer(&self) -> StreamCloser {
        StreamCloser {
            token: self.token.clone(),
        }
    }

    /// Закрывает поток из любого состояния. Источник освобождается ровно
    /// один раз; повторные вызовы возвращают `Ok(())`.
    pub fn close(&mut self) -> HddmResult<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }
        self.state = StreamState::Closed;
        self.release()
    }

    /// Пропускает до `n` записей без разбора. Возвращает, сколько
    /// пропущено; меньше `n` — поток исчерпан.
    pub fn skip_records(
        &mut self,
        n: u64,
    ) -> HddmResult<u64> {
        if let Some(err) = self.check_cancelled() {
            return Err(err);
        }
        if self.state == StreamState::Created {
            self.connect()?;
        }
        if self.state != StreamState::Streaming {
            return Ok(0);
        }

        let mut skipped = 0;
        while skipped < n {
            let Some(decoder) = self.decoder.as_mut() else {
                break;
            };
            match decoder.skip_record() {
                Ok(true) => {
                    skipped += 1;
                    self.bytes_read = decoder.offset();
                }
                Ok(false) => {
                    self.exhaust();
                    break;
                }
                Err(e) => {
                    let index = decoder.index();
                    return Err(self.fail(e.context(format!("skipping record {index}"))));
                }
            }
        }
        Ok(skipped)
    }

    /// Граница следующего фрейма; `None`, если источник уже освобождён.
    pub fn position(&self) -> Option<StreamPosition> {
        self.decoder.as_ref().map(|d| StreamPosition {
            offset: d.offset(),
            record: d.index(),
        })
    }

    /// Возвращается на сохранённую границу фрейма.
    ///
    /// Требует состояния `Streaming` и источника с поддержкой seek; иначе
    /// `Unsupported`.
    pub fn set_position(
        &mut self,
        position: StreamPosition,
    ) -> HddmResult<()> {
        let state = self.state;
        let Some(decoder) = self.decoder.as_mut().filter(|_| state == StreamState::Streaming) else {
            bail!(StatusCode::Unsupported, "set_position in state {}", state.as_str());
        };
        if !decoder.source().is_seekable() {
            return Err(TransportError::Unsupported {
                operation: "set_position",
                scheme: decoder.source().kind().as_str(),
            }
            .into());
        }
        if position.offset < HEADER_LEN as u64 {
            bail!(
                StatusCode::InvalidArgs,
                "offset {} is inside the container header",
                position.offset
            );
        }

        match decoder.reposition(position.offset, position.record) {
            Ok(()) => {
                debug!(offset = position.offset, record = position.record, "Repositioned");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Сколько записей отдано вызывающему.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Сколько байт потока пройдено, включая заголовок.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Заголовок контейнера; доступен и после освобождения источника.
    pub fn header(&self) -> Option<&ContainerHeader> {
        self.header.as_ref()
    }

    pub fn locator(&self) -> Option<&ResourceLocator> {
        self.locator.as_ref()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn read_next(&mut self) -> Option<HddmResult<RecordTree>> {
        let decoder = self.decoder.as_mut()?;
        let index = decoder.index();
        match decoder.next_record() {
            Ok(Some(record)) => {
                self.bytes_read = decoder.offset();
                match RecordTree::parse(record) {
                    Ok(tree) => {
                        self.records_read += 1;
                        Some(Ok(tree))
                    }
                    Err(e) => Some(Err(self.fail(e.context(format!("parsing record {index}"))))),
                }
            }
            Ok(None) => {
                self.bytes_read = decoder.offset();
                self.exhaust();
                None
            }
            Err(e) => Some(Err(self.fail(e.context(format!("reading record {index}"))))),
        }
    }

    fn exhaust(&mut self) {
        self.state = StreamState::Exhausted;
        info!(records = self.records_read, bytes = self.bytes_read, "Stream exhausted");
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to close source after end of stream");
        }
    }

    /// Переводит поток в `Failed` (или `Closed` при отмене) и освобождает
    /// источник.
    fn fail(
        &mut self,
        err: StackError,
    ) -> StackError {
        let _ = self.release();
        let err = if self.token.is_cancelled() {
            self.state = StreamState::Closed;
            if err.is(StatusCode::Cancelled) {
                err
            } else {
                TransportError::cancelled("read").into()
            }
        } else {
            self.state = StreamState::Failed;
            err
        };
        report(&err, self.state);
        err
    }

    /// Отмена, запрошенная через [`StreamCloser`], пока поток жив.
    fn check_cancelled(&mut self) -> Option<StackError> {
        if !self.token.is_cancelled() || self.state == StreamState::Closed {
            return None;
        }
        let was = self.state;
        let _ = self.release();
        self.state = StreamState::Closed;
        debug!(state = was.as_str(), "Stream closed by cancellation");
        match was {
            StreamState::Exhausted | StreamState::Failed => None,
            _ => Some(TransportError::cancelled("next").into()),
        }
    }

    fn release(&mut self) -> HddmResult<()> {
        let Some(decoder) = self.decoder.take() else {
            return Ok(());
        };
        self.bytes_read = decoder.offset();
        let mut source = decoder.into_source();
        debug!(kind = source.kind().as_str(), "Releasing source");
        source.close()
    }
}

/// Пишет ошибку в лог на уровне, который задаёт её код, с тегами ошибки.
fn report(
    err: &StackError,
    state: StreamState,
) {
    let tags = err.metrics_tags();
    match err.log_level() {
        LogLevel::Trace => trace!(error = %err, %state, ?tags, "Stream stopped"),
        LogLevel::Debug => debug!(error = %err, %state, ?tags, "Stream stopped"),
        LogLevel::Info => info!(error = %err, %state, ?tags, "Stream stopped"),
        LogLevel::Warn => warn!(error = %err, %state, ?tags, "Stream stopped"),
        LogLevel::Error => error!(error = %err, %state, ?tags, "Stream stopped"),
    }
}

/// Открывает поток по строке локатора.
pub fn open(
    locator: &str,
    config: StreamConfig,
) -> HddmResult<IStream> {
    IStream::open(locator, config)
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<S: ByteSource> Iterator for IStream<S> {
    type Item = HddmResult<RecordTree>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.check_cancelled() {
            return Some(Err(err));
        }
        match self.state {
            StreamState::Created => {
                if let Err(e) = self.connect() {
                    return Some(Err(e));
                }
            }
            StreamState::Streaming => {}
            _ => return None,
        }
        self.read_next()
    }
}

impl<S: ByteSource> FusedIterator for IStream<S> {}

impl<S: ByteSource> Drop for IStream<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            debug!(error = %e, "Failed to close source on drop");
        }
    }
}

impl<S: ByteSource> fmt::Debug for IStream<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("IStream")
            .field("locator", &self.locator.as_ref().map(|l| l.as_str()))
            .field("state", &self.state)
            .field("records_read", &self.records_read)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

impl fmt::Display for StreamState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use hddm_fixtures::{sample_run, ContainerBuilder};

    use super::*;
    use crate::transport::{MemorySource, SourceKind};

    /// Источник, считающий вызовы `close` и умеющий «зависать» на чтении
    /// до отмены.
    #[derive(Debug)]
    struct ProbeSource {
        inner: MemorySource,
        closes: Arc<AtomicUsize>,
        stall_at: Option<u64>,
        cancel: CancelToken,
    }

    impl ProbeSource {
        fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let src = Self {
                inner: MemorySource::new(bytes),
                closes: closes.clone(),
                stall_at: None,
                cancel: CancelToken::new(),
            };
            (src, closes)
        }
    }

    impl ByteSource for ProbeSource {
        fn read_into(
            &mut self,
            buf: &mut [u8],
        ) -> HddmResult<usize> {
            if self.stall_at.is_some_and(|at| self.inner.position() >= at) {
                while !self.cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                return Err(TransportError::cancelled("read").into());
            }
            self.inner.read_into(buf)
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn seek(
            &mut self,
            offset: u64,
        ) -> HddmResult<()> {
            self.inner.seek(offset)
        }

        fn is_seekable(&self) -> bool {
            true
        }

        fn close(&mut self) -> HddmResult<()> {
            if !self.inner.is_closed() {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Memory
        }
    }

    fn memory_stream(bytes: Vec<u8>) -> IStream<MemorySource> {
        IStream::from_source(MemorySource::new(bytes), StreamConfig::default()).unwrap()
    }

    /// Тест проверяет путь Streaming → Exhausted и счётчики.
    #[test]
    fn test_stream_until_exhausted() {
        let builder = sample_run(2, 3, 2);
        let bytes = builder.build();
        let total = bytes.len() as u64;
        let mut stream = memory_stream(bytes);
        assert_eq!(stream.state(), StreamState::Streaming);

        let mut events = Vec::new();
        for tree in stream.by_ref() {
            let tree = tree.unwrap();
            for ev in tree.events() {
                events.push((ev.run_number().unwrap(), ev.event_number().unwrap()));
            }
        }
        assert_eq!(events, (1..=6).map(|e| (2, e)).collect::<Vec<_>>());
        assert_eq!(stream.state(), StreamState::Exhausted);
        assert_eq!(stream.records_read(), 3);
        assert_eq!(stream.bytes_read(), total);
        assert!(stream.next().is_none());
        assert!(stream.position().is_none());
    }

    /// Тест проверяет, что пустой контейнер сразу исчерпан без ошибки.
    #[test]
    fn test_empty_container() {
        let mut stream = memory_stream(ContainerBuilder::new().build());
        assert!(stream.next().is_none());
        assert_eq!(stream.state(), StreamState::Exhausted);
    }

    /// Тест проверяет, что ошибка отдаётся один раз и источник закрывается.
    #[test]
    fn test_failure_is_reported_once() {
        let mut bytes = sample_run(1, 2, 1).build();
        bytes.truncate(bytes.len() - 10);
        let (src, closes) = ProbeSource::new(bytes);
        let mut stream = IStream::from_source(src, StreamConfig::default()).unwrap();

        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(err.is(StatusCode::TruncatedStream));
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(stream.next().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        stream.close().unwrap();
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет идемпотентность `close` и закрытие при drop.
    #[test]
    fn test_close_idempotent_and_drop() {
        let (src, closes) = ProbeSource::new(sample_run(1, 2, 1).build());
        let mut stream = IStream::from_source(src, StreamConfig::default()).unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.next().is_none());
        drop(stream);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (src, closes) = ProbeSource::new(sample_run(1, 2, 1).build());
        let stream = IStream::from_source(src, StreamConfig::default()).unwrap();
        drop(stream);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что неверный заголовок закрывает источник.
    #[test]
    fn test_bad_header_releases_source() {
        let (src, closes) = ProbeSource::new(b"NOPE\x01\xFE\xFF\x00".to_vec());
        let err = IStream::from_source(src, StreamConfig::default()).unwrap_err();
        assert!(err.is(StatusCode::InvalidHeader));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет отмену из другого потока во время зависшего чтения.
    #[test]
    fn test_cancel_in_flight() {
        let builder = sample_run(1, 2, 1);
        let offsets = builder.frame_offsets();
        let (mut src, closes) = ProbeSource::new(builder.build());
        src.stall_at = Some(offsets[1]);
        let mut stream = IStream::from_source(src, StreamConfig::default()).unwrap();
        // Хук зависшего источника смотрит на тот же токен, что и поток.
        if let Some(d) = stream.decoder.as_mut() {
            d.source_mut().cancel = stream.token.clone();
        }

        assert!(stream.next().unwrap().is_ok());
        let closer = stream.closer();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            assert!(closer.close());
            assert!(!closer.close());
        });

        let err = stream.next().unwrap().unwrap_err();
        handle.join().unwrap();
        assert!(err.is(StatusCode::Cancelled), "{err}");
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.next().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет отмену до следующего вызова.
    #[test]
    fn test_cancel_before_next() {
        let mut stream = memory_stream(sample_run(1, 2, 1).build());
        stream.closer().close();
        let err = stream.next().unwrap().unwrap_err();
        assert!(err.is(StatusCode::Cancelled));
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.next().is_none());
    }

    /// Тест проверяет skip и возврат на сохранённую позицию.
    #[test]
    fn test_skip_and_set_position() {
        let mut stream = memory_stream(sample_run(4, 3, 1).build());
        let start = stream.position().unwrap();
        assert_eq!(start, StreamPosition { offset: 8, record: 0 });

        assert_eq!(stream.skip_records(1).unwrap(), 1);
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!(second.physics_events()[0].event_number(), Ok(2));
        assert_eq!(stream.records_read(), 1);

        stream.set_position(start).unwrap();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.physics_events()[0].event_number(), Ok(1));

        assert_eq!(stream.skip_records(10).unwrap(), 2);
        assert_eq!(stream.state(), StreamState::Exhausted);
        let err = stream.set_position(start).unwrap_err();
        assert!(err.is(StatusCode::Unsupported));
    }

    /// Тест проверяет ленивое открытие через собственную функцию открытия.
    #[test]
    fn test_lazy_connect_with_connector() {
        fn connector(
            _: &ResourceLocator,
            _: &StreamConfig,
            _: CancelToken,
        ) -> HddmResult<MemorySource> {
            Ok(MemorySource::new(sample_run(9, 1, 2).build()))
        }

        let loc = ResourceLocator::parse("memory-fixture.hddm").unwrap();
        let mut stream = IStream::with_connector(loc, StreamConfig::default(), connector);
        assert_eq!(stream.state(), StreamState::Created);
        assert!(stream.header().is_none());

        let tree = stream.next().unwrap().unwrap();
        assert_eq!(tree.physics_events().len(), 2);
        assert_eq!(stream.state(), StreamState::Streaming);
        assert!(stream.header().is_some());
        assert_eq!(stream.locator().map(|l| l.as_str()), Some("memory-fixture.hddm"));
    }

    /// Тест проверяет, что ошибка открытия переводит поток в `Failed`.
    #[test]
    fn test_connect_failure() {
        let loc = ResourceLocator::parse("/definitely/not/here.hddm").unwrap();
        let mut stream = IStream::new(loc, StreamConfig::default());
        let err = stream.connect().unwrap_err();
        assert!(err.is(StatusCode::ConnectFailed));
        assert_eq!(stream.state(), StreamState::Failed);
        assert!(stream.next().is_none());
    }

    /// Буфер, в который пишет тестовый подписчик `tracing`.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn captured_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Тест проверяет, что ошибка потока логируется на уровне своего кода
    /// вместе с тегами ошибки.
    #[test]
    fn test_failure_logged_at_status_level() {
        let logs = captured_logs(|| {
            let mut bytes = sample_run(1, 2, 1).build();
            bytes.truncate(bytes.len() - 10);
            let mut stream = memory_stream(bytes);
            while stream.next().is_some() {}
        });

        let line = logs
            .lines()
            .find(|l| l.contains("Stream stopped"))
            .expect("failure is logged");
        assert!(line.contains("WARN"), "{line}");
        assert!(line.contains("TruncatedStream"), "{line}");
        assert!(line.contains("error_type"), "{line}");
        assert!(line.contains("failed"), "{line}");
    }

    /// Тест проверяет, что ошибки состояния собираются через `bail!` с
    /// нужным кодом.
    #[test]
    fn test_state_errors() {
        let mut stream = memory_stream(sample_run(1, 1, 1).build());
        let err = stream
            .set_position(StreamPosition { offset: 3, record: 0 })
            .unwrap_err();
        assert!(err.is(StatusCode::InvalidArgs), "{err}");

        stream.close().unwrap();
        let err = stream.connect().unwrap_err();
        assert!(err.is(StatusCode::Unsupported), "{err}");
        assert!(err.to_string().contains("closed"), "{err}");
    }

    /// Тест проверяет, что поток можно передать в другой поток ОС.
    #[test]
    fn test_stream_is_send() {
        fn assert_send<T: Send>() {}
        fn assert_sync_clone<T: Send + Sync + Clone>() {}
        assert_send::<IStream>();
        assert_sync_clone::<StreamCloser>();
    }
}
