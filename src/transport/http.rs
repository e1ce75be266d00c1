//! HTTP(S) источник с блочным чтением через `Range`.
//!
//! Ресурс читается блоками фиксированного размера. Первый блок
//! запрашивается при открытии; следующие `readahead` блоков качаются
//! заранее в фоновых потоках. Каждый поток отдаёт результат через
//! собственный канал, а читатель ждёт его короткими интервалами, проверяя
//! сигнал отмены.
//!
//! Если сервер игнорирует `Range` и отвечает `200`, источник переходит на
//! одно потоковое тело: фоновый поток режет его на блоки и передаёт их
//! через ограниченный канал. Ресурс при этом скачивается один раз.

use std::{
    collections::VecDeque,
    fmt,
    io::{self, Read},
    sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
    thread,
    time::Duration,
};

use bytes::Bytes;
use hddm_error::{HddmResult, StackError, TransportError};
use reqwest::{
    blocking::{Client, Response},
    header::{CONTENT_RANGE, RANGE},
    StatusCode as HttpStatus,
};
use tracing::{debug, trace, warn};
use url::Url;

use super::{ByteSource, CancelToken, ResourceLocator, Scheme, SourceKind};
use crate::config::{Credentials, StreamConfig};

/// Интервал опроса канала при ожидании блока.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Результат запроса одного блока.
#[derive(Debug)]
enum Fetched {
    Data(Bytes),
    /// Ресурс закончился до начала блока
    End,
    /// Сервер проигнорировал `Range` и отдаёт ресурс целиком
    Whole(Response),
}

/// Фаза запроса: ошибки первого блока — это ошибки открытия.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Read,
}

/// Блок, запрошенный в фоне.
struct Pending {
    start: u64,
    rx: Receiver<HddmResult<Fetched>>,
}

/// Потоковое тело ответа `200`, нарезанное на блоки.
struct Body {
    /// Offset следующего блока из канала
    next: u64,
    rx: Receiver<HddmResult<Bytes>>,
}

/// Всё, что нужно фоновому потоку для одного запроса.
#[derive(Clone)]
struct Fetcher {
    client: Client,
    url: Url,
    auth: Option<Credentials>,
    address: String,
}

/// Источник поверх HTTP или HTTPS.
pub struct HttpSource {
    fetcher: Fetcher,
    kind: SourceKind,
    block_size: u64,
    readahead: usize,
    position: u64,
    current: Bytes,
    current_start: u64,
    next_fetch: u64,
    pending: VecDeque<Pending>,
    body: Option<Body>,
    /// Сервер уже однажды ответил `200` на `Range`
    ranges_ignored: bool,
    end: Option<u64>,
    cancel: CancelToken,
    closed: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl HttpSource {
    /// Открывает ресурс и синхронно читает первый блок.
    pub fn open(
        locator: &ResourceLocator,
        config: &StreamConfig,
        cancel: CancelToken,
    ) -> HddmResult<Self> {
        let kind = match locator.scheme() {
            Scheme::Http => SourceKind::Http,
            Scheme::Https => SourceKind::Https,
            other => {
                return Err(TransportError::UnsupportedScheme {
                    scheme: other.as_str().to_string(),
                    locator: locator.to_string(),
                }
                .into())
            }
        };
        let url = locator
            .url()
            .cloned()
            .ok_or_else(|| TransportError::AddressError {
                locator: locator.to_string(),
                reason: "missing url".to_string(),
            })?;
        let address = locator.address();

        let client = Client::builder()
            .connect_timeout(config.effective_connect_timeout())
            .timeout(config.effective_read_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(format!("hddm-stream/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        let mut source = Self {
            fetcher: Fetcher {
                client,
                url,
                auth: config.credentials_for(locator),
                address,
            },
            kind,
            block_size: config.block_size.max(1) as u64,
            readahead: config.readahead,
            position: 0,
            current: Bytes::new(),
            current_start: 0,
            next_fetch: 0,
            pending: VecDeque::new(),
            body: None,
            ranges_ignored: false,
            end: None,
            cancel,
            closed: false,
        };

        source.spawn_fetch(Phase::Open)?;
        source.advance()?;
        debug!(
            url = %source.fetcher.url,
            first_block = source.current.len(),
            "Opened http source"
        );
        Ok(source)
    }

    /// Запускает запрос следующего блока в фоновом потоке.
    fn spawn_fetch(
        &mut self,
        phase: Phase,
    ) -> HddmResult<()> {
        let start = self.next_fetch;
        let len = self.block_size;
        let fetcher = self.fetcher.clone();
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("hddm-http-fetch".to_string())
            .spawn(move || {
                // Получатель мог уйти после seek или close.
                let _ = tx.send(fetcher.fetch(start, len, phase));
            })?;

        self.pending.push_back(Pending { start, rx });
        self.next_fetch += len;
        Ok(())
    }

    /// Поддерживает `readahead` блоков в полёте.
    fn fill_pipeline(&mut self) -> HddmResult<()> {
        let depth = if self.ranges_ignored { 1 } else { self.readahead.max(1) };
        while self.body.is_none() && self.end.is_none() && self.pending.len() < depth {
            self.spawn_fetch(Phase::Read)?;
        }
        Ok(())
    }

    /// Ждёт следующий блок и делает его текущим.
    fn advance(&mut self) -> HddmResult<()> {
        if self.body.is_some() {
            return self.advance_body();
        }
        if self.pending.is_empty() {
            self.fill_pipeline()?;
        }
        let Some(pending) = self.pending.pop_front() else {
            return Ok(());
        };

        match self.wait(&pending.rx, pending.start)? {
            Fetched::Whole(response) => {
                warn!(
                    url = %self.fetcher.url,
                    start = pending.start,
                    "Server ignored range request, streaming full body"
                );
                self.pending.clear();
                self.ranges_ignored = true;
                self.start_body(response, pending.start)?;
                return self.advance_body();
            }
            Fetched::Data(bytes) if !bytes.is_empty() => {
                trace!(start = pending.start, len = bytes.len(), "http block");
                if (bytes.len() as u64) < self.block_size {
                    self.end = Some(pending.start + bytes.len() as u64);
                    self.pending.clear();
                }
                self.current_start = pending.start;
                self.current = bytes;
            }
            Fetched::Data(_) | Fetched::End => {
                self.end = Some(pending.start);
                self.pending.clear();
                self.current_start = pending.start;
                self.current = Bytes::new();
            }
        }

        self.fill_pipeline()
    }

    /// Запускает поток, читающий тело ответа `200` блоками с offset
    /// `start`; байты до `start` отбрасываются.
    fn start_body(
        &mut self,
        response: Response,
        start: u64,
    ) -> HddmResult<()> {
        let (tx, rx) = mpsc::sync_channel(self.readahead.max(1));
        let block = self.block_size as usize;
        let address = self.fetcher.address.clone();

        thread::Builder::new()
            .name("hddm-http-body".to_string())
            .spawn(move || stream_body(response, start, block, &address, &tx))?;

        self.body = Some(Body { next: start, rx });
        Ok(())
    }

    /// Следующий блок потокового тела.
    fn advance_body(&mut self) -> HddmResult<()> {
        let Some(body) = self.body.as_ref() else {
            return Ok(());
        };
        let start = body.next;
        let bytes = self.wait(&body.rx, start)?;

        self.current_start = start;
        if bytes.is_empty() {
            self.end = Some(start);
            self.body = None;
            self.current = Bytes::new();
        } else {
            trace!(start, len = bytes.len(), "http body block");
            if let Some(body) = self.body.as_mut() {
                body.next += bytes.len() as u64;
            }
            self.current = bytes;
        }
        Ok(())
    }

    fn wait<T>(
        &self,
        rx: &Receiver<HddmResult<T>>,
        offset: u64,
    ) -> HddmResult<T> {
        loop {
            self.cancel.check("http read")?;
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::ReadFailed {
                        address: self.fetcher.address.clone(),
                        offset,
                        reason: "fetch worker exited without a result".to_string(),
                    }
                    .into())
                }
            }
        }
    }

    fn at_end(&self) -> bool {
        self.end.is_some_and(|end| self.position >= end)
    }

    pub fn url(&self) -> &Url {
        &self.fetcher.url
    }
}

impl Fetcher {
    /// Один запрос `Range: bytes=start-(start+len-1)`.
    fn fetch(
        &self,
        start: u64,
        len: u64,
        phase: Phase,
    ) -> HddmResult<Fetched> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={}-{}", start, start + len - 1));
        request = match &self.auth {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credentials::Bearer(token)) => request.bearer_auth(token),
            Some(Credentials::User(_)) | None => request,
        };

        let response = request.send().map_err(|e| self.error(e, start, phase))?;
        let status = response.status();

        match status {
            HttpStatus::PARTIAL_CONTENT => {
                trace!(
                    start,
                    content_range = ?response.headers().get(CONTENT_RANGE),
                    "206 Partial Content"
                );
                let body = response.bytes().map_err(|e| self.error(e, start, phase))?;
                Ok(Fetched::Data(body))
            }
            HttpStatus::RANGE_NOT_SATISFIABLE => Ok(Fetched::End),
            HttpStatus::OK => Ok(Fetched::Whole(response)),
            other => Err(self.failure(format!("unexpected HTTP status {other}"), start, phase)),
        }
    }

    fn error(
        &self,
        err: reqwest::Error,
        start: u64,
        phase: Phase,
    ) -> StackError {
        if err.is_timeout() {
            return TransportError::Timeout {
                address: self.address.clone(),
                operation: format!("GET bytes {start}-"),
            }
            .into();
        }
        self.failure(err.to_string(), start, phase)
    }

    fn failure(
        &self,
        reason: String,
        start: u64,
        phase: Phase,
    ) -> StackError {
        match phase {
            Phase::Open => TransportError::ConnectFailed {
                address: self.address.clone(),
                reason,
            },
            Phase::Read => TransportError::ReadFailed {
                address: self.address.clone(),
                offset: start,
                reason,
            },
        }
        .into()
    }
}

/// Читает тело ответа блоками по `block` байт и отправляет их в канал.
/// Пустой блок означает конец тела. Поток завершается, когда получатель
/// ушёл.
fn stream_body(
    mut response: Response,
    skip: u64,
    block: usize,
    address: &str,
    tx: &SyncSender<HddmResult<Bytes>>,
) {
    let failed = |offset: u64, err: io::Error| -> HddmResult<Bytes> {
        Err(TransportError::ReadFailed {
            address: address.to_string(),
            offset,
            reason: err.to_string(),
        }
        .into())
    };

    match io::copy(&mut (&mut response).take(skip), &mut io::sink()) {
        Ok(skipped) if skipped < skip => {
            let _ = tx.send(Ok(Bytes::new()));
            return;
        }
        Ok(_) => {}
        Err(e) => {
            let _ = tx.send(failed(0, e));
            return;
        }
    }

    let mut offset = skip;
    loop {
        let mut buf = Vec::with_capacity(block);
        match (&mut response).take(block as u64).read_to_end(&mut buf) {
            Ok(n) => {
                offset += n as u64;
                let done = n == 0;
                if tx.send(Ok(Bytes::from(buf))).is_err() || done {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(failed(offset, e));
                return;
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для HttpSource
////////////////////////////////////////////////////////////////////////////////

impl ByteSource for HttpSource {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        if self.closed {
            return Err(TransportError::cancelled("http read").into());
        }
        self.cancel.check("http read")?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let cursor = (self.position - self.current_start) as usize;
            if cursor < self.current.len() {
                let n = (self.current.len() - cursor).min(buf.len());
                buf[..n].copy_from_slice(&self.current[cursor..cursor + n]);
                self.position += n as u64;
                return Ok(n);
            }
            if self.at_end() {
                return Ok(0);
            }
            self.advance()?;
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        let in_current = offset >= self.current_start
            && offset <= self.current_start + self.current.len() as u64;
        if in_current {
            self.position = offset;
            return Ok(());
        }

        // Блоки в полёте больше не нужны; их потоки завершатся сами.
        self.pending.clear();
        self.body = None;
        self.current = Bytes::new();
        self.current_start = offset;
        self.position = offset;
        self.next_fetch = offset;
        self.end = None;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn close(&mut self) -> HddmResult<()> {
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.body = None;
            self.current = Bytes::new();
            debug!(url = %self.fetcher.url, "Closed http source");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl fmt::Debug for HttpSource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HttpSource")
            .field("url", &self.fetcher.url.as_str())
            .field("position", &self.position)
            .field("pending", &self.pending.len())
            .field("streaming_body", &self.body.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
