//! Источник поверх XRootD (`root://`, `xrootd://`).
//!
//! Клиент проходит handshake, `kXR_protocol`, `kXR_login` и `kXR_open`,
//! следуя перенаправлениям балансировщика, затем читает файл блоками через
//! `kXR_read`. Отмена закрывает сокет, поэтому заблокированное чтение
//! возвращается сразу.

pub mod protocol;

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use hddm_error::{HddmResult, StackError, StatusCode, TransportError};
use protocol::{
    close_params, encode_request, handshake, login_params, open_params, parse_error,
    parse_redirect, parse_wait, protocol_params, read_params, read_response_header, KXR_CLOSE,
    KXR_ERROR, KXR_LOGIN, KXR_OK, KXR_OKSOFAR, KXR_OPEN, KXR_PROTOCOL, KXR_READ, KXR_REDIRECT,
    KXR_WAIT, OPEN_READ,
};
use tracing::{debug, trace};

use super::{ByteSource, CancelToken, ResourceLocator, SourceKind};
use crate::config::StreamConfig;

/// Максимальное число перенаправлений при открытии.
pub const MAX_REDIRECTS: usize = 8;
/// Максимальное число ответов `kXR_wait` подряд.
const MAX_WAITS: usize = 8;
/// Верхняя граница одного ожидания по `kXR_wait`.
const MAX_WAIT: Duration = Duration::from_secs(30);
/// Шаг проверки отмены во время ожидания.
const WAIT_SLICE: Duration = Duration::from_millis(50);
/// Имя пользователя для логина по умолчанию.
const DEFAULT_USER: &str = "hddm";
/// Предел тела управляющих ответов (handshake, login, open, close).
pub const CONTROL_BODY_LIMIT: usize = 64 * 1024;

/// Ответ сервера после склейки частичных `kXR_oksofar`.
struct Response {
    status: u16,
    body: Vec<u8>,
}

/// Одно TCP-соединение с сервером XRootD.
struct Connection {
    stream: TcpStream,
    next_id: u16,
    address: String,
    cancel: CancelToken,
}

/// Источник поверх файла на сервере XRootD.
pub struct XrootdSource {
    conn: Option<Connection>,
    handle: [u8; 4],
    path: String,
    position: u64,
    buffer: Bytes,
    buffer_start: u64,
    end: Option<u64>,
    block_size: u32,
    cancel: CancelToken,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Connection {
    /// Подключается и проходит handshake.
    fn connect(
        host: &str,
        port: u16,
        config: &StreamConfig,
        cancel: &CancelToken,
    ) -> HddmResult<Self> {
        cancel.check("xrootd connect")?;
        let address = format!("{host}:{port}");
        let connect_failed = |reason: String| TransportError::ConnectFailed {
            address: address.clone(),
            reason,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| connect_failed(format!("resolve: {e}")))?;

        let timeout = config.effective_connect_timeout();
        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = stream.ok_or_else(|| {
            connect_failed(
                last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no addresses resolved".to_string()),
            )
        })?;

        let read_timeout = Some(config.effective_read_timeout());
        stream.set_read_timeout(read_timeout)?;
        stream.set_write_timeout(read_timeout)?;
        stream.set_nodelay(true)?;

        if let Ok(clone) = stream.try_clone() {
            cancel.on_cancel(move || {
                let _ = clone.shutdown(Shutdown::Both);
            });
        }

        let mut conn = Self {
            stream,
            next_id: 1,
            address,
            cancel: cancel.clone(),
        };
        conn.handshake()
            .map_err(|e| connect_failure(e, &conn.address))?;
        debug!(address = %conn.address, "Connected to xrootd server");
        Ok(conn)
    }

    fn handshake(&mut self) -> HddmResult<()> {
        self.stream
            .write_all(&handshake())
            .map_err(|e| self.io_error(e, "handshake"))?;
        let header = read_response_header(&mut self.stream).map_err(|e| self.io_error(e, "handshake"))?;
        let body = self.read_body(header.dlen, CONTROL_BODY_LIMIT, "handshake")?;
        if header.status != KXR_OK {
            return Err(self.protocol_error(header.status, &body, "handshake"));
        }
        Ok(())
    }

    /// `kXR_protocol` и `kXR_login`.
    fn login(
        &mut self,
        user: &str,
    ) -> HddmResult<()> {
        let resp = self.request(KXR_PROTOCOL, protocol_params(), &[], CONTROL_BODY_LIMIT)?;
        if resp.status != KXR_OK {
            return Err(self.protocol_error(resp.status, &resp.body, "protocol"));
        }

        let resp = self.request(
            KXR_LOGIN,
            login_params(std::process::id(), user),
            &[],
            CONTROL_BODY_LIMIT,
        )?;
        if resp.status != KXR_OK {
            return Err(self.protocol_error(resp.status, &resp.body, "login"));
        }
        trace!(address = %self.address, user, "xrootd login ok");
        Ok(())
    }

    /// Отправляет запрос и читает ответ, склеивая `kXR_oksofar`. Тело
    /// ответа целиком не длиннее `limit` байт.
    fn request(
        &mut self,
        request_id: u16,
        params: [u8; 16],
        data: &[u8],
        limit: usize,
    ) -> HddmResult<Response> {
        let stream_id = self.next_id.to_be_bytes();
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let op = request_name(request_id);
        let frame = encode_request(stream_id, request_id, params, data)?;
        self.stream
            .write_all(&frame)
            .map_err(|e| self.io_error(e, op))?;

        let mut body = Vec::new();
        loop {
            let header = read_response_header(&mut self.stream).map_err(|e| self.io_error(e, op))?;
            if header.stream_id != stream_id {
                return Err(TransportError::ReadFailed {
                    address: self.address.clone(),
                    offset: 0,
                    reason: format!(
                        "response for stream {:?}, expected {:?}",
                        header.stream_id, stream_id
                    ),
                }
                .into());
            }
            let chunk = self.read_body(header.dlen, limit - body.len(), op)?;
            match header.status {
                KXR_OKSOFAR => body.extend_from_slice(&chunk),
                KXR_OK => {
                    body.extend_from_slice(&chunk);
                    return Ok(Response {
                        status: KXR_OK,
                        body,
                    });
                }
                status => return Ok(Response { status, body: chunk }),
            }
        }
    }

    fn read_body(
        &mut self,
        len: u32,
        limit: usize,
        op: &str,
    ) -> HddmResult<Vec<u8>> {
        let len = len as usize;
        if len > limit {
            // Поток уже рассинхронизирован, соединение больше не годится.
            self.shutdown();
            let reason = format!("{op}: response body of {len} bytes exceeds limit {limit}");
            return Err(if op == "read" {
                TransportError::ReadFailed {
                    address: self.address.clone(),
                    offset: 0,
                    reason,
                }
            } else {
                TransportError::ConnectFailed {
                    address: self.address.clone(),
                    reason,
                }
            }
            .into());
        }
        let mut body = vec![0u8; len];
        self.stream
            .read_exact(&mut body)
            .map_err(|e| self.io_error(e, op))?;
        Ok(body)
    }

    fn io_error(
        &self,
        err: io::Error,
        op: &str,
    ) -> StackError {
        if self.cancel.is_cancelled() {
            return TransportError::cancelled(format!("xrootd {op}")).into();
        }
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout {
                address: self.address.clone(),
                operation: op.to_string(),
            }
            .into(),
            _ => TransportError::ReadFailed {
                address: self.address.clone(),
                offset: 0,
                reason: format!("{op}: {err}"),
            }
            .into(),
        }
    }

    fn protocol_error(
        &self,
        status: u16,
        body: &[u8],
        op: &str,
    ) -> StackError {
        let reason = if status == KXR_ERROR {
            let (code, msg) = parse_error(body);
            format!("{op} failed: kXR_error {code}: {msg}")
        } else {
            format!("{op} failed: unexpected status {status}")
        };
        TransportError::ConnectFailed {
            address: self.address.clone(),
            reason,
        }
        .into()
    }

    fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl XrootdSource {
    /// Открывает файл, следуя перенаправлениям.
    pub fn open(
        locator: &ResourceLocator,
        config: &StreamConfig,
        cancel: CancelToken,
    ) -> HddmResult<Self> {
        let (Some(host), Some(port)) = (locator.host(), locator.port_or_default()) else {
            return Err(TransportError::AddressError {
                locator: locator.to_string(),
                reason: "missing host".to_string(),
            }
            .into());
        };
        let user = config
            .credentials_for(locator)
            .and_then(|c| c.username().map(str::to_string))
            .or_else(|| locator.user().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let mut opaque = locator.query().map(str::to_string);
        let mut conn = Self::login_to(host, port, &user, config, &cancel)?;
        let mut redirects = 0;
        let mut waits = 0;

        loop {
            let path = match &opaque {
                Some(q) => format!("{}?{}", locator.path(), q),
                None => locator.path().to_string(),
            };
            let resp = conn
                .request(
                    KXR_OPEN,
                    open_params(OPEN_READ),
                    path.as_bytes(),
                    CONTROL_BODY_LIMIT,
                )
                .map_err(|e| connect_failure(e, &conn.address))?;

            match resp.status {
                KXR_OK => {
                    let handle = resp
                        .body
                        .get(0..4)
                        .and_then(|h| <[u8; 4]>::try_from(h).ok())
                        .ok_or_else(|| TransportError::ConnectFailed {
                            address: conn.address.clone(),
                            reason: "open response without file handle".to_string(),
                        })?;
                    debug!(address = %conn.address, path = %locator.path(), "Opened xrootd file");

                    return Ok(Self {
                        conn: Some(conn),
                        handle,
                        path: locator.path().to_string(),
                        position: 0,
                        buffer: Bytes::new(),
                        buffer_start: 0,
                        end: None,
                        block_size: u32::try_from(config.block_size.max(1)).unwrap_or(u32::MAX),
                        cancel,
                    });
                }
                KXR_REDIRECT => {
                    redirects += 1;
                    let target = parse_redirect(&resp.body).filter(|_| redirects <= MAX_REDIRECTS);
                    let Some(target) = target else {
                        return Err(TransportError::ConnectFailed {
                            address: conn.address.clone(),
                            reason: format!("bad or excessive redirect (hop {redirects})"),
                        }
                        .into());
                    };
                    debug!(
                        from = %conn.address,
                        to = %format!("{}:{}", target.host, target.port),
                        hop = redirects,
                        "xrootd redirect"
                    );
                    conn.shutdown();
                    if target.opaque.is_some() {
                        opaque = target.opaque;
                    }
                    conn = Self::login_to(&target.host, target.port, &user, config, &cancel)?;
                }
                KXR_WAIT => {
                    waits += 1;
                    let (secs, msg) = parse_wait(&resp.body);
                    if waits > MAX_WAITS {
                        return Err(TransportError::ConnectFailed {
                            address: conn.address.clone(),
                            reason: format!("server keeps asking to wait: {msg}"),
                        }
                        .into());
                    }
                    debug!(address = %conn.address, secs, "xrootd wait");
                    sleep_interruptible(Duration::from_secs(secs as u64).min(MAX_WAIT), &cancel)?;
                }
                status => return Err(conn.protocol_error(status, &resp.body, "open")),
            }
        }
    }

    fn login_to(
        host: &str,
        port: u16,
        user: &str,
        config: &StreamConfig,
        cancel: &CancelToken,
    ) -> HddmResult<Connection> {
        let mut conn = Connection::connect(host, port, config, cancel)?;
        conn.login(user)
            .map_err(|e| connect_failure(e, &conn.address))?;
        Ok(conn)
    }

    /// Читает блок, начиная с текущей позиции.
    fn fetch_block(&mut self) -> HddmResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::cancelled("xrootd read").into());
        };
        let offset = self.position;
        let resp = conn.request(
            KXR_READ,
            read_params(self.handle, offset, self.block_size),
            &[],
            self.block_size as usize,
        )?;
        if resp.status != KXR_OK {
            let (code, msg) = parse_error(&resp.body);
            return Err(TransportError::ReadFailed {
                address: conn.address.clone(),
                offset,
                reason: format!("status {} ({code}: {msg})", resp.status),
            }
            .into());
        }

        trace!(offset, len = resp.body.len(), "xrootd block");
        if resp.body.len() < self.block_size as usize {
            self.end = Some(offset + resp.body.len() as u64);
        }
        self.buffer_start = offset;
        self.buffer = Bytes::from(resp.body);
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Ошибки до успешного open — это ошибки подключения.
fn connect_failure(
    err: StackError,
    address: &str,
) -> StackError {
    if err.is(StatusCode::Io) {
        return TransportError::ConnectFailed {
            address: address.to_string(),
            reason: err.to_string(),
        }
        .into();
    }
    err
}

fn sleep_interruptible(
    total: Duration,
    cancel: &CancelToken,
) -> HddmResult<()> {
    let deadline = Instant::now() + total;
    loop {
        cancel.check("xrootd wait")?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}

fn request_name(request_id: u16) -> &'static str {
    match request_id {
        KXR_CLOSE => "close",
        KXR_PROTOCOL => "protocol",
        KXR_LOGIN => "login",
        KXR_OPEN => "open",
        KXR_READ => "read",
        _ => "request",
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для XrootdSource
////////////////////////////////////////////////////////////////////////////////

impl ByteSource for XrootdSource {
    fn read_into(
        &mut self,
        buf: &mut [u8],
    ) -> HddmResult<usize> {
        self.cancel.check("xrootd read")?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let in_buffer = self.position >= self.buffer_start
                && self.position < self.buffer_start + self.buffer.len() as u64;
            if in_buffer {
                let cursor = (self.position - self.buffer_start) as usize;
                let n = (self.buffer.len() - cursor).min(buf.len());
                buf[..n].copy_from_slice(&self.buffer[cursor..cursor + n]);
                self.position += n as u64;
                return Ok(n);
            }
            if self.end.is_some_and(|end| self.position >= end) {
                return Ok(0);
            }
            self.fetch_block()?;
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(
        &mut self,
        offset: u64,
    ) -> HddmResult<()> {
        if self.conn.is_none() {
            return Err(TransportError::cancelled("xrootd seek").into());
        }
        self.position = offset;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn close(&mut self) -> HddmResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        self.buffer = Bytes::new();

        let result = if self.cancel.is_cancelled() {
            Ok(())
        } else {
            conn.request(KXR_CLOSE, close_params(self.handle), &[], CONTROL_BODY_LIMIT)
                .map(|_| ())
        };
        conn.shutdown();
        debug!(address = %conn.address, path = %self.path, "Closed xrootd file");
        result
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Xrootd
    }
}

impl fmt::Debug for XrootdSource {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("XrootdSource")
            .field("address", &self.conn.as_ref().map(|c| c.address.as_str()))
            .field("path", &self.path)
            .field("position", &self.position)
            .finish()
    }
}
