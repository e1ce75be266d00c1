//! Общие помощники интеграционных тестов: временные файлы и маленькие
//! серверы HTTP(S) и XRootD поверх `std::net::TcpListener`.

#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

pub use hddm_fixtures::*;
use parking_lot::Mutex;
use rustls::{
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
    ServerConfig, ServerConnection, StreamOwned,
};
use tempfile::NamedTempFile;

/// Записывает байты во временный файл.
pub fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// Порт, на котором гарантированно никто не слушает.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

/// Поведение тестового HTTP-сервера.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Отвечать 200 с полным телом, игнорируя `Range`
    pub ignore_range: bool,
    /// Отвечать этим статусом на каждый запрос
    pub status: Option<u16>,
    /// Задержка перед каждым ответом
    pub delay: Option<Duration>,
    /// Ожидаемое значение заголовка `Authorization`
    pub required_auth: Option<String>,
}

/// HTTP-сервер, отдающий один ресурс с поддержкой `Range`.
pub struct HttpServer {
    pub addr: SocketAddr,
    pub requests: Arc<AtomicUsize>,
    scheme: &'static str,
}

/// Конфигурация TLS с самоподписанным сертификатом на `localhost` и
/// `127.0.0.1`.
fn self_signed_tls() -> Arc<ServerConfig> {
    let key_pair = rcgen::KeyPair::generate().expect("generate key pair");
    let cert = rcgen::CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .expect("certificate params")
    .self_signed(&key_pair)
    .expect("self-signed certificate");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("tls versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .expect("server certificate");
    Arc::new(config)
}

impl HttpServer {
    pub fn start(data: Vec<u8>) -> Self {
        Self::with_options(data, HttpOptions::default())
    }

    pub fn with_options(
        data: Vec<u8>,
        options: HttpOptions,
    ) -> Self {
        Self::spawn(data, options, None)
    }

    /// HTTPS-сервер с самоподписанным сертификатом.
    pub fn tls(data: Vec<u8>) -> Self {
        Self::spawn(data, HttpOptions::default(), Some(self_signed_tls()))
    }

    fn spawn(
        data: Vec<u8>,
        options: HttpOptions,
        tls: Option<Arc<ServerConfig>>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind http");
        let addr = listener.local_addr().expect("http addr");
        let requests = Arc::new(AtomicUsize::new(0));
        let data = Arc::new(data);

        let scheme = if tls.is_some() { "https" } else { "http" };

        let counter = requests.clone();
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let data = data.clone();
                let options = options.clone();
                let counter = counter.clone();
                let tls = tls.clone();
                thread::spawn(move || match tls {
                    Some(tls) => {
                        let Ok(session) = ServerConnection::new(tls) else {
                            return;
                        };
                        let mut tls = StreamOwned::new(session, conn);
                        let _ = serve_http(&mut tls, &data, &options, &counter);
                        tls.conn.send_close_notify();
                        let _ = tls.flush();
                    }
                    None => {
                        let _ = serve_http(conn, &data, &options, &counter);
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            scheme,
        }
    }

    pub fn url(
        &self,
        path: &str,
    ) -> String {
        format!("{}://{}/{}", self.scheme, self.addr, path.trim_start_matches('/'))
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn serve_http<S: Read + Write>(
    conn: S,
    data: &[u8],
    options: &HttpOptions,
    counter: &AtomicUsize,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(conn);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    let mut range = None;
    let mut auth = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "range" => range = Some(value.trim().to_string()),
                "authorization" => auth = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    counter.fetch_add(1, Ordering::SeqCst);

    if let Some(delay) = options.delay {
        thread::sleep(delay);
    }

    let (status, body, extra) = if let Some(status) = options.status {
        (status, Vec::new(), String::new())
    } else if options.required_auth.is_some() && options.required_auth != auth {
        (401, Vec::new(), String::new())
    } else if options.ignore_range {
        (200, data.to_vec(), String::new())
    } else {
        match range.as_deref().and_then(parse_range) {
            Some((start, _)) if start >= data.len() as u64 => (
                416,
                Vec::new(),
                format!("Content-Range: bytes */{}\r\n", data.len()),
            ),
            Some((start, end)) => {
                let end = end.min(data.len() as u64 - 1);
                let slice = data[start as usize..=end as usize].to_vec();
                (
                    206,
                    slice,
                    format!("Content-Range: bytes {start}-{end}/{}\r\n", data.len()),
                )
            }
            None => (200, data.to_vec(), String::new()),
        }
    };

    let reason = match status {
        200 => "OK",
        206 => "Partial Content",
        401 => "Unauthorized",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        _ => "Error",
    };
    let out = reader.get_mut();
    write!(
        out,
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n",
        body.len()
    )?;
    out.write_all(&body)?;
    out.flush()?;
    Ok(())
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let range = value.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

const KXR_CLOSE: u16 = 3003;
const KXR_PROTOCOL: u16 = 3006;
const KXR_LOGIN: u16 = 3007;
const KXR_OPEN: u16 = 3010;
const KXR_READ: u16 = 3013;
const KXR_OK: u16 = 0;
const KXR_OKSOFAR: u16 = 4000;
const KXR_ERROR: u16 = 4003;
const KXR_REDIRECT: u16 = 4004;

/// Поведение тестового XRootD-сервера.
#[derive(Debug, Clone, Default)]
pub struct XrootdOptions {
    /// На `kXR_open` перенаправлять на этот порт (на 127.0.0.1)
    pub redirect_to: Option<u16>,
    /// Какой путь считать существующим; `None` — любой
    pub path: Option<String>,
    /// Размер частей ответа `kXR_oksofar`
    pub chunk: Option<usize>,
    /// Задержка перед ответом на `kXR_read`
    pub read_delay: Option<Duration>,
    /// Объявлять эту длину тела в ответе на handshake, не отправляя тело
    pub handshake_len: Option<i32>,
    /// Объявлять эту длину тела в ответе на `kXR_read`, не отправляя тело
    pub read_len: Option<i32>,
}

/// Минимальный сервер XRootD: handshake, protocol, login, open, read,
/// close.
pub struct XrootdServer {
    pub addr: SocketAddr,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub logins: Arc<Mutex<Vec<String>>>,
}

impl XrootdServer {
    pub fn start(data: Vec<u8>) -> Self {
        Self::with_options(data, XrootdOptions::default())
    }

    pub fn with_options(
        data: Vec<u8>,
        options: XrootdOptions,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind xrootd");
        let addr = listener.local_addr().expect("xrootd addr");
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let logins = Arc::new(Mutex::new(Vec::new()));
        let data = Arc::new(data);

        let (o, c, l) = (opens.clone(), closes.clone(), logins.clone());
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { break };
                let data = data.clone();
                let options = options.clone();
                let (o, c, l) = (o.clone(), c.clone(), l.clone());
                thread::spawn(move || {
                    let _ = serve_xrootd(conn, &data, &options, &o, &c, &l);
                });
            }
        });

        Self {
            addr,
            opens,
            closes,
            logins,
        }
    }

    pub fn url(
        &self,
        path: &str,
    ) -> String {
        format!("root://{}/{}", self.addr, path)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

fn respond(
    out: &mut TcpStream,
    stream_id: [u8; 2],
    status: u16,
    body: &[u8],
) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(&stream_id);
    frame.extend_from_slice(&status.to_be_bytes());
    frame.extend_from_slice(&(body.len() as i32).to_be_bytes());
    frame.extend_from_slice(body);
    out.write_all(&frame)
}

/// Заголовок ответа с длиной тела, которое так и не приходит.
fn declare(
    out: &mut TcpStream,
    stream_id: [u8; 2],
    status: u16,
    dlen: i32,
) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(8);
    frame.extend_from_slice(&stream_id);
    frame.extend_from_slice(&status.to_be_bytes());
    frame.extend_from_slice(&dlen.to_be_bytes());
    out.write_all(&frame)
}

fn serve_xrootd(
    mut conn: TcpStream,
    data: &[u8],
    options: &XrootdOptions,
    opens: &AtomicUsize,
    closes: &AtomicUsize,
    logins: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut hs = [0u8; 20];
    conn.read_exact(&mut hs)?;
    if let Some(dlen) = options.handshake_len {
        return declare(&mut conn, [0, 0], KXR_OK, dlen);
    }
    let mut body = 0x0000_0520i32.to_be_bytes().to_vec();
    body.extend_from_slice(&1i32.to_be_bytes());
    respond(&mut conn, [0, 0], KXR_OK, &body)?;

    loop {
        let mut header = [0u8; 24];
        if conn.read_exact(&mut header).is_err() {
            return Ok(());
        }
        let stream_id = [header[0], header[1]];
        let request = u16::from_be_bytes([header[2], header[3]]);
        let params: [u8; 16] = header[4..20].try_into().unwrap_or([0; 16]);
        let dlen = i32::from_be_bytes([header[20], header[21], header[22], header[23]]);
        let mut payload = vec![0u8; dlen.max(0) as usize];
        conn.read_exact(&mut payload)?;

        match request {
            KXR_PROTOCOL => {
                let mut body = 0x0000_0520i32.to_be_bytes().to_vec();
                body.extend_from_slice(&1i32.to_be_bytes());
                respond(&mut conn, stream_id, KXR_OK, &body)?;
            }
            KXR_LOGIN => {
                let name: Vec<u8> = params[4..12].iter().copied().take_while(|&b| b != 0).collect();
                logins.lock().push(String::from_utf8_lossy(&name).into_owned());
                respond(&mut conn, stream_id, KXR_OK, &[7u8; 16])?;
            }
            KXR_OPEN => {
                let path = String::from_utf8_lossy(&payload).into_owned();
                if let Some(port) = options.redirect_to {
                    let mut body = (port as i32).to_be_bytes().to_vec();
                    body.extend_from_slice(b"127.0.0.1?tried=lb");
                    respond(&mut conn, stream_id, KXR_REDIRECT, &body)?;
                    continue;
                }
                let bare = path.split('?').next().unwrap_or_default();
                if options.path.as_deref().is_some_and(|p| p != bare) {
                    let mut body = 3011i32.to_be_bytes().to_vec();
                    body.extend_from_slice(b"No such file or directory\0");
                    respond(&mut conn, stream_id, KXR_ERROR, &body)?;
                    continue;
                }
                opens.fetch_add(1, Ordering::SeqCst);
                respond(&mut conn, stream_id, KXR_OK, &[1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0])?;
            }
            KXR_READ => {
                if let Some(delay) = options.read_delay {
                    thread::sleep(delay);
                }
                if let Some(dlen) = options.read_len {
                    declare(&mut conn, stream_id, KXR_OK, dlen)?;
                    continue;
                }
                let offset = u64::from_be_bytes(params[4..12].try_into().unwrap_or([0; 8]));
                let len = u32::from_be_bytes(params[12..16].try_into().unwrap_or([0; 4]));
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len as usize).min(data.len());
                let slice = &data[start..end];
                let chunk = options.chunk.unwrap_or(usize::MAX).max(1);
                let mut parts = slice.chunks(chunk).peekable();
                if parts.peek().is_none() {
                    respond(&mut conn, stream_id, KXR_OK, &[])?;
                }
                while let Some(part) = parts.next() {
                    let status = if parts.peek().is_some() {
                        KXR_OKSOFAR
                    } else {
                        KXR_OK
                    };
                    respond(&mut conn, stream_id, status, part)?;
                }
            }
            KXR_CLOSE => {
                closes.fetch_add(1, Ordering::SeqCst);
                respond(&mut conn, stream_id, KXR_OK, &[])?;
            }
            _ => {
                let mut body = 3001i32.to_be_bytes().to_vec();
                body.extend_from_slice(b"unsupported request\0");
                respond(&mut conn, stream_id, KXR_ERROR, &body)?;
            }
        }
    }
}

/// Номера (run, event) всех событий потока; первая ошибка прерывает
/// сбор.
pub fn collect_events<I>(stream: I) -> Result<Vec<(i64, i64)>, hddm_stream::StackError>
where
    I: Iterator<Item = hddm_stream::HddmResult<hddm_stream::RecordTree>>,
{
    let mut out = Vec::new();
    for record in stream {
        let record = record?;
        for ev in record.events() {
            out.push((
                ev.run_number().unwrap_or(-1),
                ev.event_number().unwrap_or(-1),
            ));
        }
    }
    Ok(out)
}
