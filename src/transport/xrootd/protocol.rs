//! Кодек бинарного протокола XRootD (клиентская часть).
//!
//! Все целые в протоколе — big-endian. Запрос: `streamid[2]`, `requestid:
//! u16`, `params[16]`, `dlen: i32`, затем `dlen` байт данных. Ответ:
//! `streamid[2]`, `status: u16`, `dlen: i32`, затем данные.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Размер заголовка запроса.
pub const REQUEST_HEADER_LEN: usize = 24;
/// Размер заголовка ответа.
pub const RESPONSE_HEADER_LEN: usize = 8;
/// Размер ответа сервера на handshake.
pub const HANDSHAKE_RESPONSE_LEN: usize = 16;

// Коды запросов
pub const KXR_CLOSE: u16 = 3003;
pub const KXR_PROTOCOL: u16 = 3006;
pub const KXR_LOGIN: u16 = 3007;
pub const KXR_OPEN: u16 = 3010;
pub const KXR_READ: u16 = 3013;

// Коды статуса ответа
pub const KXR_OK: u16 = 0;
pub const KXR_OKSOFAR: u16 = 4000;
pub const KXR_ERROR: u16 = 4003;
pub const KXR_REDIRECT: u16 = 4004;
pub const KXR_WAIT: u16 = 4005;

/// Версия протокола, которую объявляет клиент.
pub const PROTOCOL_VERSION: i32 = 0x0000_0520;
/// Открытие только на чтение.
pub const OPEN_READ: u16 = 0x0010;
/// Версия возможностей клиента в логине.
pub const LOGIN_CAPVER: u8 = 5;

/// Первые 20 байт соединения.
pub fn handshake() -> [u8; 20] {
    let mut buf = [0u8; 20];
    let words: [i32; 5] = [0, 0, 0, 4, 2012];
    for (chunk, word) in buf.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    buf
}

/// Заголовок ответа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub stream_id: [u8; 2],
    pub status: u16,
    pub dlen: u32,
}

/// Тело ответа `kXR_redirect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub host: String,
    pub port: u16,
    /// Непрозрачный CGI после `?`, передаётся в следующий open
    pub opaque: Option<String>,
}

/// Кодирует запрос целиком.
pub fn encode_request(
    stream_id: [u8; 2],
    request_id: u16,
    params: [u8; 16],
    data: &[u8],
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(REQUEST_HEADER_LEN + data.len());
    buf.write_all(&stream_id)?;
    buf.write_u16::<BigEndian>(request_id)?;
    buf.write_all(&params)?;
    buf.write_i32::<BigEndian>(data_len(data)?)?;
    buf.write_all(data)?;
    Ok(buf)
}

fn data_len(data: &[u8]) -> io::Result<i32> {
    i32::try_from(data.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "request body too large"))
}

/// Читает заголовок ответа.
pub fn read_response_header<R: Read>(reader: &mut R) -> io::Result<ResponseHeader> {
    let mut stream_id = [0u8; 2];
    reader.read_exact(&mut stream_id)?;
    let status = reader.read_u16::<BigEndian>()?;
    let dlen = reader.read_i32::<BigEndian>()?;
    let dlen = u32::try_from(dlen)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative response length"))?;
    Ok(ResponseHeader {
        stream_id,
        status,
        dlen,
    })
}

/// Параметры `kXR_protocol`.
pub fn protocol_params() -> [u8; 16] {
    let mut params = [0u8; 16];
    params[0..4].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    params
}

/// Параметры `kXR_login`: pid, имя (8 байт), ability2, ability, capver.
pub fn login_params(
    pid: u32,
    user: &str,
) -> [u8; 16] {
    let mut params = [0u8; 16];
    params[0..4].copy_from_slice(&pid.to_be_bytes());
    let name = user.as_bytes();
    let n = name.len().min(8);
    params[4..4 + n].copy_from_slice(&name[..n]);
    params[14] = LOGIN_CAPVER;
    params
}

/// Параметры `kXR_open`: mode, options.
pub fn open_params(options: u16) -> [u8; 16] {
    let mut params = [0u8; 16];
    params[2..4].copy_from_slice(&options.to_be_bytes());
    params
}

/// Параметры `kXR_read`: fhandle, offset, rlen.
pub fn read_params(
    handle: [u8; 4],
    offset: u64,
    len: u32,
) -> [u8; 16] {
    let mut params = [0u8; 16];
    params[0..4].copy_from_slice(&handle);
    params[4..12].copy_from_slice(&offset.to_be_bytes());
    params[12..16].copy_from_slice(&len.to_be_bytes());
    params
}

/// Параметры `kXR_close`: fhandle.
pub fn close_params(handle: [u8; 4]) -> [u8; 16] {
    let mut params = [0u8; 16];
    params[0..4].copy_from_slice(&handle);
    params
}

/// Разбирает тело `kXR_error`: код и сообщение.
pub fn parse_error(body: &[u8]) -> (i32, String) {
    let code = body
        .get(0..4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0);
    let msg = body.get(4..).map(c_string).unwrap_or_default();
    (code, msg)
}

/// Разбирает тело `kXR_wait`: секунды и сообщение.
pub fn parse_wait(body: &[u8]) -> (u32, String) {
    let (secs, msg) = parse_error(body);
    (secs.max(0) as u32, msg)
}

/// Разбирает тело `kXR_redirect`: порт, затем `host[:port][?opaque]`.
pub fn parse_redirect(body: &[u8]) -> Option<Redirect> {
    let port = body.get(0..4)?;
    let port = i32::from_be_bytes([port[0], port[1], port[2], port[3]]);
    let raw = c_string(&body[4..]);

    let (target, opaque) = match raw.split_once('?') {
        Some((t, o)) => (t.to_string(), Some(o.to_string()).filter(|o| !o.is_empty())),
        None => (raw.clone(), None),
    };
    if target.is_empty() {
        return None;
    }

    // Новые серверы могут прислать host:port с port = -1 в заголовке.
    let (host, port) = match target.rsplit_once(':') {
        Some((h, p)) if port <= 0 => (h.to_string(), p.parse().ok()?),
        _ => (target.clone(), u16::try_from(port).ok()?),
    };

    Some(Redirect { host, port, opaque })
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет байты handshake.
    #[test]
    fn test_handshake_bytes() {
        let hs = handshake();
        assert_eq!(&hs[0..12], &[0u8; 12]);
        assert_eq!(&hs[12..16], &[0, 0, 0, 4]);
        assert_eq!(&hs[16..20], &2012i32.to_be_bytes());
    }

    /// Тест проверяет раскладку заголовка запроса.
    #[test]
    fn test_encode_request_layout() {
        let buf = encode_request([0, 7], KXR_OPEN, open_params(OPEN_READ), b"/f").unwrap();
        assert_eq!(buf.len(), REQUEST_HEADER_LEN + 2);
        assert_eq!(&buf[0..2], &[0, 7]);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), KXR_OPEN);
        assert_eq!(u16::from_be_bytes([buf[6], buf[7]]), OPEN_READ);
        assert_eq!(i32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]), 2);
        assert_eq!(&buf[24..], b"/f");
    }

    /// Тест проверяет параметры чтения.
    #[test]
    fn test_read_params() {
        let p = read_params([1, 2, 3, 4], 0x0102_0304_0506, 4096);
        assert_eq!(&p[0..4], &[1, 2, 3, 4]);
        assert_eq!(u64::from_be_bytes(p[4..12].try_into().unwrap()), 0x0102_0304_0506);
        assert_eq!(u32::from_be_bytes(p[12..16].try_into().unwrap()), 4096);
    }

    /// Тест проверяет усечение имени пользователя до 8 байт.
    #[test]
    fn test_login_params_truncates_user() {
        let p = login_params(42, "averyverylongname");
        assert_eq!(&p[4..12], b"averyver");
        assert_eq!(p[14], LOGIN_CAPVER);
    }

    /// Тест проверяет разбор redirect в обеих формах.
    #[test]
    fn test_parse_redirect() {
        let mut body = 1095i32.to_be_bytes().to_vec();
        body.extend_from_slice(b"data01.example.org?tried=lb\0");
        let r = parse_redirect(&body).unwrap();
        assert_eq!(r.host, "data01.example.org");
        assert_eq!(r.port, 1095);
        assert_eq!(r.opaque.as_deref(), Some("tried=lb"));

        let mut body = (-1i32).to_be_bytes().to_vec();
        body.extend_from_slice(b"data02:2000");
        let r = parse_redirect(&body).unwrap();
        assert_eq!((r.host.as_str(), r.port), ("data02", 2000));

        assert!(parse_redirect(&[0, 0]).is_none());
    }

    /// Тест проверяет разбор ответа об ошибке.
    #[test]
    fn test_parse_error() {
        let mut body = 3011i32.to_be_bytes().to_vec();
        body.extend_from_slice(b"no such file\0");
        assert_eq!(parse_error(&body), (3011, "no such file".to_string()));
    }

    /// Тест проверяет чтение заголовка ответа.
    #[test]
    fn test_read_response_header() {
        let raw = [0u8, 1, 0x0F, 0xA0, 0, 0, 0, 9];
        let h = read_response_header(&mut &raw[..]).unwrap();
        assert_eq!(h.stream_id, [0, 1]);
        assert_eq!(h.status, KXR_OKSOFAR);
        assert_eq!(h.dlen, 9);
    }
}
