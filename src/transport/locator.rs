//! Разбор локатора ресурса.
//!
//! Разбор никогда не обращается к сети. Схема сравнивается с таблицей
//! диспетчеризации с учётом регистра, до передачи строки в `url`.

use std::{fmt, path::PathBuf, str::FromStr};

use hddm_error::{HddmResult, StackError, TransportError};
use url::Url;

/// Порт XRootD по умолчанию.
pub const XROOTD_DEFAULT_PORT: u16 = 1094;

/// Схема локатора.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Http,
    Https,
    /// `root://` и его синоним `xrootd://`
    Root,
}

/// Неизменяемый разобранный локатор.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    scheme: Scheme,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    user: Option<String>,
    url: Option<Url>,
    raw: String,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Scheme {
    /// Таблица диспетчеризации: префикс до `://` -> схема.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "file" => Some(Self::File),
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "root" | "xrootd" => Some(Self::Root),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Http => "http",
            Self::Https => "https",
            Self::Root => "root",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, Self::File)
    }
}

impl ResourceLocator {
    /// Разбирает строку локатора.
    ///
    /// Строка без `://` считается путём к локальному файлу.
    pub fn parse(input: &str) -> HddmResult<Self> {
        let Some((prefix, _)) = input.split_once("://") else {
            return Self::local(input, PathBuf::from(input));
        };

        let scheme =
            Scheme::from_prefix(prefix).ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: prefix.to_string(),
                locator: input.to_string(),
            })?;

        let url = Url::parse(input).map_err(|e| address_error(input, e.to_string()))?;

        match scheme {
            Scheme::File => {
                let path = url
                    .to_file_path()
                    .map_err(|_| address_error(input, "not a local file path"))?;
                Self::local(input, path)
            }
            Scheme::Http | Scheme::Https | Scheme::Root => Self::remote(input, scheme, url),
        }
    }

    fn local(
        input: &str,
        path: PathBuf,
    ) -> HddmResult<Self> {
        if path.as_os_str().is_empty() {
            return Err(address_error(input, "empty path"));
        }
        Ok(Self {
            scheme: Scheme::File,
            host: None,
            port: None,
            path: path.to_string_lossy().into_owned(),
            query: None,
            user: None,
            url: None,
            raw: input.to_string(),
        })
    }

    fn remote(
        input: &str,
        scheme: Scheme,
        url: Url,
    ) -> HddmResult<Self> {
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(address_error(input, "missing host")),
        };

        let path = match scheme {
            // XRootD пишет абсолютный путь после второго слэша: root://host//store/f
            Scheme::Root => format!("/{}", url.path().trim_start_matches('/')),
            _ => url.path().to_string(),
        };
        if scheme == Scheme::Root && path == "/" {
            return Err(address_error(input, "missing file path"));
        }

        let user = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            scheme,
            host: Some(host),
            port: url.port(),
            path,
            query: url.query().map(str::to_string),
            user,
            url: Some(url),
            raw: input.to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Явно указанный порт.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Порт с учётом значения по умолчанию для схемы.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or(match self.scheme {
            Scheme::File => None,
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            Scheme::Root => Some(XROOTD_DEFAULT_PORT),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Имя пользователя из части `user@host`.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Разобранный URL (только для удалённых схем).
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `host:port` для сообщений и подключения.
    pub fn address(&self) -> String {
        match (self.host(), self.port_or_default()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            _ => self.path.clone(),
        }
    }
}

fn address_error(
    input: &str,
    reason: impl Into<String>,
) -> StackError {
    TransportError::AddressError {
        locator: input.to_string(),
        reason: reason.into(),
    }
    .into()
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ResourceLocator
////////////////////////////////////////////////////////////////////////////////

impl FromStr for ResourceLocator {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
