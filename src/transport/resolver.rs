use hddm_error::HddmResult;
use tracing::debug;

use super::{AnySource, CancelToken, FileSource, HttpSource, ResourceLocator, Scheme, XrootdSource};
use crate::config::StreamConfig;

/// Открывает источник для локатора.
///
/// Таблица диспетчеризации закрыта: `file` и путь без схемы — локальный
/// файл, `http`/`https` — [`HttpSource`], `root`/`xrootd` —
/// [`XrootdSource`]. Повторных попыток на этом уровне нет.
pub fn resolve(
    locator: &ResourceLocator,
    config: &StreamConfig,
    cancel: CancelToken,
) -> HddmResult<AnySource> {
    debug!(locator = %locator, scheme = locator.scheme().as_str(), "Resolving source");

    let source = match locator.scheme() {
        Scheme::File => AnySource::File(FileSource::open(locator.path(), cancel)?),
        Scheme::Http | Scheme::Https => AnySource::Http(HttpSource::open(locator, config, cancel)?),
        Scheme::Root => AnySource::Xrootd(XrootdSource::open(locator, config, cancel)?),
    };
    Ok(source)
}
