//! hddm-cat
//!
//! Читает один или несколько HDDM-контейнеров (файл, http, https,
//! root/xrootd) и печатает номера ранов и событий.

use std::{
    io::{self, Write},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use hddm_stream::{
    logging::{init_logging, LogFormat, LoggingConfig},
    open_with_retry, RetryPolicy, StreamConfig, StreamSettings,
};
use serde_json::json;
use tracing::{debug, error};

/// Аргументы командной строки.
#[derive(Parser, Debug)]
#[command(name = "hddm-cat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Print events from HDDM containers over file, http(s) and xrootd", long_about = None)]
struct Cli {
    /// Локаторы: путь, file://, http(s)://, root:// или xrootd://
    #[arg(required = true, help = "Локаторы контейнеров")]
    locators: Vec<String>,
    #[arg(long, value_name = "SECS", help = "Таймаут подключения в секундах")]
    connect_timeout: Option<u64>,
    #[arg(long, value_name = "SECS", help = "Таймаут одного чтения в секундах")]
    read_timeout: Option<u64>,
    #[arg(long, value_name = "BYTES", help = "Максимальная длина записи")]
    max_record_length: Option<u32>,
    #[arg(long, value_name = "BYTES", help = "Размер блока удалённого чтения")]
    block_size: Option<usize>,
    #[arg(long, value_name = "N", help = "Глубина упреждающего чтения HTTP")]
    readahead: Option<usize>,
    #[arg(long, help = "Не проверять TLS-сертификаты")]
    insecure: bool,
    #[arg(long, default_value_t = 1, help = "Сколько раз пытаться открыть поток")]
    retries: u32,
    #[arg(long, default_value_t = 0, help = "Пропустить первые N записей")]
    skip: u64,
    #[arg(long, help = "Остановиться после N событий")]
    limit: Option<u64>,
    #[arg(
        long,
        value_enum,
        default_value = "text",
        help = "Формат вывода событий"
    )]
    format: OutputFormat,
    #[arg(long, default_value = "compact", help = "Формат логов: compact, pretty, json")]
    log_format: String,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Подробнее логировать (-v, -vv, -vvv)")]
    verbose: u8,
    #[arg(short, long, help = "Только ошибки в логах")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// `found run R, event E`
    Text,
    /// JSON-объект на событие
    Json,
}

/// Итог по одному локатору.
#[derive(Debug, Default)]
struct Summary {
    records: u64,
    events: u64,
    bytes: u64,
}

fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_verbosity(cli.verbose, cli.quiet);
    match cli.log_format.parse::<LogFormat>() {
        Ok(format) => logging.format = format,
        Err(e) => {
            eprintln!("hddm-cat: {e}");
            std::process::exit(2);
        }
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("hddm-cat: {e}");
    }

    if let Err(e) = run(&cli) {
        error!(error = %e, "hddm-cat failed");
        eprintln!("hddm-cat: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = stream_config(cli)?;
    let policy = RetryPolicy {
        max_attempts: cli.retries.max(1),
        ..RetryPolicy::default()
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut remaining = cli.limit;

    for locator in &cli.locators {
        let summary = cat_one(locator, &config, &policy, cli, &mut out, &mut remaining)
            .with_context(|| format!("reading {locator}"))?;
        writeln!(
            out,
            "{locator}: {} records, {} events, {} bytes",
            summary.records, summary.events, summary.bytes
        )?;
        if remaining == Some(0) {
            break;
        }
    }
    Ok(())
}

/// Настройки из `HDDM_*`, поверх — флаги командной строки.
fn stream_config(cli: &Cli) -> Result<StreamConfig> {
    let mut config = StreamSettings::load()
        .context("loading HDDM_* settings")?
        .into_stream_config()
        .context("invalid HDDM_* settings")?;

    if let Some(secs) = cli.connect_timeout {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.read_timeout {
        config.read_timeout = Duration::from_secs(secs);
    }
    if let Some(n) = cli.max_record_length {
        config.max_record_length = n;
    }
    if let Some(n) = cli.block_size {
        config.block_size = n;
    }
    if let Some(n) = cli.readahead {
        config.readahead = n;
    }
    if cli.insecure {
        config.verify_tls = false;
    }
    config.validate().context("invalid options")?;
    debug!(?config, "Stream configuration");
    Ok(config)
}

fn cat_one(
    locator: &str,
    config: &StreamConfig,
    policy: &RetryPolicy,
    cli: &Cli,
    out: &mut impl Write,
    remaining: &mut Option<u64>,
) -> Result<Summary> {
    let mut stream = open_with_retry(locator, config, policy)?;
    let mut summary = Summary::default();

    if cli.skip > 0 {
        let skipped = stream.skip_records(cli.skip)?;
        debug!(skipped, "Skipped records");
    }

    'records: for record in stream.by_ref() {
        let record = record?;
        summary.records += 1;
        for event in record.events() {
            if *remaining == Some(0) {
                break 'records;
            }
            match cli.format {
                OutputFormat::Text => match (event.run_number(), event.event_number()) {
                    (Ok(run), Ok(number)) => writeln!(out, "found run {run}, event {number}")?,
                    (run, number) => writeln!(
                        out,
                        "found event without numbers (runNo: {}, eventNo: {})",
                        run.map(|v| v.to_string()).unwrap_or_else(|e| e.to_string()),
                        number.map(|v| v.to_string()).unwrap_or_else(|e| e.to_string()),
                    )?,
                },
                OutputFormat::Json => {
                    let line = json!({
                        "record": record.index(),
                        "event": event.to_json(),
                    });
                    writeln!(out, "{line}")?;
                }
            }
            summary.events += 1;
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }
    }

    summary.bytes = stream.bytes_read();
    stream.close()?;
    Ok(summary)
}
