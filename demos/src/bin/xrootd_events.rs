//! Чтение контейнера через XRootD с разбором ошибок по кодам.

use hddm_stream::{
    logging::{init_logging, LoggingConfig},
    open_with_retry, HddmResult, RetryPolicy, StatusCode, StreamConfig,
};

const DEFAULT_LOCATOR: &str = "root://nod25.phys.uconn.edu/Gluex/simulation/simsamples/particle_gun-v5.2.0/particle_gun001_019.hddm";

fn main() -> HddmResult<()> {
    init_logging(&LoggingConfig::from_verbosity(1, false))?;

    let locator = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_LOCATOR.to_string());

    let stream = match open_with_retry(&locator, &StreamConfig::default(), &RetryPolicy::default()) {
        Ok(stream) => stream,
        Err(e) if e.is(StatusCode::ConnectFailed) || e.is(StatusCode::Timeout) => {
            eprintln!("server unreachable: {e}");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    for record in stream {
        let record = record?;
        for event in record.events() {
            match (event.run_number(), event.event_number()) {
                (Ok(run), Ok(number)) => println!("found run {run}, event {number}"),
                // Отсутствующее поле не прерывает поток.
                (run, number) => eprintln!("incomplete event: run {run:?}, event {number:?}"),
            }
        }
    }
    Ok(())
}
