//! Чтение контейнера поверх HTTP и затем HTTPS.
//!
//! Без аргументов читает тестовый образец GlueX с nod25; иначе каждый
//! аргумент трактуется как локатор.

use hddm_stream::{
    logging::{init_logging, LoggingConfig},
    open, HddmResult, StreamConfig,
};

const SAMPLE: &str = "/Gluex/simulation/simsamples/particle_gun-v5.2.0/particle_gun001_019.hddm";

fn main() -> HddmResult<()> {
    init_logging(&LoggingConfig::from_verbosity(1, false))?;

    let mut locators: Vec<String> = std::env::args().skip(1).collect();
    if locators.is_empty() {
        locators = vec![
            format!("http://nod25.phys.uconn.edu:2880{SAMPLE}"),
            format!("https://nod25.phys.uconn.edu:2843{SAMPLE}"),
        ];
    }

    for (i, locator) in locators.iter().enumerate() {
        let prefix = if i == 0 { "found" } else { "then found" };
        for record in open(locator, StreamConfig::default())? {
            for event in record?.events() {
                println!(
                    "{prefix} run {}, event {}",
                    event.run_number()?,
                    event.event_number()?
                );
            }
        }
    }
    Ok(())
}
