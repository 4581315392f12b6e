use domectl::config::DomeConfig;
use domectl::dome::Dome;
use domectl::logger::logger_init;
use domectl::simulator::{DomeSimulator, SimHardware};

use std::error::Error;

use tokio::time::{sleep, Duration};

/// Run a calibrate-then-goto session against the simulated hardware and
/// print the resulting dome status.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logger_init(log::LevelFilter::Info, None)?;

    let config = match std::env::args().nth(1) {
        Some(path) => DomeConfig::load(path)?,
        None => DomeConfig::default(),
    };

    let sim = SimHardware::new();
    let dome = Dome::new(&config, sim.hardware());
    let _simulator = DomeSimulator::start(&sim, 24, Duration::from_millis(110), 7);

    dome.calibrate(2);
    while dome.movement_active() {
        sleep(Duration::from_millis(500)).await;
    }

    dome.goto_az(120.0);
    while dome.movement_active() {
        sleep(Duration::from_millis(500)).await;
    }

    print!("{}", dome.status().as_string());

    Ok(())
}
