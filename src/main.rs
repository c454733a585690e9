//! This module defines the main functionality of Tagscope, a live AprilTag viewer.

use tagscope::module; // Import the library modules
use tagscope::module::define; // Import the define module that contains constants and types
use tagscope::module::util::init::resource::init; // Import the resource initialization function

// The main function of Tagscope
pub fn main() {
    if let Err(e) = start() {
        eprintln!("tagscope: {}", e);
        std::process::exit(1);
    }
}

fn start() -> Result<(), Box<dyn std::error::Error>> {
    // Prepare the resources by initializing the property struct
    let property = init()?;

    // Initialize the logging system with the data directory and the system name
    init_log(
        property.path.dir.data.as_str(),
        define::system::NAME,
        &property.conf.system.log_level,
    )?;
    log::info!("Starting Tagscope...");

    // The frame loop is single threaded; the detector and control input run on their own threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(module::drive::run(property));
    Ok(())
}

/// This function initializes the logger system using the log4rs crate.
///
/// # Arguments
/// * `dir` - A string slice that holds the directory where the log file will be stored
/// * `name` - A string slice that holds the name of the logger and the log file
/// * `level` - Root level, e.g. `INFO`; unknown names fall back to `INFO`
///
/// # Log Example
/// ```
/// log::debug!("Debug Message"); // Log a debug message
/// log::info!("Info Message"); // Log an info message
/// log::warn!("Warning Message"); // Log a warning message
/// log::error!("Error Message"); // Log an error message
/// ```
fn init_log(dir: &str, name: &str, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    use tagscope::module::util::path::join; // Import the join function from the path module
    use log::LevelFilter; // Import the LevelFilter enum from the log crate
    use log4rs::append::console::ConsoleAppender; // Console output for the operator
    use log4rs::append::file::FileAppender; // Import the FileAppender struct from the log4rs crate
    use log4rs::config::{Appender, Config, Root}; // Import the Appender, Config, and Root structs from the log4rs crate
    use log4rs::encode::pattern::PatternEncoder; // Import the PatternEncoder struct from the log4rs crate

    let pattern = "{d} - {l}: {m}{n}";
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(join(&[dir, define::path::LOG_DIR, &format!("{}.log", name)]))?;
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(&format!("{{h({})}}", pattern))))
        .target(log4rs::append::console::Target::Stderr)
        .build();

    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(
            Root::builder()
                .appender("logfile")
                .appender("console")
                .build(level),
        )?;
    log4rs::init_config(config)?;
    Ok(())
}
