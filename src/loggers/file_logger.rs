use log::{info, LevelFilter};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Routes `log` records to `log/<UTC date>.log`.
pub fn init_file_logger(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let current_date = chrono::offset::Utc::now().date_naive().to_string();
    let path = format!("log/{}.log", current_date);

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)(utc)} {l} - {m}\n",
        )))
        .build(path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(level))?;

    log4rs::init_config(config)?;
    info!("File logger initialized");

    Ok(())
}
