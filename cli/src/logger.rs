use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

/// Sends every log record at or above `level`, progress included, to stdout.
/// Only the final `error:` line goes to stderr.
pub fn init_log(level: LevelFilter) -> Result<(), String> {
    log4rs::init_config(console_config(level)?).map_err(|e| e.to_string())?;
    update_panic_hook();

    Ok(())
}

fn console_config(level: LevelFilter) -> Result<Config, String> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(PatternEncoder::new("[{h({l})} - {t}] {m}{n}")))
        .build();
    let appender = Appender::builder().build("stdout", Box::new(stdout));

    Config::builder()
        .appender(appender)
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| e.to_string())
}

fn update_panic_hook() {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        hook(info);
    }));
}
