use std::sync::Once;

static INIT: Once = Once::new();

/// Thin facade over the `log` crate. Creating one installs the
/// `env_logger` backend the first time; `RUST_LOG` overrides the
/// default `info` level.
#[derive(Clone, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        INIT.call_once(|| {
            let _ = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            )
            .format_timestamp_millis()
            .try_init();
        });
        Logger
    }

    pub fn info<S: AsRef<str>>(&self, message: S) {
        log::info!("{}", message.as_ref());
    }

    pub fn debug<S: AsRef<str>>(&self, message: S) {
        log::debug!("{}", message.as_ref());
    }

    pub fn warning<S: AsRef<str>>(&self, message: S) {
        log::warn!("{}", message.as_ref());
    }

    pub fn severe<S: AsRef<str>>(&self, message: S) {
        log::error!("{}", message.as_ref());
    }
}
