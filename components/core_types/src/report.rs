//! Host-facing diagnostic sink.
//!
//! Every reported message is mirrored to the `log` facade. The host
//! callback additionally receives the messages at or above its level.

use std::fmt;
use std::sync::Arc;

/// Severity of a reported message, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MessageType {
    /// Detailed tracing
    Verbose,
    /// Informational
    #[default]
    Info,
    /// Something unexpected but survivable
    Warning,
    /// A failed operation
    Error,
    /// A failure the host may consider terminal
    Fatal,
}

impl MessageType {
    fn log_level(self) -> log::Level {
        match self {
            MessageType::Verbose => log::Level::Trace,
            MessageType::Info => log::Level::Info,
            MessageType::Warning => log::Level::Warn,
            MessageType::Error | MessageType::Fatal => log::Level::Error,
        }
    }

    /// Upper-case tag used by the default callback.
    pub fn tag(self) -> &'static str {
        match self {
            MessageType::Verbose => "VERBOSE",
            MessageType::Info => "INFO",
            MessageType::Warning => "WARNING",
            MessageType::Error => "ERROR",
            MessageType::Fatal => "FATAL",
        }
    }
}

/// Host message callback. User data is whatever the closure captures.
pub type ReportCallback = Arc<dyn Fn(MessageType, &str) + Send + Sync>;

/// Callback plus minimum level, as supplied by the host.
#[derive(Clone, Default)]
pub struct ReportConfig {
    /// Receives filtered messages; `None` discards them after logging
    pub callback: Option<ReportCallback>,
    /// Messages below this level skip the callback
    pub level: MessageType,
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .field("level", &self.level)
            .finish()
    }
}

/// Routes runtime diagnostics to the host.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use core_types::{MessageType, ReportConfig, ReportSink};
///
/// let last = Arc::new(Mutex::new(String::new()));
/// let captured = Arc::clone(&last);
/// let sink = ReportSink::new(ReportConfig {
///     callback: Some(Arc::new(move |_, msg: &str| *captured.lock().unwrap() = msg.to_string())),
///     level: MessageType::Warning,
/// });
///
/// sink.report(MessageType::Info, format_args!("ignored"));
/// sink.report(MessageType::Error, format_args!("code {}", 7));
/// assert_eq!(*last.lock().unwrap(), "code 7");
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReportSink {
    config: ReportConfig,
}

impl ReportSink {
    /// Creates a sink from host configuration.
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Minimum level delivered to the callback.
    pub fn level(&self) -> MessageType {
        self.config.level
    }

    /// Whether a message of this type reaches the callback.
    pub fn accepts(&self, message_type: MessageType) -> bool {
        self.config.callback.is_some() && message_type >= self.config.level
    }

    /// Formats and delivers one message.
    pub fn report(&self, message_type: MessageType, args: fmt::Arguments<'_>) {
        log::log!(target: "harlequin", message_type.log_level(), "{}", args);

        if !self.accepts(message_type) {
            return;
        }
        if let Some(callback) = &self.config.callback {
            let message = args.to_string();
            callback(message_type, &message);
        }
    }
}

/// Prints informational messages to stdout and the rest to stderr.
///
/// Unlike some host shells, this never terminates the process on `Fatal`.
pub fn default_report_callback(message_type: MessageType, message: &str) {
    match message_type {
        MessageType::Verbose | MessageType::Info => {
            println!("[{}] {}", message_type.tag(), message)
        }
        MessageType::Warning | MessageType::Error | MessageType::Fatal => {
            eprintln!("[{}] {}", message_type.tag(), message)
        }
    }
}
