//! Unit tests for the report sink

use std::sync::{Arc, Mutex};

use core_types::{default_report_callback, MessageType, ReportConfig, ReportSink};

fn sink_with_last_line(level: MessageType) -> (ReportSink, Arc<Mutex<String>>) {
    let last = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&last);
    let sink = ReportSink::new(ReportConfig {
        callback: Some(Arc::new(move |ty: MessageType, msg: &str| {
            *captured.lock().unwrap() = format!("{}: {}", ty.tag(), msg);
        })),
        level,
    });
    (sink, last)
}

#[test]
fn test_report_verbose_level_receives_everything() {
    let (sink, last) = sink_with_last_line(MessageType::Verbose);

    for ty in [
        MessageType::Verbose,
        MessageType::Info,
        MessageType::Warning,
        MessageType::Error,
        MessageType::Fatal,
    ] {
        sink.report(ty, format_args!("message {}", ty.tag()));
        assert_eq!(*last.lock().unwrap(), format!("{}: message {}", ty.tag(), ty.tag()));
    }
}

#[test]
fn test_report_below_level_is_filtered() {
    let (sink, last) = sink_with_last_line(MessageType::Error);

    sink.report(MessageType::Warning, format_args!("filtered"));
    assert_eq!(*last.lock().unwrap(), "");

    sink.report(MessageType::Error, format_args!("kept"));
    assert_eq!(*last.lock().unwrap(), "ERROR: kept");
}

#[test]
fn test_report_level_accessor() {
    let (sink, _) = sink_with_last_line(MessageType::Info);
    assert_eq!(sink.level(), MessageType::Info);
    assert!(sink.accepts(MessageType::Info));
    assert!(!sink.accepts(MessageType::Verbose));
}

#[test]
fn test_default_callback_does_not_exit_on_fatal() {
    default_report_callback(MessageType::Fatal, "still running");
    default_report_callback(MessageType::Info, "after fatal");
}
