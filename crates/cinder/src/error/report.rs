//! Miette diagnostic conversion for terminal reporting.

use crate::error::DevError;
use miette::Report;

/// Convert a `DevError` into a miette report.
pub fn dev_error_to_miette(err: DevError) -> Report {
    match err {
        DevError::Config(e) => miette::miette!(
            help = "Run `cinder serve --help` for the available overrides",
            "Configuration error: {}",
            e
        ),
        DevError::Protocol(msg) => miette::miette!(
            help = "The build producer must send a full build before incremental or component updates",
            "Protocol violation: {}",
            msg
        ),
        DevError::Server(msg) => miette::miette!("Development server failed: {}", msg),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_report_keeps_message() {
        let report = dev_error_to_miette(DevError::Protocol("out of order".into()));
        assert!(report.to_string().contains("out of order"));
    }
}
