use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// A logger that writes one line per record to stderr.
///
/// Records above `level` are dropped in `enabled()`, so a quiet client still
/// reports warnings while a verbose one shows every request and response.
pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Render a record the same way `log()` prints it.
    pub fn format_record(record: &Record) -> String {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("-");
        format!(
            "{} [{}] [{}] {}:{} - {}",
            format_timestamp(),
            record.level(),
            thread_name,
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format_record(record);
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{line}").ok();
    }

    fn flush(&self) {
        std::io::stderr().flush().ok();
    }
}

/// Format current time as YYYY-MM-DDTHH:MM:SS.mmm (UTC)
pub fn format_timestamp() -> String {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();

    let (year, month, day) = civil_from_days((secs / 86400) as i64);
    let time_of_day = secs % 86400;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
        year,
        month,
        day,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
        millis
    )
}

/// Days since the Unix epoch to a civil (year, month, day).
/// Howard Hinnant's days_from_civil inverse.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Install a `ConsoleLogger` as the process logger.
///
/// `verbose` selects Debug, otherwise Info. Only the first call in a process
/// installs a logger; later calls are ignored.
pub fn init_console_logger(verbose: bool) {
    static VERBOSE: ConsoleLogger = ConsoleLogger::new(LevelFilter::Debug);
    static QUIET: ConsoleLogger = ConsoleLogger::new(LevelFilter::Info);

    let logger: &'static ConsoleLogger = if verbose { &VERBOSE } else { &QUIET };
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_from_days_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }

    #[test]
    fn test_civil_from_days_leap_day() {
        // 2000-02-29
        assert_eq!(civil_from_days(11016), (2000, 2, 29));
    }

    #[test]
    fn test_civil_from_days_march_first() {
        // 2024-03-01, the day after a leap day
        assert_eq!(civil_from_days(19783), (2024, 3, 1));
    }

    #[test]
    fn test_format_timestamp_structure() {
        let ts = format_timestamp();
        assert_eq!(ts.len(), 23);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }
}
