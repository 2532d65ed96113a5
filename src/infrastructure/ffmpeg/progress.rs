//! Parsing of FFmpeg's `-progress` key/value output.

/// Turns `-progress` lines into percentages of the source duration.
#[derive(Debug, Clone, Copy)]
pub struct ProgressParser {
    total_duration_ms: u64,
}

impl ProgressParser {
    pub fn new(total_duration_ms: u64) -> Self {
        Self { total_duration_ms }
    }

    /// Returns a percentage for lines that carry one.
    ///
    /// FFmpeg reports `out_time_ms` in microseconds despite the name, so both
    /// `out_time_ms` and `out_time_us` are read as microseconds.
    pub fn parse_line(&self, line: &str) -> Option<u8> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_ms" | "out_time_us" => {
                if self.total_duration_ms == 0 {
                    return None;
                }
                let elapsed_us = value.trim().parse::<u64>().ok()?;
                let elapsed_ms = elapsed_us / 1000;
                if elapsed_ms == 0 {
                    return None;
                }
                let percent = elapsed_ms.saturating_mul(100) / self.total_duration_ms;
                Some(percent.min(100) as u8)
            }
            "progress" if value.trim() == "end" => Some(100),
            _ => None,
        }
    }
}
