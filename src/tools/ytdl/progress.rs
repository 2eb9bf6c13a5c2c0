use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

// [download]   0.7% of ~1.29GiB at 12.10MiB/s ETA 01:48
static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\[download\]\s+(\d+(?:\.\d+)?)%\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*(B|KiB|MiB|GiB|TiB|PiB|EiB|ZiB|YiB)",
        r"\s+at\s+(\d+(?:\.\d+)?)\s*(B|KiB|MiB|GiB|TiB|PiB|EiB|ZiB|YiB)/s",
        r"(?:\s+ETA\s+(\d\d:\d\d:\d\d|\d\d:\d\d))?",
    ))
    .expect("valid progress pattern")
});

const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
    /// Bytes per second.
    pub speed: u64,
    /// Percentage exactly as printed, e.g. `"0.7"`.
    pub percent: String,
    pub eta: Option<Duration>,
}

fn size_to_bytes(raw_size: &str, unit: &str) -> u64 {
    let size: f64 = raw_size.parse().unwrap_or(0.0);
    let multiplier = UNITS
        .iter()
        .position(|u| *u == unit)
        .map(|exp| 1024f64.powi(exp as i32))
        .unwrap_or(0.0);
    (size * multiplier) as u64
}

fn parse_eta(raw: &str) -> Option<Duration> {
    raw.split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|n| acc * 60 + n))
        .map(Duration::from_secs)
}

/// Parse one line of `--newline` download output. Lines that are not
/// progress reports yield `None`.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let caps = PROGRESS_LINE.captures(line)?;

    let percent = caps.get(1)?.as_str();
    let total = size_to_bytes(caps.get(2)?.as_str(), caps.get(3)?.as_str());
    let speed = size_to_bytes(caps.get(4)?.as_str(), caps.get(5)?.as_str());
    let ratio = percent.parse::<f64>().unwrap_or(0.0) / 100.0;

    Some(DownloadProgress {
        downloaded: (total as f64 * ratio) as u64,
        total,
        speed,
        percent: percent.to_string(),
        eta: caps.get(6).and_then(|m| parse_eta(m.as_str())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_pattern_compiles() {
        let pattern = LazyLock::force(&PROGRESS_LINE);
        assert_eq!(pattern.captures_len(), 7);
        assert!(pattern.is_match("[download]   0.7% of ~1.29GiB at 12.10MiB/s ETA 01:48"));
    }

    #[test]
    fn test_size_to_bytes_binary_units() {
        assert_eq!(size_to_bytes("1.29", "GiB"), 1_385_126_952);
        assert_eq!(size_to_bytes("2.61", "MiB"), 2_736_783);
        assert_eq!(size_to_bytes("5.12", "KiB"), 5_242);
        assert_eq!(size_to_bytes("3.00", "B"), 3);
    }

    #[test]
    fn test_size_to_bytes_unknown_unit_is_zero() {
        assert_eq!(size_to_bytes("3.00", "KB"), 0);
    }

    #[test]
    fn test_parse_zero_percent_line() {
        let progress =
            parse_progress_line("[download]   0.0% of 1.29GiB at  2.61MiB/s ETA 08:28").unwrap();
        assert_eq!(progress.downloaded, 0);
        assert_eq!(progress.total, 1_385_126_952);
        assert_eq!(progress.speed, 2_736_783);
        assert_eq!(progress.percent, "0.0");
        assert_eq!(progress.eta, Some(Duration::from_secs(8 * 60 + 28)));
    }

    #[test]
    fn test_parse_partial_download_scales_by_percent() {
        let progress =
            parse_progress_line("[download]   0.7% of 1.29GiB at 12.10MiB/s ETA 01:48").unwrap();
        assert_eq!(progress.downloaded, 9_695_888);
        assert_eq!(progress.total, 1_385_126_952);
        assert_eq!(progress.speed, 12_687_769);
        assert_eq!(progress.percent, "0.7");
    }

    #[test]
    fn test_parse_estimated_size_and_long_eta() {
        let progress =
            parse_progress_line("[download]  50.0% of ~ 10.00MiB at  1.00MiB/s ETA 01:02:03")
                .unwrap();
        assert_eq!(progress.total, 10 * 1024 * 1024);
        assert_eq!(progress.downloaded, 5 * 1024 * 1024);
        assert_eq!(progress.eta, Some(Duration::from_secs(3723)));
    }

    #[test]
    fn test_parse_line_without_eta() {
        let progress = parse_progress_line("[download]  99.9% of 3.00KiB at 1.00KiB/s").unwrap();
        assert_eq!(progress.eta, None);
        assert_eq!(progress.total, 3072);
    }

    #[test]
    fn test_non_progress_lines_are_ignored() {
        assert!(parse_progress_line("[youtube] dQw4w9WgXcQ: Downloading webpage").is_none());
        assert!(parse_progress_line("[download] Destination: 1f.mp4").is_none());
        assert!(parse_progress_line("[download] 100% of 1.29GiB in 00:42").is_none());
        assert!(parse_progress_line("").is_none());
    }
}
