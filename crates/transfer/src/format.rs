use std::time::Duration;

/// Renders a byte count with binary units (`"1.50 GiB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Renders a duration as `"1h 2m 3s"`, `"2m 3s"` or `"3s"`.
///
/// `None` renders as `"--:--"`, for an ETA that is not known yet.
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(d) = duration else {
        return "--:--".into();
    };
    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 / 2), "1.50 GiB");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(None), "--:--");
        assert_eq!(format_duration(Some(Duration::from_secs(5))), "5s");
        assert_eq!(format_duration(Some(Duration::from_secs(125))), "2m 5s");
        assert_eq!(format_duration(Some(Duration::from_secs(3723))), "1h 2m 3s");
    }
}
