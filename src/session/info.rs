/// Human readable size, one decimal above a kilobyte
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

pub fn format_sample_rate(sample_rate: u32) -> String {
    if sample_rate % 1000 == 0 {
        format!("{} kHz", sample_rate / 1000)
    } else {
        format!("{:.1} kHz", sample_rate as f64 / 1000.0)
    }
}

/// `"<size> · <format> · <sample rate>"`
pub fn information_line(size: u64, format: &str, sample_rate: u32) -> String {
    format!(
        "{} · {} · {}",
        format_size(size),
        format,
        format_sample_rate(sample_rate)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(200_000), "195.3 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_information_line() {
        assert_eq!(
            information_line(200_000, "wav", 44100),
            "195.3 KB · wav · 44.1 kHz"
        );
        assert_eq!(information_line(100, "m4a", 8000), "100 B · m4a · 8 kHz");
    }
}
