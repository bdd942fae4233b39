/// Decodes a fixed-width `HH:MM:SS` string into total seconds.
pub fn parse_duration(text: &str) -> u64 {
    let bytes = text.as_bytes();
    if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
        return 0;
    }

    let field = |start: usize| -> Option<u64> {
        let (hi, lo) = (bytes[start], bytes[start + 1]);
        if hi.is_ascii_digit() && lo.is_ascii_digit() {
            Some(u64::from(hi - b'0') * 10 + u64::from(lo - b'0'))
        } else {
            None
        }
    };

    match (field(0), field(3), field(6)) {
        (Some(hours), Some(minutes), Some(seconds)) => hours * 3600 + minutes * 60 + seconds,
        _ => 0,
    }
}

/// Encodes seconds as `HH:MM:SS`. Negative and non-finite input formats as
/// `00:00:00`; hours widen past two digits instead of wrapping.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00:00".to_string();
    }

    let total = seconds.floor() as u64;
    format_seconds(total)
}

fn format_seconds(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_durations() {
        assert_eq!(parse_duration("00:00:00"), 0);
        assert_eq!(parse_duration("00:10:00"), 600);
        assert_eq!(parse_duration("01:02:03"), 3723);
        assert_eq!(parse_duration("99:59:59"), 99 * 3600 + 59 * 60 + 59);
    }

    #[test]
    fn malformed_durations_decode_to_zero() {
        for value in [
            "",
            "abc",
            "1:02:03",
            "01:02",
            "01-02-03",
            "01:02:03 ",
            "aa:bb:cc",
            "001:02:03",
        ] {
            assert_eq!(parse_duration(value), 0, "{value:?}");
        }
    }

    #[test]
    fn non_ascii_input_does_not_panic() {
        assert_eq!(parse_duration("0é:00:0"), 0);
        assert_eq!(parse_duration("ção:00:"), 0);
    }

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(3723.0), "01:02:03");
        assert_eq!(format_duration(59.9), "00:00:59");
        assert_eq!(format_seconds(600), "00:10:00");
    }

    #[test]
    fn negative_and_non_finite_format_as_zero() {
        assert_eq!(format_duration(-1.0), "00:00:00");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
        assert_eq!(format_duration(f64::INFINITY), "00:00:00");
    }

    #[test]
    fn format_then_parse_is_identity_within_two_digit_hours() {
        for seconds in [0u64, 1, 59, 60, 3599, 3600, 86_399, 359_999] {
            assert_eq!(parse_duration(&format_seconds(seconds)), seconds);
        }
    }
}
