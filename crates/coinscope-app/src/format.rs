// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

const NOT_AVAILABLE: &str = "n/a";

/// USD with thousands separators. Sub-dollar prices keep up to six fraction
/// digits so small-cap coins stay readable.
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_owned();
    }

    let magnitude = value.abs();
    let max_digits = if magnitude < 1.0 { 6 } else { 2 };
    let fixed = format!("{magnitude:.max_digits$}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut frac = frac_part.to_owned();
    while frac.len() > 2 && frac.ends_with('0') {
        frac.pop();
    }

    let rounds_to_zero = fixed.chars().all(|ch| ch == '0' || ch == '.');
    let sign = if value < 0.0 && !rounds_to_zero {
        "-"
    } else {
        ""
    };
    format!("{sign}${}.{frac}", group_thousands(int_part))
}

pub fn format_percentage(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_owned();
    }
    if value > 0.0 {
        format!("+{value:.2}%")
    } else {
        format!("{value:.2}%")
    }
}

/// Short form for large totals such as market cap and volume.
pub fn format_compact_usd(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_owned();
    }

    let magnitude = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    let (scaled, suffix) = if magnitude >= 1e12 {
        (magnitude / 1e12, "T")
    } else if magnitude >= 1e9 {
        (magnitude / 1e9, "B")
    } else if magnitude >= 1e6 {
        (magnitude / 1e6, "M")
    } else if magnitude >= 1e3 {
        (magnitude / 1e3, "K")
    } else {
        return format_currency(value);
    };
    format!("{sign}${scaled:.2}{suffix}")
}

pub fn format_optional_currency(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_owned(), format_currency)
}

pub fn format_optional_percentage(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_owned(), format_percentage)
}

/// Scales a price series onto 0..=100.
///
/// Non-finite points are dropped. A series with fewer than two points, or with
/// no movement at all, is drawn as a flat line at 50.
pub fn normalize_sparkline(prices: &[f64]) -> Vec<f64> {
    let valid: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if valid.len() < 2 {
        return vec![50.0; valid.len()];
    }

    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range == 0.0 {
        return vec![50.0; valid.len()];
    }

    valid
        .into_iter()
        .map(|price| (price - min) / range * 100.0)
        .collect()
}

/// First sentence of a free-text description, with its closing period.
pub fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match trimmed.split_once('.') {
        Some((head, _)) => format!("{}.", head.trim()),
        None => format!("{trimmed}."),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        first_sentence, format_compact_usd, format_currency, format_percentage,
        normalize_sparkline,
    };

    #[test]
    fn currency_groups_thousands_with_two_digits() {
        assert_eq!(format_currency(64_250.5), "$64,250.50");
        assert_eq!(format_currency(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_currency(1.0), "$1.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
    }

    #[test]
    fn currency_keeps_precision_below_one_dollar() {
        assert_eq!(format_currency(0.123456), "$0.123456");
        assert_eq!(format_currency(0.5), "$0.50");
        assert_eq!(format_currency(0.0001234), "$0.000123");
        assert_eq!(format_currency(0.0), "$0.00");
    }

    #[test]
    fn currency_handles_negative_and_non_finite() {
        assert_eq!(format_currency(-12.5), "-$12.50");
        assert_eq!(format_currency(f64::NAN), "n/a");
    }

    #[test]
    fn percentage_signs_positive_values_only() {
        assert_eq!(format_percentage(2.345), "+2.35%");
        assert_eq!(format_percentage(-1.5), "-1.50%");
        assert_eq!(format_percentage(0.0), "0.00%");
    }

    #[test]
    fn compact_usd_picks_a_suffix() {
        assert_eq!(format_compact_usd(1.27e12), "$1.27T");
        assert_eq!(format_compact_usd(45_600_000_000.0), "$45.60B");
        assert_eq!(format_compact_usd(3_200_000.0), "$3.20M");
        assert_eq!(format_compact_usd(950.0), "$950.00");
    }

    #[test]
    fn sparkline_scales_to_percent_range() {
        assert_eq!(
            normalize_sparkline(&[10.0, 15.0, 20.0]),
            vec![0.0, 50.0, 100.0]
        );
    }

    #[test]
    fn sparkline_flat_or_short_series_sits_in_the_middle() {
        assert_eq!(normalize_sparkline(&[]), Vec::<f64>::new());
        assert_eq!(normalize_sparkline(&[3.0]), vec![50.0]);
        assert_eq!(normalize_sparkline(&[7.0, 7.0, 7.0]), vec![50.0; 3]);
    }

    #[test]
    fn sparkline_drops_non_finite_points() {
        assert_eq!(
            normalize_sparkline(&[1.0, f64::NAN, 3.0, f64::INFINITY]),
            vec![0.0, 100.0]
        );
    }

    #[test]
    fn first_sentence_cuts_at_period() {
        assert_eq!(
            first_sentence("Bitcoin is the first cryptocurrency. It was created in 2009."),
            "Bitcoin is the first cryptocurrency."
        );
        assert_eq!(first_sentence("No period here"), "No period here.");
        assert_eq!(first_sentence("   "), "");
    }
}
