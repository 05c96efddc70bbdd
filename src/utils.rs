use chrono::NaiveDate;

/// First day of the month; `None` when the month is outside 1-12.
pub fn period_anchor(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Chart label in the `Mar '24` style.
pub fn chart_label(date: NaiveDate) -> String {
    date.format("%b '%y").to_string()
}

/// Last two digits of a year, e.g. `"24"` for 2024.
pub fn short_year(year: i32) -> String {
    let s = year.to_string();
    s[s.len().saturating_sub(2)..].to_string()
}

/// December trend label, e.g. `Des'24`.
pub fn december_label(year: i32) -> String {
    format!("Des'{}", short_year(year))
}

pub fn is_valid_year(year: i64) -> bool {
    (1000..=9999).contains(&year)
}

/// Extracts the first run of exactly four ASCII digits, e.g. `2023` from
/// `"Tahun 2023"` or `"2023.0"`. Longer runs such as `20241` are not years.
pub fn extract_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                return text[start..i].parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Percentage share, 0 when the total is zero.
pub fn share_pct(part: f64, total: f64) -> f64 {
    if total != 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Rounds for chart payloads (`round(2)` in the presentation contract).
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

/// Keeps the last `n` entries of a label/value pair.
pub fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

/// `"BANK UMUM syariah"` → `"Bank Umum Syariah"`.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_anchor() {
        assert_eq!(
            period_anchor(2024, 3),
            Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(period_anchor(2024, 13), None);
    }

    #[test]
    fn test_labels() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(chart_label(date), "Mar '24");
        assert_eq!(december_label(2023), "Des'23");
        assert_eq!(short_year(2005), "05");
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("Tahun 2023"), Some(2023));
        assert_eq!(extract_year("2024.0"), Some(2024));
        assert_eq!(extract_year("20240"), None);
        assert_eq!(extract_year("No. 123456, Posisi Tahun 2024"), Some(2024));
        assert_eq!(extract_year("Unnamed: 3_level_1"), None);
        assert_eq!(extract_year(""), None);
    }

    #[test]
    fn test_share_and_tail() {
        assert_eq!(share_pct(25.0, 100.0), 25.0);
        assert_eq!(share_pct(25.0, 0.0), 0.0);
        assert_eq!(tail(&[1, 2, 3, 4], 3), vec![2, 3, 4]);
        assert_eq!(tail(&[1], 3), vec![1]);
        assert_eq!(round_to(1.23456, 2), 1.23);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("BANK  UMUM syariah"), "Bank Umum Syariah");
        assert_eq!(title_case(""), "");
    }
}
