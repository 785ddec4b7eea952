fn group_thousands(val: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, val.abs());
    // -0.001 renders as 0.00, not -0.00
    let negative = val < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let (int_part, dec_part) = match fixed.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (fixed.as_str(), None),
    };

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let mut out: String = with_commas.chars().rev().collect();
    if let Some(d) = dec_part {
        out.push('.');
        out.push_str(d);
    }
    if negative {
        out.insert(0, '-');
    }
    out
}

/// Reais with thousands separators: R$ 1,234.56
pub fn money(val: f64) -> String {
    let body = group_thousands(val, 2);
    match body.strip_prefix('-') {
        Some(abs) => format!("-R$ {abs}"),
        None => format!("R$ {body}"),
    }
}

/// Quantity with thousands separators and two decimals: 1,234.50
pub fn quantity(val: f64) -> String {
    group_thousands(val, 2)
}

pub fn percent(share: f64) -> String {
    format!("{:.1}%", share * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "R$ 1,234.56");
        assert_eq!(money(-500.00), "-R$ 500.00");
        assert_eq!(money(0.0), "R$ 0.00");
        assert_eq!(money(1000000.99), "R$ 1,000,000.99");
        assert_eq!(money(-0.001), "R$ 0.00");
    }

    #[test]
    fn test_quantity_and_percent() {
        assert_eq!(quantity(100.5), "100.50");
        assert_eq!(quantity(12345.0), "12,345.00");
        assert_eq!(percent(0.4567), "45.7%");
    }
}
