/// Formats an optional f64 to 4 decimal places, or "—" when absent or non-finite.
///
/// Used for metric averages and rates in text output.
pub fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.4}"),
        _ => "—".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(Some(0.7)), "0.7000");
        assert_eq!(fmt_opt(None), "—");
        assert_eq!(fmt_opt(Some(f64::NAN)), "—");
    }
}
