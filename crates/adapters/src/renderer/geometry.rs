//! Length-string parsing
//!
//! Labels carry CSS-dialect lengths ("2in", "50mm"). Chrome's PDF options
//! want inches; anything unparseable is left to the document's own
//! `@page` rule via `prefer_css_page_size`.

/// Convert a CSS length string to inches. Bare numbers are read as inches.
pub fn length_to_inches(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);
    let value: f64 = value.trim().parse().ok()?;
    let scaled = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "in" => value,
        "mm" => value / 25.4,
        "cm" => value / 2.54,
        "px" => value / 96.0,
        "pt" => value / 72.0,
        _ => return None,
    };
    if scaled.is_finite() && scaled >= 0.0 {
        Some(scaled)
    } else {
        None
    }
}
