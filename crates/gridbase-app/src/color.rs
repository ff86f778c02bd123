// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Accent and select-option colors.

use crate::model::{DEFAULT_BASE_COLOR, Field, SelectOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const NEUTRAL_GRAY: Rgb = Rgb::new(0x6b, 0x72, 0x80);

const DEFAULT_STATUS_PALETTE: [(&str, &str); 3] = [
    ("Backlog", "#f97316"),
    ("In Progress", "#3b82f6"),
    ("Complete", "#10b981"),
];

// Labels that predate per-field option lists still get a stable color.
const WELL_KNOWN_LABELS: [(&str, &str); 7] = [
    ("Backlog", "#f97316"),
    ("In Progress", "#3b82f6"),
    ("Complete", "#10b981"),
    ("Not Started", "#94a3b8"),
    ("Review", "#a855f7"),
    ("Done", "#10b981"),
    ("Blocked", "#ef4444"),
];

const OPTION_CYCLE: [&str; 8] = [
    "#3b82f6", "#10b981", "#f97316", "#a855f7", "#ef4444", "#eab308", "#14b8a6", "#ec4899",
];

pub fn default_palette() -> Vec<SelectOption> {
    DEFAULT_STATUS_PALETTE
        .iter()
        .map(|(label, color)| SelectOption::new(*label, *color))
        .collect()
}

/// Color assigned to the n-th option of a freshly created select field.
pub fn option_color_for_index(index: usize) -> &'static str {
    OPTION_CYCLE[index % OPTION_CYCLE.len()]
}

/// Options offered by a select field: its configured list, or the default
/// status palette when none is configured.
pub fn select_options(field: &Field) -> Vec<SelectOption> {
    match field.configured_options() {
        Some(options) => options.to_vec(),
        None => default_palette(),
    }
}

pub fn resolve_select_color(options: Option<&[SelectOption]>, label: &str) -> Rgb {
    if let Some(color) = options
        .unwrap_or_default()
        .iter()
        .find(|option| option.label == label)
        .and_then(|option| parse_hex(&option.color))
    {
        return color;
    }

    WELL_KNOWN_LABELS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(label))
        .and_then(|(_, hex)| parse_hex(hex))
        .unwrap_or(NEUTRAL_GRAY)
}

pub fn parse_hex(raw: &str) -> Option<Rgb> {
    let digits = raw.trim().strip_prefix('#').unwrap_or(raw.trim());
    if !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    let expanded = match digits.len() {
        3 => digits.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
        6 => digits.to_owned(),
        _ => return None,
    };
    let channel = |index: usize| u8::from_str_radix(&expanded[index..index + 2], 16).ok();
    Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

pub fn normalize_hex(raw: &str) -> String {
    parse_hex(raw)
        .map(Rgb::to_hex)
        .unwrap_or_else(|| DEFAULT_BASE_COLOR.to_owned())
}

fn adjust(raw: &str, percentage: i32) -> Rgb {
    let base = parse_hex(raw).or_else(|| parse_hex(DEFAULT_BASE_COLOR));
    let Some(base) = base else {
        return NEUTRAL_GRAY;
    };
    let amount = (f64::from(percentage) / 100.0 * 255.0).round() as i32;
    let shift = |channel: u8| (i32::from(channel) + amount).clamp(0, 255) as u8;
    Rgb::new(shift(base.r), shift(base.g), shift(base.b))
}

pub fn lighten(raw: &str, percentage: i32) -> Rgb {
    adjust(raw, percentage.abs())
}

pub fn darken(raw: &str, percentage: i32) -> Rgb {
    adjust(raw, -percentage.abs())
}

pub fn gradient_pair(raw: &str) -> (Rgb, Rgb) {
    (lighten(raw, 16), darken(raw, 12))
}

#[cfg(test)]
mod tests {
    use super::{
        NEUTRAL_GRAY, Rgb, darken, gradient_pair, lighten, normalize_hex, parse_hex,
        resolve_select_color,
    };
    use crate::model::SelectOption;

    #[test]
    fn normalize_hex_expands_short_form_and_falls_back() {
        assert_eq!(normalize_hex("#abc"), "#aabbcc");
        assert_eq!(normalize_hex("10B981"), "#10b981");
        assert_eq!(normalize_hex("#12345"), "#2563eb");
        assert_eq!(normalize_hex("#zzzzzz"), "#2563eb");
    }

    #[test]
    fn lighten_and_darken_clamp_channels() {
        assert_eq!(lighten("#ffffff", 20), Rgb::new(255, 255, 255));
        assert_eq!(darken("#000000", 20), Rgb::new(0, 0, 0));
        assert_eq!(lighten("#000000", 10), Rgb::new(26, 26, 26));

        let (light, dark) = gradient_pair("#808080");
        assert_eq!(light, Rgb::new(169, 169, 169));
        assert_eq!(dark, Rgb::new(97, 97, 97));
    }

    #[test]
    fn configured_option_color_wins() {
        let options = vec![SelectOption::new("Backlog", "#111111")];
        assert_eq!(
            resolve_select_color(Some(&options), "Backlog"),
            Rgb::new(0x11, 0x11, 0x11)
        );
    }

    #[test]
    fn well_known_label_falls_back_to_default_palette() {
        let options = vec![SelectOption::new("Other", "#111111")];
        assert_eq!(
            resolve_select_color(Some(&options), "Blocked"),
            parse_hex("#ef4444").expect("palette color parses")
        );
        assert_eq!(
            resolve_select_color(None, "In Progress"),
            parse_hex("#3b82f6").expect("palette color parses")
        );
    }

    #[test]
    fn unknown_label_without_option_is_neutral_gray() {
        assert_eq!(resolve_select_color(None, "Ghost"), NEUTRAL_GRAY);
        let options = vec![SelectOption::new("Ghost", "not-a-color")];
        assert_eq!(resolve_select_color(Some(&options), "Ghost"), NEUTRAL_GRAY);
    }
}
