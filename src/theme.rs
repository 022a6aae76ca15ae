use crate::classify::Tag;
use crate::config::ThemeConfig;

/// Colour for a block, picked from the first tag that has one.
pub fn color_for(theme: &ThemeConfig, tags: &[Tag]) -> [u8; 4] {
    tags.iter()
        .find_map(|tag| match tag {
            Tag::Critical | Tag::Unknown => Some(theme.critical_color),
            Tag::Warning => Some(theme.warning_color),
            Tag::Ac | Tag::Charged => Some(theme.good_color),
            Tag::Charging | Tag::Discharging(_) => None,
        })
        .unwrap_or(theme.fg_color)
}

pub fn prefix_for<'a>(theme: &'a ThemeConfig, tags: &[Tag]) -> Option<&'a str> {
    tags.iter().find_map(|tag| theme.prefix.get(&tag.to_string()).map(String::as_str))
}

/// `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
pub fn hex(color: [u8; 4]) -> String {
    let [r, g, b, a] = color;
    if a == 0xFF {
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    } else {
        format!("#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
    }
}
