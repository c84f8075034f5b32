use ratatui::style::Color;

use super::ThemeName;

/// Colors the task list is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub accent: Color,
    pub muted: Color,
    pub active: Color,
    pub deferred: Color,
    pub error: Color,
}

impl Palette {
    pub fn for_theme(theme: &ThemeName) -> Self {
        match theme {
            ThemeName::Dark => Self {
                accent: Color::Cyan,
                muted: Color::Gray,
                active: Color::Yellow,
                deferred: Color::DarkGray,
                error: Color::Red,
            },
            ThemeName::Light => Self {
                accent: Color::Blue,
                muted: Color::DarkGray,
                active: Color::Magenta,
                deferred: Color::Gray,
                error: Color::Red,
            },
            ThemeName::HighContrast => Self {
                accent: Color::White,
                muted: Color::White,
                active: Color::LightYellow,
                deferred: Color::Gray,
                error: Color::LightRed,
            },
            ThemeName::Solarized => Self {
                accent: Color::Rgb(38, 139, 210),
                muted: Color::Rgb(147, 161, 161),
                active: Color::Rgb(181, 137, 0),
                deferred: Color::Rgb(88, 110, 117),
                error: Color::Rgb(220, 50, 47),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_theme_has_distinct_active_color() {
        for theme in &ThemeName::ALL {
            let palette = Palette::for_theme(theme);
            assert_ne!(palette.active, palette.muted, "{theme:?}");
        }
    }
}
