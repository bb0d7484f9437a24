//! Per-document editor settings and the renderer configuration derived from them.
//!
//! Settings are persisted once per document (see `store::SettingsStore`),
//! independently of diagram records. Only the custom theme uses the nine
//! colour fields; built-in themes rely on the renderer's own presets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MIN_FONT_SIZE: u32 = 8;
pub const MAX_FONT_SIZE: u32 = 48;
pub const DEFAULT_FONT_SIZE: u32 = 16;
pub const DEFAULT_FONT_FAMILY: &str = "trebuchet ms, verdana, arial, sans-serif";

/// Renderer variable names of the custom colour fields, in storage order.
pub const COLOR_KEYS: [&str; 9] = [
    "primaryColor",
    "primaryTextColor",
    "primaryBorderColor",
    "lineColor",
    "secondaryColor",
    "tertiaryColor",
    "background",
    "mainBkg",
    "textColor",
];

// =============================================================================
// THEME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Dark,
    Forest,
    Base,
    Custom,
}

impl Theme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Dark => "dark",
            Self::Forest => "forest",
            Self::Base => "base",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown theme: {0}")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "dark" => Ok(Self::Dark),
            "forest" => Ok(Self::Forest),
            "base" => Ok(Self::Base),
            "custom" => Ok(Self::Custom),
            other => Err(UnknownTheme(other.to_string())),
        }
    }
}

// =============================================================================
// COLOURS
// =============================================================================

/// Colour overrides used when the theme is `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColors {
    pub primary_color: String,
    pub primary_text_color: String,
    pub primary_border_color: String,
    pub line_color: String,
    pub secondary_color: String,
    pub tertiary_color: String,
    pub background: String,
    pub main_bkg: String,
    pub text_color: String,
}

impl Default for CustomColors {
    fn default() -> Self {
        Self {
            primary_color: "#ECECFF".into(),
            primary_text_color: "#333333".into(),
            primary_border_color: "#9370DB".into(),
            line_color: "#333333".into(),
            secondary_color: "#FFFFDE".into(),
            tertiary_color: "#F4FFE8".into(),
            background: "#FFFFFF".into(),
            main_bkg: "#ECECFF".into(),
            text_color: "#333333".into(),
        }
    }
}

impl CustomColors {
    /// `(renderer variable, value)` pairs in [`COLOR_KEYS`] order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 9] {
        [
            (COLOR_KEYS[0], self.primary_color.as_str()),
            (COLOR_KEYS[1], self.primary_text_color.as_str()),
            (COLOR_KEYS[2], self.primary_border_color.as_str()),
            (COLOR_KEYS[3], self.line_color.as_str()),
            (COLOR_KEYS[4], self.secondary_color.as_str()),
            (COLOR_KEYS[5], self.tertiary_color.as_str()),
            (COLOR_KEYS[6], self.background.as_str()),
            (COLOR_KEYS[7], self.main_bkg.as_str()),
            (COLOR_KEYS[8], self.text_color.as_str()),
        ]
    }

    /// Set a colour by renderer variable name. Returns `false` for unknown names.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let slot = match key {
            "primaryColor" => &mut self.primary_color,
            "primaryTextColor" => &mut self.primary_text_color,
            "primaryBorderColor" => &mut self.primary_border_color,
            "lineColor" => &mut self.line_color,
            "secondaryColor" => &mut self.secondary_color,
            "tertiaryColor" => &mut self.tertiary_color,
            "background" => &mut self.background,
            "mainBkg" => &mut self.main_bkg,
            "textColor" => &mut self.text_color,
            _ => return false,
        };
        *slot = value.into();
        true
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub font_family: String,
    pub font_size: u32,
    pub colors: CustomColors,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Default,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            colors: CustomColors::default(),
        }
    }
}

impl Settings {
    /// Set the font size, clamped to the supported range.
    pub fn set_font_size(&mut self, size: u32) {
        self.font_size = size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }

    #[must_use]
    pub fn render_config(&self) -> RenderConfig {
        let theme_variables = if self.theme == Theme::Custom {
            self.colors
                .entries()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        } else {
            BTreeMap::new()
        };
        RenderConfig {
            theme: self.theme,
            font_family: self.font_family.clone(),
            font_size: self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE),
            theme_variables,
        }
    }
}

/// Configuration handed to the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    pub theme: Theme,
    pub font_family: String,
    pub font_size: u32,
    /// Colour overrides, populated only for the custom theme.
    pub theme_variables: BTreeMap<String, String>,
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
