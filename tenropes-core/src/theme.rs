//! Channel themes and the derivation of a readable palette from an authored one.
//!
//! Channel owners pick any five colors. Before rendering, the palette is softened
//! (saturation capped) and both text colors are pushed away from the chat
//! background until they reach the WCAG AA ratio for normal text.

pub mod color;

use serde::{Deserialize, Serialize};

pub use color::{Hsl, Rgb};

/// WCAG AA minimum for normal-size text.
pub const MIN_CONTRAST: f64 = 4.5;
/// Saturation ceiling applied to the background and accent colors.
pub const MAX_SATURATION: f64 = 0.75;

const LIGHTNESS_STEP: f64 = 0.05;
const MAX_STEPS: usize = 20;
const SOFTEN_PASSES: usize = 8;

/// A theme as stored on the backend, with no guarantee about readability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredTheme {
    pub primary_color: String,
    pub primary_color_dark: String,
    pub accent_color: String,
    pub text_color: String,
    pub accent_text_color: String,
}

impl Default for AuthoredTheme {
    fn default() -> Self {
        Self {
            primary_color: "#E91E63".to_string(),
            primary_color_dark: "#C2185B".to_string(),
            accent_color: "#00BCD4".to_string(),
            text_color: "#212121".to_string(),
            accent_text_color: "#FFFFFF".to_string(),
        }
    }
}

/// A theme produced by [`normalize`]. Both text colors reach [`MIN_CONTRAST`]
/// against `primary_color_dark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedTheme {
    primary_color: String,
    primary_color_dark: String,
    accent_color: String,
    text_color: String,
    accent_text_color: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastReport {
    /// `text_color` on `primary_color_dark`
    pub text: f64,
    /// `accent_text_color` on `primary_color_dark`
    pub accent_text: f64,
    /// `text_color` on `primary_color`, the input box
    pub input: f64,
}

impl ValidatedTheme {
    /// Input box background.
    pub fn primary_color(&self) -> &str {
        &self.primary_color
    }

    /// Chat area background.
    pub fn primary_color_dark(&self) -> &str {
        &self.primary_color_dark
    }

    pub fn accent_color(&self) -> &str {
        &self.accent_color
    }

    pub fn text_color(&self) -> &str {
        &self.text_color
    }

    pub fn accent_text_color(&self) -> &str {
        &self.accent_text_color
    }

    pub fn contrast_report(&self) -> ContrastReport {
        let background = Rgb::from_hex(&self.primary_color_dark);
        let text = Rgb::from_hex(&self.text_color);

        ContrastReport {
            text: text.contrast(background),
            accent_text: Rgb::from_hex(&self.accent_text_color).contrast(background),
            input: text.contrast(Rgb::from_hex(&self.primary_color)),
        }
    }
}

impl From<&AuthoredTheme> for ValidatedTheme {
    fn from(theme: &AuthoredTheme) -> Self {
        normalize(theme)
    }
}

impl From<ValidatedTheme> for AuthoredTheme {
    fn from(theme: ValidatedTheme) -> Self {
        Self {
            primary_color: theme.primary_color,
            primary_color_dark: theme.primary_color_dark,
            accent_color: theme.accent_color,
            text_color: theme.text_color,
            accent_text_color: theme.accent_text_color,
        }
    }
}

/// Derives the readable palette for `theme`. Pure and deterministic; every
/// output color is canonical upper-case `#RRGGBB`.
pub fn normalize(theme: &AuthoredTheme) -> ValidatedTheme {
    let background = soften(Rgb::from_hex(&theme.primary_color_dark), MAX_SATURATION);
    let mut input = soften(Rgb::from_hex(&theme.primary_color), MAX_SATURATION);
    let accent = soften(Rgb::from_hex(&theme.accent_color), MAX_SATURATION);

    let text = ensure_contrast(background, Rgb::from_hex(&theme.text_color), MIN_CONTRAST);
    let accent_text = ensure_contrast(
        background,
        Rgb::from_hex(&theme.accent_text_color),
        MIN_CONTRAST,
    );

    // text is fixed for the chat area now, so the input box adapts to it instead
    if input.contrast(text) < MIN_CONTRAST {
        input = adjust_lightness(text, input, MIN_CONTRAST, |candidate| {
            soften(candidate, MAX_SATURATION)
        });
    }

    ValidatedTheme {
        primary_color: input.to_hex(),
        primary_color_dark: background.to_hex(),
        accent_color: accent.to_hex(),
        text_color: text.to_hex(),
        accent_text_color: accent_text.to_hex(),
    }
}

/// Caps the HSL saturation of `color`, leaving hue and lightness alone.
///
/// Rounding to 8-bit channels can land slightly above the cap, so the cap is
/// reapplied until the color stops moving. Softening a softened color returns
/// it unchanged.
pub fn soften(color: Rgb, max_saturation: f64) -> Rgb {
    let mut current = color;
    for _ in 0..SOFTEN_PASSES {
        let hsl = current.to_hsl();
        if hsl.s <= max_saturation {
            break;
        }

        let capped = Hsl {
            s: max_saturation,
            ..hsl
        }
        .to_rgb();
        if capped == current {
            break;
        }
        current = capped;
    }
    current
}

/// Returns `foreground`, or a lighter/darker version of it, that reaches `target`
/// contrast against `background`.
///
/// Lightness moves in steps of 0.05 for at most 20 steps, upwards when the
/// background is dark. When the steps run out of range the result is pure white
/// (lightening) or pure black (darkening); if that extreme still misses `target`
/// the other extreme is returned. For a target of 4.5 or less one of the two always
/// qualifies.
pub fn ensure_contrast(background: Rgb, foreground: Rgb, target: f64) -> Rgb {
    adjust_lightness(background, foreground, target, |candidate| candidate)
}

/// The lightness search behind [`ensure_contrast`]; every candidate goes through
/// `shape` before it is measured.
fn adjust_lightness(
    background: Rgb,
    foreground: Rgb,
    target: f64,
    shape: impl Fn(Rgb) -> Rgb,
) -> Rgb {
    if foreground.contrast(background) >= target {
        return foreground;
    }

    let lighten = background.relative_luminance() < 0.5;
    let step = if lighten {
        LIGHTNESS_STEP
    } else {
        -LIGHTNESS_STEP
    };

    let mut hsl = foreground.to_hsl();
    for _ in 0..MAX_STEPS {
        hsl.l += step;
        let candidate = shape(hsl.to_rgb());
        if candidate.contrast(background) >= target {
            return candidate;
        }
        if hsl.l <= 0.0 || hsl.l >= 1.0 {
            break;
        }
    }

    let (preferred, fallback) = if lighten {
        (Rgb::WHITE, Rgb::BLACK)
    } else {
        (Rgb::BLACK, Rgb::WHITE)
    };

    if preferred.contrast(background) >= target {
        preferred
    } else {
        fallback
    }
}
