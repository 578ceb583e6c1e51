//! Plain-text rendering of feed lines and theme swatches.

use chrono::{DateTime, Local, NaiveDate};
use owo_colors::OwoColorize;
use tenropes_core::models::{Content, Message, UserMetadata};
use tenropes_core::theme::{AuthoredTheme, MIN_CONTRAST, Rgb, ValidatedTheme};

/// Display name of `username` among `members`, the username itself when unknown.
pub fn author_label<'a>(members: &'a [UserMetadata], username: &'a str) -> &'a str {
    members
        .iter()
        .find(|member| member.username == username)
        .map_or(username, UserMetadata::label)
}

pub fn local_date(message: &Message) -> NaiveDate {
    DateTime::<Local>::from(message.timestamp).date_naive()
}

pub fn message_line(message: &Message, members: &[UserMetadata]) -> String {
    let time = DateTime::<Local>::from(message.timestamp).format("%H:%M");
    let author = author_label(members, &message.author);

    let body = match &message.content {
        Content::Text(text) => text.clone(),
        Content::Image(url) => format!("{} {}", "[image]".cyan(), url.underline()),
    };

    format!("{} {}: {}", time.dimmed(), author.bold(), body)
}

pub fn date_separator(date: NaiveDate) -> String {
    format!("── {} ──", date.format("%A %-d %B %Y"))
        .dimmed()
        .to_string()
}

/// Lines for `messages` given newest first, printed oldest first with a
/// separator wherever the local date changes.
pub fn transcript(messages: &[Message], members: &[UserMetadata]) -> Vec<String> {
    let mut lines = Vec::with_capacity(messages.len());
    let mut current_day = None;

    for message in messages.iter().rev() {
        let day = local_date(message);
        if current_day != Some(day) {
            lines.push(date_separator(day));
            current_day = Some(day);
        }
        lines.push(message_line(message, members));
    }

    lines
}

fn swatch(hex: &str) -> String {
    let Rgb { r, g, b } = Rgb::from_hex(hex);
    format!("{} {hex}", "    ".on_truecolor(r, g, b))
}

fn sample(text_hex: &str, background_hex: &str, label: &str) -> String {
    let text = Rgb::from_hex(text_hex);
    let background = Rgb::from_hex(background_hex);

    format!(" {label} ")
        .truecolor(text.r, text.g, text.b)
        .on_truecolor(background.r, background.g, background.b)
        .to_string()
}

fn ratio(value: f64) -> String {
    let formatted = format!("{value:.2}:1");
    if value >= MIN_CONTRAST {
        formatted.green().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Authored and normalized colors side by side, followed by sample text and the
/// contrast ratios of both palettes.
pub fn theme_report(authored: &AuthoredTheme, validated: &ValidatedTheme) -> Vec<String> {
    let rows = [
        ("primary", &authored.primary_color, validated.primary_color()),
        (
            "primary dark",
            &authored.primary_color_dark,
            validated.primary_color_dark(),
        ),
        ("accent", &authored.accent_color, validated.accent_color()),
        ("text", &authored.text_color, validated.text_color()),
        (
            "accent text",
            &authored.accent_text_color,
            validated.accent_text_color(),
        ),
    ];

    let mut lines: Vec<String> = rows
        .iter()
        .map(|(name, before, after)| {
            format!("{:<13} {}  ->  {}", name, swatch(before), swatch(after))
        })
        .collect();

    let raw_text = Rgb::from_hex(&authored.text_color);
    let raw_background = Rgb::from_hex(&authored.primary_color_dark);
    let after = validated.contrast_report();

    lines.push(String::new());
    lines.push(format!(
        "{}  {}",
        sample(validated.text_color(), validated.primary_color_dark(), "message"),
        sample(
            validated.accent_text_color(),
            validated.primary_color_dark(),
            "mention"
        ),
    ));
    lines.push(format!(
        "text on chat area    {}  ->  {}",
        ratio(raw_text.contrast(raw_background)),
        ratio(after.text)
    ));
    lines.push(format!(
        "accent text          {}  ->  {}",
        ratio(Rgb::from_hex(&authored.accent_text_color).contrast(raw_background)),
        ratio(after.accent_text)
    ));
    lines.push(format!(
        "text in input box    {}  ->  {}",
        ratio(raw_text.contrast(Rgb::from_hex(&authored.primary_color))),
        ratio(after.input)
    ));

    lines
}
