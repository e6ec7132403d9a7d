//! Decodes terminal escape codes in raw output into styled text segments.
//!
//! Build and runtime logs arrive with ANSI SGR sequences embedded (cargo,
//! docker, and most CI tools color their output). The decoder walks the text
//! once, keeps a running style accumulator, and emits a segment every time
//! the accumulated style changes. Sequences that do not set a style (cursor
//! movement, screen clears, OSC title writes) are stripped without producing
//! text.

const ESC: char = '\u{1b}';

/// The 16 palette colors produced by SGR codes 30-37/90-97 and their
/// 40-47/100-107 background forms.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl AnsiColor {
    fn from_palette(index: u16, bright: bool) -> Option<Self> {
        const STANDARD: [AnsiColor; 8] = [
            AnsiColor::Black,
            AnsiColor::Red,
            AnsiColor::Green,
            AnsiColor::Yellow,
            AnsiColor::Blue,
            AnsiColor::Magenta,
            AnsiColor::Cyan,
            AnsiColor::White,
        ];
        const BRIGHT: [AnsiColor; 8] = [
            AnsiColor::BrightBlack,
            AnsiColor::BrightRed,
            AnsiColor::BrightGreen,
            AnsiColor::BrightYellow,
            AnsiColor::BrightBlue,
            AnsiColor::BrightMagenta,
            AnsiColor::BrightCyan,
            AnsiColor::BrightWhite,
        ];
        let table = if bright { &BRIGHT } else { &STANDARD };
        table.get(usize::from(index)).copied()
    }
}

/// Text attributes accumulated from SGR sequences.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextStyle {
    pub foreground: Option<AnsiColor>,
    pub background: Option<AnsiColor>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextStyle {
    /// Whether every attribute is at its default.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// A run of text sharing one style.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    pub text: String,
    pub style: TextStyle,
}

/// Decodes `raw` into ordered styled segments.
///
/// Pure and deterministic: the same input always yields the same segments,
/// and no state is carried across calls. Input without escape sequences
/// becomes a single unstyled segment; empty input yields no segments.
pub fn decode(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut style = TextStyle::default();
    let mut buffer = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ESC {
            buffer.push(c);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                let mut params = String::new();
                for ch in chars.by_ref() {
                    if ch.is_ascii_alphabetic() {
                        if ch == 'm' {
                            let mut next = style;
                            apply_sgr(&params, &mut next);
                            if next != style {
                                flush(&mut segments, &mut buffer, style);
                                style = next;
                            }
                        }
                        break;
                    }
                    params.push(ch);
                }
            }
            Some(']') => {
                chars.next();
                skip_osc(&mut chars);
            }
            Some('(' | ')') => {
                chars.next();
                chars.next();
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }

    flush(&mut segments, &mut buffer, style);
    segments
}

fn flush(segments: &mut Vec<Segment>, buffer: &mut String, style: TextStyle) {
    if buffer.is_empty() {
        return;
    }
    segments.push(Segment {
        text: std::mem::take(buffer),
        style,
    });
}

/// Consumes an OSC body up to its BEL or `ESC \` terminator.
fn skip_osc(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while let Some(ch) = chars.next() {
        if ch == '\u{7}' {
            return;
        }
        if ch == ESC && chars.peek() == Some(&'\\') {
            chars.next();
            return;
        }
    }
}

fn apply_sgr(params: &str, style: &mut TextStyle) {
    // `ESC[m` is shorthand for a full reset.
    if params.is_empty() {
        *style = TextStyle::default();
        return;
    }
    let codes: Vec<u16> = params
        .split(';')
        .map(|part| if part.is_empty() { Ok(0) } else { part.parse() })
        .filter_map(Result::ok)
        .collect();

    let mut i = 0;
    while i < codes.len() {
        match codes[i] {
            0 => *style = TextStyle::default(),
            1 => style.bold = true,
            2 => style.dim = true,
            3 => style.italic = true,
            4 => style.underline = true,
            22 => {
                style.bold = false;
                style.dim = false;
            }
            23 => style.italic = false,
            24 => style.underline = false,
            30..=37 => style.foreground = AnsiColor::from_palette(codes[i] - 30, false),
            38 => i += extended_color_args(&codes[i + 1..]),
            39 => style.foreground = None,
            40..=47 => style.background = AnsiColor::from_palette(codes[i] - 40, false),
            48 => i += extended_color_args(&codes[i + 1..]),
            49 => style.background = None,
            90..=97 => style.foreground = AnsiColor::from_palette(codes[i] - 90, true),
            100..=107 => style.background = AnsiColor::from_palette(codes[i] - 100, true),
            _ => {}
        }
        i += 1;
    }
}

/// Number of argument codes a 38/48 extended-color introducer carries.
///
/// The 256-color (`5;n`) and truecolor (`2;r;g;b`) forms are not rendered,
/// but their arguments must be consumed so they are not misread as
/// standalone codes.
fn extended_color_args(rest: &[u16]) -> usize {
    match rest.first() {
        Some(5) => 2,
        Some(2) => 4,
        _ => 0,
    }
}
