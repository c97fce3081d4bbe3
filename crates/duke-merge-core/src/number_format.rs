//! Number format classification
//!
//! Cell values in the file are plain numbers; only the number format tells a
//! date from an amount. This module decides which of the two a format is.

/// Number format attached to a cell style
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NumberFormat {
    /// General format (default)
    #[default]
    General,

    /// Built-in format by ID
    BuiltIn(u32),

    /// Custom format string
    Custom(String),
}

/// How a number carrying a given format should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// A plain number
    Number,
    /// A calendar date, possibly with a time part
    DateTime,
    /// A time of day without a date
    Time,
}

impl NumberFormat {
    /// 14 - mm-dd-yy
    pub const ID_DATE_SHORT: u32 = 14;
    /// 21 - h:mm:ss
    pub const ID_TIME_24H_SEC: u32 = 21;
    /// 22 - m/d/yy h:mm
    pub const ID_DATETIME: u32 = 22;

    /// Build the format for a `numFmtId`, looking up custom codes first
    pub fn from_id_or_code(id: u32, code: Option<&str>) -> Self {
        match code {
            Some(code) => NumberFormat::Custom(code.to_string()),
            None if id == 0 => NumberFormat::General,
            None => NumberFormat::BuiltIn(id),
        }
    }

    /// Classify the format
    pub fn kind(&self) -> FormatKind {
        match self {
            NumberFormat::General => FormatKind::Number,
            NumberFormat::BuiltIn(id) => match id {
                14..=17 | 22 | 27..=31 | 36 | 50..=58 => FormatKind::DateTime,
                18..=21 | 32..=35 | 45..=47 => FormatKind::Time,
                _ => FormatKind::Number,
            },
            NumberFormat::Custom(code) => classify_code(code),
        }
    }

    /// Check if this is a date or time format
    pub fn is_date_format(&self) -> bool {
        self.kind() != FormatKind::Number
    }
}

/// Classify a custom format code by the date/time tokens left once quoted
/// literals, escapes, and bracketed sections (colors, locales) are removed.
fn classify_code(code: &str) -> FormatKind {
    // Only the first section (positive numbers) decides
    let section = code.split(';').next().unwrap_or_default();

    let mut stripped = String::with_capacity(section.len());
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                // Elapsed time markers like [h] or [mm] still count
                if inner.chars().all(|x| matches!(x, 'h' | 'H' | 'm' | 'M' | 's' | 'S')) {
                    stripped.push_str(&inner);
                }
            }
            _ => stripped.push(c.to_ascii_lowercase()),
        }
    }

    let has_date = stripped.contains('y') || stripped.contains('d');
    let has_time = stripped.contains('h') || stripped.contains('s');

    if has_date {
        FormatKind::DateTime
    } else if has_time {
        FormatKind::Time
    } else if stripped.contains('m') && !stripped.contains('0') && !stripped.contains('#') {
        // A lone "mmm" or "mmmm yy"-style month format
        FormatKind::DateTime
    } else {
        FormatKind::Number
    }
}
