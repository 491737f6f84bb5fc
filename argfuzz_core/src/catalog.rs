use std::collections::BTreeMap;

/// Placeholder that expands to every builtin payload.
pub const GENERAL_PLACEHOLDER: &str = "@@";
pub const FORMAT_PLACEHOLDER: &str = "@FMT@";
pub const OVERFLOW_PLACEHOLDER: &str = "@LONG@";
pub const NUMBER_PLACEHOLDER: &str = "@NUM@";
pub const PATH_PLACEHOLDER: &str = "@PATH@";
pub const CHAR_PLACEHOLDER: &str = "@CHAR@";

const OVERFLOW_LENGTHS: &[usize] = &[
    64, 128, 255, 256, 257, 512, 1024, 2048, 4096, 8192, 16384, 65536,
];

const FORMAT_STRINGS: &[(&str, &str)] = &[
    ("fmt-%s", "%s"),
    ("fmt-%s-x16", "%s%s%s%s%s%s%s%s%s%s%s%s%s%s%s%s"),
    ("fmt-%x-x16", "%x%x%x%x%x%x%x%x%x%x%x%x%x%x%x%x"),
    ("fmt-%n", "%n"),
    ("fmt-%n-x8", "%n%n%n%n%n%n%n%n"),
    ("fmt-%p-x8", "%p%p%p%p%p%p%p%p"),
    ("fmt-positional", "%1$s%2$s%3$s%4$s%99$s"),
    ("fmt-wide", "%999999999s"),
    ("fmt-precision", "%.999999999f"),
];

const PATH_STRINGS: &[(&str, &str)] = &[
    ("path-root", "/"),
    ("path-dot", "."),
    ("path-dotdot", ".."),
    ("path-traversal", "../../../../../../../../etc/passwd"),
    ("path-dev-null", "/dev/null"),
    ("path-dev-zero", "/dev/zero"),
    ("path-dev-stdin", "/dev/stdin"),
    ("path-proc-self", "/proc/self/mem"),
    ("path-trailing-slash", "nonexistent/"),
    ("path-many-slashes", "////////////////////////////////"),
    ("path-dash", "-"),
    ("path-double-dash", "--"),
];

const CHAR_STRINGS: &[(&str, &str)] = &[
    ("char-empty", ""),
    ("char-nul", "\0"),
    ("char-space", " "),
    ("char-newline", "\n"),
    ("char-crlf", "\r\n"),
    ("char-tab", "\t"),
    ("char-escape", "\x1b[2J"),
    ("char-del", "\x7f"),
    ("char-backslash", "\\"),
    ("char-quotes", "'\"`"),
    ("char-shell-meta", ";|&$()<>*?[]{}~!#"),
    ("char-subshell", "$(id)`id`"),
    ("char-utf8", "\u{00e9}\u{4e2d}\u{1f600}"),
    ("char-bom", "\u{feff}"),
    ("char-rtl-override", "\u{202e}"),
    ("char-replacement", "\u{fffd}"),
];

/// A single fuzz string plus the tag shown in reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub label: String,
    pub value: String,
}

impl PayloadEntry {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// The ordered payloads substituted for one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSet {
    pub placeholder: String,
    pub entries: Vec<PayloadEntry>,
}

impl PayloadSet {
    pub fn new(placeholder: impl Into<String>, entries: Vec<PayloadEntry>) -> Self {
        Self {
            placeholder: placeholder.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable mapping from placeholder name to its payload set.
///
/// Built once before fuzzing starts and shared by reference with the parser
/// and the expander. Later sets with the same placeholder replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct PayloadCatalog {
    sets: BTreeMap<String, PayloadSet>,
}

impl PayloadCatalog {
    pub fn new(sets: impl IntoIterator<Item = PayloadSet>) -> Self {
        let sets = sets
            .into_iter()
            .filter(|set| !set.placeholder.is_empty())
            .map(|set| (set.placeholder.clone(), set))
            .collect();
        Self { sets }
    }

    /// The catalog compiled into the fuzzer.
    pub fn builtin() -> Self {
        let format = PayloadSet::new(FORMAT_PLACEHOLDER, entries_from(FORMAT_STRINGS));
        let overflow = PayloadSet::new(OVERFLOW_PLACEHOLDER, overflow_entries());
        let numbers = PayloadSet::new(NUMBER_PLACEHOLDER, number_entries());
        let paths = PayloadSet::new(PATH_PLACEHOLDER, entries_from(PATH_STRINGS));
        let chars = PayloadSet::new(CHAR_PLACEHOLDER, entries_from(CHAR_STRINGS));

        let general: Vec<PayloadEntry> = [&format, &overflow, &numbers, &paths, &chars]
            .iter()
            .flat_map(|set| set.entries.iter().cloned())
            .collect();
        let general = PayloadSet::new(GENERAL_PLACEHOLDER, general);

        Self::new([general, format, overflow, numbers, paths, chars])
    }

    pub fn lookup(&self, placeholder: &str) -> Option<&PayloadSet> {
        self.sets.get(placeholder)
    }

    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn sets(&self) -> impl Iterator<Item = &PayloadSet> {
        self.sets.values()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn entries_from(pairs: &[(&str, &str)]) -> Vec<PayloadEntry> {
    pairs
        .iter()
        .map(|(label, value)| PayloadEntry::new(*label, *value))
        .collect()
}

fn overflow_entries() -> Vec<PayloadEntry> {
    OVERFLOW_LENGTHS
        .iter()
        .map(|len| PayloadEntry::new(format!("overflow-{len}"), "A".repeat(*len)))
        .collect()
}

// Integer limits and their off-by-one neighbours, rendered as decimal text.
fn number_entries() -> Vec<PayloadEntry> {
    let integers: &[(&str, i128)] = &[
        ("zero", 0),
        ("minus-one", -1),
        ("i8-max", i8::MAX as i128),
        ("i8-min", i8::MIN as i128),
        ("u8-max", u8::MAX as i128),
        ("u8-max+1", u8::MAX as i128 + 1),
        ("i16-max", i16::MAX as i128),
        ("i16-min", i16::MIN as i128),
        ("u16-max", u16::MAX as i128),
        ("u16-max+1", u16::MAX as i128 + 1),
        ("i32-max", i32::MAX as i128),
        ("i32-max+1", i32::MAX as i128 + 1),
        ("i32-min", i32::MIN as i128),
        ("i32-min-1", i32::MIN as i128 - 1),
        ("u32-max", u32::MAX as i128),
        ("u32-max+1", u32::MAX as i128 + 1),
        ("i64-max", i64::MAX as i128),
        ("i64-min", i64::MIN as i128),
        ("u64-max", u64::MAX as i128),
        ("u64-max+1", u64::MAX as i128 + 1),
    ];

    let mut entries: Vec<PayloadEntry> = integers
        .iter()
        .map(|(name, value)| PayloadEntry::new(format!("num-{name}"), value.to_string()))
        .collect();

    let specials = [
        ("num-hex-max", "0xffffffffffffffff"),
        ("num-octal", "0777777777777777777777"),
        ("num-exponent", "1e308"),
        ("num-exponent-overflow", "1e309"),
        ("num-nan", "NaN"),
        ("num-inf", "inf"),
        ("num-neg-inf", "-inf"),
        ("num-neg-zero", "-0"),
    ];
    entries.extend(entries_from(&specials));
    entries
}
