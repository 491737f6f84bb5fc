use crate::catalog::PayloadCatalog;
use thiserror::Error;

/// One argument of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    /// Substitution site. `prefix` and `suffix` are literal text sharing the
    /// same shell word, e.g. `--name=@@` has prefix `--name=`.
    Placeholder {
        name: String,
        prefix: String,
        suffix: String,
    },
}

impl Token {
    pub fn placeholder(name: impl Into<String>) -> Self {
        Token::Placeholder {
            name: name.into(),
            prefix: String::new(),
            suffix: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Token::Placeholder { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unbalanced quoting on line {line_no}")]
    Unparseable { line_no: usize, raw_line: String },
    #[error("Too many variables ({count}) on line {line_no}")]
    TooManyPlaceholders {
        line_no: usize,
        raw_line: String,
        count: usize,
    },
    #[error("No variable on line {line_no}")]
    NoPlaceholder { line_no: usize, raw_line: String },
    /// `raw_line` holds a lossy rendering for display only.
    #[error("Invalid UTF-8 on line {line_no}")]
    InvalidUtf8 { line_no: usize, raw_line: String },
}

impl TemplateError {
    pub fn line_no(&self) -> usize {
        match self {
            TemplateError::Unparseable { line_no, .. }
            | TemplateError::TooManyPlaceholders { line_no, .. }
            | TemplateError::NoPlaceholder { line_no, .. }
            | TemplateError::InvalidUtf8 { line_no, .. } => *line_no,
        }
    }

    pub fn raw_line(&self) -> &str {
        match self {
            TemplateError::Unparseable { raw_line, .. }
            | TemplateError::TooManyPlaceholders { raw_line, .. }
            | TemplateError::NoPlaceholder { raw_line, .. }
            | TemplateError::InvalidUtf8 { raw_line, .. } => raw_line,
        }
    }
}

/// A parsed script line with exactly one substitution site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentTemplate {
    line_no: usize,
    raw_line: String,
    tokens: Vec<Token>,
    placeholder_index: usize,
}

impl ArgumentTemplate {
    /// Builds a template from already split tokens, enforcing the single
    /// placeholder invariant.
    pub fn new(
        line_no: usize,
        raw_line: impl Into<String>,
        tokens: Vec<Token>,
    ) -> Result<Self, TemplateError> {
        let raw_line = raw_line.into();
        let mut sites = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.is_placeholder())
            .map(|(idx, _)| idx);

        let placeholder_index = match (sites.next(), sites.count()) {
            (Some(idx), 0) => idx,
            (None, _) => return Err(TemplateError::NoPlaceholder { line_no, raw_line }),
            (Some(_), rest) => {
                return Err(TemplateError::TooManyPlaceholders {
                    line_no,
                    raw_line,
                    count: rest + 1,
                });
            }
        };

        Ok(Self {
            line_no,
            raw_line,
            tokens,
            placeholder_index,
        })
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }

    pub fn raw_line(&self) -> &str {
        &self.raw_line
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn placeholder_index(&self) -> usize {
        self.placeholder_index
    }

    pub fn placeholder_name(&self) -> &str {
        match &self.tokens[self.placeholder_index] {
            Token::Placeholder { name, .. } => name,
            Token::Literal(_) => unreachable!("placeholder_index always points at a placeholder"),
        }
    }

    /// The argument vector with the substitution site shown verbatim.
    pub fn display_argv(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| match token {
                Token::Literal(text) => text.clone(),
                Token::Placeholder {
                    name,
                    prefix,
                    suffix,
                } => format!("{prefix}{name}{suffix}"),
            })
            .collect()
    }
}

/// Turns one script line into a template.
///
/// Returns `Ok(None)` for blank and comment lines. `executable` becomes
/// argument 0 of every template.
pub fn parse_line(
    line_no: usize,
    raw_line: &str,
    executable: &str,
    catalog: &PayloadCatalog,
) -> Result<Option<ArgumentTemplate>, TemplateError> {
    let raw_line = raw_line.trim_end();
    let content = raw_line.trim_start();
    if content.is_empty() || content.starts_with('#') {
        return Ok(None);
    }

    let words = shlex::split(raw_line).ok_or_else(|| TemplateError::Unparseable {
        line_no,
        raw_line: raw_line.to_string(),
    })?;

    let names: Vec<&str> = catalog.placeholder_names().collect();
    let count: usize = words
        .iter()
        .map(|word| {
            names
                .iter()
                .map(|name| word.matches(name).count())
                .sum::<usize>()
        })
        .sum();

    if count > 1 {
        return Err(TemplateError::TooManyPlaceholders {
            line_no,
            raw_line: raw_line.to_string(),
            count,
        });
    }

    let mut tokens = Vec::with_capacity(words.len() + 1);
    tokens.push(Token::Literal(executable.to_string()));
    tokens.extend(words.into_iter().map(|word| classify(word, &names)));

    ArgumentTemplate::new(line_no, raw_line, tokens).map(Some)
}

fn classify(word: String, names: &[&str]) -> Token {
    for name in names {
        if let Some(start) = word.find(name) {
            let end = start + name.len();
            return Token::Placeholder {
                name: name.to_string(),
                prefix: word[..start].to_string(),
                suffix: word[end..].to_string(),
            };
        }
    }
    Token::Literal(word)
}

/// Parses a whole script, one item per line that is neither blank nor a
/// comment, in file order. Line numbers are 1-based.
pub fn parse_script<'a>(
    script: &'a str,
    executable: &'a str,
    catalog: &'a PayloadCatalog,
) -> impl Iterator<Item = Result<ArgumentTemplate, TemplateError>> + 'a {
    script
        .lines()
        .enumerate()
        .filter_map(move |(idx, line)| parse_line(idx + 1, line, executable, catalog).transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PayloadEntry, PayloadSet};

    fn catalog() -> PayloadCatalog {
        PayloadCatalog::new([
            PayloadSet::new("@@", vec![PayloadEntry::new("a", "A")]),
            PayloadSet::new("@FMT@", vec![PayloadEntry::new("fmt", "%n")]),
        ])
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let catalog = catalog();
        for line in ["", "   ", "\t", "# @@ @@", "   # comment @@"] {
            let parsed = parse_line(1, line, "/bin/prog", &catalog);
            assert_eq!(parsed, Ok(None), "line {line:?} should be skipped");
        }
    }

    #[test]
    fn single_placeholder_line_prepends_executable() {
        let catalog = catalog();
        let template = parse_line(3, "-v @@ --flag", "/bin/prog", &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(template.line_no(), 3);
        assert_eq!(template.raw_line(), "-v @@ --flag");
        assert_eq!(
            template.tokens(),
            &[
                Token::Literal("/bin/prog".into()),
                Token::Literal("-v".into()),
                Token::placeholder("@@"),
                Token::Literal("--flag".into()),
            ]
        );
        assert_eq!(template.placeholder_index(), 2);
        assert_eq!(template.placeholder_name(), "@@");
    }

    #[test]
    fn quoting_keeps_embedded_spaces_intact() {
        let catalog = catalog();
        let template = parse_line(1, r#"--title "hello world" 'a b' @FMT@"#, "p", &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(
            template.display_argv(),
            vec!["p", "--title", "hello world", "a b", "@FMT@"]
        );
    }

    #[test]
    fn embedded_placeholder_keeps_affixes() {
        let catalog = catalog();
        let template = parse_line(1, "--name=@@.txt", "p", &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(
            template.tokens()[1],
            Token::Placeholder {
                name: "@@".into(),
                prefix: "--name=".into(),
                suffix: ".txt".into(),
            }
        );
    }

    #[test]
    fn two_placeholders_are_rejected_with_line_number() {
        let catalog = catalog();
        let err = parse_line(7, "prog --name=@@ --bad=@FMT@", "p", &catalog).unwrap_err();
        assert_eq!(
            err,
            TemplateError::TooManyPlaceholders {
                line_no: 7,
                raw_line: "prog --name=@@ --bad=@FMT@".into(),
                count: 2,
            }
        );
        assert_eq!(err.line_no(), 7);
    }

    #[test]
    fn repeated_placeholder_inside_one_word_is_rejected() {
        let catalog = catalog();
        let err = parse_line(2, "--pair=@@:@@", "p", &catalog).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::TooManyPlaceholders { count: 2, .. }
        ));
    }

    #[test]
    fn line_without_placeholder_is_rejected() {
        let catalog = catalog();
        let err = parse_line(4, "--help", "p", &catalog).unwrap_err();
        assert_eq!(
            err,
            TemplateError::NoPlaceholder {
                line_no: 4,
                raw_line: "--help".into(),
            }
        );
    }

    #[test]
    fn unknown_at_word_is_literal() {
        let catalog = catalog();
        let err = parse_line(1, "user@host", "p", &catalog).unwrap_err();
        assert!(matches!(err, TemplateError::NoPlaceholder { .. }));
    }

    #[test]
    fn unbalanced_quote_is_unparseable() {
        let catalog = catalog();
        let err = parse_line(5, "\"@@", "p", &catalog).unwrap_err();
        assert_eq!(err.line_no(), 5);
        assert!(matches!(err, TemplateError::Unparseable { .. }));
    }

    #[test]
    fn template_constructor_enforces_single_placeholder() {
        let none = ArgumentTemplate::new(1, "x", vec![Token::Literal("x".into())]);
        assert!(matches!(none, Err(TemplateError::NoPlaceholder { .. })));

        let many = ArgumentTemplate::new(
            1,
            "@@ @@",
            vec![Token::placeholder("@@"), Token::placeholder("@@")],
        );
        assert!(matches!(
            many,
            Err(TemplateError::TooManyPlaceholders { count: 2, .. })
        ));
    }

    #[test]
    fn script_parsing_preserves_line_order_and_numbers() {
        let catalog = catalog();
        let script = "# header\n\n-a @@\n@@ @@\n-b @FMT@\n";
        let items: Vec<_> = parse_script(script, "p", &catalog).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().line_no(), 3);
        assert_eq!(items[1].as_ref().unwrap_err().line_no(), 4);
        assert_eq!(items[2].as_ref().unwrap().line_no(), 5);
        assert_eq!(items[2].as_ref().unwrap().placeholder_name(), "@FMT@");
    }
}
