use crate::catalog::{PayloadCatalog, PayloadEntry};
use crate::template::{ArgumentTemplate, Token};
use std::iter::FusedIterator;
use std::slice;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("Unknown variable '{name}' on line {line_no}")]
    UnknownPlaceholder { name: String, line_no: usize },
}

/// One concrete invocation of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCase {
    pub argv: Vec<String>,
    pub payload_label: String,
}

/// Lazy sequence of cases for one template, in payload set order.
///
/// A clone resumes from the same position; call [`expand`] again to restart.
#[derive(Debug, Clone)]
pub struct Expansion<'a> {
    template: &'a ArgumentTemplate,
    entries: slice::Iter<'a, PayloadEntry>,
}

impl<'a> Expansion<'a> {
    pub fn template(&self) -> &'a ArgumentTemplate {
        self.template
    }

    fn build(&self, entry: &PayloadEntry) -> ExpandedCase {
        let argv = self
            .template
            .tokens()
            .iter()
            .map(|token| match token {
                Token::Literal(text) => text.clone(),
                Token::Placeholder { prefix, suffix, .. } => {
                    let mut arg =
                        String::with_capacity(prefix.len() + entry.value.len() + suffix.len());
                    arg.push_str(prefix);
                    arg.push_str(&entry.value);
                    arg.push_str(suffix);
                    arg
                }
            })
            .collect();

        ExpandedCase {
            argv,
            payload_label: entry.label.clone(),
        }
    }
}

impl Iterator for Expansion<'_> {
    type Item = ExpandedCase;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        Some(self.build(entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Expansion<'_> {}
impl FusedIterator for Expansion<'_> {}

/// Resolves the template's placeholder against the catalog.
pub fn expand<'a>(
    template: &'a ArgumentTemplate,
    catalog: &'a PayloadCatalog,
) -> Result<Expansion<'a>, ExpandError> {
    let name = template.placeholder_name();
    let set = catalog
        .lookup(name)
        .ok_or_else(|| ExpandError::UnknownPlaceholder {
            name: name.to_string(),
            line_no: template.line_no(),
        })?;

    Ok(Expansion {
        template,
        entries: set.entries.iter(),
    })
}
