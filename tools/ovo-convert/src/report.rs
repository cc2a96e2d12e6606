//! Non-fatal conversion warnings.
//!
//! Every clamp, substitution or skip is recorded here. Nothing is dropped
//! silently.

use ovo_common::PackingIssue;
use ovo_common::formats::NONE_PLACEHOLDER;

use crate::scene::NodeKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A value was clamped or replaced to fit its encoding.
    Precision { context: String, detail: String },
    /// A texture source could not be loaded; a placeholder was written.
    TextureResolution { path: String, reason: String },
    /// A well-formed chunk of an unknown kind was preserved unread.
    UnknownChunk { code: u16, offset: u64, length: usize },
    /// A node was renamed to keep sibling names unique.
    NameDisambiguated {
        index: u32,
        original: String,
        renamed: String,
    },
    /// A node's payload was excluded by configuration.
    PayloadExcluded { node: String, kind: NodeKind },
    /// An unsupported sub-kind was skipped instead of failing.
    UnsupportedSkipped {
        what: String,
        detail: String,
        offset: u64,
    },
    /// A name or path was changed so it reads back as written.
    NameSanitized {
        context: String,
        original: String,
        written: String,
    },
    /// LOD generation stopped before the requested number of levels.
    LodChainTruncated {
        node: String,
        requested: u32,
        produced: u32,
    },
}

impl Warning {
    pub fn precision(context: impl Into<String>, issue: &PackingIssue) -> Self {
        let component = match issue.component {
            Some(c) => format!("[{c}]"),
            None => String::new(),
        };
        Warning::Precision {
            context: context.into(),
            detail: format!(
                "{}{} {} replaced with {}",
                issue.attribute, component, issue.value, issue.replaced_with
            ),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::Precision { context, detail } => write!(f, "{context}: precision loss: {detail}"),
            Warning::TextureResolution { path, reason } => {
                write!(f, "texture '{path}' unresolved ({reason}), placeholder written")
            }
            Warning::UnknownChunk {
                code,
                offset,
                length,
            } => write!(f, "unknown chunk kind {code} at byte {offset} ({length} bytes) preserved"),
            Warning::NameDisambiguated {
                index,
                original,
                renamed,
            } => write!(f, "node {index}: '{original}' renamed to '{renamed}'"),
            Warning::PayloadExcluded { node, kind } => {
                write!(f, "'{node}': {kind:?} payload excluded, written as empty node")
            }
            Warning::UnsupportedSkipped {
                what,
                detail,
                offset,
            } => write!(f, "{what} at byte {offset} skipped: {detail}"),
            Warning::NameSanitized {
                context,
                original,
                written,
            } => write!(f, "{context}: {original:?} written as {written:?}"),
            Warning::LodChainTruncated {
                node,
                requested,
                produced,
            } => write!(f, "'{node}': {produced} of {requested} LOD levels generated"),
        }
    }
}

/// Warnings accumulated during one export or import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub warnings: Vec<Warning>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning.
    pub fn push(&mut self, warning: Warning) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Append warnings that were already logged elsewhere.
    pub fn append(&mut self, other: Report) {
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn count(&self, pred: impl Fn(&Warning) -> bool) -> usize {
        self.warnings.iter().filter(|w| pred(w)).count()
    }

    /// `name` as the stream can carry it.
    ///
    /// Strings are NUL-terminated, so interior NULs are removed. The
    /// absent-value marker gets a trailing `_` so it does not read back as
    /// "no name". Any change is recorded.
    pub fn wire_name(&mut self, context: &str, name: &str) -> String {
        let mut written: String = name.chars().filter(|&c| c != '\0').collect();
        if written == NONE_PLACEHOLDER {
            written.push('_');
        }
        if written != name {
            self.push(Warning::NameSanitized {
                context: context.to_owned(),
                original: name.to_owned(),
                written: written.clone(),
            });
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovo_common::Attribute;

    #[test]
    fn test_precision_from_issue() {
        let issue = PackingIssue {
            attribute: Attribute::Uv,
            component: Some(1),
            value: 1.0e6,
            replaced_with: 65504.0,
        };
        let w = Warning::precision("mesh 'a'", &issue);
        assert!(w.to_string().contains("uv[1]"));
    }

    #[test]
    fn test_wire_name() {
        let mut report = Report::new();
        assert_eq!(report.wire_name("node 0", "crate"), "crate");
        assert!(report.is_empty());

        assert_eq!(report.wire_name("node 1", "a\0b"), "ab");
        assert_eq!(report.wire_name("node 2", NONE_PLACEHOLDER), "[none]_");
        assert_eq!(
            report.count(|w| matches!(w, Warning::NameSanitized { .. })),
            2
        );
    }

    #[test]
    fn test_report_counts() {
        let mut report = Report::new();
        report.push(Warning::TextureResolution {
            path: "a.png".into(),
            reason: "not found".into(),
        });
        let mut other = Report::new();
        other.push(Warning::PayloadExcluded {
            node: "lamp".into(),
            kind: NodeKind::Light,
        });
        report.append(other);

        assert_eq!(report.len(), 2);
        assert_eq!(
            report.count(|w| matches!(w, Warning::TextureResolution { .. })),
            1
        );
    }
}
