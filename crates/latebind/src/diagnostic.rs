//! Diagnostic records returned alongside callee-raised errors
//!
//! A [`DiagnosticRecord`] arrives holding foreign strings. The contract is
//! render, then release, in that order: [`DiagnosticRecord::render`] copies
//! the strings into an owned [`Diagnostic`], and
//! [`DiagnosticRecord::release`] frees the foreign copies. Releasing first
//! is refused rather than silently losing the text.

use std::fmt;

use crate::error::{DiagnosticError, HeapError};
use crate::heap::{ForeignHeap, StrHandle};

/// The owned, rendered form of a diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostic {
    /// Application-defined error code (zero when `scode` is used)
    pub code: u16,
    /// Status code describing the error
    pub scode: u32,
    /// Who raised the error
    pub source: Option<String>,
    /// What went wrong
    pub description: Option<String>,
    /// Help file path
    pub help_file: Option<String>,
    /// Topic within the help file
    pub help_context: u32,
}

impl Diagnostic {
    /// `code` when set, otherwise `scode`.
    pub fn effective_code(&self) -> u32 {
        if self.code != 0 {
            u32::from(self.code)
        } else {
            self.scode
        }
    }

    /// Human-readable summary: the description when there is one,
    /// otherwise `source: code`.
    pub fn describe(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => format!(
                "{}: {:#x}",
                self.source.as_deref().unwrap_or("<nil>"),
                self.effective_code()
            ),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Diagnostic slot filled by a callee that raises an error.
#[derive(Debug, Default)]
pub struct DiagnosticRecord {
    /// Application-defined error code
    pub code: u16,
    /// Status code describing the error
    pub scode: u32,
    /// Topic within the help file
    pub help_context: u32,
    /// Foreign string naming who raised the error
    pub source: StrHandle,
    /// Foreign string describing the error
    pub description: StrHandle,
    /// Foreign string holding the help file path
    pub help_file: StrHandle,
    rendered: Option<Diagnostic>,
}

impl DiagnosticRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill a record the way a callee does: strings are allocated on the
    /// foreign heap and owned by the record until it is released.
    pub fn raise(heap: &ForeignHeap, scode: u32, source: &str, description: &str) -> Self {
        DiagnosticRecord {
            scode,
            source: heap.alloc_string(source),
            description: heap.alloc_string(description),
            ..Self::default()
        }
    }

    /// Attach help information.
    pub fn with_help(mut self, heap: &ForeignHeap, file: &str, context: u32) -> Self {
        self.help_file = heap.alloc_string(file);
        self.help_context = context;
        self
    }

    /// Check if the callee wrote anything
    pub fn is_set(&self) -> bool {
        self.code != 0
            || self.scode != 0
            || !self.source.is_null()
            || !self.description.is_null()
            || !self.help_file.is_null()
    }

    /// Copy the foreign strings into an owned [`Diagnostic`]. Calling it
    /// again returns the first rendering.
    pub fn render(&mut self, heap: &ForeignHeap) -> Result<&Diagnostic, HeapError> {
        if self.rendered.is_none() {
            let read = |handle: StrHandle| -> Result<Option<String>, HeapError> {
                if handle.is_null() {
                    Ok(None)
                } else {
                    heap.read_string(handle).map(Some)
                }
            };
            self.rendered = Some(Diagnostic {
                code: self.code,
                scode: self.scode,
                source: read(self.source)?,
                description: read(self.description)?,
                help_file: read(self.help_file)?,
                help_context: self.help_context,
            });
        }
        Ok(self.rendered.get_or_insert_with(Diagnostic::default))
    }

    /// Like [`DiagnosticRecord::render`], but a string that cannot be read
    /// is left out of the rendering instead of failing it. The codes are
    /// always kept.
    pub fn render_lossy(&mut self, heap: &ForeignHeap) -> &Diagnostic {
        if self.rendered.is_none() {
            let read = |field: &str, handle: StrHandle| -> Option<String> {
                if handle.is_null() {
                    return None;
                }
                match heap.read_string(handle) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        tracing::warn!(field, error = %e, "unreadable diagnostic string");
                        None
                    }
                }
            };
            self.rendered = Some(Diagnostic {
                code: self.code,
                scode: self.scode,
                source: read("source", self.source),
                description: read("description", self.description),
                help_file: read("help_file", self.help_file),
                help_context: self.help_context,
            });
        }
        self.rendered.get_or_insert_with(Diagnostic::default)
    }

    /// The rendered form, if [`DiagnosticRecord::render`] has run.
    pub fn rendered(&self) -> Option<&Diagnostic> {
        self.rendered.as_ref()
    }

    /// Free the foreign strings. Must follow [`DiagnosticRecord::render`];
    /// releasing twice is a no-op.
    pub fn release(&mut self, heap: &ForeignHeap) -> Result<(), DiagnosticError> {
        if self.rendered.is_none() {
            tracing::warn!("diagnostic record released before render; strings left in place");
            return Err(DiagnosticError::ReleaseBeforeRender);
        }
        for handle in [&mut self.source, &mut self.description, &mut self.help_file] {
            let taken = std::mem::take(handle);
            if let Err(e) = heap.free_string(taken) {
                tracing::warn!(error = %e, "failed to free diagnostic string");
            }
        }
        Ok(())
    }

    /// Summary text. Unrendered records fall back to the numeric code.
    pub fn describe(&self) -> String {
        match &self.rendered {
            Some(diagnostic) => diagnostic.describe(),
            None => format!("<unrendered>: {:#x}", self.scode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_then_release() {
        let heap = ForeignHeap::new();
        let mut record = DiagnosticRecord::raise(&heap, 0x8000_4005, "Calc", " divide by zero ");
        record.render(&heap).unwrap();
        record.release(&heap).unwrap();
        assert!(heap.is_clean());
        assert_eq!(record.describe(), "divide by zero");
        assert!(record.release(&heap).is_ok());
    }

    #[test]
    fn test_release_before_render_is_refused() {
        let heap = ForeignHeap::new();
        let mut record = DiagnosticRecord::raise(&heap, 1, "src", "desc");
        assert_eq!(
            record.release(&heap),
            Err(DiagnosticError::ReleaseBeforeRender)
        );
        assert_eq!(heap.live_strings(), 2);
        assert_eq!(record.render(&heap).unwrap().source.as_deref(), Some("src"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let heap = ForeignHeap::new();
        let mut record = DiagnosticRecord::raise(&heap, 1, "src", "first");
        let first = record.render(&heap).unwrap().clone();
        record.release(&heap).unwrap();
        assert_eq!(record.render(&heap).unwrap(), &first);
    }

    #[test]
    fn test_lossy_render_keeps_readable_strings() {
        let heap = ForeignHeap::new();
        let mut record = DiagnosticRecord::raise(&heap, 7, "src", "desc");
        record.help_file = StrHandle::from_raw(0xdead_beef);
        assert!(record.render(&heap).is_err());

        let rendered = record.render_lossy(&heap).clone();
        assert_eq!(rendered.scode, 7);
        assert_eq!(rendered.source.as_deref(), Some("src"));
        assert_eq!(rendered.description.as_deref(), Some("desc"));
        assert_eq!(rendered.help_file, None);

        record.release(&heap).unwrap();
        assert_eq!(heap.live_strings(), 0);
    }

    #[test]
    fn test_describe_falls_back_to_source_and_code() {
        let diagnostic = Diagnostic {
            scode: 0x8002_0009,
            source: Some("Excel".to_string()),
            ..Diagnostic::default()
        };
        assert_eq!(diagnostic.describe(), "Excel: 0x80020009");
        let with_code = Diagnostic { code: 42, ..diagnostic };
        assert_eq!(with_code.describe(), "Excel: 0x2a");
        assert_eq!(Diagnostic::default().describe(), "<nil>: 0x0");
    }
}
