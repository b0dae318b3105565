//! Compile errors.

use core::fmt;
use trellis_wire_format::Span;

/// A problem found while compiling a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileError {
    /// What went wrong.
    pub problem: String,
    /// Where in the template source, when known.
    pub span: Span,
}

impl CompileError {
    /// An error at `span`.
    pub fn new(problem: impl Into<String>, span: Span) -> Self {
        Self {
            problem: problem.into(),
            span,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} ({}..{})",
            self.problem,
            self.span.start,
            self.span.end()
        )
    }
}

/// Every error found in one block, plus the handle the block was still
/// committed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileErrors {
    /// The collected errors, in emission order.
    pub errors: Vec<CompileError>,
    /// The handle of the (unusable) compiled block.
    pub handle: i32,
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} compile error(s) in block {}",
            self.errors.len(),
            self.handle
        )?;
        for error in &self.errors {
            write!(formatter, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that every error is listed with its range.
    ///
    /// # Panics
    /// Panics if an error is missing from the message.
    #[test]
    fn lists_every_error() {
        let errors = CompileErrors {
            errors: vec![
                CompileError::new("Unexpected Helper shout", Span { start: 4, offset: 9 }),
                CompileError::new("Unknown block macro frobnicate", Span::default()),
            ],
            handle: 7,
        };
        let message = errors.to_string();
        assert!(message.starts_with("2 compile error(s) in block 7"));
        assert!(message.contains("Unexpected Helper shout (4..13)"));
        assert!(message.contains("Unknown block macro frobnicate (0..0)"));

        let converted = anyhow::Error::from(errors);
        assert!(converted.to_string().contains("block 7"));
    }
}
