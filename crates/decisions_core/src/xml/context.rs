use super::tree::Element;
use super::ParseError;
use crate::schema::{Diagnostic, DiagnosticState, Severity};
use tracing::{debug, error, info, warn};

/// What to do when a field read through [`ParseContext::get`] is absent or
/// blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    Ignore,
    Report(Severity),
}

/// Diagnostics collected while parsing one document.
#[derive(Debug)]
pub struct ParseContext {
    filename: String,
    threshold: Severity,
    pub current_action: Option<String>,
    errors: Vec<Diagnostic>,
}

impl ParseContext {
    pub fn new(filename: impl Into<String>, threshold: Severity) -> Self {
        Self {
            filename: filename.into(),
            threshold,
            current_action: None,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }

    /// Records a diagnostic and fails once `severity` reaches the threshold.
    pub fn log(&mut self, severity: Severity, message: impl Into<String>) -> Result<(), ParseError> {
        let message = message.into();
        let file = self.filename.as_str();
        let action = self.current_action.as_deref().unwrap_or("-");
        match severity {
            Severity::Debug => debug!(file, action, "{message}"),
            Severity::Info => info!(file, action, "{message}"),
            Severity::Warning => warn!(file, action, "{message}"),
            Severity::Error | Severity::Critical => error!(file, action, severity = %severity, "{message}"),
        }

        self.errors.push(Diagnostic {
            message: message.clone(),
            severity,
            state: DiagnosticState {
                filename: self.filename.clone(),
                current_action: self.current_action.clone(),
            },
        });

        if severity >= self.threshold {
            return Err(ParseError::Threshold { message, severity });
        }
        Ok(())
    }

    pub fn info(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        self.log(Severity::Info, message)
    }

    pub fn warning(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        self.log(Severity::Warning, message)
    }

    pub fn error(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        self.log(Severity::Error, message)
    }

    pub fn critical(&mut self, message: impl Into<String>) -> Result<(), ParseError> {
        self.log(Severity::Critical, message)
    }

    /// Reads the text at `path` below `parent` and runs it through
    /// `transform`.
    ///
    /// A missing or blank element yields `Ok(None)` after reporting it
    /// according to `on_missing`. Errors from `transform` are returned as is.
    pub fn get<T>(
        &mut self,
        parent: &Element,
        path: &str,
        on_missing: OnMissing,
        transform: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        let problem = match parent.find(path) {
            None => format!("Element {path} not found"),
            Some(element) => match element.trimmed_text() {
                Some(text) => return transform(text).map(Some),
                None => format!("Element {path} is empty"),
            },
        };
        if let OnMissing::Report(severity) = on_missing {
            self.log(severity, problem)?;
        }
        Ok(None)
    }

    /// [`get`](Self::get) without a transform.
    pub fn text(&mut self, parent: &Element, path: &str, on_missing: OnMissing) -> Result<Option<String>, ParseError> {
        self.get(parent, path, on_missing, |text| Ok(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::tree::read_tree;

    fn meta() -> Element {
        read_tree("<m><Otsikko>Title</Otsikko><Tyhja> </Tyhja><Pykala>12</Pykala></m>".as_bytes(), "t.xml").unwrap()
    }

    #[test]
    fn present_values_are_transformed() {
        let mut ctx = ParseContext::new("t.xml", Severity::Critical);
        let number = ctx
            .get(&meta(), "Pykala", OnMissing::Report(Severity::Error), |raw| {
                Ok(raw.parse::<u32>().unwrap_or_default())
            })
            .unwrap();
        assert_eq!(number, Some(12));
        assert_eq!(ctx.text(&meta(), "Otsikko", OnMissing::Ignore).unwrap().as_deref(), Some("Title"));
        assert!(ctx.errors().is_empty());
    }

    #[test]
    fn missing_and_blank_are_reported_with_context() {
        let mut ctx = ParseContext::new("t.xml", Severity::Critical);
        ctx.current_action = Some("Title".into());
        assert_eq!(ctx.text(&meta(), "Puuttuu", OnMissing::Report(Severity::Warning)).unwrap(), None);
        assert_eq!(ctx.text(&meta(), "Tyhja", OnMissing::Report(Severity::Error)).unwrap(), None);
        assert_eq!(ctx.text(&meta(), "Muu", OnMissing::Ignore).unwrap(), None);

        let errors = ctx.into_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Element Puuttuu not found");
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(errors[1].message, "Element Tyhja is empty");
        assert_eq!(errors[1].state.filename, "t.xml");
        assert_eq!(errors[1].state.current_action.as_deref(), Some("Title"));
    }

    #[test]
    fn threshold_turns_diagnostics_into_failures() {
        let mut ctx = ParseContext::new("t.xml", Severity::Error);
        assert!(ctx.warning("soft").is_ok());
        let err = ctx.error("hard").unwrap_err();
        assert!(matches!(err, ParseError::Threshold { ref message, severity: Severity::Error } if message == "hard"));
        assert_eq!(err.to_string(), "hard");
        assert_eq!(ctx.errors().len(), 2);
    }
}
