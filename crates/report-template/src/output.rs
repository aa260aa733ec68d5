//! Result encoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Outcome of a render: a document or a list of error messages, never both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocumentOutput {
    bytes: Vec<u8>,
    base64: String,
    error_messages: Vec<String>,
}

impl RenderedDocumentOutput {
    /// Successful render; the Base64 form is computed up front
    pub fn success(bytes: Vec<u8>) -> Self {
        let base64 = STANDARD.encode(&bytes);
        Self {
            bytes,
            base64,
            error_messages: Vec::new(),
        }
    }

    /// Failed render
    pub fn failure(messages: Vec<String>) -> Self {
        let error_messages = if messages.is_empty() {
            vec!["Report rendering failed".to_string()]
        } else {
            messages
        };
        Self {
            bytes: Vec::new(),
            base64: String::new(),
            error_messages,
        }
    }

    /// True iff the render failed
    pub fn has_errors(&self) -> bool {
        !self.error_messages.is_empty()
    }

    /// Rendered document bytes (empty on failure)
    pub fn document_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 form of the document (empty on failure)
    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// Error messages in the order they were collected
    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    /// Named file payload for a presenter, or the error messages
    pub fn into_file(self, report_name: &str) -> Result<ReportFile, Vec<String>> {
        if self.has_errors() {
            return Err(self.error_messages);
        }
        Ok(ReportFile {
            file_name: report_name.to_string(),
            bytes: self.bytes,
        })
    }
}

/// A rendered report ready to hand to a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_carries_base64() {
        let output = RenderedDocumentOutput::success(b"PK\x03\x04".to_vec());
        assert!(!output.has_errors());
        assert_eq!(output.base64(), "UEsDBA==");
        assert_eq!(output.document_bytes(), b"PK\x03\x04");
        assert!(output.error_messages().is_empty());
    }

    #[test]
    fn test_failure_has_no_bytes() {
        let output = RenderedDocumentOutput::failure(vec!["boom".to_string()]);
        assert!(output.has_errors());
        assert!(output.document_bytes().is_empty());
        assert!(output.base64().is_empty());
        assert_eq!(output.error_messages(), ["boom".to_string()]);
    }

    #[test]
    fn test_failure_is_never_empty() {
        let output = RenderedDocumentOutput::failure(Vec::new());
        assert!(output.has_errors());
    }

    #[test]
    fn test_into_file() {
        let file = RenderedDocumentOutput::success(vec![1, 2, 3])
            .into_file("report.docx")
            .unwrap();
        assert_eq!(file.file_name, "report.docx");
        assert_eq!(file.bytes, vec![1, 2, 3]);

        let errors = RenderedDocumentOutput::failure(vec!["x".into()])
            .into_file("report.docx")
            .unwrap_err();
        assert_eq!(errors, vec!["x".to_string()]);
    }
}
