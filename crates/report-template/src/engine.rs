//! Render pipeline

use crate::excel::{ExcelRenderer, SheetSelection};
use crate::word::WordRenderer;
use crate::{
    BoundModel, RenderedDocumentOutput, ReportError, ReportKind, ReportOptions, Result,
    TemplateStore,
};
use ooxml_core::Package;
use serde::{Deserialize, Serialize};

/// A render request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderInput {
    /// JSON data model
    pub json_model: String,
    /// Template name without extension
    pub template_name: String,
    /// File name of the produced report
    pub report_name: String,
    /// Excel: single 1-based sheet to render
    pub sheet_number: Option<u32>,
    /// Excel: 1-based sheets to render; wins over `sheet_number`
    pub sheet_numbers: Option<Vec<u32>>,
}

impl RenderInput {
    /// Sheet selection described by the request
    pub fn sheet_selection(&self) -> SheetSelection {
        SheetSelection::from_request(self.sheet_number, self.sheet_numbers.as_deref())
    }
}

/// Renders reports from stored templates
///
/// The engine holds only configuration and the template store; every render
/// works on its own copy of the template, so one engine can serve
/// concurrent callers.
#[derive(Debug)]
pub struct ReportEngine {
    options: ReportOptions,
    store: TemplateStore,
}

impl ReportEngine {
    /// Create an engine
    pub fn new(options: ReportOptions) -> Self {
        let store = TemplateStore::new(&options);
        Self { options, store }
    }

    /// Engine options
    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Template store
    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Render a Word report
    pub fn create_word_report(&self, input: &RenderInput) -> RenderedDocumentOutput {
        self.render(ReportKind::Word, input)
    }

    /// Render an Excel report
    pub fn create_excel_report(&self, input: &RenderInput) -> RenderedDocumentOutput {
        self.render(ReportKind::Excel, input)
    }

    /// Render a report of the given kind
    ///
    /// Never fails: errors are returned as messages in the output.
    pub fn render(&self, kind: ReportKind, input: &RenderInput) -> RenderedDocumentOutput {
        let template_file = kind.file_name(&input.template_name);

        match self.try_render(kind, input) {
            Ok(bytes) => {
                tracing::debug!(
                    template = %template_file,
                    report = %input.report_name,
                    size = bytes.len(),
                    "report rendered"
                );
                RenderedDocumentOutput::success(bytes)
            }
            Err(e) => {
                tracing::warn!(template = %template_file, error = %e, "report rendering failed");
                RenderedDocumentOutput::failure(vec![e.message_for(&template_file)])
            }
        }
    }

    fn try_render(&self, kind: ReportKind, input: &RenderInput) -> Result<Vec<u8>> {
        let template = self.store.load(&input.template_name, kind)?;
        tracing::debug!(template = %input.template_name, kind = ?kind, "template resolved");

        let model = BoundModel::bind(&input.json_model)?;
        tracing::debug!(template = %input.template_name, "model bound");

        let mut package = Package::from_bytes(&template).map_err(assembly)?;

        let directives = match kind {
            ReportKind::Word => WordRenderer::new(&self.options).render(&mut package, &model)?,
            ReportKind::Excel => ExcelRenderer::new(&self.options).render(
                &mut package,
                &model,
                &input.sheet_selection(),
            )?,
        };
        tracing::debug!(template = %input.template_name, directives, "directives expanded");

        let bytes = package.to_bytes().map_err(assembly)?;
        tracing::debug!(template = %input.template_name, size = bytes.len(), "package assembled");
        Ok(bytes)
    }
}

fn assembly(e: ooxml_core::PackageError) -> ReportError {
    ReportError::Assembly(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_input_is_camel_case() {
        let input: RenderInput = serde_json::from_str(
            r#"{ "jsonModel": "{}", "templateName": "Sales", "reportName": "out.xlsx", "sheetNumbers": [2, 1] }"#,
        )
        .unwrap();
        assert_eq!(input.template_name, "Sales");
        assert_eq!(input.sheet_numbers, Some(vec![2, 1]));
        assert_eq!(input.sheet_selection(), SheetSelection::Many(vec![2, 1]));
    }

    #[test]
    fn test_missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ReportEngine::new(ReportOptions::with_root(dir.path()));
        let output = engine.create_excel_report(&RenderInput {
            template_name: "INVALID_NAME".to_string(),
            ..Default::default()
        });

        assert!(output.has_errors());
        assert!(output.document_bytes().is_empty());
        let message = &output.error_messages()[0];
        assert!(message.contains("Invalid Report Template"));
        assert!(message.contains("INVALID_NAME.xlsx"));
    }

    #[test]
    fn test_corrupt_template_is_an_assembly_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Broken.docx"), b"not a zip").unwrap();
        let engine = ReportEngine::new(ReportOptions::with_root(dir.path()));
        let output = engine.create_word_report(&RenderInput {
            template_name: "Broken".to_string(),
            ..Default::default()
        });

        assert!(output.has_errors());
        assert!(output.error_messages()[0].starts_with("Broken.docx: Failed to assemble report"));
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReportEngine>();
    }
}
