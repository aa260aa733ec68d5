//! Report Renderer
//!
//! Renders a Word or Excel report from a stored template and a JSON model.
//!
//! Usage:
//!   cargo run --example render_report -- <options.json> <docx|xlsx> <template> <model.json> [output] [sheets]
//!
//! Examples:
//!   cargo run --example render_report -- reportOptions.json docx Invoice input/invoice.json
//!   cargo run --example render_report -- reportOptions.json xlsx Sales input/sales.json output/sales.xlsx 1,3
//!
//! Set `RUST_LOG=report_template=debug` to trace the render pipeline.

use report_template::{RenderInput, ReportEngine, ReportKind, ReportOptions};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 5 {
        eprintln!(
            "Usage: {} <options.json> <docx|xlsx> <template> <model.json> [output] [sheets]",
            args[0]
        );
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  cargo run --example render_report -- reportOptions.json docx Invoice input/invoice.json");
        eprintln!("  cargo run --example render_report -- reportOptions.json xlsx Sales input/sales.json output/sales.xlsx 1,3");
        std::process::exit(1);
    }

    let options = ReportOptions::from_file(&args[1])?;
    let kind = match args[2].as_str() {
        "docx" | "word" => ReportKind::Word,
        "xlsx" | "excel" => ReportKind::Excel,
        other => return Err(format!("Unknown report kind '{}'", other).into()),
    };
    let template_name = &args[3];

    let json_model = std::fs::read_to_string(&args[4])
        .map_err(|e| format!("Failed to read model '{}': {}", args[4], e))?;

    let output_path = match args.get(5) {
        Some(path) => path.clone(),
        None => format!("output/{}", kind.file_name(template_name)),
    };

    // Optional comma-separated 1-based sheet list for Excel
    let sheet_numbers = match args.get(6) {
        Some(list) => Some(
            list.split(',')
                .map(|n| n.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("Invalid sheet list '{}': {}", list, e))?,
        ),
        None => None,
    };

    let engine = ReportEngine::new(options);
    let input = RenderInput {
        json_model,
        template_name: template_name.clone(),
        report_name: output_path.clone(),
        sheet_numbers,
        ..Default::default()
    };

    let output = engine.render(kind, &input);
    let file = output.into_file(&output_path).map_err(|errors| errors.join("\n"))?;

    if let Some(parent) = std::path::Path::new(&output_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, &file.bytes)?;

    println!("Generated: {} ({} bytes)", output_path, file.bytes.len());

    Ok(())
}
