//! Images inserted from model data
//!
//! An image tag (`{{%path}}`) resolves to either a Base64 string (a
//! `data:image/...;base64,` prefix is accepted) or an object
//! `{ "data": "<base64>", "width": px, "height": px }`. The bytes become a
//! media part of the package, the rendering part gains an image
//! relationship, and the tag is replaced by an inline `w:drawing`.

use crate::{ReportError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageReader;
use ooxml_core::{rels_part_for, Package, Relationship};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Cursor;

const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const MEDIA_DIR: &str = "word/media/";

/// English Metric Units per pixel at 96 DPI
const EMU_PER_PIXEL: f64 = 9525.0;

impl From<image::ImageError> for ReportError {
    fn from(err: image::ImageError) -> Self {
        ReportError::Image(err.to_string())
    }
}

/// Detected image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Media part extension
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }

    fn decoder_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Detect image format from magic bytes
pub fn detect_format(data: &[u8]) -> Result<ImageFormat> {
    if data.len() < 8 {
        return Err(ReportError::Image("Image data too short".to_string()));
    }

    // JPEG starts with FF D8 FF
    if data[..3] == [0xFF, 0xD8, 0xFF] {
        return Ok(ImageFormat::Jpeg);
    }

    // PNG signature
    if data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return Ok(ImageFormat::Png);
    }

    Err(ReportError::Image("Unknown image format".to_string()))
}

/// A decoded model image ready to embed
#[derive(Debug, Clone, PartialEq)]
pub struct ModelImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Displayed size in EMU
    pub extent: (u64, u64),
}

impl ModelImage {
    /// Decode an image value from the model
    pub fn from_value(value: &Value) -> Result<Self> {
        let (payload, width, height) = match value {
            Value::String(s) => (s.as_str(), None, None),
            Value::Object(fields) => {
                let Some(Value::String(data)) = fields.get("data") else {
                    return Err(ReportError::Image(
                        "image object needs a Base64 'data' string".to_string(),
                    ));
                };
                let pixels = |key: &str| fields.get(key).and_then(Value::as_f64).filter(|v| *v > 0.0);
                (data.as_str(), pixels("width"), pixels("height"))
            }
            _ => {
                return Err(ReportError::Image(
                    "expected a Base64 string or an image object".to_string(),
                ))
            }
        };

        let data = decode_base64(payload)?;
        let format = detect_format(&data)?;
        let natural = ImageReader::with_format(Cursor::new(data.as_slice()), format.decoder_format())
            .into_dimensions()?;
        let (w, h) = scaled_size(natural, width, height);

        Ok(Self {
            data,
            format,
            extent: ((w * EMU_PER_PIXEL).round() as u64, (h * EMU_PER_PIXEL).round() as u64),
        })
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let payload = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ReportError::Image(format!("invalid Base64 image data: {e}")))
}

/// Display size in pixels
///
/// A single given dimension keeps the aspect ratio; both stretch; none keeps
/// the natural size.
pub fn scaled_size(natural: (u32, u32), width: Option<f64>, height: Option<f64>) -> (f64, f64) {
    let (nw, nh) = (f64::from(natural.0.max(1)), f64::from(natural.1.max(1)));
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * nh / nw),
        (None, Some(h)) => (h * nw / nh, h),
        (None, None) => (nw, nh),
    }
}

/// Media names and drawing ids shared by every part of one document
#[derive(Debug, Default)]
pub struct MediaRegistry {
    taken: HashSet<String>,
    next_media: u32,
    next_drawing: u32,
}

impl MediaRegistry {
    /// Registry avoiding the media parts already present; drawing ids
    /// continue after `max_drawing_id`
    pub fn new(package: &Package, max_drawing_id: u32) -> Self {
        Self {
            taken: package.part_names().map(str::to_string).collect(),
            next_media: 1,
            next_drawing: max_drawing_id + 1,
        }
    }

    fn media_part(&mut self, format: ImageFormat) -> String {
        loop {
            let name = format!("{MEDIA_DIR}report_image{}.{}", self.next_media, format.extension());
            self.next_media += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    fn drawing_id(&mut self) -> u32 {
        let id = self.next_drawing;
        self.next_drawing += 1;
        id
    }
}

#[derive(Debug)]
struct Placed {
    rel_id: String,
    media_part: String,
    data: Vec<u8>,
}

/// Images placed into one part during rendering
pub struct PartImages<'r> {
    part: String,
    registry: &'r mut MediaRegistry,
    rel_ids: HashSet<String>,
    next_rel: u32,
    placed: Vec<Placed>,
}

impl<'r> PartImages<'r> {
    /// Start placing images into `part`; `rel_ids` are the part's existing relationship ids
    pub fn new<I, S>(part: &str, rel_ids: I, registry: &'r mut MediaRegistry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rel_ids: HashSet<String> = rel_ids.into_iter().map(Into::into).collect();
        let next_rel = rel_ids
            .iter()
            .filter_map(|id| id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            part: part.to_string(),
            registry,
            rel_ids,
            next_rel,
            placed: Vec::new(),
        }
    }

    /// Number of images placed so far
    pub fn len(&self) -> usize {
        self.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Embed an image value and return its inline drawing markup
    ///
    /// The markup sits between a closing and a reopened `w:t` of the run.
    pub fn place(&mut self, value: &Value) -> Result<String> {
        let image = ModelImage::from_value(value)?;
        let rel_id = self.rel_id();
        let media_part = self.registry.media_part(image.format);
        let id = self.registry.drawing_id();
        let markup = inline_drawing(&rel_id, id, &media_part, image.extent);

        self.placed.push(Placed {
            rel_id,
            media_part,
            data: image.data,
        });
        Ok(markup)
    }

    fn rel_id(&mut self) -> String {
        loop {
            let id = format!("rId{}", self.next_rel);
            self.next_rel += 1;
            if self.rel_ids.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Write media parts and image relationships into the package
    pub fn commit(self, package: &mut Package) -> Result<usize> {
        if self.placed.is_empty() {
            return Ok(0);
        }
        let mut rels = package.relationships(&self.part)?;
        let count = self.placed.len();
        for placed in self.placed {
            rels.entries.push(Relationship {
                id: placed.rel_id,
                rel_type: IMAGE_REL.to_string(),
                target: relative_target(&self.part, &placed.media_part),
                target_mode: None,
            });
            package.set_part(&placed.media_part, placed.data);
        }
        package.set_part(&rels_part_for(&self.part), rels.to_xml().into_bytes());
        tracing::debug!(part = %self.part, images = count, "embedded model images");
        Ok(count)
    }
}

/// Target of `target` as seen from the directory of `source`
fn relative_target(source: &str, target: &str) -> String {
    let dir = source.rsplit_once('/').map_or("", |(dir, _)| dir);
    match target.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) if !dir.is_empty() => rest.to_string(),
        _ => format!("/{target}"),
    }
}

fn inline_drawing(rel_id: &str, id: u32, media_part: &str, (cx, cy): (u64, u64)) -> String {
    let name = media_part.rsplit('/').next().unwrap_or(media_part);
    format!(
        concat!(
            "</w:t><w:drawing>",
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            "</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>",
            r#"<w:t xml:space="preserve">"#
        ),
        cx = cx,
        cy = cy,
        id = id,
        name = name,
        rel_id = rel_id,
    )
}
