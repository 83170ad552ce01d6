//! Document splitting: one source PDF → one image per physical page.
//!
//! Splitting is total and order-preserving: either every page of the
//! document is rendered, index-aligned with the original, or the whole
//! document fails with `DocumentUnreadable` and no partial pages are
//! emitted. pdfium wraps a C++ library with thread-local state, so all
//! calls run inside `spawn_blocking`.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageFailure};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// One rendered page, index-aligned with the source document.
pub struct SplitPage {
    /// 0-based physical page index.
    pub index: usize,
    pub image: DynamicImage,
}

/// Split a source document into per-page images.
///
/// Returns pages in original order. An unreadable or corrupt document
/// yields `Err(StageFailure::DocumentUnreadable)`; the outer
/// `Result<_, PipelineError>` is reserved for task-join failures.
pub async fn split_document(
    path: &Path,
    config: &PipelineConfig,
) -> Result<Result<Vec<SplitPage>, StageFailure>, PipelineError> {
    let path = path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    tokio::task::spawn_blocking(move || split_blocking(&path, dpi, max_pixels))
        .await
        .map_err(|e| PipelineError::Internal(format!("split task panicked: {e}")))
}

/// Pixel width for a page of `width_pts` points rendered at `dpi`, capped
/// at `max_pixels`. PDF points are 1/72 inch.
fn target_width_px(width_pts: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_pts / 72.0 * dpi as f32).round() as i64;
    px.clamp(1, max_pixels as i64) as i32
}

fn split_blocking(path: &Path, dpi: u32, max_pixels: u32) -> Result<Vec<SplitPage>, StageFailure> {
    let doc_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| StageFailure::DocumentUnreadable {
            doc: doc_name.clone(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("Splitting '{}' into {} pages", doc_name, total);

    let mut out = Vec::with_capacity(total);
    for index in 0..total {
        let page = pages
            .get(index as u16)
            .map_err(|e| StageFailure::DocumentUnreadable {
                doc: doc_name.clone(),
                detail: format!("page {index}: {e:?}"),
            })?;
        // Sized per page: width in points at the configured DPI, capped by
        // the pixel ceiling.
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width_px(page.width().value, dpi, max_pixels))
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| StageFailure::DocumentUnreadable {
                    doc: doc_name.clone(),
                    detail: format!("page {index} render: {e:?}"),
                })?;
        let image = bitmap.as_image();
        debug!(
            "Rendered '{}' page {} → {}x{} px",
            doc_name,
            index,
            image.width(),
            image.height()
        );
        out.push(SplitPage { index, image });
    }

    // Totality check: one SplitPage per physical page, in order.
    debug_assert_eq!(out.len(), total);
    debug_assert!(out.iter().enumerate().all(|(i, p)| p.index == i));

    Ok(out)
}
