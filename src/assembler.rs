//! Whole-document extraction and reconstruction.
//!
//! The engine handle is only ever touched from the calling thread. Page
//! analysis (classification, table detection, emission) needs no engine
//! access and runs in parallel when enabled; results are put back in page
//! order before anything else happens.

use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{Diagnostics, Error, Result};
use crate::markup::{HtmlTree, MarkupDocument, MarkupReader, MarkupTree};
use crate::model::{
    BackgroundLayer, ClassifiedElement, GeometricPrimitive, ImageSource, MarkupPage, MarkupPayload,
    Metadata, PageInfo,
};
use crate::parser::{
    BackgroundIsolator, ClassifierConfig, DocumentEngine, ElementClassifier, TableDetector,
    TableDetectorConfig,
};
use crate::rebuild::{ElementReconstructor, PagePlan, PdfWriter};
use crate::render::{AssetStore, MarkupEmitter};
use crate::units::CoordinateMapper;

/// One extracted page.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedPage {
    pub info: PageInfo,
    /// Classified elements after table detection, in native units
    pub elements: Vec<ClassifiedElement>,
    /// Positioned markup for the page
    pub markup: MarkupPage,
}

/// Result of [`DocumentAssembler::extract`].
#[derive(Debug, Serialize)]
pub struct Extraction {
    pub metadata: Metadata,
    /// Successfully extracted pages, in page order
    pub pages: Vec<ExtractedPage>,
    pub diagnostics: Diagnostics,
}

impl Extraction {
    /// Markup of every page, in page order.
    pub fn markup_pages(&self) -> Vec<MarkupPage> {
        self.pages.iter().map(|p| p.markup.clone()).collect()
    }

    /// Number of extracted pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Result of [`DocumentAssembler::reconstruct`].
#[derive(Debug)]
pub struct Reconstruction {
    /// Serialized PDF
    pub pdf: Vec<u8>,
    pub page_count: usize,
    /// Whether the original pages were copied instead of rebuilt
    pub fallback: bool,
    pub diagnostics: Diagnostics,
}

/// Primitives read from the engine for one page.
struct PageInput {
    info: PageInfo,
    primitives: Vec<GeometricPrimitive>,
}

/// Drives the extraction and reconstruction pipelines.
pub struct DocumentAssembler {
    config: PipelineConfig,
    mapper: CoordinateMapper,
}

impl DocumentAssembler {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let mapper = CoordinateMapper::new(config.dpi_scale)?;
        Ok(Self { config, mapper })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract every selected page into positioned markup.
    ///
    /// A page whose primitives cannot be read is reported and left out;
    /// the other pages are still returned.
    pub fn extract<E: DocumentEngine + ?Sized>(&self, engine: &E) -> Result<Extraction> {
        let mut metadata = engine.metadata();
        let page_count = engine.page_count();
        metadata.page_count = page_count;
        if page_count == 0 {
            return Err(Error::Assembly("document has no pages".to_string()));
        }

        let mut diagnostics = Diagnostics::new();
        let mut inputs = Vec::new();
        for number in 1..=page_count {
            if !self.config.page_selection.includes(number) {
                continue;
            }
            match read_page(engine, number) {
                Ok(input) => inputs.push(input),
                Err(e) => diagnostics.page(number, as_extraction_error(number, e)),
            }
        }

        let analyzed: Vec<(Option<ExtractedPage>, Diagnostics)> = if self.config.parallel {
            inputs.into_par_iter().map(|input| self.analyze(input)).collect()
        } else {
            inputs.into_iter().map(|input| self.analyze(input)).collect()
        };

        let mut pages = Vec::with_capacity(analyzed.len());
        for (page, page_diagnostics) in analyzed {
            diagnostics.extend(page_diagnostics);
            pages.extend(page);
        }
        pages.sort_by_key(|p| p.info.number);

        let store = AssetStore::from_dir(self.config.asset_dir.as_deref());
        store.prepare()?;
        for page in &mut pages {
            self.resolve_images(engine, &store, page, &mut diagnostics);
            if self.config.isolate_background {
                self.attach_background(engine, &store, page, &mut diagnostics);
            }
        }

        log::info!(
            "extracted {} of {} pages with {} diagnostics",
            pages.len(),
            page_count,
            diagnostics.len()
        );
        Ok(Extraction {
            metadata,
            pages,
            diagnostics,
        })
    }

    /// Classify, detect tables and emit one page. No page comes back if
    /// emission failed; that failure is then the page's only diagnostic.
    fn analyze(&self, input: PageInput) -> (Option<ExtractedPage>, Diagnostics) {
        let number = input.info.number;
        let classifier = ElementClassifier::new(ClassifierConfig::from(&self.config), self.mapper);
        let (mut elements, mut diagnostics) = classifier.classify(number, &input.primitives);

        if self.config.detect_tables {
            let detector = TableDetector::with_config(TableDetectorConfig::from(&self.config), self.mapper);
            match detector.detect(number, elements.clone()) {
                Ok((tables, remaining)) => {
                    if !tables.is_empty() {
                        log::debug!("page {}: {} tables detected", number, tables.len());
                    }
                    elements = remaining;
                    elements.extend(tables);
                }
                Err(e) => diagnostics.page(number, e),
            }
        }

        let emitter = MarkupEmitter::new(self.mapper);
        match emitter.emit(&input.info, &elements) {
            Ok((markup, emit_diagnostics)) => {
                diagnostics.extend(emit_diagnostics);
                let page = ExtractedPage {
                    info: input.info,
                    elements,
                    markup,
                };
                (Some(page), diagnostics)
            }
            Err(e) => {
                let mut failed = Diagnostics::new();
                failed.page(number, as_extraction_error(number, e));
                (None, failed)
            }
        }
    }

    fn resolve_images<E: DocumentEngine + ?Sized>(
        &self,
        engine: &E,
        store: &AssetStore,
        page: &mut ExtractedPage,
        diagnostics: &mut Diagnostics,
    ) {
        let number = page.info.number;
        for (index, element) in page.markup.elements.iter_mut().enumerate() {
            let MarkupPayload::Image { source } = &mut element.payload else {
                continue;
            };
            let ImageSource::Unresolved { image_ref } = &*source else {
                continue;
            };
            let resolved = engine
                .image_data(number, image_ref)
                .and_then(|data| store.store_image(number, index, data));
            match resolved {
                Ok(resolved) => *source = resolved,
                Err(e) => diagnostics.element(number, index, e),
            }
        }
    }

    fn attach_background<E: DocumentEngine + ?Sized>(
        &self,
        engine: &E,
        store: &AssetStore,
        page: &mut ExtractedPage,
        diagnostics: &mut Diagnostics,
    ) {
        let isolator = BackgroundIsolator::from_config(&self.config);
        let number = page.info.number;
        let layer = isolator
            .isolate(engine, &page.info, &page.elements)
            .and_then(|raster| {
                let (raster_width, raster_height) = (raster.width, raster.height);
                let source = store.store_background(number, raster.png)?;
                Ok(BackgroundLayer {
                    source,
                    raster_width,
                    raster_height,
                })
            });
        match layer {
            Ok(layer) => page.markup.background = Some(layer),
            Err(e) => diagnostics.page(number, e),
        }
    }

    /// Rebuild a PDF from markup pages.
    ///
    /// When no page yields a single placement and an original document is
    /// available, its pages are copied verbatim instead and a
    /// document-level diagnostic records the fallback. Without an original
    /// this is an [`Error::Assembly`].
    pub fn reconstruct<E: DocumentEngine + ?Sized>(
        &self,
        document: &MarkupDocument,
        original: Option<&E>,
    ) -> Result<Reconstruction> {
        let reconstructor = ElementReconstructor::new(self.mapper, self.config.missing_position)?;
        let planned: Vec<(PagePlan, Diagnostics)> = if self.config.parallel {
            document
                .pages
                .par_iter()
                .map(|page| reconstructor.reconstruct_page(page))
                .collect()
        } else {
            document
                .pages
                .iter()
                .map(|page| reconstructor.reconstruct_page(page))
                .collect()
        };

        let mut diagnostics = Diagnostics::new();
        let mut plans = Vec::with_capacity(planned.len());
        for (plan, page_diagnostics) in planned {
            diagnostics.extend(page_diagnostics);
            plans.push(plan);
        }

        let placed: usize = plans.iter().map(|p| p.commands.len()).sum();
        if placed == 0 {
            return self.fallback(document, original, diagnostics);
        }

        let mut writer = PdfWriter::new();
        for plan in &plans {
            let written =
                writer.add_rotated_page(plan.width, plan.height, plan.rotation, &plan.commands);
            if let Err(e) = written {
                diagnostics.page(plan.number, Error::reconstruction(plan.number, e.to_string()));
                self.replace_page(&mut writer, plan, original, &mut diagnostics);
            }
        }
        writer.set_metadata(&self.output_metadata(document, original));

        let page_count = writer.page_count();
        let pdf = writer.finish()?;
        log::info!(
            "rebuilt {} pages ({} placements) with {} diagnostics",
            page_count,
            placed,
            diagnostics.len()
        );
        Ok(Reconstruction {
            pdf,
            page_count,
            fallback: false,
            diagnostics,
        })
    }

    /// Read a markup document from HTML and rebuild it.
    ///
    /// Markup that cannot be read at all counts as zero pages, which takes
    /// the verbatim-copy fallback when `original` is given.
    pub fn reconstruct_html<E: DocumentEngine + ?Sized>(
        &self,
        html: &str,
        base_dir: Option<PathBuf>,
        original: Option<&E>,
    ) -> Result<Reconstruction> {
        let mut reader = MarkupReader::new(self.mapper)?;
        if let Some(dir) = base_dir {
            reader = reader.with_base_dir(dir);
        }
        let mut tree = HtmlTree::parse(html);

        let (document, read_diagnostics) = match reader.read(&mut tree) {
            Ok(read) => read,
            Err(e) => {
                let mut diagnostics = Diagnostics::new();
                diagnostics.document(e);
                let metadata = tree_metadata(&tree);
                (
                    MarkupDocument {
                        pages: Vec::new(),
                        metadata,
                    },
                    diagnostics,
                )
            }
        };

        let mut result = self.reconstruct(&document, original)?;
        let mut diagnostics = read_diagnostics;
        diagnostics.extend(result.diagnostics);
        result.diagnostics = diagnostics;
        Ok(result)
    }

    fn fallback<E: DocumentEngine + ?Sized>(
        &self,
        document: &MarkupDocument,
        original: Option<&E>,
        mut diagnostics: Diagnostics,
    ) -> Result<Reconstruction> {
        let Some(original) = original else {
            return Err(Error::Assembly(
                "markup produced no placeable elements and no original document was given".to_string(),
            ));
        };

        let numbers: Vec<u32> = (1..=original.page_count()).collect();
        if numbers.is_empty() {
            return Err(Error::Assembly("original document has no pages".to_string()));
        }
        let mut writer = PdfWriter::new();
        original.copy_pages_into(&numbers, &mut writer)?;
        writer.set_metadata(&self.output_metadata(document, Some(original)));
        diagnostics.document(Error::Assembly(format!(
            "markup produced no placeable elements; copied {} original pages verbatim",
            numbers.len()
        )));

        let page_count = writer.page_count();
        let pdf = writer.finish()?;
        Ok(Reconstruction {
            pdf,
            page_count,
            fallback: true,
            diagnostics,
        })
    }

    /// Keep page order when one page cannot be drawn: copy the original page
    /// if there is one, otherwise leave a blank page of the same size.
    fn replace_page<E: DocumentEngine + ?Sized>(
        &self,
        writer: &mut PdfWriter,
        plan: &PagePlan,
        original: Option<&E>,
        diagnostics: &mut Diagnostics,
    ) {
        if let Some(original) = original.filter(|o| plan.number <= o.page_count()) {
            match original.copy_pages_into(&[plan.number], writer) {
                Ok(()) => return,
                Err(e) => diagnostics.page(plan.number, e),
            }
        }
        writer.add_blank_page(plan.width, plan.height);
    }

    fn output_metadata<E: DocumentEngine + ?Sized>(
        &self,
        document: &MarkupDocument,
        original: Option<&E>,
    ) -> Metadata {
        if document.metadata.text_fields().is_empty() {
            if let Some(original) = original {
                return original.metadata();
            }
        }
        document.metadata.clone()
    }
}

fn read_page<E: DocumentEngine + ?Sized>(engine: &E, number: u32) -> Result<PageInput> {
    let info = engine.page(number)?;
    let primitives = engine.primitives(number)?;
    log::debug!("page {}: {} primitives", number, primitives.len());
    Ok(PageInput { info, primitives })
}

fn as_extraction_error(page: u32, error: Error) -> Error {
    match error {
        Error::Extraction { .. } => error,
        other => Error::extraction(page, other.to_string()),
    }
}

fn tree_metadata<T: MarkupTree>(tree: &T) -> Metadata {
    let mut metadata = Metadata::default();
    for name in ["title", "author", "subject", "keywords", "creator"] {
        if let Some(value) = tree.meta(name) {
            metadata.set_text_field(name, value);
        }
    }
    metadata
}
