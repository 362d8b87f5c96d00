use crate::foundation::error::{FolioError, FolioResult};
use crate::print::postprocess::{IccProfile, PageEncoding, ProcessedPage};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};

/// Assembles the final document: one PDF page per exported book page, sized
/// exactly to the physical page dimensions, each filled edge to edge by its
/// post-processed raster. The document is serialized once, in `finish`.
pub struct PdfAssembler {
    pdf: Pdf,
    page_w_pt: f64,
    page_h_pt: f64,
    catalog_id: Ref,
    pages_id: Ref,
    icc_id: Option<Ref>,
    page_ids: Vec<Ref>,
    next_ref: i32,
}

impl PdfAssembler {
    /// `icc` is embedded once and referenced by every CMYK page image; RGB
    /// pages ignore it.
    pub fn new(page_w_pt: f64, page_h_pt: f64, icc: Option<&IccProfile>) -> FolioResult<Self> {
        if !(page_w_pt > 0.0 && page_h_pt > 0.0) {
            return Err(FolioError::pdf("page dimensions must be positive"));
        }
        let mut pdf = Pdf::new();
        let catalog_id = Ref::new(1);
        let pages_id = Ref::new(2);
        let mut next_ref = 3;

        let icc_id = icc.map(|profile| {
            let id = Ref::new(next_ref);
            next_ref += 1;
            let mut stream = pdf.icc_profile(id, &profile.bytes);
            stream.n(4);
            stream.alternate().device_cmyk();
            stream.finish();
            id
        });

        Ok(Self {
            pdf,
            page_w_pt,
            page_h_pt,
            catalog_id,
            pages_id,
            icc_id,
            page_ids: Vec::new(),
            next_ref,
        })
    }

    fn alloc(&mut self) -> Ref {
        let id = Ref::new(self.next_ref);
        self.next_ref += 1;
        id
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append one page. Pages land in call order, which is the filtered
    /// page-range order upstream.
    pub fn add_page(&mut self, image: &ProcessedPage) -> FolioResult<()> {
        if image.width_px == 0 || image.height_px == 0 {
            return Err(FolioError::pdf("page image has zero dimensions"));
        }
        let xobj_id = self.alloc();
        let content_id = self.alloc();
        let page_id = self.alloc();

        {
            let mut xobj = self.pdf.image_xobject(xobj_id, &image.data);
            xobj.width(image.width_px as i32);
            xobj.height(image.height_px as i32);
            xobj.bits_per_component(8);
            match image.encoding {
                PageEncoding::Jpeg => {
                    xobj.filter(Filter::DctDecode);
                    xobj.color_space().device_rgb();
                }
                PageEncoding::CmykFlate => {
                    xobj.filter(Filter::FlateDecode);
                    match self.icc_id {
                        Some(icc) => {
                            xobj.color_space().icc_based(icc);
                        }
                        None => {
                            xobj.color_space().device_cmyk();
                        }
                    }
                }
            }
        }

        // Scale the unit image square to fill the page exactly.
        let mut content = Content::new();
        content.save_state();
        content.transform([
            self.page_w_pt as f32,
            0.0,
            0.0,
            self.page_h_pt as f32,
            0.0,
            0.0,
        ]);
        content.x_object(Name(b"Im0"));
        content.restore_state();
        self.pdf.stream(content_id, &content.finish());

        {
            let mut page = self.pdf.page(page_id);
            page.media_box(Rect::new(
                0.0,
                0.0,
                self.page_w_pt as f32,
                self.page_h_pt as f32,
            ));
            page.parent(self.pages_id);
            page.contents(content_id);
            page.resources().x_objects().pair(Name(b"Im0"), xobj_id);
        }

        self.page_ids.push(page_id);
        Ok(())
    }

    /// Serialize the document. Valid only after at least one page.
    pub fn finish(mut self) -> FolioResult<Vec<u8>> {
        if self.page_ids.is_empty() {
            return Err(FolioError::pdf("document has no pages"));
        }
        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        self.pdf
            .pages(self.pages_id)
            .kids(self.page_ids.iter().copied())
            .count(self.page_ids.len() as i32);
        Ok(self.pdf.finish())
    }
}
