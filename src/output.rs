//! Writing scanned pages to files

use crate::Result;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Quality used for every JPEG the crate produces.
pub const JPEG_QUALITY: u8 = 50;

/// A4 in PDF points.
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;

/// File format for scanned pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Png,
    Jpeg,
    /// All pages in a single document.
    #[default]
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Pdf => "pdf",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "pdf" => Ok(Self::Pdf),
            other => Err(format!("unknown file format '{other}' (expected png, jpg or pdf)")),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encode `img` as JPEG, as grayscale when it has no colour.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    jpeg_ready(img).write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}

// The JPEG encoder takes neither alpha nor 16-bit channels.
fn jpeg_ready(img: &DynamicImage) -> DynamicImage {
    if img.color().has_color() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(img.to_luma8())
    }
}

/// Write a single page as PNG or JPEG.
pub fn write_image(img: &DynamicImage, path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Png => Ok(img.save_with_format(path, image::ImageFormat::Png)?),
        OutputFormat::Jpeg => {
            let mut file = BufWriter::new(File::create(path)?);
            jpeg_ready(img)
                .write_with_encoder(JpegEncoder::new_with_quality(&mut file, JPEG_QUALITY))?;
            file.flush()?;
            Ok(())
        }
        OutputFormat::Pdf => {
            let mut pdf = PdfWriter::new();
            pdf.add_page(img)?;
            pdf.save(path)
        }
    }
}

struct PdfPage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    gray: bool,
}

/// Collects pages and writes them as a PDF, one A4 page per image, each
/// image stretched over the whole page.
#[derive(Default)]
pub struct PdfWriter {
    pages: Vec<PdfPage>,
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self, img: &DynamicImage) -> Result<()> {
        let jpeg = encode_jpeg(img)?;
        self.pages.push(PdfPage {
            jpeg,
            width: img.width(),
            height: img.height(),
            gray: !img.color().has_color(),
        });
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut doc = self.document()?;
        doc.save_to(out)?;
        Ok(())
    }

    fn document(&self) -> Result<Document> {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let color_space = if page.gray { "DeviceGray" } else { "DeviceRGB" };
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(i64::from(page.width)),
                    "Height" => Object::Integer(i64::from(page.height)),
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => "DCTDecode",
                },
                page.jpeg.clone(),
            ));

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Real(PAGE_WIDTH),
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Real(PAGE_HEIGHT),
                            Object::Integer(0),
                            Object::Integer(0),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_WIDTH),
                    Object::Real(PAGE_HEIGHT),
                ],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("png".parse::<OutputFormat>(), Ok(OutputFormat::Png));
        assert_eq!("JPG".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("jpeg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("pdf".parse::<OutputFormat>(), Ok(OutputFormat::Pdf));
        assert!("tiff".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default(), OutputFormat::Pdf);
    }

    #[test]
    fn test_jpeg_of_gray_page_is_gray() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, image::Luma([90])));
        let jpeg = encode_jpeg(&img).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let back = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(back.color(), image::ColorType::L8);
    }

    #[test]
    fn test_pdf_structure() {
        let mut pdf = PdfWriter::new();
        pdf.add_page(&DynamicImage::ImageLuma8(GrayImage::new(4, 6))).unwrap();
        pdf.add_page(&DynamicImage::ImageRgb8(RgbImage::new(6, 4))).unwrap();
        assert_eq!(pdf.page_count(), 2);

        let mut bytes = Vec::new();
        pdf.write_to(&mut bytes).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(find(&bytes, b"/DeviceGray").is_some());
        assert!(find(&bytes, b"/DeviceRGB").is_some());
        assert!(find(&bytes, b"/DCTDecode").is_some());

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        for page_id in pages.values() {
            let page = doc.get_dictionary(*page_id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            assert_eq!(media_box.len(), 4);
            assert!(page.get(b"Contents").is_ok());
        }
    }

    #[test]
    fn test_empty_pdf_has_no_pages() {
        let mut bytes = Vec::new();
        PdfWriter::new().write_to(&mut bytes).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().is_empty());
    }

    #[test]
    fn test_write_png_and_jpeg_files() {
        let dir = tempfile::tempdir().unwrap();
        let img =
            DynamicImage::ImageLuma8(GrayImage::from_fn(5, 3, |x, _| image::Luma([x as u8 * 40])));

        let png = dir.path().join("page1.png");
        write_image(&img, &png, OutputFormat::Png).unwrap();
        assert_eq!(image::open(&png).unwrap().to_luma8(), img.to_luma8());

        let jpg = dir.path().join("page1.jpg");
        write_image(&img, &jpg, OutputFormat::Jpeg).unwrap();
        assert_eq!(image::open(&jpg).unwrap().width(), 5);
    }
}
