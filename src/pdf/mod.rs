//! PDF writer. Turns the page images stored for one chapter into a document with
//! one page per image, each page exactly the image's pixel size, and a small
//! attribution label stamped on every page.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{ColorType, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

use crate::model::{ChapterDocument, ImageAsset};
use crate::store::{FileStore, StoreError};

/// Label stamped on every page unless configured otherwise.
pub const DEFAULT_WATERMARK: &str = "tg@misfitsdev";

const WATERMARK_FONT_SIZE: i64 = 12;
const WATERMARK_X: i64 = 30;
const WATERMARK_Y: i64 = 30;

/// Errors from the PDF writer.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No page of {key} could be decoded; nothing to assemble.")]
    NoPages { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("PDF encoding failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Cannot write PDF {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF worker stopped: {0}")]
    Worker(String),

    #[error("Assembly of {key} was abandoned before the document was written")]
    Cancelled { key: String },
}

/// How the image samples are stored in the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Original JPEG bytes, embedded as-is.
    Dct { gray: bool },
    /// Decoded 8-bit RGB samples, deflated when the document is compressed.
    RawRgb,
}

#[derive(Debug)]
struct PageImage {
    asset: ImageAsset,
    encoding: Encoding,
}

/// Number of colour components declared in a JPEG's frame header, if one is found.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if bytes.get(..2) != Some(&[0xFF, 0xD8][..]) {
        return None;
    }
    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // Fill byte before a marker.
            0xFF => i += 1,
            0x01 | 0xD0..=0xD7 => i += 2,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                // length(2) precision(1) height(2) width(2) components(1)
                return bytes.get(i + 9).copied();
            }
            0xD9 | 0xDA => return None,
            _ => {
                let len = u16::from_be_bytes([*bytes.get(i + 2)?, *bytes.get(i + 3)?]);
                i += 2 + usize::from(len);
            }
        }
    }
    None
}

/// JPEG bytes are only passed through when the file really holds what `DeviceRGB` or
/// `DeviceGray` expects. The decoder converts CMYK/YCCK to RGB, so its colour type
/// alone cannot tell.
fn choose_encoding(format: ImageFormat, color: ColorType, components: Option<u8>) -> Encoding {
    match (format, color, components) {
        (ImageFormat::Jpeg, ColorType::Rgb8, Some(3)) => Encoding::Dct { gray: false },
        (ImageFormat::Jpeg, ColorType::L8, Some(1)) => Encoding::Dct { gray: true },
        _ => Encoding::RawRgb,
    }
}

fn decode_page(name: String, bytes: Vec<u8>) -> Result<PageImage, image::ImageError> {
    let format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    let (width, height) = (decoded.width(), decoded.height());
    let components = match format {
        ImageFormat::Jpeg => jpeg_components(&bytes),
        _ => None,
    };
    let encoding = choose_encoding(format, decoded.color(), components);
    let data = match encoding {
        Encoding::Dct { .. } => bytes,
        Encoding::RawRgb => decoded.into_rgb8().into_raw(),
    };
    Ok(PageImage {
        asset: ImageAsset {
            name,
            bytes: data,
            width,
            height,
        },
        encoding,
    })
}

/// Raises its flag when dropped. Held by [PdfAssembler::build] so a build future that
/// is dropped (chapter timeout) stops the blocking worker from writing the document.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Builds chapter documents from the file store.
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    watermark: String,
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_WATERMARK)
    }
}

impl PdfAssembler {
    pub fn new(watermark: impl Into<String>) -> Self {
        Self {
            watermark: watermark.into(),
        }
    }

    /// Assemble every image stored under `key`, in store order, into `<key>.pdf`.
    ///
    /// Images that fail to decode are skipped. Fails only when no page could be made
    /// or the document cannot be written.
    pub async fn build(&self, store: &FileStore, key: &str) -> Result<ChapterDocument, AssemblyError> {
        let files = store.read_all(key).await?;
        let path = store.document_path(key)?;
        let watermark = self.watermark.clone();
        let key = key.to_string();
        let out = path.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancelled));
        // Decoding and encoding are CPU bound.
        let page_count = tokio::task::spawn_blocking(move || {
            write_document(&key, files, &watermark, &out, &cancelled)
        })
        .await
        .map_err(|e| AssemblyError::Worker(e.to_string()))??;
        Ok(ChapterDocument { path, page_count })
    }
}

fn write_document(
    key: &str,
    files: Vec<(String, Vec<u8>)>,
    watermark: &str,
    out: &Path,
    cancelled: &AtomicBool,
) -> Result<usize, AssemblyError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut page_ids = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let page = match decode_page(name.clone(), bytes) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("{}/{}: cannot decode image: {}. Skipped.", key, name, e);
                continue;
            }
        };
        page_ids.push(add_page(&mut doc, pages_id, font_id, page)?);
    }
    if page_ids.is_empty() {
        return Err(AssemblyError::NoPages {
            key: key.to_string(),
        });
    }

    stamp_watermark(&mut doc, &page_ids, watermark)?;

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| AssemblyError::Write {
        path: out.to_path_buf(),
        source: e,
    })?;
    if cancelled.load(Ordering::SeqCst) {
        return Err(AssemblyError::Cancelled {
            key: key.to_string(),
        });
    }
    std::fs::write(out, buf).map_err(|e| AssemblyError::Write {
        path: out.to_path_buf(),
        source: e,
    })?;
    tracing::info!("wrote {} ({} pages)", out.display(), page_ids.len());
    Ok(page_ids.len())
}

/// Add one page sized to the image with the image drawn over the whole page.
fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    page: PageImage,
) -> Result<ObjectId, AssemblyError> {
    let PageImage { asset, encoding } = page;
    let (w, h) = (i64::from(asset.width), i64::from(asset.height));

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => w,
        "Height" => h,
        "BitsPerComponent" => 8_i64,
    };
    let image = match encoding {
        Encoding::Dct { gray } => {
            image_dict.set("ColorSpace", if gray { "DeviceGray" } else { "DeviceRGB" });
            image_dict.set("Filter", "DCTDecode");
            Stream::new(image_dict, asset.bytes).with_compression(false)
        }
        Encoding::RawRgb => {
            image_dict.set("ColorSpace", "DeviceRGB");
            Stream::new(image_dict, asset.bytes)
        }
    };
    let image_id = doc.add_object(image);

    let draw = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(h),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, draw.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(w),
            Object::Integer(h),
        ],
        "Contents" => vec![Object::Reference(content_id)],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    Ok(page_id)
}

/// Second pass: append the same label stream to every page's contents.
fn stamp_watermark(
    doc: &mut Document,
    page_ids: &[ObjectId],
    text: &str,
) -> Result<(), AssemblyError> {
    if text.is_empty() {
        return Ok(());
    }
    let label = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(WATERMARK_FONT_SIZE)],
            ),
            Operation::new("rg", vec![Object::Integer(0); 3]),
            Operation::new(
                "Td",
                vec![Object::Integer(WATERMARK_X), Object::Integer(WATERMARK_Y)],
            ),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let label_id = doc.add_object(Stream::new(dictionary! {}, label.encode()?));
    for id in page_ids {
        doc.get_object_mut(*id)?
            .as_dict_mut()?
            .get_mut(b"Contents")?
            .as_array_mut()?
            .push(Object::Reference(label_id));
    }
    Ok(())
}
