//! Image embedding
//!
//! JPEG data is embedded unchanged behind `DCTDecode`. PNG data is decoded,
//! split into color samples and an optional alpha soft mask, and stored
//! Flate-compressed.

use std::fmt;
use std::str::FromStr;
use image::GenericImageView;
use log::debug;

use crate::document::Document;
use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Filter, Object, Stream};
use super::content::{add_resource, append_content, ContentBuilder};

/// Image formats accepted by [`add_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// File extension used for output files
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Jpeg => write!(f, "JPEG"),
            ImageFormat::Png => write!(f, "PNG"),
        }
    }
}

impl FromStr for ImageFormat {
    type Err = PDFError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(PDFError::UnsupportedImageFormat(other.to_string())),
        }
    }
}

/// Display size overrides for [`add_image`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageOptions {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl ImageOptions {
    pub fn with_size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
}

impl ColorSpace {
    fn from_components(components: u8) -> Option<Self> {
        match components {
            1 => Some(ColorSpace::DeviceGray),
            3 => Some(ColorSpace::DeviceRGB),
            4 => Some(ColorSpace::DeviceCMYK),
            _ => None,
        }
    }

    fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRGB => "DeviceRGB",
            ColorSpace::DeviceCMYK => "DeviceCMYK",
        }
    }
}

/// Decoded image ready to become an image XObject
#[derive(Debug)]
struct ImageData {
    width: u32,
    height: u32,
    color_space: ColorSpace,
    filter: Filter,
    data: Vec<u8>,
    soft_mask: Option<Vec<u8>>,
}

impl ImageData {
    fn from_jpeg(data: &[u8]) -> PDFResult<Self> {
        let (width, height, components) = parse_jpeg_header(data)?;
        let color_space = ColorSpace::from_components(components).ok_or_else(|| {
            PDFError::UnsupportedImageFormat(format!("JPEG with {} color components", components))
        })?;
        Ok(Self {
            width,
            height,
            color_space,
            filter: Filter::DCTDecode,
            data: data.to_vec(),
            soft_mask: None,
        })
    }

    fn from_png(data: &[u8]) -> PDFResult<Self> {
        let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Png)
            .map_err(|e| PDFError::UnsupportedImageFormat(format!("PNG does not decode: {}", e)))?;
        let (width, height) = decoded.dimensions();
        let color = decoded.color();

        let (color_space, samples, alpha) = match (color.has_color(), color.has_alpha()) {
            (false, false) => (ColorSpace::DeviceGray, decoded.to_luma8().into_raw(), None),
            (false, true) => {
                let pixels = decoded.to_luma_alpha8().into_raw();
                let gray: Vec<u8> = pixels.chunks_exact(2).map(|p| p[0]).collect();
                let alpha: Vec<u8> = pixels.chunks_exact(2).map(|p| p[1]).collect();
                (ColorSpace::DeviceGray, gray, Some(alpha))
            }
            (true, false) => (ColorSpace::DeviceRGB, decoded.to_rgb8().into_raw(), None),
            (true, true) => {
                let pixels = decoded.to_rgba8().into_raw();
                let rgb: Vec<u8> = pixels.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
                let alpha: Vec<u8> = pixels.chunks_exact(4).map(|p| p[3]).collect();
                (ColorSpace::DeviceRGB, rgb, Some(alpha))
            }
        };

        let filter = Filter::FlateDecode;
        Ok(Self {
            width,
            height,
            color_space,
            data: filter.encode(&samples)?,
            soft_mask: alpha.map(|a| filter.encode(&a)).transpose()?,
            filter,
        })
    }

    fn image_dict(&self, color_space: ColorSpace) -> Dictionary {
        let mut dict = Dictionary::with_type("XObject");
        dict.set("Subtype", Object::name("Image"));
        dict.set("Width", self.width);
        dict.set("Height", self.height);
        dict.set("ColorSpace", Object::name(color_space.pdf_name()));
        dict.set("BitsPerComponent", 8);
        dict.set("Filter", Object::name(self.filter.name()));
        dict
    }
}

/// Read width, height and component count from the first frame header
fn parse_jpeg_header(data: &[u8]) -> PDFResult<(u32, u32, u8)> {
    let invalid = |reason: &str| PDFError::UnsupportedImageFormat(format!("JPEG {}", reason));
    if !data.starts_with(&[0xFF, 0xD8]) {
        return Err(invalid("start-of-image marker missing"));
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;
        match marker {
            // Fill bytes and standalone markers carry no length
            0xFF => pos -= 1,
            0x01 | 0xD0..=0xD7 => {}
            0xD9 | 0xDA => break,
            _ => {
                let length = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
                let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
                if is_frame {
                    let frame = data
                        .get(pos + 2..pos + 8)
                        .ok_or_else(|| invalid("frame header truncated"))?;
                    let height = u32::from(u16::from_be_bytes([frame[1], frame[2]]));
                    let width = u32::from(u16::from_be_bytes([frame[3], frame[4]]));
                    if width == 0 || height == 0 {
                        return Err(invalid("frame has no size"));
                    }
                    return Ok((width, height, frame[5]));
                }
                pos += length;
            }
        }
    }
    Err(invalid("frame header missing"))
}

/// Draw an image with its lower-left corner at (`x`, `y`)
///
/// `format` names the encoding of `bytes` (`jpg`, `jpeg` or `png`). The
/// image is drawn at its pixel size in points unless `options` overrides
/// either dimension.
pub fn add_image(
    document: &Document,
    page_index: usize,
    bytes: &[u8],
    format: &str,
    x: f64,
    y: f64,
    options: &ImageOptions,
) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let format: ImageFormat = format.parse()?;
    let image = match format {
        ImageFormat::Jpeg => ImageData::from_jpeg(bytes)?,
        ImageFormat::Png => ImageData::from_png(bytes)?,
    };
    debug!("Embedding {}x{} {} image on page {}", image.width, image.height, format, page_index);

    let mut output = document.clone();
    let page = output.page_id(page_index)?;

    let mut dict = image.image_dict(image.color_space);
    if let Some(mask) = &image.soft_mask {
        let mask_dict = image.image_dict(ColorSpace::DeviceGray);
        let mask_id = output.store.add(Stream::new(mask_dict, mask.clone()).into());
        dict.set("SMask", mask_id);
    }
    let image_id = output.store.add(Stream::new(dict, image.data).into());
    let resource = add_resource(&mut output, page, "XObject", "Im", image_id)?;

    let width = options.width.unwrap_or(f64::from(image.width));
    let height = options.height.unwrap_or(f64::from(image.height));
    let operators = ContentBuilder::new()
        .transform([width, 0.0, 0.0, height, x, y])
        .paint_xobject(&resource)
        .finish();
    append_content(&mut output, page, operators)?;
    Ok(output)
}
