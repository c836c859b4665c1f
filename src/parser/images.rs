//! Image XObject decoding.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use super::fonts::resolve;
use crate::error::{Error, Result};
use crate::model::{ImageRef, Rgb};

/// Encoded image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageData {
    /// File extension for the MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }
}

/// File extension for a MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/jp2" => "jp2",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Parse an `"obj gen"` image reference.
pub fn parse_image_ref(image_ref: &ImageRef) -> Result<ObjectId> {
    let mut parts = image_ref.0.split_whitespace();
    let id = parts.next().and_then(|p| p.parse::<u32>().ok());
    let gen = parts.next().and_then(|p| p.parse::<u16>().ok()).unwrap_or(0);
    match id {
        Some(id) => Ok((id, gen)),
        None => Err(Error::Image(format!("invalid image reference '{}'", image_ref))),
    }
}

fn image_stream(doc: &LopdfDocument, id: ObjectId) -> Result<&Stream> {
    match doc.get_object(id)? {
        Object::Stream(stream) => Ok(stream),
        _ => Err(Error::Image(format!("object {} {} is not an image stream", id.0, id.1))),
    }
}

/// Last filter name of a stream, if any.
fn final_filter(stream: &Stream) -> Option<Vec<u8>> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(n) => Some(n.clone()),
        Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()).map(|n| n.to_vec()),
        _ => None,
    }
}

fn stream_data(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    } else {
        stream.content.clone()
    }
}

/// Extract an image as standalone encoded bytes.
///
/// JPEG and JPEG 2000 data passes through untouched; raw samples are
/// re-encoded as PNG.
pub fn extract_image(doc: &LopdfDocument, id: ObjectId) -> Result<ImageData> {
    let stream = image_stream(doc, id)?;
    match final_filter(stream).as_deref() {
        Some(b"DCTDecode") => Ok(ImageData {
            bytes: stream.content.clone(),
            mime: "image/jpeg".to_string(),
        }),
        Some(b"JPXDecode") => Ok(ImageData {
            bytes: stream.content.clone(),
            mime: "image/jp2".to_string(),
        }),
        _ => {
            let image = decode_samples(doc, stream)?;
            let image = apply_soft_mask(doc, stream, image);
            Ok(ImageData {
                bytes: encode_png(&image)?,
                mime: "image/png".to_string(),
            })
        }
    }
}

/// Decode an image to RGBA pixels, for rasterization.
pub fn decode_image(doc: &LopdfDocument, id: ObjectId) -> Result<RgbaImage> {
    let stream = image_stream(doc, id)?;
    let image = match final_filter(stream).as_deref() {
        Some(b"DCTDecode") => {
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)?
        }
        Some(b"JPXDecode") => {
            return Err(Error::Image("JPEG 2000 decoding is not supported".to_string()))
        }
        _ => decode_samples(doc, stream)?,
    };
    Ok(apply_soft_mask(doc, stream, image).to_rgba8())
}

/// Encode an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, palette: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

fn color_space(doc: &LopdfDocument, obj: Option<&Object>) -> Result<ColorSpace> {
    let Some(obj) = obj.and_then(|o| resolve(doc, o)) else {
        return Ok(ColorSpace::Gray);
    };
    match obj {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(Error::Image(format!(
                "unsupported color space {}",
                String::from_utf8_lossy(other)
            ))),
        },
        Object::Array(arr) => {
            let family = arr.first().and_then(|o| o.as_name().ok()).unwrap_or_default();
            match family {
                b"ICCBased" => {
                    let n = arr
                        .get(1)
                        .and_then(|o| resolve(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .and_then(|s| s.dict.get(b"N").ok())
                        .and_then(|n| n.as_i64().ok())
                        .unwrap_or(3);
                    Ok(match n {
                        1 => ColorSpace::Gray,
                        4 => ColorSpace::Cmyk,
                        _ => ColorSpace::Rgb,
                    })
                }
                b"CalRGB" => Ok(ColorSpace::Rgb),
                b"CalGray" => Ok(ColorSpace::Gray),
                b"Indexed" | b"I" => {
                    let base = color_space(doc, arr.get(1))?;
                    let palette = match arr.get(3).and_then(|o| resolve(doc, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(s)) => stream_data(s),
                        _ => Vec::new(),
                    };
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                other => Err(Error::Image(format!(
                    "unsupported color space {}",
                    String::from_utf8_lossy(other)
                ))),
            }
        }
        _ => Err(Error::Image("malformed color space".to_string())),
    }
}

/// Unpack one row of samples to 8-bit values.
fn unpack_row(row: &[u8], count: usize, bits: u8, scale: bool) -> Vec<u8> {
    match bits {
        8 => row.iter().take(count).copied().collect(),
        16 => row.chunks(2).take(count).map(|c| c[0]).collect(),
        1 | 2 | 4 => {
            let per_byte = 8 / bits as usize;
            let max = (1u16 << bits) - 1;
            let mut out = Vec::with_capacity(count);
            for i in 0..count {
                let byte = row.get(i / per_byte).copied().unwrap_or(0);
                let shift = 8 - bits as usize * (i % per_byte + 1);
                let v = (byte >> shift) as u16 & max;
                out.push(if scale { (v * 255 / max) as u8 } else { v as u8 });
            }
            out
        }
        _ => Vec::new(),
    }
}

/// `/Width` or `/Height` as a non-negative pixel count.
fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32> {
    let value = dict.get(key).and_then(|o| o.as_i64())?;
    u32::try_from(value).map_err(|_| {
        Error::Image(format!(
            "invalid image {} {}",
            String::from_utf8_lossy(key),
            value
        ))
    })
}

fn decode_samples(doc: &LopdfDocument, stream: &Stream) -> Result<DynamicImage> {
    let dict = &stream.dict;
    let (width, height) = (dimension(dict, b"Width")?, dimension(dict, b"Height")?);
    let is_mask = dict
        .get(b"ImageMask")
        .ok()
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);
    let bits = if is_mask {
        1
    } else {
        dict.get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8)
    };
    let bits: u8 = match bits {
        1 | 2 | 4 | 8 | 16 => bits as u8,
        other => return Err(Error::Image(format!("unsupported bit depth {}", other))),
    };
    if width == 0 || height == 0 {
        return Err(Error::Image("empty image".to_string()));
    }

    let space = if is_mask {
        ColorSpace::Gray
    } else {
        color_space(doc, dict.get(b"ColorSpace").ok())?
    };
    let comps = space.components();
    let data = stream_data(stream);
    let too_large = || Error::Image(format!("image {}x{} is too large", width, height));
    let (w, h) = (width as usize, height as usize);
    let row_samples = w.checked_mul(comps).ok_or_else(too_large)?;
    let stride = row_samples
        .checked_mul(bits as usize)
        .map(|n| n.div_ceil(8))
        .ok_or_else(too_large)?;
    let needed = stride.checked_mul(h).ok_or_else(too_large)?;
    if data.len() < needed {
        return Err(Error::Image(format!(
            "image data too short: {} < {}",
            data.len(),
            needed
        )));
    }

    let indexed = matches!(space, ColorSpace::Indexed { .. });
    let capacity = w.checked_mul(h).and_then(|n| n.checked_mul(3)).ok_or_else(too_large)?;
    let mut rgb = Vec::with_capacity(capacity);
    for row in data.chunks(stride).take(h) {
        let samples = unpack_row(row, row_samples, bits, !indexed);
        for px in samples.chunks(comps) {
            rgb.extend_from_slice(&sample_color(&space, px));
        }
    }

    if is_mask {
        // Stencil masks paint black where the sample is 0.
        let rgba: Vec<u8> = rgb
            .chunks(3)
            .flat_map(|c| [0, 0, 0, if c[0] == 0 { 255 } else { 0 }])
            .collect();
        let img = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| Error::Image("mask buffer size mismatch".to_string()))?;
        return Ok(DynamicImage::ImageRgba8(img));
    }

    if matches!(space, ColorSpace::Gray) {
        let gray: Vec<u8> = rgb.chunks(3).map(|c| c[0]).collect();
        let img = GrayImage::from_raw(width, height, gray)
            .ok_or_else(|| Error::Image("gray buffer size mismatch".to_string()))?;
        return Ok(DynamicImage::ImageLuma8(img));
    }

    let img = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| Error::Image("rgb buffer size mismatch".to_string()))?;
    Ok(DynamicImage::ImageRgb8(img))
}

fn sample_color(space: &ColorSpace, px: &[u8]) -> [u8; 3] {
    match space {
        ColorSpace::Gray => {
            let v = px.first().copied().unwrap_or(0);
            [v, v, v]
        }
        ColorSpace::Rgb => [
            px.first().copied().unwrap_or(0),
            px.get(1).copied().unwrap_or(0),
            px.get(2).copied().unwrap_or(0),
        ],
        ColorSpace::Cmyk => {
            let f = |i: usize| px.get(i).copied().unwrap_or(0) as f32 / 255.0;
            Rgb::from_cmyk(f(0), f(1), f(2), f(3)).to_rgb8()
        }
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            let idx = px.first().copied().unwrap_or(0) as usize * n;
            match palette.get(idx..idx + n) {
                Some(entry) => sample_color(base, entry),
                None => [0, 0, 0],
            }
        }
    }
}

/// Attach the `SMask` soft mask as alpha when it matches the image size.
fn apply_soft_mask(doc: &LopdfDocument, stream: &Stream, image: DynamicImage) -> DynamicImage {
    let Some(mask_stream) = stream
        .dict
        .get(b"SMask")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_stream().ok())
    else {
        return image;
    };
    let Ok(mask) = decode_samples(doc, mask_stream) else {
        return image;
    };
    let mask = mask.to_luma8();
    let mut rgba = image.to_rgba8();
    if mask.dimensions() != rgba.dimensions() {
        log::debug!("soft mask size differs from image, ignoring");
        return image;
    }
    for (px, m) in rgba.pixels_mut().zip(mask.pixels()) {
        px[3] = m[0];
    }
    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn add_rgb_image(doc: &mut LopdfDocument) -> ObjectId {
        let pixels: Vec<u8> = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "BitsPerComponent" => 8,
                "ColorSpace" => "DeviceRGB",
            },
            pixels,
        ))
    }

    #[test]
    fn test_parse_image_ref() {
        assert_eq!(parse_image_ref(&ImageRef("12 0".into())).unwrap(), (12, 0));
        assert_eq!(parse_image_ref(&ImageRef("7".into())).unwrap(), (7, 0));
        assert!(parse_image_ref(&ImageRef("x".into())).is_err());
    }

    #[test]
    fn test_bad_dimensions_are_image_errors() {
        let mut doc = LopdfDocument::with_version("1.5");
        let mut add = |width: i64, height: i64, bits: i64| {
            doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "BitsPerComponent" => bits,
                    "ColorSpace" => "DeviceRGB",
                },
                vec![0; 12],
            ))
        };
        let ids = [
            add(-1, 2, 8),
            add(2, -1, 8),
            add(u32::MAX as i64, u32::MAX as i64, 16),
            add(2, 2, 264),
            add(0, 2, 8),
        ];
        for id in ids {
            assert!(matches!(decode_image(&doc, id), Err(Error::Image(_))), "{:?}", id);
        }
    }

    #[test]
    fn test_raw_rgb_becomes_png() {
        let mut doc = LopdfDocument::with_version("1.5");
        let id = add_rgb_image(&mut doc);
        let data = extract_image(&doc, id).unwrap();
        assert_eq!(data.mime, "image/png");
        assert_eq!(data.extension(), "png");
        assert_eq!(&data.bytes[1..4], b"PNG");

        let rgba = decode_image(&doc, id).unwrap();
        assert_eq!(rgba.dimensions(), (2, 2));
        assert_eq!(rgba.get_pixel(1, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_jpeg_passthrough() {
        let mut doc = LopdfDocument::with_version("1.5");
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "Filter" => "DCTDecode",
            },
            jpeg.clone(),
        ));
        let data = extract_image(&doc, id).unwrap();
        assert_eq!(data.mime, "image/jpeg");
        assert_eq!(data.bytes, jpeg);
    }

    #[test]
    fn test_one_bit_gray() {
        let mut doc = LopdfDocument::with_version("1.5");
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 1,
                "BitsPerComponent" => 1,
                "ColorSpace" => "DeviceGray",
            },
            vec![0b1010_0000],
        ));
        let rgba = decode_image(&doc, id).unwrap();
        assert_eq!(rgba.get_pixel(0, 0).0[0], 255);
        assert_eq!(rgba.get_pixel(1, 0).0[0], 0);
    }

    #[test]
    fn test_short_data_is_an_error() {
        let mut doc = LopdfDocument::with_version("1.5");
        let id = doc.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 10,
                "Height" => 10,
                "ColorSpace" => "DeviceRGB",
            },
            vec![0; 5],
        ));
        assert!(matches!(extract_image(&doc, id), Err(Error::Image(_))));
    }
}
