//! Palette-indexed raster images stored as zlib blobs.
//!
//! A blob decompresses to one plane (`width × height` color indices) or, for
//! double-layer images, two planes back to back: color indices followed by
//! transform/mask indices of the same size.

use thiserror::Error;

use crate::codec::{log_failure, CodecError, ZlibCodec};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image data is empty")]
    EmptyData,
    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Double-layer image data has odd length {len}")]
    OddDoubleLayer { len: usize },
    #[error("Image plane holds {actual} pixels, dimensions need {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// An 8-bit indexed image with an optional transform plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    width:        u32,
    height:       u32,
    image:        Vec<u8>,
    transform:    Vec<u8>,
    single_layer: bool,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        let mut img = Self::default();
        img.resize(width, height);
        img
    }

    /// Reallocate both planes for the new size.  Pixel contents are zeroed.
    /// A zero dimension leaves an empty image.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.width = 0;
            self.height = 0;
            self.image.clear();
            self.transform.clear();
            return;
        }
        let len = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.image = vec![0; len];
        self.transform = if self.single_layer { Vec::new() } else { vec![0; len] };
    }

    /// Drop the transform plane for good; later resizes do not bring it back.
    pub fn disable_transform_layer(&mut self) {
        self.single_layer = true;
        self.transform = Vec::new();
    }

    pub fn single_layer(&self) -> bool { self.single_layer }
    pub fn width(&self)  -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn image(&self) -> &[u8] { &self.image }
    pub fn image_mut(&mut self) -> &mut [u8] { &mut self.image }

    pub fn transform(&self) -> Option<&[u8]> {
        if self.single_layer { None } else { Some(&self.transform) }
    }

    pub fn transform_mut(&mut self) -> Option<&mut [u8]> {
        if self.single_layer { None } else { Some(&mut self.transform) }
    }

    /// Color index at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.image.get(y as usize * self.width as usize + x as usize).copied()
    }
}

/// Rebuild an image from a compressed blob.
///
/// The decompressed size is not known up front, so the codec grows its
/// buffer as needed.  With `double_layer` the payload must split evenly into
/// a color plane and a transform plane.
pub fn try_decode_image(
    codec:        &ZlibCodec,
    width:        u32,
    height:       u32,
    data:         &[u8],
    double_layer: bool,
) -> Result<Image, ImageError> {
    if data.is_empty() {
        return Err(ImageError::EmptyData);
    }
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }

    let raw = codec.decompress(data, 0)?;
    if double_layer && raw.len() % 2 == 1 {
        return Err(ImageError::OddDoubleLayer { len: raw.len() });
    }

    let plane = if double_layer { raw.len() / 2 } else { raw.len() };
    let expected = width as usize * height as usize;
    if expected != plane {
        return Err(ImageError::DimensionMismatch { expected, actual: plane });
    }

    let mut out = Image::default();
    if !double_layer {
        out.disable_transform_layer();
    }
    out.resize(width, height);

    out.image_mut().copy_from_slice(&raw[..plane]);
    if let Some(transform) = out.transform_mut() {
        transform.copy_from_slice(&raw[plane..]);
    }
    Ok(out)
}

/// Total form of [`try_decode_image`] with default codec options.
/// Any failure yields `Image::default()`.
pub fn decode_image(width: u32, height: u32, data: &[u8], double_layer: bool) -> Image {
    try_decode_image(&ZlibCodec::default(), width, height, data, double_layer).unwrap_or_else(|e| {
        match &e {
            ImageError::Codec(c) => log_failure("Failed to decode image", c),
            _ => tracing::debug!("Failed to decode image: {e}"),
        }
        Image::default()
    })
}

/// Compress an image into the blob layout [`try_decode_image`] reads.  The
/// transform plane is included when the image has one.
pub fn encode_image(codec: &ZlibCodec, img: &Image) -> Result<Vec<u8>, ImageError> {
    if img.is_empty() {
        return Err(ImageError::EmptyData);
    }
    let mut raw = Vec::with_capacity(img.image().len() * 2);
    raw.extend_from_slice(img.image());
    if let Some(transform) = img.transform() {
        raw.extend_from_slice(transform);
    }
    Ok(codec.compress(&raw)?)
}
