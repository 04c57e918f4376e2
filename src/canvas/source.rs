use std::fmt;
use std::sync::Arc;

use vello_cpu::peniko::color::{AlphaColor, Srgb};
use vello_cpu::peniko::{Extend, ImageQuality, ImageSampler};
use vello_cpu::{Image, Pixmap};

use crate::error::CollageError;

/// Decoded image bitmap shared between placed images.
///
/// Cloning is cheap. Duplicated images share one buffer, and the buffer is
/// released when the last image referencing it is removed from the canvas.
#[derive(Clone)]
pub struct ImageSource {
    inner: Arc<SourceData>,
}

struct SourceData {
    encoded: Vec<u8>,
    content_type: &'static str,
    pixmap: Arc<Pixmap>,
}

impl ImageSource {
    /// Decode an uploaded file. The encoded bytes are kept for persistence
    /// and for serving the blob back to clients.
    pub fn decode(encoded: Vec<u8>) -> Result<Self, CollageError> {
        let content_type = image::guess_format(&encoded)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        let rgba = image::load_from_memory(&encoded)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(CollageError::InvalidRequest("image has no pixels".to_string()));
        }
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(CollageError::InvalidRequest(format!(
                "image {width}x{height} exceeds {}px per side",
                u16::MAX
            )));
        };

        let mut may_have_opacities = false;
        let pixels = rgba
            .pixels()
            .map(|px| {
                let [r, g, b, a] = px.0;
                may_have_opacities |= a != 255;
                AlphaColor::<Srgb>::from_rgba8(r, g, b, a)
                    .premultiply()
                    .to_rgba8()
            })
            .collect();
        let pixmap = Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities);

        Ok(Self {
            inner: Arc::new(SourceData {
                encoded,
                content_type,
                pixmap: Arc::new(pixmap),
            }),
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.pixmap().width())
    }

    pub fn height(&self) -> u32 {
        u32::from(self.pixmap().height())
    }

    pub fn encoded(&self) -> &[u8] {
        &self.inner.encoded
    }

    pub fn content_type(&self) -> &'static str {
        self.inner.content_type
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.inner.pixmap
    }

    /// Paint drawing the bitmap once, bilinearly sampled.
    pub fn paint(&self) -> Image {
        self.paint_with(Extend::Pad, Extend::Pad)
    }

    /// Paint tiling the bitmap along the axes set to `Extend::Repeat`.
    pub fn paint_with(&self, x_extend: Extend, y_extend: Extend) -> Image {
        let mut sampler = ImageSampler::default();
        sampler.x_extend = x_extend;
        sampler.y_extend = y_extend;
        sampler.quality = ImageQuality::Medium;
        Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::clone(&self.inner.pixmap)),
            sampler,
        }
    }

    pub fn ptr_eq(&self, other: &ImageSource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to the underlying buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("content_type", &self.inner.content_type)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("encoded_len", &self.inner.encoded.len())
            .finish()
    }
}
