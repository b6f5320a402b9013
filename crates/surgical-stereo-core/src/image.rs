use crate::ImageError;

/// Borrowed single-channel 8-bit image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl<'a> GrayImageView<'a> {
    /// Wrap a raw buffer, checking size and length.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, ImageError> {
        let view = Self {
            width,
            height,
            data,
        };
        view.validate()?;
        Ok(view)
    }

    pub fn validate(&self) -> Result<(), ImageError> {
        check_buffer(self.width, self.height, 1, self.data.len())
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn as_image(&self) -> ImageView<'a> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: 1,
            data: self.data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Borrowed interleaved 8-bit image with one (grey) or three (RGB) channels.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: &'a [u8],
}

impl<'a> ImageView<'a> {
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        data: &'a [u8],
    ) -> Result<Self, ImageError> {
        let view = Self {
            width,
            height,
            channels,
            data,
        };
        view.validate()?;
        Ok(view)
    }

    /// Check dimensions, channel count and buffer length.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.channels != 1 && self.channels != 3 {
            return Err(ImageError::Channels {
                expected: "1 or 3",
                got: self.channels,
            });
        }
        check_buffer(self.width, self.height, self.channels, self.data.len())
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Single-channel view, available only for grey images.
    pub fn as_gray(&self) -> Option<GrayImageView<'a>> {
        (self.channels == 1).then_some(GrayImageView {
            width: self.width,
            height: self.height,
            data: self.data,
        })
    }

    /// RGB triple at `(x, y)`; grey pixels are replicated.
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * self.channels;
        if self.channels == 1 {
            let v = self.data[i];
            [v, v, v]
        } else {
            [self.data[i], self.data[i + 1], self.data[i + 2]]
        }
    }

    /// Luma conversion (ITU-R BT.601 weights, channels in R,G,B order).
    pub fn to_gray(&self) -> GrayImage {
        if self.channels == 1 {
            return GrayImage {
                width: self.width,
                height: self.height,
                data: self.data.to_vec(),
            };
        }
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

fn check_buffer(width: usize, height: usize, channels: usize, len: usize) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::Empty { width, height });
    }
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(ImageError::Empty { width, height })?;
    if len != expected {
        return Err(ImageError::BufferLength { expected, got: len });
    }
    Ok(())
}
