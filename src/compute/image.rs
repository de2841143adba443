/// Bytes per pixel: four `f32` channels (RGBA).
pub(crate) const BYTES_PER_PIXEL: u32 = 16;

/// Row pitch granularity in pixels, so each row is a whole number of
/// `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` chunks.
const PITCH_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT / BYTES_PER_PIXEL;

/// Geometry of the rendered image: logical size plus row pitch in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageLayout {
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
}

impl ImageLayout {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pitch: width.div_ceil(PITCH_ALIGNMENT) * PITCH_ALIGNMENT,
        }
    }

    pub(crate) fn bytes_per_row(&self) -> u32 {
        self.pitch * BYTES_PER_PIXEL
    }

    pub(crate) fn pixel_count(&self) -> usize {
        self.pitch as usize * self.height as usize
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.pixel_count() * BYTES_PER_PIXEL as usize
    }

    pub(crate) fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.pitch as usize + x as usize
    }
}

/// Host-side copy of the rendered image, refilled by every readback.
#[derive(Debug)]
pub(crate) struct HostImage {
    layout: ImageLayout,
    bytes: Vec<u8>,
}

impl HostImage {
    pub(crate) fn new(layout: ImageLayout) -> Self {
        Self {
            layout,
            bytes: vec![0; layout.byte_len()],
        }
    }

    pub(crate) fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// RGBA value at `(x, y)`.
    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let start = self.layout.index(x, y) * BYTES_PER_PIXEL as usize;
        let texel = &self.bytes[start..start + BYTES_PER_PIXEL as usize];
        bytemuck::pod_read_unaligned(texel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_rounds_rows_to_copy_alignment() {
        let layout = ImageLayout::new(800, 600);
        assert_eq!(layout.pitch, 800);
        assert_eq!(layout.bytes_per_row() % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);

        let odd = ImageLayout::new(801, 3);
        assert_eq!(odd.pitch, 816);
        assert!(odd.pitch >= odd.width);
        assert_eq!(odd.byte_len(), 816 * 3 * 16);
    }

    #[test]
    fn pixel_reads_rgba_at_pitch_offset() {
        let layout = ImageLayout::new(4, 2);
        let mut image = HostImage::new(layout);
        let start = layout.index(1, 1) * BYTES_PER_PIXEL as usize;
        image.bytes_mut()[start..start + 16]
            .copy_from_slice(bytemuck::cast_slice(&[0.25f32, 0.5, 0.75, 1.0]));

        assert_eq!(image.pixel(1, 1), [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(image.pixel(0, 0), [0.0; 4]);
    }
}
