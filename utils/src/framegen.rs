use thiserror::Error;

/// Bytes per pixel of YUYV frames.
const BYTES_PER_PIXEL: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NewFrameGeneratorError {
    #[error("Invalid stride")]
    InvalidStride,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateFrameError {
    #[error("Provided buffer is too small")]
    BufferTooSmall,
}

/// Generates a moving test pattern in packed YUYV (4:2:2) format.
pub struct FrameGenerator {
    width: usize,
    height: usize,
    stride: usize,
    step: u32,
}

impl FrameGenerator {
    pub fn new(width: usize, height: usize, stride: usize) -> Result<Self, NewFrameGeneratorError> {
        if stride < width * BYTES_PER_PIXEL {
            return Err(NewFrameGeneratorError::InvalidStride);
        }

        Ok(FrameGenerator {
            width,
            height,
            stride,
            step: 0,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.stride * self.height
    }

    /// Number of frames generated so far.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn next_frame<S: AsMut<[u8]>>(&mut self, frame: &mut S) -> Result<(), GenerateFrameError> {
        let frame = frame.as_mut();

        if frame.len() < self.frame_size() {
            return Err(GenerateFrameError::BufferTooSmall);
        }

        self.gen_pattern(frame);
        self.step = self.step.wrapping_add(1);

        Ok(())
    }

    fn gen_pattern(&mut self, frame: &mut [u8]) {
        let step = self.step;
        let width = self.width;

        frame
            .chunks_exact_mut(self.stride)
            .take(self.height)
            .map(|l| &mut l[0..width * BYTES_PER_PIXEL])
            .enumerate()
            .for_each(|(y, line)| {
                // Each 4-byte group holds two pixels sharing their chroma: Y0 U Y1 V.
                line.chunks_exact_mut(4).enumerate().for_each(|(x, pixels)| {
                    let luma = step.wrapping_add((x ^ y) as u32) as u8;
                    pixels[0] = luma;
                    pixels[1] = step.wrapping_add((x * 2) as u32) as u8;
                    pixels[2] = luma;
                    pixels[3] = step.wrapping_add(y as u32) as u8;
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_stride() {
        assert_eq!(
            FrameGenerator::new(1280, 720, 1280).err(),
            Some(NewFrameGeneratorError::InvalidStride)
        );
        assert!(FrameGenerator::new(1280, 720, 2560).is_ok());
    }

    #[test]
    fn test_buffer_too_small() {
        let mut generator = FrameGenerator::new(64, 48, 128).unwrap();
        let mut frame = vec![0u8; generator.frame_size() - 1];

        assert_eq!(
            generator.next_frame(&mut frame),
            Err(GenerateFrameError::BufferTooSmall)
        );
        assert_eq!(generator.step(), 0);
    }

    #[test]
    fn test_pattern_moves() {
        let mut generator = FrameGenerator::new(64, 48, 128).unwrap();
        assert_eq!(generator.frame_size(), 64 * 48 * 2);

        let mut first = vec![0u8; generator.frame_size()];
        let mut second = vec![0u8; generator.frame_size()];
        generator.next_frame(&mut first).unwrap();
        generator.next_frame(&mut second).unwrap();

        assert_eq!(generator.step(), 2);
        assert_ne!(first, second);
        // Two pixels of a group share the same luma.
        assert_eq!(first[0], first[2]);
    }

    #[test]
    fn test_padding_untouched() {
        let mut generator = FrameGenerator::new(4, 2, 16).unwrap();
        let mut frame = vec![0xffu8; generator.frame_size()];
        generator.next_frame(&mut frame).unwrap();

        for line in frame.chunks_exact(16) {
            assert!(line[8..].iter().all(|&b| b == 0xff));
        }
    }
}
