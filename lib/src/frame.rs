//! Owned storage for the content of a single frame.

/// A resizable byte buffer holding one frame.
///
/// A `Frame` can be passed directly to [`crate::device::OutputDevice::display_frame`].
///
/// # Examples
///
/// ```
/// # use loopcam::frame::Frame;
/// let mut frame = Frame::new();
/// frame.set_data(&[0x10, 0x80, 0x10, 0x80]);
/// assert_eq!(frame.view(), &[0x10, 0x80, 0x10, 0x80]);
///
/// frame.resize(2);
/// assert_eq!(frame.data_size(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a frame of `size` zeroed bytes.
    pub fn with_size(size: usize) -> Self {
        Frame {
            data: vec![0; size],
        }
    }

    /// Direct access to the storage, for producers that fill frames in place.
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read-only view of the current content.
    pub fn view(&self) -> &[u8] {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Replaces the content of the frame with a copy of `data`.
    pub fn set_data(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
    }

    /// Makes the frame exactly `size` bytes long. Newly added bytes are zeroed.
    pub fn resize(&mut self, size: usize) {
        self.data.resize(size, 0);
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Frame {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Frame { data }
    }
}

#[cfg(test)]
mod tests {
    use super::Frame;

    #[test]
    fn test_new_frame_is_empty() {
        let frame = Frame::new();
        assert_eq!(frame.data_size(), 0);
        assert!(frame.view().is_empty());
    }

    #[test]
    fn test_set_data() {
        let mut frame = Frame::new();
        let data: Vec<u8> = (0..=255).collect();

        frame.set_data(&data);
        assert_eq!(frame.data_size(), 256);
        assert_eq!(frame.view(), data.as_slice());

        // Shorter data replaces the content entirely.
        frame.set_data(&[1, 2, 3]);
        assert_eq!(frame.view(), &[1, 2, 3]);

        frame.set_data(&[]);
        assert_eq!(frame.data_size(), 0);
    }

    #[test]
    fn test_resize() {
        let mut frame = Frame::with_size(1280 * 720 * 2);
        assert_eq!(frame.data_size(), 1843200);

        for size in [0, 1, 100, 4, 4, 0, 640 * 480 * 2] {
            frame.resize(size);
            assert_eq!(frame.data_size(), size);
            assert_eq!(frame.view().len(), size);
        }
    }

    #[test]
    fn test_resize_keeps_prefix() {
        let mut frame = Frame::from(vec![1, 2, 3, 4]);
        frame.resize(2);
        assert_eq!(frame.view(), &[1, 2]);
        frame.resize(4);
        assert_eq!(&frame.view()[..2], &[1, 2]);
    }

    #[test]
    fn test_write_in_place() {
        let mut frame = Frame::with_size(4);
        frame.buffer_mut().copy_from_slice(&[0x10, 0x80, 0x10, 0x80]);
        frame.buffer().push(0xff);

        assert_eq!(frame.as_ref(), &[0x10, 0x80, 0x10, 0x80, 0xff]);
        frame.as_mut()[4] = 0;
        assert_eq!(frame.view()[4], 0);
    }
}
