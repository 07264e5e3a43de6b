use super::{DeviceConfig, DeviceOpenError, OutputBackend, QueryBufferError, V4l2Node};
use crate::ioctl::{
    DqBufError, GFmtError, MmapError, QBufError, QBuffer, ReqbufsError, SFmtError, StreamOnError,
};
use crate::Format;
use log::{debug, info, warn};
use nix::time::{clock_gettime, ClockId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Minimum number of buffers needed to rotate frames through the driver.
pub const MIN_BUFFERS: usize = 2;

#[derive(Debug, Error)]
pub enum FormatNegotiationError {
    #[error("error while setting format: {0}")]
    SetFormat(#[from] SFmtError),
    #[error("error while reading back format: {0}")]
    GetFormat(#[from] GFmtError),
}

#[derive(Debug, Error)]
pub enum BufferAllocationError {
    #[error("requested {requested} buffers, driver granted only {granted}")]
    TooFewBuffers { requested: u32, granted: usize },
    #[error("error while requesting buffers: {0}")]
    RequestBuffers(#[from] ReqbufsError),
}

#[derive(Debug, Error)]
pub enum BufferMapError {
    #[error("error while querying buffer: {0}")]
    Query(#[from] QueryBufferError),
    #[error("error while mapping buffer: {0}")]
    Map(#[from] MmapError),
    #[error("error while queueing buffer: {0}")]
    Queue(#[from] QBufError),
}

#[derive(Debug, Error)]
pub enum OutputDeviceError {
    #[error("cannot open device {}", .path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: DeviceOpenError,
    },
    #[error("format negotiation failed")]
    FormatNegotiation(#[source] FormatNegotiationError),
    #[error("not enough buffer memory")]
    InsufficientBufferMemory(#[source] BufferAllocationError),
    #[error("cannot set up buffer {index}")]
    BufferMap {
        index: usize,
        #[source]
        source: BufferMapError,
    },
    #[error("cannot start streaming")]
    StreamEnable(#[source] StreamOnError),
    #[error("frame of {size} bytes does not fit in buffers of {capacity} bytes")]
    BufferOverflow { size: usize, capacity: usize },
    #[error("no buffer has been released by the driver yet")]
    BufferUnavailable,
    #[error("error while dequeueing buffer")]
    Dequeue(#[source] DqBufError),
    #[error("error while queueing buffer {index}")]
    Queue {
        index: usize,
        #[source]
        source: QBufError,
    },
    #[error("driver returned buffer {index}, but only {num_buffers} buffers exist")]
    InvalidBufferIndex { index: usize, num_buffers: usize },
}

/// Whether the OUTPUT queue of a device is currently streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    Stopped,
    Streaming,
}

/// An output device that presents frames to the kernel through a pool of memory-mapped
/// buffers.
///
/// Buffers rotate strictly: each frame dequeues the next buffer the driver is done with, fills
/// it, and queues it back. A buffer that could not be queued back is reused by the next frame
/// instead of being dequeued again. The buffers are unmapped before the device is closed.
pub struct OutputDevice<B: OutputBackend = V4l2Node> {
    // Declared before `backend` so the mappings are dropped before the node.
    buffers: Vec<B::Mapping>,
    backend: B,
    path: PathBuf,
    format: Format,
    capacity: usize,
    state: StreamingState,
    next_index: usize,
    /// Buffer we own because queueing it failed.
    pending: Option<usize>,
    frames_displayed: u64,
}

impl OutputDevice<V4l2Node> {
    /// Opens the device node at `path` and starts streaming on its output queue.
    pub fn open<P: AsRef<Path>>(path: P, config: &DeviceConfig) -> Result<Self, OutputDeviceError> {
        let path = path.as_ref();
        let node = V4l2Node::open(path, config).map_err(|source| OutputDeviceError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;

        Self::with_backend(node, path, config)
    }
}

impl<B: OutputBackend> OutputDevice<B> {
    /// Sets up streaming on an already opened `backend`.
    ///
    /// On failure, every buffer mapped so far is unmapped and `backend` is dropped.
    pub fn with_backend<P: AsRef<Path>>(
        mut backend: B,
        path: P,
        config: &DeviceConfig,
    ) -> Result<Self, OutputDeviceError> {
        let path = path.as_ref().to_path_buf();

        let requested = config.format();
        backend
            .set_format(requested)
            .map_err(|e| OutputDeviceError::FormatNegotiation(e.into()))?;
        let format = backend
            .get_format()
            .map_err(|e| OutputDeviceError::FormatNegotiation(e.into()))?;
        if format.width != requested.width
            || format.height != requested.height
            || format.pixelformat != requested.pixelformat
        {
            warn!(
                "Requested {}x{} {} on {}, driver applied {}",
                requested.width,
                requested.height,
                requested.pixelformat,
                path.display(),
                format
            );
        }
        debug!("Negotiated format on {}: {}", path.display(), format);

        let count = config.requested_buffers();
        let granted = backend
            .request_buffers(count)
            .map_err(|e| OutputDeviceError::InsufficientBufferMemory(e.into()))?;
        if granted.lacks_mmap() {
            warn!(
                "{} does not advertise MMAP buffers ({:?})",
                path.display(),
                granted.capabilities
            );
        }
        let num_buffers = granted.count;
        debug!(
            "Requested {} buffers on {}, obtained {}",
            count,
            path.display(),
            num_buffers
        );
        if num_buffers < MIN_BUFFERS {
            return Err(OutputDeviceError::InsufficientBufferMemory(
                BufferAllocationError::TooFewBuffers {
                    requested: count,
                    granted: num_buffers,
                },
            ));
        }

        let buffers = map_buffers(&mut backend, num_buffers)?;
        let capacity = buffers
            .iter()
            .map(|mapping| mapping.as_ref().len())
            .min()
            .unwrap_or(0);

        backend
            .stream_on()
            .map_err(OutputDeviceError::StreamEnable)?;
        info!(
            "Streaming {} on {} with {} buffers of {} bytes",
            format,
            path.display(),
            buffers.len(),
            capacity
        );

        Ok(OutputDevice {
            buffers,
            backend,
            path,
            format,
            capacity,
            state: StreamingState::Streaming,
            next_index: 0,
            pending: None,
            frames_displayed: 0,
        })
    }

    /// Presents `frame` to the driver.
    ///
    /// This waits until the driver releases the next buffer, unless the device has been
    /// configured with [`DeviceConfig::non_blocking_dqbuf`], in which case
    /// [`OutputDeviceError::BufferUnavailable`] is returned.
    pub fn display_frame<F: AsRef<[u8]>>(&mut self, frame: F) -> Result<(), OutputDeviceError> {
        let data = frame.as_ref();
        if data.len() > self.capacity {
            return Err(OutputDeviceError::BufferOverflow {
                size: data.len(),
                capacity: self.capacity,
            });
        }

        let index = match self.pending.take() {
            Some(index) => index,
            None => self.dequeue_buffer()?,
        };

        self.buffers[index].as_mut()[..data.len()].copy_from_slice(data);
        let buffer = QBuffer::new(data.len()).set_timestamp(monotonic_time());
        if let Err(source) = self.backend.queue_buffer(index, buffer) {
            self.pending = Some(index);
            return Err(OutputDeviceError::Queue { index, source });
        }

        self.next_index = (index + 1) % self.buffers.len();
        self.frames_displayed += 1;

        Ok(())
    }

    /// Obtains the index of the next buffer released by the driver.
    fn dequeue_buffer(&mut self) -> Result<usize, OutputDeviceError> {
        let dqbuf = match self.backend.dequeue_buffer() {
            Ok(dqbuf) => dqbuf,
            Err(DqBufError::NotReady) => return Err(OutputDeviceError::BufferUnavailable),
            Err(e) => return Err(OutputDeviceError::Dequeue(e)),
        };

        let index = dqbuf.index();
        let num_buffers = self.buffers.len();
        if index >= num_buffers {
            return Err(OutputDeviceError::InvalidBufferIndex { index, num_buffers });
        }
        if index != self.next_index {
            warn!(
                "Expected buffer {} from the driver, got buffer {}",
                self.next_index, index
            );
        }
        if dqbuf.is_error() {
            warn!(
                "Driver flagged buffer {} of {} as erroneous",
                index,
                self.path.display()
            );
        }

        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The format applied by the driver, which can differ from the one requested.
    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn state(&self) -> StreamingState {
        self.state
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Largest frame that can be displayed, in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }
}

/// Queries, maps, clears and queues each of the `num_buffers` buffers of `backend`.
fn map_buffers<B: OutputBackend>(
    backend: &mut B,
    num_buffers: usize,
) -> Result<Vec<B::Mapping>, OutputDeviceError> {
    let mut buffers = Vec::with_capacity(num_buffers);

    for index in 0..num_buffers {
        let map_err = |source: BufferMapError| OutputDeviceError::BufferMap { index, source };

        let query = backend
            .query_buffer(index)
            .map_err(|e| map_err(e.into()))?;
        let mut mapping = backend
            .map_buffer(&query)
            .map_err(|e| map_err(e.into()))?;
        mapping.as_mut().fill(0);
        backend
            .queue_buffer(index, QBuffer::new(0))
            .map_err(|e| map_err(e.into()))?;

        buffers.push(mapping);
    }

    Ok(buffers)
}

/// Current time of the monotonic clock, used to stamp outgoing frames.
fn monotonic_time() -> Duration {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(now) => Duration::from(now),
        Err(e) => {
            warn!("Cannot read monotonic clock: {}", e);
            Duration::ZERO
        }
    }
}

impl<B: OutputBackend> Drop for OutputDevice<B> {
    fn drop(&mut self) {
        if self.state == StreamingState::Streaming {
            if let Err(e) = self.backend.stream_off() {
                warn!("Error while stopping {}: {}", self.path.display(), e);
            }
            self.state = StreamingState::Stopped;
        }
        debug!(
            "Releasing {} buffers of {} after {} frames",
            self.buffers.len(),
            self.path.display(),
            self.frames_displayed
        );
    }
}
