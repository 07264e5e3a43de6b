//! In-memory stand-ins for the device node and the kernel module loader.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::rc::Rc;

use nix::errno::Errno;

use crate::bindings;
use crate::device::{OutputBackend, QueryBufferError};
use crate::ioctl::{
    BufferCapabilities, BufferFlags, DqBufError, DqBuffer, GFmtError, MmapError, QBufError,
    QBuffer, QueryBufError, QueryBuffer, ReqbufsError, RequestBuffers, SFmtError,
    StreamOffError, StreamOnError,
};
use crate::manager::{ModuleError, ModuleLoader, ModuleParams};
use crate::memory::MemoryType;
use crate::{Format, PixelFormat, QueueType};

/// What the fake driver has been asked to do, and how it should misbehave.
#[derive(Debug)]
pub struct FakeState {
    pub format: Format,
    /// Largest resolution the driver accepts.
    pub max_size: Option<(u32, u32)>,
    /// Pixel format the driver applies whatever is requested.
    pub forced_pixelformat: Option<PixelFormat>,
    /// Largest number of buffers the driver grants.
    pub max_buffers: usize,
    pub requested_buffers: Option<u32>,
    pub granted_buffers: usize,
    pub buffer_capabilities: BufferCapabilities,
    pub live_mappings: usize,
    pub unmapped: usize,
    /// Indices of the buffers owned by the driver, in the order they will be dequeued.
    pub queued: VecDeque<usize>,
    pub queue_history: Vec<(usize, usize)>,
    pub last_queued: Option<QBuffer>,
    pub streaming: bool,
    pub stream_off_calls: usize,
    pub closed: bool,
    pub unmapped_before_close: bool,

    pub fail_set_format: bool,
    pub fail_request_buffers: bool,
    pub fail_query_at: Option<usize>,
    pub fail_map_at: Option<usize>,
    pub fail_queue_at: Option<usize>,
    pub fail_queue: bool,
    pub fail_stream_on: bool,
    pub fail_stream_off: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            format: Default::default(),
            max_size: None,
            forced_pixelformat: None,
            max_buffers: 32,
            requested_buffers: None,
            granted_buffers: 0,
            buffer_capabilities: BufferCapabilities::SUPPORTS_MMAP,
            live_mappings: 0,
            unmapped: 0,
            queued: VecDeque::new(),
            queue_history: Vec::new(),
            last_queued: None,
            streaming: false,
            stream_off_calls: 0,
            closed: false,
            unmapped_before_close: false,
            fail_set_format: false,
            fail_request_buffers: false,
            fail_query_at: None,
            fail_map_at: None,
            fail_queue_at: None,
            fail_queue: false,
            fail_stream_on: false,
            fail_stream_off: false,
        }
    }
}

/// A device node that behaves like a YUYV output driver.
pub struct FakeBackend {
    state: Rc<RefCell<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend {
            state: Default::default(),
        }
    }

    /// Returns a handle to the state, which remains valid after the backend is dropped.
    pub fn state(&self) -> Rc<RefCell<FakeState>> {
        Rc::clone(&self.state)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        state.unmapped_before_close = state.live_mappings == 0;
    }
}

pub struct FakeMapping {
    data: Vec<u8>,
    state: Rc<RefCell<FakeState>>,
}

impl AsRef<[u8]> for FakeMapping {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for FakeMapping {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for FakeMapping {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live_mappings -= 1;
        state.unmapped += 1;
    }
}

impl OutputBackend for FakeBackend {
    type Mapping = FakeMapping;

    fn set_format(&mut self, format: Format) -> Result<Format, SFmtError> {
        let mut state = self.state.borrow_mut();
        if state.fail_set_format {
            return Err(SFmtError::DeviceBusy);
        }

        let (width, height) = match state.max_size {
            Some((w, h)) => (format.width.min(w), format.height.min(h)),
            None => (format.width, format.height),
        };
        state.format = Format {
            width,
            height,
            bytesperline: width * 2,
            sizeimage: width * height * 2,
            pixelformat: state.forced_pixelformat.unwrap_or(format.pixelformat),
            ..format
        };

        Ok(state.format)
    }

    fn get_format(&self) -> Result<Format, GFmtError> {
        Ok(self.state.borrow().format)
    }

    fn request_buffers(&mut self, count: u32) -> Result<RequestBuffers, ReqbufsError> {
        let mut state = self.state.borrow_mut();
        state.requested_buffers = Some(count);
        if state.fail_request_buffers {
            return Err(ReqbufsError::IoctlError(Errno::ENOMEM));
        }

        state.granted_buffers = (count as usize).min(state.max_buffers);
        Ok(RequestBuffers {
            count: state.granted_buffers,
            capabilities: state.buffer_capabilities,
        })
    }

    fn query_buffer(&self, index: usize) -> Result<QueryBuffer, QueryBufferError> {
        let state = self.state.borrow();
        if index >= state.granted_buffers || state.fail_query_at == Some(index) {
            return Err(QueryBufError::IoctlError(Errno::EINVAL));
        }

        Ok(QueryBuffer {
            index,
            flags: BufferFlags::empty(),
            mem_offset: index as u32 * state.format.sizeimage,
            length: state.format.sizeimage,
        })
    }

    fn map_buffer(&self, buffer: &QueryBuffer) -> Result<Self::Mapping, MmapError> {
        let mut state = self.state.borrow_mut();
        if state.fail_map_at == Some(buffer.index) {
            return Err(MmapError::IoctlError(Errno::ENOMEM));
        }

        state.live_mappings += 1;
        Ok(FakeMapping {
            // Stale content, so clearing can be checked.
            data: vec![0xaa; buffer.length as usize],
            state: Rc::clone(&self.state),
        })
    }

    fn queue_buffer(&mut self, index: usize, buffer: QBuffer) -> Result<(), QBufError> {
        let mut state = self.state.borrow_mut();
        if state.fail_queue || state.fail_queue_at == Some(index) {
            return Err(QBufError::IoctlError(Errno::EIO));
        }

        state.queued.push_back(index);
        state.queue_history.push((index, buffer.bytes_used as usize));
        state.last_queued = Some(buffer);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> Result<DqBuffer, DqBufError> {
        let index = self
            .state
            .borrow_mut()
            .queued
            .pop_front()
            .ok_or(DqBufError::NotReady)?;

        Ok(DqBuffer::from(bindings::v4l2_buffer {
            index: index as u32,
            type_: QueueType::VideoOutput as u32,
            memory: MemoryType::Mmap as u32,
            ..Default::default()
        }))
    }

    fn stream_on(&mut self) -> Result<(), StreamOnError> {
        let mut state = self.state.borrow_mut();
        if state.fail_stream_on {
            return Err(StreamOnError::InvalidQueue(QueueType::VideoOutput));
        }

        state.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<(), StreamOffError> {
        let mut state = self.state.borrow_mut();
        state.stream_off_calls += 1;
        if state.fail_stream_off {
            return Err(StreamOffError::IoctlError(Errno::EIO));
        }

        state.streaming = false;
        state.queued.clear();
        Ok(())
    }
}

/// Record of the calls made to a [`FakeLoader`].
#[derive(Debug, Default)]
pub struct LoaderState {
    pub loads: Vec<ModuleParams>,
    pub unloads: usize,
    pub fail_load: bool,
    pub fail_unload: bool,
    /// Whether loading the module makes the device node appear.
    pub creates_node: bool,
}

/// A module loader that creates a plain file in place of the device node.
pub struct FakeLoader {
    dev_dir: PathBuf,
    state: Rc<RefCell<LoaderState>>,
}

impl FakeLoader {
    pub fn new(dev_dir: &Path) -> Self {
        FakeLoader {
            dev_dir: dev_dir.to_path_buf(),
            state: Rc::new(RefCell::new(LoaderState {
                creates_node: true,
                ..Default::default()
            })),
        }
    }

    pub fn state(&self) -> Rc<RefCell<LoaderState>> {
        Rc::clone(&self.state)
    }

    fn node_path(&self, params: &ModuleParams) -> PathBuf {
        self.dev_dir.join(format!("video{}", params.video_nr))
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&mut self, params: &ModuleParams) -> Result<(), ModuleError> {
        let mut state = self.state.borrow_mut();
        state.loads.push(params.clone());
        if state.fail_load {
            return Err(ModuleError::Failed(ExitStatus::from_raw(1 << 8)));
        }

        if state.creates_node {
            std::fs::write(self.node_path(params), b"").map_err(ModuleError::Spawn)?;
        }
        Ok(())
    }

    fn unload(&mut self) -> Result<(), ModuleError> {
        let mut state = self.state.borrow_mut();
        state.unloads += 1;
        if let Some(params) = state.loads.last() {
            let _ = std::fs::remove_file(self.node_path(params));
        }
        if state.fail_unload {
            return Err(ModuleError::Failed(ExitStatus::from_raw(1 << 8)));
        }

        Ok(())
    }
}
