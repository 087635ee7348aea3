use std::path::{Path, PathBuf};

use log::debug;
use opencv::core::Size;
use opencv::prelude::*;
use opencv::videoio::{
    CAP_ANY, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_MSEC,
    VideoCapture,
};

use crate::error::{Error, Result};

/// One decoded image together with its position in the stream.
#[derive(Debug)]
pub struct Frame {
    pub index: usize,
    /// Capture time in seconds.
    pub timestamp: f64,
    pub image: Mat,
}

/// Sequential source of frames with an end-of-stream signal.
pub trait FrameSource {
    /// Returns `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Advertised number of frames. Some encodings overstate it, so it is
    /// only good for pre-allocation and progress reporting.
    fn frame_count_hint(&self) -> usize;

    fn frame_size(&self) -> Size;
}

/// Frame source backed by an OpenCV `VideoCapture` opened from a file.
pub struct VideoSource {
    path: PathBuf,
    capture: VideoCapture,
    frame_count: usize,
    frame_size: Size,
    next_index: usize,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = || Error::VideoUnavailable(path.to_path_buf());
        let path_str = path.to_str().ok_or_else(unavailable)?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY).map_err(|_| unavailable())?;
        if !capture.is_opened()? {
            return Err(unavailable());
        }

        let frame_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;
        let frame_size = Size::new(
            capture.get(CAP_PROP_FRAME_WIDTH)? as i32,
            capture.get(CAP_PROP_FRAME_HEIGHT)? as i32,
        );
        debug!(
            "Opened {}: {} frames advertised, {}x{}",
            path.display(),
            frame_count,
            frame_size.width,
            frame_size.height
        );

        Ok(Self {
            path: path.to_path_buf(),
            capture,
            frame_count,
            frame_size,
            next_index: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut image = Mat::default();
        if !self.capture.read(&mut image)? || image.empty() {
            return Ok(None);
        }
        let timestamp = self.capture.get(CAP_PROP_POS_MSEC)? * 1e-3;
        let frame = Frame {
            index: self.next_index,
            timestamp,
            image,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn frame_count_hint(&self) -> usize {
        self.frame_count
    }

    fn frame_size(&self) -> Size {
        self.frame_size
    }
}
