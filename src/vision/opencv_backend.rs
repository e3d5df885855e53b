//! OpenCV-backed camera, HOG person detector and KCF tracker.

use anyhow::{Result, bail};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::HOGDescriptor;
use opencv::prelude::*;
use opencv::tracking::{TrackerKCF, TrackerKCF_Params};
use opencv::{imgproc, videoio};
use tracing::{debug, info};

use crate::error::VisionError;

use super::bbox::{BoundingBox, Detection};
use super::capabilities::{FrameSource, PersonDetector, ShortTermTracker};
use super::estimator::FrameGeometry;

/// Largest frame the HOG detector is run on; bigger frames are downscaled.
const MAX_DETECTION_WIDTH: i32 = 640;
const MAX_DETECTION_HEIGHT: i32 = 480;

/// Live camera or video file.
pub struct CameraFrameSource {
    capture: videoio::VideoCapture,
    geometry: FrameGeometry,
}

impl CameraFrameSource {
    /// Open camera `index`. Fails if the device cannot be opened.
    pub fn open(index: i32) -> Result<Self> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        Self::from_capture(capture, &format!("camera {index}"))
    }

    /// Open a video file instead of a live camera.
    pub fn open_file(path: &str) -> Result<Self> {
        let capture = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;
        Self::from_capture(capture, path)
    }

    fn from_capture(capture: videoio::VideoCapture, label: &str) -> Result<Self> {
        if !capture.is_opened()? {
            bail!("Failed to open camera source: {}", label);
        }
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        info!("Camera opened: {}x{}", width, height);

        Ok(Self {
            capture,
            geometry: FrameGeometry::new(width, height),
        })
    }
}

impl FrameSource for CameraFrameSource {
    type Frame = Mat;

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Result<Mat, VisionError> {
        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .map_err(|e| VisionError::FrameRead(e.to_string()))?;
        if !ok || frame.empty() {
            return Err(VisionError::FrameRead(
                "Failed to read frame from camera".to_string(),
            ));
        }
        Ok(frame)
    }
}

/// Histogram-of-oriented-gradients people detector.
pub struct HogPersonDetector {
    hog: HOGDescriptor,
}

impl HogPersonDetector {
    pub fn new() -> Result<Self> {
        let mut hog = HOGDescriptor::default()?;
        hog.set_svm_detector(&HOGDescriptor::get_default_people_detector()?)?;
        Ok(Self { hog })
    }

    fn detect_scaled(&self, frame: &Mat) -> opencv::Result<Vec<Detection>> {
        let cols = frame.cols();
        let rows = frame.rows();
        let target = Size::new(cols.min(MAX_DETECTION_WIDTH), rows.min(MAX_DETECTION_HEIGHT));

        let mut resized = Mat::default();
        imgproc::resize(frame, &mut resized, target, 0.0, 0.0, imgproc::INTER_LINEAR)?;
        let scale = cols as f64 / target.width as f64;

        let mut boxes = Vector::<Rect>::new();
        let mut weights = Vector::<f64>::new();
        self.hog.detect_multi_scale_weights(
            &resized,
            &mut boxes,
            &mut weights,
            0.0,
            Size::new(8, 8),
            Size::new(8, 8),
            1.05,
            2.0,
            false,
        )?;

        let detections = boxes
            .iter()
            .zip(weights.iter())
            .filter_map(|(r, w)| {
                BoundingBox::from_signed(r.x, r.y, r.width, r.height)
                    .map(|b| Detection::new(b.scaled(scale), w))
            })
            .collect::<Vec<_>>();
        debug!("HOG found {} candidates", detections.len());
        Ok(detections)
    }
}

impl PersonDetector<Mat> for HogPersonDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, VisionError> {
        self.detect_scaled(frame)
            .map_err(|e| VisionError::Detector(e.to_string()))
    }
}

/// Kernelized correlation filter tracker.
pub struct KcfTracker {
    inner: opencv::core::Ptr<TrackerKCF>,
}

impl KcfTracker {
    pub fn new() -> Result<Self, VisionError> {
        let params = TrackerKCF_Params::default().map_err(|e| VisionError::TrackerInit(e.to_string()))?;
        let inner = TrackerKCF::create(params).map_err(|e| VisionError::TrackerInit(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ShortTermTracker<Mat> for KcfTracker {
    fn init(&mut self, frame: &Mat, bbox: BoundingBox) -> Result<(), VisionError> {
        let rect = Rect::new(bbox.x as i32, bbox.y as i32, bbox.w as i32, bbox.h as i32);
        self.inner
            .init(frame, rect)
            .map_err(|e| VisionError::TrackerInit(e.to_string()))
    }

    fn update(&mut self, frame: &Mat) -> Result<Option<BoundingBox>, VisionError> {
        let mut rect = Rect::default();
        let found = self
            .inner
            .update(frame, &mut rect)
            .map_err(|e| VisionError::TrackerFailure(e.to_string()))?;
        if !found {
            return Ok(None);
        }
        Ok(BoundingBox::from_signed(rect.x, rect.y, rect.width, rect.height))
    }
}
