//! Scripted vision backend driven by a CSV detection log.
//!
//! Each row is `frame,x,y,w,h,confidence` (confidence optional, default 1).
//! Frames without rows have no person in view. The replay source, detector
//! and tracker all read the same script, so the full pipeline can run
//! without a camera.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::VisionError;
use crate::vision::{
    BoundingBox, Detection, FrameGeometry, FrameSource, PersonDetector, ShortTermTracker,
};

#[derive(Debug, Deserialize)]
struct DetectionRow {
    frame: u64,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Detections per frame index.
#[derive(Debug, Clone, Default)]
pub struct DetectionScript {
    frames: BTreeMap<u64, Vec<Detection>>,
    frame_count: u64,
}

impl DetectionScript {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut script = Self::default();
        for (line, row) in rdr.deserialize::<DetectionRow>().enumerate() {
            let row = row.with_context(|| format!("Bad detection row {}", line + 1))?;
            script.push(
                row.frame,
                Detection::new(
                    BoundingBox::new(row.x, row.y, row.w, row.h),
                    row.confidence.unwrap_or(1.0),
                ),
            );
        }
        Ok(script)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let script = Self::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(
            "Loaded detection script: {} frames, {} with detections",
            script.frame_count,
            script.frames.len()
        );
        Ok(script)
    }

    /// Add one detection to `frame`, extending the script if needed.
    pub fn push(&mut self, frame: u64, detection: Detection) {
        self.frames.entry(frame).or_default().push(detection);
        self.frame_count = self.frame_count.max(frame.saturating_add(1));
    }

    /// Mark frames `0..count` as part of the script even if the tail is empty.
    pub fn with_frame_count(mut self, count: u64) -> Self {
        self.frame_count = self.frame_count.max(count);
        self
    }

    pub fn detections(&self, frame: u64) -> &[Detection] {
        self.frames.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// A replayed frame carries only its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayFrame {
    pub index: u64,
}

/// Frame source that steps through the script's frame indices.
pub struct ReplayFrameSource {
    script: Arc<DetectionScript>,
    geometry: FrameGeometry,
    next: u64,
    looping: bool,
}

impl ReplayFrameSource {
    pub fn new(script: Arc<DetectionScript>, geometry: FrameGeometry, looping: bool) -> Self {
        Self {
            script,
            geometry,
            next: 0,
            looping,
        }
    }
}

impl FrameSource for ReplayFrameSource {
    type Frame = ReplayFrame;

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Result<ReplayFrame, VisionError> {
        if self.next >= self.script.frame_count() {
            if !self.looping || self.script.frame_count() == 0 {
                return Err(VisionError::FrameRead("end of replay".to_string()));
            }
            debug!("Replay wrapped after {} frames", self.next);
            self.next = 0;
        }
        let frame = ReplayFrame { index: self.next };
        self.next += 1;
        Ok(frame)
    }
}

/// Detector that reports whatever the script lists for the frame.
pub struct ScriptedDetector {
    script: Arc<DetectionScript>,
}

impl ScriptedDetector {
    pub fn new(script: Arc<DetectionScript>) -> Self {
        Self { script }
    }
}

impl PersonDetector<ReplayFrame> for ScriptedDetector {
    fn detect(&mut self, frame: &ReplayFrame) -> Result<Vec<Detection>, VisionError> {
        Ok(self.script.detections(frame.index).to_vec())
    }
}

/// Tracker that follows the scripted box closest to its last position and
/// loses the target on frames with no detections.
pub struct ScriptedTracker {
    script: Arc<DetectionScript>,
    last: Option<BoundingBox>,
}

impl ScriptedTracker {
    pub fn new(script: Arc<DetectionScript>) -> Self {
        Self { script, last: None }
    }
}

fn center_distance_sq(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();
    (ax - bx).powi(2) + (ay - by).powi(2)
}

impl ShortTermTracker<ReplayFrame> for ScriptedTracker {
    fn init(&mut self, _frame: &ReplayFrame, bbox: BoundingBox) -> Result<(), VisionError> {
        self.last = Some(bbox);
        Ok(())
    }

    fn update(&mut self, frame: &ReplayFrame) -> Result<Option<BoundingBox>, VisionError> {
        let last = self
            .last
            .ok_or_else(|| VisionError::TrackerFailure("tracker not initialized".to_string()))?;

        let nearest = self
            .script
            .detections(frame.index)
            .iter()
            .map(|d| d.bbox)
            .filter(BoundingBox::is_valid)
            .min_by(|a, b| center_distance_sq(a, &last).total_cmp(&center_distance_sq(b, &last)));

        if let Some(bbox) = nearest {
            self.last = Some(bbox);
        }
        Ok(nearest)
    }
}

/// Factory for the vision loop: one fresh `ScriptedTracker` per detection.
pub fn scripted_tracker_factory(
    script: Arc<DetectionScript>,
) -> impl FnMut() -> Result<ScriptedTracker, VisionError> {
    move || Ok(ScriptedTracker::new(Arc::clone(&script)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
frame,x,y,w,h,confidence
# person walks in on frame 1
1, 270, 140, 100, 200, 0.9
1, 10, 10, 20, 40, 0.4
2, 275, 140, 100, 200,
4, 280, 150, 50, 100, 0.8
";

    fn script() -> Arc<DetectionScript> {
        Arc::new(DetectionScript::from_reader(SCRIPT.as_bytes()).unwrap())
    }

    #[test]
    fn test_parses_rows_by_frame() {
        let script = script();
        assert_eq!(script.frame_count(), 5);
        assert!(script.detections(0).is_empty());
        assert_eq!(script.detections(1).len(), 2);
        assert_eq!(script.detections(1)[1].confidence, 0.4);
        assert_eq!(script.detections(2)[0].confidence, 1.0);
        assert_eq!(script.detections(4)[0].bbox, BoundingBox::new(280, 150, 50, 100));
    }

    #[test]
    fn test_last_frame_index_does_not_overflow() {
        let rows = format!("frame,x,y,w,h,confidence\n{},0,0,10,20,1.0\n", u64::MAX);
        let script = DetectionScript::from_reader(rows.as_bytes()).unwrap();
        assert_eq!(script.frame_count(), u64::MAX);
        assert_eq!(script.detections(u64::MAX).len(), 1);
    }

    #[test]
    fn test_rejects_malformed_row() {
        let bad = "frame,x,y,w,h,confidence\n1,-5,0,10,10,1.0\n";
        assert!(DetectionScript::from_reader(bad.as_bytes()).is_err());
    }

    #[test]
    fn test_source_stops_or_loops_at_end() {
        let geometry = FrameGeometry::new(640, 480);
        let mut once = ReplayFrameSource::new(script(), geometry, false);
        for i in 0..5 {
            assert_eq!(once.next_frame().unwrap().index, i);
        }
        assert!(matches!(once.next_frame(), Err(VisionError::FrameRead(_))));

        let mut looping = ReplayFrameSource::new(script(), geometry, true);
        for _ in 0..5 {
            looping.next_frame().unwrap();
        }
        assert_eq!(looping.next_frame().unwrap().index, 0);
    }

    #[test]
    fn test_tracker_follows_nearest_and_loses_on_gap() {
        let script = script();
        let mut factory = scripted_tracker_factory(Arc::clone(&script));
        let mut tracker = factory().unwrap();

        tracker
            .init(&ReplayFrame { index: 1 }, BoundingBox::new(270, 140, 100, 200))
            .unwrap();
        assert_eq!(
            tracker.update(&ReplayFrame { index: 2 }).unwrap(),
            Some(BoundingBox::new(275, 140, 100, 200))
        );
        assert_eq!(tracker.update(&ReplayFrame { index: 3 }).unwrap(), None);
    }

    #[test]
    fn test_update_before_init_fails() {
        let mut tracker = ScriptedTracker::new(script());
        assert!(matches!(
            tracker.update(&ReplayFrame { index: 1 }),
            Err(VisionError::TrackerFailure(_))
        ));
    }
}
