use log::warn;
use opencv::calib3d::solve_pnp_def;
use opencv::core::{Point2f, Point3f, Vector};
use opencv::objdetect::{ArucoDetector, DetectorParameters, Dictionary, RefineParameters};
use opencv::prelude::*;

use crate::calibration::CameraIntrinsics;
use crate::error::Result;
use crate::video::Frame;

/// One detected marker: identifier and its four image corners in detector
/// order (top-left, top-right, bottom-right, bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    pub id: i32,
    pub corners: [Point2f; 4],
}

/// Marker pose relative to the camera. `rotation` is an axis-angle vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
}

impl Pose {
    /// `x, y, z, rx, ry, rz`.
    pub fn fields(&self) -> [f64; 6] {
        let [x, y, z] = self.translation;
        let [rx, ry, rz] = self.rotation;
        [x, y, z, rx, ry, rz]
    }
}

pub trait MarkerDetector {
    fn detect_markers(&self, frame: &Frame) -> Result<Vec<MarkerObservation>>;
}

pub trait PoseSolver {
    /// `Ok(None)` when the solver could not find a pose for these corners.
    fn solve_pose(&self, corners: &[Point2f; 4]) -> Result<Option<Pose>>;
}

pub struct ArucoMarkerDetector {
    detector: ArucoDetector,
}

impl ArucoMarkerDetector {
    pub fn new(dictionary: &Dictionary, params: &DetectorParameters) -> Result<Self> {
        let detector = ArucoDetector::new(dictionary, params, RefineParameters::new_def()?)?;
        Ok(Self { detector })
    }
}

impl MarkerDetector for ArucoMarkerDetector {
    fn detect_markers(&self, frame: &Frame) -> Result<Vec<MarkerObservation>> {
        let mut corners = Vector::<Vector<Point2f>>::new();
        let mut ids = Vector::<i32>::new();
        self.detector
            .detect_markers_def(&frame.image, &mut corners, &mut ids)?;

        let mut observations = Vec::with_capacity(ids.len());
        for (id, quad) in ids.iter().zip(corners.iter()) {
            if quad.len() != 4 {
                warn!(
                    "Frame {}: marker {} has {} corners, skipping",
                    frame.index,
                    id,
                    quad.len()
                );
                continue;
            }
            observations.push(MarkerObservation {
                id,
                corners: [quad.get(0)?, quad.get(1)?, quad.get(2)?, quad.get(3)?],
            });
        }
        Ok(observations)
    }
}

/// Splits observations back into the corner/id vectors OpenCV drawing
/// functions expect.
pub fn observations_to_vectors(
    observations: &[MarkerObservation],
) -> (Vector<Vector<Point2f>>, Vector<i32>) {
    let corners = observations
        .iter()
        .map(|o| Vector::from_slice(&o.corners))
        .collect();
    let ids = observations.iter().map(|o| o.id).collect();
    (corners, ids)
}

/// Solves the pose of a square marker of known side length lying in its own
/// z = 0 plane and centred on the origin.
pub struct SquareMarkerPoseSolver {
    object_points: Vector<Point3f>,
    intrinsics: CameraIntrinsics,
}

impl SquareMarkerPoseSolver {
    pub fn new(marker_length: f64, intrinsics: CameraIntrinsics) -> Self {
        Self {
            object_points: square_marker_points(marker_length),
            intrinsics,
        }
    }
}

impl PoseSolver for SquareMarkerPoseSolver {
    fn solve_pose(&self, corners: &[Point2f; 4]) -> Result<Option<Pose>> {
        let image_points = Vector::<Point2f>::from_slice(corners);
        let mut rvec = Mat::default();
        let mut tvec = Mat::default();
        let solved = solve_pnp_def(
            &self.object_points,
            &image_points,
            &self.intrinsics.camera_matrix,
            &self.intrinsics.distortion,
            &mut rvec,
            &mut tvec,
        )?;
        if !solved {
            return Ok(None);
        }
        finite_pose(&rvec, &tvec)
    }
}

/// `solvePnP` can report success on degenerate corners while leaving NaN or
/// infinite vectors behind; those count as a failed solve.
fn finite_pose(rvec: &Mat, tvec: &Mat) -> Result<Option<Pose>> {
    let pose = Pose {
        translation: vec3(tvec)?,
        rotation: vec3(rvec)?,
    };
    Ok(pose.fields().iter().all(|v| v.is_finite()).then_some(pose))
}

/// Corner order matches the detector's corner order.
pub fn square_marker_points(marker_length: f64) -> Vector<Point3f> {
    let half = (marker_length / 2.0) as f32;
    Vector::from_slice(&[
        Point3f::new(-half, half, 0.0),
        Point3f::new(half, half, 0.0),
        Point3f::new(half, -half, 0.0),
        Point3f::new(-half, -half, 0.0),
    ])
}

fn vec3(m: &Mat) -> Result<[f64; 3]> {
    Ok([*m.at::<f64>(0)?, *m.at::<f64>(1)?, *m.at::<f64>(2)?])
}
