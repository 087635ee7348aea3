use std::path::Path;

use log::debug;
use opencv::calib3d::calibrate_camera;
use opencv::core::{
    FileStorage, FileStorage_Mode, Point2f, Size, TermCriteria, TermCriteria_Type, Vector,
};
use opencv::objdetect::{
    CharucoBoard, CharucoDetector, CharucoParameters, DetectorParameters, Dictionary,
    RefineParameters,
};
use opencv::prelude::*;

use crate::error::{Error, Result};
use crate::utils::{open_storage_for_read, write_atomically};
use crate::video::Frame;

/// Frames with fewer detected board corners are skipped.
pub const MIN_CHARUCO_CORNERS: usize = 4;
pub const MIN_CALIBRATION_FRAMES: usize = 4;

/// ChArUco board geometry. Lengths share one unit (normally meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardConfig {
    pub squares_x: i32,
    pub squares_y: i32,
    pub square_length: f64,
    pub marker_length: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            squares_x: 8,
            squares_y: 11,
            square_length: 15e-3,
            marker_length: 11e-3,
        }
    }
}

/// Intrinsics consumed by pose estimation.
#[derive(Debug)]
pub struct CameraIntrinsics {
    pub camera_matrix: Mat,
    pub distortion: Mat,
}

impl CameraIntrinsics {
    /// Reads `camera_matrix` and `distortion_coefficients` from a FileStorage
    /// file such as the one written by [`CameraParameters::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let storage = open_storage_for_read(path)
            .ok_or_else(|| Error::CameraParamsUnavailable(path.to_path_buf()))?;
        Ok(Self {
            camera_matrix: read_mat(&storage, path, "camera_matrix")?,
            distortion: read_mat(&storage, path, "distortion_coefficients")?,
        })
    }
}

fn read_mat(storage: &FileStorage, path: &Path, key: &'static str) -> Result<Mat> {
    let missing = || Error::MissingEntry {
        path: path.to_path_buf(),
        key,
    };
    let node = storage.get_node(key)?;
    if node.empty()? {
        return Err(missing());
    }
    let mat = node.mat()?;
    if mat.empty() {
        return Err(missing());
    }
    Ok(mat)
}

/// Result of one calibration run.
#[derive(Debug)]
pub struct CameraParameters {
    pub image_size: Size,
    pub camera_matrix: Mat,
    pub distortion: Mat,
    pub reprojection_error: f64,
}

impl CameraParameters {
    /// Writes all fields to a FileStorage file; the format follows the
    /// extension of `dst`.
    pub fn save(&self, dst: &Path) -> Result<()> {
        write_atomically(dst, |staging| {
            let staging = staging.to_str().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} is not valid UTF-8", staging.display()),
                )
            })?;
            let mut storage = FileStorage::new(staging, FileStorage_Mode::WRITE as i32, "")?;
            storage.write_i32("image_width", self.image_size.width)?;
            storage.write_i32("image_height", self.image_size.height)?;
            storage.write_mat("camera_matrix", &self.camera_matrix)?;
            storage.write_mat("distortion_coefficients", &self.distortion)?;
            storage.write_f64("reprojection_error", self.reprojection_error)?;
            storage.release()?;
            Ok(())
        })
    }
}

/// Board corners found in one frame.
#[derive(Debug, Default)]
pub struct BoardObservation {
    pub charuco_corners: Vector<Point2f>,
    pub charuco_ids: Vector<i32>,
}

/// Object/image point pair contributed by one frame.
#[derive(Debug)]
pub struct CalibrationSample {
    pub object_points: Mat, // CV_32FC3
    pub image_points: Mat,  // CV_32FC2
}

impl CalibrationSample {
    pub fn is_empty(&self) -> bool {
        self.object_points.empty() || self.image_points.empty()
    }
}

pub trait BoardDetector {
    fn detect_board(&self, frame: &Frame) -> Result<BoardObservation>;

    /// Maps detected corners onto the board's object-space coordinates.
    fn match_image_points(&self, observation: &BoardObservation) -> Result<CalibrationSample>;
}

pub trait CalibrationSolver {
    fn calibrate(&self, samples: &[CalibrationSample], image_size: Size)
    -> Result<CameraParameters>;
}

pub struct CharucoBoardDetector {
    board: CharucoBoard,
    detector: CharucoDetector,
}

impl CharucoBoardDetector {
    pub fn new(
        config: &BoardConfig,
        dictionary: &Dictionary,
        detector_params: &DetectorParameters,
    ) -> Result<Self> {
        let board = CharucoBoard::new_def(
            Size::new(config.squares_y, config.squares_x),
            config.square_length as f32,
            config.marker_length as f32,
            dictionary,
        )?;
        let detector = CharucoDetector::new(
            &board,
            &CharucoParameters::default()?,
            detector_params,
            RefineParameters::new_def()?,
        )?;
        Ok(Self { board, detector })
    }

    pub fn board(&self) -> &CharucoBoard {
        &self.board
    }
}

impl BoardDetector for CharucoBoardDetector {
    fn detect_board(&self, frame: &Frame) -> Result<BoardObservation> {
        let mut observation = BoardObservation::default();
        self.detector.detect_board_def(
            &frame.image,
            &mut observation.charuco_corners,
            &mut observation.charuco_ids,
        )?;
        Ok(observation)
    }

    fn match_image_points(&self, observation: &BoardObservation) -> Result<CalibrationSample> {
        let mut object_points = Mat::default();
        let mut image_points = Mat::default();
        self.board.match_image_points(
            &observation.charuco_corners,
            &observation.charuco_ids,
            &mut object_points,
            &mut image_points,
        )?;
        Ok(CalibrationSample {
            object_points,
            image_points,
        })
    }
}

/// `cv::calibrateCamera` with no flags and the default termination criteria.
#[derive(Debug, Default)]
pub struct OpenCvCalibrationSolver;

impl CalibrationSolver for OpenCvCalibrationSolver {
    fn calibrate(
        &self,
        samples: &[CalibrationSample],
        image_size: Size,
    ) -> Result<CameraParameters> {
        let object_points: Vector<Mat> = samples.iter().map(|s| s.object_points.clone()).collect();
        let image_points: Vector<Mat> = samples.iter().map(|s| s.image_points.clone()).collect();

        let mut camera_matrix = Mat::default();
        let mut distortion = Mat::default();
        let mut r_vecs = Vector::<Mat>::new();
        let mut t_vecs = Vector::<Mat>::new();

        let criteria = TermCriteria::new(
            TermCriteria_Type::COUNT as i32 | TermCriteria_Type::EPS as i32,
            30,
            f64::EPSILON,
        )?;

        debug!(
            "Calibrating {}x{} camera from {} frames",
            image_size.width,
            image_size.height,
            samples.len()
        );
        let reprojection_error = calibrate_camera(
            &object_points,
            &image_points,
            image_size,
            &mut camera_matrix,
            &mut distortion,
            &mut r_vecs,
            &mut t_vecs,
            0,
            criteria,
        )?;

        Ok(CameraParameters {
            image_size,
            camera_matrix,
            distortion,
            reprojection_error,
        })
    }
}
