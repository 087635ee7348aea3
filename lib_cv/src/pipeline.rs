//! The two batch pipelines: marker pose tracking and ChArUco calibration.
//!
//! Both pull frames one at a time from a [`FrameSource`], call the detector
//! on each frame, accumulate results in memory and write a single output file
//! at the end. Nothing is written unless the whole run succeeds.

use std::path::{Path, PathBuf};

use log::{debug, info};
use opencv::core::Size;
use opencv::prelude::*;

use crate::calibration::{
    BoardConfig, BoardDetector, CalibrationSample, CalibrationSolver, CameraIntrinsics,
    CameraParameters, CharucoBoardDetector, MIN_CALIBRATION_FRAMES, MIN_CHARUCO_CORNERS,
    OpenCvCalibrationSolver,
};
use crate::detection::{
    ArucoMarkerDetector, MarkerDetector, MarkerObservation, Pose, PoseSolver,
    SquareMarkerPoseSolver,
};
use crate::dictionary::{load_detector_parameters, predefined_dictionary};
use crate::error::{Error, Result};
use crate::preview::PreviewWindow;
use crate::table::PoseTable;
use crate::video::{FrameSource, VideoSource};

const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub camera_params: PathBuf,
    pub marker_ids: Vec<i32>,
    pub dictionary_id: i32,
    pub marker_length: f64,
    pub detector_params: Option<PathBuf>,
    pub show_img: bool,
}

#[derive(Debug, Clone)]
pub struct CalibrateConfig {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub dictionary_id: i32,
    pub board: BoardConfig,
    pub detector_params: Option<PathBuf>,
    pub show_img: bool,
}

/// Tracks `config.marker_ids` through the video and writes their poses to
/// `config.dst`.
pub fn detect(config: &DetectConfig) -> Result<PoseTable> {
    let mut source = VideoSource::open(&config.src)?;
    let dictionary = predefined_dictionary(config.dictionary_id)?;
    let detector_params = load_detector_parameters(config.detector_params.as_deref())?;
    let detector = ArucoMarkerDetector::new(&dictionary, &detector_params)?;
    let intrinsics = CameraIntrinsics::load(&config.camera_params)?;
    let solver = SquareMarkerPoseSolver::new(config.marker_length, intrinsics);
    let preview = config.show_img.then(PreviewWindow::open).transpose()?;

    info!(
        "Tracking markers {:?} in {}",
        config.marker_ids,
        source.path().display()
    );
    run_detection(
        &mut source,
        &detector,
        &solver,
        &config.marker_ids,
        &config.dst,
        preview.as_ref(),
    )
}

/// Runs [`track_markers`] and writes the resulting table to `dst`.
pub fn run_detection<S, D, P>(
    source: &mut S,
    detector: &D,
    solver: &P,
    marker_ids: &[i32],
    dst: &Path,
    preview: Option<&PreviewWindow>,
) -> Result<PoseTable>
where
    S: FrameSource,
    D: MarkerDetector,
    P: PoseSolver,
{
    let table = track_markers(source, detector, solver, marker_ids, preview)?;
    table.write_csv(dst)?;
    info!("Wrote {} rows to {}", table.len(), dst.display());
    Ok(table)
}

/// One row per frame actually read; the advertised frame count is only used
/// to reserve capacity.
pub fn track_markers<S, D, P>(
    source: &mut S,
    detector: &D,
    solver: &P,
    marker_ids: &[i32],
    preview: Option<&PreviewWindow>,
) -> Result<PoseTable>
where
    S: FrameSource,
    D: MarkerDetector,
    P: PoseSolver,
{
    let advertised = source.frame_count_hint();
    let mut table = PoseTable::with_capacity(marker_ids.to_vec(), advertised);

    while let Some(frame) = source.next_frame()? {
        let observations = detector.detect_markers(&frame)?;
        debug!(
            "Frame {} at {:.3}s: {} markers",
            frame.index,
            frame.timestamp,
            observations.len()
        );

        if let Some(preview) = preview {
            preview.show_markers(&frame.image, &observations)?;
        }

        let poses = marker_ids
            .iter()
            .map(|&id| solve_marker(id, &observations, solver, frame.index))
            .collect::<Result<Vec<_>>>()?;
        table.push_row(frame.timestamp, poses);

        if table.len() % PROGRESS_INTERVAL == 0 {
            info!("Processed {}/{} frames", table.len(), advertised);
        }
    }

    if table.len() != advertised {
        debug!(
            "Source advertised {} frames but yielded {}",
            advertised,
            table.len()
        );
    }
    Ok(table)
}

fn solve_marker<P: PoseSolver>(
    id: i32,
    observations: &[MarkerObservation],
    solver: &P,
    frame_index: usize,
) -> Result<Option<Pose>> {
    let mut matching = observations.iter().filter(|o| o.id == id);
    let Some(first) = matching.next() else {
        return Ok(None);
    };
    let duplicates = matching.count();
    if duplicates > 0 {
        debug!(
            "Frame {}: marker {} detected {} extra times, using the first",
            frame_index, id, duplicates
        );
    }

    let pose = solver.solve_pose(&first.corners)?;
    if pose.is_none() {
        debug!("Frame {}: no pose for marker {}", frame_index, id);
    }
    Ok(pose)
}

/// Estimates camera intrinsics from ChArUco board views and writes them to
/// `config.dst`.
pub fn calibrate(config: &CalibrateConfig) -> Result<CameraParameters> {
    let mut source = VideoSource::open(&config.src)?;
    let dictionary = predefined_dictionary(config.dictionary_id)?;
    let detector_params = load_detector_parameters(config.detector_params.as_deref())?;
    let detector = CharucoBoardDetector::new(&config.board, &dictionary, &detector_params)?;
    let preview = config.show_img.then(PreviewWindow::open).transpose()?;

    info!(
        "Calibrating from {} ({}x{} board)",
        source.path().display(),
        config.board.squares_x,
        config.board.squares_y
    );
    run_calibration(
        &mut source,
        &detector,
        &OpenCvCalibrationSolver,
        &config.dst,
        preview.as_ref(),
    )
}

/// Collects samples from every frame, solves once, and writes the result to
/// `dst`. Fails with [`Error::NotEnoughFrames`] before writing anything when
/// too few frames showed the board.
pub fn run_calibration<S, B, C>(
    source: &mut S,
    detector: &B,
    solver: &C,
    dst: &Path,
    preview: Option<&PreviewWindow>,
) -> Result<CameraParameters>
where
    S: FrameSource,
    B: BoardDetector,
    C: CalibrationSolver,
{
    let collected = collect_calibration_samples(source, detector, preview)?;
    let frames_used = collected.samples.len();
    if frames_used < MIN_CALIBRATION_FRAMES {
        return Err(Error::NotEnoughFrames {
            found: frames_used,
            required: MIN_CALIBRATION_FRAMES,
        });
    }

    let camera = solver.calibrate(&collected.samples, collected.image_size)?;
    camera.save(dst)?;

    info!("{} frames used for calibration", frames_used);
    info!("Reprojection error: {}", camera.reprojection_error);
    Ok(camera)
}

#[derive(Debug)]
pub struct CollectedSamples {
    pub samples: Vec<CalibrationSample>,
    pub frames_read: usize,
    pub image_size: Size,
}

pub fn collect_calibration_samples<S, B>(
    source: &mut S,
    detector: &B,
    preview: Option<&PreviewWindow>,
) -> Result<CollectedSamples>
where
    S: FrameSource,
    B: BoardDetector,
{
    let advertised = source.frame_count_hint();
    let mut image_size = source.frame_size();
    let mut samples = Vec::new();
    let mut frames_read = 0;

    while let Some(frame) = source.next_frame()? {
        frames_read += 1;
        if frames_read % PROGRESS_INTERVAL == 0 {
            info!(
                "Processed {}/{} frames, {} usable",
                frames_read,
                advertised,
                samples.len()
            );
        }
        // Some backends do not report dimensions up front.
        if image_size.width <= 0 || image_size.height <= 0 {
            image_size = frame.image.size()?;
        }

        let observation = detector.detect_board(&frame)?;
        if observation.charuco_corners.len() < MIN_CHARUCO_CORNERS {
            debug!(
                "Frame {}: {} board corners, skipping",
                frame.index,
                observation.charuco_corners.len()
            );
            continue;
        }

        if let Some(preview) = preview {
            preview.show_board_corners(&frame.image, &observation)?;
        }

        let sample = detector.match_image_points(&observation)?;
        if sample.is_empty() {
            debug!("Frame {}: no object points matched, skipping", frame.index);
            continue;
        }
        samples.push(sample);
    }

    Ok(CollectedSamples {
        samples,
        frames_read,
        image_size,
    })
}
