use log::debug;
use opencv::core::Scalar;
use opencv::highgui;
use opencv::objdetect::{draw_detected_corners_charuco, draw_detected_markers};
use opencv::prelude::*;

use crate::calibration::BoardObservation;
use crate::detection::{MarkerObservation, observations_to_vectors};
use crate::error::Result;

const WINDOW_NAME: &str = "Frame";

/// Interactive window showing detections as frames are processed. Only
/// polls the keyboard for a millisecond, so it never holds up the loop.
pub struct PreviewWindow {
    name: &'static str,
}

impl PreviewWindow {
    pub fn open() -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_KEEPRATIO)?;
        Ok(Self { name: WINDOW_NAME })
    }

    pub fn show_markers(&self, image: &Mat, observations: &[MarkerObservation]) -> Result<()> {
        let (corners, ids) = observations_to_vectors(observations);
        let mut drawn = image.clone();
        draw_detected_markers(
            &mut drawn,
            &corners,
            &ids,
            Scalar::new(0.0, 255.0, 0.0, 255.0),
        )?;
        self.show(&drawn)
    }

    pub fn show_board_corners(&self, image: &Mat, observation: &BoardObservation) -> Result<()> {
        let mut drawn = image.clone();
        draw_detected_corners_charuco(
            &mut drawn,
            &observation.charuco_corners,
            &observation.charuco_ids,
            Scalar::new(255.0, 0.0, 0.0, 255.0),
        )?;
        self.show(&drawn)
    }

    fn show(&self, image: &Mat) -> Result<()> {
        highgui::imshow(self.name, image)?;
        highgui::wait_key(1)?;
        Ok(())
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(self.name) {
            debug!("Could not close preview window: {e}");
        }
    }
}
