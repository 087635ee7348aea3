use std::path::PathBuf;

/// Errors returned by the marker pipelines.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open video source {}", .0.display())]
    VideoUnavailable(PathBuf),
    #[error("could not open camera parameters {}", .0.display())]
    CameraParamsUnavailable(PathBuf),
    #[error("could not open detector parameters {}", .0.display())]
    DetectorParamsUnavailable(PathBuf),
    #[error("{} has no `{key}` entry", .path.display())]
    MissingEntry { path: PathBuf, key: &'static str },
    #[error("unknown dictionary id {0}")]
    UnknownDictionary(i32),
    #[error("not enough valid frames for calibration ({found} found, {required} required)")]
    NotEnoughFrames { found: usize, required: usize },
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Input-side failures that end a run without output but are not crashes.
    pub fn is_input_failure(&self) -> bool {
        matches!(
            self,
            Error::VideoUnavailable(_)
                | Error::CameraParamsUnavailable(_)
                | Error::DetectorParamsUnavailable(_)
                | Error::MissingEntry { .. }
                | Error::UnknownDictionary(_)
                | Error::NotEnoughFrames { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_failures_are_separated_from_runtime_errors() {
        assert!(Error::VideoUnavailable(PathBuf::from("a.mp4")).is_input_failure());
        assert!(
            Error::NotEnoughFrames {
                found: 3,
                required: 4
            }
            .is_input_failure()
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(!Error::from(io).is_input_failure());
    }

    #[test]
    fn messages_name_the_offending_path() {
        let err = Error::MissingEntry {
            path: PathBuf::from("cam.yml"),
            key: "camera_matrix",
        };
        assert_eq!(err.to_string(), "cam.yml has no `camera_matrix` entry");
    }

    #[test]
    fn insufficient_frames_message_carries_counts() {
        let err = Error::NotEnoughFrames {
            found: 3,
            required: 4,
        };
        assert_eq!(
            err.to_string(),
            "not enough valid frames for calibration (3 found, 4 required)"
        );
    }
}
