use std::error::Error;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use lib_cv::calibration::BoardConfig;
use lib_cv::dictionary::DEFAULT_DICTIONARY_ID;
use lib_cv::pipeline::{self, CalibrateConfig, DetectConfig};
use log::{error, warn};

/// Track ArUco marker poses in a video, or calibrate a camera from ChArUco board footage.
#[derive(Debug, Parser)]
#[command(name = "detect_markers", version)]
struct Cli {
    /// Predefined marker dictionary id (2 = DICT_4X4_250).
    #[arg(long, global = true, default_value_t = DEFAULT_DICTIONARY_ID)]
    dictionary_id: i32,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write per-frame marker poses to a CSV table.
    Detect(DetectArgs),

    /// Estimate camera intrinsics from a ChArUco board video.
    Calibrate(CalibrateArgs),
}

#[derive(Debug, Args)]
struct DetectArgs {
    /// Input video.
    src: PathBuf,

    /// Output CSV table.
    dst: PathBuf,

    /// Camera calibration file with `camera_matrix` and `distortion_coefficients`.
    camera_params: PathBuf,

    /// Marker ids to track; columns follow this order.
    #[arg(long, required = true, num_args = 0..)]
    marker_ids: Vec<i32>,

    /// Marker side length, in the unit poses are reported in.
    #[arg(long, default_value_t = 20e-3)]
    marker_length: f64,

    /// FileStorage file overriding the ArUco detector parameters.
    #[arg(long, visible_alias = "dp")]
    detector_params: Option<PathBuf>,

    /// Show detections while processing.
    #[arg(long)]
    show_img: bool,
}

impl DetectArgs {
    fn into_config(self, dictionary_id: i32) -> DetectConfig {
        DetectConfig {
            src: self.src,
            dst: self.dst,
            camera_params: self.camera_params,
            marker_ids: self.marker_ids,
            dictionary_id,
            marker_length: self.marker_length,
            detector_params: self.detector_params,
            show_img: self.show_img,
        }
    }
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Input video showing the board.
    src: PathBuf,

    /// Output calibration file (.yml, .xml or .json).
    dst: PathBuf,

    #[arg(long, visible_alias = "sx", default_value_t = 8)]
    squares_x: i32,

    #[arg(long, visible_alias = "sy", default_value_t = 11)]
    squares_y: i32,

    /// Chessboard square side length.
    #[arg(long, visible_alias = "sl", default_value_t = 15e-3)]
    square_length: f64,

    /// Marker side length, same unit as --square-length.
    #[arg(long, visible_alias = "ml", default_value_t = 11e-3)]
    marker_length: f64,

    /// FileStorage file overriding the ArUco detector parameters.
    #[arg(long, visible_alias = "dp")]
    detector_params: Option<PathBuf>,

    /// Show detected board corners while processing.
    #[arg(long)]
    show_img: bool,
}

impl CalibrateArgs {
    fn into_config(self, dictionary_id: i32) -> CalibrateConfig {
        CalibrateConfig {
            src: self.src,
            dst: self.dst,
            dictionary_id,
            board: BoardConfig {
                squares_x: self.squares_x,
                squares_y: self.squares_y,
                square_length: self.square_length,
                marker_length: self.marker_length,
            },
            detector_params: self.detector_params,
            show_img: self.show_img,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let outcome = match command {
        Commands::Detect(args) => pipeline::detect(&args.into_config(cli.dictionary_id)).map(drop),
        Commands::Calibrate(args) => {
            pipeline::calibrate(&args.into_config(cli.dictionary_id)).map(drop)
        }
    };

    match outcome {
        // Nothing was written; end the run quietly like a normal exit.
        Err(err) if err.is_input_failure() => {
            warn!("{err}");
            Ok(())
        }
        other => Ok(other?),
    }
}
