use std::path::PathBuf;

use clap::Parser;
use log::info;

use kitti_pixor::data::output::format_kitti_frame;
use kitti_pixor::{nms, PipelineConfig, SamplePipeline, TargetEncoder};

#[derive(Parser, Debug)]
#[command(
    name = "encode_frame",
    about = "Encode one KITTI frame, decode its own target and print the recovered detections"
)]
struct Args {
    /// Pipeline configuration (JSON).
    #[arg(long, default_value = "configs/car_bev.json")]
    config: PathBuf,
    /// KITTI training root containing calib/, label_2/, velodyne/ ...
    #[arg(long)]
    root: PathBuf,
    /// Frame id, e.g. 000010.
    #[arg(long)]
    id: String,
    /// Objectness threshold for decoding.
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
}

fn main() -> kitti_pixor::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig::load(&args.config)?;
    let pipeline = SamplePipeline::new(&args.root, &config)?;
    let sample = pipeline.load(&args.id)?;
    info!(
        "frame {}: {} boxes, {} occupied voxels",
        sample.id,
        sample.boxes.len(),
        sample.input.iter().filter(|v| **v > 0.0).count()
    );

    let candidates = pipeline.target_encoder().decode(&sample.target, args.threshold)?;
    let detections = nms(&candidates, &config.nms)?;
    info!("{} candidates, {} after suppression", candidates.len(), detections.len());

    let calib = pipeline.dataset().calibration(&args.id)?;
    print!("{}", format_kitti_frame(&detections, &calib, config.image_size));
    Ok(())
}
