use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use kitti_pixor::target::{BevGrid, ImageGrid};
use kitti_pixor::{Box2D, Box3D, KittiDataset, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "compute_stats",
    about = "Compute regression mean/std over a KITTI subset and save them as JSON"
)]
struct Args {
    /// Pipeline configuration (JSON).
    #[arg(long, default_value = "configs/car_bev.json")]
    config: PathBuf,
    /// KITTI training root.
    #[arg(long)]
    root: PathBuf,
    #[arg(long, default_value = "train")]
    subset: String,
    /// Output statistics file.
    #[arg(long)]
    output: PathBuf,
    /// Compute image-plane statistics instead of BEV ones.
    #[arg(long)]
    image: bool,
}

fn main() -> kitti_pixor::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig::load(&args.config)?;
    let dataset = KittiDataset::new(&args.root, &config)?;
    let ids = dataset.ids(&args.subset)?;

    let stats = if args.image {
        let section = config.image_target()?;
        let grid = ImageGrid::new(config.image_size, section.downsampling_factor, section.footprint);
        let mut boxes: Vec<Box2D> = Vec::new();
        for id in &ids {
            match dataset.boxes(id) {
                Ok(labels) => boxes.extend(labels.boxes_2d),
                Err(e) => warn!("skipping frame {}: {}", id, e),
            }
        }
        info!("{} boxes from {} frames", boxes.len(), ids.len());
        grid.compute_stats(&boxes)
    } else {
        let grid = BevGrid::new(&config);
        let mut boxes: Vec<Box3D> = Vec::new();
        for id in &ids {
            match dataset.boxes_3d(id) {
                Ok(frame) => boxes.extend(frame),
                Err(e) => warn!("skipping frame {}: {}", id, e),
            }
        }
        info!("{} boxes from {} frames", boxes.len(), ids.len());
        grid.compute_stats(&boxes)
    };

    stats.save(&args.output)?;
    info!("wrote {}", args.output.display());
    Ok(())
}
