use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default dataset configuration
    CreateConfigFile {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,
    },

    /// Copy raw videos into a `{label}/{folder}/` layout
    CreateLabelStructure {
        /// Label sheet CSV, or a directory of per-folder sheets
        #[arg(long, env = "WILDLIFE_FRAMES_SHEETS")]
        sheets: PathBuf,

        /// Raw camera dump with one directory per folder
        #[arg(long)]
        src_dir: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_VIDEO_ROOT")]
        dst_dir: PathBuf,
    },

    /// Extract labeled frames from the label-sorted videos
    CreateFrameDataset {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_SHEETS")]
        sheets: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_VIDEO_ROOT")]
        src_video_dir: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        dst_frame_dir: PathBuf,
    },

    /// Apply the configured transforms to every frame
    Preprocess {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        src_root: PathBuf,

        /// Defaults to the source root (in place)
        #[arg(long)]
        dst_root: Option<PathBuf>,
    },

    /// Serve the relabel UI for one video
    Relabel {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        frame_root: PathBuf,

        #[arg(long)]
        video_name: String,

        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        #[arg(long, default_value_t = 12206)]
        port: u16,
    },

    /// Copy frames into the train/test upload layout
    ExportUpload {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        src_root: PathBuf,

        #[arg(long)]
        dst_root: PathBuf,

        /// Overrides `data_split.test_size`
        #[arg(long)]
        test_size: Option<f64>,

        /// Overrides `data_split.seed`
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check that ledger rows and frame images match one to one
    Verify {
        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        frame_root: PathBuf,
    },

    /// Copy videos that show activity into another directory
    FilterEmpty {
        #[arg(long)]
        src: PathBuf,

        #[arg(long, default_value = "empty_videos")]
        dest: PathBuf,

        #[arg(long, default_value_t = crate::video::filtering::DEFAULT_ACTIVITY_THRESHOLD)]
        threshold: u8,

        #[arg(long)]
        dry_run: bool,
    },

    /// Publish the frames to the annotation exchange and open a job
    PublishAnnotations {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        frame_root: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_ANNOTATION_DIR")]
        service_dir: PathBuf,

        #[arg(long)]
        dataset_name: String,

        #[arg(long)]
        anno_key: String,
    },

    /// Merge finished annotations back into the ledger
    ImportAnnotations {
        #[arg(long, env = "WILDLIFE_FRAMES_CONFIG", default_value = "config.json")]
        config: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_FRAME_ROOT")]
        frame_root: PathBuf,

        #[arg(long, env = "WILDLIFE_FRAMES_ANNOTATION_DIR")]
        service_dir: PathBuf,

        #[arg(long)]
        dataset_name: String,

        #[arg(long)]
        anno_key: String,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_export_overrides() {
        let args = Args::try_parse_from([
            "wildlife-frames",
            "export-upload",
            "--config",
            "c.json",
            "--src-root",
            "frames",
            "--dst-root",
            "upload",
            "--test-size",
            "0.3",
        ])
        .unwrap();
        match args.command {
            Command::ExportUpload {
                test_size, seed, ..
            } => {
                assert_eq!(test_size, Some(0.3));
                assert_eq!(seed, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
