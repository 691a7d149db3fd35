mod annotation;
mod cli;
mod config;
mod error;
mod ledger;
mod pipeline;
mod raw_data;
mod relabel;
mod sheets;
mod video;
mod web;

use anyhow::{Context, Result};
use cli::{Args, Command};
use config::DatasetConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse_args();

    match args.command {
        Command::Relabel {
            config,
            frame_root,
            video_name,
            host,
            port,
        } => {
            let config = DatasetConfig::load(&config)?;
            let ledger_path = ledger::ledger_path(&frame_root);
            let ledger = ledger::FrameLedger::read(&ledger_path)?;
            let session =
                relabel::RelabelSession::from_ledger(&ledger, &video_name, config.relabel_classes())?;
            web::server::run_relabel_server(
                host,
                port,
                session,
                ledger::dataset_dir(&frame_root),
                ledger_path,
            )
            .await
        }
        command => tokio::task::spawn_blocking(move || run_batch(command))
            .await
            .context("Batch command panicked")?,
    }
}

fn run_batch(command: Command) -> Result<()> {
    match command {
        Command::CreateConfigFile { config } => {
            DatasetConfig::default().save(&config)?;
            tracing::info!("Wrote default config to {:?}", config);
        }
        Command::CreateLabelStructure {
            sheets,
            src_dir,
            dst_dir,
        } => {
            let records = sheets::read_label_sheets(&sheets)?;
            raw_data::copy_files_to_label_based_file_structure(&records, &src_dir, &dst_dir)?;
        }
        Command::CreateFrameDataset {
            config,
            sheets,
            src_video_dir,
            dst_frame_dir,
        } => {
            let config = DatasetConfig::load(&config)?;
            let records = sheets::read_label_sheets(&sheets)?;
            let report = pipeline::assembler::create_frame_image_dataset(
                &config,
                &records,
                &src_video_dir,
                &dst_frame_dir,
                &video::FfmpegSource,
            )?;
            println!("{}", serde_json::to_string_pretty(&report.labels)?);
        }
        Command::Preprocess {
            config,
            src_root,
            dst_root,
        } => {
            let config = DatasetConfig::load(&config)?;
            let transform = config.compose_transforms()?;
            let dst_root = dst_root.unwrap_or_else(|| src_root.clone());
            let report = pipeline::preprocess::preprocess_images(&transform, &src_root, &dst_root)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ExportUpload {
            config,
            src_root,
            dst_root,
            test_size,
            seed,
        } => {
            let config = DatasetConfig::load(&config)?;
            let report = pipeline::export::convert_file_structure_to_upload_format(
                &src_root,
                &dst_root,
                test_size.unwrap_or(config.data_split.test_size),
                seed.unwrap_or(config.data_split.seed),
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Verify { frame_root } => {
            let report = ledger::verify_frame_tree(&frame_root)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_consistent() {
                anyhow::bail!("Frame tree at {:?} does not match its ledger", frame_root);
            }
        }
        Command::FilterEmpty {
            src,
            dest,
            threshold,
            dry_run,
        } => {
            let report =
                raw_data::filter_empty_videos(&src, &dest, &video::FfmpegSource, threshold, dry_run)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::PublishAnnotations {
            config,
            frame_root,
            service_dir,
            dataset_name,
            anno_key,
        } => {
            let config = DatasetConfig::load(&config)?;
            let ledger = ledger::FrameLedger::read(&ledger::ledger_path(&frame_root))?;
            let mut service = annotation::ManifestService::new(&service_dir);
            annotation::publish_ledger(&mut service, &dataset_name, &ledger, &frame_root)?;
            annotation::AnnotationService::annotate(
                &mut service,
                &dataset_name,
                &anno_key,
                &config.relabel_classes(),
            )?;
        }
        Command::ImportAnnotations {
            config,
            frame_root,
            service_dir,
            dataset_name,
            anno_key,
        } => {
            let config = DatasetConfig::load(&config)?;
            let ledger_path = ledger::ledger_path(&frame_root);
            let mut ledger = ledger::FrameLedger::read(&ledger_path)?;
            let mut service = annotation::ManifestService::new(&service_dir);
            let report =
                annotation::apply_annotations(
                    &mut service,
                    &dataset_name,
                    &anno_key,
                    &config.relabel_classes(),
                    &mut ledger,
                )?;
            ledger.write(&ledger_path)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Relabel { .. } => anyhow::bail!("relabel has to run on the async runtime"),
    }
    Ok(())
}
