use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mediacdn_uploader::cache::MediaCache;
use mediacdn_uploader::cdn::{build_cdn, build_publisher, CdnService};
use mediacdn_uploader::media::collect_media;
use mediacdn_uploader::models::{parse_parallel, CdnKind, Config};
use mediacdn_uploader::output::write_results;
use mediacdn_uploader::page::{post_gallery, PostRequest};
use mediacdn_uploader::uploader::Uploader;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mediacdn-uploader")]
#[command(about = "Upload media files to a CDN and print their public URLs")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload files and print their URLs
    Upload(UploadArgs),

    /// Upload a folder of images and publish them as a Telegraph page
    Post(PostArgs),
}

/// Backend selection shared by every command.
#[derive(Debug, Args)]
struct BackendArgs {
    /// CDN backend: s3, telegraph, post-image or mock (overrides CDN_TYPE).
    #[arg(long, value_parser = parse_cdn_arg)]
    cdn: Option<CdnKind>,

    /// Maximum number of concurrent uploads (overrides UPLOAD_PARALLEL).
    #[arg(short, long, value_parser = parse_parallel_arg)]
    parallel: Option<usize>,

    /// Cache file mapping content hashes to URLs (overrides UPLOAD_CACHE).
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Use the in-memory mock backend instead of a real CDN.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct UploadArgs {
    /// Files or directories to upload. Directories contribute their images.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    backend: BackendArgs,

    /// Write results to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print one URL per line instead of JSON.
    #[arg(long)]
    plain: bool,
}

#[derive(Debug, Args)]
struct PostArgs {
    /// Folder whose images make up the page, in natural order.
    #[arg(value_name = "FOLDER")]
    folder: PathBuf,

    #[arg(long)]
    title: String,

    /// Image placed before the folder's images. Repeatable.
    #[arg(long = "title-image", value_name = "PATH")]
    title_images: Vec<PathBuf>,

    /// Image placed after the folder's images. Repeatable.
    #[arg(long = "caption-image", value_name = "PATH")]
    caption_images: Vec<PathBuf>,

    /// Page author (overrides TELEGRAPH_AUTHOR_NAME).
    #[arg(long)]
    author_name: Option<String>,

    /// Page author link (overrides TELEGRAPH_AUTHOR_URL).
    #[arg(long)]
    author_url: Option<String>,

    #[command(flatten)]
    backend: BackendArgs,

    /// Also write the page URL to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_cdn_arg(input: &str) -> std::result::Result<CdnKind, String> {
    input.parse().map_err(|e: mediacdn_uploader::Error| e.to_string())
}

fn parse_parallel_arg(input: &str) -> std::result::Result<usize, String> {
    parse_parallel(input).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mediacdn_uploader={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for running uploads to finish");
            on_signal.cancel();
        }
    });

    let result = match args.command {
        Command::Upload(args) => run_upload(args, &cancel).await,
        Command::Post(args) => run_post(args, &cancel).await,
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Uploader for one run, plus the cache it has to persist afterwards.
struct Session {
    uploader: Uploader,
    cache: Option<(Arc<MediaCache>, PathBuf)>,
}

impl Session {
    async fn open(args: &BackendArgs, config: &Config) -> Result<Self> {
        let kind = if args.dry_run {
            info!("Dry run: uploads go to the mock backend");
            CdnKind::Mock
        } else {
            args.cdn.or(config.cdn).unwrap_or(CdnKind::Telegraph)
        };
        let parallel = args.parallel.unwrap_or(config.parallel);

        let backend = build_cdn(kind, config).await.context("configure CDN")?;

        let cache = match args.cache.clone().or_else(|| config.cache_file.clone()) {
            Some(path) => {
                let cache = Arc::new(MediaCache::new(backend.clone()));
                cache.load_file(&path).await.context("load cache")?;
                Some((cache, path))
            }
            None => None,
        };
        let cdn: Arc<dyn CdnService> = match &cache {
            Some((cache, _)) => cache.clone() as Arc<dyn CdnService>,
            None => backend,
        };

        Ok(Self {
            uploader: Uploader::new(cdn, parallel)?,
            cache,
        })
    }

    /// Persist the cache. Called whatever the outcome of the run, since the
    /// cache keeps URLs from successful items even when a batch failed.
    async fn save(&self) -> Result<()> {
        let Some((cache, path)) = &self.cache else {
            return Ok(());
        };
        let saved = cache.save_file(path).await;
        if let Err(e) = &saved {
            error!("Failed to save cache: {}", e);
        }
        saved.context("save cache")
    }
}

async fn run_upload(args: UploadArgs, cancel: &CancellationToken) -> Result<()> {
    let config = Config::from_env().context("load configuration")?;
    let session = Session::open(&args.backend, &config).await?;

    let items = collect_media(&args.paths).await.context("load files")?;
    info!(
        "Uploading {} files with up to {} in parallel",
        items.len(),
        session.uploader.parallel()
    );

    let uploaded = session.uploader.upload(items, cancel).await;
    let saved = session.save().await;
    let uploaded = uploaded.context("upload files")?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create output file {}", path.display()))?;
            write_results(BufWriter::new(file), &uploaded, args.plain)?;
        }
        None => write_results(std::io::stdout().lock(), &uploaded, args.plain)?,
    }

    saved
}

async fn run_post(args: PostArgs, cancel: &CancellationToken) -> Result<()> {
    let mut config = Config::from_env().context("load configuration")?;
    if args.author_name.is_some() {
        config.telegraph.author_name = args.author_name.clone();
    }
    if args.author_url.is_some() {
        config.telegraph.author_url = args.author_url.clone();
    }

    let session = Session::open(&args.backend, &config).await?;
    let publisher = build_publisher(args.backend.dry_run, &config)
        .await
        .context("configure telegraph")?;

    let items = collect_media(&post_paths(&args)).await.context("load images")?;
    let request = PostRequest {
        title: args.title.clone(),
        author_name: config.telegraph.author_name.clone(),
        author_url: config.telegraph.author_url.clone(),
    };

    let posted = post_gallery(&session.uploader, publisher.as_ref(), &request, items, cancel).await;
    let saved = session.save().await;
    let url = posted.context("post page")?;

    writeln!(std::io::stdout().lock(), "Article posted: {}", url)?;
    if let Some(path) = &args.output {
        write_page_url(path, &url)?;
    }

    saved
}

/// Title images, then the folder, then caption images.
fn post_paths(args: &PostArgs) -> Vec<PathBuf> {
    args.title_images
        .iter()
        .chain(std::iter::once(&args.folder))
        .chain(&args.caption_images)
        .cloned()
        .collect()
}

fn write_page_url(path: &Path, url: &str) -> Result<()> {
    std::fs::write(path, url).with_context(|| format!("write output file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cdn_arg() {
        assert_eq!(parse_cdn_arg("s3").unwrap(), CdnKind::S3);
        assert!(parse_cdn_arg("ftp").unwrap_err().contains("unsupported"));
    }

    #[test]
    fn test_parse_parallel_arg() {
        assert_eq!(parse_parallel_arg("4").unwrap(), 4);
        assert!(parse_parallel_arg("0").is_err());
    }

    #[test]
    fn test_upload_requires_paths() {
        assert!(CliArgs::try_parse_from(["mediacdn-uploader", "upload"]).is_err());

        let args = CliArgs::try_parse_from([
            "mediacdn-uploader",
            "upload",
            "--cdn",
            "mock",
            "-p",
            "3",
            "--plain",
            "a.png",
            "pics",
        ])
        .unwrap();
        let Command::Upload(upload) = args.command else {
            panic!("expected upload command");
        };
        assert_eq!(upload.backend.cdn, Some(CdnKind::Mock));
        assert_eq!(upload.backend.parallel, Some(3));
        assert!(upload.plain);
        assert_eq!(upload.paths.len(), 2);
    }

    #[test]
    fn test_post_orders_title_folder_and_captions() {
        assert!(CliArgs::try_parse_from(["mediacdn-uploader", "post", "pics"]).is_err());

        let args = CliArgs::try_parse_from([
            "mediacdn-uploader",
            "post",
            "pics",
            "--title",
            "Trip",
            "--caption-image",
            "end.png",
            "--title-image",
            "cover.png",
            "--dry-run",
        ])
        .unwrap();
        let Command::Post(post) = args.command else {
            panic!("expected post command");
        };
        assert!(post.backend.dry_run);
        assert_eq!(
            post_paths(&post),
            vec![
                PathBuf::from("cover.png"),
                PathBuf::from("pics"),
                PathBuf::from("end.png")
            ]
        );
    }

    #[test]
    fn test_write_page_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.txt");

        write_page_url(&path, "https://telegra.ph/p").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "https://telegra.ph/p");
    }
}
