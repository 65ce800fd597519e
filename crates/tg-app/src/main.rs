use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tg_core::ObjectKind;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tg_app::config::{AppConfig, Overrides};
use tg_app::events::JobEvent;
use tg_app::gateway::GatewayClient;
use tg_app::import::{Decoder, ImportPipeline, PlyDecoder, SpzDecoder};
use tg_app::job::{GenerationParams, JobRecord, JobRequest, MeshSettings};
use tg_app::manager::JobManager;
use tg_app::scene::DiskScene;

#[derive(Parser)]
#[command(name = "threegen", version, about = "Generate 3D assets from text or image prompts")]
struct Cli {
    /// Generation service URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// API key for the generation service
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Where generated objects are written
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// SPZ decompression library, or the directory holding it
    #[arg(long, global = true)]
    spz_library: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a generation job and wait until it is imported or fails
    Generate(GenerateArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Splat,
    Mesh,
}

impl From<KindArg> for ObjectKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Splat => ObjectKind::Splat,
            KindArg::Mesh => ObjectKind::Mesh,
        }
    }
}

#[derive(Args)]
struct GenerateArgs {
    /// Text prompt
    #[arg(long, conflicts_with = "image", required_unless_present = "image")]
    prompt: Option<String>,

    /// Image to generate from
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = KindArg::Splat)]
    kind: KindArg,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=10))]
    seed: u32,

    /// Existing splat PLY the result should replace
    #[arg(long)]
    replace: Option<PathBuf>,

    /// Mesh voxel size; also the point spacing of the disk scene's point meshes
    #[arg(long, default_value_t = MeshSettings::default().voxel_size)]
    voxel_size: f32,

    /// Remesh adaptivity (textured mesh backends only, ignored by the disk scene)
    #[arg(long, default_value_t = MeshSettings::default().adaptivity)]
    adaptivity: f32,

    /// UV unwrap angle limit (textured mesh backends only, ignored by the disk scene)
    #[arg(long, default_value_t = MeshSettings::default().angle_limit)]
    angle_limit: f32,

    /// UV island margin (textured mesh backends only, ignored by the disk scene)
    #[arg(long, default_value_t = MeshSettings::default().island_margin)]
    island_margin: f32,

    /// Baked texture size (textured mesh backends only, ignored by the disk scene)
    #[arg(long, default_value_t = MeshSettings::default().texture_size)]
    texture_size: u32,

    /// Keep the splat next to the generated mesh
    #[arg(long)]
    keep_original: bool,

    /// Restart a failed job up to this many times
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Print the remaining jobs as JSON
    #[arg(long)]
    json: bool,
}

impl GenerateArgs {
    fn request(&self) -> anyhow::Result<JobRequest> {
        let params = GenerationParams {
            kind: self.kind.into(),
            seed: self.seed,
            mesh: MeshSettings {
                voxel_size: self.voxel_size,
                adaptivity: self.adaptivity,
                angle_limit: self.angle_limit,
                island_margin: self.island_margin,
                texture_size: self.texture_size,
                keep_original: self.keep_original,
                ..MeshSettings::default()
            },
        };

        match (&self.prompt, &self.image) {
            (Some(prompt), None) => Ok(JobRequest::text(prompt.clone(), params)),
            (None, Some(image)) => Ok(JobRequest::image(image.clone(), params)),
            _ => anyhow::bail!("exactly one of --prompt or --image is required"),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = AppConfig::load(Overrides {
        url: cli.url,
        api_key: cli.api_key,
        output_dir: cli.output_dir,
        spz_library: cli.spz_library,
    })
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Generate(args) => generate(&config, &args),
    }
}

fn generate(config: &AppConfig, args: &GenerateArgs) -> anyhow::Result<ExitCode> {
    let request = args.request()?;

    let gateway = GatewayClient::new(&config.gateway)?;
    let mut scene = DiskScene::new(&config.output_dir)?;
    let replace_target = args
        .replace
        .as_deref()
        .map(|path| scene.load_object(path))
        .transpose()
        .context("Failed to load replacement target")?;

    let decoder: Box<dyn Decoder> = match SpzDecoder::load(config.spz_library.as_deref()) {
        Ok(spz) => Box::new(spz),
        Err(e) => {
            warn!("{}; only PLY results can be imported", e.0);
            Box::new(PlyDecoder)
        }
    };

    let mut manager = JobManager::new(gateway, ImportPipeline::new(scene, decoder), config.poll_interval);
    manager.add(request, replace_target);

    let mut retries = args.retries;
    loop {
        let failed = report(&mut manager);
        if retries > 0 && !failed.is_empty() {
            std::thread::sleep(manager.poll_interval());
            for id in failed.iter().take(retries as usize) {
                retries -= 1;
                info!("Retrying job {} ({} retries left)", id, retries);
                if let Err(e) = manager.restart(id) {
                    warn!("{}", e);
                }
            }
            continue;
        }

        if !manager.is_poll_scheduled() {
            break;
        }
        std::thread::sleep(manager.poll_interval());
        manager.tick();
    }

    let root = manager.importer().scene().root().display().to_string();
    let remaining = manager.jobs();
    if args.json {
        println!("{}", serde_json::to_string_pretty(remaining)?);
    } else {
        for job in remaining {
            println!("{}", describe(job));
        }
    }

    if remaining.iter().any(|j| j.status().is_terminal()) {
        Ok(ExitCode::FAILURE)
    } else {
        info!("All jobs imported into {}", root);
        Ok(ExitCode::SUCCESS)
    }
}

type Manager = JobManager<GatewayClient, ImportPipeline<DiskScene, Box<dyn Decoder>>>;

/// Logs pending events and returns the ids of jobs that just failed
fn report(manager: &mut Manager) -> Vec<String> {
    let mut failed = Vec::new();
    for event in manager.drain_events() {
        match event {
            JobEvent::Submitted { id, placeholder } => info!("Submitted {} (was {})", id, placeholder),
            JobEvent::Progress { id, status } => info!("Waiting on {}: {:?}", id, status),
            JobEvent::Completed { id, object } => {
                let scene = manager.importer().scene();
                match scene.path_of(&object) {
                    Some(path) => info!("Job {} imported as {} at {}", id, object, path.display()),
                    None => info!("Job {} imported as {}", id, object),
                }
            }
            JobEvent::Failed { id, reason } => {
                warn!("Job {} failed: {}", id, reason);
                failed.push(id);
            }
            JobEvent::Removed { id } => info!("Removed {}", id),
        }
    }
    failed
}

fn describe(job: &JobRecord) -> String {
    let mut line = format!(
        "{} {} [{}] {} ({})",
        job.status().icon(),
        job.id(),
        job.request().params.kind.name(),
        job.request().input.summary(),
        job.created_at().format("%H:%M:%S"),
    );
    if !job.reason().is_empty() {
        line.push_str(" - ");
        line.push_str(job.reason());
    }
    line
}
