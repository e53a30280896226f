use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use artisan_core::{
    generate_website, AssetStore, Command, DevicePreset, FileAssetStore, Workbench,
};
use artisan_render::{write_site_dir, write_zip, SandboxRenderer, DEFAULT_ARCHIVE_NAME};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod config;
mod console;
mod generator;
mod project;
mod server;

use config::{Config, ServerConfig};
use generator::LlmSiteGenerator;
use project::Project;
use server::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "artisan",
    version,
    about = "Generate multi-page websites from a prompt and preview them live"
)]
struct Args {
    /// Config file to read instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for logs, uploaded assets and the default config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Serve the live preview over HTTP
    Serve {
        /// Project file to show; edits and generations are saved back to it
        #[arg(short, long)]
        project: Option<PathBuf>,
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, default_value = "desktop")]
        device: DevicePreset,
        /// Reload the project file when it changes on disk
        #[arg(long)]
        watch: bool,
        /// Drive the preview from the terminal as well
        #[arg(long)]
        console: bool,
        /// Asset directory
        #[arg(long)]
        assets: Option<PathBuf>,
    },
    /// Generate a website from a prompt and save it as a project file
    Generate {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(short, long, default_value = "site.json")]
        output: PathBuf,
    },
    /// Print the sandboxed preview markup of one page
    Render {
        project: PathBuf,
        /// Page filename; defaults to the entry page
        #[arg(long)]
        page: Option<String>,
        /// Origin that `/assets/` paths should resolve against
        #[arg(long)]
        origin: Option<String>,
    },
    /// Export a project as standalone files
    Export {
        project: PathBuf,
        /// Zip archive to write
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write plain files into this directory instead of a zip
        #[arg(long, conflicts_with = "output")]
        dir: Option<PathBuf>,
    },
    /// Manage uploaded assets
    Assets {
        #[command(subcommand)]
        action: AssetsCmd,
    },
}

#[derive(Debug, Subcommand)]
enum AssetsCmd {
    List,
    Add {
        file: PathBuf,
        /// Stored name; defaults to the file's name
        #[arg(long)]
        name: Option<String>,
    },
    Rm {
        name: String,
    },
}

struct AppDirs {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppDirs {
    fn resolve(args: &Args) -> Result<Self> {
        let project_dirs = ProjectDirs::from("dev", "webartisan", "artisan");
        let data_dir = match (&args.data_dir, &project_dirs) {
            (Some(dir), _) => dir.clone(),
            (None, Some(dirs)) => dirs.data_local_dir().to_path_buf(),
            (None, None) => return Err(anyhow!("unable to resolve platform data directories")),
        };
        let config_file = match (&args.data_dir, &project_dirs) {
            (Some(dir), _) => dir.join("config.toml"),
            (None, Some(dirs)) => dirs.config_dir().join("config.toml"),
            (None, None) => data_dir.join("config.toml"),
        };
        Ok(Self {
            config_file,
            data_dir,
        })
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let dirs = AppDirs::resolve(&args)?;

    let console_owns_screen = matches!(args.command, Cmd::Serve { console: true, .. });
    let _log_guard = init_logging(&dirs.log_dir(), !console_owns_screen)?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&dirs.config_file)?,
    };

    match args.command {
        Cmd::Serve {
            project,
            bind,
            device,
            watch,
            console,
            assets,
        } => {
            let assets = assets
                .or_else(|| config.assets.root.clone())
                .unwrap_or_else(|| dirs.assets_dir());
            run_serve(&config, project, bind, device, watch, console, assets).await
        }
        Cmd::Generate { prompt, output } => run_generate(&config, &prompt.join(" "), &output).await,
        Cmd::Render {
            project,
            page,
            origin,
        } => run_render(&project, page.as_deref(), origin),
        Cmd::Export {
            project,
            output,
            dir,
        } => run_export(&project, output, dir),
        Cmd::Assets { action } => {
            let root = config.assets.root.clone().unwrap_or_else(|| dirs.assets_dir());
            run_assets(FileAssetStore::new(root), action)
        }
    }
}

async fn run_serve(
    config: &Config,
    project_path: Option<PathBuf>,
    bind: Option<String>,
    device: DevicePreset,
    watch: bool,
    console: bool,
    assets_root: PathBuf,
) -> Result<()> {
    let server_config = ServerConfig {
        bind: bind.unwrap_or_else(|| config.server.bind.clone()),
        public_origin: config.server.public_origin.clone(),
    };
    let origin = server_config.origin();

    let project = match &project_path {
        Some(path) if path.exists() => Project::load(path)?,
        Some(path) => {
            warn!(path = %path.display(), "project file missing; starting from the placeholder");
            Project::placeholder()
        }
        None => Project::placeholder(),
    };

    let renderer = SandboxRenderer::with_asset_origin(origin.clone());
    let mut workbench = Workbench::new(project.document, Arc::new(renderer));
    workbench.apply(Command::SetTheme {
        theme: project.theme,
    })?;
    workbench.apply(Command::SetDevice { device })?;

    let assets: Arc<dyn AssetStore> = Arc::new(FileAssetStore::new(assets_root));
    let generator = Arc::new(LlmSiteGenerator::from_config(&config.generator));
    let (state, receiver) = AppState::new(workbench, assets, generator, project_path, origin);
    state.publish();

    let listener = TcpListener::bind(&server_config.bind)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind))?;
    let shutdown = Arc::new(Notify::new());

    let console_task = console.then(|| {
        let state = Arc::clone(&state);
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || console::run_console(state, shutdown))
    });

    server::serve(state, receiver, listener, watch, shutdown).await?;

    if let Some(task) = console_task {
        task.await.context("console task panicked")??;
    }
    Ok(())
}

async fn run_generate(config: &Config, prompt: &str, output: &Path) -> Result<()> {
    let generator = LlmSiteGenerator::from_config(&config.generator);
    let generation = generate_website(&generator, prompt).await?;
    let project = Project {
        theme: generation.theme,
        document: generation.document,
    };
    project.save(output)?;
    println!(
        "wrote {} ({} pages, {} theme)",
        output.display(),
        project.document.page_count(),
        project.theme
    );
    Ok(())
}

fn run_render(project: &Path, page: Option<&str>, origin: Option<String>) -> Result<()> {
    let project = Project::load(project)?;
    let document = &project.document;
    let page = match page {
        Some(name) => document
            .page(name)
            .ok_or_else(|| anyhow!("no page named {name:?} in {}", document_names(document)))?,
        None => document.default_page(),
    };
    let renderer = match origin {
        Some(origin) => SandboxRenderer::with_asset_origin(origin),
        None => SandboxRenderer::new(),
    };
    print!("{}", renderer.render_page(document, page)?);
    Ok(())
}

fn document_names(document: &artisan_core::Document) -> String {
    document
        .pages()
        .iter()
        .map(|page| page.filename.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_export(project: &Path, output: Option<PathBuf>, dir: Option<PathBuf>) -> Result<()> {
    let project = Project::load(project)?;
    if let Some(dir) = dir {
        write_site_dir(&project.document, &dir)?;
        println!("exported {} pages to {}", project.document.page_count(), dir.display());
        return Ok(());
    }

    let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_NAME));
    let file = File::create(&output).with_context(|| format!("failed to create {:?}", output))?;
    write_zip(&project.document, file)?;
    info!(path = %output.display(), "archive written");
    println!("{}", output.display());
    Ok(())
}

fn run_assets(store: FileAssetStore, action: AssetsCmd) -> Result<()> {
    match action {
        AssetsCmd::List => {
            for url in store.list()? {
                println!("{url}");
            }
        }
        AssetsCmd::Add { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("cannot derive an asset name from {:?}", file))?,
            };
            let bytes = fs::read(&file).with_context(|| format!("failed to read {:?}", file))?;
            println!("{}", store.upload(&name, &bytes)?);
        }
        AssetsCmd::Rm { name } => {
            store.delete(&name)?;
            println!("deleted {name}");
        }
    }
    Ok(())
}

fn init_logging(log_dir: &Path, stderr_output: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "artisan.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer =
        stderr_output.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
