#![deny(clippy::all)]
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use slicemark_domain::{ShapeI, SmResult, smerr, to_sm};
use smlib::{
    AnnotationsMap,
    cfg::{self, Cfg},
    httpserver, mask_export,
    result::trace_ok_err,
    store::{FileStore, SessionStore, StoreFromCfg},
    sync::PersistenceSync,
    tracing_setup,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::runtime::Runtime;
use tracing::{info, warn};

const N_PORT_RETRIES: usize = 10;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file, defaults to `sm_cfg.toml` in `~/.slicemark`
    #[arg(short, long)]
    cfg: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serves the session documents of the configured folder via HTTP
    Serve {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Prints the measurements of all images of a session
    Show { session_id: String },
    /// Writes one binary PNG mask per annotated image of a session
    ExportMasks {
        session_id: String,
        out_folder: PathBuf,
        #[arg(long, default_value_t = 512)]
        width: u32,
        #[arg(long, default_value_t = 512)]
        height: u32,
    },
}

fn load_session(cfg: &Cfg, session_id: &str) -> SmResult<AnnotationsMap> {
    let store = StoreFromCfg::from_cfg(cfg)?;
    let mut sync = PersistenceSync::new(
        store,
        cfg.author_name(),
        cfg.image_id_scheme(),
        cfg.empty_set_policy,
    );
    let rt = Runtime::new().map_err(to_sm)?;
    rt.block_on(sync.try_load_all(session_id))
}

fn serve(cfg: &Cfg, address: Option<String>) -> SmResult<()> {
    let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(cfg.store.folder()));
    let address = address.unwrap_or_else(|| cfg.server.http_address().to_string());
    let (address, handle, rx) = httpserver::launch_with_retries(&address, store, N_PORT_RETRIES)?;
    println!("serving annotations at http://{address}");
    for served in rx {
        match served {
            Ok(path) => info!("served {path}"),
            Err(e) => warn!("{e:?}"),
        }
    }
    handle
        .join()
        .map_err(|e| smerr!("httpserver thread panicked, {:?}", e))?
}

fn show(cfg: &Cfg, session_id: &str) -> SmResult<()> {
    let annotations = load_session(cfg, session_id)?;
    if annotations.is_empty() {
        println!("no annotations in session '{session_id}'");
    }
    for (image, set) in &annotations {
        println!("{image}");
        for anno in set.iter() {
            println!("  {:<14} {}", anno.tool_kind().name(), anno.label());
        }
    }
    Ok(())
}

fn export_masks(cfg: &Cfg, session_id: &str, out_folder: &Path, shape: ShapeI) -> SmResult<()> {
    let annotations = load_session(cfg, session_id)?;
    for path in mask_export::export_masks(&annotations, out_folder, shape)? {
        println!("{path:?}");
    }
    Ok(())
}

fn run(cli: Cli) -> SmResult<()> {
    let cfg = match &cli.cfg {
        Some(path) => cfg::read_cfg_from_path(path)?,
        None => cfg::read_cfg()?,
    };
    match cli.command {
        Command::Serve { address } => serve(&cfg, address),
        Command::Show { session_id } => show(&cfg, &session_id),
        Command::ExportMasks {
            session_id,
            out_folder,
            width,
            height,
        } => export_masks(&cfg, &session_id, &out_folder, ShapeI::new(width, height)),
    }
}

fn main() {
    let _guard_flush_to_logfile = tracing_setup::tracing_setup();
    let cli = Cli::parse();
    if trace_ok_err(run(cli)).is_none() {
        std::process::exit(1);
    }
}
