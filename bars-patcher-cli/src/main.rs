use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bars_patcher_core::profile::ProfileStore;
use bars_patcher_core::{error_string, result_code, run, PatchSettings, VERSION};

const DEFAULT_CONFIG_PATH: &str = "game-config.txt";

#[derive(Debug, Parser)]
#[command(
    name = "auto-bars-patcher",
    version,
    about = "Patch modded BWAV headers into a BARS audio bank"
)]
struct Args {
    /// Directory with original unmodified BWAV files
    #[arg(long, required_unless_present_any = ["game", "list_games"])]
    og_stream_dir: Option<PathBuf>,

    /// Directory with modified BWAV files
    #[arg(long, required_unless_present_any = ["game", "list_games"])]
    mod_stream_dir: Option<PathBuf>,

    /// Original unmodified BARS file
    #[arg(long, required_unless_present_any = ["game", "list_games"])]
    og_bars_file: Option<PathBuf>,

    /// Location for the patched BARS file
    #[arg(long, required_unless_present_any = ["game", "list_games"])]
    bars_output_file: Option<PathBuf>,

    /// Take all four paths from a game profile instead
    #[arg(
        long,
        value_name = "ID",
        conflicts_with_all = ["og_stream_dir", "mod_stream_dir", "og_bars_file", "bars_output_file"]
    )]
    game: Option<String>,

    /// Game profile file, created with the built-in profiles if missing
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// List the games in the profile file and exit
    #[arg(long)]
    list_games: bool,

    /// Write a JSON report of every patched and skipped file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .without_time()
        .init();
}

fn settings_from_args(args: &Args) -> Result<Option<PatchSettings>, String> {
    if args.list_games || args.game.is_some() {
        let store = ProfileStore::load_or_init(&args.config).map_err(|e| e.to_string())?;

        if args.list_games {
            for p in store.profiles() {
                println!("{:<12} {}", p.id, p.name);
            }
            return Ok(None);
        }

        if store.is_empty() {
            return Err(format!(
                "there are no games in {}, delete it to restore the defaults",
                args.config.display()
            ));
        }
        let id = args.game.as_deref().unwrap_or_default();
        let profile = store.get(id).map_err(|e| e.to_string())?;
        info!("using profile '{}' ({})", profile.id, profile.name);
        return Ok(Some(profile.to_settings(args.verbose)));
    }

    match (
        &args.og_stream_dir,
        &args.mod_stream_dir,
        &args.og_bars_file,
        &args.bars_output_file,
    ) {
        (Some(og), Some(md), Some(input), Some(output)) => Ok(Some(PatchSettings {
            verbose: args.verbose,
            original_dir: og.clone(),
            modded_dir: md.clone(),
            input_path: input.clone(),
            output_path: output.clone(),
            limits: Default::default(),
        })),
        _ => Err("all directory and file path options must be used".to_string()),
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    info!("Automatic BARS Patcher {}", VERSION);

    let settings = match settings_from_args(&args) {
        Ok(Some(settings)) => settings,
        Ok(None) => return,
        Err(msg) => {
            error!("{}", msg);
            std::process::exit(1);
        }
    };

    if args.verbose {
        info!("original BARS file: {}", settings.input_path.display());
        info!("original BWAV folder: {}", settings.original_dir.display());
        info!("modded BWAV folder: {}", settings.modded_dir.display());
        info!("patched BARS output: {}", settings.output_path.display());
    }

    let result = run(&settings);
    if let (Ok(report), Some(path)) = (&result, &args.report) {
        let written = report
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            error!("could not write report {}: {}", path.display(), e);
        }
    }

    let code = result_code(&result);
    if code != 0 {
        eprintln!("BARS patch error. ({}, {})", code, error_string(code));
        std::process::exit(2);
    }
}
