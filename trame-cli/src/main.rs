//! Dumps render-command streams for a compiled animation or scene as JSON.

use std::{fs, path::PathBuf};

use clap::{Parser, ValueEnum};
use kurbo::Affine;
use thiserror::Error;
use trame::{
    compile_anim, is_balanced, AnimValidator, AssetIndex, CompiledPackage, LoadedAnimations,
    PathRegistry, RenderMode, Scene, ScenePlayer, SceneValidator, Severity,
};

#[derive(ValueEnum, Clone, Debug)]
enum CliMode {
    Preview,
    Edit,
}

impl CliMode {
    fn to_lib(&self) -> RenderMode {
        match self {
            CliMode::Preview => RenderMode::Preview,
            CliMode::Edit => RenderMode::Edit,
        }
    }
}

#[derive(Parser)]
struct Args {
    /// Lottie document to compile (single-animation mode)
    #[arg(long)]
    lottie: Option<PathBuf>,

    /// Scene descriptor; each variant's animRef must be mapped with --anim
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Animation mapping in the form ref=path; repeatable
    #[arg(long = "anim")]
    anims: Vec<String>,

    /// Binding layer name for single-animation mode
    #[arg(long, default_value = "media")]
    binding: String,

    /// Frame to render
    #[arg(long, default_value_t = 0.0)]
    frame: f64,

    /// User transform as "tx,ty" applied to the binding layer
    #[arg(long)]
    translate: Option<String>,

    /// Treat user media as present
    #[arg(long)]
    media_present: bool,

    #[clap(value_enum)]
    #[arg(long, default_value = "preview")]
    mode: CliMode,

    /// Where to write the command stream; stdout when unset
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Compile(#[from] trame::CompileError),
    #[error("bad --anim mapping '{0}', expected ref=path")]
    BadAnimMapping(String),
    #[error("bad --translate '{0}', expected tx,ty")]
    BadTranslate(String),
    #[error("pass either --lottie or --scene")]
    NoInput,
    #[error("document has validation errors")]
    ValidationFailed,
    #[error("emitted stream is not balanced")]
    Unbalanced,
}

fn parse_translate(raw: &str) -> Result<Affine, CliError> {
    let parts: Vec<_> = raw.split(',').collect();
    let bad = || CliError::BadTranslate(raw.to_string());
    if parts.len() != 2 {
        return Err(bad());
    }
    let tx: f64 = parts[0].trim().parse().map_err(|_| bad())?;
    let ty: f64 = parts[1].trim().parse().map_err(|_| bad())?;
    Ok(Affine::translate((tx, ty)))
}

fn report_issues(issues: &[trame::ValidationIssue]) -> bool {
    let mut fatal = false;
    for issue in issues {
        let tag = match issue.severity {
            Severity::Error => {
                fatal = true;
                "error"
            }
            Severity::Warning => "warning",
        };
        eprintln!("{tag}: {} at {}: {}", issue.code, issue.path, issue.message);
    }
    fatal
}

fn run(args: Args) -> Result<(), CliError> {
    let user_transform = args
        .translate
        .as_deref()
        .map(parse_translate)
        .transpose()?
        .unwrap_or(Affine::IDENTITY);
    let mode = args.mode.to_lib();

    let commands = if let Some(scene_path) = &args.scene {
        let scene = Scene::from_str(&fs::read_to_string(scene_path)?)?;
        if report_issues(&SceneValidator::validate(&scene, None)) {
            return Err(CliError::ValidationFailed);
        }

        let mut animations = LoadedAnimations::new();
        for mapping in &args.anims {
            let (anim_ref, path) = mapping
                .split_once('=')
                .ok_or_else(|| CliError::BadAnimMapping(mapping.clone()))?;
            let doc = trame::lottie::Document::from_str(&fs::read_to_string(path)?)?;
            animations.insert(anim_ref, doc);
        }

        let package = CompiledPackage::new(scene, AssetIndex::new());
        let mut player = ScenePlayer::new();
        player.compile(&package, &animations)?;
        if args.media_present {
            let block_ids: Vec<String> = player
                .compiled()
                .map(|c| c.blocks.iter().map(|b| b.block_id.clone()).collect())
                .unwrap_or_default();
            for block_id in block_ids {
                player.set_user_media_present(block_id, true);
            }
        }
        let commands = player.render_commands(mode, args.frame);
        for issue in &player.last_render_issues {
            eprintln!("render {}: {}", issue.code.as_str(), issue.message);
        }
        commands
    } else if let Some(lottie_path) = &args.lottie {
        let doc = trame::lottie::Document::from_str(&fs::read_to_string(lottie_path)?)?;
        if report_issues(&AnimValidator::validate(&doc, &args.binding)) {
            return Err(CliError::ValidationFailed);
        }
        let mut registry = PathRegistry::new();
        let ir = compile_anim(&doc, "anim", &args.binding, &AssetIndex::new(), &mut registry)?;
        let (commands, issues) = ir.render_commands_with_issues(
            args.frame,
            user_transform,
            args.media_present,
            mode,
        );
        for issue in &issues {
            eprintln!("render {}: {}", issue.code.as_str(), issue.message);
        }
        commands
    } else {
        return Err(CliError::NoInput);
    };

    if !is_balanced(&commands) {
        return Err(CliError::Unbalanced);
    }

    #[cfg(debug_assertions)]
    {
        let mut metrics = trame::metrics::PerfMetrics::new();
        metrics.count_commands(&commands);
        eprintln!("{}", metrics.report());
    }

    let json = serde_json::to_string_pretty(&commands).expect("commands serialize");
    match &args.out {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
