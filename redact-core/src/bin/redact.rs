use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use redact_core::{
    RedactionMode, Redactor, RedactorConfig,
    ocr::{self, OcrEngine, StaticWords},
    report::write_json,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Fill,
    Blur,
}

impl From<Mode> for RedactionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fill => RedactionMode::Fill,
            Mode::Blur => RedactionMode::Blur,
        }
    }
}

#[derive(Parser)]
#[command(name = "redact")]
#[command(about = "Redact license plates and text PII from images")]
struct Args {
    #[arg(help = "Input image, or a directory of images for batch mode")]
    input: PathBuf,

    #[arg(short, long, help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Tesseract TSV with the OCR words of a single input image")]
    words: Option<PathBuf>,

    #[arg(short, long, help = "Directory for redacted images")]
    output_dir: Option<PathBuf>,

    #[arg(short, long, help = "Directory for JSON reports")]
    report_dir: Option<PathBuf>,

    #[arg(short, long, value_enum, help = "Redaction style")]
    mode: Option<Mode>,

    #[arg(short, long, help = "Pixels added around every box")]
    pad: Option<i32>,

    #[arg(long, help = "Log as JSON lines")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_config(args: &Args) -> anyhow::Result<RedactorConfig> {
    let mut config = RedactorConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.redaction.mode = mode.into();
    }
    if let Some(pad) = args.pad {
        config.redaction.pad = pad;
    }
    if let Some(dir) = &args.output_dir {
        config.io.results_img_dir = dir.clone();
    }
    if let Some(dir) = &args.report_dir {
        config.io.results_rpt_dir = dir.clone();
    }
    Ok(config)
}

fn redact_single(
    redactor: &Redactor,
    config: &RedactorConfig,
    input: &Path,
    words: Option<&Path>,
) -> anyhow::Result<()> {
    let ocr: Box<dyn OcrEngine> = match words {
        Some(tsv) => {
            let content = std::fs::read_to_string(tsv)
                .with_context(|| format!("reading OCR words from {}", tsv.display()))?;
            Box::new(StaticWords::from_tsv(&content, config.ocr.min_confidence)?)
        }
        None => ocr::engine_for_image(input, &config.ocr)?,
    };

    let raw = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let (jpeg, mut report) = redactor.process_image_bytes(&raw, ocr.as_ref())?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    std::fs::create_dir_all(&config.io.results_img_dir)?;
    std::fs::create_dir_all(&config.io.results_rpt_dir)?;

    let image_path = config.io.results_img_dir.join(format!("redacted_{}.jpg", stem));
    std::fs::write(&image_path, jpeg).with_context(|| format!("writing {}", image_path.display()))?;

    report.source_image = Some(input.display().to_string());
    report.redactions.redacted_image_path = Some(image_path.display().to_string());
    let report_path = config.io.results_rpt_dir.join(format!("report_{}.json", stem));
    write_json(&report, &report_path)?;

    info!(
        boxes = report.redactions.boxes_xyxy.len(),
        applied = report.redactions.applied,
        image = %image_path.display(),
        report = %report_path.display(),
        "Done"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = resolve_config(&args)?;
    let redactor = Redactor::from_config(&config)?;

    if args.input.is_dir() {
        config.io.input_dir = args.input.clone();
        let ocr_config = config.ocr.clone();
        let reports =
            redactor.run_batch(&config.io, |path| ocr::engine_for_image(path, &ocr_config))?;
        info!(
            reports = reports.len(),
            dir = %config.io.results_rpt_dir.display(),
            "Batch finished"
        );
    } else {
        redact_single(&redactor, &config, &args.input, args.words.as_deref())?;
    }

    Ok(())
}
