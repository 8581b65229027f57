mod cli;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cli::Cli;
use config::Config;
use entity_enhancer::{enhance_path, enhance_source, EnhanceReport, EnhancingStep, SettersEnhancingStep};

fn main() -> anyhow::Result<()> {
    // 默认只显示警告和错误，设置 RUST_LOG=info 查看每个文件的增强结果
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    let step = SettersEnhancingStep::new(config.enhancer);

    let jobs = plan_jobs(&cli)?;
    if jobs.is_empty() {
        tracing::warn!("No .rs files found under {}", cli.input.display());
    }

    let mut total = EnhanceReport::default();
    for (input, output) in &jobs {
        let report = match output {
            Some(output) if !cli.check => enhance_path(input, output, &step)?,
            _ => check_file(input, &step)?,
        };
        if cli.verbose {
            print_report(input, &report);
        }
        total.enhanced.extend(report.enhanced);
        total.skipped.extend(report.skipped);
    }

    println!(
        "{} files: {} classes enhanced, {} already enhanced, {} setters rewritten",
        jobs.len(),
        total.enhanced.len(),
        total.skipped.len(),
        total.total_setters()
    );
    Ok(())
}

/// 输入文件与对应的输出位置；`--check` 时没有输出
fn plan_jobs(cli: &Cli) -> anyhow::Result<Vec<(PathBuf, Option<PathBuf>)>> {
    if cli.output.is_none() && !cli.check {
        bail!("OUTPUT is required unless --check is given");
    }

    if !cli.input.is_dir() {
        return Ok(vec![(cli.input.clone(), cli.output.clone())]);
    }

    let escaped = glob::Pattern::escape(&cli.input.display().to_string());
    let pattern = format!("{}/**/*.rs", escaped);
    let mut jobs = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("Invalid input directory {}", cli.input.display()))? {
        let path = entry?;
        let output = match &cli.output {
            Some(root) => Some(root.join(path.strip_prefix(&cli.input)?)),
            None => None,
        };
        jobs.push((path, output));
    }
    Ok(jobs)
}

fn check_file(input: &Path, step: &dyn EnhancingStep) -> anyhow::Result<EnhanceReport> {
    let source =
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let (_, report) = enhance_source(&source, &input.display().to_string(), step)?;
    Ok(report)
}

fn print_report(input: &Path, report: &EnhanceReport) {
    for (class, setters) in &report.enhanced {
        println!("{}: {} [{}]", input.display(), class, setters.join(", "));
    }
    for class in &report.skipped {
        println!("{}: {} (already enhanced)", input.display(), class);
    }
}
