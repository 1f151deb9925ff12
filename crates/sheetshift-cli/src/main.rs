//! sheetshift CLI - spreadsheet formula translation tool

mod llm_command;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use llm_command::CommandTranslator;
use sheetshift::prelude::*;
use sheetshift::{load_rules, TranslationCache};
use sheetshift_formula::{strip_formula_prefix, tokenize_with, LexOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetshift")]
#[command(
    author,
    version,
    about = "Translate spreadsheet formulas between engines and locales"
)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a single formula and print the result
    Translate {
        /// Formula text, with or without the leading '='
        formula: String,

        /// Source locale
        #[arg(long, default_value = "en-US")]
        from: String,

        /// Target locale
        #[arg(long)]
        to: String,

        /// Rule file to use instead of the built-in tables
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Sheet the formula lives on
        #[arg(long, default_value = "Sheet1")]
        sheet: String,

        /// Cell the formula lives in
        #[arg(long, default_value = "A1")]
        cell: String,

        /// Sheet renamed by the conversion, as OLD=NEW (repeatable)
        #[arg(long = "rename-sheet", value_parser = parse_rename)]
        rename_sheets: Vec<(String, String)>,
    },

    /// Translate a JSON list of formula jobs
    Batch {
        /// Input file with a JSON array of jobs
        jobs: PathBuf,

        /// Output file for the translated cells (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cache file, read before and written after the batch
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Rule file to use instead of the built-in tables
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Worker threads (default: SHEETSHIFT_CONCURRENCY or available cores)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Shell command used as LLM fallback (request JSON on stdin, formula on stdout)
        #[arg(long)]
        llm_command: Option<String>,

        /// LLM timeout in seconds
        #[arg(long)]
        llm_timeout: Option<u64>,
    },

    /// List the functions a formula uses and whether the target locale maps them
    Functions {
        formula: String,

        /// Source locale
        #[arg(long, default_value = "en-US")]
        from: String,

        /// Target locale
        #[arg(long)]
        to: String,

        /// Rule file to use instead of the built-in tables
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Load a rule file and report what it declares
    CheckRules {
        /// Rule file (JSON)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Translate {
            formula,
            from,
            to,
            rules,
            sheet,
            cell,
            rename_sheets,
        } => translate(
            &formula,
            &from,
            &to,
            rules.as_deref(),
            &sheet,
            &cell,
            rename_sheets.into_iter().collect(),
        ),
        Commands::Batch {
            jobs,
            output,
            cache,
            rules,
            concurrency,
            llm_command,
            llm_timeout,
        } => batch(
            &jobs,
            output.as_deref(),
            cache.as_deref(),
            rules.as_deref(),
            concurrency,
            llm_command,
            llm_timeout,
        ),
        Commands::Functions {
            formula,
            from,
            to,
            rules,
        } => list_functions(&formula, &from, &to, rules.as_deref()),
        Commands::CheckRules { file } => check_rules(&file),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_rename(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => Ok((from.into(), to.into())),
        _ => Err(format!("expected OLD=NEW, got '{value}'")),
    }
}

fn rule_set(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => load_rules(path)
            .with_context(|| format!("Failed to load rules from '{}'", path.display())),
        None => RuleSet::builtin().context("Built-in rule data is invalid"),
    }
}

fn translate(
    formula: &str,
    from: &str,
    to: &str,
    rules: Option<&Path>,
    sheet: &str,
    cell: &str,
    renames: SheetRenames,
) -> Result<()> {
    let options = TranslationOptions::from_env().context("Invalid SHEETSHIFT_* environment")?;
    let engine = TranslationEngine::builder()
        .rules(rule_set(rules)?)
        .options(options)
        .build()
        .context("Failed to start the translation engine")?;
    let cell = CellAddress::parse(cell).with_context(|| format!("Invalid cell '{cell}'"))?;

    let job = FormulaJob::new(sheet, cell, formula, LocaleIds::new(from, to)).with_sheet_renames(renames);
    let result = engine.translate(job);
    println!("={}", result.target_formula_text);
    eprintln!("status: {}", result.status);
    for note in &result.notes {
        eprintln!("note: {note}");
    }

    if result.status == TranslationStatus::Unsupported {
        std::process::exit(2);
    }
    Ok(())
}

fn batch(
    jobs_path: &Path,
    output: Option<&Path>,
    cache_path: Option<&Path>,
    rules: Option<&Path>,
    concurrency: Option<usize>,
    llm_command: Option<String>,
    llm_timeout: Option<u64>,
) -> Result<()> {
    let data = std::fs::read(jobs_path)
        .with_context(|| format!("Failed to read '{}'", jobs_path.display()))?;
    let jobs: Vec<FormulaJob> = serde_json::from_slice(&data)
        .with_context(|| format!("'{}' is not a JSON list of jobs", jobs_path.display()))?;

    let mut options = TranslationOptions::from_env().context("Invalid SHEETSHIFT_* environment")?;
    if let Some(concurrency) = concurrency {
        options = options.with_concurrency(concurrency);
    }
    if let Some(secs) = llm_timeout {
        options = options.with_llm_timeout(Duration::from_secs(secs));
    }

    let cache = Arc::new(TranslationCache::new());
    if let Some(path) = cache_path.filter(|p| p.exists()) {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read cache '{}'", path.display()))?;
        let added = cache
            .import(&bytes)
            .with_context(|| format!("Failed to import cache '{}'", path.display()))?;
        tracing::info!(added, path = %path.display(), "cache loaded");
    }

    let mut builder = TranslationEngine::builder()
        .rules(rule_set(rules)?)
        .cache(Arc::clone(&cache))
        .options(options);
    if let Some(command) = llm_command {
        builder = builder.llm(Arc::new(CommandTranslator::new(command)));
    }
    let engine = builder
        .build()
        .context("Failed to start the translation engine")?;

    let report = engine.translate_batch(jobs);

    let json = serde_json::to_vec_pretty(&report.cells).context("Failed to encode results")?;
    match output {
        Some(path) => std::fs::write(path, &json)
            .with_context(|| format!("Failed to write '{}'", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&json)?;
            writeln!(stdout)?;
        }
    }

    if let Some(path) = cache_path {
        let bytes = engine.export_cache().context("Failed to encode cache")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write cache '{}'", path.display()))?;
    }

    eprintln!("{}", report.summary);
    Ok(())
}

fn list_functions(formula: &str, from: &str, to: &str, rules: Option<&Path>) -> Result<()> {
    let rules = rule_set(rules)?;
    let Some(source) = rules.locale(from) else {
        bail!("Unknown locale '{from}'");
    };
    let Some(target) = rules.locale(to) else {
        bail!("Unknown locale '{to}'");
    };

    let tokens = tokenize_with(strip_formula_prefix(formula), &LexOptions::from(source))
        .with_context(|| format!("Cannot tokenize '{formula}'"))?;

    let mut stdout = io::stdout().lock();
    let mut unsupported = 0;
    for name in tokens.function_names() {
        match rules.functions().lookup(&name, &target.id) {
            Some(mapped) => writeln!(stdout, "{name}\t{mapped}")?,
            None => {
                unsupported += 1;
                writeln!(stdout, "{name}\t(no {} mapping)", target.id)?;
            }
        }
    }
    if unsupported > 0 {
        eprintln!("{unsupported} function(s) have no {} mapping", target.id);
    }
    Ok(())
}

fn check_rules(path: &Path) -> Result<()> {
    let rules = load_rules(path)
        .with_context(|| format!("Failed to load rules from '{}'", path.display()))?;

    println!("{}: ok", path.display());
    for locale in rules.locales() {
        println!(
            "  {:<8} {:>4} functions  (args '{}', decimal '{}')",
            locale.id,
            rules.functions().len_for(&locale.id),
            locale.arg_separator,
            locale.decimal_separator
        );
    }
    let incompatibilities = rules.incompatibilities();
    println!(
        "  {} incompatibility rule(s), at most {} passes",
        incompatibilities.len(),
        incompatibilities.max_passes()
    );
    for rule in incompatibilities.rules() {
        println!("    {}: {}", rule.name, rule.matcher.function);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_rename() {
        assert_eq!(parse_rename("Data=Daten 2024"), Ok(("Data".into(), "Daten 2024".into())));
        assert!(parse_rename("Data").is_err());
        assert!(parse_rename("=Daten").is_err());
    }

    #[test]
    fn test_rename_sheet_flags() {
        let cli = Cli::try_parse_from([
            "sheetshift",
            "translate",
            "Data!A1",
            "--to",
            "de-DE",
            "--rename-sheet",
            "Data=Daten",
            "--rename-sheet",
            "Old=New",
        ])
        .unwrap();
        let Commands::Translate { rename_sheets, .. } = cli.command else {
            panic!("expected translate");
        };
        let renames: SheetRenames = rename_sheets.into_iter().collect();
        assert_eq!(renames.get("data"), Some("Daten"));
        assert_eq!(renames.len(), 2);
    }
}
