//! Greyhound CLI - Betfair BSP and race-card tip consolidation

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use greyhound::config::PipelineConfig;
use greyhound::data::{load_race_cards, save_race_cards, TableExport};
use greyhound::pipeline::{today, Session};
use greyhound::{ConsolidatedTable, PriceTable, RunnerCardTable};

/// Rows shown by `--show`
const PREVIEW_ROWS: usize = 20;

#[derive(Parser)]
#[command(name = "greyhound")]
#[command(author, version, about = "Greyhound BSP and race-card consolidation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Log pipeline progress
    #[arg(short, long)]
    verbose: bool,

    /// Market-hint prefix of the races to keep
    #[arg(long)]
    country: Option<String>,

    /// BSP feed base URL (date and .csv are appended)
    #[arg(long)]
    feed_url: Option<String>,

    /// Race-card listing page
    #[arg(long)]
    cards_url: Option<String>,

    /// Delay between race-card requests in milliseconds
    #[arg(long)]
    delay: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and normalise the BSP feed for a date
    Prices {
        /// Feed date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Print a preview of the table
        #[arg(long)]
        show: bool,

        /// Write the price table as CSV (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the raw feed as CSV (file or directory)
        #[arg(long)]
        raw_output: Option<PathBuf>,
    },

    /// Scrape and normalise race cards
    Cards {
        /// Print a preview of the table
        #[arg(long)]
        show: bool,

        /// Write the race-card table as CSV (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the raw scraped pages as JSON
        #[arg(long)]
        save_raw: Option<PathBuf>,

        /// Use pages saved with --save-raw instead of scraping
        #[arg(long)]
        from_raw: Option<PathBuf>,
    },

    /// Join prices with race-card tips
    Consolidate {
        /// Feed date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Print a preview of the table
        #[arg(long)]
        show: bool,

        /// Write the consolidated table as CSV (file or directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use race-card pages saved with `cards --save-raw`
        #[arg(long)]
        from_raw: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    println!("{}", "Greyhound CLI v0.3.0".cyan().bold());
    println!();

    let mut config = PipelineConfig::from_env();
    if let Some(country) = cli.country.clone() {
        config.country_code = country;
    }
    if let Some(url) = cli.feed_url.clone() {
        config.feed_base_url = url;
    }
    if let Some(url) = cli.cards_url.clone() {
        config.card_listing_url = url;
    }
    if let Some(delay) = cli.delay {
        config.scraper.delay_ms = delay;
    }

    // Create runtime for async operations
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let mut session = Session::new(config).context("Failed to create session")?;

    if cli.interactive {
        run_interactive(&rt, &mut session)?;
    } else if let Some(command) = cli.command {
        match command {
            Commands::Prices {
                date,
                show,
                output,
                raw_output,
            } => {
                let date = parse_date(date.as_deref())?;
                run_prices(&rt, &mut session, date, show, output.as_deref(), raw_output.as_deref())?;
            }
            Commands::Cards {
                show,
                output,
                save_raw,
                from_raw,
            } => {
                run_cards(
                    &rt,
                    &mut session,
                    show,
                    output.as_deref(),
                    save_raw.as_deref(),
                    from_raw.as_deref(),
                )?;
            }
            Commands::Consolidate {
                date,
                show,
                output,
                from_raw,
            } => {
                let date = parse_date(date.as_deref())?;
                if let Some(path) = from_raw.as_deref() {
                    use_saved_cards(&mut session, path)?;
                }
                run_consolidate(&rt, &mut session, date, show, output.as_deref())?;
            }
        }
    } else {
        println!("Use --help for usage information or --interactive for interactive mode.");
    }

    Ok(())
}

/// Parse YYYY-MM-DD, defaulting to today
fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .with_context(|| format!("Date must be in YYYY-MM-DD format, got {}", text)),
        None => Ok(today()),
    }
}

/// Spinner in the style used by every stage
fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message(msg.to_string());
    Ok(pb)
}

/// Output path: a directory gets the table's default file name
fn resolve_output(path: &Path, file_name: &str) -> PathBuf {
    if path.is_dir() {
        path.join(file_name)
    } else {
        path.to_path_buf()
    }
}

fn export_table<T: TableExport + ?Sized>(table: &T, path: &Path) -> Result<()> {
    let path = resolve_output(path, table.file_name());
    table
        .export(&path)
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("{}: {:?}", "Saved".green(), path);
    Ok(())
}

fn use_saved_cards(session: &mut Session, path: &Path) -> Result<()> {
    let fields = load_race_cards(path)
        .with_context(|| format!("Failed to load race cards from {:?}", path))?;
    println!(
        "{}: {} race-card pages from {:?}",
        "Loaded".green(),
        fields.len(),
        path
    );
    session.use_race_cards(fields);
    Ok(())
}

fn run_prices(
    rt: &Runtime,
    session: &mut Session,
    date: NaiveDate,
    show: bool,
    output: Option<&Path>,
    raw_output: Option<&Path>,
) -> Result<()> {
    println!("{}: {}", "Betfair prices".green(), date);

    let pb = spinner(&format!("Fetching BSP feed for {}...", date))?;
    let result = rt.block_on(async {
        let feed = session.load_feed(date, today()).await?;
        let table = session.price_table(date, today()).await?;
        Ok::<_, greyhound::StageError>((feed, table))
    });
    pb.finish_and_clear();

    let (feed, table) = result.with_context(|| format!("No price table for {}", date))?;
    println!(
        "{} feed rows, {} {} races, {} traps",
        feed.len(),
        table.len(),
        table.country,
        table.traps.len()
    );

    if show {
        print_price_table(&table);
    }
    if let Some(path) = raw_output {
        export_table(feed.as_ref(), path)?;
    }
    if let Some(path) = output {
        export_table(table.as_ref(), path)?;
    }

    Ok(())
}

fn run_cards(
    rt: &Runtime,
    session: &mut Session,
    show: bool,
    output: Option<&Path>,
    save_raw: Option<&Path>,
    from_raw: Option<&Path>,
) -> Result<()> {
    if let Some(path) = from_raw {
        use_saved_cards(session, path)?;
    }

    let year = today().year();
    let listing = session.config().card_listing_url.clone();

    let pb = spinner(&format!("Scraping race cards from {}...", listing))?;
    let result = rt.block_on(async {
        let fields = session.scrape_cards(year).await?;
        let table = session.runner_cards(year).await?;
        Ok::<_, greyhound::StageError>((fields, table))
    });
    pb.finish_and_clear();

    let (fields, table) = result.context("No race-card table")?;
    println!(
        "{} pages, {} race-card rows",
        fields.len(),
        table.len()
    );

    if let Some(path) = save_raw {
        save_race_cards(path, &fields)
            .with_context(|| format!("Failed to save race cards to {:?}", path))?;
        println!("{}: {:?}", "Saved".green(), path);
    }
    if show {
        print_runner_cards(&table);
    }
    if let Some(path) = output {
        export_table(table.as_ref(), path)?;
    }

    Ok(())
}

fn run_consolidate(
    rt: &Runtime,
    session: &mut Session,
    date: NaiveDate,
    show: bool,
    output: Option<&Path>,
) -> Result<()> {
    println!("{}: {}", "Consolidating".green(), date);

    let today = today();
    let pb = spinner("Joining prices with race-card tips...")?;
    let result = rt.block_on(async {
        session.require_inputs(date, today).await?;
        session.consolidated(date, today).await
    });
    pb.finish_and_clear();

    let table = result.with_context(|| format!("No consolidated table for {}", date))?;
    let matched = table.rows.iter().filter(|r| r.card.is_some()).count();
    println!("{} races, {} with race-card tips", table.len(), matched);

    if show {
        print_consolidated(&table);
    }
    if let Some(path) = output {
        export_table(table.as_ref(), path)?;
    }

    Ok(())
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn print_price_table(table: &PriceTable) {
    println!();
    println!("{}", "Price table:".yellow().bold());

    let trap_header: String = table.traps.iter().map(|t| format!("{:>7}", t)).collect();
    println!(
        "{:>10} {:<14} {:>4} {:>6} {:>7} {:>4} {:>7}{}",
        "Event", "Track", "#", "Dist", "Grade", "Win", "BSP", trap_header
    );
    println!("{}", "-".repeat(64 + 7 * table.traps.len()));

    for race in table.races.iter().take(PREVIEW_ROWS) {
        let prices: String = table
            .traps
            .iter()
            .map(|&t| format!("{:>7.2}", race.trap_price(t)))
            .collect();
        println!(
            "{:>10} {:<14} {:>4} {:>6} {:>7} {:>4} {:>7}{}",
            race.event_id,
            truncate_name(opt(&race.track), 14),
            opt(&race.race_number),
            opt(&race.distance),
            opt(&race.grade),
            race.win_trap.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
            race.win_bsp
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "-".to_string()),
            prices
        );
    }
    print_remaining(table.len());
}

fn print_runner_cards(table: &RunnerCardTable) {
    println!();
    println!("{}", "Race cards:".yellow().bold());
    println!(
        "{:>4} {:>6} {:<12} {:>5} {:>5} {:>5} {:>5}",
        "#", "Dist", "Grade", "TGR1", "TGR2", "TGR3", "TGR4"
    );
    println!("{}", "-".repeat(48));

    for row in table.rows.iter().take(PREVIEW_ROWS) {
        let tips: Vec<String> = row
            .tips
            .iter()
            .map(|t| t.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()))
            .collect();
        println!(
            "{:>4} {:>6} {:<12} {:>5} {:>5} {:>5} {:>5}",
            row.race_number,
            row.distance,
            truncate_name(&row.grade, 12),
            tips[0],
            tips[1],
            tips[2],
            tips[3]
        );
    }
    print_remaining(table.len());
}

fn print_consolidated(table: &ConsolidatedTable) {
    println!();
    println!("{}", "Consolidated:".yellow().bold());
    println!(
        "{:<14} {:>4} {:>4} {:>7} {:>8} {:>8} {:>8} {:>8}  {:<12}",
        "Track", "#", "Win", "BSP", "TGR1", "TGR2", "TGR3", "TGR4", "TGR1 band"
    );
    println!("{}", "-".repeat(90));

    for row in table.rows.iter().take(PREVIEW_ROWS) {
        let race = &row.summary;
        let tip_prices: Vec<String> = row
            .tip_prices
            .iter()
            .map(|p| format!("{:.2}", p.unwrap_or(0.0)))
            .collect();
        let line = format!(
            "{:<14} {:>4} {:>4} {:>7.2} {:>8} {:>8} {:>8} {:>8}  {:<12}",
            truncate_name(opt(&race.track), 14),
            opt(&race.race_number),
            race.win_trap.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
            race.win_bsp.unwrap_or(0.0),
            tip_prices[0],
            tip_prices[1],
            tip_prices[2],
            tip_prices[3],
            row.tip_bands[0].label()
        );

        // Highlight races where the top tip won
        let tip_won = row
            .card
            .as_ref()
            .and_then(|c| c.tips[0])
            .is_some_and(|t| race.win_trap == Some(t));
        if tip_won {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }
    print_remaining(table.len());
}

fn print_remaining(total: usize) {
    if total > PREVIEW_ROWS {
        println!("... and {} more", total - PREVIEW_ROWS);
    }
    println!();
}

fn run_interactive(rt: &Runtime, session: &mut Session) -> Result<()> {
    println!("{}", "Interactive mode".green().bold());
    println!("Choose Quit to exit.\n");

    let theme = ColorfulTheme::default();
    let mut date = today();
    let mut show = true;

    loop {
        let options = vec![
            format!("Select date ({})", date),
            "Scrape Betfair prices".to_string(),
            "Scrape race cards".to_string(),
            "Consolidate".to_string(),
            format!("Previews: {}", if show { "on" } else { "off" }),
            "Download a table".to_string(),
            "Clear cached data".to_string(),
            "Quit".to_string(),
        ];

        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&options)
            .default(0)
            .interact()?;

        let result = match selection {
            0 => {
                let text: String = Input::with_theme(&theme)
                    .with_prompt("Date (YYYY-MM-DD)")
                    .default(date.format("%Y-%m-%d").to_string())
                    .interact_text()?;
                parse_date(Some(&text)).map(|d| date = d)
            }
            1 => run_prices(rt, session, date, show, None, None),
            2 => run_cards(rt, session, show, None, None, None),
            3 => run_consolidate(rt, session, date, show, None),
            4 => {
                show = !show;
                Ok(())
            }
            5 => download(rt, session, &theme, date),
            6 => {
                session.invalidate();
                println!("{}", "Cache cleared".green());
                Ok(())
            }
            7 => {
                println!("Goodbye!");
                break;
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            println!("{}: {:#}", "Failed".red(), e);
        }
        println!();
    }

    Ok(())
}

/// Export one of the session's tables into the working directory
fn download(rt: &Runtime, session: &mut Session, theme: &ColorfulTheme, date: NaiveDate) -> Result<()> {
    let tables = [
        "Betfair.csv (raw feed)",
        "Betfair_processed.csv",
        "Greyhound.csv",
        "Consolidated_output.csv",
    ];
    let choice = Select::with_theme(theme)
        .with_prompt("Which table?")
        .items(&tables)
        .default(3)
        .interact()?;

    let dir = Path::new(".");
    let year = today().year();

    match choice {
        0 => {
            let feed = rt.block_on(session.load_feed(date, today()))?;
            export_table(feed.as_ref(), dir)
        }
        1 => {
            let table = rt.block_on(session.price_table(date, today()))?;
            export_table(table.as_ref(), dir)
        }
        2 => {
            let table = rt.block_on(session.runner_cards(year))?;
            export_table(table.as_ref(), dir)
        }
        _ => {
            let table = rt.block_on(async {
                session.require_inputs(date, today()).await?;
                session.consolidated(date, today()).await
            })?;
            export_table(table.as_ref(), dir)
        }
    }
}

/// Truncate name to fit display width
fn truncate_name(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len {
        name.to_string()
    } else {
        chars[..max_len - 1].iter().collect::<String>() + "…"
    }
}
