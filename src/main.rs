use anyhow::{Context, Result};
use clap::Parser;
use jarscope::cli::{Cli, Commands, OutputFormat};
use jarscope::config::{Settings, clear_db};
use jarscope::fingerprint::FingerprintMode;
use jarscope::progress::{BarProgress, NoProgress, ProgressSink};
use jarscope::scan::validate_root;
use jarscope::search::{Input, SearchSession, SearchState, View};
use jarscope::store::{ClassHit, IndexStore};
use jarscope::{IndexOptions, Indexer};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<()> {
    let cli = parse_cli();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let settings = Settings::resolve(&cli)?;

    match cli.command.clone() {
        Commands::Clear => {
            clear_db(&settings.db_path)?;
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            println!("{}", serde_json::to_string_pretty(&store.stats()?)?);
        }
        Commands::Index {
            directory,
            no_recursive,
            hash,
            prune,
            quiet,
        } => {
            validate_root(&directory)?;
            let store = open_store(&settings)?;
            let options = IndexOptions {
                recursive: !no_recursive,
                fingerprint: if hash {
                    FingerprintMode::ContentHash
                } else {
                    FingerprintMode::Metadata
                },
                prune_missing: prune,
            };
            let mut progress: Box<dyn ProgressSink> = if quiet {
                Box::new(NoProgress)
            } else {
                Box::new(BarProgress::new())
            };
            let cancel = install_interrupt_handler()?;
            let summary = Indexer::new(&store)
                .with_options(options)
                .with_cancel(cancel)
                .run(&directory, progress.as_mut())
                .with_context(|| format!("Failed to index {}", directory.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.cancelled {
                std::process::exit(130);
            }
            if summary.aborted {
                anyhow::bail!("indexing aborted: the index store failed repeatedly");
            }
        }
        Commands::Query {
            text,
            prefix,
            limit,
            format,
        } => {
            let store = open_store(&settings)?;
            let mut hits = if prefix {
                store.query_prefix(&text)?
            } else {
                store.query_substring(&text)?
            };
            let total = hits.len();
            if let Some(limit) = limit {
                hits.truncate(limit);
            }
            let result = QueryResult {
                query: text,
                mode: if prefix { "prefix" } else { "substring" },
                total,
                hits,
            };
            write_query_output(&result, format)?;
        }
        Commands::Archives { class_name, format } => {
            let store = open_store(&settings)?;
            let archives: Vec<String> = store.all_archives_for_class(&class_name)?.into_iter().collect();
            match format {
                OutputFormat::Json => {
                    let result = ArchivesResult {
                        class_name,
                        archives,
                    };
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                OutputFormat::Text => {
                    for a in archives {
                        println!("{a}");
                    }
                }
            }
        }
        Commands::Search { limit } => {
            let store = open_store(&settings)?;
            run_search(&store, limit)?;
        }
    }

    Ok(())
}

/// First Ctrl-C asks the run to stop after the archive in progress so the
/// summary still gets printed; a second one exits immediately.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("interrupted, finishing the current archive...");
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn parse_cli() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    Cli::parse_from(rewrite_args_for_implicit_query(args))
}

/// `jarscope StringUtils` is shorthand for `jarscope query StringUtils`.
fn rewrite_args_for_implicit_query(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = [
        "index", "query", "archives", "search", "stats", "clear", "help",
    ];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if a == "--db" || a == "--log-level" {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "query".to_string());
        }
    }

    args
}

fn open_store(settings: &Settings) -> Result<IndexStore> {
    IndexStore::open(settings.db_path.clone())
        .with_context(|| format!("Failed to open index at {}", settings.db_path.display()))
}

#[derive(Debug, Serialize)]
struct QueryResult {
    query: String,
    mode: &'static str,
    total: usize,
    hits: Vec<ClassHit>,
}

#[derive(Debug, Serialize)]
struct ArchivesResult {
    class_name: String,
    archives: Vec<String>,
}

fn write_query_output(result: &QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut out = std::io::stdout().lock();
            for hit in &result.hits {
                writeln!(out, "{}\t{}", hit.class_name, hit.logical_path)?;
            }
            if result.hits.len() < result.total {
                writeln!(out, "... {} more", result.total - result.hits.len())?;
            }
        }
    }
    Ok(())
}

fn run_search(store: &IndexStore, limit: usize) -> Result<()> {
    let mut session = SearchSession::new(store).with_limit(limit);
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut out = std::io::stdout();

    writeln!(
        out,
        "Type part of a class name. Enter a number to inspect a match, an empty line to go back, :q to quit."
    )?;

    loop {
        match session.state() {
            SearchState::Searching { prefill } if prefill.is_empty() => write!(out, "> ")?,
            SearchState::Searching { prefill } => write!(out, "[{prefill}] > ")?,
            SearchState::Viewing { class_name, .. } => write!(out, "{class_name} > ")?,
            SearchState::Done => break,
        }
        out.flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let input = Input::parse(&line?, session.state());
        let view = session.handle(input)?;
        if view == View::Exit {
            break;
        }
        render_view(&mut out, &view)?;
    }
    Ok(())
}

fn render_view(out: &mut impl Write, view: &View) -> Result<()> {
    match view {
        View::Prompt | View::Exit => {}
        View::Message(msg) => writeln!(out, "{msg}")?,
        View::Matches {
            query,
            classes,
            truncated,
        } => {
            if classes.is_empty() {
                writeln!(out, "No classes matching '{query}'")?;
            }
            for (i, class) in classes.iter().enumerate() {
                writeln!(out, "{:>4}  {class}", i + 1)?;
            }
            if *truncated {
                writeln!(out, "      ... more matches, refine the query")?;
            }
        }
        View::Detail {
            class_name,
            records,
        } => {
            writeln!(out, "{class_name}")?;
            if records.is_empty() {
                writeln!(out, "  not found in any indexed archive")?;
            }
            for r in records {
                writeln!(out, "  - {}", display_path(&r.archive_logical_path))?;
            }
        }
    }
    Ok(())
}

/// Logical paths start with the physical path, so the home prefix is shortened
/// to `~` the same way for both.
fn display_path(path: &str) -> String {
    match dirs::home_dir() {
        Some(home) => match Path::new(path).strip_prefix(&home) {
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    }
}
