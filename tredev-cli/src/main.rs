//! Tredev CLI - Develop tree patterns against an annotated treebank

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tredev_core::{Config, LineCommands, ScoreColumn, Scope, Session, SnapshotPaths, TredevError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tredev")]
#[command(about = "Tree pattern development against annotated parse trees", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "tredev.toml", env = "TREDEV_CONFIG")]
    config: PathBuf,

    /// Path prefix of the session files (default from config)
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Directory with parse tree files (default from config)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config (if missing), parse the corpus and save a new session
    Init {
        /// Annotation labels, comma separated (default from config)
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// Add a named pattern for a label and score it
    Add {
        name: String,
        /// Tree pattern in matcher syntax
        pattern: String,
        label: String,
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Remove a pattern and its scores
    Remove { name: String },

    /// Recompute scores after annotations changed
    Rescore {
        #[arg(long, conflicts_with = "label")]
        name: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },

    /// Show patterns with their scores
    Report {
        #[arg(long, conflicts_with = "label")]
        name: Option<String>,
        #[arg(long)]
        label: Option<String>,
        /// Score column to sort by, descending (default from config)
        #[arg(long)]
        sort: Option<String>,
    },

    /// Interactively annotate the matches of a pattern
    Annotate {
        pattern: String,
        label: String,
        /// Only visit matches whose annotation is still unknown
        #[arg(long)]
        unknown_only: bool,
    },

    /// Interactively annotate the matches of a stored pattern
    Reannotate {
        name: String,
        #[arg(long)]
        unknown_only: bool,
    },

    /// Print a node in bracketed form
    Show {
        /// Node id (tree * 1000 + node)
        node: u64,
        /// Print the whole tree instead of the node's subtree
        #[arg(long)]
        full: bool,
        /// Spaces per level (0 prints a single line)
        #[arg(long, default_value_t = 2)]
        indent: usize,
        /// Draw the tree as a diagram
        #[arg(long, conflicts_with_all = ["full", "indent"])]
        draw: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = run(&cli);

    if let Err(e) = result {
        if cli.json {
            let code = if e.is_validation() { "validation" } else { "error" };
            let error_json = serde_json::json!({ "code": code, "message": e.to_string() });
            eprintln!("{error_json:#}");
        } else {
            eprintln!("{}: {}", "Error".red(), e);
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> tredev_core::Result<()> {
    let config = load_config(&cli.config)?;
    let ctx = Context::new(cli, &config);
    match &cli.command {
        Commands::Init { labels } => cmd_init(cli, labels),
        Commands::Add {
            name,
            pattern,
            label,
            comment,
        } => cmd_add(&ctx, &config, name, pattern, label, comment, cli.json),
        Commands::Remove { name } => cmd_remove(&ctx, &config, name, cli.json),
        Commands::Rescore { name, label } => {
            cmd_rescore(&ctx, &config, &scope(name, label), cli.json)
        }
        Commands::Report { name, label, sort } => {
            let sort = sort.as_deref().unwrap_or(&config.report.sort_by);
            cmd_report(&ctx, &config, &scope(name, label), sort, cli.json)
        }
        Commands::Annotate {
            pattern,
            label,
            unknown_only,
        } => cmd_annotate(&ctx, &config, Target::Pattern { pattern, label }, *unknown_only),
        Commands::Reannotate { name, unknown_only } => {
            cmd_annotate(&ctx, &config, Target::Name(name), *unknown_only)
        }
        Commands::Show {
            node,
            full,
            indent,
            draw,
        } => cmd_show(&ctx, &config, *node, *full, *indent, *draw, cli.json),
    }
}

/// Missing config files fall back to the defaults.
fn load_config(path: &Path) -> tredev_core::Result<Config> {
    if path.exists() {
        debug!(path = %path.display(), "loading config");
        Config::load(path)
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

/// Session location resolved from flags and config
struct Context {
    prefix: PathBuf,
    corpus: PathBuf,
}

impl Context {
    fn new(cli: &Cli, config: &Config) -> Self {
        Self {
            prefix: PathBuf::from(cli.prefix.as_deref().unwrap_or(&config.session.prefix)),
            corpus: cli
                .corpus
                .clone()
                .unwrap_or_else(|| config.session.corpus_dir.clone()),
        }
    }

    fn open(&self, config: &Config) -> tredev_core::Result<Session> {
        debug!(
            prefix = %self.prefix.display(),
            corpus = %self.corpus.display(),
            "opening session"
        );
        Session::load(&self.prefix, &self.corpus, config)
    }
}

fn scope(name: &Option<String>, label: &Option<String>) -> Scope {
    match (name, label) {
        (Some(name), _) => Scope::Name(name.clone()),
        (None, Some(label)) => Scope::Label(label.clone()),
        (None, None) => Scope::All,
    }
}

fn cmd_init(cli: &Cli, labels: &[String]) -> tredev_core::Result<()> {
    let config = load_config(&cli.config)?;
    let ctx = Context::new(cli, &config);
    let paths = SnapshotPaths::new(&ctx.prefix);
    if paths.nodes.exists() {
        return Err(TredevError::SessionExists(paths.nodes));
    }
    let labels = if labels.is_empty() {
        &config.session.labels[..]
    } else {
        labels
    };
    if labels.is_empty() {
        return Err(TredevError::NoLabels);
    }

    if !cli.config.exists() {
        Config::write_default(&cli.config)?;
        if !cli.json {
            println!("{} {}", "Created".green(), cli.config.display());
        }
    }

    let mut session = Session::from_corpus(&ctx.corpus, labels, &config)?;
    session.save(&ctx.prefix)?;

    let paths = SnapshotPaths::new(&ctx.prefix);
    if cli.json {
        let summary = serde_json::json!({
            "trees": session.nodes().tree_count(),
            "nodes": session.nodes().len(),
            "labels": session.annotations().labels(),
            "files": [paths.nodes, paths.annots, paths.patterns, paths.scores],
        });
        println!("{summary:#}");
    } else {
        println!(
            "{}: {} trees ({} nodes)",
            "Parsed".green(),
            session.nodes().tree_count(),
            session.nodes().len()
        );
        println!("{}: {}", "Labels".blue(), session.annotations().labels().join(", "));
        for path in [&paths.nodes, &paths.annots, &paths.patterns, &paths.scores] {
            println!("{} {}", "Created".green(), path.display());
        }
    }
    Ok(())
}

fn cmd_add(
    ctx: &Context,
    config: &Config,
    name: &str,
    pattern: &str,
    label: &str,
    comment: &str,
    json: bool,
) -> tredev_core::Result<()> {
    let mut session = ctx.open(config)?;
    let scores = session.add(name, pattern, label, comment)?;
    session.save(&ctx.prefix)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else {
        println!("{} {} ({})", "Added".green(), name, label);
        print!("{scores}");
    }
    Ok(())
}

fn cmd_remove(ctx: &Context, config: &Config, name: &str, json: bool) -> tredev_core::Result<()> {
    let mut session = ctx.open(config)?;
    session.remove(name)?;
    session.save(&ctx.prefix)?;

    if json {
        println!("{}", serde_json::json!({ "removed": name }));
    } else {
        println!("{} {}", "Removed".green(), name);
    }
    Ok(())
}

fn cmd_rescore(ctx: &Context, config: &Config, scope: &Scope, json: bool) -> tredev_core::Result<()> {
    let mut session = ctx.open(config)?;
    let outcome = session.rescore(scope)?;
    session.save(&ctx.prefix)?;

    if json {
        let failed: Vec<_> = outcome
            .failed
            .iter()
            .map(|(name, e)| serde_json::json!({ "name": name, "error": e.to_string() }))
            .collect();
        let summary = serde_json::json!({ "scored": outcome.scored, "failed": failed });
        println!("{summary:#}");
    } else {
        println!("{}: {} patterns", "Rescored".green(), outcome.scored.len());
        for (name, e) in &outcome.failed {
            println!("{} {}: {}", "Failed".yellow(), name, e);
        }
    }
    Ok(())
}

fn cmd_report(
    ctx: &Context,
    config: &Config,
    scope: &Scope,
    sort: &str,
    json: bool,
) -> tredev_core::Result<()> {
    let column: ScoreColumn = sort.parse()?;
    let session = ctx.open(config)?;
    let rows = session.report(scope, column)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("{}", "No patterns".yellow());
    } else {
        print!("{}", tredev_core::render_report(&rows));
    }
    Ok(())
}

enum Target<'a> {
    Pattern { pattern: &'a str, label: &'a str },
    Name(&'a str),
}

fn cmd_annotate(
    ctx: &Context,
    config: &Config,
    target: Target<'_>,
    unknown_only: bool,
) -> tredev_core::Result<()> {
    let mut session = ctx.open(config)?;
    let stdin = io::stdin();
    let mut input = LineCommands::new(stdin.lock());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "{}", tredev_core::annotate::HELP)?;
    let state = match target {
        Target::Pattern { pattern, label } => {
            tredev_core::annotate(&mut session, pattern, label, unknown_only, &mut input, &mut out)?
        }
        Target::Name(name) => {
            tredev_core::reannotate(&mut session, name, unknown_only, &mut input, &mut out)?
        }
    };

    if state.annotated() > 0 {
        session.save(&ctx.prefix)?;
        writeln!(
            out,
            "{}: {} annotations",
            "Saved".green(),
            state.annotated()
        )?;
    }
    Ok(())
}

fn cmd_show(
    ctx: &Context,
    config: &Config,
    node: u64,
    full: bool,
    indent: usize,
    draw: bool,
    json: bool,
) -> tredev_core::Result<()> {
    let session = ctx.open(config)?;
    let nodes = session.nodes();
    let tree = if draw {
        nodes.draw(node)?
    } else if full {
        nodes.full_tree(node, indent)?
    } else {
        nodes.subtree(node, indent)?
    };

    if json {
        let shown = serde_json::json!({
            "node": nodes.get(node)?,
            "tree": tree,
            "substring": nodes.substring(node)?,
            "sentence": nodes.sentence(node)?,
        });
        println!("{shown:#}");
    } else {
        println!("{}: {}", "Sentence".blue(), nodes.sentence(node)?);
        println!("{}", tree.trim_end());
    }
    Ok(())
}
