//! # fernwiki CLI
//!
//! Command-line front end: pregenerate caches, render single pages, and
//! inspect page metadata. Serving over HTTP is a separate concern.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fernwiki_runtime::{DisplayResult, Wiki};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fernwiki")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the wiki directory (containing wiki.conf)
    #[arg(long, default_value = ".")]
    wiki: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pregenerate all page, image, and category caches
    Build,

    /// Render one page and print its HTML
    Render {
        /// Page name, with or without the .page extension
        page: String,

        /// Render even if the page is marked as a draft
        #[arg(long)]
        draft_ok: bool,

        /// Print the collected CSS instead of the HTML
        #[arg(long)]
        css: bool,
    },

    /// Print a page's metadata as JSON, without rendering
    Info {
        /// Page name, with or without the .page extension
        page: String,
    },

    /// List a category's posts
    Posts {
        /// Category name
        category: String,

        /// Zero-based result page
        #[arg(long, default_value_t = 0)]
        page_n: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let wiki = Wiki::open(&cli.wiki)
        .with_context(|| format!("failed to open wiki at {}", cli.wiki.display()))?;

    match cli.command {
        Commands::Build => build(&wiki),
        Commands::Render {
            page,
            draft_ok,
            css,
        } => render(&wiki, &page, draft_ok, css),
        Commands::Info { page } => info(&wiki, &page),
        Commands::Posts { category, page_n } => posts(&wiki, &category, page_n),
    }
}

fn build(wiki: &Wiki) -> Result<()> {
    let results = wiki.pregenerate();
    let mut failed = 0usize;

    for (name, result) in &results {
        if let DisplayResult::Error(e) = result {
            failed += 1;
            tracing::error!(target = %name, error = %e.error, detail = %e.detailed_error, "pregeneration failed");
        }
    }

    println!("{} targets, {} failed", results.len(), failed);
    if failed > 0 {
        bail!("{} targets failed to generate", failed);
    }
    Ok(())
}

fn render(wiki: &Wiki, page: &str, draft_ok: bool, css: bool) -> Result<()> {
    let result = if draft_ok {
        wiki.display_page_draft_ok(page)
    } else {
        wiki.display_page(page)
    };

    match result {
        DisplayResult::Page(p) => {
            for warning in &p.warnings {
                tracing::warn!(page = %p.name, %warning, "page warning");
            }
            if css {
                println!("{}", p.css);
            } else {
                println!("{}", p.html);
            }
            Ok(())
        }
        DisplayResult::Redirect(r) => {
            println!("redirect: {}", r.redirect);
            Ok(())
        }
        DisplayResult::Error(e) => bail!("{} ({}): {}", e.error, e.status, e.detailed_error),
        other => bail!("unexpected result: {:?}", kind_of(&other)),
    }
}

fn info(wiki: &Wiki, page: &str) -> Result<()> {
    let info = wiki
        .page_info(page)
        .with_context(|| format!("failed to read {}", page))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn posts(wiki: &Wiki, category: &str, page_n: usize) -> Result<()> {
    match wiki.display_category_posts(category, page_n) {
        DisplayResult::CategoryPosts(posts) => {
            println!(
                "{} ({} of {})",
                posts.name,
                posts.page_n + 1,
                posts.num_pages.max(1)
            );
            for page in &posts.pages {
                let created = page
                    .info
                    .created
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {}  {}", created, page.name, page.info.title);
            }
            Ok(())
        }
        DisplayResult::Error(e) => bail!("{} ({}): {}", e.error, e.status, e.detailed_error),
        other => bail!("unexpected result: {:?}", kind_of(&other)),
    }
}

fn kind_of(result: &DisplayResult) -> &'static str {
    match result {
        DisplayResult::Page(_) => "page",
        DisplayResult::Image(_) => "image",
        DisplayResult::Redirect(_) => "redirect",
        DisplayResult::CategoryPosts(_) => "category posts",
        DisplayResult::Error(_) => "error",
    }
}
