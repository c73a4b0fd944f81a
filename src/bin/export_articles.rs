use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use content_engine::model::GeneratedArticle;

#[derive(Debug, Parser)]
#[command(
    about = "Render an exported article list (JSON from the `export` command) to standalone HTML files."
)]
struct Args {
    /// Path to the JSON article dump
    #[arg(long)]
    input: PathBuf,

    /// Output directory for the rendered HTML files
    #[arg(long, default_value = "html")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let articles: Vec<GeneratedArticle> =
        serde_json::from_str(&raw).context("invalid article dump JSON")?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    for article in &articles {
        let path = args.out_dir.join(format!("{}.html", slugify(&article.title)));
        std::fs::write(&path, render_article(article))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    println!("exported {} article(s)", articles.len());
    Ok(())
}

/// File-name slug: lowercase alphanumerics, everything else collapsed to
/// single hyphens.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_hyphen = true;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("article");
    }
    slug
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Standalone HTML document: title tag and meta description in the head,
/// the generated body verbatim.
fn render_article(article: &GeneratedArticle) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n\
         <meta name=\"description\" content=\"{}\">\n\
         </head>\n<body>\n{}\n</body>\n</html>\n",
        escape_attr(&article.title_tag),
        escape_attr(&article.meta_description),
        article.content
    )
}
