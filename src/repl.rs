//! Interactive operator loop: pull data, triage opportunities, drive the
//! generation queue, chat. Any input that is not a known command becomes a
//! chat message.

use anyhow::Result;
use std::io::Write as _;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, instrument};

use crate::analytics::{pull_search_data, AnalyticsClient, FetchError};
use crate::brief::build_brief;
use crate::chat::{build_context, chat_messages, compose_user_message, resolve_article, ChatTuning};
use crate::config::Config;
use crate::fetch::{scrape_top_pages, PageFetcher, ScrapeConfig};
use crate::llm::{ArticleGenerator, ChatMessage, LlmClient};
use crate::model::{ArticleStatus, Opportunity};
use crate::queue::{GenerationQueue, RunOutcome};
use crate::score::{rank_opportunities, RankingConfig};
use crate::session::{SearchData, Session};

const KEYWORD_COLUMN_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pull(Option<String>),
    Opportunities,
    SelectTop10,
    Select(Vec<usize>),
    Unselect(Vec<usize>),
    View(usize),
    Why(usize),
    Generate(Option<String>),
    Retry,
    Skip,
    Articles,
    Show(usize),
    Status(usize, ArticleStatus),
    Export(PathBuf),
    Help,
    Quit,
    Chat(String),
    Invalid(&'static str),
    Noop,
}

fn parse_indices(rest: &str) -> Vec<usize> {
    rest.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<usize>().ok())
        .collect()
}

/// Parse one input line. Unknown words are chat, not errors.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Noop;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "pull" => Command::Pull((!rest.is_empty()).then(|| rest.to_string())),
        "opps" | "opportunities" => Command::Opportunities,
        "select" => {
            if rest.eq_ignore_ascii_case("top10") {
                Command::SelectTop10
            } else {
                let indices = parse_indices(rest);
                if indices.is_empty() {
                    Command::Invalid("usage: select top10 | select <n>[,<n>...]")
                } else {
                    Command::Select(indices)
                }
            }
        }
        "unselect" => {
            let indices = parse_indices(rest);
            if indices.is_empty() {
                Command::Invalid("usage: unselect <n>[,<n>...]")
            } else {
                Command::Unselect(indices)
            }
        }
        "view" => match rest.parse() {
            Ok(index) => Command::View(index),
            Err(_) => Command::Invalid("usage: view <n>"),
        },
        "why" => match rest.parse() {
            Ok(index) => Command::Why(index),
            Err(_) => Command::Invalid("usage: why <n>"),
        },
        "generate" => Command::Generate((!rest.is_empty()).then(|| rest.to_string())),
        "retry" => Command::Retry,
        "skip" => Command::Skip,
        "articles" => Command::Articles,
        "show" => match rest.parse() {
            Ok(index) => Command::Show(index),
            Err(_) => Command::Invalid("usage: show <n>"),
        },
        "status" => {
            let mut parts = rest.split_whitespace();
            let index = parts.next().and_then(|token| token.parse::<usize>().ok());
            let status = parts.next().map(str::to_lowercase);
            match (index, status.as_deref()) {
                (Some(index), Some("draft")) => Command::Status(index, ArticleStatus::Draft),
                (Some(index), Some("sent")) => Command::Status(index, ArticleStatus::Sent),
                _ => Command::Invalid("usage: status <n> draft|sent"),
            }
        }
        "export" => {
            if rest.is_empty() {
                Command::Invalid("usage: export <file.json>")
            } else {
                Command::Export(PathBuf::from(rest))
            }
        }
        _ => Command::Chat(line.to_string()),
    }
}

fn format_impressions(impressions: u64) -> String {
    if impressions >= 1000 {
        format!("{:.1}K", impressions as f64 / 1000.0)
    } else {
        impressions.to_string()
    }
}

fn truncate_keyword(keyword: &str) -> String {
    if keyword.chars().count() > KEYWORD_COLUMN_WIDTH {
        let cut: String = keyword.chars().take(KEYWORD_COLUMN_WIDTH).collect();
        format!("{cut}...")
    } else {
        keyword.to_string()
    }
}

fn print_opportunities(session: &Session) {
    if session.opportunities.is_empty() {
        println!("No opportunities loaded. Use `pull <site>` first.");
        return;
    }
    println!(
        "TOP {} CONTENT OPPORTUNITIES (selected: {})",
        session.opportunities.len(),
        session.selected.len()
    );
    println!(
        "{:>4} {:<3} {:<8} {:<43} {:>8} {:>10} {:>7} {:>5}",
        "#", "", "TYPE", "KEYWORD/PAGE", "POS", "IMPR", "CTR", "SCORE"
    );
    for (i, opp) in session.opportunities.iter().enumerate() {
        let marker = if session.selected.contains(&opp.id) {
            "*"
        } else {
            ""
        };
        let position = if opp.position > 0.0 {
            format!("{:.1}", opp.position)
        } else {
            "--".to_string()
        };
        println!(
            "{:>4} {:<3} {:<8} {:<43} {:>8} {:>10} {:>6.1}% {:>5}",
            i + 1,
            marker,
            opp.kind.as_str(),
            truncate_keyword(&opp.keyword),
            position,
            format_impressions(opp.impressions),
            opp.ctr * 100.0,
            opp.score
        );
    }
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 pull [site]          pull search data (90-day window) and rank opportunities\n\
         \x20 opps                 show the ranked opportunity list\n\
         \x20 select top10         select the ten highest-scoring opportunities\n\
         \x20 select <n>[,<n>..]   select opportunities by row number\n\
         \x20 unselect <n>[,..]    drop opportunities from the selection\n\
         \x20 view <n>             show opportunity detail and the brief it would produce\n\
         \x20 why <n>              ask the model why this opportunity is worth it\n\
         \x20 generate [notes]     generate articles for the selection (confirms first)\n\
         \x20 retry | skip         recover an errored queue item\n\
         \x20 articles             list generated articles\n\
         \x20 show <n>             print one generated article\n\
         \x20 status <n> <s>       set article status (draft|sent)\n\
         \x20 export <file.json>   write the article list as JSON\n\
         \x20 quit                 leave\n\
         Anything else is sent to the chat assistant."
    );
}

fn opportunity_at(session: &Session, index: usize) -> Option<&Opportunity> {
    index
        .checked_sub(1)
        .and_then(|i| session.opportunities.get(i))
}

#[instrument(skip_all)]
async fn handle_pull(
    cfg: &Config,
    session: &mut Session,
    analytics: &AnalyticsClient,
    fetcher: &dyn PageFetcher,
    site_arg: Option<String>,
) {
    let site = site_arg.unwrap_or_else(|| cfg.analytics.site.clone());
    if site.trim().is_empty() {
        println!("No site configured. Use `pull <site>` or set analytics.site.");
        return;
    }
    if !analytics.has_credentials() {
        println!("{}", FetchError::MissingCredentials);
        return;
    }

    println!("Pulling search data for {site}...");
    let result = match pull_search_data(analytics, &site).await {
        Ok(result) => result,
        Err(err) => {
            println!("{err}");
            return;
        }
    };

    if result.is_empty() {
        println!(
            "No data returned for {site}\n\n\
             Possible reasons:\n\
             1. No search data in the last 90 days\n\
             2. The identity doesn't have access to this property\n\
             3. The site format is incorrect\n\n\
             Try both 'sc-domain:example.com' and 'https://example.com/'."
        );
        return;
    }

    let scraped = if result.pages.is_empty() {
        Vec::new()
    } else {
        println!("Scraping top pages content (this may take a minute)...");
        let scrape_cfg = ScrapeConfig {
            max_pages: cfg.scrape.max_pages,
            delay: std::time::Duration::from_millis(cfg.scrape.delay_ms),
        };
        scrape_top_pages(fetcher, &result.pages, &scrape_cfg).await
    };
    let scraped_ok = scraped.iter().filter(|page| page.is_success()).count();

    let total_points = result.queries.len() + result.pages.len();
    session.clear_data();
    session.opportunities = rank_opportunities(
        &result.queries,
        &result.pages,
        &RankingConfig {
            min_impressions: cfg.ranking.min_impressions,
            max_opportunities: cfg.ranking.max_opportunities,
        },
    );
    session.data = Some(SearchData {
        domain: site.clone(),
        date_range: result.date_range.clone(),
        queries: result.queries,
        pages: result.pages,
        scraped,
    });

    info!(site, total_points, scraped_ok, "pull complete");
    println!(
        "Done! Found {total_points} data points ({}). Scraped {scraped_ok} pages.",
        result.date_range
    );
    print_opportunities(session);
}

async fn resume_queue(session: &mut Session, generator: &dyn ArticleGenerator) {
    let extra = session.extra_brief.clone();
    match session
        .queue
        .run(generator, extra.as_deref(), &mut session.articles)
        .await
    {
        RunOutcome::Completed { generated } => {
            session.selected.clear();
            session.extra_brief = None;
            println!("All content generated! {generated} article(s) ready to review (`articles`).");
        }
        RunOutcome::Blocked { index } => {
            let item = &session.queue.items()[index];
            let (done, total) = session.queue.progress();
            println!(
                "{} of {} done. '{}' failed: {}",
                done,
                total,
                item.opportunity.keyword,
                item.error.as_deref().unwrap_or("Generation failed")
            );
            println!("Use `retry` to try it again or `skip` to move on.");
        }
    }
}

async fn handle_generate(
    session: &mut Session,
    generator: &dyn ArticleGenerator,
    lines: &mut Lines<BufReader<Stdin>>,
    extra: Option<String>,
) -> Result<()> {
    if !session.queue.is_finished() {
        println!("A batch is already in progress. Use `retry` or `skip` first.");
        return Ok(());
    }
    let selected = session.selected_opportunities();
    if selected.is_empty() {
        println!("Nothing selected. Use `select top10` or `select <n>` first.");
        return Ok(());
    }

    println!("This will create content for {} article(s):", selected.len());
    for opp in &selected {
        println!("  - {} [{}]", opp.keyword, opp.kind.as_str());
    }
    println!(
        "Estimated time: ~{}-{} minutes",
        selected.len() * 2,
        selected.len() * 3
    );
    print!("Generate? [y/N] ");
    std::io::stdout().flush()?;
    let confirm = lines.next_line().await?.unwrap_or_default();
    if !confirm.trim().eq_ignore_ascii_case("y") {
        println!("Cancelled.");
        return Ok(());
    }

    session.queue = GenerationQueue::new(selected);
    session.extra_brief = extra;
    resume_queue(session, generator).await;
    Ok(())
}

async fn handle_why(session: &Session, llm: &LlmClient, index: usize) {
    let Some(opp) = opportunity_at(session, index) else {
        println!("No opportunity #{index}.");
        return;
    };
    println!("Analyzing '{}'...", opp.keyword);
    match llm.analyze_opportunity(opp).await {
        Ok(analysis) => {
            println!("WHY THIS OPPORTUNITY?\n{}\n", analysis.why);
            println!("RECOMMENDED APPROACH\n{}", analysis.approach);
        }
        Err(err) => println!("Analysis unavailable: {err}"),
    }
}

fn handle_view(session: &Session, index: usize) {
    let Some(opp) = opportunity_at(session, index) else {
        println!("No opportunity #{index}.");
        return;
    };
    println!("Target Keyword: {}", opp.keyword);
    println!("Type: {}", opp.kind.as_str());
    println!(
        "Position: {:.1} | Impressions: {} | CTR: {:.2}% | Score: {}",
        opp.position,
        format_impressions(opp.impressions),
        opp.ctr * 100.0,
        opp.score
    );
    match opp.page.as_deref() {
        Some(url) => println!("Current URL: {url}"),
        None => println!("Current URL: New page needed"),
    }
    println!("\nBrief preview:\n{}", build_brief(opp, None));
}

fn handle_articles(session: &Session) {
    if session.articles.is_empty() {
        println!("No content generated yet. Select opportunities and `generate`.");
        return;
    }
    for (i, article) in session.articles.iter().enumerate() {
        println!(
            "{:>3}. {} | {} | {} | {}",
            i + 1,
            article.title,
            article.kind.as_str(),
            article.created_at.format("%b %d, %Y"),
            article.status.as_str()
        );
    }
}

fn handle_show(session: &Session, index: usize) {
    let Some(article) = index.checked_sub(1).and_then(|i| session.articles.get(i)) else {
        println!("No article #{index}.");
        return;
    };
    println!("TITLE TAG\n{}\n", article.title_tag);
    println!("META DESCRIPTION\n{}\n", article.meta_description);
    println!("ARTICLE CONTENT\n{}", article.content);
}

async fn handle_export(session: &Session, path: PathBuf) {
    let json = match serde_json::to_string_pretty(&session.articles) {
        Ok(json) => json,
        Err(err) => {
            println!("Export failed: {err}");
            return;
        }
    };
    match tokio::fs::write(&path, json).await {
        Ok(()) => println!(
            "Wrote {} article(s) to {}",
            session.articles.len(),
            path.display()
        ),
        Err(err) => println!("Export failed for {}: {err}", path.display()),
    }
}

#[instrument(skip_all)]
async fn handle_chat(cfg: &Config, session: &mut Session, llm: &LlmClient, message: &str) {
    if !llm.has_api_key() {
        println!("Please configure your LLM API key to use chat (llm.api_key or LLM_API_KEY).");
        return;
    }
    let tuning = ChatTuning {
        min_match_score: cfg.chat.min_match_score,
        history_window: cfg.chat.history_window,
        context_queries: cfg.chat.context_queries,
        context_articles: cfg.chat.context_articles,
    };

    let (context, resolved_url) = match &session.data {
        Some(data) => {
            let resolved = resolve_article(
                message,
                &data.scraped,
                session.current_article_url.as_deref(),
                &tuning,
            );
            let current = resolved.map(|index| &data.scraped[index]);
            let context = build_context(data, &session.articles, current, &tuning);
            (context, current.map(|page| page.url.clone()))
        }
        None => (String::new(), None),
    };
    if let Some(url) = &resolved_url {
        println!("Currently working on: {url}");
        session.current_article_url = Some(url.clone());
    }

    let full_message = compose_user_message(&context, message);
    let messages = chat_messages(&session.chat_history, full_message, &tuning);
    session.chat_history.push(ChatMessage::user(message));

    match llm.chat(&messages).await {
        Ok(reply) => {
            println!("{reply}");
            session.chat_history.push(ChatMessage::assistant(reply));
        }
        Err(err) => println!("Chat failed: {err}"),
    }
}

/// Run the operator loop until EOF or `quit`.
pub async fn run(
    cfg: &Config,
    session: &mut Session,
    analytics: &AnalyticsClient,
    llm: &LlmClient,
    fetcher: &dyn PageFetcher,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("content-engine ready. Type `help` for commands.");

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Noop => {}
            Command::Help => print_help(),
            Command::Quit => break,
            Command::Invalid(usage) => println!("{usage}"),
            Command::Pull(site) => handle_pull(cfg, session, analytics, fetcher, site).await,
            Command::Opportunities => print_opportunities(session),
            Command::SelectTop10 => {
                let ids: Vec<String> = session
                    .opportunities
                    .iter()
                    .take(10)
                    .map(|opp| opp.id.clone())
                    .collect();
                let count = ids.len();
                session.selected = ids.into_iter().collect();
                println!("Selected top {count}.");
            }
            Command::Select(indices) => {
                let mut added = 0;
                for index in indices {
                    match opportunity_at(session, index).map(|opp| opp.id.clone()) {
                        Some(id) => {
                            session.selected.insert(id);
                            added += 1;
                        }
                        None => println!("No opportunity #{index}."),
                    }
                }
                println!(
                    "Selected {added}. Total selected: {}.",
                    session.selected.len()
                );
            }
            Command::Unselect(indices) => {
                for index in indices {
                    if let Some(id) = opportunity_at(session, index).map(|opp| opp.id.clone()) {
                        session.selected.remove(&id);
                    }
                }
                println!("Total selected: {}.", session.selected.len());
            }
            Command::View(index) => handle_view(session, index),
            Command::Why(index) => handle_why(session, llm, index).await,
            Command::Generate(extra) => {
                handle_generate(session, llm, &mut lines, extra).await?
            }
            Command::Retry => {
                if session.queue.retry_errored() {
                    resume_queue(session, llm).await;
                } else {
                    println!("Nothing to retry.");
                }
            }
            Command::Skip => {
                if session.queue.skip_errored() {
                    resume_queue(session, llm).await;
                } else {
                    println!("Nothing to skip.");
                }
            }
            Command::Articles => handle_articles(session),
            Command::Show(index) => handle_show(session, index),
            Command::Status(index, status) => {
                match index
                    .checked_sub(1)
                    .and_then(|i| session.articles.get_mut(i))
                {
                    Some(article) => {
                        article.status = status;
                        println!("Article {} is now {}.", index, status.as_str());
                    }
                    None => println!("No article #{index}."),
                }
            }
            Command::Export(path) => handle_export(session, path).await,
            Command::Chat(message) => handle_chat(cfg, session, llm, &message).await,
        }
    }

    Ok(())
}
