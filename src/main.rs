//! grade-history: watch a project's target grade history from the terminal.
//!
//! Usage: grade-history <project-id> [--page N] [--once]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use grade_history::config::Config;
use grade_history::{logging, GradeTable, HistoryView, HttpFetcher, Phase, SyncEngine};

struct Args {
    project_id: u64,
    page: usize,
    once: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut project_id = None;
    let mut page = 1;
    let mut once = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--page" => {
                let value = args.next().context("--page needs a value")?;
                page = value.parse().context("Invalid page number")?;
            }
            "--once" => once = true,
            other if project_id.is_none() => {
                project_id = Some(other.parse().context("Invalid project id")?);
            }
            other => bail!("Unexpected argument: {}", other),
        }
    }

    match project_id {
        Some(project_id) => Ok(Args { project_id, page, once }),
        None => bail!("Usage: grade-history <project-id> [--page N] [--once]"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };
    logging::init(&config.logging)?;

    let fetcher = HttpFetcher::new(&config.api).context("Failed to build HTTP client")?;
    let grades = GradeTable::new(config.grades.clone());
    let engine = SyncEngine::new(
        Arc::new(fetcher),
        Arc::new(grades),
        config.display.items_per_page,
    );

    engine.initialize(args.project_id).await;
    if args.page != 1 && !engine.go_to_page(args.page) {
        tracing::warn!(page = args.page, "Page out of range, showing page 1");
    }
    print!("{}", render(&engine.view()));

    if args.once {
        engine.dispose();
        return Ok(());
    }

    let mut views = engine.subscribe();
    let _ = views.borrow_and_update();
    engine.start_polling(Duration::from_millis(config.polling.interval_ms));

    let mut shown = engine.view();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                // Loading flips on every tick; only redraw what the user would notice.
                if view.revision != shown.revision
                    || view.current_page != shown.current_page
                    || view.error != shown.error
                {
                    print!("{}", render(&view));
                }
                shown = view;
            }
        }
    }

    engine.dispose();
    Ok(())
}

fn render(view: &HistoryView) -> String {
    let mut out = String::new();
    out.push_str(&format!("Target grade history, project {}\n", view.project_id));

    if let Some(ref error) = view.error {
        out.push_str(&format!("  {}\n", error));
        return out;
    }
    if view.phase == Phase::Loading {
        out.push_str("  Loading...\n");
        return out;
    }
    if view.records.is_empty() {
        out.push_str("  No target grade changes yet\n");
        return out;
    }

    for record in &view.records {
        out.push_str(&format!(
            "  {}  {:<24}  {} → {}\n",
            record.changed_at.format("%Y-%m-%d %H:%M"),
            record.changed_by.display_name(),
            record.previous_grade,
            record.new_grade,
        ));
    }
    out.push_str(&format!(
        "  Page {} of {} ({} changes)\n",
        view.current_page, view.total_pages, view.total_records
    ));
    out
}
