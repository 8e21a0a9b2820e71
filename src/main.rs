//! DeepSearch 命令行
//!
//! 用法：deepsearch [--config <file>] [任务描述...]；不给任务时运行内置示例任务。
//! 运行中打印进度事件，结束后输出最终答案与重要链接。

use std::path::PathBuf;

use anyhow::Context;
use deepsearch::agent::{create_research_components, run_research, RunOutcome};
use deepsearch::config::load_config;
use deepsearch::observability;
use deepsearch::react::ResearchEvent;

const DEMO_TASK: &str = "Plan a 4-5 day trip to Singapore in May on a budget. \
1. Keep 2 days for travelling there and back (2-3 days of sightseeing). \
2. Include famous sights and some bookshops. \
3. Prefer affordable food. Accommodation is not needed.";

fn parse_args() -> (Option<PathBuf>, String) {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = args.next().map(PathBuf::from);
        } else {
            words.push(arg);
        }
    }
    let task = if words.is_empty() {
        DEMO_TASK.to_string()
    } else {
        words.join(" ")
    };
    (config_path, task)
}

fn print_event(ev: &ResearchEvent) {
    match ev {
        ResearchEvent::RoundStarted { round, max_rounds } => match max_rounds {
            Some(max) => println!("== Round {round}/{max} =="),
            None => println!("== Round {round} =="),
        },
        ResearchEvent::MemoryUpdated {
            status,
            added,
            deleted,
            blocks,
            ..
        } => println!(
            "   memory: {status}, +{} -{} ({blocks} blocks)",
            added.len(),
            deleted.len()
        ),
        ResearchEvent::ToolCall { tool, input, .. } => println!("   -> {tool}: {input}"),
        ResearchEvent::Observation { tool, ok, .. } => {
            println!("   <- {tool}: {}", if *ok { "ok" } else { "failed" })
        }
        ResearchEvent::Recovery { action, detail } => println!("   ! {action}: {detail}"),
        ResearchEvent::Error { text } => eprintln!("   error: {text}"),
        ResearchEvent::Phase { .. }
        | ResearchEvent::ModelOutput { .. }
        | ResearchEvent::Finished { .. } => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, task) = parse_args();
    let cfg = load_config(config_path).context("Failed to load config")?;
    let components = create_research_components(&cfg).context("Failed to create research agent")?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    println!("Task: {}", task.trim());
    let result = run_research(&components, &task, Some(&event_tx)).await;
    drop(event_tx);
    let _ = printer.await;

    let report = result.context("Research run failed")?;
    let label = match report.outcome {
        RunOutcome::Answered => "Final answer",
        RunOutcome::Summarized => "Final answer (summarized)",
    };
    println!("\n{label}:\n{}", report.answer);
    if !report.important_links.is_empty() {
        println!("\nImportant links:");
        for link in &report.important_links {
            println!("- {} ({})", link.title, link.url);
        }
    }
    Ok(())
}
