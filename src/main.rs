//! Sleuth 命令行
//!
//! `sleuth <问题>`：单次提问，输出回答与来源；不带参数时逐行读取 stdin，`/reset` 清空会话。

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use sleuth::agent::create_research_components;
use sleuth::config::load_config;
use sleuth::observability;
use sleuth::research::{Orchestrator, ResearchEvent, TurnOutcome};

fn print_sources(outcome: &TurnOutcome) {
    if outcome.sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for s in &outcome.sources {
        println!("  [{}] {} - {}", s.index, s.title, s.url);
    }
    if !outcome.unresolved_citations.is_empty() {
        println!("  (unresolved citations: {:?})", outcome.unresolved_citations);
    }
}

/// 事件打印结束后还需输出的内容：已流式输出的成功回答只补换行，流式中途失败时先换行再打印错误
fn answer_tail(streamed: bool, outcome: &TurnOutcome) -> String {
    match (streamed, outcome.success) {
        (true, true) => "\n".to_string(),
        (true, false) => format!("\n{}\n", outcome.answer),
        (false, _) => format!("{}\n", outcome.answer),
    }
}

async fn ask(orchestrator: &mut Orchestrator, question: &str) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut streamed = false;
        while let Some(event) = rx.recv().await {
            match event {
                ResearchEvent::StreamChunk(chunk) => {
                    print!("{}", chunk);
                    let _ = std::io::stdout().flush();
                    streamed = true;
                }
                ResearchEvent::Status(status) => eprintln!("[{}]", status),
                ResearchEvent::ToolUse { tool, arguments } => eprintln!("[tool] {} {}", tool, arguments),
                _ => {}
            }
        }
        streamed
    });

    let outcome = orchestrator.run_turn(question, Some(&tx)).await;
    drop(tx);
    let streamed = printer.await.unwrap_or(false);
    print!("{}", answer_tail(streamed, &outcome));
    print_sources(&outcome);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let components = create_research_components(&cfg)
        .await
        .context("Failed to create research components")?;
    let mut orchestrator = Orchestrator::new(components);

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !question.trim().is_empty() {
        ask(&mut orchestrator, question.trim()).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/reset" => {
                orchestrator.reset();
                println!("Session cleared.");
            }
            "/quit" | "/exit" => break,
            _ => ask(&mut orchestrator, line).await,
        }
    }
    Ok(())
}
