//! Socrates 交互式对话
//!
//! 入口：初始化日志、按配置构建 Orchestrator，逐行读取 stdin 跑一轮 ReAct 并打印回复。
//! `/reset` 清空对话，`/salir` 退出；Ctrl-C 中断当前轮次。配置了 app.transcript_path 时每轮结束保存对话记录。
//!
//! 启动: cargo run -- [config.toml]

use std::path::PathBuf;

use anyhow::Context;
use socrates::agent::build_orchestrator;
use socrates::config::load_config;
use socrates::memory::ConversationPersistence;
use socrates::{observability, ConversationState, StopReason};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let orchestrator = build_orchestrator(&cfg).context("Failed to build agent")?;

    let persistence = cfg.app.transcript_path.as_ref().map(ConversationPersistence::new);
    let mut state = match &persistence {
        Some(p) => ConversationState::from_messages(
            p.load()
                .with_context(|| format!("Failed to load transcript {}", p.path().display()))?,
        ),
        None => ConversationState::new(),
    };

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all("Sócrates: Saludos. ¿Sobre qué quieres que reflexionemos hoy? (/reset, /salir)\n".as_bytes())
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/salir" => break,
            "/reset" => {
                state.reset();
                stdout.write_all(b"(conversacion reiniciada)\n").await?;
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let outcome = {
            let turn = orchestrator.run_turn(&mut state, input, &cancel);
            tokio::pin!(turn);
            tokio::select! {
                out = &mut turn => out,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    turn.await
                }
            }
        };
        if outcome.stop != StopReason::Answered {
            tracing::info!(stop = ?outcome.stop, cycles = outcome.cycles, "turn ended early");
        }
        let (prompt_tokens, completion_tokens, total_tokens) = orchestrator.token_usage();
        tracing::info!(prompt_tokens, completion_tokens, total_tokens, "token usage");
        stdout
            .write_all(format!("Sócrates: {}\n", outcome.reply).as_bytes())
            .await?;

        if let Some(p) = &persistence {
            if let Err(e) = p.save(state.messages()) {
                tracing::warn!(path = %p.path().display(), error = %e, "failed to save transcript");
            }
        }
    }

    Ok(())
}
