use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use interview_engine::config::{EngineConfig, ProviderSettings};
use interview_engine::interview::{Difficulty, InterviewOrchestrator, QuestionTurn};
use interview_engine::knowledge::KnowledgeStore;
use interview_engine::llm::{ModelGateway, create_provider};
use interview_engine::research::ResearchCache;
use interview_engine::store::{InterviewStore, LibSqlStore, MemoryStore};

const USER_ID: &str = "local-user";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Keep the file writer's guard alive until exit so buffered lines flush.
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (company, role, difficulty) = match args.as_slice() {
        [company, role] => (company.clone(), role.clone(), None),
        [company, role, level] => (
            company.clone(),
            role.clone(),
            Some(level.parse::<Difficulty>()?),
        ),
        _ => {
            eprintln!("Usage: interview-engine <company> <role> [easy|medium|hard]");
            std::process::exit(2);
        }
    };

    let config = EngineConfig::from_env()?;
    let providers = ProviderSettings::from_env()?;

    let gateway = match &providers.primary {
        Some(primary) => {
            let mut gateway = ModelGateway::new(create_provider(primary)?, config.gateway.clone());
            if let Some(secondary) = &providers.secondary {
                gateway = gateway.with_secondary(create_provider(secondary)?);
            }
            gateway
        }
        None => {
            eprintln!("No API key configured, running offline on the built-in question banks.");
            ModelGateway::offline()
        }
    };

    let knowledge = match &config.knowledge_path {
        Some(path) => KnowledgeStore::from_json_file(path)?,
        None => KnowledgeStore::builtin()?,
    };

    let (store, cache): (Arc<dyn InterviewStore>, Arc<dyn ResearchCache>) =
        match &config.database_path {
            Some(path) => {
                let db = Arc::new(
                    LibSqlStore::new_local(path)
                        .await
                        .context("opening interview database")?,
                );
                (db.clone(), db)
            }
            None => {
                let mem = Arc::new(MemoryStore::new());
                (mem.clone(), mem)
            }
        };

    let max_questions = config.max_questions;
    let orchestrator = InterviewOrchestrator::new(
        Arc::new(gateway),
        Arc::new(knowledge),
        store,
        cache,
        config,
    );

    let session_id = orchestrator
        .start_interview(USER_ID, &company, &role, difficulty)
        .await?;

    eprintln!("Mock interview v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   {role} at {company}, up to {max_questions} questions");
    eprintln!("   Answer on one line. /end to finish early, /quit to abandon.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let session = orchestrator.get_session(session_id).await?;
        if session.summary.is_some() {
            break;
        }

        let turn = orchestrator.get_next_question(session_id).await?;
        print_question(&turn);

        let answer = loop {
            eprint!("> ");
            match lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break Some(line.trim().to_string()),
                None => break None,
            }
        };

        match answer.as_deref() {
            None | Some("/quit") => {
                orchestrator.abandon_interview(session_id).await?;
                eprintln!("Interview abandoned.");
                return Ok(());
            }
            Some("/end") => break,
            Some(text) => {
                let evaluation = orchestrator.submit_answer(session_id, text).await?;
                println!(
                    "\n  score {:.1}/10 ({})  accuracy {:.1}  clarity {:.1}  structure {:.1}  confidence {:.1}",
                    evaluation.aggregate,
                    evaluation.readiness,
                    evaluation.scores.technical_accuracy,
                    evaluation.scores.clarity,
                    evaluation.scores.structure,
                    evaluation.scores.confidence,
                );
                println!("  {}\n", evaluation.feedback);
            }
        }
    }

    let summary = orchestrator.finalize_interview(session_id).await?;
    println!("Interview complete");
    println!("  answered:   {}", summary.questions_answered);
    println!("  mean score: {:.1} ({})", summary.mean_score, summary.readiness);
    println!("  difficulty: {}", join(&summary.difficulty_trail));
    if !summary.topics_missed.is_empty() {
        println!("  revisit:    {}", summary.topics_missed.join(", "));
    }

    let profile = orchestrator.get_memory_summary(USER_ID).await?;
    if !profile.strengths.is_empty() {
        let topics: Vec<&str> = profile.strengths.iter().map(|s| s.topic.as_str()).collect();
        println!("  strengths:  {}", topics.join(", "));
    }
    if !profile.weaknesses.is_empty() {
        let topics: Vec<&str> = profile.weaknesses.iter().map(|w| w.topic.as_str()).collect();
        println!("  weaknesses: {}", topics.join(", "));
    }
    Ok(())
}

/// stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file under `INTERVIEW_LOG_DIR` when set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match std::env::var("INTERVIEW_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "interview-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr)
                .init();
            None
        }
    }
}

fn print_question(turn: &QuestionTurn) {
    let q = &turn.question;
    println!(
        "Q{} [{} · {} · {}]\n{}\n",
        turn.number, q.difficulty, q.category, q.source, q.text
    );
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}
