//! AgentBrain binary - composition root.
//!
//! 1. Parse CLI args, load `.env`, then load and validate configuration
//! 2. Read the API credential and the office knowledge file
//! 3. Open SQLite and load the sentence-embedding model
//! 4. Register the user, then answer questions line by line

mod cli;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use agentbrain_chat::{
    DualStageOrchestrator, FallbackRetriever, OpenAiGenerationService, PairingPolicy, TurnSettings,
};
use agentbrain_core::config::BrainConfig;
use agentbrain_core::knowledge::KnowledgeConfig;
use agentbrain_core::types::UserId;
use agentbrain_storage::{Database, MessageRepository, UserRepository};
use agentbrain_vector::embedding::{DynEmbeddingService, MockEmbedding, OnnxEmbeddingService};

use cli::{expand_home, load_env_file, CliArgs};

const BANNER: &str = "=====================================================";
const EXIT_WORDS: [&str; 3] = ["sair", "exit", "quit"];

type Input = Lines<BufReader<Stdin>>;

/// Print `label` and read one trimmed line. `None` on EOF.
async fn prompt(input: &mut Input, label: &str) -> std::io::Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

/// Ask until a non-empty answer is given. `None` on EOF.
async fn prompt_required(input: &mut Input, label: &str) -> std::io::Result<Option<String>> {
    loop {
        match prompt(input, label).await? {
            Some(value) if value.is_empty() => continue,
            other => return Ok(other),
        }
    }
}

async fn register_user(
    input: &mut Input,
    users: &UserRepository,
) -> Result<Option<UserId>, Box<dyn std::error::Error>> {
    println!("=== Cadastro de usuário ===");
    let Some(name) = prompt_required(input, "Nome: ").await? else {
        return Ok(None);
    };
    let Some(email) = prompt_required(input, "Email: ").await? else {
        return Ok(None);
    };
    let Some(handle) = prompt_required(input, "Usuário Instagram: ").await? else {
        return Ok(None);
    };

    let id = users.get_or_create(&name, &email, &handle)?;
    let display = users
        .find_by_id(id)?
        .map(|user| user.name)
        .unwrap_or(name);
    println!("✅ Usuário registrado: {}. ID = {}\n", display, id);
    Ok(Some(id))
}

async fn chat_loop(
    input: &mut Input,
    orchestrator: &DualStageOrchestrator,
    user_id: UserId,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Iniciando chat (digite 'sair' para encerrar) ===\n");
    loop {
        let Some(question) = prompt(input, "Faça sua pergunta: ").await? else {
            println!("\n👋 Até breve!");
            return Ok(());
        };
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            println!("👋 Até breve!");
            return Ok(());
        }

        let report = match orchestrator.handle_turn(user_id, &question).await {
            Ok(report) => report,
            Err(agentbrain_chat::ChatError::StorageError(e)) => {
                return Err(format!("storage failure: {}", e).into());
            }
            Err(e) => {
                println!("⚠️  {}\n", e);
                continue;
            }
        };

        println!("{}", BANNER);
        println!("\n🔳 Resposta GPT (professor): ➡️\n{}\n", report.professor.text());
        println!("{}", BANNER);
        println!("{}", BANNER);
        println!("🔳 AgentBrain-ML: ➡️\n{}\n", report.agent.text());
        println!("{}", BANNER);
    }
}

fn load_config(args: &CliArgs) -> Result<BrainConfig, Box<dyn std::error::Error>> {
    let path = args.resolve_config_path();
    let mut config = if args.config_is_explicit() {
        BrainConfig::load(&path)?
    } else {
        BrainConfig::load_or_default(&path)
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn load_embedder(config: &BrainConfig) -> Result<Arc<dyn DynEmbeddingService>, Box<dyn std::error::Error>> {
    if config.embedding.use_mock {
        tracing::warn!("Using hash embeddings; fallback only matches identical questions");
        return Ok(Arc::new(MockEmbedding::new()));
    }
    let model_dir = expand_home(&config.embedding.model_dir);
    let service = OnnxEmbeddingService::from_directory(&model_dir)?;
    Ok(Arc::new(service))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let env_file = load_env_file(args.env_file.as_deref());

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            agentbrain_core::logging::init(args.log_level.as_deref().unwrap_or("info"));
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };
    agentbrain_core::logging::init(&config.general.log_level);
    tracing::info!("Starting AgentBrain v{}", env!("CARGO_PKG_VERSION"));
    match env_file {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Could not load environment file"),
    }

    let api_key = match config.api_key() {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(error = %e, "Generation credential missing");
            return Err(e.into());
        }
    };

    let knowledge = Arc::new(KnowledgeConfig::load(&expand_home(
        &config.general.knowledge_path,
    ))?);

    let data_dir = expand_home(&config.general.data_dir);
    let db_path = data_dir.join("agentbrain.db");
    let db = match Database::new(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "Failed to open database");
            return Err(e.into());
        }
    };
    let users = UserRepository::new(Arc::clone(&db));
    tracing::info!(path = %db_path.display(), users = users.count()?, "SQLite database opened");

    tracing::info!("Loading sentence-embedding model for fallback");
    let embedder = load_embedder(&config)?;
    tracing::info!(dimensions = embedder.dimensions(), "Embedding model ready");

    let generator = Arc::new(OpenAiGenerationService::new(
        config.generation.base_url.clone(),
        config.generation.model.clone(),
        api_key,
        Duration::from_secs(config.generation.request_timeout_secs),
    )?);

    let orchestrator = DualStageOrchestrator::new(
        Arc::new(MessageRepository::new(Arc::clone(&db))),
        generator,
        FallbackRetriever::new(
            embedder,
            PairingPolicy::corpus(config.fallback.skip_fallback_answers),
        ),
        knowledge,
        TurnSettings::from_config(&config),
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let Some(user_id) = register_user(&mut input, &users).await? else {
        println!("\n👋 Até breve!");
        return Ok(());
    };

    chat_loop(&mut input, &orchestrator, user_id).await
}
