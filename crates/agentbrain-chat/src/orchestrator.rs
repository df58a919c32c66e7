//! Dual-stage orchestrator: one user question in, two stored answers out.
//!
//! The professor stage answers from the office facts. The agent stage
//! rephrases that answer under content-hiding rules, and falls back to the
//! closest historical answer when generation is unavailable.

use std::fmt;
use std::sync::Arc;

use agentbrain_core::config::BrainConfig;
use agentbrain_core::knowledge::KnowledgeConfig;
use agentbrain_core::store::ConversationStore;
use agentbrain_core::types::{
    DegradeCause, NewMessage, Role, Scope, StageOutcome, TurnReport, UserId,
};
use tracing::{debug, error, info};

use crate::error::ChatError;
use crate::fallback::FallbackRetriever;
use crate::generation::{GenerationRequest, GenerationService};
pub use crate::pairs::PRIMARY_UNAVAILABLE;
use crate::prompt::{
    agent_user_content, history_context, professor_instruction, AGENT_SYSTEM_INSTRUCTION,
};

/// Maximum question length in characters.
const MAX_QUESTION_LENGTH: usize = 2000;

/// Per-turn knobs taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub history_limit: usize,
    pub professor_max_tokens: u32,
    pub professor_temperature: f32,
    pub agent_max_tokens: u32,
    pub agent_temperature: f32,
}

impl TurnSettings {
    pub fn from_config(config: &BrainConfig) -> Self {
        Self {
            history_limit: config.fallback.history_limit,
            professor_max_tokens: config.generation.professor_max_tokens,
            professor_temperature: config.generation.professor_temperature,
            agent_max_tokens: config.generation.agent_max_tokens,
            agent_temperature: config.generation.agent_temperature,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&BrainConfig::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum TurnState {
    QuestionReceived,
    PrimaryAttempted,
    PrimaryStored,
    ConstrainedAttempted,
    FallbackInvoked,
    Stored,
    TurnComplete,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::QuestionReceived => "question_received",
            TurnState::PrimaryAttempted => "primary_attempted",
            TurnState::PrimaryStored => "primary_stored",
            TurnState::ConstrainedAttempted => "constrained_attempted",
            TurnState::FallbackInvoked => "fallback_invoked",
            TurnState::Stored => "stored",
            TurnState::TurnComplete => "turn_complete",
        };
        f.write_str(name)
    }
}

/// Runs turns against a store, a generation service and the fallback engine.
pub struct DualStageOrchestrator {
    store: Arc<dyn ConversationStore>,
    generator: Arc<dyn GenerationService>,
    fallback: FallbackRetriever,
    knowledge: Arc<KnowledgeConfig>,
    settings: TurnSettings,
}

impl DualStageOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn GenerationService>,
        fallback: FallbackRetriever,
        knowledge: Arc<KnowledgeConfig>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            generator,
            fallback,
            knowledge,
            settings,
        }
    }

    /// Process one question from `user_id`.
    ///
    /// Three messages are appended in order: the question, the professor
    /// answer and the agent answer. Generation failures never abort the
    /// turn; only invalid input and store errors do.
    pub async fn handle_turn(
        &self,
        user_id: UserId,
        question: &str,
    ) -> Result<TurnReport, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if question.chars().count() > MAX_QUESTION_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_QUESTION_LENGTH));
        }

        self.transition(user_id, TurnState::QuestionReceived);
        self.store
            .append(&NewMessage::new(user_id, Role::User, question))?;

        let professor = self.primary_stage(question).await;
        self.transition(user_id, TurnState::PrimaryAttempted);
        self.store.append(
            &NewMessage::new(user_id, Role::Professor, professor.text())
                .with_origin(professor.origin()),
        )?;
        self.transition(user_id, TurnState::PrimaryStored);

        let agent = self
            .constrained_stage(user_id, question, professor.text())
            .await?;
        self.store.append(
            &NewMessage::new(user_id, Role::Agent, agent.text()).with_origin(agent.origin()),
        )?;
        self.transition(user_id, TurnState::Stored);

        info!(
            user_id = %user_id,
            professor_degraded = professor.is_degraded(),
            agent_degraded = agent.is_degraded(),
            "Turn handled"
        );
        self.transition(user_id, TurnState::TurnComplete);

        Ok(TurnReport { professor, agent })
    }

    async fn primary_stage(&self, question: &str) -> StageOutcome {
        let request = GenerationRequest {
            system_instruction: professor_instruction(&self.knowledge, question),
            user_content: question.to_string(),
            max_output_tokens: self.settings.professor_max_tokens,
            temperature: self.settings.professor_temperature,
        };

        match self.generator.generate(&request).await {
            Ok(text) => StageOutcome::Success(text),
            Err(e) => {
                error!(stage = "professor", error = %e, "Generation failed");
                StageOutcome::Degraded {
                    text: PRIMARY_UNAVAILABLE.to_string(),
                    cause: DegradeCause::GenerationUnavailable(e.to_string()),
                }
            }
        }
    }

    async fn constrained_stage(
        &self,
        user_id: UserId,
        question: &str,
        primary_answer: &str,
    ) -> Result<StageOutcome, ChatError> {
        let window = self.store.read(
            Scope::User(user_id),
            Some(self.settings.history_limit.saturating_mul(2)),
        )?;
        let context = history_context(&window);

        let request = GenerationRequest {
            system_instruction: AGENT_SYSTEM_INSTRUCTION.to_string(),
            user_content: agent_user_content(&context, primary_answer, question),
            max_output_tokens: self.settings.agent_max_tokens,
            temperature: self.settings.agent_temperature,
        };

        let result = self.generator.generate(&request).await;
        self.transition(user_id, TurnState::ConstrainedAttempted);

        match result {
            Ok(text) => Ok(StageOutcome::Success(text)),
            Err(e) => {
                error!(stage = "agent", error = %e, "Generation failed");
                self.transition(user_id, TurnState::FallbackInvoked);
                let text = self
                    .fallback
                    .retrieve(question, self.store.as_ref(), self.settings.history_limit)
                    .await;
                Ok(StageOutcome::Degraded {
                    text,
                    cause: DegradeCause::FallbackRetrieval(e.to_string()),
                })
            }
        }
    }

    fn transition(&self, user_id: UserId, state: TurnState) {
        debug!(user_id = %user_id, state = %state, "Turn state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FALLBACK_APOLOGY;
    use crate::generation::MockGeneration;
    use crate::pairs::PairingPolicy;
    use agentbrain_core::types::MessageOrigin;
    use agentbrain_storage::{Database, MessageRepository, UserRepository};
    use agentbrain_vector::embedding::MockEmbedding;

    struct Harness {
        orchestrator: DualStageOrchestrator,
        store: Arc<MessageRepository>,
        generator: Arc<MockGeneration>,
        user: UserId,
    }

    fn harness(generator: MockGeneration) -> Harness {
        let db = Arc::new(Database::in_memory().unwrap());
        let user = UserRepository::new(db.clone())
            .get_or_create("Maria", "maria@example.com", "@maria")
            .unwrap();
        let store = Arc::new(MessageRepository::new(db));
        let generator = Arc::new(generator);
        let fallback =
            FallbackRetriever::new(Arc::new(MockEmbedding::new()), PairingPolicy::default());
        let knowledge = Arc::new(KnowledgeConfig {
            name: "Silva & Associados".to_string(),
            address: "Rua A, 100".to_string(),
            history: "Fundado em 1990.".to_string(),
            values: vec!["Ética".to_string()],
            specialties: vec!["Direito Civil".to_string()],
            staff: vec!["Ana".to_string()],
        });
        let orchestrator = DualStageOrchestrator::new(
            store.clone(),
            generator.clone(),
            fallback,
            knowledge,
            TurnSettings::default(),
        );
        Harness {
            orchestrator,
            store,
            generator,
            user,
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_question() {
        let h = harness(MockGeneration::replying("x"));
        let result = h.orchestrator.handle_turn(h.user, "   ").await;
        assert!(matches!(result, Err(ChatError::EmptyMessage)));
        assert!(h.store.read(Scope::Global, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_long_question() {
        let h = harness(MockGeneration::replying("x"));
        let long = "a".repeat(MAX_QUESTION_LENGTH + 1);
        let result = h.orchestrator.handle_turn(h.user, &long).await;
        assert!(matches!(result, Err(ChatError::MessageTooLong(2000))));
    }

    #[tokio::test]
    async fn test_successful_turn_stores_three_messages() {
        let h = harness(MockGeneration::scripted(vec![
            Ok("Atendemos das 9h às 18h.".to_string()),
            Ok("9h às 18h".to_string()),
        ]));
        let report = h.orchestrator.handle_turn(h.user, "Qual o horário?").await.unwrap();

        assert_eq!(report.professor, StageOutcome::Success("Atendemos das 9h às 18h.".to_string()));
        assert_eq!(report.agent, StageOutcome::Success("9h às 18h".to_string()));

        let stored = h.store.read(Scope::User(h.user), None).unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Professor, Role::Agent]);
        assert!(stored.iter().all(|m| m.origin == MessageOrigin::Generated));
    }

    #[tokio::test]
    async fn test_requests_use_stage_settings() {
        let h = harness(MockGeneration::replying("ok"));
        h.orchestrator.handle_turn(h.user, "Qual o horário?").await.unwrap();

        let requests = h.generator.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].max_output_tokens, 300);
        assert!((requests[0].temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(requests[0].user_content, "Qual o horário?");
        assert!(requests[0].system_instruction.contains("Silva & Associados"));
        assert_eq!(requests[1].max_output_tokens, 150);
        assert_eq!(requests[1].temperature, 0.0);
        assert_eq!(requests[1].system_instruction, AGENT_SYSTEM_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_agent_context_includes_current_exchange() {
        let h = harness(MockGeneration::replying("resposta"));
        h.orchestrator.handle_turn(h.user, "Qual o horário?").await.unwrap();

        let agent_request = &h.generator.requests()[1];
        assert!(agent_request.user_content.starts_with(
            "Histórico relevante:\nUsuário: Qual o horário?\nProfessor: resposta\n\n"
        ));
        assert!(agent_request.user_content.ends_with("Pergunta: Qual o horário?"));
    }

    #[tokio::test]
    async fn test_primary_failure_stores_sentinel() {
        let h = harness(MockGeneration::scripted(vec![
            Err("timeout".to_string()),
            Ok("resposta do agente".to_string()),
        ]));
        let report = h.orchestrator.handle_turn(h.user, "Olá").await.unwrap();

        assert_eq!(report.professor.text(), PRIMARY_UNAVAILABLE);
        assert!(matches!(
            report.professor,
            StageOutcome::Degraded {
                cause: DegradeCause::GenerationUnavailable(_),
                ..
            }
        ));
        let stored = h.store.read(Scope::User(h.user), None).unwrap();
        assert_eq!(stored[1].content, PRIMARY_UNAVAILABLE);
        assert_eq!(stored[1].origin, MessageOrigin::Sentinel);

        let agent_request = &h.generator.requests()[1];
        assert!(agent_request
            .user_content
            .contains("Resposta do professor:\nGPT-3 Desconectado temporariamente\n\n"));
    }

    #[tokio::test]
    async fn test_total_outage_on_empty_history_returns_apology() {
        let h = harness(MockGeneration::failing());
        let report = h.orchestrator.handle_turn(h.user, "Olá").await.unwrap();

        assert_eq!(report.professor.text(), PRIMARY_UNAVAILABLE);
        assert_eq!(report.agent.text(), FALLBACK_APOLOGY);
        let stored = h.store.read(Scope::User(h.user), None).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[2].origin, MessageOrigin::Fallback);
    }
}
