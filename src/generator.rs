//! Text-generation boundary.
//!
//! [`TextGenerator`] is the opaque chat-completion capability: role-tagged
//! messages in, generated text out. [`QuestPlanner`] wraps one with the quest
//! planning prompts, parses the replies into [`QuestPlan`]s and hands them to
//! the [`ProgressionEngine`] for materialization.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::SideQuestError;
use crate::logutil::preview;
use crate::plan::{
    parse_plan_response, parse_planning_turn, parse_sidequest_response, PlanDefaults, PlanningTurn,
    QuestPlan, SidequestProposal,
};
use crate::progression::{MaterializedPlan, ProgressionEngine};
use crate::types::{QuestRecord, SidequestRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Chat-completion capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, SideQuestError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, SideQuestError> {
        (**self).chat(messages, options).await
    }
}

/// Single user message, optionally preceded by a system instruction.
pub async fn prompt<G: TextGenerator + ?Sized>(
    generator: &G,
    message: &str,
    system: Option<&str>,
    options: &ChatOptions,
) -> Result<String, SideQuestError> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(message));
    generator.chat(&messages, options).await
}

const PLAN_SYSTEM_PROMPT: &str = "You plan quests for a gamified to-do app. \
Split the user's quest into the sidequests needed to finish it, in the order they should be done. \
Each sidequest is one concrete action whose title starts with a verb. \
Give each sidequest an xp reward between 50 and 500 scaled to its effort, \
and give the whole quest a completion bonus questXp between 100 and 2500 scaled to its size. \
Reply with a single JSON object and nothing else: \
{\"questXp\": number, \"sidequests\": [{\"title\": string, \"description\": string, \"xp\": number}]}";

const CONVERSATION_SYSTEM_PROMPT: &str = "You plan quests for a gamified to-do app. \
If the quest is too vague to split into concrete steps, ask exactly one short clarifying question. \
Otherwise produce the plan. Reply with a single JSON object and nothing else: \
{\"needsMoreInfo\": boolean, \"question\": string, \
\"questPlan\": {\"title\": string, \"description\": string, \"questXp\": number, \
\"sidequests\": [{\"title\": string, \"description\": string, \"xp\": number}]}}. \
Set needsMoreInfo to true only when asking a question; include questPlan only when it is false.";

fn plan_request(title: &str, description: &str) -> String {
    format!(
        "Break this quest into sidequests and decide its completion bonus.\n\nQuest title: {}\nQuest description: {}\n\nRespond with raw JSON only.",
        title, description
    )
}

fn sidequest_request(quest: &QuestRecord) -> String {
    format!(
        "Break this quest into sidequests.\n\nQuest title: {}\nQuest description: {}\n\nRespond with raw JSON only.",
        quest.title, quest.description
    )
}

/// History of a clarifying planning exchange (system prompt excluded).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConversation {
    pub title: String,
    pub description: String,
    pub history: Vec<ChatMessage>,
}

impl PlanningConversation {
    fn defaults(&self) -> PlanDefaults<'_> {
        PlanDefaults {
            title: &self.title,
            description: &self.description,
        }
    }
}

pub struct QuestPlanner<G> {
    generator: G,
    options: ChatOptions,
}

impl<G: TextGenerator> QuestPlanner<G> {
    pub fn new(generator: G) -> Self {
        Self::with_options(
            generator,
            ChatOptions {
                max_tokens: 2048,
                ..ChatOptions::default()
            },
        )
    }

    pub fn with_options(generator: G, options: ChatOptions) -> Self {
        Self { generator, options }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String, SideQuestError> {
        let reply = self.generator.chat(&messages, &self.options).await?;
        debug!("planner reply: {}", preview(&reply, 200));
        Ok(reply)
    }

    /// Propose a full plan for a new quest.
    pub async fn plan_quest(&self, title: &str, description: &str) -> Result<QuestPlan, SideQuestError> {
        let reply = self
            .ask(vec![
                ChatMessage::system(PLAN_SYSTEM_PROMPT),
                ChatMessage::user(plan_request(title, description)),
            ])
            .await?;
        parse_plan_response(&reply, PlanDefaults { title, description })
    }

    /// Propose sidequests for an existing quest.
    pub async fn plan_sidequests(&self, quest: &QuestRecord) -> Result<Vec<SidequestProposal>, SideQuestError> {
        let reply = self
            .ask(vec![
                ChatMessage::system(PLAN_SYSTEM_PROMPT),
                ChatMessage::user(sidequest_request(quest)),
            ])
            .await?;
        parse_sidequest_response(&reply)
    }

    /// Open a clarifying conversation. The model either asks a question or
    /// answers straight away with a plan.
    pub async fn start_conversation(
        &self,
        title: &str,
        description: &str,
    ) -> Result<(PlanningConversation, PlanningTurn), SideQuestError> {
        let mut conversation = PlanningConversation {
            title: title.to_string(),
            description: description.to_string(),
            history: Vec::new(),
        };
        let opening = ChatMessage::user(format!(
            "I want to create a quest:\n\nTitle: {}\nDescription: {}",
            if title.is_empty() { "Not provided" } else { title },
            if description.is_empty() { "Not provided" } else { description },
        ));
        let turn = self.converse(&mut conversation, opening).await?;
        Ok((conversation, turn))
    }

    /// Feed the user's answer to the last question back in. On failure the
    /// history is left as it was, so the same answer can be retried.
    pub async fn continue_conversation(
        &self,
        conversation: &mut PlanningConversation,
        answer: &str,
    ) -> Result<PlanningTurn, SideQuestError> {
        self.converse(conversation, ChatMessage::user(answer.trim())).await
    }

    /// Send `message` after the history; the user/assistant pair is only
    /// recorded once the reply parses.
    async fn converse(
        &self,
        conversation: &mut PlanningConversation,
        message: ChatMessage,
    ) -> Result<PlanningTurn, SideQuestError> {
        let mut messages = Vec::with_capacity(conversation.history.len() + 2);
        messages.push(ChatMessage::system(CONVERSATION_SYSTEM_PROMPT));
        messages.extend(conversation.history.iter().cloned());
        messages.push(message.clone());
        let reply = self.ask(messages).await?;
        let turn = parse_planning_turn(&reply, conversation.defaults())?;
        conversation.history.push(message);
        conversation.history.push(ChatMessage::assistant(reply));
        Ok(turn)
    }

    /// Generate a plan and write it as a new quest for `user_id`.
    pub async fn generate_quest(
        &self,
        engine: &ProgressionEngine,
        user_id: &str,
        title: &str,
        description: &str,
    ) -> Result<MaterializedPlan, SideQuestError> {
        if engine.get_user(user_id)?.is_none() {
            return Err(SideQuestError::not_found("user", user_id));
        }
        let plan = self.plan_quest(title, description).await?;
        let materialized = engine.create_quest_from_plan(user_id, &plan)?;
        info!(
            "generated quest {} with {} sidequests",
            materialized.quest.id,
            materialized.sidequests.len()
        );
        Ok(materialized)
    }

    /// Generate sidequests and append them after the quest's existing ones.
    pub async fn generate_sidequests(
        &self,
        engine: &ProgressionEngine,
        quest_id: &str,
    ) -> Result<Vec<SidequestRecord>, SideQuestError> {
        let quest = engine
            .get_quest(quest_id)?
            .ok_or_else(|| SideQuestError::not_found("quest", quest_id))?;
        let proposals = self.plan_sidequests(&quest).await?;
        engine.append_generated_sidequests(quest_id, &proposals)
    }

    /// Re-plan an existing quest from its title and description, replacing
    /// all of its sidequests.
    pub async fn regenerate_quest(
        &self,
        engine: &ProgressionEngine,
        quest_id: &str,
    ) -> Result<MaterializedPlan, SideQuestError> {
        let quest = engine
            .get_quest(quest_id)?
            .ok_or_else(|| SideQuestError::not_found("quest", quest_id))?;
        let plan = self.plan_quest(&quest.title, &quest.description).await?;
        engine.replace_quest_plan(quest_id, &plan)
    }
}
