//! Generated quest plans: parsing and shape validation.
//!
//! A plan arrives as free text from the text-generation collaborator. It must
//! decode to a JSON object shaped like
//! `{"title", "description", "questXp": number, "sidequests": [{"title", "description", "xp"}]}`
//! (title and description may be supplied by the caller instead). Everything is
//! validated before any record is written, so a rejected plan creates nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SideQuestError;
use crate::progression::MAX_XP_VALUE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidequestProposal {
    pub title: String,
    pub description: String,
    pub xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestPlan {
    pub title: String,
    pub description: String,
    pub quest_xp: u64,
    pub sidequests: Vec<SidequestProposal>,
}

/// One reply in a clarifying planning conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningTurn {
    /// The model wants more detail before proposing a plan.
    Question(String),
    Plan(QuestPlan),
}

/// Caller-provided title/description used when the reply omits them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanDefaults<'a> {
    pub title: &'a str,
    pub description: &'a str,
}

impl QuestPlan {
    /// Check the invariants a plan must satisfy before materialization.
    pub fn validate(&self) -> Result<(), SideQuestError> {
        if self.title.trim().is_empty() {
            return Err(malformed("quest title is empty"));
        }
        if self.description.trim().is_empty() {
            return Err(malformed("quest description is empty"));
        }
        if self.sidequests.is_empty() {
            return Err(malformed("plan has no sidequests"));
        }
        if self.quest_xp > MAX_XP_VALUE {
            return Err(malformed(&format!("questXp exceeds the maximum of {}", MAX_XP_VALUE)));
        }
        validate_proposals(&self.sidequests)
    }

    /// Sum of sidequest XP, excluding the quest bonus.
    pub fn sidequest_xp(&self) -> u64 {
        self.sidequests.iter().map(|s| s.xp).sum()
    }

    /// Decode and validate a plan object.
    pub fn from_value(value: &Value, defaults: PlanDefaults<'_>) -> Result<Self, SideQuestError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("plan is not a JSON object"))?;

        let title = optional_string(obj.get("title"), "title")?
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| defaults.title.to_string());
        let description = optional_string(obj.get("description"), "description")?
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| defaults.description.to_string());
        let quest_xp = xp_value(obj.get("questXp"), "questXp")?;

        let entries = obj
            .get("sidequests")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing sidequests array"))?;
        let mut sidequests = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            sidequests.push(proposal_from_value(idx, entry)?);
        }

        let plan = QuestPlan {
            title,
            description,
            quest_xp,
            sidequests,
        };
        plan.validate()?;
        Ok(plan)
    }
}

/// Shape checks for a list of sidequest proposals: non-empty, titled, XP in range.
pub fn validate_proposals(proposals: &[SidequestProposal]) -> Result<(), SideQuestError> {
    if proposals.is_empty() {
        return Err(malformed("plan has no sidequests"));
    }
    for (idx, proposal) in proposals.iter().enumerate() {
        if proposal.title.trim().is_empty() {
            return Err(malformed(&format!("sidequest {} has an empty title", idx)));
        }
        if proposal.xp > MAX_XP_VALUE {
            return Err(malformed(&format!(
                "sidequest {} xp exceeds the maximum of {}",
                idx, MAX_XP_VALUE
            )));
        }
    }
    Ok(())
}

fn malformed(reason: &str) -> SideQuestError {
    SideQuestError::MalformedPlan(reason.to_string())
}

fn optional_string(value: Option<&Value>, field: &str) -> Result<Option<String>, SideQuestError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(malformed(&format!("{} is not a string", field))),
    }
}

/// XP must be a number in `0..=MAX_XP_VALUE`; fractional values are rounded.
fn xp_value(value: Option<&Value>, field: &str) -> Result<u64, SideQuestError> {
    let number = value
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(&format!("{} is missing or not a number", field)))?;
    if !number.is_finite() || number < 0.0 {
        return Err(malformed(&format!("{} must be a non-negative number", field)));
    }
    let rounded = number.round();
    if rounded > MAX_XP_VALUE as f64 {
        return Err(malformed(&format!(
            "{} of {} exceeds the maximum of {}",
            field, number, MAX_XP_VALUE
        )));
    }
    Ok(rounded as u64)
}

fn proposal_from_value(idx: usize, value: &Value) -> Result<SidequestProposal, SideQuestError> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(&format!("sidequest {} is not an object", idx)))?;
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| malformed(&format!("sidequest {} is missing a title", idx)))?;
    let description = optional_string(obj.get("description"), "description")?.unwrap_or_default();
    let xp = xp_value(obj.get("xp"), &format!("sidequest {} xp", idx))?;
    Ok(SidequestProposal {
        title: title.to_string(),
        description,
        xp,
    })
}

/// Drop Markdown code-fence markers models like to wrap JSON in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn decode_json(text: &str) -> Result<Value, SideQuestError> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Err(SideQuestError::InvalidAiResponse("empty response".to_string()));
    }
    serde_json::from_str(&cleaned)
        .map_err(|e| SideQuestError::InvalidAiResponse(format!("not valid JSON: {}", e)))
}

/// Parse a one-shot plan reply.
pub fn parse_plan_response(text: &str, defaults: PlanDefaults<'_>) -> Result<QuestPlan, SideQuestError> {
    let value = decode_json(text)?;
    QuestPlan::from_value(&value, defaults)
}

/// Parse the sidequest list from a reply that only proposes sidequests for an
/// existing quest. `questXp` is optional here and ignored.
pub fn parse_sidequest_response(text: &str) -> Result<Vec<SidequestProposal>, SideQuestError> {
    let value = decode_json(text)?;
    let entries = value
        .get("sidequests")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing sidequests array"))?;
    if entries.is_empty() {
        return Err(malformed("plan has no sidequests"));
    }
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| proposal_from_value(idx, entry))
        .collect()
}

/// Parse a conversational reply:
/// `{"needsMoreInfo": bool, "question": string?, "questPlan": {...}?}`.
pub fn parse_planning_turn(text: &str, defaults: PlanDefaults<'_>) -> Result<PlanningTurn, SideQuestError> {
    let value = decode_json(text)?;
    let obj = value
        .as_object()
        .ok_or_else(|| malformed("reply is not a JSON object"))?;

    let needs_more = obj
        .get("needsMoreInfo")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if needs_more {
        if let Some(question) = obj
            .get("question")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
        {
            return Ok(PlanningTurn::Question(question.to_string()));
        }
    }

    match obj.get("questPlan") {
        Some(plan) if plan.is_object() => Ok(PlanningTurn::Plan(QuestPlan::from_value(plan, defaults)?)),
        _ if needs_more => Err(malformed("needsMoreInfo set without a question")),
        _ => Err(malformed("reply has neither a question nor a questPlan")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: PlanDefaults<'static> = PlanDefaults {
        title: "Learn Rust",
        description: "Get productive in Rust",
    };

    #[test]
    fn parses_fenced_plan_with_defaults() {
        let reply = "```json\n{\"questXp\":400,\"sidequests\":[{\"title\":\"Read the book\",\"description\":\"Chapters 1-5\",\"xp\":100},{\"title\":\"Build a CLI\",\"description\":\"Small tool\",\"xp\":150.4}]}\n```";
        let plan = parse_plan_response(reply, DEFAULTS).unwrap();
        assert_eq!(plan.title, "Learn Rust");
        assert_eq!(plan.quest_xp, 400);
        assert_eq!(plan.sidequests.len(), 2);
        assert_eq!(plan.sidequests[1].xp, 150);
        assert_eq!(plan.sidequest_xp(), 250);
    }

    #[test]
    fn reply_title_overrides_defaults() {
        let reply = r#"{"title":"Ship it","description":"Release v1","questXp":10,"sidequests":[{"title":"Tag","description":"","xp":5}]}"#;
        let plan = parse_plan_response(reply, DEFAULTS).unwrap();
        assert_eq!(plan.title, "Ship it");
        assert_eq!(plan.description, "Release v1");
    }

    #[test]
    fn missing_sidequests_is_malformed() {
        let err = parse_plan_response(r#"{"questXp": 100}"#, DEFAULTS).unwrap_err();
        assert!(matches!(err, SideQuestError::MalformedPlan(_)));
    }

    #[test]
    fn non_numeric_xp_is_malformed() {
        let reply = r#"{"questXp":100,"sidequests":[{"title":"A","description":"B","xp":"lots"}]}"#;
        let err = parse_plan_response(reply, DEFAULTS).unwrap_err();
        assert!(matches!(err, SideQuestError::MalformedPlan(_)));

        let reply = r#"{"questXp":"big","sidequests":[{"title":"A","description":"B","xp":1}]}"#;
        let err = parse_plan_response(reply, DEFAULTS).unwrap_err();
        assert!(matches!(err, SideQuestError::MalformedPlan(_)));
    }

    #[test]
    fn negative_xp_is_malformed() {
        let reply = r#"{"questXp":-5,"sidequests":[{"title":"A","description":"B","xp":1}]}"#;
        assert!(matches!(
            parse_plan_response(reply, DEFAULTS),
            Err(SideQuestError::MalformedPlan(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_plan_response("Sure! Here is your plan:", DEFAULTS).unwrap_err();
        assert!(matches!(err, SideQuestError::InvalidAiResponse(_)));
        let err = parse_plan_response("```\n```", DEFAULTS).unwrap_err();
        assert!(matches!(err, SideQuestError::InvalidAiResponse(_)));
    }

    #[test]
    fn empty_description_without_default_is_malformed() {
        let reply = r#"{"questXp":1,"sidequests":[{"title":"A","description":"B","xp":1}]}"#;
        let defaults = PlanDefaults {
            title: "T",
            description: "  ",
        };
        assert!(matches!(
            parse_plan_response(reply, defaults),
            Err(SideQuestError::MalformedPlan(_))
        ));
    }

    #[test]
    fn planning_turn_question_and_plan() {
        let reply = r#"{"needsMoreInfo": true, "question": "How many hours per week?"}"#;
        assert_eq!(
            parse_planning_turn(reply, DEFAULTS).unwrap(),
            PlanningTurn::Question("How many hours per week?".to_string())
        );

        let reply = r#"{"needsMoreInfo": false, "questPlan": {"questXp": 250, "sidequests": [{"title": "Start", "description": "Go", "xp": 50}]}}"#;
        match parse_planning_turn(reply, DEFAULTS).unwrap() {
            PlanningTurn::Plan(plan) => {
                assert_eq!(plan.quest_xp, 250);
                assert_eq!(plan.title, "Learn Rust");
            }
            other => panic!("unexpected turn: {:?}", other),
        }

        assert!(matches!(
            parse_planning_turn(r#"{"needsMoreInfo": true}"#, DEFAULTS),
            Err(SideQuestError::MalformedPlan(_))
        ));
    }

    #[test]
    fn sidequest_only_reply() {
        let reply = r#"{"sidequests":[{"title":"One","description":"1","xp":10},{"title":"Two","xp":20}]}"#;
        let proposals = parse_sidequest_response(reply).unwrap();
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[1].description, "");
        assert!(matches!(
            parse_sidequest_response(r#"{"sidequests": []}"#),
            Err(SideQuestError::MalformedPlan(_))
        ));
    }

    #[test]
    fn oversized_xp_is_malformed() {
        let reply = r#"{"questXp": 100, "sidequests":[{"title":"A","xp":1e19},{"title":"B","xp":1e19}]}"#;
        assert!(matches!(
            parse_plan_response(reply, DEFAULTS),
            Err(SideQuestError::MalformedPlan(_))
        ));
        assert!(matches!(
            parse_plan_response(r#"{"questXp": 1e30, "sidequests":[{"title":"A","xp":1}]}"#, DEFAULTS),
            Err(SideQuestError::MalformedPlan(_))
        ));

        let plan = QuestPlan {
            title: "t".to_string(),
            description: "d".to_string(),
            quest_xp: 10,
            sidequests: vec![SidequestProposal {
                title: "big".to_string(),
                description: String::new(),
                xp: MAX_XP_VALUE + 1,
            }],
        };
        assert!(matches!(plan.validate(), Err(SideQuestError::MalformedPlan(_))));
    }
}
