// planner.rs - Turns a scene description into an ordered list of clip prompts
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Completion API request failed: {status} {body}")]
    Api { status: u16, body: String },
    #[error("Malformed completion response: {0}")]
    Malformed(String),
    #[error("No content from completion API")]
    EmptyContent,
    #[error("Completion was not a JSON array of strings: {0}")]
    NotAList(String),
    #[error("Expected {expected} prompts, got {actual}")]
    WrongCount { expected: usize, actual: usize },
}

/// Chat-completion style text generation
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, api_key: &str, system: &str, user: &str) -> Result<String, PlannerError>;
}

const SYSTEM_PROMPT: &str = "You are a creative video scriptwriter. Your job is to break down a scene description \
into distinct, sequential video clips. Each clip should build on the previous one, \
creating a coherent story progression. Return ONLY a JSON array of strings with no markdown.";

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("valid code fence pattern");
}

pub fn user_prompt(scene_description: &str, num_clips: usize) -> String {
    format!(
        "Break this scene into {n} distinct, sequential video clip prompts. \
         Each prompt should be 1-2 sentences and build on the previous one. \
         Return as a JSON array of exactly {n} strings, nothing else.\n\nScene: {scene}",
        n = num_clips,
        scene = scene_description
    )
}

/// Parse a completion into exactly `num_clips` prompts.
///
/// A surrounding markdown fence (with or without a language tag) is ignored.
pub fn parse_prompt_list(content: &str, num_clips: usize) -> Result<Vec<String>, PlannerError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(PlannerError::EmptyContent);
    }

    let body = match CODE_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
        None => trimmed,
    };

    let prompts: Vec<String> =
        serde_json::from_str(body).map_err(|e| PlannerError::NotAList(e.to_string()))?;

    if prompts.len() != num_clips {
        return Err(PlannerError::WrongCount {
            expected: num_clips,
            actual: prompts.len(),
        });
    }
    Ok(prompts)
}

/// Deterministic plan used whenever the completion API cannot deliver one
pub fn fallback_plan(scene_description: &str, num_clips: usize) -> Vec<String> {
    (1..=num_clips)
        .map(|i| format!("{} (deel {} van {})", scene_description, i, num_clips))
        .collect()
}

#[derive(Clone)]
pub struct ClipPlanner {
    client: Arc<dyn CompletionClient>,
}

impl ClipPlanner {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn plan_with_model(
        &self,
        api_key: &str,
        scene_description: &str,
        num_clips: usize,
    ) -> Result<Vec<String>, PlannerError> {
        tracing::info!("Planning {} clips with the completion API", num_clips);
        let content = self
            .client
            .complete(api_key, SYSTEM_PROMPT, &user_prompt(scene_description, num_clips))
            .await?;

        let prompts = parse_prompt_list(&content, num_clips)?;
        for (i, prompt) in prompts.iter().enumerate() {
            tracing::debug!("  Clip {}: {}", i + 1, prompt);
        }
        Ok(prompts)
    }

    /// Always returns `num_clips` prompts in playback order.
    pub async fn plan(&self, api_key: &str, scene_description: &str, num_clips: usize) -> Vec<String> {
        match self.plan_with_model(api_key, scene_description, num_clips).await {
            Ok(prompts) => {
                tracing::info!("Generated {} prompts", prompts.len());
                prompts
            }
            Err(e) => {
                tracing::warn!("Prompt planning failed, falling back to simple splitting: {}", e);
                fallback_plan(scene_description, num_clips)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedClient {
        reply: Result<String, PlannerError>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<String, PlannerError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, api_key: &str, _system: &str, user: &str) -> Result<String, PlannerError> {
            self.seen
                .lock()
                .unwrap()
                .push((api_key.to_string(), user.to_string()));
            self.reply.clone()
        }
    }

    #[test]
    fn test_fallback_labels_each_part() {
        let prompts = fallback_plan("a cat exploring a garden", 3);
        assert_eq!(
            prompts,
            vec![
                "a cat exploring a garden (deel 1 van 3)",
                "a cat exploring a garden (deel 2 van 3)",
                "a cat exploring a garden (deel 3 van 3)",
            ]
        );
    }

    #[test]
    fn test_fallback_length_matches_request() {
        for n in 1..=12 {
            let prompts = fallback_plan("waves", n);
            assert_eq!(prompts.len(), n);
            assert!(prompts.iter().all(|p| p.contains("waves")));
        }
    }

    #[test]
    fn test_parse_plain_and_fenced_arrays() {
        assert_eq!(
            parse_prompt_list(r#"["one", "two"]"#, 2).unwrap(),
            vec!["one", "two"]
        );
        assert_eq!(
            parse_prompt_list("```json\n[\"one\", \"two\"]\n```", 2).unwrap(),
            vec!["one", "two"]
        );
        assert_eq!(
            parse_prompt_list("  ```\n[\"one\"]\n```  ", 1).unwrap(),
            vec!["one"]
        );
    }

    #[test]
    fn test_parse_rejects_wrong_count_and_non_lists() {
        assert_eq!(
            parse_prompt_list(r#"["one"]"#, 2),
            Err(PlannerError::WrongCount { expected: 2, actual: 1 })
        );
        assert!(matches!(
            parse_prompt_list(r#"{"prompts": []}"#, 0),
            Err(PlannerError::NotAList(_))
        ));
        assert_eq!(parse_prompt_list("   ", 1), Err(PlannerError::EmptyContent));
    }

    #[tokio::test]
    async fn test_plan_uses_model_output() {
        let client = ScriptedClient::new(Ok(r#"["cat sniffs a rose", "cat chases a bee"]"#.to_string()));
        let planner = ClipPlanner::new(client.clone());

        let prompts = planner.plan("sk-test", "a cat exploring a garden", 2).await;
        assert_eq!(prompts, vec!["cat sniffs a rose", "cat chases a bee"]);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, "sk-test");
        assert!(seen[0].1.contains("exactly 2 strings"));
        assert!(seen[0].1.ends_with("Scene: a cat exploring a garden"));
    }

    #[tokio::test]
    async fn test_plan_falls_back_on_api_failure() {
        let client = ScriptedClient::new(Err(PlannerError::Api {
            status: 401,
            body: "invalid key".to_string(),
        }));
        let planner = ClipPlanner::new(client);

        let prompts = planner.plan("bad", "a cat exploring a garden", 3).await;
        assert_eq!(prompts, fallback_plan("a cat exploring a garden", 3));
    }

    #[tokio::test]
    async fn test_plan_falls_back_on_wrong_count() {
        let client = ScriptedClient::new(Ok(r#"["only one"]"#.to_string()));
        let planner = ClipPlanner::new(client);

        let prompts = planner.plan("sk-test", "sunset", 4).await;
        assert_eq!(prompts.len(), 4);
        assert_eq!(prompts[3], "sunset (deel 4 van 4)");
    }
}
