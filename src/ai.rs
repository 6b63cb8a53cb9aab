use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::HunterError;
use crate::models::{CandidateProfile, JobAnalysis, TailoredResume};

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    /// Concatenated text blocks; `None` when the reply carries no text.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Anthropic Messages API, one user turn per call.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build Anthropic HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(HunterError::fetch("Anthropic API", format!("status {}: {}", status, detail)).into());
        }

        response
            .json::<MessagesResponse>()
            .context("Unreadable Anthropic response")?
            .into_text()
            .ok_or_else(|| anyhow!("Anthropic response had no text"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// --- Collaborator seams used by the processing pipeline ---

pub trait DescriptionAnalyzer {
    /// `None` when the model fails or answers with something unparseable.
    fn analyze(&self, description: &str) -> Option<JobAnalysis>;
}

pub trait ApplicationWriter {
    /// `None` when the model fails or answers with nothing usable.
    fn tailor_resume(
        &self,
        profile: &CandidateProfile,
        analysis: &JobAnalysis,
        title: &str,
        company: &str,
    ) -> Option<TailoredResume>;

    /// Plain-text letter, or `None`.
    fn cover_letter(
        &self,
        profile: &CandidateProfile,
        analysis: &JobAnalysis,
        title: &str,
        company: &str,
    ) -> Option<String>;
}

const MAX_DESCRIPTION_CHARS: usize = 8000;

/// Analysis and tailoring backed by any `AIProvider`.
pub struct Assistant<P: AIProvider> {
    provider: P,
}

impl<P: AIProvider> Assistant<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn complete_json<T: DeserializeOwned>(&self, prompt: &str, max_tokens: u32) -> Result<T> {
        let text = self.provider.complete(prompt, max_tokens)?;
        parse_json_reply(&text)
    }
}

/// Models wrap JSON in code fences more often than not.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let cleaned = text.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim()).context("Model reply was not valid JSON")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl<P: AIProvider> DescriptionAnalyzer for Assistant<P> {
    fn analyze(&self, description: &str) -> Option<JobAnalysis> {
        let prompt = format!(
            "Analyze this job description. Return JSON only:\n\n\
            {{\n\
                \"required_skills\": [\"skill1\", \"skill2\"],\n\
                \"preferred_skills\": [\"skill1\"],\n\
                \"keywords\": [\"keyword1\", \"keyword2\"],\n\
                \"remote_type\": \"fully_remote\" | \"hybrid\" | \"onsite\" | \"unclear\",\n\
                \"experience_years\": \"3-5\",\n\
                \"red_flags\": []\n\
            }}\n\n\
            Job Description:\n{}\n\n\
            JSON only, no other text:",
            truncate_chars(description, MAX_DESCRIPTION_CHARS)
        );

        match self.complete_json::<JobAnalysis>(&prompt, 1500) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::error!("Analysis error ({}): {:#}", self.provider.model_name(), e);
                None
            }
        }
    }
}

impl<P: AIProvider> ApplicationWriter for Assistant<P> {
    fn tailor_resume(
        &self,
        profile: &CandidateProfile,
        analysis: &JobAnalysis,
        title: &str,
        company: &str,
    ) -> Option<TailoredResume> {
        let resume_json = serde_json::to_string_pretty(profile).ok()?;
        let prompt = format!(
            "Tailor this resume for the job. Stay truthful: only use facts from the resume. Return JSON only.\n\n\
            Resume:\n{resume_json}\n\n\
            Job: {title} at {company}\n\
            Requirements: {requirements}\n\
            Keywords: {keywords}\n\n\
            Return JSON:\n\
            {{\n\
                \"summary\": \"2-3 sentence tailored summary\",\n\
                \"experience\": [\n\
                    {{\"title\": \"...\", \"company\": \"...\", \"dates\": \"...\", \"bullets\": [\"...\", \"...\"]}}\n\
                ],\n\
                \"skills\": [\"reordered\", \"skills\", \"list\"]\n\
            }}\n\n\
            JSON only:",
            requirements = serde_json::to_string(&analysis.required_skills).unwrap_or_default(),
            keywords = serde_json::to_string(&analysis.keywords).unwrap_or_default(),
        );

        match self.complete_json::<TailoredResume>(&prompt, 2500) {
            Ok(tailored) if !tailored.is_empty() => Some(tailored),
            Ok(_) => None,
            Err(e) => {
                tracing::error!("Resume tailoring error: {:#}", e);
                None
            }
        }
    }

    fn cover_letter(
        &self,
        profile: &CandidateProfile,
        analysis: &JobAnalysis,
        title: &str,
        company: &str,
    ) -> Option<String> {
        let current_role = profile
            .experience
            .first()
            .map(|e| e.title.as_str())
            .unwrap_or("Professional");
        let skills: Vec<&str> = profile.skills.iter().take(8).map(String::as_str).collect();
        let requirements: Vec<&str> = analysis
            .required_skills
            .iter()
            .take(5)
            .map(String::as_str)
            .collect();

        let prompt = format!(
            "Write a cover letter (3-4 paragraphs).\n\n\
            Candidate: {}, {}\n\
            Job: {} at {}\n\
            Key Skills: {}\n\
            Requirements: {}\n\n\
            Write the letter (no JSON, just the text):",
            profile.name,
            current_role,
            title,
            company,
            skills.join(", "),
            requirements.join(", ")
        );

        match self.provider.complete(&prompt, 1200) {
            Ok(letter) if !letter.trim().is_empty() => Some(letter.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::error!("Cover letter error: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Experience, RemoteType};
    use std::cell::RefCell;

    struct CannedProvider {
        reply: Result<String, String>,
        prompts: RefCell<Vec<String>>,
    }

    impl CannedProvider {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("overloaded".to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AIProvider for CannedProvider {
        fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn profile() -> CandidateProfile {
        CandidateProfile {
            name: "Sam Doe".to_string(),
            skills: vec!["SQL".to_string(), "Excel".to_string()],
            experience: vec![Experience {
                title: "Operations Lead".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_messages_response_keeps_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "{\"a\":"}, {"type": "tool_use", "id": "x"}, {"type": "text", "text": "1}"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("{\"a\":1}"));

        let empty: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(empty.into_text().is_none());
    }

    #[test]
    fn test_analyze_strips_code_fences() {
        let assistant = Assistant::new(CannedProvider::ok(
            "```json\n{\"required_skills\": [\"sql\"], \"remote_type\": \"fully_remote\"}\n```",
        ));
        let analysis = assistant.analyze("We need SQL.").unwrap();
        assert_eq!(analysis.required_skills, vec!["sql"]);
        assert_eq!(analysis.remote_type, Some(RemoteType::FullyRemote));
    }

    #[test]
    fn test_analyze_returns_none_on_failure() {
        let assistant = Assistant::new(CannedProvider::failing());
        assert!(assistant.analyze("anything").is_none());

        let assistant = Assistant::new(CannedProvider::ok("Sorry, I can't help with that."));
        assert!(assistant.analyze("anything").is_none());
    }

    #[test]
    fn test_analyze_keeps_reply_without_skills() {
        let assistant = Assistant::new(CannedProvider::ok(r#"{"required_skills": [], "remote_type": null}"#));
        assert_eq!(assistant.analyze("anything"), Some(JobAnalysis::default()));
    }

    #[test]
    fn test_analyze_truncates_long_descriptions() {
        let assistant = Assistant::new(CannedProvider::ok("{}"));
        let description = "é".repeat(MAX_DESCRIPTION_CHARS + 500);
        assistant.analyze(&description);
        let prompt = assistant.provider.prompts.borrow()[0].clone();
        assert_eq!(prompt.matches('é').count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_tailor_resume_rejects_empty_reply() {
        let assistant = Assistant::new(CannedProvider::ok("{}"));
        let tailored = assistant.tailor_resume(&profile(), &JobAnalysis::default(), "PM", "acme");
        assert!(tailored.is_none());

        let assistant = Assistant::new(CannedProvider::ok(r#"{"summary": "Ops leader", "skills": ["SQL"]}"#));
        let tailored = assistant
            .tailor_resume(&profile(), &JobAnalysis::default(), "PM", "acme")
            .unwrap();
        assert_eq!(tailored.summary, "Ops leader");
    }

    #[test]
    fn test_cover_letter_prompt_mentions_role_and_company() {
        let assistant = Assistant::new(CannedProvider::ok("  Dear team,\n\nHello.  "));
        let letter = assistant
            .cover_letter(&profile(), &JobAnalysis::default(), "Operations Manager", "acme")
            .unwrap();
        assert_eq!(letter, "Dear team,\n\nHello.");
        let prompt = assistant.provider.prompts.borrow()[0].clone();
        assert!(prompt.contains("Sam Doe, Operations Lead"));
        assert!(prompt.contains("Operations Manager at acme"));
    }

    #[test]
    fn test_cover_letter_none_on_failure() {
        let assistant = Assistant::new(CannedProvider::failing());
        assert!(assistant
            .cover_letter(&profile(), &JobAnalysis::default(), "PM", "acme")
            .is_none());
    }
}
