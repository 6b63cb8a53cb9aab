use anyhow::{Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::path::Path;

use crate::models::{CandidateProfile, TailoredResume};

pub trait DocumentWriter {
    fn write_resume(&self, content: &TailoredResume, profile: &CandidateProfile, path: &Path) -> Result<()>;

    fn write_cover_letter(
        &self,
        letter: &str,
        profile: &CandidateProfile,
        title: &str,
        company: &str,
        path: &Path,
    ) -> Result<()>;

    /// File extension, without the dot.
    fn extension(&self) -> &str;
}

/// Plain Markdown output, wrapped for reading in a terminal.
pub struct MarkdownWriter {
    width: usize,
}

impl MarkdownWriter {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl Default for MarkdownWriter {
    fn default() -> Self {
        Self::new(80)
    }
}

impl DocumentWriter for MarkdownWriter {
    fn write_resume(&self, content: &TailoredResume, profile: &CandidateProfile, path: &Path) -> Result<()> {
        std::fs::write(path, render_resume(content, profile))
            .with_context(|| format!("Failed to write resume {}", path.display()))
    }

    fn write_cover_letter(
        &self,
        letter: &str,
        profile: &CandidateProfile,
        title: &str,
        company: &str,
        path: &Path,
    ) -> Result<()> {
        let date = Local::now().format("%B %d, %Y").to_string();
        let body = render_cover_letter(letter, profile, title, company, &date, self.width);
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write cover letter {}", path.display()))
    }

    fn extension(&self) -> &str {
        "md"
    }
}

/// Tailored sections win; anything the model left empty comes from the master resume.
pub fn render_resume(content: &TailoredResume, profile: &CandidateProfile) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {}\n", profile.name);
    let contact: Vec<&str> = [&profile.email, &profile.phone, &profile.location]
        .into_iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    if !contact.is_empty() {
        let _ = writeln!(out, "{}\n", contact.join(" | "));
    }

    let summary = if content.summary.trim().is_empty() {
        &profile.summary
    } else {
        &content.summary
    };
    let _ = writeln!(out, "## Professional Summary\n\n{}\n", summary.trim());

    let experience = if content.experience.is_empty() {
        &profile.experience
    } else {
        &content.experience
    };
    let _ = writeln!(out, "## Experience\n");
    for exp in experience {
        let _ = writeln!(out, "**{}** | {} | {}\n", exp.title, exp.company, exp.dates);
        for bullet in &exp.bullets {
            let _ = writeln!(out, "- {}", bullet);
        }
        if !exp.bullets.is_empty() {
            out.push('\n');
        }
    }

    if !profile.education.is_empty() {
        let _ = writeln!(out, "## Education\n");
        for edu in &profile.education {
            let _ = writeln!(out, "- {} - {}, {}", edu.degree, edu.school, edu.year);
        }
        out.push('\n');
    }

    let skills = if content.skills.is_empty() {
        &profile.skills
    } else {
        &content.skills
    };
    let _ = writeln!(out, "## Skills\n\n{}\n", skills.join(" | "));

    if !profile.certifications.is_empty() {
        let _ = writeln!(out, "## Certifications\n");
        for cert in &profile.certifications {
            let _ = writeln!(out, "- {}", cert);
        }
    }

    out
}

pub fn render_cover_letter(
    letter: &str,
    profile: &CandidateProfile,
    title: &str,
    company: &str,
    date: &str,
    width: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", date);
    let _ = writeln!(out, "Re: {} Position at {}\n", title, company);

    for para in letter.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let _ = writeln!(out, "{}\n", textwrap::fill(para, width));
    }

    let _ = writeln!(out, "Sincerely,\n");
    let _ = writeln!(out, "{}", profile.name);
    if !profile.email.is_empty() {
        let _ = writeln!(out, "{}", profile.email);
    }
    out
}
