//! Human-readable rendering of an analysis for the `analyze` subcommand.

use crate::core::normalizer::AnalyzeResult;
use colored::*;
use std::fmt::Write;

pub fn render(result: &AnalyzeResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} {}", "🎯 Goal:".cyan().bold(), result.summary);

    if !result.root_causes.is_empty() {
        let _ = writeln!(out, "{}", "🔍 Why the answer missed:".yellow().bold());
        for cause in &result.root_causes {
            let _ = writeln!(out, "   - {}", cause);
        }
    }

    let _ = writeln!(out, "{}", "✨ Try this prompt instead:".green().bold());
    let _ = writeln!(out, "   {}", result.suggested_prompt.bold());

    if !result.alternatives.is_empty() {
        let _ = writeln!(out, "{}", "🔁 Alternatives:".blue().bold());
        for (i, alt) in result.alternatives.iter().enumerate() {
            let _ = writeln!(out, "   {}. {}", i + 1, alt);
        }
    }

    let pct = format!("{:.0}%", result.confidence * 100.0);
    let pct = if result.confidence >= 0.7 {
        pct.green()
    } else if result.confidence >= 0.4 {
        pct.yellow()
    } else {
        pct.red()
    };
    let _ = write!(out, "{} {}", "📊 Confidence:".magenta().bold(), pct);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_section() {
        let result = AnalyzeResult {
            summary: "Wants a styled login page".into(),
            root_causes: vec!["No CSS".into()],
            suggested_prompt: "Give me a styled login page.".into(),
            alternatives: vec!["Use Tailwind.".into(), "Use plain CSS.".into()],
            confidence: 0.8,
        };
        let text = render(&result);
        assert!(text.contains("Wants a styled login page"));
        assert!(text.contains("- No CSS"));
        assert!(text.contains("Give me a styled login page."));
        assert!(text.contains("2. Use plain CSS."));
        assert!(text.contains("80%"));
    }

    #[test]
    fn test_render_skips_empty_lists() {
        let text = render(&AnalyzeResult {
            alternatives: Vec::new(),
            ..AnalyzeResult::degraded()
        });
        assert!(!text.contains("Alternatives"));
        assert!(text.contains("30%"));
    }
}
