//! Formats retrieved chunks into the context block handed to the LLM.

use crate::store::SearchResult;

pub struct ContextBuilder {
    max_chars: usize,
}

impl ContextBuilder {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Build a cited context block, bounded by the character budget.
    /// Returns `None` when nothing was retrieved.
    pub fn build(&self, results: &[SearchResult]) -> Option<String> {
        if results.is_empty() {
            return None;
        }

        let mut context = String::from("Relevant knowledge base excerpts:\n\n");
        let mut used = 0usize;
        let mut included = 0usize;

        for (i, result) in results.iter().enumerate() {
            let entry = format!(
                "[{}] (source: {}, relevance: {:.2})\n{}\n\n",
                i + 1,
                result.document.source,
                result.score,
                result.document.content
            );

            if used + entry.len() > self.max_chars && included > 0 {
                break;
            }

            used += entry.len();
            included += 1;
            context.push_str(&entry);
        }

        Some(context.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Document;

    fn result(id: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            document: Document {
                id: id.to_string(),
                content: content.to_string(),
                source: "guide.md".to_string(),
                metadata: None,
                embedding: None,
            },
            score,
        }
    }

    #[test]
    fn empty_results_produce_no_context() {
        assert!(ContextBuilder::new(4000).build(&[]).is_none());
    }

    #[test]
    fn entries_are_numbered_and_cited() {
        let context = ContextBuilder::new(4000)
            .build(&[
                result("a", "First excerpt.", 0.91),
                result("b", "Second excerpt.", 0.72),
            ])
            .unwrap();

        assert!(context.contains("[1] (source: guide.md, relevance: 0.91)"));
        assert!(context.contains("First excerpt."));
        assert!(context.contains("[2]"));
        assert!(context.contains("Second excerpt."));
    }

    #[test]
    fn the_budget_caps_included_entries_but_keeps_the_best_one() {
        let long = "x".repeat(300);
        let context = ContextBuilder::new(120)
            .build(&[result("a", &long, 0.9), result("b", &long, 0.8)])
            .unwrap();

        // The top entry always survives, later ones are dropped.
        assert!(context.contains("[1]"));
        assert!(!context.contains("[2]"));
    }
}
