use serde_json::json;
use tracing::info;

use storekeep_core::Result;

use crate::types::{Answer, Candidate, Citation, GenerateContentResponse};
use crate::{decode_body, send, GeminiClient};

pub const NO_RESPONSE: &str = "(no response)";

impl GeminiClient {
    /// Single-turn generation with retrieval restricted to `store_name`.
    pub async fn ask(&self, model: &str, store_name: &str, question: &str) -> Result<Answer> {
        let payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": question }]
                }
            ],
            "generationConfig": { "temperature": self.temperature },
            "tools": [
                { "fileSearch": { "fileSearchStoreNames": [store_name] } }
            ]
        });
        let endpoint = format!("models/{}:generateContent", model.trim_start_matches("models/"));
        let request = self
            .authorized(self.http.post(self.url(&endpoint)))
            .json(&payload);
        info!(model, store = %store_name, "asking question");
        let response = send(request, "generate content").await?;
        let body: GenerateContentResponse = decode_body(response, "generate content").await?;
        Ok(answer_from(body))
    }
}

fn answer_from(body: GenerateContentResponse) -> Answer {
    let Some(candidate) = body.candidates.into_iter().next() else {
        return Answer {
            text: NO_RESPONSE.to_string(),
            citations: Vec::new(),
        };
    };
    let text = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_RESPONSE.to_string());
    Answer {
        text,
        citations: collect_citations(&candidate),
    }
}

fn collect_citations(candidate: &Candidate) -> Vec<Citation> {
    let grounded = candidate
        .grounding_metadata
        .iter()
        .flat_map(|meta| meta.grounding_chunks.iter())
        .filter_map(|chunk| chunk.retrieved_context.as_ref())
        .map(|ctx| Citation {
            uri: ctx.uri.clone(),
            title: ctx.title.clone(),
        });
    let cited = candidate
        .citation_metadata
        .iter()
        .flat_map(|meta| meta.citation_sources.iter())
        .map(|source| Citation {
            uri: source.uri.clone(),
            title: None,
        });
    let mut citations: Vec<Citation> = Vec::new();
    for citation in grounded.chain(cited) {
        if citation.uri.is_none() && citation.title.is_none() {
            continue;
        }
        let duplicate = citations.iter().any(|seen| match (&seen.uri, &citation.uri) {
            (Some(a), Some(b)) => a == b,
            (None, None) => seen.title == citation.title,
            _ => false,
        });
        if !duplicate {
            citations.push(citation);
        }
    }
    citations
}
