//! Fusion of the visual and textual answers into one judged answer.
use tracing::debug;

use docqa_core::dataset::Query;
use docqa_core::sections::{
    extract_sections, ANALYSIS, CONCLUSION, FINAL_ANSWER, FUSION_HEADINGS,
};
use docqa_core::traits::{Generator, Sampling};
use docqa_core::types::{CombinedResponse, ModalityResponse};

use crate::prompts::fusion_prompt;

pub struct FusionArbiter<'a> {
    generator: &'a dyn Generator,
}

impl<'a> FusionArbiter<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self { generator }
    }

    pub fn combine(
        &self,
        query: &Query,
        visual: ModalityResponse,
        textual: ModalityResponse,
    ) -> anyhow::Result<CombinedResponse> {
        let prompt = fusion_prompt(&query.question, &visual, &textual);
        let reply = self.generator.generate(&prompt, &[], Sampling::FUSION)?;
        debug!("Fusion reply for {}: {} chars", query.q_id, reply.len());
        let sections = extract_sections(&reply, &FUSION_HEADINGS);
        Ok(CombinedResponse {
            question: query.question.clone(),
            answer: sections.get(FINAL_ANSWER).to_string(),
            gt_answer: query.answer.clone(),
            analysis: sections.get(ANALYSIS).to_string(),
            conclusion: sections.get(CONCLUSION).to_string(),
            response1: visual,
            response2: textual,
        })
    }
}
