use docqa_core::types::ModalityResponse;

const ANSWER_FORMAT: &str = "## Evidence:\n\n## Chain of Thought:\n\n## Answer:\n";

fn answer_prompt(source: &str, instruction: &str, question: &str) -> String {
    format!(
        "You are tasked with answering a question based on the relevant {source} of a PDF document. \
         Provide your response in the following format:\n{ANSWER_FORMAT}\n___\nInstructions:\n\n\
         1. Evidence Curation: Extract relevant elements (such as paragraphs, tables, figures, charts) from the provided {source} \
         and populate them in the \"Evidence\" section. For each element, include the type, content, and a brief explanation of its relevance.\n\n\
         2. Chain of Thought: In the \"Chain of Thought\" section, list out each logical step you take to derive the answer, \
         referencing the evidence where applicable. Perform computations if they are needed to reach the answer.\n\n\
         3. Answer: {instruction}\n___\nQuestion: {question}\n"
    )
}

/// Structured-answer prompt sent together with the retrieved page images.
pub fn visual_prompt(instruction: &str, question: &str) -> String {
    answer_prompt("pages", instruction, question)
}

/// Structured-answer prompt with the retrieved chunks inlined as context.
pub fn textual_prompt(instruction: &str, question: &str, chunks: &[String]) -> String {
    format!(
        "{}___\nContext: {}\n",
        answer_prompt("chunks", instruction, question),
        chunks.join("\n- ")
    )
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn describe(label: &str, r: &ModalityResponse) -> String {
    format!(
        "{label}:\nEvidence: {}\nChain of Thought: {}\nFinal Answer: {}\n",
        or_default(&r.evidence, "Evidence not available"),
        or_default(&r.chain_of_thought, "CoT not available"),
        r.answer
    )
}

/// Comparison prompt over the visual (`Response 1`) and textual (`Response 2`) answers.
pub fn fusion_prompt(
    question: &str,
    visual: &ModalityResponse,
    textual: &ModalityResponse,
) -> String {
    format!(
        "Analyze the following two responses to the question: \"{question}\"\n\n{}\n{}\n\
         Response 1 comes from a visual question-answering pipeline over page images, and Response 2 from a textual pipeline over extracted text.\n\
         - When both chains of thought are logical and the decision comes down to evidence, trust the evidence in Response 1 more.\n\
         - If one response declines to give a clear answer, weigh the other answer more, unless there is a reasonable argument for not answering and the two chains of thought are inconsistent.\n\
         - Keep the answer short and direct, usually a single sentence or phrase that gives the specific response.\n\n\
         Consider both chains of thought and final answers. Provide your analysis in the following format:\n\n\
         ## Analysis:\n[Your analysis of how consistent the two chains of thought are with each other, with the question and with their answers, and of the validity of the evidence.]\n\n\
         ## Conclusion:\n[Which answer is more likely correct, or whether a synthesis of both is needed.]\n\n\
         ## Final Answer:\n[Answer the question \"{question}\" based on your analysis, short and concise, in language similar to the candidate answers.]\n",
        describe("Response 1", visual),
        describe("Response 2", textual),
    )
}
