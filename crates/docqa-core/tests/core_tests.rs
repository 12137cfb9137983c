use std::fs;
use tempfile::TempDir;

use docqa_core::align::{align_chunks, ChunkAligner, DocumentPages};
use docqa_core::chunker::RecursiveSplitter;
use docqa_core::config::{
    Config, GeneratorKind, PipelineConfig, TextRetriever, DEFAULT_QA_PROMPT,
};
use docqa_core::dataset::Dataset;
use docqa_core::sections::{
    extract_sections, ANSWER, ANSWER_HEADINGS, CHAIN_OF_THOUGHT, EVIDENCE, FINAL_ANSWER,
    FUSION_HEADINGS,
};
use docqa_core::similarity::ratio;
use docqa_core::types::{normalize_doc_id, page_id, parse_page_id, AlignedChunk};

fn docs(entries: &[(&str, &[&str])]) -> DocumentPages {
    entries
        .iter()
        .map(|(id, pages)| {
            (
                id.to_string(),
                pages.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

fn chunk(text: &str, doc: &str, page: usize) -> AlignedChunk {
    AlignedChunk {
        text: text.into(),
        doc_id: doc.into(),
        page,
    }
}

#[test]
fn each_chunk_maps_to_its_most_similar_page() {
    let pages = docs(&[
        ("a", &["the quick brown fox", "lorem ipsum dolor"]),
        ("b", &["sit amet consectetur"]),
    ]);
    let aligned = align_chunks(&pages, &RecursiveSplitter::new(20, 0));
    assert_eq!(
        aligned,
        vec![
            chunk("the quick brown fox", "a", 0),
            chunk("lorem ipsum dolor", "a", 1),
            chunk("sit amet consectetur", "b", 0)
        ]
    );
}

#[test]
fn ties_resolve_to_the_first_page_in_document_order() {
    // "hello world" is both a/0 and b/1; a sorts first.
    let pages = docs(&[("b", &["zzz", "hello world"]), ("a", &["hello world"])]);
    let aligned = align_chunks(&pages, &RecursiveSplitter::new(12, 0));
    assert_eq!(
        aligned,
        vec![
            chunk("hello world", "a", 0),
            chunk("zzz", "b", 0),
            chunk("hello world", "a", 0)
        ]
    );
}

#[test]
fn unmatched_chunk_has_no_best_page() {
    let pages = docs(&[("a", &["abc", "def"])]);
    assert_eq!(ChunkAligner::new(&pages).best_page("xyz"), None);
    assert_eq!(ChunkAligner::new(&pages).best_page("fed"), Some(("a", 1)));
}

#[test]
fn long_pages_lose_matches_built_from_popular_characters() {
    let long_page = format!(
        "Figure 2: {}",
        "the quick brown fox jumps over the lazy dog. ".repeat(5)
    );
    let chunk = "the quick brown fox jumps over the lazy dog.";

    // Every character of the long page is popular, so the short cover page wins.
    let pages = docs(&[("d", &["Cover page", &long_page])]);
    assert_eq!(ChunkAligner::new(&pages).best_page(chunk), Some(("d", 0)));

    let only_long = docs(&[("d", &[&long_page])]);
    assert_eq!(ChunkAligner::new(&only_long).best_page(chunk), None);
}

#[test]
fn pruned_search_agrees_with_exhaustive_scan() {
    let pages = docs(&[
        (
            "d1",
            &[
                "Revenue grew by 12 percent in 2021.",
                "Table 3 lists the ablation results.",
                "",
            ],
        ),
        (
            "d2",
            &[
                "The model reaches 91.2 accuracy.",
                "Revenue fell in 2020 due to costs.",
            ],
        ),
    ]);
    let aligner = ChunkAligner::new(&pages);
    for needle in [
        "Revenue grew in 2021",
        "ablation Table",
        "accuracy 91.2",
        "costs in 2020",
        "zzz 1",
    ] {
        let mut best = (0.0f64, None);
        for (doc, texts) in &pages {
            for (i, text) in texts.iter().enumerate() {
                let r = ratio(needle, text);
                if r > best.0 {
                    best = (r, Some((doc.as_str(), i)));
                }
            }
        }
        assert_eq!(aligner.best_page(needle), best.1, "chunk {needle:?}");
    }
}

#[test]
fn sections_follow_headings_and_default_to_empty() {
    let reply = "Preamble that is ignored\n\
                 ## Evidence: page 2 shows a chart\nwith two bars\n\
                 ## Chain of Thought:\nThe left bar is taller.\n\n\
                 ## Answer: Left";
    let s = extract_sections(reply, &ANSWER_HEADINGS);
    assert_eq!(s.get(EVIDENCE), "page 2 shows a chart\nwith two bars");
    assert_eq!(s.get(CHAIN_OF_THOUGHT), "The left bar is taller.");
    assert_eq!(s.get(ANSWER), "Left");

    let partial = extract_sections(
        "## Analysis: both agree\n## Unknown: skipped? no, appended",
        &FUSION_HEADINGS,
    );
    assert_eq!(
        partial.get("Analysis"),
        "both agree\n## Unknown: skipped? no, appended"
    );
    assert_eq!(partial.get(FINAL_ANSWER), "");
    assert_eq!(
        extract_sections("no headings at all", &ANSWER_HEADINGS).get(ANSWER),
        ""
    );
}

#[test]
fn config_file_and_overrides_layer() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[pipeline]\ndata_dir = \"/data/spiqa\"\ntop_k = 3\ntext_retriever = \"bge-m3\"\n",
    )
    .unwrap();

    let cfg = Config::load_from(tmp.path()).unwrap().pipeline().unwrap();
    assert_eq!(cfg.top_k, 3);
    assert_eq!(cfg.text_retriever, TextRetriever::BgeM3);
    assert_eq!(cfg.generator, GeneratorKind::Gpt4);
    assert_eq!(cfg.chunk_size, 3000);
    assert_eq!(
        cfg.dataset_path(),
        std::path::PathBuf::from("/data/spiqa/spiqa.csv")
    );

    let overridden = Config::load_from(tmp.path())
        .unwrap()
        .with_overrides(serde_json::json!({ "pipeline": { "top_k": 7, "generator": "qwen" } }))
        .pipeline()
        .unwrap();
    assert_eq!(overridden.top_k, 7);
    assert_eq!(overridden.generator, GeneratorKind::Qwen);
}

#[test]
fn configured_paths_expand_variables_and_home() {
    let tmp = TempDir::new().unwrap();
    std::env::set_var("DOCQA_BENCH_ROOT", "/mnt/bench");
    fs::write(
        tmp.path().join("config.toml"),
        "[pipeline]\n\
         data_dir = \"$DOCQA_BENCH_ROOT/spiqa\"\n\
         output_dir = \"${DOCQA_BENCH_ROOT}/out\"\n\
         models_dir = \"~/models\"\n",
    )
    .unwrap();

    let cfg = Config::load_from(tmp.path()).unwrap().pipeline().unwrap();
    assert_eq!(cfg.data_dir, std::path::PathBuf::from("/mnt/bench/spiqa"));
    assert_eq!(cfg.output_dir, std::path::PathBuf::from("/mnt/bench/out"));
    assert_eq!(
        cfg.dataset_path(),
        std::path::PathBuf::from("/mnt/bench/spiqa/spiqa.csv")
    );
    assert!(!cfg.models_dir.starts_with("~"), "{}", cfg.models_dir.display());
    assert!(cfg.models_dir.ends_with("models"));

    let unset = PipelineConfig::new("$DOCQA_UNSET_BENCH_ROOT/spiqa");
    assert!(unset.with_expanded_paths().is_err());
}

#[test]
fn config_validation() {
    let mut cfg = PipelineConfig::new("/data/x");
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.qa_instruction(), DEFAULT_QA_PROMPT);

    cfg.answer_style = Some("slidevqa".into());
    assert!(cfg.validate().is_ok());
    assert!(cfg.qa_instruction().starts_with("You are a presentation expert"));

    cfg.answer_style = Some("nope".into());
    assert!(cfg.validate().is_err());
    cfg.answer_style = None;

    cfg.chunk_overlap = cfg.chunk_size;
    assert!(cfg.validate().is_err());
    cfg.chunk_overlap = 0;
    cfg.top_k = 0;
    assert!(cfg.validate().is_err());

    assert!("colbert".parse::<TextRetriever>().is_err());
    assert_eq!("BM25".parse::<TextRetriever>().unwrap(), TextRetriever::Bm25);
}

#[test]
fn dataset_loads_queries_and_documents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("set.csv");
    fs::write(
        &path,
        "q_id,question,answer,documents,doc_path\n\
         q1,What grew?,revenue,\"['1706.0001.pdf', 'b']\",\n\
         q2,Which bar?,\"['left']\",,papers/c_3.pdf\n\
         q1,What grew?,revenue,\"['1706.0001.pdf']\",\n",
    )
    .unwrap();

    let ds = Dataset::load_csv(&path).unwrap();
    assert_eq!(ds.queries().len(), 3);
    assert_eq!(ds.unique_ids(), vec!["q1", "q2"]);
    assert_eq!(ds.get("q1").unwrap().documents, vec!["1706.0001", "b"]);
    assert_eq!(ds.get("q2").unwrap().answer, serde_json::json!(["left"]));
    assert!(ds.get("q2").unwrap().documents.is_empty());
    let referenced: Vec<String> = ds.referenced_documents().into_iter().collect();
    assert_eq!(referenced, vec!["1706.0001", "b", "c_3"]);

    assert!(Dataset::load_csv(&tmp.path().join("missing.csv")).is_err());
}

#[test]
fn page_ids_round_trip_through_underscored_doc_ids() {
    assert_eq!(page_id("c_3", 4), "c_3_4");
    assert_eq!(parse_page_id("c_3_4"), Some(("c_3", 4)));
    assert_eq!(parse_page_id("nounderscore"), None);
    assert_eq!(normalize_doc_id("dir/Paper.PDF"), "Paper");
}
